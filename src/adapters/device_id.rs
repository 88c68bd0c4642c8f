//! Device identity derived from the factory MAC address.
//!
//! - DevEUI: the 6-byte MAC expanded to EUI-64 by inserting `FF FE` in
//!   the middle (the same expansion the LoRa modem applies).
//! - Short id `IAQ-XXYYZZ` from the last three MAC bytes, used in logs.

/// "IAQ-XXYYZZ".
pub type DeviceIdString = heapless::String<16>;

pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: a fixed, locally administered MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0x02, 0x1A, 0x0E, 0x5A, 0x30, 0x61]
}

/// EUI-48 → EUI-64.
pub fn eui64_from_mac(mac: &MacAddress) -> [u8; 8] {
    [mac[0], mac[1], mac[2], 0xFF, 0xFE, mac[3], mac[4], mac[5]]
}

pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    use core::fmt::Write;
    let _ = write!(id, "IAQ-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    id
}
