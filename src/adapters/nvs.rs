//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`].
//!
//! - The measurement interval lives in namespace `iaqnode`, key
//!   `MEAS_INTERVAL`, as a 2-byte little-endian blob.
//! - Every subsystem uses its own namespace.
//! - ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - Off-target the backend is an in-memory map that survives for the
//!   lifetime of the adapter, which is what the simulation's "reboot" needs.

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::{BOOT_INTERVAL_RANGE, DEFAULT_MEAS_INTERVAL_SECS, NodeConfig, RUNTIME_INTERVAL_RANGE};
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

pub const CONFIG_NAMESPACE: &str = "iaqnode";
pub const INTERVAL_KEY: &str = "MEAS_INTERVAL";

/// NVS namespace and key names are limited to 15 characters.
#[cfg(target_os = "espidf")]
const NVS_NAME_MAX: usize = 15;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: HashMap<String, Vec<u8>>,
}

impl NvsAdapter {
    /// Initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the partition is erased
    /// and re-initialised.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any other NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: in-memory backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: HashMap::new(),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Null-terminated copy of an NVS name.
    #[cfg(target_os = "espidf")]
    fn c_name(name: &str) -> [u8; NVS_NAME_MAX + 1] {
        let mut buf = [0u8; NVS_NAME_MAX + 1];
        let bytes = name.as_bytes();
        let len = bytes.len().min(NVS_NAME_MAX);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = Self::c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

fn validate_interval(secs: u16) -> Result<(), ConfigError> {
    if RUNTIME_INTERVAL_RANGE.contains(&secs) {
        Ok(())
    } else {
        Err(ConfigError::ValidationFailed(
            "measurement interval must be 30–1800 s",
        ))
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&mut self) -> Result<NodeConfig, ConfigError> {
        let mut config = NodeConfig::default();
        let mut buf = [0u8; 2];

        match self.read(CONFIG_NAMESPACE, INTERVAL_KEY, &mut buf) {
            Ok(2) => {
                let secs = u16::from_le_bytes(buf);
                if BOOT_INTERVAL_RANGE.contains(&secs) {
                    config.measurement_interval_secs = secs;
                    info!("NvsAdapter: measurement interval {} s", secs);
                } else {
                    warn!(
                        "NvsAdapter: stored interval {} s outside boot range, using {} s",
                        secs, DEFAULT_MEAS_INTERVAL_SECS
                    );
                }
            }
            Ok(len) => {
                warn!("NvsAdapter: interval blob has {} bytes, using default", len);
            }
            Err(StorageError::BufferTooSmall) => {
                warn!("NvsAdapter: interval blob oversized, using default");
            }
            Err(StorageError::NotFound) => {
                info!("NvsAdapter: no stored interval, seeding default");
                self.write(
                    CONFIG_NAMESPACE,
                    INTERVAL_KEY,
                    &DEFAULT_MEAS_INTERVAL_SECS.to_le_bytes(),
                )?;
            }
            Err(e) => return Err(e.into()),
        }

        Ok(config)
    }

    fn save_interval(&mut self, secs: u16) -> Result<(), ConfigError> {
        validate_interval(secs)?;
        self.write(CONFIG_NAMESPACE, INTERVAL_KEY, &secs.to_le_bytes())?;
        info!("NvsAdapter: measurement interval {} s saved", secs);
        Ok(())
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let data = self
                .store
                .get(&Self::composite_key(namespace, key))
                .ok_or(StorageError::NotFound)?;
            let dst = buf
                .get_mut(..data.len())
                .ok_or(StorageError::BufferTooSmall)?;
            dst.copy_from_slice(data);
            Ok(data.len())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let key = Self::c_name(key);
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(e) if e == ESP_ERR_NVS_INVALID_LENGTH => Err(StorageError::BufferTooSmall),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .insert(Self::composite_key(namespace, key), data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let key = Self::c_name(key);
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|e| {
                if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                    StorageError::Full
                } else {
                    StorageError::IoError
                }
            })
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .contains_key(&Self::composite_key(namespace, key))
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let key = Self::c_name(key);
                let ret = unsafe {
                    nvs_find_key(handle, key.as_ptr() as *const _, core::ptr::null_mut())
                };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }
}
