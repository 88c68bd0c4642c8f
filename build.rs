fn main() {
    println!("cargo:rerun-if-env-changed=IAQNODE_JITTER_MS");

    // Only the ESP-IDF build needs the sysenv propagation; host builds
    // (simulation, tests) have no embuild in scope.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
