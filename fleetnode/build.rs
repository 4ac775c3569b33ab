//! Compile time description of the build
fn main() {
    // identifier of the running build, compared against the commit announced
    // with a firmware update
    println!("cargo::rerun-if-env-changed=FLEETNODE_COMMIT_ID");
    let commit = std::env::var("FLEETNODE_COMMIT_ID").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo::rustc-env=FLEETNODE_COMMIT_ID={commit}");

    // built-in identity, used until the device has a stored one
    for var in [
        "FLEETNODE_DEFAULT_UDID",
        "FLEETNODE_DEFAULT_OWNER",
        "FLEETNODE_DEFAULT_ALIAS",
        "FLEETNODE_DEFAULT_API_KEY",
    ] {
        println!("cargo::rerun-if-env-changed={var}");
    }
}
