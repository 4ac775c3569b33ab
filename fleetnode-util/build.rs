//! Compile time configurations for the util crate
fn main() {
    // the FLEETNODE_PKG_NAME variable is used to create local folders under
    // `~/.config`, `~/.local/state` and other directories. Do not change the name
    // unless you know what you are doing as this means the device identity
    // record will no longer be found and the node will check in as a new device.
    println!("cargo::rustc-env=FLEETNODE_PKG_NAME=fleetnode");
}
