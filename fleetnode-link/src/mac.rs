use std::io;
use std::path::PathBuf;

use tokio::fs;

/// Read the hardware address of `interface` from sysfs
///
/// The address is returned normalized, see [`normalize_mac`].
pub async fn read_mac(interface: &str) -> io::Result<String> {
    let path = PathBuf::from("/sys/class/net").join(interface).join("address");
    let contents = fs::read_to_string(path).await?;
    let mac = normalize_mac(&contents);
    if mac.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no hardware address for {interface}"),
        ));
    }
    Ok(mac)
}

/// Upper case hex digits without separators, e.g. `5CCF7F0A1B2C`
pub fn normalize_mac(mac: &str) -> String {
    mac.trim()
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
