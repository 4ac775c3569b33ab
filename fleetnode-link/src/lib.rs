/*
Network connectivity for the node.

The connectivity manager takes the device from no network to an associated
link. When the stored network credentials do not work it opens a local
configuration access point where an operator can submit new credentials,
optionally together with the API key for the remote management service.
*/

mod adapter;
mod mac;
mod manager;
mod nmcli;
mod portal;

pub use adapter::{AccessPoint, LinkError, NetworkAdapter, PortalSubmission, WifiCredentials};
pub use mac::{normalize_mac, read_mac};
pub use manager::{ConnectionState, Connectivity, CredentialSink, LinkConfig};
pub use nmcli::NmcliAdapter;
pub use portal::serve_portal;
