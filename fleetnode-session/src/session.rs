use fleetnode_identity::DeviceIdentity;

/// Published on the status channel once the session is up and on every
/// heartbeat
pub const CONNECTED_PAYLOAD: &str = r#"{"status":"connected"}"#;

/// Last will left with the broker
pub const DISCONNECTED_PAYLOAD: &str = r#"{"status":"disconnected"}"#;

/// Channels of the device messaging session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessagingSession {
    channel: String,
    status_channel: String,
    connected: bool,
}

impl MessagingSession {
    /// Derive the channels from the identity
    ///
    /// Must be called again every time `owner` or `udid` change.
    pub fn derive(identity: &DeviceIdentity) -> Self {
        let channel = format!("/{}/{}", identity.owner, identity.udid);
        let status_channel = format!("{channel}/status");
        Self {
            channel,
            status_channel,
            connected: false,
        }
    }

    /// Channel the device listens on
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Channel the device reports its status on
    pub fn status_channel(&self) -> &str {
        &self.status_channel
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}
