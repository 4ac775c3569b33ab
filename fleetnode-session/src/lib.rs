/*
Publish/subscribe session with the message broker of the remote.

The session is keyed by the device identity: the device listens on its own
channel and announces itself on the matching status channel. Its last will is
left on the device channel so the remote learns when it goes away.
*/

mod broker;
mod messenger;
mod mqtt;
mod session;

pub use broker::{Broker, BrokerError, ConnectOptions, InboundMessage, LastWill};
pub use messenger::{Messenger, SessionError};
pub use mqtt::MqttBroker;
pub use session::{CONNECTED_PAYLOAD, DISCONNECTED_PAYLOAD, MessagingSession};
