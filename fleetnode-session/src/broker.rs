use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use fleetnode_util::types::ApiKey;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("broker refused the connection: {0:?}")]
    Refused(rumqttc::ConnectReturnCode),

    #[error("broker did not answer in time")]
    Timeout,

    #[error("broker request failed: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("not connected to the broker")]
    NotConnected,
}

/// Message left with the broker, published when the device goes away
/// without disconnecting
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    pub client_id: String,
    pub username: String,
    pub password: ApiKey,
    pub keep_alive: Duration,
    pub clean_session: bool,
    pub last_will: LastWill,
}

/// Message received from the broker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Connection to a publish/subscribe broker
#[async_trait]
pub trait Broker: Send {
    /// Connect, replacing any previous connection
    async fn connect(&mut self, options: &ConnectOptions) -> Result<(), BrokerError>;

    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError>;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;

    fn is_connected(&self) -> bool;

    /// Messages received since the last call
    fn drain(&mut self) -> Vec<InboundMessage>;

    async fn disconnect(&mut self);
}
