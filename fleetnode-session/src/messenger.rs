use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};

use fleetnode_identity::DeviceIdentity;

use crate::broker::{Broker, BrokerError, ConnectOptions, LastWill};
use crate::session::{CONNECTED_PAYLOAD, DISCONNECTED_PAYLOAD, MessagingSession};

const KEEP_ALIVE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("device has no identifier yet")]
    NoIdentity,

    #[error("failed to connect to broker: {0}")]
    Connect(#[source] BrokerError),

    #[error("failed to subscribe to {0}: {1}")]
    Subscribe(String, #[source] BrokerError),

    #[error("failed to publish on {0}: {1}")]
    Publish(String, #[source] BrokerError),
}

/// Messaging session of the device over a [`Broker`]
pub struct Messenger<B> {
    broker: B,
    client_id: String,
    session: Option<MessagingSession>,
}

impl<B: Broker> Messenger<B> {
    /// `client_id` identifies this device to the broker, normally its MAC
    pub fn new(broker: B, client_id: impl Into<String>) -> Self {
        Self {
            broker,
            client_id: client_id.into(),
            session: None,
        }
    }

    pub fn session(&self) -> Option<&MessagingSession> {
        self.session.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_connected()) && self.broker.is_connected()
    }

    /// Open the session for `identity`
    ///
    /// Connects to the broker, subscribes to the device channel and
    /// announces the device on its status channel. An already connected
    /// session for the same channel is left untouched.
    #[instrument(name = "session_open", skip_all, fields(udid = %identity.udid), err(level = "warn"))]
    pub async fn open(
        &mut self,
        identity: &DeviceIdentity,
    ) -> Result<&MessagingSession, SessionError> {
        if identity.udid.is_empty() {
            return Err(SessionError::NoIdentity);
        }

        let mut session = MessagingSession::derive(identity);
        let current = self.is_connected()
            && self
                .session
                .as_ref()
                .is_some_and(|s| s.channel() == session.channel());

        if !current {
            if let Some(stale) = self.session.take() {
                debug!(channel = stale.channel(), "replacing session");
            }

            let options = ConnectOptions {
                client_id: self.client_id.clone(),
                username: identity.udid.to_string(),
                password: identity.api_key.clone(),
                keep_alive: KEEP_ALIVE,
                clean_session: true,
                last_will: LastWill {
                    topic: session.channel().to_string(),
                    payload: Bytes::from_static(DISCONNECTED_PAYLOAD.as_bytes()),
                },
            };

            self.broker
                .connect(&options)
                .await
                .map_err(SessionError::Connect)?;

            self.broker
                .subscribe(session.channel())
                .await
                .map_err(|err| SessionError::Subscribe(session.channel().to_string(), err))?;

            self.broker
                .publish(session.status_channel(), CONNECTED_PAYLOAD.as_bytes())
                .await
                .map_err(|err| SessionError::Publish(session.status_channel().to_string(), err))?;

            session.set_connected(true);
            info!(channel = session.channel(), "messaging session open");
            self.session = Some(session);
        }

        self.session.as_ref().ok_or(SessionError::NoIdentity)
    }

    /// Publish the connected status, returns whether it was sent
    pub async fn publish_heartbeat(&mut self) -> bool {
        if !self.is_connected() {
            if let Some(session) = self.session.as_mut() {
                session.set_connected(false);
            }
            return false;
        }

        let Some(session) = self.session.as_mut() else {
            return false;
        };

        match self
            .broker
            .publish(session.status_channel(), CONNECTED_PAYLOAD.as_bytes())
            .await
        {
            Ok(()) => {
                trace!(channel = session.status_channel(), "heartbeat");
                true
            }
            Err(err) => {
                warn!("heartbeat failed: {err}");
                session.set_connected(false);
                false
            }
        }
    }

    /// Payloads received on the device channel since the last call
    pub fn drain(&mut self) -> Vec<Bytes> {
        let messages = self.broker.drain();
        let Some(session) = &self.session else {
            return Vec::new();
        };

        messages
            .into_iter()
            .filter_map(|msg| {
                if msg.topic == session.channel() {
                    Some(msg.payload)
                } else {
                    debug!(topic = %msg.topic, "ignoring message");
                    None
                }
            })
            .collect()
    }

    /// Disconnect and forget the session
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(channel = session.channel(), "closing messaging session");
            self.broker.disconnect().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use crate::broker::InboundMessage;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Connect(ConnectOptions),
        Subscribe(String),
        Publish(String, String),
        Disconnect,
    }

    /// Broker recording every call
    #[derive(Default)]
    struct RecordingBroker {
        calls: Vec<Call>,
        connected: bool,
        refuse: bool,
        inbound: Vec<InboundMessage>,
    }

    #[async_trait]
    impl Broker for RecordingBroker {
        async fn connect(&mut self, options: &ConnectOptions) -> Result<(), BrokerError> {
            self.calls.push(Call::Connect(options.clone()));
            if self.refuse {
                return Err(BrokerError::Timeout);
            }
            self.connected = true;
            Ok(())
        }

        async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
            self.calls.push(Call::Subscribe(topic.to_string()));
            Ok(())
        }

        async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
            if !self.connected {
                return Err(BrokerError::NotConnected);
            }
            self.calls.push(Call::Publish(
                topic.to_string(),
                String::from_utf8_lossy(payload).into_owned(),
            ));
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn drain(&mut self) -> Vec<InboundMessage> {
            std::mem::take(&mut self.inbound)
        }

        async fn disconnect(&mut self) {
            self.calls.push(Call::Disconnect);
            self.connected = false;
        }
    }

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            udid: "u".into(),
            owner: "o".to_string(),
            alias: "kitchen".to_string(),
            api_key: "abcdefghij".into(),
        }
    }

    fn messenger() -> Messenger<RecordingBroker> {
        Messenger::new(RecordingBroker::default(), "5CCF7F00AA11")
    }

    #[tokio::test]
    async fn test_open_connects_subscribes_and_announces() {
        let mut messenger = messenger();

        let session = messenger.open(&identity()).await.unwrap();
        assert_eq!(session.channel(), "/o/u");
        assert!(session.is_connected());

        assert_eq!(
            messenger.broker.calls,
            vec![
                Call::Connect(ConnectOptions {
                    client_id: "5CCF7F00AA11".to_string(),
                    username: "u".to_string(),
                    password: "abcdefghij".into(),
                    keep_alive: Duration::from_secs(30),
                    clean_session: true,
                    last_will: LastWill {
                        topic: "/o/u".to_string(),
                        payload: Bytes::from_static(b"{\"status\":\"disconnected\"}"),
                    },
                }),
                Call::Subscribe("/o/u".to_string()),
                Call::Publish(
                    "/o/u/status".to_string(),
                    "{\"status\":\"connected\"}".to_string()
                ),
            ]
        );
        assert!(messenger.is_connected());
    }

    #[tokio::test]
    async fn test_open_without_udid_does_not_touch_broker() {
        let mut messenger = messenger();
        let mut id = identity();
        id.udid = "".into();

        let res = messenger.open(&id).await;

        assert!(matches!(res, Err(SessionError::NoIdentity)));
        assert!(messenger.broker.calls.is_empty());
    }

    #[tokio::test]
    async fn test_open_twice_keeps_connected_session() {
        let mut messenger = messenger();
        messenger.open(&identity()).await.unwrap();
        messenger.open(&identity()).await.unwrap();

        let connects = messenger
            .broker
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Connect(_)))
            .count();
        assert_eq!(connects, 1);
    }

    #[tokio::test]
    async fn test_open_reconnects_after_channel_change() {
        let mut messenger = messenger();
        messenger.open(&identity()).await.unwrap();

        let mut id = identity();
        id.owner = "p".to_string();
        let session = messenger.open(&id).await.unwrap();

        assert_eq!(session.channel(), "/p/u");
        assert_eq!(
            messenger.broker.calls.last(),
            Some(&Call::Publish(
                "/p/u/status".to_string(),
                "{\"status\":\"connected\"}".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_refused_connection_is_reported_and_retried() {
        let mut messenger = messenger();
        messenger.broker.refuse = true;

        let res = messenger.open(&identity()).await;
        assert!(matches!(res, Err(SessionError::Connect(BrokerError::Timeout))));
        assert!(!messenger.is_connected());

        messenger.broker.refuse = false;
        messenger.open(&identity()).await.unwrap();
        assert!(messenger.is_connected());
    }

    #[tokio::test]
    async fn test_heartbeat_publishes_on_status_channel() {
        let mut messenger = messenger();
        messenger.open(&identity()).await.unwrap();

        assert!(messenger.publish_heartbeat().await);
        assert_eq!(
            messenger.broker.calls.last(),
            Some(&Call::Publish(
                "/o/u/status".to_string(),
                "{\"status\":\"connected\"}".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_heartbeat_fails_when_broker_is_gone() {
        let mut messenger = messenger();
        assert!(!messenger.publish_heartbeat().await);

        messenger.open(&identity()).await.unwrap();
        messenger.broker.connected = false;

        assert!(!messenger.publish_heartbeat().await);
        assert!(!messenger.session().unwrap().is_connected());
    }

    #[tokio::test]
    async fn test_drain_keeps_device_channel_only() {
        let mut messenger = messenger();
        messenger.open(&identity()).await.unwrap();
        messenger.broker.inbound = vec![
            InboundMessage {
                topic: "/o/u".to_string(),
                payload: Bytes::from_static(b"{\"registration\":{}}"),
            },
            InboundMessage {
                topic: "/o/other".to_string(),
                payload: Bytes::from_static(b"ignored"),
            },
        ];

        assert_eq!(
            messenger.drain(),
            vec![Bytes::from_static(b"{\"registration\":{}}")]
        );
        assert!(messenger.drain().is_empty());
    }

    #[tokio::test]
    async fn test_close_disconnects_and_forgets_session() {
        let mut messenger = messenger();
        messenger.open(&identity()).await.unwrap();

        messenger.close().await;

        assert_eq!(messenger.broker.calls.last(), Some(&Call::Disconnect));
        assert!(messenger.session().is_none());
        assert!(!messenger.is_connected());
    }
}
