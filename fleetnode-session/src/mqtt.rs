use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::broker::{Broker, BrokerError, ConnectOptions, InboundMessage};

// Capacity of the request queue between the client and the event loop
const REQUEST_CAPACITY: usize = 16;

struct Connection {
    client: AsyncClient,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
    status: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

/// MQTT broker connection
///
/// Once connected, the event loop is polled by a background task that
/// forwards incoming publishes and notices when the connection drops. The
/// task does not reconnect, the owner is expected to call
/// [`Broker::connect`] again.
pub struct MqttBroker {
    host: String,
    port: u16,
    connect_timeout: Duration,
    conn: Option<Connection>,
}

impl MqttBroker {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            conn: None,
        }
    }

    fn client(&self) -> Result<&AsyncClient, BrokerError> {
        match &self.conn {
            Some(conn) if *conn.status.borrow() => Ok(&conn.client),
            _ => Err(BrokerError::NotConnected),
        }
    }
}

// Poll the event loop until the broker acknowledges the connection
async fn wait_connack(eventloop: &mut EventLoop) -> Result<(), BrokerError> {
    loop {
        match eventloop.poll().await? {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code != ConnectReturnCode::Success {
                    return Err(BrokerError::Refused(ack.code));
                }
                return Ok(());
            }
            event => trace!(?event, "waiting for connack"),
        }
    }
}

async fn forward(
    mut eventloop: EventLoop,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    status: watch::Sender<bool>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                trace!(topic = %publish.topic, len = publish.payload.len(), "message received");
                let msg = InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload,
                };
                if inbound.send(msg).is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect) | Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("disconnected from broker");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!("broker connection lost: {err}");
                break;
            }
        }
    }

    status.send_replace(false);
}

#[async_trait]
impl Broker for MqttBroker {
    #[instrument(name = "mqtt_connect", skip_all, fields(host = %self.host, port = self.port))]
    async fn connect(&mut self, options: &ConnectOptions) -> Result<(), BrokerError> {
        self.disconnect().await;

        let mut mqtt = MqttOptions::new(&options.client_id, &self.host, self.port);
        mqtt.set_credentials(&options.username, options.password.as_str())
            .set_keep_alive(options.keep_alive)
            .set_clean_session(options.clean_session)
            .set_last_will(rumqttc::LastWill::new(
                &options.last_will.topic,
                options.last_will.payload.clone(),
                QoS::AtLeastOnce,
                false,
            ));

        let (client, mut eventloop) = AsyncClient::new(mqtt, REQUEST_CAPACITY);
        tokio::time::timeout(self.connect_timeout, wait_connack(&mut eventloop))
            .await
            .map_err(|_| BrokerError::Timeout)??;
        info!("connected to broker");

        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(true);
        let task = tokio::spawn(forward(eventloop, inbound_tx, status_tx));

        self.conn = Some(Connection {
            client,
            inbound,
            status,
            task,
        });
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        self.client()?.subscribe(topic, QoS::AtLeastOnce).await?;
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.client()?
            .publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client().is_ok()
    }

    fn drain(&mut self) -> Vec<InboundMessage> {
        let mut messages = Vec::new();
        if let Some(conn) = self.conn.as_mut() {
            while let Ok(msg) = conn.inbound.try_recv() {
                messages.push(msg);
            }
        }
        messages
    }

    async fn disconnect(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        let connected = *conn.status.borrow();
        if connected && let Err(err) = conn.client.disconnect().await {
            debug!("disconnect request failed: {err}");
        }

        // give the event loop a chance to flush the disconnect
        let abort = conn.task.abort_handle();
        if tokio::time::timeout(Duration::from_secs(1), conn.task)
            .await
            .is_err()
        {
            abort.abort();
        }
    }
}
