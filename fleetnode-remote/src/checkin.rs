use std::io;

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use fleetnode_identity::DeviceIdentity;
use fleetnode_link::ConnectionState;

use crate::config::{BuildInfo, DEFAULT_PORT, RegistrationConfig};
use crate::transport::Transport;

const REGISTER_PATH: &str = "/device/register";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {0}: {1}")]
    Connect(String, #[source] io::Error),

    #[error("failed to send check-in: {0}")]
    Write(#[source] io::Error),

    #[error("failed to read check-in response: {0}")]
    Read(#[source] io::Error),

    #[error("check-in encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Bytes received in answer to a check-in
///
/// Empty when the check-in was skipped or timed out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawResponse(Vec<u8>);

impl RawResponse {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for RawResponse {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

/*
    request {
        registration {
            mac
            firmware
            version
            commit
            owner
            alias
            udid?
            platform
        }
    }
*/
#[derive(Serialize)]
struct CheckinRequest<'a> {
    registration: Registration<'a>,
}

#[derive(Serialize)]
struct Registration<'a> {
    mac: &'a str,
    firmware: &'a str,
    version: &'a str,
    commit: &'a str,
    owner: &'a str,
    alias: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    udid: &'a str,
    platform: &'a str,
}

/// Checks the device in with the remote management service
pub struct RegistrationClient<T> {
    transport: T,
    config: RegistrationConfig,
    build: BuildInfo,
}

impl<T: Transport> RegistrationClient<T> {
    pub fn new(transport: T, config: RegistrationConfig, build: BuildInfo) -> Self {
        Self {
            transport,
            config,
            build,
        }
    }

    pub fn build(&self) -> &BuildInfo {
        &self.build
    }

    /// Announce the device and return whatever the remote answers
    ///
    /// Nothing is sent unless the link is up and the device has an API key,
    /// in which case the response is empty. A response that does not
    /// complete before the configured timeout is also reported as empty, so
    /// the caller simply tries again on its next cycle.
    #[instrument(name = "checkin", skip_all, err(level = "warn"))]
    pub async fn checkin(
        &self,
        state: ConnectionState,
        identity: &DeviceIdentity,
        mac: &str,
    ) -> Result<RawResponse, TransportError> {
        if state != ConnectionState::Connected {
            debug!("link is {state}, skipping check-in");
            return Ok(RawResponse::default());
        }

        if identity.api_key.is_empty() {
            warn!("no API key, skipping check-in");
            return Ok(RawResponse::default());
        }

        let body = serde_json::to_vec(&CheckinRequest {
            registration: Registration {
                mac,
                firmware: &self.build.firmware,
                version: &self.build.version,
                commit: &self.build.commit,
                owner: &identity.owner,
                alias: &identity.alias,
                udid: &identity.udid,
                platform: &self.build.platform,
            },
        })?;

        let endpoint = &self.config.endpoint;
        let host = endpoint.host().unwrap_or_default();
        let port = endpoint.port_or_default().unwrap_or(DEFAULT_PORT);

        if host.is_empty() {
            return Err(TransportError::Connect(
                endpoint.to_string(),
                io::Error::new(io::ErrorKind::InvalidInput, "endpoint has no host"),
            ));
        }

        let head = format!(
            "POST {REGISTER_PATH} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Authentication: {api_key}\r\n\
             Accept: application/json\r\n\
             Origin: device\r\n\
             Content-Type: application/json\r\n\
             User-Agent: {user_agent}\r\n\
             Content-Length: {len}\r\n\
             Connection: close\r\n\r\n",
            api_key = identity.api_key.as_str(),
            user_agent = self.config.user_agent,
            len = body.len(),
        );

        debug!(%host, port, "calling remote");
        let mut stream = self
            .transport
            .connect(host, port)
            .await
            .map_err(|err| TransportError::Connect(format!("{host}:{port}"), err))?;

        stream
            .write_all(head.as_bytes())
            .await
            .map_err(TransportError::Write)?;
        stream.write_all(&body).await.map_err(TransportError::Write)?;
        stream.flush().await.map_err(TransportError::Write)?;

        let deadline = Instant::now() + self.config.response_timeout;
        let mut buf = Vec::new();
        match tokio::time::timeout_at(deadline, stream.read_to_end(&mut buf)).await {
            Ok(Ok(len)) => {
                info!(len, "check-in complete");
                Ok(RawResponse::from(buf))
            }
            Ok(Err(err)) => Err(TransportError::Read(err)),
            Err(_) => {
                warn!(
                    "no response after {}ms, closing connection",
                    self.config.response_timeout.as_millis()
                );
                if let Err(err) = stream.shutdown().await {
                    debug!("shutdown failed: {err}");
                }
                Ok(RawResponse::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;

    use fleetnode_util::http::Uri;

    /// Transport handing out one end of an in-memory pipe
    #[derive(Default)]
    struct PipeTransport {
        stream: Mutex<Option<DuplexStream>>,
        connects: AtomicUsize,
        peer: Mutex<Option<(String, u16)>>,
    }

    impl PipeTransport {
        fn with_peer() -> (Self, DuplexStream) {
            let (client, server) = tokio::io::duplex(64 * 1024);
            let transport = Self {
                stream: Mutex::new(Some(client)),
                ..Default::default()
            };
            (transport, server)
        }
    }

    #[async_trait]
    impl Transport for PipeTransport {
        type Stream = DuplexStream;

        async fn connect(&self, host: &str, port: u16) -> io::Result<DuplexStream> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            *self.peer.lock().unwrap() = Some((host.to_string(), port));
            self.stream
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))
        }
    }

    fn build() -> BuildInfo {
        BuildInfo {
            firmware: "fleetnode".to_string(),
            version: "0.1.0".to_string(),
            commit: "abc123".to_string(),
            platform: "linux-x86_64".to_string(),
        }
    }

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            udid: "dev-123".into(),
            owner: "tenantA".to_string(),
            alias: "kitchen".to_string(),
            api_key: "abcdefghij".into(),
        }
    }

    /// Read one request off the pipe and return its head and JSON body
    async fn read_request(server: &mut DuplexStream) -> (String, Value) {
        let mut req = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = server.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before the request completed");
            req.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&req);
            if let Some((head, body)) = text.split_once("\r\n\r\n") {
                let len: usize = head
                    .lines()
                    .find_map(|l| l.strip_prefix("Content-Length: "))
                    .unwrap()
                    .parse()
                    .unwrap();
                if body.len() >= len {
                    return (head.to_string(), serde_json::from_str(body).unwrap());
                }
            }
        }
    }

    fn serve(mut server: DuplexStream, response: &'static str) -> JoinHandle<(String, Value)> {
        tokio::spawn(async move {
            let req = read_request(&mut server).await;
            server.write_all(response.as_bytes()).await.unwrap();
            req
        })
    }

    #[tokio::test]
    async fn test_checkin_while_disconnected_does_not_touch_transport() {
        let (transport, _server) = PipeTransport::with_peer();
        let client = RegistrationClient::new(transport, RegistrationConfig::default(), build());

        for state in [ConnectionState::Disconnected, ConnectionState::Associating] {
            let res = client.checkin(state, &identity(), "5CCF7F00AA11").await.unwrap();
            assert!(res.is_empty());
        }

        assert_eq!(client.transport.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_checkin_without_api_key_does_not_touch_transport() {
        let (transport, _server) = PipeTransport::with_peer();
        let client = RegistrationClient::new(transport, RegistrationConfig::default(), build());
        let mut id = identity();
        id.api_key = "".into();

        let res = client
            .checkin(ConnectionState::Connected, &id, "5CCF7F00AA11")
            .await
            .unwrap();

        assert!(res.is_empty());
        assert_eq!(client.transport.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_checkin_sends_registration_and_returns_response() {
        let (transport, server) = PipeTransport::with_peer();
        let client = RegistrationClient::new(transport, RegistrationConfig::default(), build());
        let peer = serve(
            server,
            "HTTP/1.1 200 OK\r\n\r\n{\"registration\":{\"status\":\"OK\"}}",
        );

        let res = client
            .checkin(ConnectionState::Connected, &identity(), "5CCF7F00AA11")
            .await
            .unwrap();
        let (head, body) = peer.await.unwrap();

        assert_eq!(
            res.as_bytes(),
            b"HTTP/1.1 200 OK\r\n\r\n{\"registration\":{\"status\":\"OK\"}}"
        );
        assert_eq!(
            *client.transport.peer.lock().unwrap(),
            Some(("thinx.cloud".to_string(), 7442))
        );

        let mut lines = head.lines();
        assert_eq!(lines.next(), Some("POST /device/register HTTP/1.1"));
        let headers: Vec<&str> = lines.collect();
        for expected in [
            "Host: thinx.cloud",
            "Authentication: abcdefghij",
            "Accept: application/json",
            "Origin: device",
            "Content-Type: application/json",
            "User-Agent: FleetNode-Client",
            "Connection: close",
        ] {
            assert!(headers.contains(&expected), "missing header {expected}");
        }

        assert_eq!(
            body,
            json!({
                "registration": {
                    "mac": "5CCF7F00AA11",
                    "firmware": "fleetnode",
                    "version": "0.1.0",
                    "commit": "abc123",
                    "owner": "tenantA",
                    "alias": "kitchen",
                    "udid": "dev-123",
                    "platform": "linux-x86_64",
                }
            })
        );
    }

    #[tokio::test]
    async fn test_checkin_omits_empty_udid() {
        let (transport, server) = PipeTransport::with_peer();
        let client = RegistrationClient::new(transport, RegistrationConfig::default(), build());
        let peer = serve(server, "");
        let mut id = identity();
        id.udid = "".into();

        client
            .checkin(ConnectionState::Connected, &id, "5CCF7F00AA11")
            .await
            .unwrap();
        let (_, body) = peer.await.unwrap();

        assert!(body["registration"].get("udid").is_none());
    }

    #[tokio::test]
    async fn test_checkin_uses_configured_endpoint() {
        let (transport, server) = PipeTransport::with_peer();
        let config = RegistrationConfig {
            endpoint: Uri::from_static("http://api.example.com:8080"),
            ..Default::default()
        };
        let client = RegistrationClient::new(transport, config, build());
        let peer = serve(server, "");

        client
            .checkin(ConnectionState::Connected, &identity(), "5CCF7F00AA11")
            .await
            .unwrap();
        let (head, _) = peer.await.unwrap();

        assert!(head.contains("Host: api.example.com\r\n"));
        assert_eq!(
            *client.transport.peer.lock().unwrap(),
            Some(("api.example.com".to_string(), 8080))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkin_times_out_with_empty_response() {
        let (transport, mut server) = PipeTransport::with_peer();
        let client = RegistrationClient::new(transport, RegistrationConfig::default(), build());

        let start = Instant::now();
        let res = client
            .checkin(ConnectionState::Connected, &identity(), "5CCF7F00AA11")
            .await
            .unwrap();

        assert!(res.is_empty());
        assert_eq!(start.elapsed(), Duration::from_millis(10_000));

        // the remote sees the request followed by the end of the stream
        read_request(&mut server).await;
        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let transport = PipeTransport::default();
        let client = RegistrationClient::new(transport, RegistrationConfig::default(), build());

        let res = client
            .checkin(ConnectionState::Connected, &identity(), "5CCF7F00AA11")
            .await;

        assert!(matches!(res, Err(TransportError::Connect(..))));
    }
}
