use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use fleetnode_util::types::ApiKey;

use crate::adapter::{AccessPoint, NetworkAdapter};

/// State of the network link
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Associating,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Associating => f.write_str("associating"),
            ConnectionState::Connected => f.write_str("connected"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LinkConfig {
    /// Fallback access point opened when association fails
    pub access_point: AccessPoint,
    /// How long to wait for a managed association
    pub association_timeout: Duration,
    /// How long the access point waits for an operator
    pub portal_timeout: Duration,
    /// Wait between failed attempts
    pub retry_backoff: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            access_point: AccessPoint::default(),
            association_timeout: Duration::from_millis(30_000),
            portal_timeout: Duration::from_millis(10_000),
            retry_backoff: Duration::from_millis(3_000),
        }
    }
}

/// Receives API keys submitted by an operator while the link is being set up
#[async_trait]
pub trait CredentialSink: Send {
    async fn api_key_saved(&mut self, api_key: ApiKey);
}

/// Connectivity manager
///
/// Owns the link state. [`Connectivity::step`] performs a single bounded
/// attempt and is what a scheduler should call while the link is down;
/// [`Connectivity::connect`] keeps stepping until the link is up.
pub struct Connectivity<N> {
    adapter: N,
    config: LinkConfig,
    state: ConnectionState,
}

impl<N: NetworkAdapter> Connectivity<N> {
    pub fn new(adapter: N, config: LinkConfig) -> Self {
        Self {
            adapter,
            config,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Perform one association attempt
    ///
    /// Tries the stored credentials first. If that fails, opens the
    /// configuration access point and, if an operator submits new
    /// credentials, stores them and tries once more. A submitted API key is
    /// handed to `sink` as soon as the credentials are stored.
    #[instrument(name = "link_step", skip_all, fields(state = %self.state))]
    pub async fn step<S: CredentialSink>(&mut self, sink: &mut S) -> ConnectionState {
        if self.state == ConnectionState::Connected {
            return self.state;
        }

        self.state = ConnectionState::Associating;
        if self.adapter.associate(self.config.association_timeout).await {
            info!("network associated");
            self.state = ConnectionState::Connected;
            return self.state;
        }

        debug!(
            ssid = %self.config.access_point.ssid,
            "association failed, opening configuration access point"
        );
        let submission = match self
            .adapter
            .serve_portal(&self.config.access_point, self.config.portal_timeout)
            .await
        {
            Ok(submission) => submission,
            Err(err) => {
                warn!("configuration access point failed: {err}");
                None
            }
        };

        if let Some(submission) = submission {
            info!(ssid = %submission.network.ssid, "received network credentials");
            if let Err(err) = self.adapter.save_credentials(&submission.network).await {
                warn!("failed to store network credentials: {err}");
            }
            if let Some(api_key) = submission.api_key.filter(|key| !key.is_empty()) {
                sink.api_key_saved(api_key).await;
            }

            if self.adapter.associate(self.config.association_timeout).await {
                info!("network associated");
                self.state = ConnectionState::Connected;
                return self.state;
            }
        }

        warn!("connection failed");
        self.state = ConnectionState::Disconnected;
        self.state
    }

    /// Keep stepping until the link is up
    ///
    /// There is no retry limit, failed steps are spaced by the configured
    /// backoff.
    pub async fn connect<S: CredentialSink>(&mut self, sink: &mut S) -> ConnectionState {
        loop {
            if self.step(sink).await == ConnectionState::Connected {
                return self.state;
            }

            tokio::time::sleep(self.config.retry_backoff).await;
        }
    }

    /// Check the link is still up, resetting the state on link loss
    pub async fn check(&mut self) -> ConnectionState {
        if self.state == ConnectionState::Connected && !self.adapter.is_associated().await {
            warn!("link lost");
            self.state = ConnectionState::Disconnected;
        }
        self.state
    }
}
