use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::identity::{DeviceIdentity, IdentityStore, RecordMedium};
use crate::link::{ConnectionState, Connectivity, CredentialSink, NetworkAdapter};
use crate::remote::{Action, Interpreter, RegistrationClient, Transport};
use crate::session::{Broker, Messenger};
use crate::update::{ImageApplier, UpdateController, UpdateOutcome};
use crate::util::types::ApiKey;

/// What the caller should do after an agent step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// A new image was applied, the process must exit so it is restarted
    Restart,
}

/// Persists API keys submitted by an operator while the link comes up
struct IdentitySink<'a, M> {
    identity: &'a mut DeviceIdentity,
    store: &'a mut IdentityStore<M>,
}

#[async_trait]
impl<'a, M: RecordMedium> CredentialSink for IdentitySink<'a, M> {
    async fn api_key_saved(&mut self, api_key: ApiKey) {
        if !self.identity.set_api_key(api_key) {
            return;
        }

        info!("received new API key");
        if let Err(err) = self.store.save(&*self.identity).await {
            warn!("continuing with in-memory identity: {err}");
        }
    }
}

/// The device agent
///
/// Owns the identity and every component, all of them are driven from
/// [`Agent::start`] and then [`Agent::tick`], one call at a time.
pub struct Agent<M, N, T, A, B> {
    identity: DeviceIdentity,
    store: IdentityStore<M>,
    link: Connectivity<N>,
    registration: RegistrationClient<T>,
    interpreter: Interpreter,
    updates: UpdateController<A>,
    messenger: Messenger<B>,
    mac: String,
    checkin_interval: Duration,
    // None means a check-in is due
    next_checkin: Option<Instant>,
}

impl<M, N, T, A, B> Agent<M, N, T, A, B>
where
    M: RecordMedium,
    N: NetworkAdapter,
    T: Transport,
    A: ImageApplier,
    B: Broker,
{
    pub fn new(
        store: IdentityStore<M>,
        link: Connectivity<N>,
        registration: RegistrationClient<T>,
        updates: UpdateController<A>,
        messenger: Messenger<B>,
        mac: impl Into<String>,
        checkin_interval: Duration,
    ) -> Self {
        let interpreter = Interpreter::new(registration.build().commit.clone());
        Self {
            identity: DeviceIdentity::default(),
            store,
            link,
            registration,
            interpreter,
            updates,
            messenger,
            mac: mac.into(),
            checkin_interval,
            next_checkin: None,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Bring the device up
    ///
    /// Loads the identity, waits for the network, checks in and opens the
    /// messaging session.
    #[instrument(name = "agent_start", skip_all)]
    pub async fn start(&mut self) -> Flow {
        self.identity = self.store.load().await;
        info!(udid = %self.identity.udid, alias = %self.identity.alias, "starting");

        let mut sink = IdentitySink {
            identity: &mut self.identity,
            store: &mut self.store,
        };
        self.link.connect(&mut sink).await;

        if self.checkin().await == Flow::Restart {
            return Flow::Restart;
        }

        self.open_session().await;
        Flow::Continue
    }

    /// One pass of the periodic loop
    ///
    /// Makes sure the link is up, checks in when due, keeps the messaging
    /// session open and handles whatever the remote pushed on it, then
    /// publishes the heartbeat.
    #[instrument(name = "agent_tick", skip_all)]
    pub async fn tick(&mut self) -> Flow {
        if self.link.check().await != ConnectionState::Connected {
            let mut sink = IdentitySink {
                identity: &mut self.identity,
                store: &mut self.store,
            };
            if self.link.step(&mut sink).await != ConnectionState::Connected {
                debug!("link is down");
                return Flow::Continue;
            }
        }

        if self.checkin_due() && self.checkin().await == Flow::Restart {
            return Flow::Restart;
        }

        if !self.messenger.is_connected() {
            self.open_session().await;
        }

        for payload in self.messenger.drain() {
            let action = self.interpreter.interpret(&payload);
            if self.dispatch(action).await == Flow::Restart {
                return Flow::Restart;
            }
        }

        if self.messenger.is_connected() && !self.messenger.publish_heartbeat().await {
            debug!("heartbeat not sent, session will be reopened");
        }

        Flow::Continue
    }

    /// Close the messaging session
    pub async fn shutdown(&mut self) {
        self.messenger.close().await;
    }

    fn checkin_due(&self) -> bool {
        self.next_checkin.is_none_or(|next| Instant::now() >= next)
    }

    async fn checkin(&mut self) -> Flow {
        let res = self
            .registration
            .checkin(self.link.state(), &self.identity, &self.mac)
            .await;

        let raw = match res {
            Ok(raw) if !raw.is_empty() => raw,
            // nothing to act on, retry on the next tick
            _ => {
                self.next_checkin = None;
                return Flow::Continue;
            }
        };

        self.next_checkin = Some(Instant::now() + self.checkin_interval);
        let action = self.interpreter.interpret(raw.as_bytes());
        self.dispatch(action).await
    }

    async fn dispatch(&mut self, action: Action) -> Flow {
        match action {
            Action::None => Flow::Continue,
            Action::UpdateIdentity(update) => {
                let changes = update.apply(&mut self.identity);
                if changes.changed {
                    info!(udid = %self.identity.udid, owner = %self.identity.owner, alias = %self.identity.alias, "identity updated");
                }

                if let Err(err) = self.store.save(&self.identity).await {
                    warn!("continuing with in-memory identity: {err}");
                }

                if changes.channel && self.messenger.session().is_some() {
                    self.messenger.close().await;
                    self.open_session().await;
                }
                Flow::Continue
            }
            Action::TriggerUpdate(url) => match self.updates.apply(&url).await {
                UpdateOutcome::Ok => {
                    info!("update applied");
                    self.messenger.close().await;
                    Flow::Restart
                }
                outcome => {
                    warn!("update not applied: {outcome:?}");
                    Flow::Continue
                }
            },
        }
    }

    async fn open_session(&mut self) {
        if let Err(err) = self.messenger.open(&self.identity).await {
            debug!("messaging session not open: {err}");
        }
    }
}
