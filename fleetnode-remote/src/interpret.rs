use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use fleetnode_identity::IdentityUpdate;

/// What the agent should do after hearing from the remote
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    None,
    UpdateIdentity(IdentityUpdate),
    TriggerUpdate(String),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no registration object in payload")]
    NoObject,

    #[error("malformed registration payload: {0}")]
    Json(#[from] serde_json::Error),
}

/*
    response {
        registration {
            success?
            status?     OK | FIRMWARE_UPDATE
            alias?
            owner?
            udid?
            mac?
            commit?
            version?
            url?
        }
    }
*/
#[derive(Debug, Deserialize)]
struct Envelope {
    registration: RegistrationResponse,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RegistrationResponse {
    success: Option<bool>,
    status: Option<Status>,
    alias: Option<String>,
    owner: Option<String>,
    udid: Option<String>,
    mac: Option<String>,
    commit: Option<String>,
    version: Option<String>,
    url: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Deserialize)]
enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "FIRMWARE_UPDATE")]
    FirmwareUpdate,
    #[serde(other)]
    Unknown,
}

const MARKER: &[u8] = b"\"registration\"";

// Start of the first object opening with the registration key, wherever it
// is nested. An HTTP head or any wrapper before it is skipped.
fn payload(raw: &[u8]) -> Option<&[u8]> {
    raw.iter()
        .enumerate()
        .filter(|(_, b)| **b == b'{')
        .map(|(pos, _)| pos)
        .find(|&pos| {
            let rest = &raw[pos + 1..];
            let key = rest
                .iter()
                .position(|b| !b.is_ascii_whitespace())
                .map_or(&rest[rest.len()..], |start| &rest[start..]);
            key.starts_with(MARKER)
        })
        .map(|pos| &raw[pos..])
}

// Only the first complete JSON value counts, trailing bytes are ignored
fn parse(raw: &[u8]) -> Result<RegistrationResponse, ParseError> {
    let payload = payload(raw).ok_or(ParseError::NoObject)?;
    let envelope = serde_json::Deserializer::from_slice(payload)
        .into_iter::<Envelope>()
        .next()
        .ok_or(ParseError::NoObject)??;

    Ok(envelope.registration)
}

/// Decides what a registration response, or a message pushed on the device
/// channel, asks the device to do
#[derive(Clone, Debug)]
pub struct Interpreter {
    running_commit: String,
}

impl Interpreter {
    pub fn new(running_commit: impl Into<String>) -> Self {
        Self {
            running_commit: running_commit.into(),
        }
    }

    #[instrument(name = "interpret", skip_all, fields(len = raw.len()))]
    pub fn interpret(&self, raw: &[u8]) -> Action {
        if raw.is_empty() {
            return Action::None;
        }

        let res = match parse(raw) {
            Ok(res) => res,
            Err(err) => {
                warn!("ignoring response: {err}");
                return Action::None;
            }
        };

        if let Some(success) = res.success {
            debug!(success, "registration response");
        }

        match res.status {
            Some(Status::Ok) => {
                info!("registration confirmed");
                Action::UpdateIdentity(IdentityUpdate::new(res.alias, res.owner, res.udid))
            }
            Some(Status::FirmwareUpdate) => {
                let commit = res.commit.unwrap_or_default();
                info!(
                    mac = res.mac.as_deref().unwrap_or_default(),
                    %commit,
                    version = res.version.as_deref().unwrap_or_default(),
                    "firmware update available"
                );

                if commit == self.running_commit {
                    warn!(%commit, "offered firmware has the same commit as the running one");
                }

                match res.url.filter(|url| !url.is_empty()) {
                    Some(url) => Action::TriggerUpdate(url),
                    None => {
                        warn!("firmware update without an image url");
                        Action::None
                    }
                }
            }
            Some(Status::Unknown) => {
                debug!("unknown registration status");
                Action::None
            }
            None => {
                debug!("registration response without status");
                Action::None
            }
        }
    }
}
