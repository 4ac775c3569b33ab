use std::io;

use async_trait::async_trait;
use thiserror::Error;

use fleetnode_util::http::{InvalidUriError, Uri};

/// Result of an update attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The new image is in place, the agent must restart
    Ok,
    /// The provider has nothing newer than the running version
    NoUpdateAvailable,
    Failed,
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("invalid image location: {0}")]
    InvalidUri(#[from] InvalidUriError),

    #[error("image request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned {0}")]
    Status(reqwest::StatusCode),

    #[error("provider returned an empty image")]
    EmptyImage,

    #[error("failed to stage image: {0}")]
    Stage(#[source] io::Error),

    #[error("failed to run apply hook: {0}")]
    Hook(#[source] io::Error),

    #[error("apply hook exited with {0}")]
    HookStatus(std::process::ExitStatus),
}

/// Where to get an image from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateRequest {
    pub uri: Uri,
    /// Version reported to the provider
    pub version: String,
}

/// Fetches an update image and applies it
#[async_trait]
pub trait ImageApplier: Send + Sync {
    async fn fetch_and_apply(&self, request: &UpdateRequest) -> Result<UpdateOutcome, UpdateError>;
}
