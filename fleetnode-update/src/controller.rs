use tracing::{info, instrument, warn};

use fleetnode_util::http::Uri;

use crate::applier::{ImageApplier, UpdateOutcome, UpdateRequest};

#[derive(Clone, Debug)]
pub struct UpdateConfig {
    /// Relative image locations are resolved against this
    pub base: Uri,
    /// Secondary provider, tried once when the primary attempt fails
    pub fallback: Uri,
    /// Version tag sent to the secondary provider
    pub fallback_version: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            base: Uri::from_static("http://thinx.cloud:80"),
            fallback: Uri::from_static("http://images.thinx.cloud/ota.php"),
            fallback_version: "5ccf7fee90e0".to_string(),
        }
    }
}

/// Applies firmware updates announced by the remote
pub struct UpdateController<A> {
    applier: A,
    config: UpdateConfig,
    running_version: String,
}

impl<A: ImageApplier> UpdateController<A> {
    pub fn new(applier: A, config: UpdateConfig, running_version: impl Into<String>) -> Self {
        Self {
            applier,
            config,
            running_version: running_version.into(),
        }
    }

    /// Try the image at `url`, then the secondary provider
    ///
    /// Errors from the applier are logged and reported as
    /// [`UpdateOutcome::Failed`].
    #[instrument(name = "update", skip(self))]
    pub async fn apply(&self, url: &str) -> UpdateOutcome {
        let primary = match self.config.base.resolve(url) {
            Ok(uri) => {
                self.attempt(UpdateRequest {
                    uri,
                    version: self.running_version.clone(),
                })
                .await
            }
            Err(err) => {
                warn!("invalid image location: {err}");
                UpdateOutcome::Failed
            }
        };

        if primary == UpdateOutcome::Ok {
            return primary;
        }

        info!(fallback = %self.config.fallback, "primary update {primary:?}, trying secondary provider");
        self.attempt(UpdateRequest {
            uri: self.config.fallback.clone(),
            version: self.config.fallback_version.clone(),
        })
        .await
    }

    async fn attempt(&self, request: UpdateRequest) -> UpdateOutcome {
        info!(uri = %request.uri, "fetching update image");
        match self.applier.fetch_and_apply(&request).await {
            Ok(outcome) => {
                info!("update {outcome:?}");
                outcome
            }
            Err(err) => {
                warn!("update failed: {err}");
                UpdateOutcome::Failed
            }
        }
    }
}
