use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::fs;
use tokio::process::Command;
use tracing::{Span, debug, field, info, instrument};

use fleetnode_util::fs::safe_write_all;

use crate::applier::{ImageApplier, UpdateError, UpdateOutcome, UpdateRequest};

const IMAGE_NAME: &str = "image.bin";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Downloads update images over HTTP
///
/// A downloaded image is staged under the stage directory and handed over to
/// the apply hook, if one is configured. Without a hook the image is left for
/// the service manager to pick up on restart.
pub struct HttpApplier {
    client: Client,
    mac: String,
    stage_dir: PathBuf,
    hook: Option<PathBuf>,
}

impl HttpApplier {
    pub fn new(mac: impl Into<String>, stage_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: Client::new(),
            mac: mac.into(),
            stage_dir: stage_dir.into(),
            hook: None,
        }
    }

    /// Program run with the staged image path as its last argument
    pub fn with_hook(mut self, hook: impl Into<PathBuf>) -> Self {
        self.hook = Some(hook.into());
        self
    }

    async fn run_hook(&self, image: &Path) -> Result<(), UpdateError> {
        let Some(hook) = &self.hook else {
            debug!("no apply hook configured");
            return Ok(());
        };

        info!(hook = %hook.display(), "running apply hook");
        let status = Command::new(hook)
            .arg(image)
            .status()
            .await
            .map_err(UpdateError::Hook)?;

        if !status.success() {
            return Err(UpdateError::HookStatus(status));
        }

        Ok(())
    }
}

#[async_trait]
impl ImageApplier for HttpApplier {
    #[instrument(skip_all, fields(uri = %request.uri, status = field::Empty), err)]
    async fn fetch_and_apply(&self, request: &UpdateRequest) -> Result<UpdateOutcome, UpdateError> {
        let res = self
            .client
            .get(request.uri.to_string())
            .header("x-fleetnode-version", request.version.as_str())
            .header("x-fleetnode-mac", self.mac.as_str())
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await?;

        let status = res.status();
        Span::current().record("status", field::display(status));

        if status == StatusCode::NOT_MODIFIED {
            return Ok(UpdateOutcome::NoUpdateAvailable);
        }

        if !status.is_success() {
            return Err(UpdateError::Status(status));
        }

        let image = res.bytes().await?;
        if image.is_empty() {
            return Err(UpdateError::EmptyImage);
        }

        fs::create_dir_all(&self.stage_dir)
            .await
            .map_err(UpdateError::Stage)?;
        let path = self.stage_dir.join(IMAGE_NAME);
        safe_write_all(&path, &image)
            .await
            .map_err(UpdateError::Stage)?;
        info!(path = %path.display(), len = image.len(), "image staged");

        self.run_hook(&path).await?;

        Ok(UpdateOutcome::Ok)
    }
}
