use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;
use tracing::{trace, warn};

use super::fs::safe_write_all;

/// A filesystem backed store
///
/// This is a very simple mechanism for persisting data on disk.
/// It supports atomic writes but no concurrency. Use it carefully and sparingly
#[derive(Clone, Debug)]
pub struct Store {
    root: PathBuf,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("path must not have any `..` segments")]
    InvalidPath,
}

impl Store {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    // Constructs a full path for a given collection path and document name.
    fn with_root(&self, path: &Path) -> Result<PathBuf, StoreError> {
        let doc_path = path.strip_prefix("/").unwrap_or(path);

        // Reject any path with ".." or other non-normal components
        for component in doc_path.components() {
            if !matches!(component, std::path::Component::Normal(_)) {
                return Err(StoreError::InvalidPath);
            }
        }
        Ok(self.root.join(doc_path))
    }

    /// Create or update a document at the specified location and with the given
    /// key
    ///
    /// Note that while writes are atomic, concurrent usage of a store may result in
    /// data-loss. Same with two different stores on the same base path.
    pub async fn write<P: AsRef<Path>, V: Serialize>(
        &self,
        path: P,
        key: &str,
        value: &V,
    ) -> Result<(), StoreError> {
        let parent = self.with_root(path.as_ref())?;

        // ensure the parent exists, this will fail if the parent
        // exists but is not a directory
        fs::create_dir_all(parent.as_path()).await?;

        let full_path = parent.join(key).with_extension("json");
        let buf = serde_json::to_vec(&value)?;
        trace!("writing {}", full_path.display());
        safe_write_all(full_path, &buf).await?;
        Ok(())
    }

    /// Read a document from the specified location
    pub async fn read<P: AsRef<Path>, V: DeserializeOwned>(
        &self,
        path: P,
        key: &str,
    ) -> Result<Option<V>, StoreError> {
        let full_path = self
            .with_root(path.as_ref())?
            .join(key)
            .with_extension("json");
        trace!("reading {}", full_path.display());

        match fs::read_to_string(&full_path).await {
            Ok(contents) => {
                let value = serde_json::from_str::<V>(&contents)?;
                Ok(Some(value))
            }
            Err(err) => match err.kind() {
                // We don't have a saved document
                io::ErrorKind::NotFound => Ok(None),

                // We have a document but failed to load it
                _ => Err(err.into()),
            },
        }
    }

    /// Wipe every document in the store and recreate an empty root
    ///
    /// This is the recovery path for a root that can no longer be written to,
    /// everything under the root is lost.
    pub async fn format(&self) -> Result<(), StoreError> {
        warn!("formatting store at {}", self.root.display());
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&self.root).await?,
            // a file where the root should be
            Ok(_) => fs::remove_file(&self.root).await?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }
}
