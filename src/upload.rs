//! Hand-off point for finished captures.
//!
//! The engine never talks to storage itself; callers plug in an
//! [`Uploader`]. [`DirectoryUploader`] keeps captures on the local disk.

use crate::processing::{CaptureResult, CapturedFile};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("invalid file name {0:?}")]
    InvalidName(String),
    #[error("failed to store {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write metadata: {0}")]
    Metadata(#[from] serde_yaml::Error),
    #[error("cannot express {0:?} as a URL")]
    Url(PathBuf),
}

/// Where a stored file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub file_url: Url,
}

/// Accepts a produced file and returns where it was stored.
pub trait Uploader {
    fn upload(&mut self, file: &CapturedFile) -> Result<UploadReceipt, UploadError>;
}

/// Stores captures in a local directory and answers with `file://` URLs.
#[derive(Debug, Clone)]
pub struct DirectoryUploader {
    root: PathBuf,
    write_metadata: bool,
}

impl DirectoryUploader {
    /// Creates `root` if needed. Relative roots are resolved against the
    /// working directory so the receipts carry absolute URLs.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, UploadError> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|source| UploadError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let root = fs::canonicalize(root).map_err(|source| UploadError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        info!("Storing captures in {:?}", root);
        Ok(Self {
            root,
            write_metadata: false,
        })
    }

    /// Also write a `<name>.yaml` sidecar with the capture metadata in
    /// [`upload_capture`](Self::upload_capture).
    pub fn with_metadata(mut self, enabled: bool) -> Self {
        self.write_metadata = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores the image and, if enabled, its metadata sidecar.
    pub fn upload_capture(&mut self, capture: &CaptureResult) -> Result<UploadReceipt, UploadError> {
        let receipt = self.upload(&capture.file)?;
        if self.write_metadata {
            let path = self.root.join(format!("{}.yaml", capture.file.name));
            let yaml = serde_yaml::to_string(&capture.meta)?;
            fs::write(&path, yaml).map_err(|source| UploadError::Io { path, source })?;
        }
        Ok(receipt)
    }

    fn target_path(&self, name: &str) -> Result<PathBuf, UploadError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && Path::new(name).file_name().is_some();
        if !valid {
            return Err(UploadError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

impl Uploader for DirectoryUploader {
    fn upload(&mut self, file: &CapturedFile) -> Result<UploadReceipt, UploadError> {
        let path = self.target_path(&file.name)?;
        fs::write(&path, &file.bytes).map_err(|source| UploadError::Io {
            path: path.clone(),
            source,
        })?;
        let file_url = Url::from_file_path(&path).map_err(|_| UploadError::Url(path.clone()))?;
        debug!("Stored {} ({} bytes) at {}", file.name, file.bytes.len(), file_url);
        Ok(UploadReceipt { file_url })
    }
}
