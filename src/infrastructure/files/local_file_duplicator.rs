//! Filesystem-backed file duplicator.

use async_trait::async_trait;
use serde_json::json;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::domain::repositories::FileDuplicator;
use crate::error::{CloneError, map_io_error};

const MAX_NAME_ATTEMPTS: usize = 1000;

/// Copies files stored under a root directory.
///
/// References are paths relative to the root. `covers/img1.png` is copied to
/// `covers/img1_copy.png`, then `covers/img1_copy_2.png` and so on when the
/// name is taken. Existing files are never overwritten.
pub struct LocalFileDuplicator {
    root: PathBuf,
    suffix: String,
}

impl LocalFileDuplicator {
    /// Creates a duplicator for files under `root`, naming copies with `suffix`.
    pub fn new(root: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        let root = root.into();
        info!("File storage root: {}", root.display());
        Self {
            root,
            suffix: suffix.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rejects absolute references and references leaving the root.
    fn validate(reference: &str) -> Result<&Path, CloneError> {
        let path = Path::new(reference);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if reference.is_empty() || escapes {
            return Err(CloneError::file(
                "File reference escapes storage root",
                json!({ "reference": reference }),
            ));
        }
        Ok(path)
    }

    /// File name of the `attempt`-th candidate copy.
    fn copy_name(&self, path: &Path, attempt: usize) -> String {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        if attempt == 1 {
            format!("{}{}{}", stem, self.suffix, extension)
        } else {
            format!("{}{}_{}{}", stem, self.suffix, attempt, extension)
        }
    }
}

#[async_trait]
impl FileDuplicator for LocalFileDuplicator {
    async fn duplicate(&self, reference: &str) -> Result<String, CloneError> {
        let relative = Self::validate(reference)?;
        let source = self.root.join(relative);

        let is_file = fs::metadata(&source)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(CloneError::file(
                "Source file missing",
                json!({ "reference": reference }),
            ));
        }

        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let candidate = relative.with_file_name(self.copy_name(relative, attempt));
            let target = self.root.join(&candidate);

            // create_new fails when the name is taken.
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)
                .await
            {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(map_io_error(e, reference)),
            }

            if let Err(e) = fs::copy(&source, &target).await {
                let _ = fs::remove_file(&target).await;
                return Err(map_io_error(e, reference));
            }

            let copy = candidate.to_string_lossy().into_owned();
            debug!("Copied file {} -> {}", reference, copy);
            return Ok(copy);
        }

        Err(CloneError::file(
            "No free name for file copy",
            json!({ "reference": reference, "attempts": MAX_NAME_ATTEMPTS }),
        ))
    }
}
