//! No-op file duplicator for disabled file copying.

use crate::domain::repositories::FileDuplicator;
use crate::error::CloneError;
use async_trait::async_trait;
use tracing::debug;

/// A file duplicator that copies nothing.
///
/// The clone keeps the very same file reference as its source. Used when no
/// file storage is configured.
pub struct NullFileDuplicator;

impl NullFileDuplicator {
    /// Creates a new NullFileDuplicator instance.
    pub fn new() -> Self {
        debug!("Using NullFileDuplicator (file duplication disabled)");
        Self
    }
}

impl Default for NullFileDuplicator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileDuplicator for NullFileDuplicator {
    async fn duplicate(&self, reference: &str) -> Result<String, CloneError> {
        Ok(reference.to_string())
    }
}
