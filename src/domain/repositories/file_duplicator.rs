//! File duplication collaborator.

use crate::error::CloneError;
use async_trait::async_trait;

/// Copies an externally stored file and returns the reference of the copy.
///
/// # Implementations
///
/// - [`crate::infrastructure::files::LocalFileDuplicator`] - Files under a local root directory
/// - [`crate::infrastructure::files::NullFileDuplicator`] - File duplication disabled
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileDuplicator: Send + Sync {
    /// Duplicates the file behind `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError::File`] if the source is missing or the copy cannot
    /// be written.
    async fn duplicate(&self, reference: &str) -> Result<String, CloneError>;
}
