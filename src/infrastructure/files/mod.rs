//! File duplication for cloned file attributes.
//!
//! Provides two [`FileDuplicator`](crate::domain::repositories::FileDuplicator)
//! implementations:
//! - [`LocalFileDuplicator`] - Copies files under a local storage root
//! - [`NullFileDuplicator`] - Keeps references unchanged (duplication disabled)

mod local_file_duplicator;
mod null_file_duplicator;

pub use local_file_duplicator::LocalFileDuplicator;
pub use null_file_duplicator::NullFileDuplicator;
