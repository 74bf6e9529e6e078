//! Error taxonomy of the duplication engine.
//!
//! Every failure carries a human-readable message plus structured JSON details
//! so callers can log or report the exact entity, relation or file involved.

use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloneError {
    /// The entity type has no registered cloneable declaration.
    #[error("unsupported entity: {message}")]
    UnsupportedEntity { message: String, details: Value },

    /// Persistence or attach failure reported by the entity store.
    #[error("store error: {message}")]
    Store { message: String, details: Value },

    /// File duplication failure.
    #[error("file error: {message}")]
    File { message: String, details: Value },
}

impl CloneError {
    pub fn unsupported_entity(message: impl Into<String>, details: Value) -> Self {
        Self::UnsupportedEntity {
            message: message.into(),
            details,
        }
    }
    pub fn store(message: impl Into<String>, details: Value) -> Self {
        Self::Store {
            message: message.into(),
            details,
        }
    }
    pub fn file(message: impl Into<String>, details: Value) -> Self {
        Self::File {
            message: message.into(),
            details,
        }
    }

    /// Structured context attached to the error.
    pub fn details(&self) -> &Value {
        match self {
            Self::UnsupportedEntity { details, .. }
            | Self::Store { details, .. }
            | Self::File { details, .. } => details,
        }
    }

    /// Short machine-readable code, used as a log field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedEntity { .. } => "unsupported_entity",
            Self::Store { .. } => "store_error",
            Self::File { .. } => "file_error",
        }
    }
}

impl From<sqlx::Error> for CloneError {
    fn from(e: sqlx::Error) -> Self {
        map_sqlx_error(e)
    }
}

pub fn map_sqlx_error(e: sqlx::Error) -> CloneError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            return CloneError::store(
                "Unique constraint violation",
                json!({ "constraint": db.constraint() }),
            );
        }
        if db.is_foreign_key_violation() {
            return CloneError::store(
                "Foreign key violation",
                json!({ "constraint": db.constraint() }),
            );
        }
    }

    CloneError::store("Database error", json!({ "reason": e.to_string() }))
}

pub fn map_io_error(e: std::io::Error, reference: &str) -> CloneError {
    CloneError::file(
        "File operation failed",
        json!({ "reference": reference, "reason": e.to_string() }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_details() {
        let err = CloneError::store("boom", json!({ "relation": "comments" }));
        assert_eq!(err.code(), "store_error");
        assert_eq!(err.details()["relation"], "comments");
        assert_eq!(err.to_string(), "store error: boom");

        let err = CloneError::unsupported_entity("nope", json!({}));
        assert_eq!(err.code(), "unsupported_entity");
    }

    #[test]
    fn test_map_sqlx_row_not_found() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, CloneError::Store { .. }));
    }

    #[test]
    fn test_map_io_error_keeps_reference() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = map_io_error(io, "img1.png");
        assert!(matches!(err, CloneError::File { .. }));
        assert_eq!(err.details()["reference"], "img1.png");
    }
}
