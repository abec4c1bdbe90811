//! Error types for docpress.

use thiserror::Error;

/// Result type alias using docpress's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for docpress operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A write was retried against a busy store and the retry budget ran out
    #[error("Operation busy after retries: {operation}")]
    OperationBusy { operation: String },

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Batch not found
    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    /// Object storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// OCR provider call failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// A state transition would violate the document/job lifecycle
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

impl Error {
    /// Whether this error is a transient busy/locked store condition.
    ///
    /// SQLite reports contention as primary result codes 5 (SQLITE_BUSY) and
    /// 6 (SQLITE_LOCKED); extended codes keep the primary code in the low
    /// byte. Anything else is not retryable at the write-wrapper level.
    pub fn is_busy(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db)) => {
                if let Some(code) = db.code() {
                    if let Ok(n) = code.parse::<u32>() {
                        return matches!(n & 0xff, 5 | 6);
                    }
                }
                let msg = db.message();
                msg.contains("database is locked") || msg.contains("database table is locked")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_document_not_found() {
        let err = Error::DocumentNotFound("doc-1".to_string());
        assert_eq!(err.to_string(), "Document not found: doc-1");
    }

    #[test]
    fn test_error_display_operation_busy() {
        let err = Error::OperationBusy {
            operation: "claim_next".to_string(),
        };
        assert_eq!(err.to_string(), "Operation busy after retries: claim_next");
    }

    #[test]
    fn test_error_display_provider() {
        let err = Error::Provider("model timeout".to_string());
        assert_eq!(err.to_string(), "Provider error: model timeout");
    }

    #[test]
    fn test_error_display_invalid_state() {
        let err = Error::InvalidState("archive on pending document".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid state: archive on pending document"
        );
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_is_busy_only_for_database_errors() {
        assert!(!Error::Provider("timeout".to_string()).is_busy());
        assert!(!Error::NotFound("x".to_string()).is_busy());
        assert!(!Error::Database(sqlx::Error::RowNotFound).is_busy());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
