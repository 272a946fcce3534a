//! Error types for the disease normalizer.

use thiserror::Error;

/// Result type alias using the normalizer's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for storage, merge, and query operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema setup or connection initialization failed
    #[error("Database initialization error: {0}")]
    DatabaseInitialization(String),

    /// A lookup or scan against the store failed
    #[error("Database read error: {0}")]
    DatabaseRead(String),

    /// A write, update, or delete against the store failed
    #[error("Database write error: {0}")]
    DatabaseWrite(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller supplied contradictory or unknown query parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Whether this error came from reading the store rather than writing it.
    pub fn is_read_failure(&self) -> bool {
        matches!(self, Error::DatabaseRead(_) | Error::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("ncit:C3270".to_string());
        assert_eq!(err.to_string(), "Not found: ncit:C3270");
    }

    #[test]
    fn test_error_display_invalid_parameter() {
        let err = Error::InvalidParameter("Invalid source name(s): [\"foo\"]".to_string());
        assert!(err.to_string().starts_with("Invalid parameter:"));
    }

    #[test]
    fn test_error_display_write() {
        let err = Error::DatabaseWrite("must unset skip flag".to_string());
        assert_eq!(err.to_string(), "Database write error: must unset skip flag");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "snapshot missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("snapshot missing"));
    }

    #[test]
    fn test_is_read_failure() {
        assert!(Error::DatabaseRead("scan failed".into()).is_read_failure());
        assert!(!Error::DatabaseWrite("put failed".into()).is_read_failure());
        assert!(!Error::InvalidParameter("x".into()).is_read_failure());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
