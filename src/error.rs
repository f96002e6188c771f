//! Error types for thumbwatch.

/// Top-level error type for the monitoring subsystem.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Network failure or non-success response while fetching a resource.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Malformed or unreadable image bytes.
    #[error("decode error: {0}")]
    Decode(String),

    /// The decorated image could not be re-encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// The task scheduler rejected a new task.
    #[error("schedule error: {0}")]
    Schedule(String),

    /// The entity store rejected a read or an update.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The object store rejected an artifact write.
    #[error("object store error: {0}")]
    ObjectStore(String),

    /// No entity exists with the given id.
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    /// The source URL cannot be monitored.
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<thumbwatch_fetch::FetchError> for MonitorError {
    fn from(err: thumbwatch_fetch::FetchError) -> Self {
        Self::Fetch(err.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category() {
        let err = MonitorError::Schedule("queue full".to_owned());
        assert_eq!(err.to_string(), "schedule error: queue full");
        let err = MonitorError::EntityNotFound("abc".to_owned());
        assert_eq!(err.to_string(), "entity not found: abc");
    }

    #[test]
    fn fetch_errors_convert() {
        let err: MonitorError = thumbwatch_fetch::FetchError::Network("refused".into()).into();
        assert!(matches!(err, MonitorError::Fetch(_)));
        assert!(err.to_string().contains("refused"));
    }
}
