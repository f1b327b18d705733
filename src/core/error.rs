use std::io;
use thiserror::Error;

/// Custom error types for the TDMA station
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[source] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sink error: {0}")]
    Sink(String),

}

/// Beacon decoding failures
///
/// These are slot-local anomalies: the engine logs them and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload too short: {received} bytes")]
    ShortRead { received: usize },

    #[error("truncated beacon: missing {field}")]
    Truncated { field: &'static str },
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new transport error
    pub fn transport(err: io::Error) -> Self {
        Error::Transport(err)
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        Error::Sink(msg.into())
    }

    /// Whether this error ends the station
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::config("bad group");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.to_string(), "Configuration error: bad group");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::Other, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_transport());

        let err: Error = CodecError::ShortRead { received: 3 }.into();
        assert_eq!(err.to_string(), "Codec error: payload too short: 3 bytes");
    }

    #[test]
    fn test_sink_error() {
        let err = Error::sink("writer task failed");
        assert!(matches!(err, Error::Sink(_)));
        assert!(!err.is_transport());
        assert_eq!(err.to_string(), "Sink error: writer task failed");
    }

    #[test]
    fn test_transport_error() {
        let err = Error::transport(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(err.is_transport());
        assert_eq!(err.to_string(), "Transport error: gone");
    }
}
