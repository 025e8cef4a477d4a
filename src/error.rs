//! Error types for mcwire

use thiserror::Error;

/// Main error type for mcwire
#[derive(Error, Debug)]
pub enum McwireError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("No servers configured")]
    NoServers,
}

impl McwireError {
    /// Returns the protocol error, if this is one
    pub fn as_protocol(&self) -> Option<&ProtocolError> {
        match self {
            McwireError::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

/// Encoding, parsing and framing errors, plus errors reported by the server
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Key too long (max 250 bytes)")]
    KeyTooLong,

    #[error("No keys specified")]
    NoKeys,

    #[error("Opaque value too long ({0} bytes, max 32)")]
    OpaqueTooLong(usize),

    #[error("Expected space after {0}")]
    MissingSeparator(&'static str),

    #[error("Unknown flag {0}")]
    UnknownFlag(char),

    #[error("Extra characters following flag {0}")]
    UnexpectedFlagValue(char),

    #[error("Flag {0} value contains a space or control byte")]
    InvalidFlagValue(char),

    #[error("Empty flag token")]
    EmptyFlag,

    #[error("Expected value after flag {0}")]
    MissingFlagValue(char),

    #[error("Invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid base64 key: {0}")]
    InvalidBase64(String),

    #[error("Expected CRLF")]
    ExpectedCrlf,

    #[error("Payload length mismatch: expected {expected} bytes followed by CRLF")]
    PayloadLengthMismatch { expected: usize },

    #[error("Incomplete message")]
    Incomplete,

    #[error("Trailing data after message ({0} bytes)")]
    TrailingData(usize),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("Client error: {0}")]
    ClientError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),
}

impl ProtocolError {
    pub(crate) fn invalid_number(field: &'static str, value: &[u8]) -> Self {
        ProtocolError::InvalidNumber {
            field,
            value: String::from_utf8_lossy(value).into_owned(),
        }
    }

    /// Returns true if the server itself reported the error
    pub fn is_server_reported(&self) -> bool {
        matches!(
            self,
            ProtocolError::ClientError(_) | ProtocolError::ServerError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, McwireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ProtocolError::UnknownFlag('j').to_string(),
            "Unknown flag j"
        );
        assert_eq!(
            ProtocolError::invalid_number("item size", b"12x").to_string(),
            "Invalid item size: \"12x\""
        );
        let err = McwireError::from(ProtocolError::ClientError("bad data chunk".into()));
        assert_eq!(err.to_string(), "Protocol error: Client error: bad data chunk");
    }

    #[test]
    fn test_is_server_reported() {
        assert!(ProtocolError::ClientError("x".into()).is_server_reported());
        assert!(ProtocolError::ServerError("x".into()).is_server_reported());
        assert!(!ProtocolError::ExpectedCrlf.is_server_reported());
    }

    #[test]
    fn test_as_protocol() {
        let err = McwireError::from(ProtocolError::NoKeys);
        assert_eq!(err.as_protocol(), Some(&ProtocolError::NoKeys));
        assert!(McwireError::NoServers.as_protocol().is_none());
    }
}
