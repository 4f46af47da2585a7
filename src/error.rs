//! Error types for extension negotiation and frame transforms.
//!
//! Every error a peer can provoke carries the close code the connection must
//! be terminated with. Local ordering and configuration mistakes carry none.

use std::fmt;

use thiserror::Error;

use crate::protocol::CloseCode;

/// Result type alias for negotiation and codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The underlying reason attached to a protocol error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    /// Another error from this crate.
    Protocol(Box<Error>),
    /// A foreign error, recorded by its display text.
    External(String),
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Protocol(err) => write!(f, "{}", err),
            Cause::External(msg) => f.write_str(msg),
        }
    }
}

impl From<Error> for Cause {
    fn from(err: Error) -> Self {
        Cause::Protocol(Box::new(err))
    }
}

impl From<std::io::Error> for Cause {
    fn from(err: std::io::Error) -> Self {
        Cause::External(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Cause {
    fn from(err: std::str::Utf8Error) -> Self {
        Cause::External(err.to_string())
    }
}

#[cfg(feature = "compression")]
impl From<flate2::CompressError> for Cause {
    fn from(err: flate2::CompressError) -> Self {
        Cause::External(err.to_string())
    }
}

#[cfg(feature = "compression")]
impl From<flate2::DecompressError> for Cause {
    fn from(err: flate2::DecompressError) -> Self {
        Cause::External(err.to_string())
    }
}

/// Details of a close-code-bearing protocol error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidData {
    code: CloseCode,
    message: Option<String>,
    cause: Option<Cause>,
}

impl InvalidData {
    /// Create error details with a message.
    pub fn new(code: CloseCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            cause: None,
        }
    }

    /// Create error details carrying only a close code.
    pub fn bare(code: CloseCode) -> Self {
        Self {
            code,
            message: None,
            cause: None,
        }
    }

    /// Create error details wrapping another error.
    ///
    /// If `cause` is itself an error from this crate with a close code, that
    /// code replaces `code`: the innermost code always wins.
    pub fn caused_by(code: CloseCode, message: Option<String>, cause: impl Into<Cause>) -> Self {
        let cause = cause.into();
        let code = match &cause {
            Cause::Protocol(inner) => inner.close_code().unwrap_or(code),
            Cause::External(_) => code,
        };
        Self {
            code,
            message,
            cause: Some(cause),
        }
    }

    /// The close code to send when terminating the connection.
    #[must_use]
    pub const fn code(&self) -> CloseCode {
        self.code
    }

    /// Human-readable detail, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The wrapped error, if any.
    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }
}

impl fmt::Display for InvalidData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{} (close code {})", msg, self.code)?,
            None => write!(f, "close code {}", self.code)?,
        }
        if let Some(cause) = &self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

/// Errors raised while negotiating or transforming frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Malformed frame structure, e.g. reserved bits the negotiated extension does not allow.
    #[error("Invalid frame: {0}")]
    InvalidFrame(InvalidData),

    /// Malformed or incompatible handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(InvalidData),

    /// Payload failed validation (invalid UTF-8, corrupt DEFLATE stream).
    #[error("Invalid payload: {0}")]
    InvalidPayload(InvalidData),

    /// Handshake results were queried before the handshake completed.
    ///
    /// This is a caller ordering bug, not a peer violation, and has no close code.
    #[error("Incomplete handshake: {0}")]
    IncompleteHandshake(String),

    /// A configuration value was rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Frame error with close code 1002.
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Error::InvalidFrame(InvalidData::new(CloseCode::ProtocolError, message))
    }

    /// Handshake error with close code 1002.
    pub fn invalid_handshake(message: impl Into<String>) -> Self {
        Error::InvalidHandshake(InvalidData::new(CloseCode::ProtocolError, message))
    }

    /// Payload error with close code 1007.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Error::InvalidPayload(InvalidData::new(CloseCode::InvalidPayload, message))
    }

    /// Payload error with an explicit close code.
    pub fn invalid_payload_with_code(code: CloseCode, message: impl Into<String>) -> Self {
        Error::InvalidPayload(InvalidData::new(code, message))
    }

    /// Frame error wrapping `cause`.
    pub fn invalid_frame_caused_by(message: impl Into<String>, cause: impl Into<Cause>) -> Self {
        Error::InvalidFrame(InvalidData::caused_by(
            CloseCode::ProtocolError,
            Some(message.into()),
            cause,
        ))
    }

    /// Handshake error wrapping `cause`.
    pub fn invalid_handshake_caused_by(
        message: impl Into<String>,
        cause: impl Into<Cause>,
    ) -> Self {
        Error::InvalidHandshake(InvalidData::caused_by(
            CloseCode::ProtocolError,
            Some(message.into()),
            cause,
        ))
    }

    /// Payload error wrapping `cause`, defaulting to `code` for foreign causes.
    pub fn invalid_payload_caused_by(
        code: CloseCode,
        message: impl Into<String>,
        cause: impl Into<Cause>,
    ) -> Self {
        Error::InvalidPayload(InvalidData::caused_by(code, Some(message.into()), cause))
    }

    /// The close code the connection must be terminated with.
    ///
    /// `None` for local errors that never reach the wire.
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Error::InvalidFrame(data) | Error::InvalidHandshake(data) | Error::InvalidPayload(data) => {
                Some(data.code())
            }
            Error::IncompleteHandshake(_) | Error::InvalidConfig(_) => None,
        }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Error::invalid_payload_caused_by(CloseCode::InvalidPayload, "invalid UTF-8", err)
    }
}
