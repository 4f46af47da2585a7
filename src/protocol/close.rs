//! Close codes from the WebSocket close-code registry (RFC 6455 Section 7.4).

/// WebSocket close status code carried by every protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// Normal closure (1000).
    #[default]
    Normal,
    /// Going away (1001).
    GoingAway,
    /// Protocol error (1002). Malformed frame or handshake.
    ProtocolError,
    /// Unsupported data (1003).
    UnsupportedData,
    /// Invalid frame payload data (1007), e.g. non-UTF-8 text.
    InvalidPayload,
    /// Policy violation (1008).
    PolicyViolation,
    /// Message too big (1009).
    MessageTooBig,
    /// Mandatory extension (1010). The client expected the server to negotiate an extension.
    MandatoryExtension,
    /// Internal error (1011).
    InternalError,
    /// Any other registered or application code (1012-1014, 3000-4999).
    Other(u16),
}

impl CloseCode {
    /// Create a `CloseCode` from its numeric value.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::MandatoryExtension,
            1011 => CloseCode::InternalError,
            other => CloseCode::Other(other),
        }
    }

    /// Numeric value to place in the outgoing close frame.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::Other(code) => *code,
        }
    }

    /// Check if this code may be sent in a close frame (RFC 6455 Section 7.4.1).
    ///
    /// 1004-1006 and 1015 are reserved and never valid on the wire.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self.as_u16(), 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_roundtrip() {
        for code in [1000, 1001, 1002, 1003, 1007, 1008, 1009, 1010, 1011, 4000] {
            assert_eq!(CloseCode::from_u16(code).as_u16(), code);
        }
        assert_eq!(CloseCode::from_u16(1002), CloseCode::ProtocolError);
        assert_eq!(CloseCode::from_u16(3001), CloseCode::Other(3001));
    }

    #[test]
    fn test_reserved_codes_invalid() {
        for code in [1004, 1005, 1006, 1015, 999, 2000] {
            assert!(!CloseCode::from_u16(code).is_valid(), "{code}");
        }
        assert!(CloseCode::ProtocolError.is_valid());
        assert!(CloseCode::InvalidPayload.is_valid());
    }

    #[test]
    fn test_display_is_numeric() {
        assert_eq!(CloseCode::InvalidPayload.to_string(), "1007");
    }
}
