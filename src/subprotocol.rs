//! Sub-protocol capabilities (`Sec-WebSocket-Protocol`).

use std::fmt;

use crate::capability::Negotiable;

/// A sub-protocol that can be offered and selected during the handshake.
pub trait SubProtocol: Negotiable + fmt::Debug {
    /// A fresh, independently owned copy for a new connection.
    fn duplicate(&self) -> Box<dyn SubProtocol>;
}

/// A sub-protocol identified by a single token.
///
/// The empty token is the default protocol: it accepts any offer (including
/// none) and is never advertised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Protocol {
    token: String,
}

impl Protocol {
    /// Create a protocol for `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// True for the empty-token default protocol.
    pub fn is_default(&self) -> bool {
        self.token.is_empty()
    }
}

impl Negotiable for Protocol {
    fn token(&self) -> &str {
        &self.token
    }

    fn accept_offer_as_server(&mut self, offer: &str) -> bool {
        self.is_default() || crate::capability::offer_contains(offer, &self.token)
    }

    fn accept_offer_as_client(&mut self, offer: &str) -> bool {
        self.is_default() || crate::capability::offer_contains(offer, &self.token)
    }
}

impl SubProtocol for Protocol {
    fn duplicate(&self) -> Box<dyn SubProtocol> {
        Box::new(Protocol::new(self.token.clone()))
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}
