//! Which side of the handshake an endpoint is on.

/// WebSocket endpoint role.
///
/// Decides which half of a negotiated extension's parameters applies to the
/// frames this endpoint sends and which to the frames it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sent the upgrade request.
    Client,
    /// Answered the upgrade request.
    Server,
}

impl Role {
    /// The role of the other endpoint.
    #[inline]
    #[must_use]
    pub const fn peer(&self) -> Role {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "Client"),
            Role::Server => write!(f, "Server"),
        }
    }
}
