//! Configuration and limits for handshake negotiation.

#[cfg(feature = "compression")]
use crate::extensions::deflate::{DeflateConfig, DeflateExtension};
use crate::error::{Error, Result};
use crate::extensions::Extension;
use crate::negotiator::Negotiator;
use crate::role::Role;
use crate::subprotocol::{Protocol, SubProtocol};

/// Size limits enforced during negotiation and decompression.
///
/// These limits prevent resource exhaustion attacks and ensure
/// bounded memory usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of one decompressed message in bytes.
    ///
    /// Default: 64 MB (64 * 1024 * 1024)
    pub max_message_size: usize,

    /// Maximum size of handshake data (field names, values and body) in bytes.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_message_size: 64 * 1024 * 1024, // 64 MB
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(max_message_size: usize, max_handshake_size: usize) -> Self {
        Self {
            max_message_size,
            max_handshake_size,
        }
    }

    /// Create limits suitable for small embedded systems.
    ///
    /// - Max message: 256 KB
    /// - Max handshake: 4 KB
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            max_message_size: 256 * 1024,
            max_handshake_size: 4096,
        }
    }

    /// Validate that a handshake size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if `size` exceeds the configured maximum.
    pub fn check_handshake_size(&self, size: usize) -> Result<()> {
        if size > self.max_handshake_size {
            return Err(Error::invalid_handshake(format!(
                "handshake of {} bytes exceeds {}",
                size, self.max_handshake_size
            )));
        }
        Ok(())
    }
}

/// Negotiation configuration for one endpoint.
///
/// A `Config` describes what an endpoint supports. [`Config::negotiator`]
/// turns it into a prototype [`Negotiator`] that is duplicated per
/// connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Which side of the handshake this endpoint is on.
    pub role: Role,

    /// Size limits.
    pub limits: Limits,

    /// Permessage-deflate settings, or `None` to never negotiate compression.
    ///
    /// Default: enabled with RFC 7692 defaults
    #[cfg(feature = "compression")]
    pub deflate: Option<DeflateConfig>,

    /// Sub-protocol tokens in order of preference.
    ///
    /// Empty means any (or no) sub-protocol is accepted.
    pub protocols: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::Server,
            limits: Limits::default(),
            #[cfg(feature = "compression")]
            deflate: Some(DeflateConfig::default()),
            protocols: Vec::new(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the role.
    #[must_use]
    pub const fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Enable permessage-deflate with the given settings.
    #[cfg(feature = "compression")]
    #[must_use]
    pub fn with_deflate(mut self, deflate: DeflateConfig) -> Self {
        self.deflate = Some(deflate);
        self
    }

    /// Never negotiate compression.
    #[must_use]
    pub fn without_compression(mut self) -> Self {
        #[cfg(feature = "compression")]
        {
            self.deflate = None;
        }
        self
    }

    /// Append a sub-protocol token.
    #[must_use]
    pub fn with_protocol(mut self, token: impl Into<String>) -> Self {
        self.protocols.push(token.into());
        self
    }

    /// Replace the sub-protocol list.
    #[must_use]
    pub fn with_protocols<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Create a server configuration.
    pub fn server() -> Self {
        Self::default()
    }

    /// Create a client configuration.
    pub fn client() -> Self {
        Self {
            role: Role::Client,
            ..Self::default()
        }
    }

    /// Build a prototype negotiator from this configuration.
    pub fn negotiator(&self) -> Negotiator {
        let mut extensions: Vec<Box<dyn Extension>> = Vec::new();

        #[cfg(feature = "compression")]
        if let Some(deflate) = &self.deflate {
            let cap = deflate.max_message_size.min(self.limits.max_message_size);
            let deflate = deflate.clone().max_message_size(cap);
            extensions.push(match self.role {
                Role::Client => Box::new(DeflateExtension::client(deflate)),
                Role::Server => Box::new(DeflateExtension::server(deflate)),
            });
        }

        let protocols: Vec<Box<dyn SubProtocol>> = self
            .protocols
            .iter()
            .map(|token| Box::new(Protocol::new(token.clone())) as Box<dyn SubProtocol>)
            .collect();

        Negotiator::new(extensions, protocols).with_limits(self.limits.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_default() {
        let limits = Limits::default();
        assert_eq!(limits.max_message_size, 64 * 1024 * 1024);
        assert_eq!(limits.max_handshake_size, 8192);
    }

    #[test]
    fn test_limits_embedded() {
        let limits = Limits::embedded();
        assert_eq!(limits.max_message_size, 256 * 1024);
        assert_eq!(limits.max_handshake_size, 4096);
    }

    #[test]
    fn test_limits_check_handshake_size() {
        let limits = Limits::default();
        assert!(limits.check_handshake_size(8192).is_ok());
        assert!(matches!(
            limits.check_handshake_size(8193),
            Err(Error::InvalidHandshake(_))
        ));
    }

    #[test]
    fn test_config_presets() {
        assert_eq!(Config::server().role, Role::Server);
        assert_eq!(Config::client().role, Role::Client);
        assert!(Config::default().protocols.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new()
            .with_limits(Limits::embedded())
            .with_role(Role::Client)
            .with_protocol("chat")
            .with_protocol("superchat");
        assert_eq!(config.limits, Limits::embedded());
        assert_eq!(config.role, Role::Client);
        assert_eq!(config.protocols, vec!["chat", "superchat"]);

        let config = config.with_protocols(["mqtt"]);
        assert_eq!(config.protocols, vec!["mqtt"]);
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_config_compression_toggle() {
        assert!(Config::default().deflate.is_some());
        assert!(Config::default().without_compression().deflate.is_none());

        let deflate = DeflateConfig::new().client_no_context_takeover(true);
        let config = Config::client().with_deflate(deflate.clone());
        assert_eq!(config.deflate, Some(deflate));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_negotiator_offers_configured_capabilities() {
        let negotiator = Config::client().with_protocol("chat").negotiator();
        let offers = negotiator.extension_offers();
        assert_eq!(offers.as_deref(), Some("permessage-deflate; client_max_window_bits"));
        assert_eq!(negotiator.protocol_offers().as_deref(), Some("chat"));

        let bare = Config::client().without_compression().negotiator();
        assert_eq!(bare.extension_offers(), None);
        assert_eq!(bare.protocol_offers(), None);
    }
}
