//! WebSocket extensions (RFC 6455 Section 9).
//!
//! An extension takes part in the handshake through [`Negotiable`] and then
//! transforms every data frame: [`Extension::encode`] before a frame is
//! written, [`Extension::is_frame_valid`] and [`Extension::decode`] after a
//! frame is read.
//!
//! # Example
//!
//! ```rust,ignore
//! use rsws_negotiate::extensions::deflate::{DeflateConfig, DeflateExtension};
//! use rsws_negotiate::extensions::Extension;
//! use rsws_negotiate::Negotiable;
//!
//! let prototype = DeflateExtension::new(DeflateConfig::default());
//! // one fresh instance per connection
//! let mut ext = prototype.duplicate();
//! if ext.accept_offer_as_server(offer_header) {
//!     ext.decode(&mut frame)?;
//! }
//! ```

#[cfg(feature = "compression")]
pub mod deflate;

use std::fmt;

use crate::capability::Negotiable;
use crate::error::{Error, Result};
use crate::protocol::Frame;

/// A single extension parameter, e.g. `client_max_window_bits=10`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionParam {
    /// Parameter name, lower-cased.
    pub name: String,
    /// Optional parameter value. None for flag parameters.
    pub value: Option<String>,
}

impl ExtensionParam {
    /// Create a new parameter with a value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// Create a flag parameter (no value).
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Parse `param=value`, `param="value"` or `param`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s.split_once('=') {
            Some((name, value)) => Self {
                name: name.trim().to_ascii_lowercase(),
                value: Some(value.trim().trim_matches('"').to_string()),
            },
            None => Self::flag(s.to_ascii_lowercase()),
        }
    }
}

impl fmt::Display for ExtensionParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// One element of a `Sec-WebSocket-Extensions` header: a name and its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionOffer {
    /// Extension name as sent by the peer.
    pub name: String,
    /// Extension parameters in order.
    pub params: Vec<ExtensionParam>,
}

impl ExtensionOffer {
    /// Create a new extension offer with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Create a new extension offer with parameters.
    pub fn with_params(name: impl Into<String>, params: Vec<ExtensionParam>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Parse `extension-name; param1=value1; param2`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the extension name is empty.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split(';');
        let name = parts.next().unwrap_or_default().trim().to_string();

        if name.is_empty() {
            return Err(Error::invalid_handshake("empty extension name"));
        }

        let params = parts
            .filter(|p| !p.trim().is_empty())
            .map(ExtensionParam::parse)
            .collect();

        Ok(Self { name, params })
    }

    /// Parse every offer in a `Sec-WebSocket-Extensions` header value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if any element has an empty name.
    pub fn parse_header(header: &str) -> Result<Vec<Self>> {
        header
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    /// True if this offer is for `name`, ignoring ASCII case.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Get a parameter by name.
    pub fn get_param(&self, name: &str) -> Option<&ExtensionParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Check if a parameter is present.
    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }
}

impl fmt::Display for ExtensionOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for param in &self.params {
            write!(f, "; {}", param)?;
        }
        Ok(())
    }
}

/// WebSocket extension.
///
/// Instances carry per-connection state. A configured instance is a
/// prototype: each connection must obtain its own through
/// [`Extension::duplicate`], never share one.
pub trait Extension: Negotiable + fmt::Debug {
    /// Reject frames whose reserved bits this extension does not allow.
    ///
    /// Called on every received frame before [`Extension::decode`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFrame`] for a reserved-bit violation.
    fn is_frame_valid(&self, frame: &Frame) -> Result<()>;

    /// Transform an outgoing frame in place.
    ///
    /// # Errors
    ///
    /// Any error is terminal for the connection.
    fn encode(&mut self, frame: &mut Frame) -> Result<()>;

    /// Transform an incoming frame in place.
    ///
    /// # Errors
    ///
    /// Any error is terminal for the connection.
    fn decode(&mut self, frame: &mut Frame) -> Result<()>;

    /// Drop per-connection state, returning to the freshly configured state.
    fn reset(&mut self) {}

    /// A fresh, independently stateful copy for a new connection.
    fn duplicate(&self) -> Box<dyn Extension>;
}

/// The identity extension, selected when nothing else is negotiated.
///
/// Accepts any offer, advertises nothing, leaves payloads untouched and
/// rejects every frame with a reserved bit set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultExtension;

impl Negotiable for DefaultExtension {
    fn token(&self) -> &str {
        ""
    }

    fn accept_offer_as_server(&mut self, _offer: &str) -> bool {
        true
    }

    fn accept_offer_as_client(&mut self, _offer: &str) -> bool {
        true
    }
}

impl Extension for DefaultExtension {
    fn is_frame_valid(&self, frame: &Frame) -> Result<()> {
        if frame.has_reserved_bits() {
            return Err(Error::invalid_frame(format!(
                "bad rsv: rsv1={} rsv2={} rsv3={}",
                frame.rsv1, frame.rsv2, frame.rsv3
            )));
        }
        Ok(())
    }

    fn encode(&mut self, _frame: &mut Frame) -> Result<()> {
        Ok(())
    }

    fn decode(&mut self, _frame: &mut Frame) -> Result<()> {
        Ok(())
    }

    fn duplicate(&self) -> Box<dyn Extension> {
        Box::new(DefaultExtension)
    }
}
