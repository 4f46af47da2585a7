//! Handshake records shared by the client request and the server response.
//!
//! A handshake is an ordered, case-insensitive header map plus an optional
//! body. This module does not parse HTTP; it stores what the caller's HTTP
//! layer extracted and what the negotiator wants to send.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Header carrying extension offers and selections.
pub const SEC_WEBSOCKET_EXTENSIONS: &str = "Sec-WebSocket-Extensions";
/// Header carrying sub-protocol offers and selection.
pub const SEC_WEBSOCKET_PROTOCOL: &str = "Sec-WebSocket-Protocol";
/// Client nonce header.
pub const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";
/// Server proof-of-receipt header.
pub const SEC_WEBSOCKET_ACCEPT: &str = "Sec-WebSocket-Accept";
/// Protocol version header.
pub const SEC_WEBSOCKET_VERSION: &str = "Sec-WebSocket-Version";

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use rsws_negotiate::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a fresh Sec-WebSocket-Key: 16 random bytes, Base64 encoded.
///
/// # Errors
///
/// Returns `Error::IncompleteHandshake` if the OS random source is unavailable.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| {
        Error::IncompleteHandshake(format!("cannot generate Sec-WebSocket-Key: {}", e))
    })?;
    Ok(BASE64.encode(nonce))
}

#[inline]
fn normalize(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Ordered, case-insensitive header fields plus an opaque body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeData {
    fields: Vec<(String, String)>,
    content: Option<Bytes>,
}

impl HandshakeData {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under the lower-cased `name`, replacing any previous
    /// value for that name in its original position.
    pub fn put(&mut self, name: &str, value: impl Into<String>) {
        let key = normalize(name);
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Case-insensitive lookup; empty string if the field is absent.
    pub fn field_value(&self, name: &str) -> &str {
        let key = normalize(name);
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    /// Case-insensitive existence check.
    pub fn has_field(&self, name: &str) -> bool {
        let key = normalize(name);
        self.fields.iter().any(|(k, _)| *k == key)
    }

    /// Stored (lower-cased) field names in insertion order.
    pub fn iterate_fields(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Number of stored fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if no field is stored.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The handshake body, if any.
    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    /// Replace the handshake body.
    pub fn set_content(&mut self, content: Option<Bytes>) {
        self.content = content;
    }
}

/// Read access common to both handshake directions.
pub trait Handshake {
    /// The underlying field store.
    fn data(&self) -> &HandshakeData;

    /// Case-insensitive lookup; empty string if absent.
    fn field_value(&self, name: &str) -> &str {
        self.data().field_value(name)
    }

    /// Case-insensitive existence check.
    fn has_field(&self, name: &str) -> bool {
        self.data().has_field(name)
    }

    /// Stored field names in insertion order.
    fn iterate_fields(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(self.data().iterate_fields())
    }

    /// The handshake body, if any.
    fn content(&self) -> Option<&Bytes> {
        self.data().content()
    }
}

/// The client's opening handshake (the upgrade request).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientHandshake {
    resource_descriptor: String,
    data: HandshakeData,
}

impl ClientHandshake {
    /// Create an empty request for `resource_descriptor` (e.g. `/chat`).
    pub fn new(resource_descriptor: impl Into<String>) -> Self {
        Self {
            resource_descriptor: resource_descriptor.into(),
            data: HandshakeData::new(),
        }
    }

    /// The request target.
    pub fn resource_descriptor(&self) -> &str {
        &self.resource_descriptor
    }

    /// Replace the request target.
    pub fn set_resource_descriptor(&mut self, resource_descriptor: impl Into<String>) {
        self.resource_descriptor = resource_descriptor.into();
    }

    /// Store a header field.
    pub fn put(&mut self, name: &str, value: impl Into<String>) {
        self.data.put(name, value);
    }

    /// Replace the body.
    pub fn set_content(&mut self, content: Option<Bytes>) {
        self.data.set_content(content);
    }
}

impl Handshake for ClientHandshake {
    fn data(&self) -> &HandshakeData {
        &self.data
    }
}

/// The server's handshake response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHandshake {
    status: u16,
    status_message: String,
    data: HandshakeData,
}

impl Default for ServerHandshake {
    fn default() -> Self {
        Self::new(101, "Switching Protocols")
    }
}

impl ServerHandshake {
    /// Create an empty response with the given status line.
    pub fn new(status: u16, status_message: impl Into<String>) -> Self {
        Self {
            status,
            status_message: status_message.into(),
            data: HandshakeData::new(),
        }
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// HTTP reason phrase.
    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    /// Replace the status line.
    pub fn set_status(&mut self, status: u16, status_message: impl Into<String>) {
        self.status = status;
        self.status_message = status_message.into();
    }

    /// Store a header field.
    pub fn put(&mut self, name: &str, value: impl Into<String>) {
        self.data.put(name, value);
    }

    /// Replace the body.
    pub fn set_content(&mut self, content: Option<Bytes>) {
        self.data.set_content(content);
    }
}

impl Handshake for ServerHandshake {
    fn data(&self) -> &HandshakeData {
        &self.data
    }
}
