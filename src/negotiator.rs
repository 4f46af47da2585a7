//! Opening-handshake negotiation (RFC 6455 Section 4).
//!
//! A [`Negotiator`] is configured once with the extensions and sub-protocols
//! an endpoint supports and then duplicated for every connection. The copy
//! validates the peer's handshake, selects one extension and one
//! sub-protocol, writes its own half of the handshake, and afterwards routes
//! every data frame through the selected extension.
//!
//! # Example
//!
//! ```rust,ignore
//! use rsws_negotiate::{Config, ServerHandshake};
//!
//! let prototype = Config::server().with_protocol("chat").negotiator();
//!
//! // per connection
//! let mut negotiator = prototype.duplicate();
//! negotiator.accept_handshake_as_server(&request)?;
//! let mut response = ServerHandshake::default();
//! negotiator.post_process_response_as_server(&request, &mut response)?;
//!
//! negotiator.decode_frame(&mut frame)?;
//! ```

use log::{debug, trace};

use crate::capability::{Negotiable, join_offers, offer_contains};
use crate::config::Limits;
use crate::error::{Error, Result};
use crate::extensions::{DefaultExtension, Extension};
use crate::protocol::handshake::{
    SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_EXTENSIONS, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL,
    SEC_WEBSOCKET_VERSION,
};
use crate::protocol::{
    ClientHandshake, Frame, Handshake, ServerHandshake, compute_accept_key, generate_key,
};
use crate::role::Role;
use crate::subprotocol::{Protocol, SubProtocol};

/// The only protocol version this negotiator speaks.
pub const WEBSOCKET_VERSION: &str = "13";

/// Status code of a successful upgrade response.
pub const SWITCHING_PROTOCOLS: u16 = 101;

/// Negotiates one connection's extension and sub-protocol.
#[derive(Debug)]
pub struct Negotiator {
    known_extensions: Vec<Box<dyn Extension>>,
    known_protocols: Vec<Box<dyn SubProtocol>>,
    limits: Limits,
    extension: Option<Box<dyn Extension>>,
    protocol: Option<Box<dyn SubProtocol>>,
    role: Option<Role>,
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl Negotiator {
    /// Create a negotiator for the given capabilities, in order of preference.
    ///
    /// With no protocols the empty default protocol is used, which accepts
    /// any peer.
    pub fn new(
        extensions: Vec<Box<dyn Extension>>,
        mut protocols: Vec<Box<dyn SubProtocol>>,
    ) -> Self {
        if protocols.is_empty() {
            protocols.push(Box::new(Protocol::default()));
        }
        Self {
            known_extensions: extensions,
            known_protocols: protocols,
            limits: Limits::default(),
            extension: None,
            protocol: None,
            role: None,
        }
    }

    /// Set the limits applied to incoming handshakes.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// A copy for a new connection: same capabilities, nothing negotiated.
    pub fn duplicate(&self) -> Negotiator {
        Negotiator {
            known_extensions: self.known_extensions.iter().map(|e| e.duplicate()).collect(),
            known_protocols: self.known_protocols.iter().map(|p| p.duplicate()).collect(),
            limits: self.limits.clone(),
            extension: None,
            protocol: None,
            role: None,
        }
    }

    /// Forget the negotiated extension and protocol.
    pub fn reset(&mut self) {
        self.extension = None;
        self.protocol = None;
        self.role = None;
    }

    /// Role of the accepted handshake, if any.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// The `Sec-WebSocket-Extensions` value a client sends, if it offers anything.
    pub fn extension_offers(&self) -> Option<String> {
        join_offers(self.known_extensions.iter().map(|e| e.provided_offer_as_client()))
    }

    /// The `Sec-WebSocket-Protocol` value a client sends, if it offers anything.
    pub fn protocol_offers(&self) -> Option<String> {
        join_offers(self.known_protocols.iter().map(|p| p.provided_offer_as_client()))
    }

    /// Fill in the client's upgrade request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteHandshake`] if no key can be generated.
    pub fn post_process_request_as_client(&self, request: &mut ClientHandshake) -> Result<()> {
        request.put("Upgrade", "websocket");
        request.put("Connection", "Upgrade");
        request.put(SEC_WEBSOCKET_KEY, generate_key()?);
        request.put(SEC_WEBSOCKET_VERSION, WEBSOCKET_VERSION);

        if let Some(offers) = self.extension_offers() {
            request.put(SEC_WEBSOCKET_EXTENSIONS, offers);
        }
        if let Some(offers) = self.protocol_offers() {
            request.put(SEC_WEBSOCKET_PROTOCOL, offers);
        }
        Ok(())
    }

    /// Validate a client's upgrade request and select an extension and protocol.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] for a malformed or oversized
    /// request, or when none of the configured protocols is acceptable.
    pub fn accept_handshake_as_server(&mut self, request: &ClientHandshake) -> Result<()> {
        self.reset();
        self.limits.check_handshake_size(handshake_size(request))?;
        check_upgrade_headers(request)?;

        let version = request.field_value(SEC_WEBSOCKET_VERSION).trim();
        if version != WEBSOCKET_VERSION {
            return Err(Error::invalid_handshake(format!(
                "unsupported {}: {:?}",
                SEC_WEBSOCKET_VERSION, version
            )));
        }
        if request.field_value(SEC_WEBSOCKET_KEY).trim().is_empty() {
            return Err(Error::invalid_handshake(format!(
                "missing {}",
                SEC_WEBSOCKET_KEY
            )));
        }

        let offered = request.field_value(SEC_WEBSOCKET_EXTENSIONS);
        let extension = self.select_extension(|ext| ext.accept_offer_as_server(offered));
        let extension = extension.unwrap_or_else(|| Box::new(DefaultExtension));

        let offered = request.field_value(SEC_WEBSOCKET_PROTOCOL);
        let protocol = self
            .select_protocol(|proto| proto.accept_offer_as_server(offered))
            .ok_or_else(|| {
                Error::invalid_handshake(format!("no acceptable sub-protocol in {:?}", offered))
            })?;

        debug!(
            "accepted handshake for {:?}: extension={:?} protocol={:?}",
            request.resource_descriptor(),
            extension.token(),
            protocol.token()
        );
        self.extension = Some(extension);
        self.protocol = Some(protocol);
        self.role = Some(Role::Server);
        Ok(())
    }

    /// Fill in the server's response to an accepted request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteHandshake`] unless
    /// [`Negotiator::accept_handshake_as_server`] succeeded first.
    pub fn post_process_response_as_server(
        &self,
        request: &ClientHandshake,
        response: &mut ServerHandshake,
    ) -> Result<()> {
        if self.role != Some(Role::Server) {
            return Err(incomplete("response built before the request was accepted"));
        }
        let extension = self.negotiated_extension()?;
        let protocol = self.negotiated_protocol()?;

        response.set_status(SWITCHING_PROTOCOLS, "Switching Protocols");
        response.put("Upgrade", "websocket");
        response.put("Connection", "Upgrade");
        response.put(
            SEC_WEBSOCKET_ACCEPT,
            compute_accept_key(request.field_value(SEC_WEBSOCKET_KEY).trim()),
        );

        let selected = extension.provided_offer_as_server();
        if !selected.is_empty() {
            response.put(SEC_WEBSOCKET_EXTENSIONS, selected);
        }
        let selected = protocol.provided_offer_as_server();
        if !selected.is_empty() {
            response.put(SEC_WEBSOCKET_PROTOCOL, selected);
        }
        Ok(())
    }

    /// Validate the server's response to `request` and adopt its selections.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the server did not switch
    /// protocols, the accept key is wrong, or it selected an extension or
    /// protocol this client did not offer.
    pub fn accept_handshake_as_client(
        &mut self,
        request: &ClientHandshake,
        response: &ServerHandshake,
    ) -> Result<()> {
        self.reset();
        self.limits.check_handshake_size(handshake_size(response))?;

        if response.status() != SWITCHING_PROTOCOLS {
            return Err(Error::invalid_handshake(format!(
                "server answered {} {}",
                response.status(),
                response.status_message()
            )));
        }
        check_upgrade_headers(response)?;

        let expected = compute_accept_key(request.field_value(SEC_WEBSOCKET_KEY).trim());
        if response.field_value(SEC_WEBSOCKET_ACCEPT).trim() != expected {
            return Err(Error::invalid_handshake(format!(
                "wrong {}",
                SEC_WEBSOCKET_ACCEPT
            )));
        }

        let selected = response.field_value(SEC_WEBSOCKET_EXTENSIONS);
        let extension: Box<dyn Extension> = if selected.trim().is_empty() {
            Box::new(DefaultExtension)
        } else {
            self.select_extension(|ext| ext.accept_offer_as_client(selected))
                .ok_or_else(|| {
                    Error::invalid_handshake(format!("unexpected extension {:?}", selected))
                })?
        };

        let selected = response.field_value(SEC_WEBSOCKET_PROTOCOL);
        let protocol = self
            .select_protocol(|proto| proto.accept_offer_as_client(selected))
            .ok_or_else(|| {
                Error::invalid_handshake(format!("unexpected sub-protocol {:?}", selected))
            })?;

        debug!(
            "server accepted: extension={:?} protocol={:?}",
            extension.token(),
            protocol.token()
        );
        self.extension = Some(extension);
        self.protocol = Some(protocol);
        self.role = Some(Role::Client);
        Ok(())
    }

    /// The extension selected by the accepted handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteHandshake`] before a handshake was accepted.
    pub fn negotiated_extension(&self) -> Result<&dyn Extension> {
        self.extension
            .as_deref()
            .ok_or_else(|| incomplete("extension queried before the handshake"))
    }

    /// The sub-protocol selected by the accepted handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteHandshake`] before a handshake was accepted.
    pub fn negotiated_protocol(&self) -> Result<&dyn SubProtocol> {
        self.protocol
            .as_deref()
            .ok_or_else(|| incomplete("sub-protocol queried before the handshake"))
    }

    /// Run an outgoing frame through the negotiated extension.
    ///
    /// # Errors
    ///
    /// Propagates extension failures; any error is terminal for the connection.
    pub fn encode_frame(&mut self, frame: &mut Frame) -> Result<()> {
        let extension = self
            .extension
            .as_mut()
            .ok_or_else(|| incomplete("frame encoded before the handshake"))?;
        extension.encode(frame)
    }

    /// Validate an incoming frame and run it through the negotiated extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFrame`] for reserved-bit violations and
    /// propagates decode failures; any error is terminal for the connection.
    pub fn decode_frame(&mut self, frame: &mut Frame) -> Result<()> {
        let extension = self
            .extension
            .as_mut()
            .ok_or_else(|| incomplete("frame decoded before the handshake"))?;
        extension.is_frame_valid(frame)?;
        trace!(
            "decoding {} frame (fin={}, {} bytes)",
            frame.opcode,
            frame.fin,
            frame.payload().len()
        );
        extension.decode(frame)
    }

    /// First duplicate of a known extension that `accepts`; prototypes stay untouched.
    fn select_extension<F>(&self, mut accepts: F) -> Option<Box<dyn Extension>>
    where
        F: FnMut(&mut dyn Extension) -> bool,
    {
        self.known_extensions.iter().find_map(|known| {
            let mut candidate = known.duplicate();
            accepts(candidate.as_mut()).then_some(candidate)
        })
    }

    fn select_protocol<F>(&self, mut accepts: F) -> Option<Box<dyn SubProtocol>>
    where
        F: FnMut(&mut dyn SubProtocol) -> bool,
    {
        self.known_protocols.iter().find_map(|known| {
            let mut candidate = known.duplicate();
            accepts(candidate.as_mut()).then_some(candidate)
        })
    }
}

fn incomplete(message: &str) -> Error {
    Error::IncompleteHandshake(message.to_string())
}

fn handshake_size(handshake: &dyn Handshake) -> usize {
    let fields: usize = handshake
        .iterate_fields()
        .map(|name| name.len() + handshake.field_value(name).len() + 4)
        .sum();
    fields + handshake.content().map_or(0, |content| content.len())
}

fn check_upgrade_headers(handshake: &dyn Handshake) -> Result<()> {
    if !handshake
        .field_value("Upgrade")
        .trim()
        .eq_ignore_ascii_case("websocket")
    {
        return Err(Error::invalid_handshake("missing Upgrade: websocket"));
    }
    if !offer_contains(handshake.field_value("Connection"), "upgrade") {
        return Err(Error::invalid_handshake("missing Connection: Upgrade"));
    }
    Ok(())
}
