//! Permessage-deflate WebSocket compression extension (RFC 7692).
//!
//! Compression runs per frame over a DEFLATE stream that spans the whole
//! message. Every frame is sync-flushed; the final frame of a message drops
//! the `00 00 ff ff` sync-flush trailer on the wire and the receiver puts it
//! back before inflating.

use std::fmt;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use log::{debug, trace};

use crate::capability::Negotiable;
use crate::error::{Error, Result};
use crate::extensions::{Extension, ExtensionOffer, ExtensionParam};
use crate::protocol::{CloseCode, Frame, OpCode};
use crate::role::Role;

/// Registered extension token.
pub const EXTENSION_NAME: &str = "permessage-deflate";

/// Smallest LZ77 window a peer may negotiate (256 bytes).
pub const MIN_WINDOW_BITS: u8 = 8;
/// Largest and default LZ77 window (32 KB).
pub const MAX_WINDOW_BITS: u8 = 15;
/// Smallest window this endpoint compresses with; zlib has no raw 8-bit mode.
pub const MIN_COMPRESS_WINDOW_BITS: u8 = 9;

const DEFLATE_TRAILER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];
const OUTPUT_CHUNK: usize = 4096;

/// How long a compressor or decompressor keeps its sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextScope {
    /// A fresh handle per message (`*_no_context_takeover` negotiated).
    Message,
    /// One handle for the whole connection (context takeover).
    Connection,
}

/// Permessage-deflate settings.
///
/// On a server these are the limits it enforces; on a client they are what
/// it asks for. After negotiation the extension holds the agreed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeflateConfig {
    pub server_no_context_takeover: bool,
    pub client_no_context_takeover: bool,
    pub server_max_window_bits: u8,
    pub client_max_window_bits: u8,
    pub compression_level: u32,
    /// Upper bound on one decompressed message, in bytes.
    pub max_message_size: usize,
}

impl Default for DeflateConfig {
    fn default() -> Self {
        Self {
            server_no_context_takeover: false,
            client_no_context_takeover: false,
            server_max_window_bits: MAX_WINDOW_BITS,
            client_max_window_bits: MAX_WINDOW_BITS,
            compression_level: 6,
            max_message_size: 64 * 1024 * 1024,
        }
    }
}

impl DeflateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_no_context_takeover(mut self, value: bool) -> Self {
        self.server_no_context_takeover = value;
        self
    }

    pub fn client_no_context_takeover(mut self, value: bool) -> Self {
        self.client_no_context_takeover = value;
        self
    }

    pub fn server_max_window_bits(mut self, bits: u8) -> Result<Self> {
        self.server_max_window_bits = check_window_bits("server_max_window_bits", bits)?;
        Ok(self)
    }

    pub fn client_max_window_bits(mut self, bits: u8) -> Result<Self> {
        self.client_max_window_bits = check_window_bits("client_max_window_bits", bits)?;
        Ok(self)
    }

    pub fn compression_level(mut self, level: u32) -> Result<Self> {
        if level > 9 {
            return Err(Error::InvalidConfig(format!(
                "compression_level must be 0-9, got {}",
                level
            )));
        }
        self.compression_level = level;
        Ok(self)
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    fn no_context_takeover(&self, role: Role) -> bool {
        match role {
            Role::Client => self.client_no_context_takeover,
            Role::Server => self.server_no_context_takeover,
        }
    }

    fn max_window_bits(&self, role: Role) -> u8 {
        match role {
            Role::Client => self.client_max_window_bits,
            Role::Server => self.server_max_window_bits,
        }
    }
}

fn check_window_bits(name: &str, bits: u8) -> Result<u8> {
    if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&bits) {
        return Err(Error::InvalidConfig(format!(
            "{} must be {}-{}, got {}",
            name, MIN_WINDOW_BITS, MAX_WINDOW_BITS, bits
        )));
    }
    Ok(bits)
}

fn parse_window_bits(value: &str) -> Option<u8> {
    value
        .parse::<u8>()
        .ok()
        .filter(|bits| (MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(bits))
}

/// Per-connection permessage-deflate state.
///
/// Configure one instance as a prototype and give every connection its own
/// copy through [`Extension::duplicate`]; the compressor and decompressor
/// windows must never be shared between connections.
pub struct DeflateExtension {
    config: DeflateConfig,
    agreed: DeflateConfig,
    role: Role,
    deflater: Option<Compress>,
    inflater: Option<Decompress>,
    sending: bool,
    receiving: bool,
    received_len: usize,
}

impl DeflateExtension {
    /// Create a server-side extension.
    pub fn new(config: DeflateConfig) -> Self {
        Self::with_role(config, Role::Server)
    }

    /// Create a client-side extension.
    pub fn client(config: DeflateConfig) -> Self {
        Self::with_role(config, Role::Client)
    }

    /// Create a server-side extension.
    pub fn server(config: DeflateConfig) -> Self {
        Self::with_role(config, Role::Server)
    }

    fn with_role(config: DeflateConfig, role: Role) -> Self {
        Self {
            agreed: config.clone(),
            config,
            role,
            deflater: None,
            inflater: None,
            sending: false,
            receiving: false,
            received_len: 0,
        }
    }

    /// The role this instance compresses for.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Parameters in effect (the negotiated ones once a handshake was accepted).
    pub fn agreed(&self) -> &DeflateConfig {
        &self.agreed
    }

    /// Lifetime of the window used for outgoing messages.
    pub fn compressor_scope(&self) -> ContextScope {
        if self.agreed.no_context_takeover(self.role) {
            ContextScope::Message
        } else {
            ContextScope::Connection
        }
    }

    /// Lifetime of the window used for incoming messages.
    pub fn decompressor_scope(&self) -> ContextScope {
        if self.agreed.no_context_takeover(self.role.peer()) {
            ContextScope::Message
        } else {
            ContextScope::Connection
        }
    }

    /// Window bits this endpoint compresses with. Never below 9, which
    /// negotiation guarantees the peer agreed to.
    fn compress_window_bits(&self) -> u8 {
        self.agreed
            .max_window_bits(self.role)
            .max(MIN_COMPRESS_WINDOW_BITS)
    }

    fn new_deflater(&self) -> Compress {
        let bits = self.compress_window_bits();
        Compress::new_with_window_bits(Compression::new(self.agreed.compression_level), false, bits)
    }

    fn new_inflater(&self) -> Decompress {
        // a full window inflates any stream built with a smaller one
        Decompress::new_with_window_bits(false, MAX_WINDOW_BITS)
    }

    /// Server side of RFC 7692 Section 7.1: accept one offer's parameters.
    fn negotiate_as_server(&self, params: &[ExtensionParam]) -> Option<DeflateConfig> {
        let mut agreed = self.config.clone();
        agreed.server_max_window_bits = agreed
            .server_max_window_bits
            .max(MIN_COMPRESS_WINDOW_BITS);
        let mut client_bits = None;
        let mut seen: Vec<&str> = Vec::with_capacity(params.len());

        for param in params {
            if seen.contains(&param.name.as_str()) {
                debug!("{}: duplicate parameter {}", EXTENSION_NAME, param.name);
                return None;
            }
            seen.push(&param.name);

            match (param.name.as_str(), param.value.as_deref()) {
                ("server_no_context_takeover", None) => {
                    agreed.server_no_context_takeover = true;
                }
                ("client_no_context_takeover", None) => {
                    agreed.client_no_context_takeover = true;
                }
                ("server_max_window_bits", Some(value)) => {
                    let bits = parse_window_bits(value)?;
                    agreed.server_max_window_bits = agreed.server_max_window_bits.min(bits);
                }
                ("client_max_window_bits", None) => client_bits = Some(MAX_WINDOW_BITS),
                ("client_max_window_bits", Some(value)) => {
                    client_bits = Some(parse_window_bits(value)?);
                }
                _ => {
                    debug!("{}: declining parameter {}", EXTENSION_NAME, param);
                    return None;
                }
            }
        }

        if agreed.server_max_window_bits < MIN_COMPRESS_WINDOW_BITS {
            debug!(
                "{}: cannot compress with a {}-bit window",
                EXTENSION_NAME, agreed.server_max_window_bits
            );
            return None;
        }

        // the server may only narrow the client window if the client said it can
        agreed.client_max_window_bits = match client_bits {
            Some(bits) => self.config.client_max_window_bits.min(bits),
            None => MAX_WINDOW_BITS,
        };
        Some(agreed)
    }

    /// Client side of RFC 7692 Section 7.1: validate the server's selection.
    fn negotiate_as_client(&self, params: &[ExtensionParam]) -> Option<DeflateConfig> {
        let mut agreed = self.config.clone();
        agreed.server_no_context_takeover = false;
        agreed.server_max_window_bits = MAX_WINDOW_BITS;
        agreed.client_max_window_bits = agreed
            .client_max_window_bits
            .max(MIN_COMPRESS_WINDOW_BITS);
        let mut seen: Vec<&str> = Vec::with_capacity(params.len());

        for param in params {
            if seen.contains(&param.name.as_str()) {
                debug!("{}: duplicate parameter {}", EXTENSION_NAME, param.name);
                return None;
            }
            seen.push(&param.name);

            match (param.name.as_str(), param.value.as_deref()) {
                ("server_no_context_takeover", None) => {
                    agreed.server_no_context_takeover = true;
                }
                ("client_no_context_takeover", None) => {
                    agreed.client_no_context_takeover = true;
                }
                ("server_max_window_bits", Some(value)) => {
                    let bits = parse_window_bits(value)?;
                    if bits > self.config.server_max_window_bits {
                        debug!(
                            "{}: server window {} exceeds requested {}",
                            EXTENSION_NAME, bits, self.config.server_max_window_bits
                        );
                        return None;
                    }
                    agreed.server_max_window_bits = bits;
                }
                ("client_max_window_bits", Some(value)) => {
                    let bits = parse_window_bits(value)?;
                    if bits < MIN_COMPRESS_WINDOW_BITS {
                        debug!("{}: cannot compress with a {}-bit window", EXTENSION_NAME, bits);
                        return None;
                    }
                    agreed.client_max_window_bits = agreed.client_max_window_bits.min(bits);
                }
                _ => {
                    debug!("{}: rejecting parameter {}", EXTENSION_NAME, param);
                    return None;
                }
            }
        }
        Some(agreed)
    }

    fn accept(&mut self, header: &str, role: Role) -> bool {
        let Ok(offers) = ExtensionOffer::parse_header(header) else {
            return false;
        };
        let agreed = offers
            .iter()
            .filter(|offer| offer.is_named(EXTENSION_NAME))
            .find_map(|offer| match role {
                Role::Server => self.negotiate_as_server(&offer.params),
                Role::Client => self.negotiate_as_client(&offer.params),
            });

        match agreed {
            Some(agreed) => {
                debug!(
                    "{} accepted as {}: {}",
                    EXTENSION_NAME,
                    role,
                    Self::describe(&agreed)
                );
                self.agreed = agreed;
                self.role = role;
                self.reset();
                true
            }
            None => false,
        }
    }

    fn describe(params: &DeflateConfig) -> ExtensionOffer {
        let mut offer = ExtensionOffer::new(EXTENSION_NAME);
        if params.server_no_context_takeover {
            offer.params.push(ExtensionParam::flag("server_no_context_takeover"));
        }
        if params.client_no_context_takeover {
            offer.params.push(ExtensionParam::flag("client_no_context_takeover"));
        }
        if params.server_max_window_bits < MAX_WINDOW_BITS {
            offer.params.push(ExtensionParam::new(
                "server_max_window_bits",
                params.server_max_window_bits.to_string(),
            ));
        }
        if params.client_max_window_bits < MAX_WINDOW_BITS {
            offer.params.push(ExtensionParam::new(
                "client_max_window_bits",
                params.client_max_window_bits.to_string(),
            ));
        }
        offer
    }

    fn check_sequence(frame: &Frame, in_message: bool) -> Result<()> {
        match frame.opcode {
            OpCode::Continuation if !in_message => Err(Error::invalid_frame(
                "continuation frame without a message in progress",
            )),
            OpCode::Text | OpCode::Binary if in_message => Err(Error::invalid_frame(format!(
                "{} frame while a fragmented message is in progress",
                frame.opcode
            ))),
            _ => Ok(()),
        }
    }
}

/// Sync-flush `input` through `deflater`, appending everything produced to `out`.
fn deflate(deflater: &mut Compress, mut input: &[u8], out: &mut Vec<u8>) -> Result<()> {
    loop {
        if out.capacity() - out.len() < OUTPUT_CHUNK {
            out.reserve(OUTPUT_CHUNK);
        }
        let before_in = deflater.total_in();
        let before_out = deflater.total_out();
        deflater
            .compress_vec(input, out, FlushCompress::Sync)
            .map_err(|e| {
                Error::invalid_payload_caused_by(CloseCode::InternalError, "compression failed", e)
            })?;
        let consumed = (deflater.total_in() - before_in) as usize;
        let produced = deflater.total_out() - before_out;
        input = &input[consumed..];

        // a flush is complete once output stops filling the buffer
        if input.is_empty() && out.len() < out.capacity() {
            return Ok(());
        }
        if consumed == 0 && produced == 0 {
            return Err(Error::invalid_payload_with_code(
                CloseCode::InternalError,
                "compressor made no progress",
            ));
        }
    }
}

/// Inflate `input` through `inflater`, appending to `out` up to `limit` bytes.
///
/// Returns `true` if the peer ended the DEFLATE stream (a BFINAL block).
fn inflate(
    inflater: &mut Decompress,
    mut input: &[u8],
    out: &mut Vec<u8>,
    limit: usize,
) -> Result<bool> {
    loop {
        if out.capacity() - out.len() < OUTPUT_CHUNK {
            out.reserve(OUTPUT_CHUNK);
        }
        let before_in = inflater.total_in();
        let before_out = inflater.total_out();
        let status = inflater
            .decompress_vec(input, out, FlushDecompress::Sync)
            .map_err(|e| {
                Error::invalid_payload_caused_by(
                    CloseCode::PolicyViolation,
                    "decompression failed",
                    e,
                )
            })?;
        let consumed = (inflater.total_in() - before_in) as usize;
        let produced = inflater.total_out() - before_out;
        input = &input[consumed..];

        if out.len() > limit {
            return Err(Error::invalid_payload_with_code(
                CloseCode::MessageTooBig,
                format!("decompressed message exceeds {} bytes", limit),
            ));
        }
        match status {
            Status::StreamEnd => return Ok(true),
            Status::Ok | Status::BufError => {
                if input.is_empty() && out.len() < out.capacity() {
                    return Ok(false);
                }
                if consumed == 0 && produced == 0 {
                    return Err(Error::invalid_payload_with_code(
                        CloseCode::PolicyViolation,
                        "decompressor made no progress",
                    ));
                }
            }
        }
    }
}

impl fmt::Debug for DeflateExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeflateExtension")
            .field("role", &self.role)
            .field("agreed", &self.agreed)
            .field("deflater", &self.deflater.is_some())
            .field("inflater", &self.inflater.is_some())
            .finish()
    }
}

impl Negotiable for DeflateExtension {
    fn token(&self) -> &str {
        EXTENSION_NAME
    }

    fn accept_offer_as_server(&mut self, offer: &str) -> bool {
        self.accept(offer, Role::Server)
    }

    fn accept_offer_as_client(&mut self, offer: &str) -> bool {
        self.accept(offer, Role::Client)
    }

    fn provided_offer_as_server(&self) -> String {
        Self::describe(&self.agreed).to_string()
    }

    fn provided_offer_as_client(&self) -> String {
        let mut offer = ExtensionOffer::new(EXTENSION_NAME);
        let client_bits = self
            .config
            .client_max_window_bits
            .max(MIN_COMPRESS_WINDOW_BITS);
        if client_bits < MAX_WINDOW_BITS {
            offer.params.push(ExtensionParam::new(
                "client_max_window_bits",
                client_bits.to_string(),
            ));
        } else {
            offer.params.push(ExtensionParam::flag("client_max_window_bits"));
        }
        if self.config.server_max_window_bits < MAX_WINDOW_BITS {
            offer.params.push(ExtensionParam::new(
                "server_max_window_bits",
                self.config.server_max_window_bits.to_string(),
            ));
        }
        if self.config.server_no_context_takeover {
            offer.params.push(ExtensionParam::flag("server_no_context_takeover"));
        }
        if self.config.client_no_context_takeover {
            offer.params.push(ExtensionParam::flag("client_no_context_takeover"));
        }
        offer.to_string()
    }
}

impl Extension for DeflateExtension {
    fn is_frame_valid(&self, frame: &Frame) -> Result<()> {
        match frame.opcode {
            OpCode::Continuation if frame.has_reserved_bits() => Err(Error::invalid_frame(
                format!(
                    "reserved bits set on continuation frame: rsv1={} rsv2={} rsv3={}",
                    frame.rsv1, frame.rsv2, frame.rsv3
                ),
            )),
            OpCode::Text | OpCode::Binary if !frame.rsv1 => Err(Error::invalid_frame(format!(
                "RSV1 not set on first {} frame of a compressed message",
                frame.opcode
            ))),
            OpCode::Text | OpCode::Binary if frame.rsv2 || frame.rsv3 => {
                Err(Error::invalid_frame("RSV2/RSV3 set on data frame"))
            }
            op if op.is_control() && frame.has_reserved_bits() => Err(Error::invalid_frame(
                format!("reserved bits set on {} frame", op),
            )),
            _ => Ok(()),
        }
    }

    fn encode(&mut self, frame: &mut Frame) -> Result<()> {
        if !frame.opcode.is_data() {
            return Ok(());
        }
        Self::check_sequence(frame, self.sending)?;

        if frame.opcode.starts_message() {
            frame.rsv1 = true;
            if self.compressor_scope() == ContextScope::Message {
                self.deflater = None;
            }
        } else {
            frame.rsv1 = false;
        }

        // taken out for the call; dropped on error, returned only when it must persist
        let mut deflater = match self.deflater.take() {
            Some(deflater) => deflater,
            None => self.new_deflater(),
        };
        let mut compressed = Vec::with_capacity(frame.payload().len() / 2 + 16);
        deflate(&mut deflater, frame.payload(), &mut compressed)?;

        if frame.fin {
            if compressed.ends_with(&DEFLATE_TRAILER) {
                compressed.truncate(compressed.len() - DEFLATE_TRAILER.len());
            }
            if compressed.is_empty() {
                // nothing was pending; an empty stored-block header keeps the
                // receiver's re-appended trailer well-formed
                compressed.push(0x00);
            }
        }
        trace!(
            "{}: {} frame {} -> {} bytes (fin={})",
            EXTENSION_NAME,
            frame.opcode,
            frame.payload().len(),
            compressed.len(),
            frame.fin
        );
        frame.set_payload(compressed);

        self.sending = !frame.fin;
        if self.sending || self.compressor_scope() == ContextScope::Connection {
            self.deflater = Some(deflater);
        }
        Ok(())
    }

    fn decode(&mut self, frame: &mut Frame) -> Result<()> {
        if !frame.opcode.is_data() {
            return Ok(());
        }
        Self::check_sequence(frame, self.receiving)?;

        if frame.opcode.starts_message() {
            self.received_len = 0;
            if self.decompressor_scope() == ContextScope::Message {
                self.inflater = None;
            }
        }

        let mut inflater = match self.inflater.take() {
            Some(inflater) => inflater,
            None => self.new_inflater(),
        };
        let limit = self
            .agreed
            .max_message_size
            .saturating_sub(self.received_len);
        let mut decompressed = Vec::with_capacity(frame.payload().len().saturating_mul(2).min(limit));

        let mut ended = inflate(&mut inflater, frame.payload(), &mut decompressed, limit)?;
        if frame.fin && !ended {
            ended = inflate(&mut inflater, &DEFLATE_TRAILER, &mut decompressed, limit)?;
        }
        trace!(
            "{}: {} frame {} -> {} bytes (fin={})",
            EXTENSION_NAME,
            frame.opcode,
            frame.payload().len(),
            decompressed.len(),
            frame.fin
        );

        self.received_len += decompressed.len();
        frame.set_payload(decompressed);
        frame.rsv1 = false;

        self.receiving = !frame.fin;
        if ended {
            // the peer closed its stream; the next message starts a new one
            debug!("{}: peer ended the DEFLATE stream", EXTENSION_NAME);
            if !self.receiving {
                return Ok(());
            }
            inflater.reset(false);
        }
        if self.receiving || self.decompressor_scope() == ContextScope::Connection {
            self.inflater = Some(inflater);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.deflater = None;
        self.inflater = None;
        self.sending = false;
        self.receiving = false;
        self.received_len = 0;
    }

    fn duplicate(&self) -> Box<dyn Extension> {
        Box::new(Self::with_role(self.config.clone(), self.role))
    }
}
