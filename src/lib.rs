//! # rsws-negotiate - WebSocket handshake negotiation and permessage-deflate
//!
//! `rsws-negotiate` is the layer of a WebSocket stack that sits between the
//! HTTP upgrade and the frame codec. It decides which extension and
//! sub-protocol a connection uses (RFC 6455) and implements the
//! permessage-deflate extension (RFC 7692) as an in-place frame transform.
//!
//! ## Features
//!
//! - **Capability negotiation** for extensions and sub-protocols, with
//!   per-connection instances created from configured prototypes
//! - **Permessage-deflate** with streaming compression and both
//!   context-takeover modes
//! - **Strict reserved-bit validation**: every failure maps to a close code
//! - **Handshake records** and a UTF-8 / ASCII text codec
//!
//! Transport, frame parsing and message reassembly are left to the caller.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rsws_negotiate::{ClientHandshake, Config, ServerHandshake};
//!
//! let prototype = Config::server().with_protocol("chat").negotiator();
//!
//! let mut negotiator = prototype.duplicate();
//! negotiator.accept_handshake_as_server(&request)?;
//! negotiator.post_process_response_as_server(&request, &mut response)?;
//! negotiator.decode_frame(&mut frame)?;
//! ```

pub mod capability;
pub mod config;
pub mod error;
pub mod extensions;
pub mod negotiator;
pub mod protocol;
pub mod role;
pub mod subprotocol;

pub use capability::Negotiable;
pub use config::{Config, Limits};
pub use error::{Error, Result};
pub use extensions::{DefaultExtension, Extension, ExtensionOffer, ExtensionParam};
pub use negotiator::Negotiator;
pub use protocol::{
    ClientHandshake, CloseCode, Frame, Handshake, HandshakeData, OpCode, ServerHandshake,
    WS_GUID, compute_accept_key,
};
pub use role::Role;
pub use subprotocol::{Protocol, SubProtocol};

#[cfg(feature = "compression")]
pub use extensions::deflate::{ContextScope, DeflateConfig, DeflateExtension};
