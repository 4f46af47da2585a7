//! Protocol-level types this layer consumes: frames, opcodes, close codes,
//! handshake records and the text codec.

pub mod close;
pub mod frame;
pub mod handshake;
pub mod opcode;
pub mod text;

pub use close::CloseCode;
pub use frame::Frame;
pub use handshake::{
    ClientHandshake, Handshake, HandshakeData, ServerHandshake, WS_GUID, compute_accept_key,
    generate_key,
};
pub use opcode::OpCode;
pub use text::{decode_ascii, decode_utf8_strict, decode_utf8_strict_from, encode_ascii, encode_utf8};
