//! The frame as seen by extensions.
//!
//! Frames are parsed and serialised elsewhere; extensions only read the
//! header bits and swap the payload in place.

use crate::protocol::OpCode;

/// A WebSocket frame handed to an extension for encoding or decoding.
///
/// ```text
///  0 1 2 3 4 5 6 7
/// +-+-+-+-+-------+
/// |F|R|R|R| opcode|
/// |I|S|S|S|  (4)  |
/// |N|V|V|V|       |
/// | |1|2|3|       |
/// +-+-+-+-+-------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag. True if this is the last frame of a message.
    pub fin: bool,
    /// Reserved bit 1. Marks a compressed message under permessage-deflate.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a frame with all reserved bits cleared.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            payload,
        }
    }

    /// Create a single-frame text message.
    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    /// Create a single-frame binary message.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Binary, data.into())
    }

    /// Create a continuation frame.
    #[must_use]
    pub fn continuation(fin: bool, data: impl Into<Vec<u8>>) -> Self {
        Self::new(fin, OpCode::Continuation, data.into())
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, data.into())
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, data.into())
    }

    /// Create a close frame with optional status code and reason.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = match code {
            Some(code) => {
                let mut data = code.to_be_bytes().to_vec();
                data.extend_from_slice(reason.as_bytes());
                data
            }
            None => Vec::new(),
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Split `data` into a message of `chunk_size` frames: a first frame
    /// with `opcode` followed by continuations, the last one final.
    ///
    /// An empty `data` still yields one (empty, final) frame.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    #[must_use]
    pub fn fragment(opcode: OpCode, data: &[u8], chunk_size: usize) -> Vec<Frame> {
        assert!(chunk_size > 0, "chunk_size must be non-zero");
        if data.is_empty() {
            return vec![Frame::new(true, opcode, Vec::new())];
        }
        let count = data.len().div_ceil(chunk_size);
        data.chunks(chunk_size)
            .enumerate()
            .map(|(i, chunk)| {
                let op = if i == 0 { opcode } else { OpCode::Continuation };
                Frame::new(i + 1 == count, op, chunk.to_vec())
            })
            .collect()
    }

    /// Get the payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Replace the payload.
    #[inline]
    pub fn set_payload(&mut self, payload: Vec<u8>) {
        self.payload = payload;
    }

    /// Take the payload out, leaving the frame empty.
    #[inline]
    pub fn take_payload(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.payload)
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// True if any of RSV1, RSV2 or RSV3 is set.
    #[inline]
    #[must_use]
    pub const fn has_reserved_bits(&self) -> bool {
        self.rsv1 || self.rsv2 || self.rsv3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_frame_has_clear_reserved_bits() {
        let frame = Frame::text("hi");
        assert!(!frame.has_reserved_bits());
        assert!(frame.fin);
        assert_eq!(frame.payload(), b"hi");
    }

    #[test]
    fn test_close_frame_with_reason() {
        let frame = Frame::close(Some(1000), "bye");
        assert_eq!(frame.payload(), &[0x03, 0xe8, b'b', b'y', b'e']);
        assert!(Frame::close(None, "").payload().is_empty());
    }

    #[test]
    fn test_fragment_layout() {
        let frames = Frame::fragment(OpCode::Binary, b"abcdefg", 3);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].opcode, OpCode::Binary);
        assert!(!frames[0].fin);
        assert_eq!(frames[1].opcode, OpCode::Continuation);
        assert!(!frames[1].fin);
        assert_eq!(frames[2].opcode, OpCode::Continuation);
        assert!(frames[2].fin);
        assert_eq!(frames[2].payload(), b"g");
    }

    #[test]
    fn test_fragment_empty_message() {
        let frames = Frame::fragment(OpCode::Text, b"", 16);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
        assert_eq!(frames[0].opcode, OpCode::Text);
    }

    #[test]
    fn test_payload_swap() {
        let mut frame = Frame::binary(vec![1, 2, 3]);
        let taken = frame.take_payload();
        assert_eq!(taken, vec![1, 2, 3]);
        assert!(frame.payload().is_empty());
        frame.set_payload(vec![9]);
        assert_eq!(frame.into_payload(), vec![9]);
    }
}
