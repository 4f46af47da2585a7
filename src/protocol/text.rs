//! Strict text encoding for handshake fields and text payloads.
//!
//! Decoding never substitutes replacement characters for invalid UTF-8;
//! malformed input is a protocol error carrying close code 1007.

use std::io::Cursor;

use crate::error::{Error, Result};
use crate::protocol::CloseCode;

/// Encode a string as UTF-8 bytes.
#[inline]
#[must_use]
pub fn encode_utf8(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

/// Encode a string as ASCII bytes.
///
/// Only used on values this crate builds itself (header names, tokens, keys).
///
/// # Panics
///
/// Panics if `s` contains a non-ASCII character. That is a programming error,
/// never a reaction to peer input.
#[must_use]
pub fn encode_ascii(s: &str) -> Vec<u8> {
    assert!(s.is_ascii(), "non-ASCII text passed to encode_ascii: {s:?}");
    s.as_bytes().to_vec()
}

/// Decode `length` bytes starting at `offset` as ASCII.
///
/// Bytes outside the ASCII range decode to U+FFFD.
///
/// # Panics
///
/// Panics if `offset + length` is out of bounds or overflows, like slice indexing.
#[must_use]
pub fn decode_ascii(bytes: &[u8], offset: usize, length: usize) -> String {
    // an overflowing end is out of bounds for any slice
    let end = offset.checked_add(length).unwrap_or(usize::MAX);
    bytes[offset..end]
        .iter()
        .map(|&b| if b.is_ascii() { char::from(b) } else { '\u{FFFD}' })
        .collect()
}

/// Decode bytes as UTF-8, rejecting malformed or overlong sequences.
///
/// # Errors
///
/// Returns `Error::InvalidPayload` with close code 1007 on invalid input.
pub fn decode_utf8_strict(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| Error::invalid_payload_caused_by(CloseCode::InvalidPayload, "invalid UTF-8", e))
}

/// Decode the unread remainder of `cursor` as UTF-8.
///
/// On success the cursor is advanced to the end of its buffer. On failure
/// its position is left where it was, so the caller can retry on a subrange.
///
/// # Errors
///
/// Returns `Error::InvalidPayload` with close code 1007 on invalid input.
pub fn decode_utf8_strict_from(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let mark = cursor.position();
    let buf: &[u8] = *cursor.get_ref();
    let start = usize::try_from(mark).unwrap_or(usize::MAX).min(buf.len());
    match decode_utf8_strict(&buf[start..]) {
        Ok(text) => {
            cursor.set_position(buf.len() as u64);
            Ok(text)
        }
        Err(err) => {
            cursor.set_position(mark);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ascii_range() {
        assert_eq!(decode_ascii(b"xhey", 1, 3), "hey");
        assert_eq!(decode_ascii(b"abc", 3, 0), "");
        assert_eq!(decode_ascii(&[b'a', 0xC3], 0, 2), "a\u{FFFD}");
    }

    #[test]
    #[should_panic]
    fn test_decode_ascii_overflowing_range_panics() {
        let _ = decode_ascii(b"abc", usize::MAX, 2);
    }

    #[test]
    #[should_panic]
    fn test_decode_ascii_past_end_panics() {
        let _ = decode_ascii(b"abc", 2, 2);
    }

    #[test]
    fn test_decode_valid_utf8() {
        assert_eq!(decode_utf8_strict(&[0x68, 0x69]).unwrap(), "hi");
        assert_eq!(
            decode_utf8_strict("Hello 世界 🌍".as_bytes()).unwrap(),
            "Hello 世界 🌍"
        );
        assert_eq!(decode_utf8_strict(&[]).unwrap(), "");
    }

    #[test]
    fn test_decode_overlong_rejected() {
        let err = decode_utf8_strict(&[0xc0, 0x80]).unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(_)));
        assert_eq!(err.close_code(), Some(CloseCode::InvalidPayload));
    }

    #[test]
    fn test_decode_invalid_sequences_rejected() {
        for bytes in [&[0x80][..], &[0xff][..], &[0xe2, 0x82][..], &[0xed, 0xa0, 0x80][..]] {
            assert!(decode_utf8_strict(bytes).is_err(), "{bytes:?}");
        }
    }

    #[test]
    fn test_cursor_advances_on_success() {
        let data = b"GET hello";
        let mut cursor = Cursor::new(&data[..]);
        cursor.set_position(4);
        assert_eq!(decode_utf8_strict_from(&mut cursor).unwrap(), "hello");
        assert_eq!(cursor.position(), data.len() as u64);
    }

    #[test]
    fn test_cursor_restored_on_failure() {
        let data = [b'o', b'k', 0xc0, 0x80];
        let mut cursor = Cursor::new(&data[..]);
        cursor.set_position(1);
        assert!(decode_utf8_strict_from(&mut cursor).is_err());
        assert_eq!(cursor.position(), 1);

        // retry on the valid subrange
        let mut sub = Cursor::new(&data[..2]);
        sub.set_position(cursor.position());
        assert_eq!(decode_utf8_strict_from(&mut sub).unwrap(), "k");
    }

    #[test]
    fn test_ascii_roundtrip() {
        let bytes = encode_ascii("Sec-WebSocket-Key");
        assert_eq!(decode_ascii(&bytes, 4, 9), "WebSocket");
        assert_eq!(decode_ascii(&[b'a', 0xe9, b'b'], 0, 3), "a\u{FFFD}b");
    }

    #[test]
    #[should_panic(expected = "non-ASCII")]
    fn test_encode_ascii_rejects_non_ascii() {
        let _ = encode_ascii("café");
    }

    #[test]
    fn test_encode_utf8() {
        assert_eq!(encode_utf8("é"), vec![0xc3, 0xa9]);
    }
}
