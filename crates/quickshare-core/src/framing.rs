//! Length-prefixed framing codec (§4.1).
//!
//! Every packet on the wire is a 4-byte big-endian length prefix followed
//! by exactly that many bytes of body. [`FrameDecoder`] buffers arbitrary
//! byte slices (as they arrive off a `TcpStream`, in whatever chunks the
//! kernel hands back) and yields whole packets in order; [`encode_frame`]
//! does the reverse for the write side.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Packets larger than this are refused — not an interop requirement, just
/// a sanity ceiling so a corrupt or hostile peer cannot make us buffer an
/// unbounded amount of memory on a single length prefix.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Incrementally reassembles length-prefixed packets from a byte stream.
///
/// Feed it whatever the transport hands back with [`FrameDecoder::push`],
/// then drain complete packets with [`FrameDecoder::next_packet`]. Partial
/// length prefixes and partial bodies are buffered until the rest arrives.
#[derive(Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly-read bytes to the internal buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pull the next complete packet out of the buffer, if one has fully
    /// arrived. Call repeatedly after each [`push`](Self::push) — more
    /// than one packet may have arrived in a single read.
    pub fn next_packet(&mut self) -> Result<Option<Bytes>, FramingError> {
        if self.buf.len() < 4 {
            return Ok(None);
        }

        let len = u32::from_be_bytes(self.buf[..4].try_into().unwrap());
        if len > MAX_FRAME_LEN {
            return Err(FramingError::TooLarge(len));
        }

        let total = 4 + len as usize;
        if self.buf.len() < total {
            return Ok(None);
        }

        self.buf.advance(4);
        let packet = self.buf.split_to(len as usize).freeze();
        Ok(Some(packet))
    }
}

/// Encode `body` as a single framed packet: a 4-byte big-endian length
/// prefix followed by `body` verbatim.
pub fn encode_frame(body: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(4 + body.len());
    out.put_u32(body.len() as u32);
    out.put_slice(body);
    out.freeze()
}

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("frame length {0} exceeds the {MAX_FRAME_LEN}-byte cap")]
    TooLarge(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// §8 scenario 4 — a length prefix split across reads, plus a second
    /// packet arriving in one read.
    #[test]
    fn reassembles_across_reads() {
        let mut dec = FrameDecoder::new();
        dec.push(&[0, 0, 0, 3, b'a', b'b', b'c', 0, 0, 0]);
        dec.push(&[0, 2, b'x', b'y']);

        let first = dec.next_packet().unwrap().unwrap();
        assert_eq!(&first[..], b"abc");

        let second = dec.next_packet().unwrap().unwrap();
        assert_eq!(&second[..], b"xy");

        assert!(dec.next_packet().unwrap().is_none());
    }

    #[test]
    fn length_prefix_split_byte_by_byte() {
        let mut dec = FrameDecoder::new();
        for byte in [0u8, 0, 0, 5] {
            dec.push(&[byte]);
            assert!(dec.next_packet().unwrap().is_none());
        }
        dec.push(b"hello");
        assert_eq!(&dec.next_packet().unwrap().unwrap()[..], b"hello");
    }

    #[test]
    fn body_split_across_three_or_more_reads() {
        let mut dec = FrameDecoder::new();
        dec.push(&[0, 0, 0, 6]);
        dec.push(b"ab");
        assert!(dec.next_packet().unwrap().is_none());
        dec.push(b"cd");
        assert!(dec.next_packet().unwrap().is_none());
        dec.push(b"ef");
        assert_eq!(&dec.next_packet().unwrap().unwrap()[..], b"abcdef");
    }

    #[test]
    fn zero_length_packet_round_trips() {
        let frame = encode_frame(&[]);
        assert_eq!(&frame[..], &[0, 0, 0, 0]);

        let mut dec = FrameDecoder::new();
        dec.push(&frame);
        let packet = dec.next_packet().unwrap().unwrap();
        assert!(packet.is_empty());
    }

    #[test]
    fn rejects_oversize_length_prefix() {
        let mut dec = FrameDecoder::new();
        dec.push(&(MAX_FRAME_LEN + 1).to_be_bytes());
        assert!(matches!(dec.next_packet(), Err(FramingError::TooLarge(_))));
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let body = b"a reasonably sized payload chunk";
        let frame = encode_frame(body);

        let mut dec = FrameDecoder::new();
        dec.push(&frame);
        assert_eq!(&dec.next_packet().unwrap().unwrap()[..], &body[..]);
    }
}
