//! Framing for the single byte stream an RTSP/TCP connection carries: RTSP
//! request/response text mixed with `$`-prefixed interleaved RTP/RTCP
//! binary frames (C3 of the design). A connection's read loop calls
//! [`next_frame`] repeatedly; everything else in this module is the
//! leaf-level encode/decode it's built from.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use bytes::{Bytes, BytesMut};
use rtsp_types::Message;

use crate::constants::buffer::INTERLEAVED_HEADER_SIZE;

/// One item pulled off the wire by the demux loop: either a binary
/// interleaved frame on some channel, or a complete RTSP message.
#[derive(Debug)]
pub enum Frame {
    Interleaved { channel: u8, payload: Bytes },
    Message(Message<Vec<u8>>),
}

/// Headers the codec is required to recognize per spec (case-preserving
/// keys, duplicates collapsed into an ordered list). `rtsp-types` already
/// gives us a `HeaderValue`-based map; this helper just normalizes
/// duplicate headers the way the spec describes, for code that builds its
/// own requests/responses by hand rather than through `rtsp-types`'
/// builder.
pub fn collapse_duplicate_headers(raw: &[(String, String)]) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for (k, v) in raw {
        out.entry(k.clone()).or_default().push(v.clone());
    }
    out
}

/// Attempt to decode one frame from the front of `buf`. Returns `Ok(None)`
/// when `buf` doesn't yet contain a complete frame (the caller should read
/// more bytes and retry); on success, the consumed bytes are drained from
/// `buf`.
///
/// Byte `0x24` ("$") at the front selects the binary path; anything else
/// is handed to `rtsp-types` as a candidate text message.
pub fn next_frame(buf: &mut BytesMut) -> Result<Option<Frame>> {
    if buf.is_empty() {
        return Ok(None);
    }

    if buf[0] == b'$' {
        return decode_interleaved(buf);
    }

    match Message::<Vec<u8>>::parse(buf) {
        Ok((msg, consumed)) => {
            let _ = buf.split_to(consumed);
            Ok(Some(Frame::Message(msg)))
        }
        Err(rtsp_types::ParseError::Incomplete(_)) => Ok(None),
        Err(e) => Err(anyhow!("malformed RTSP message: {e:?}")),
    }
}

fn decode_interleaved(buf: &mut BytesMut) -> Result<Option<Frame>> {
    if buf.len() < INTERLEAVED_HEADER_SIZE {
        return Ok(None);
    }

    let channel = buf[1];
    // Length is a u16 on the wire, so it is already bounded at 65535 --
    // there is no larger value to reject.
    let length = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    let total = INTERLEAVED_HEADER_SIZE + length;
    if buf.len() < total {
        return Ok(None);
    }

    let frame = buf.split_to(total);
    let payload = Bytes::copy_from_slice(&frame[INTERLEAVED_HEADER_SIZE..]);
    Ok(Some(Frame::Interleaved { channel, payload }))
}

/// Encode a `$ | channel | len_be | payload` frame. Payloads longer than
/// `u16::MAX` cannot be represented and are rejected rather than
/// truncated.
pub fn encode_interleaved(channel: u8, payload: &[u8]) -> Result<Bytes> {
    if payload.len() > u16::MAX as usize {
        return Err(anyhow!(
            "payload too large for interleaved frame: {} bytes",
            payload.len()
        ));
    }
    let mut out = BytesMut::with_capacity(INTERLEAVED_HEADER_SIZE + payload.len());
    out.extend_from_slice(&[b'$', channel]);
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_interleaved_frames() {
        for (channel, payload) in [
            (0u8, vec![1, 2, 3, 4]),
            (3, vec![]),
            (255, vec![9u8; 1000]),
        ] {
            let encoded = encode_interleaved(channel, &payload).unwrap();
            let mut buf = BytesMut::from(&encoded[..]);
            let frame = next_frame(&mut buf).unwrap().unwrap();
            match frame {
                Frame::Interleaved {
                    channel: c,
                    payload: p,
                } => {
                    assert_eq!(c, channel);
                    assert_eq!(p.as_ref(), payload.as_slice());
                }
                _ => panic!("expected interleaved frame"),
            }
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn incomplete_frame_yields_none_and_leaves_buffer_untouched() {
        let mut buf = BytesMut::from(&[b'$', 0, 0, 4, 1, 2][..]);
        assert!(next_frame(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let payload = vec![0u8; u16::MAX as usize + 1];
        assert!(encode_interleaved(0, &payload).is_err());
    }
}
