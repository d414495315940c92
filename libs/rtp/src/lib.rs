//! The packet type that flows from a pusher's source (an [`rtsp`] client
//! demux or a publishing session) down through every player queue to a
//! subscriber's socket. It carries no codec knowledge of its own: the
//! payload is whatever bytes arrived on the wire, tagged only with which
//! of the four interleaved channels it came from.

use bytes::Bytes;

/// Which of the four RTSP interleaved/UDP channels a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    VideoData,
    VideoCtl,
    AudioData,
    AudioCtl,
}

impl FrameKind {
    /// `true` for the two RTP data channels (as opposed to RTCP control).
    pub fn is_data(self) -> bool {
        matches!(self, FrameKind::VideoData | FrameKind::AudioData)
    }

    pub fn is_video(self) -> bool {
        matches!(self, FrameKind::VideoData | FrameKind::VideoCtl)
    }
}

/// An immutable RTP/RTCP frame. Cheap to clone (the payload is
/// reference-counted) since the same packet is fanned out to every
/// attached player's queue.
#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// The RTP sequence number embedded in a data packet's header (bytes
    /// 2-3, big-endian), used by the client demux to log out-of-order
    /// delivery. Returns `None` for anything shorter than a minimal RTP
    /// header or for control (RTCP) frames, which carry no such field.
    pub fn sequence_number(&self) -> Option<u16> {
        if !self.kind.is_data() || self.payload.len() < 4 {
            return None;
        }
        Some(u16::from_be_bytes([self.payload[2], self.payload[3]]))
    }

    /// Best-effort keyframe detection for H.264/H.265 payloads, used by
    /// the GOP cache to decide when to start a new buffer. Treats
    /// anything it can't positively identify as a keyframe as "not a
    /// keyframe" rather than risk caching a GOP that never closes.
    pub fn is_video_keyframe(&self) -> bool {
        if !self.kind.is_video() || self.payload.len() < 13 {
            return false;
        }
        // Skip the 12-byte fixed RTP header (no CSRC/extension support
        // assumed, matching the opaque-payload treatment elsewhere).
        let nal_byte = self.payload[12];
        let nal_type = nal_byte & 0x1f;
        match nal_type {
            5 => true,       // H.264 IDR slice
            24..=29 => true, // STAP-A/B, MTAP16/24, FU-A/B: conservatively assume coded slice carriers may start a GOP
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_number_reads_big_endian() {
        let p = RtpPacket::new(FrameKind::VideoData, vec![0x80, 0x60, 0x00, 0x2a]);
        assert_eq!(p.sequence_number(), Some(0x002a));
    }

    #[test]
    fn control_frames_have_no_sequence_number() {
        let p = RtpPacket::new(FrameKind::VideoCtl, vec![0x80, 0x60, 0x00, 0x2a]);
        assert_eq!(p.sequence_number(), None);
    }

    #[test]
    fn clone_is_cheap_and_shares_payload() {
        let p = RtpPacket::new(FrameKind::AudioData, vec![1, 2, 3]);
        let q = p.clone();
        assert_eq!(p.payload, q.payload);
    }
}
