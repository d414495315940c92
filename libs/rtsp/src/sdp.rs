//! SDP parsing (RFC 4566) for the one piece of it this spec cares about:
//! finding `m=video`/`m=audio` lines and their `control`/`rtpmap`
//! attributes (§6). Decoding the media itself is out of scope, so codec
//! parameters are kept as the raw rtpmap/fmtp strings rather than decoded
//! into a transcoder-ready structure.

use anyhow::{Result, anyhow};

/// Everything this implementation needs out of one `m=` section.
#[derive(Debug, Clone)]
pub struct MediaDescriptor {
    pub is_video: bool,
    pub payload_type: u8,
    /// e.g. "H264", "PCMA" -- the encoding name out of the `rtpmap`
    /// attribute, upper-cased.
    pub codec_name: Option<String>,
    pub clock_rate: Option<u32>,
    /// The `a=control:` attribute, verbatim (resolved against the
    /// session URL by [`resolve_control_url`]).
    pub control: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionDescriptor {
    pub medias: Vec<MediaDescriptor>,
}

impl SessionDescriptor {
    pub fn video(&self) -> Option<&MediaDescriptor> {
        self.medias.iter().find(|m| m.is_video)
    }

    pub fn audio(&self) -> Option<&MediaDescriptor> {
        self.medias.iter().find(|m| !m.is_video)
    }

    /// Whether `other` describes the same media as `self` closely enough
    /// for a rebind to hand existing Players straight to the new source
    /// (§4.6 "Rebinding": "SDP must match or migration is refused").
    /// Compares payload type and codec name per media line; a media
    /// present on one side and absent on the other also refuses.
    pub fn compatible_with(&self, other: &SessionDescriptor) -> bool {
        fn matches(a: Option<&MediaDescriptor>, b: Option<&MediaDescriptor>) -> bool {
            match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => a.payload_type == b.payload_type && a.codec_name == b.codec_name,
                _ => false,
            }
        }
        matches(self.video(), other.video()) && matches(self.audio(), other.audio())
    }
}

pub fn parse(sdp_bytes: &[u8]) -> Result<SessionDescriptor> {
    let session =
        sdp_types::Session::parse(sdp_bytes).map_err(|e| anyhow!("failed to parse SDP: {e}"))?;

    let mut medias = Vec::new();
    for media in &session.medias {
        let is_video = media.media == "video";
        let is_audio = media.media == "audio";
        if !is_video && !is_audio {
            continue;
        }

        let rtpmap = media
            .attributes
            .iter()
            .find(|a| a.attribute == "rtpmap")
            .and_then(|a| a.value.as_ref());

        let payload_type = rtpmap
            .and_then(|v| v.split_whitespace().next())
            .and_then(|pt| pt.parse::<u8>().ok())
            .ok_or_else(|| anyhow!("{} media has no payload type", media.media))?;

        let (codec_name, clock_rate) = match rtpmap.and_then(|v| v.split_once(' ')) {
            Some((_, rest)) => {
                let mut parts = rest.splitn(2, '/');
                let name = parts.next().map(|s| s.to_uppercase());
                let rate = parts.next().and_then(|s| s.split('/').next()).and_then(|s| s.parse().ok());
                (name, rate)
            }
            None => (None, None),
        };

        let control = media
            .attributes
            .iter()
            .find(|a| a.attribute == "control")
            .and_then(|a| a.value.clone());

        medias.push(MediaDescriptor {
            is_video,
            payload_type,
            codec_name,
            clock_rate,
            control,
        });
    }

    Ok(SessionDescriptor { medias })
}

/// Resolve a media's `control` attribute against the session/request URL
/// per §4.4: an absolute `rtsp://` URL (case-insensitive) is used as-is;
/// otherwise it's joined to the base with a single `/`.
pub fn resolve_control_url(base_url: &str, control: &str) -> String {
    if control.len() >= 7 && control[..7].eq_ignore_ascii_case("rtsp://") {
        control.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            control.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "v=0\r\n\
o=- 0 0 IN IP4 127.0.0.1\r\n\
s=stream\r\n\
c=IN IP4 127.0.0.1\r\n\
t=0 0\r\n\
m=video 0 RTP/AVP 96\r\n\
a=rtpmap:96 H264/90000\r\n\
a=control:trackID=0\r\n\
m=audio 0 RTP/AVP 97\r\n\
a=rtpmap:97 PCMA/8000\r\n\
a=control:trackID=1\r\n";

    #[test]
    fn parses_video_and_audio_media() {
        let sdp = parse(SAMPLE.as_bytes()).unwrap();
        let video = sdp.video().unwrap();
        assert_eq!(video.codec_name.as_deref(), Some("H264"));
        assert_eq!(video.clock_rate, Some(90000));
        assert_eq!(video.control.as_deref(), Some("trackID=0"));

        let audio = sdp.audio().unwrap();
        assert_eq!(audio.codec_name.as_deref(), Some("PCMA"));
        assert_eq!(audio.control.as_deref(), Some("trackID=1"));
    }

    #[test]
    fn resolves_absolute_control_case_insensitively() {
        let url = resolve_control_url("rtsp://host/live", "RTSP://other/x");
        assert_eq!(url, "RTSP://other/x");
    }

    #[test]
    fn joins_relative_control_with_single_slash() {
        let url = resolve_control_url("rtsp://host/live/", "/trackID=0");
        assert_eq!(url, "rtsp://host/live/trackID=0");
    }
}
