
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// PayloadType identifies the format of the RTP payload and determines
/// its interpretation by the application. Each codec in a RTP Session
/// will have a different PayloadType
/// <https://tools.ietf.org/html/rfc3550#section-3>
pub type PayloadType = u8;

/// SSRC represents a synchronization source
/// <https://tools.ietf.org/html/rfc3550#section-3>
#[allow(clippy::upper_case_acronyms)]
pub type SSRC = u32;

/// MIME subtype of retransmission codecs.
pub(crate) const RTX_SUBTYPE: &str = "rtx";

/// Name of the fmtp parameter pairing a RTX codec with its media codec.
pub(crate) const APT_PARAMETER: &str = "apt";

/// Name of the H264 fmtp parameter that must match on both sides.
pub(crate) const PACKETIZATION_MODE_PARAMETER: &str = "packetization-mode";

const MEDIA_KIND_AUDIO_STR: &str = "audio";
const MEDIA_KIND_VIDEO_STR: &str = "video";

/// MediaKind determines the type of a codec, track, producer or consumer
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl FromStr for MediaKind {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            MEDIA_KIND_AUDIO_STR => Ok(MediaKind::Audio),
            MEDIA_KIND_VIDEO_STR => Ok(MediaKind::Video),
            _ => Err(Error::ErrInvalidKind(raw.to_owned())),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            MediaKind::Audio => MEDIA_KIND_AUDIO_STR,
            MediaKind::Video => MEDIA_KIND_VIDEO_STR,
        };
        write!(f, "{s}")
    }
}

/// A single codec specific parameter value. Payload types and similar
/// small counters land in `Number`, any other JSON number in `OtherNumber`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CodecParameterValue {
    Number(u32),
    OtherNumber(serde_json::Number),
    Bool(bool),
    String(String),
}

impl CodecParameterValue {
    /// as_u32 returns the numeric value, parsing string values when needed.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            CodecParameterValue::Number(n) => Some(*n),
            CodecParameterValue::String(s) => s.parse().ok(),
            CodecParameterValue::OtherNumber(_) | CodecParameterValue::Bool(_) => None,
        }
    }
}

impl From<u32> for CodecParameterValue {
    fn from(v: u32) -> Self {
        CodecParameterValue::Number(v)
    }
}

impl From<u8> for CodecParameterValue {
    fn from(v: u8) -> Self {
        CodecParameterValue::Number(v as u32)
    }
}

impl From<&str> for CodecParameterValue {
    fn from(v: &str) -> Self {
        CodecParameterValue::String(v.to_owned())
    }
}

impl fmt::Display for CodecParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecParameterValue::Number(n) => write!(f, "{n}"),
            CodecParameterValue::OtherNumber(n) => write!(f, "{n}"),
            CodecParameterValue::Bool(b) => write!(f, "{b}"),
            CodecParameterValue::String(s) => write!(f, "{s}"),
        }
    }
}

/// Codec specific parameters (`a=fmtp` in SDP terms). Some of them, such as
/// `packetization-mode` in H264, are critical for codec matching.
pub type CodecParameters = BTreeMap<String, CodecParameterValue>;

/// RtcpFeedback signals the connection to use additional RTCP packet types.
/// <https://draft.ortc.org/#dom-rtcrtcpfeedback>
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcpFeedback {
    /// valid: ack, ccm, nack, goog-remb, transport-cc
    #[serde(rename = "type")]
    pub typ: String,

    /// The parameter value depends on the type.
    /// For example, type="nack" parameter="pli" will send Picture Loss Indicator packets.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parameter: String,
}

/// RtpCodecCapability describes a codec an endpoint is able to send or receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapability {
    pub name: String,
    pub mime_type: String,
    pub kind: MediaKind,
    pub clock_rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    pub preferred_payload_type: PayloadType,
    #[serde(default)]
    pub rtcp_feedback: Vec<RtcpFeedback>,
    #[serde(default)]
    pub parameters: CodecParameters,
}

impl RtpCodecCapability {
    /// is_rtx reports whether this is a retransmission codec.
    pub fn is_rtx(&self) -> bool {
        is_rtx_mime_type(&self.mime_type)
    }

    /// apt returns the associated payload type of a RTX codec.
    pub fn apt(&self) -> Option<PayloadType> {
        self.parameters
            .get(APT_PARAMETER)
            .and_then(CodecParameterValue::as_u32)
            .and_then(|v| PayloadType::try_from(v).ok())
    }
}

/// RtpHeaderExtension describes a RFC5285 RTP header extension an endpoint supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpHeaderExtension {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MediaKind>,
    pub uri: String,
    pub preferred_id: u16,
    #[serde(default)]
    pub preferred_encrypt: bool,
}

/// RtpCapabilities is the set of codecs, header extensions and FEC mechanisms
/// an endpoint can use. Immutable once obtained.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilities {
    #[serde(default)]
    pub codecs: Vec<RtpCodecCapability>,
    #[serde(default)]
    pub header_extensions: Vec<RtpHeaderExtension>,
    #[serde(default)]
    pub fec_mechanisms: Vec<String>,
}

/// RtpCodecParameters is a negotiated codec with its payload type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecParameters {
    pub name: String,
    pub mime_type: String,
    pub clock_rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    pub payload_type: PayloadType,
    #[serde(default)]
    pub rtcp_feedback: Vec<RtcpFeedback>,
    #[serde(default)]
    pub parameters: CodecParameters,
}

/// RtpHeaderExtensionParameters represents a negotiated RFC5285 RTP header extension.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpHeaderExtensionParameters {
    pub uri: String,
    pub id: u16,
    #[serde(default)]
    pub encrypt: bool,
}

/// RtpRtxParameters contains information relating to retransmission (RTX) settings.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpRtxParameters {
    pub ssrc: SSRC,
}

/// RtpEncodingParameters describes one encoding of a sending stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpEncodingParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssrc: Option<SSRC>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtx: Option<RtpRtxParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bitrate: Option<u32>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Default for RtpEncodingParameters {
    fn default() -> Self {
        RtpEncodingParameters {
            ssrc: None,
            rtx: None,
            max_bitrate: None,
            active: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// RtcpParameters carries the RTCP settings of a stream.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtcpParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduced_size: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mux: Option<bool>,
}

/// RtpParameters is a list of negotiated codecs and header extensions plus
/// the encodings and RTCP settings filled in by the media engine.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mux_id: Option<String>,
    #[serde(default)]
    pub codecs: Vec<RtpCodecParameters>,
    #[serde(default)]
    pub header_extensions: Vec<RtpHeaderExtensionParameters>,
    #[serde(default)]
    pub encodings: Vec<RtpEncodingParameters>,
    #[serde(default)]
    pub rtcp: RtcpParameters,
}

/// ExtendedCodec is a codec both sides support, annotated with the payload
/// types each direction uses. RTX payload types are either both set or both
/// unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedCodec {
    pub name: String,
    pub mime_type: String,
    pub kind: MediaKind,
    pub clock_rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    pub send_payload_type: PayloadType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_rtx_payload_type: Option<PayloadType>,
    pub recv_payload_type: PayloadType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recv_rtx_payload_type: Option<PayloadType>,
    #[serde(default)]
    pub rtcp_feedback: Vec<RtcpFeedback>,
    #[serde(default)]
    pub parameters: CodecParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedHeaderExtension {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MediaKind>,
    pub uri: String,
    pub send_id: u16,
    pub recv_id: u16,
}

/// ExtendedRtpCapabilities is the negotiation result between the local
/// device and the remote router. Computed once per room join.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedRtpCapabilities {
    pub codecs: Vec<ExtendedCodec>,
    pub header_extensions: Vec<ExtendedHeaderExtension>,
    pub fec_mechanisms: Vec<String>,
}

/// is_rtx_mime_type reports whether `mime_type` is `<kind>/rtx`, ignoring case.
pub(crate) fn is_rtx_mime_type(mime_type: &str) -> bool {
    match mime_type.split_once('/') {
        Some((kind, subtype)) => !kind.is_empty() && subtype.eq_ignore_ascii_case(RTX_SUBTYPE),
        None => false,
    }
}

/// rtx_mime_type builds the RTX mime type for a kind, e.g. `video/rtx`.
pub(crate) fn rtx_mime_type(kind: MediaKind) -> String {
    format!("{kind}/{RTX_SUBTYPE}")
}
