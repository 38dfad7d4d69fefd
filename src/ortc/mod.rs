//! Capability negotiation between the local device and the remote router.
//!
//! Everything here is a pure function over immutable capability sets. No
//! function fails because nothing matched: absence is represented by empty
//! results. The only error is a mandatory room codec the room itself does
//! not advertise, which is a room configuration problem.


use unicase::UniCase;

use crate::error::{Error, Result};
use crate::rtp_parameters::*;

/// MIME_TYPE_H264 H264 MIME type.
/// Note: Matching should be case insensitive.
pub const MIME_TYPE_H264: &str = "video/H264";
/// MIME_TYPE_VP8 VP8 MIME type
pub const MIME_TYPE_VP8: &str = "video/VP8";
/// MIME_TYPE_VP9 VP9 MIME type
pub const MIME_TYPE_VP9: &str = "video/VP9";
/// MIME_TYPE_OPUS Opus MIME type
pub const MIME_TYPE_OPUS: &str = "audio/opus";
/// MIME_TYPE_PCMU PCMU MIME type
pub const MIME_TYPE_PCMU: &str = "audio/PCMU";

/// get_extended_rtp_capabilities intersects the local native capabilities with
/// the remote router capabilities. Remote ordering (preference) is kept.
pub fn get_extended_rtp_capabilities(
    local: &RtpCapabilities,
    remote: &RtpCapabilities,
) -> ExtendedRtpCapabilities {
    let mut extended = ExtendedRtpCapabilities::default();

    for remote_codec in &remote.codecs {
        if remote_codec.is_rtx() {
            continue;
        }

        let local_codec = match local
            .codecs
            .iter()
            .find(|local_codec| match_codec_capabilities(local_codec, remote_codec))
        {
            Some(local_codec) => local_codec,
            None => continue,
        };

        extended.codecs.push(ExtendedCodec {
            name: remote_codec.name.clone(),
            mime_type: remote_codec.mime_type.clone(),
            kind: remote_codec.kind,
            clock_rate: remote_codec.clock_rate,
            channels: remote_codec.channels,
            send_payload_type: local_codec.preferred_payload_type,
            send_rtx_payload_type: None,
            recv_payload_type: remote_codec.preferred_payload_type,
            recv_rtx_payload_type: None,
            rtcp_feedback: reduce_rtcp_feedback(local_codec, remote_codec),
            parameters: remote_codec.parameters.clone(),
        });
    }

    // RTX is paired only when both sides advertise it for the chosen codec.
    for extended_codec in &mut extended.codecs {
        let local_rtx = local.codecs.iter().find(|c| {
            c.is_rtx() && c.apt() == Some(extended_codec.send_payload_type)
        });
        let remote_rtx = remote.codecs.iter().find(|c| {
            c.is_rtx() && c.apt() == Some(extended_codec.recv_payload_type)
        });

        if let (Some(local_rtx), Some(remote_rtx)) = (local_rtx, remote_rtx) {
            extended_codec.send_rtx_payload_type = Some(local_rtx.preferred_payload_type);
            extended_codec.recv_rtx_payload_type = Some(remote_rtx.preferred_payload_type);
        }
    }

    for remote_ext in &remote.header_extensions {
        if let Some(local_ext) = local
            .header_extensions
            .iter()
            .find(|local_ext| match_header_extensions(local_ext, remote_ext))
        {
            extended.header_extensions.push(ExtendedHeaderExtension {
                kind: remote_ext.kind,
                uri: remote_ext.uri.clone(),
                send_id: local_ext.preferred_id,
                recv_id: remote_ext.preferred_id,
            });
        }
    }

    extended.fec_mechanisms = remote
        .fec_mechanisms
        .iter()
        .filter(|m| local.fec_mechanisms.contains(m))
        .cloned()
        .collect();

    extended
}

/// get_rtp_capabilities projects the extended capabilities into the
/// capabilities this endpoint is able to receive, keyed by the remote
/// (receiving) payload types.
pub fn get_rtp_capabilities(extended: &ExtendedRtpCapabilities) -> RtpCapabilities {
    let mut caps = RtpCapabilities::default();

    for extended_codec in &extended.codecs {
        caps.codecs.push(RtpCodecCapability {
            name: extended_codec.name.clone(),
            mime_type: extended_codec.mime_type.clone(),
            kind: extended_codec.kind,
            clock_rate: extended_codec.clock_rate,
            channels: extended_codec.channels,
            preferred_payload_type: extended_codec.recv_payload_type,
            rtcp_feedback: extended_codec.rtcp_feedback.clone(),
            parameters: extended_codec.parameters.clone(),
        });

        if let Some(recv_rtx_payload_type) = extended_codec.recv_rtx_payload_type {
            caps.codecs.push(RtpCodecCapability {
                name: RTX_SUBTYPE.to_owned(),
                mime_type: rtx_mime_type(extended_codec.kind),
                kind: extended_codec.kind,
                clock_rate: extended_codec.clock_rate,
                channels: None,
                preferred_payload_type: recv_rtx_payload_type,
                rtcp_feedback: vec![],
                parameters: apt_parameters(extended_codec.recv_payload_type),
            });
        }
    }

    for extended_ext in &extended.header_extensions {
        caps.header_extensions.push(RtpHeaderExtension {
            kind: extended_ext.kind,
            uri: extended_ext.uri.clone(),
            preferred_id: extended_ext.recv_id,
            preferred_encrypt: false,
        });
    }

    caps.fec_mechanisms = extended.fec_mechanisms.clone();

    caps
}

/// get_unsupported_codecs returns the remote codecs declared mandatory by the
/// room which the local device cannot receive. All of them are reported, not
/// only the first one.
pub fn get_unsupported_codecs(
    remote: &RtpCapabilities,
    mandatory_payload_types: &[PayloadType],
    extended: &ExtendedRtpCapabilities,
) -> Result<Vec<RtpCodecCapability>> {
    let mut unsupported = vec![];

    for &payload_type in mandatory_payload_types {
        let remote_codec = remote
            .codecs
            .iter()
            .find(|c| c.preferred_payload_type == payload_type)
            .ok_or(Error::ErrMandatoryCodecNotFound(payload_type))?;

        if !extended
            .codecs
            .iter()
            .any(|c| c.recv_payload_type == payload_type)
        {
            unsupported.push(remote_codec.clone());
        }
    }

    Ok(unsupported)
}

/// can_send reports whether at least one codec of `kind` was negotiated.
pub fn can_send(kind: MediaKind, extended: &ExtendedRtpCapabilities) -> bool {
    extended.codecs.iter().any(|c| c.kind == kind)
}

/// can_receive reports whether the primary (first) codec of the given
/// parameters is one this endpoint negotiated for receiving.
pub fn can_receive(rtp_parameters: &RtpParameters, extended: &ExtendedRtpCapabilities) -> bool {
    match rtp_parameters.codecs.first() {
        Some(codec) => extended
            .codecs
            .iter()
            .any(|c| c.recv_payload_type == codec.payload_type),
        None => false,
    }
}

/// get_sending_rtp_parameters returns the parameters used to send media of
/// `kind`: the first negotiated codec only, its RTX pairing if any, and every
/// header extension applicable to `kind`.
pub fn get_sending_rtp_parameters(
    kind: MediaKind,
    extended: &ExtendedRtpCapabilities,
) -> RtpParameters {
    let mut params = RtpParameters::default();

    // A single media codec plus an optional RTX codec. Simulcast and
    // multi-codec sending are layered on top by handlers.
    if let Some(extended_codec) = extended.codecs.iter().find(|c| c.kind == kind) {
        push_codec(
            &mut params,
            extended_codec,
            extended_codec.send_payload_type,
            extended_codec.send_rtx_payload_type,
        );
    }

    for extended_ext in &extended.header_extensions {
        if extended_ext.kind.map_or(true, |k| k == kind) {
            params.header_extensions.push(RtpHeaderExtensionParameters {
                uri: extended_ext.uri.clone(),
                id: extended_ext.send_id,
                encrypt: false,
            });
        }
    }

    params
}

/// get_receiving_full_rtp_parameters returns every negotiated codec of
/// `kind` with its receiving payload types, advertising full decode
/// capability.
pub fn get_receiving_full_rtp_parameters(
    kind: MediaKind,
    extended: &ExtendedRtpCapabilities,
) -> RtpParameters {
    let mut params = RtpParameters::default();

    for extended_codec in extended.codecs.iter().filter(|c| c.kind == kind) {
        push_codec(
            &mut params,
            extended_codec,
            extended_codec.recv_payload_type,
            extended_codec.recv_rtx_payload_type,
        );
    }

    for extended_ext in &extended.header_extensions {
        if extended_ext.kind.map_or(true, |k| k == kind) {
            params.header_extensions.push(RtpHeaderExtensionParameters {
                uri: extended_ext.uri.clone(),
                id: extended_ext.recv_id,
                encrypt: false,
            });
        }
    }

    params
}

fn push_codec(
    params: &mut RtpParameters,
    extended_codec: &ExtendedCodec,
    payload_type: PayloadType,
    rtx_payload_type: Option<PayloadType>,
) {
    params.codecs.push(RtpCodecParameters {
        name: extended_codec.name.clone(),
        mime_type: extended_codec.mime_type.clone(),
        clock_rate: extended_codec.clock_rate,
        channels: extended_codec.channels,
        payload_type,
        rtcp_feedback: extended_codec.rtcp_feedback.clone(),
        parameters: extended_codec.parameters.clone(),
    });

    if let Some(rtx_payload_type) = rtx_payload_type {
        params.codecs.push(RtpCodecParameters {
            name: RTX_SUBTYPE.to_owned(),
            mime_type: rtx_mime_type(extended_codec.kind),
            clock_rate: extended_codec.clock_rate,
            channels: None,
            payload_type: rtx_payload_type,
            rtcp_feedback: vec![],
            parameters: apt_parameters(payload_type),
        });
    }
}

fn apt_parameters(payload_type: PayloadType) -> CodecParameters {
    let mut parameters = CodecParameters::new();
    parameters.insert(APT_PARAMETER.to_owned(), payload_type.into());
    parameters
}

/// match_codec_capabilities compares kind, mime type (case insensitive),
/// clock rate, channels and, for H264, the packetization mode.
pub(crate) fn match_codec_capabilities(a: &RtpCodecCapability, b: &RtpCodecCapability) -> bool {
    if a.kind != b.kind
        || UniCase::new(a.mime_type.as_str()) != UniCase::new(b.mime_type.as_str())
        || a.clock_rate != b.clock_rate
        || a.channels != b.channels
    {
        return false;
    }

    if UniCase::new(a.mime_type.as_str()) == UniCase::new(MIME_TYPE_H264)
        && packetization_mode(a) != packetization_mode(b)
    {
        return false;
    }

    true
}

fn packetization_mode(codec: &RtpCodecCapability) -> u32 {
    codec
        .parameters
        .get(PACKETIZATION_MODE_PARAMETER)
        .and_then(CodecParameterValue::as_u32)
        .unwrap_or(0)
}

pub(crate) fn match_header_extensions(a: &RtpHeaderExtension, b: &RtpHeaderExtension) -> bool {
    if let (Some(a_kind), Some(b_kind)) = (a.kind, b.kind) {
        if a_kind != b_kind {
            return false;
        }
    }

    a.uri == b.uri
}

/// reduce_rtcp_feedback keeps the feedback entries of `a` that `b` also has.
fn reduce_rtcp_feedback(a: &RtpCodecCapability, b: &RtpCodecCapability) -> Vec<RtcpFeedback> {
    a.rtcp_feedback
        .iter()
        .filter(|fb| b.rtcp_feedback.contains(fb))
        .cloned()
        .collect()
}
