//! Sample classification and payload extraction.
//!
//! A sink's caps are classified once, on its first usable sample, and the
//! result is cached on the endpoint for its whole lifetime. Pad probes
//! classify every renegotiation snapshot the same way.

use crate::engine::SampleBuffer;
use crate::media::{AudioInfo, Caps, MediaKind, MediaProperties, VideoInfo};
use crate::pipeline::packet::{CapsNotification, SamplePayload};

/// Result of inspecting a caps descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub kind: MediaKind,
    /// Full caps name, e.g. `video/x-raw`
    pub media_type_string: String,
    pub media_type: String,
    pub format: String,
    pub properties: MediaProperties,
}

/// Decide the media kind and derive its structured properties.
///
/// Derivation failures keep the kind and leave the properties empty.
pub fn classify(caps: &Caps) -> Classification {
    let kind = MediaKind::from_caps_name(caps.name());
    let (media_type, format) = caps.split_media_type();

    let properties = match kind {
        MediaKind::Audio => AudioInfo::from_caps(caps)
            .map(MediaProperties::Audio)
            .unwrap_or(MediaProperties::Empty),
        MediaKind::Video => VideoInfo::from_caps(caps)
            .map(MediaProperties::Video)
            .unwrap_or(MediaProperties::Empty),
        MediaKind::Other => MediaProperties::Other {
            media_type: media_type.to_string(),
            format: format.to_string(),
        },
    };

    if properties.is_empty() {
        tracing::debug!("No structured info derivable from caps {}", caps);
    }

    Classification {
        kind,
        media_type_string: caps.name().to_string(),
        media_type: media_type.to_string(),
        format: format.to_string(),
        properties,
    }
}

/// Copy a buffer's readable bytes into a payload.
///
/// Returns `None` when the buffer cannot be mapped.
pub fn extract_payload(
    classification: &Classification,
    buffer: &dyn SampleBuffer,
) -> Option<SamplePayload> {
    let bytes = buffer.map_readable()?;
    Some(SamplePayload {
        kind: classification.kind,
        media_type: classification.media_type.clone(),
        format: classification.format.clone(),
        properties: classification.properties.clone(),
        data: bytes.to_vec(),
    })
}

/// Build the probe notification for a renegotiated caps snapshot.
pub fn caps_notification(caps: &Caps) -> CapsNotification {
    let classification = classify(caps);
    CapsNotification {
        caps: caps.to_string(),
        kind: classification.kind,
        properties: classification.properties,
    }
}
