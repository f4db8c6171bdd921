//! Media descriptions: caps snapshots and the structured info derived from them.

pub mod audio;
pub mod caps;
pub mod video;

pub use audio::AudioInfo;
pub use caps::{Caps, CapsValue};
pub use video::{PlaneLayout, VideoInfo};

use serde::Serialize;
use serde_json::{Map, Value};

/// Broad media category, decided by the caps name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Other,
}

impl MediaKind {
    pub fn from_caps_name(name: &str) -> Self {
        if name.starts_with("audio/") {
            MediaKind::Audio
        } else if name.starts_with("video/") {
            MediaKind::Video
        } else {
            MediaKind::Other
        }
    }
}

/// Kind-specific structured properties.
///
/// `Empty` is used when derivation failed; delivery still goes ahead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MediaProperties {
    Audio(AudioInfo),
    Video(VideoInfo),
    Other {
        #[serde(rename = "type")]
        media_type: String,
        format: String,
    },
    Empty,
}

impl MediaProperties {
    pub fn is_empty(&self) -> bool {
        matches!(self, MediaProperties::Empty)
    }

    pub fn audio(&self) -> Option<&AudioInfo> {
        match self {
            MediaProperties::Audio(info) => Some(info),
            _ => None,
        }
    }

    pub fn video(&self) -> Option<&VideoInfo> {
        match self {
            MediaProperties::Video(info) => Some(info),
            _ => None,
        }
    }

    /// Properties as a flat map of named values for the host runtime.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
