//! Raw audio info derived from caps.

use super::caps::Caps;
use serde::Serialize;

/// Structure name for which audio info can be derived
pub const RAW_AUDIO: &str = "audio/x-raw";

/// Bytes per sample for the raw sample formats the bridge knows about.
pub fn sample_width(format: &str) -> Option<u32> {
    let width = match format {
        "S8" | "U8" => 1,
        "S16LE" | "S16BE" | "U16LE" | "U16BE" => 2,
        "S24LE" | "S24BE" | "U24LE" | "U24BE" => 3,
        "S24_32LE" | "S24_32BE" | "U24_32LE" | "U24_32BE" => 4,
        "S32LE" | "S32BE" | "U32LE" | "U32BE" => 4,
        "F32LE" | "F32BE" => 4,
        "F64LE" | "F64BE" => 8,
        _ => return None,
    };
    Some(width)
}

/// Structured description of an interleaved raw audio stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInfo {
    pub channels: u32,
    #[serde(rename = "samplingRate")]
    pub rate: u32,
    /// Bytes per frame (all channels); absent for unknown sample formats
    #[serde(rename = "sampleSize", skip_serializing_if = "Option::is_none")]
    pub bpf: Option<u32>,
    #[serde(rename = "sampleFormat", skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl AudioInfo {
    /// Derive audio info from a caps snapshot.
    ///
    /// Returns `None` unless the caps are `audio/x-raw` with a positive rate
    /// and channel count.
    pub fn from_caps(caps: &Caps) -> Option<Self> {
        if caps.name() != RAW_AUDIO {
            return None;
        }
        let rate = positive(caps.get_int("rate"))?;
        let channels = positive(caps.get_int("channels"))?;
        let format = caps.get_str("format").map(str::to_string);
        let bpf = format
            .as_deref()
            .and_then(sample_width)
            .map(|width| width * channels);

        Some(Self {
            channels,
            rate,
            bpf,
            format,
        })
    }
}

fn positive(value: Option<i32>) -> Option<u32> {
    value.filter(|v| *v > 0).map(|v| v as u32)
}
