//! Raw video info derived from caps, including the default plane layout.

use super::caps::Caps;
use serde::Serialize;

/// Structure name for which video info can be derived
pub const RAW_VIDEO: &str = "video/x-raw";

#[inline]
fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Memory layout of one frame: per-plane strides and byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneLayout {
    pub strides: Vec<usize>,
    pub offsets: Vec<usize>,
    pub size: usize,
}

impl PlaneLayout {
    fn packed(stride: usize, height: usize) -> Self {
        Self {
            strides: vec![stride],
            offsets: vec![0],
            size: stride * height,
        }
    }

    /// Default layout for a known pixel format with 4-byte row alignment.
    pub fn for_format(format: &str, width: usize, height: usize) -> Option<Self> {
        let layout = match format {
            "I420" | "YV12" => {
                let s0 = round_up(width, 4);
                let s1 = round_up(round_up(width, 2) / 2, 4);
                let h = round_up(height, 2);
                let o1 = s0 * h;
                let o2 = o1 + s1 * (h / 2);
                Self {
                    strides: vec![s0, s1, s1],
                    offsets: vec![0, o1, o2],
                    size: o2 + s1 * (h / 2),
                }
            }
            "Y42B" => {
                let s0 = round_up(width, 4);
                let s1 = round_up(width, 8) / 2;
                let o1 = s0 * height;
                let o2 = o1 + s1 * height;
                Self {
                    strides: vec![s0, s1, s1],
                    offsets: vec![0, o1, o2],
                    size: o2 + s1 * height,
                }
            }
            "Y444" => {
                let s = round_up(width, 4);
                Self {
                    strides: vec![s, s, s],
                    offsets: vec![0, s * height, 2 * s * height],
                    size: 3 * s * height,
                }
            }
            "NV12" | "NV21" => {
                let s = round_up(width, 4);
                let h = round_up(height, 2);
                Self {
                    strides: vec![s, s],
                    offsets: vec![0, s * h],
                    size: s * h + s * (h / 2),
                }
            }
            "YUY2" | "UYVY" | "YVYU" => Self::packed(round_up(round_up(width, 2) * 2, 4), height),
            "RGB" | "BGR" => Self::packed(round_up(width * 3, 4), height),
            "RGBA" | "BGRA" | "ARGB" | "ABGR" | "RGBx" | "BGRx" | "xRGB" | "xBGR" => {
                Self::packed(width * 4, height)
            }
            "GRAY8" => Self::packed(round_up(width, 4), height),
            "GRAY16_LE" | "GRAY16_BE" => Self::packed(round_up(width * 2, 4), height),
            _ => return None,
        };
        Some(layout)
    }
}

/// Structured description of a raw video stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoInfo {
    #[serde(rename = "pixelFormat")]
    pub format: String,
    pub width: u32,
    pub height: u32,
    /// Byte offset of each plane; empty when the format layout is unknown
    pub planes: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub strides: Vec<usize>,
    #[serde(rename = "frameSize", skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

impl VideoInfo {
    /// Derive video info from a caps snapshot.
    ///
    /// Requires `video/x-raw` with a format string and positive dimensions.
    /// Formats without a known layout still produce info, with no planes.
    pub fn from_caps(caps: &Caps) -> Option<Self> {
        if caps.name() != RAW_VIDEO {
            return None;
        }
        let format = caps.get_str("format")?;
        let width = caps.get_int("width").filter(|w| *w > 0)? as u32;
        let height = caps.get_int("height").filter(|h| *h > 0)? as u32;

        let layout = PlaneLayout::for_format(format, width as usize, height as usize);
        let (planes, strides, size) = match layout {
            Some(l) => (l.offsets, l.strides, Some(l.size)),
            None => (Vec::new(), Vec::new(), None),
        };

        Some(Self {
            format: format.to_string(),
            width,
            height,
            planes,
            strides,
            size,
        })
    }
}
