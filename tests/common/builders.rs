//! Caps and sample builders

use sample_bridge::engine::Sample;
use sample_bridge::Caps;

/// Raw video caps with a known format
pub fn video_caps(format: &str, width: i32, height: i32) -> Caps {
    Caps::new("video/x-raw")
        .with_field("format", format)
        .with_field("width", width)
        .with_field("height", height)
}

/// Raw interleaved audio caps
pub fn audio_caps(format: &str, rate: i32, channels: i32) -> Caps {
    Caps::new("audio/x-raw")
        .with_field("format", format)
        .with_field("rate", rate)
        .with_field("channels", channels)
        .with_field("layout", "interleaved")
}

/// A sample whose payload is `len` copies of `fill`
pub fn filled_sample(caps: &Caps, len: usize, fill: u8) -> Sample {
    Sample::new(caps.clone(), vec![fill; len])
}

/// A sample whose first byte identifies it
pub fn tagged_sample(caps: &Caps, tag: u8) -> Sample {
    Sample::new(caps.clone(), vec![tag, 0, 0, 0])
}
