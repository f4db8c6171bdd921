//! # sample-bridge: media samples for single-threaded hosts
//!
//! Marshals notifications from a multi-threaded media pipeline engine onto a
//! single consumer thread. Engine threads only enqueue and signal; the
//! consumer drains, pulls samples from app sinks, classifies them and invokes
//! host callbacks in order.
//!
//! ## Architecture
//!
//! - **Engine**: trait seam over the media framework (GStreamer or a mock)
//! - **Pipeline**: event queue, notifier, registries, dispatcher and the
//!   host-facing [`Player`]
//! - **Media**: caps snapshots and derived audio/video info
//! - **Config**: TOML bridge configuration in the platform config directory
//!
//! ## Example
//!
//! ```ignore
//! use sample_bridge::{engine::mock::MockEngine, BridgeConfig, Player, SinkEvent};
//!
//! let engine = MockEngine::new();
//! let mut player = Player::new(Box::new(engine.clone()), BridgeConfig::load_or_default());
//! player.build("videotestsrc ! appsink name=video")?;
//! player.register_sink("video", |event: SinkEvent| {
//!     if let Some(payload) = event.payload() {
//!         println!("{} bytes of {}", payload.len(), payload.format);
//!     }
//! })?;
//! player.set_completion_callback(|()| println!("done"));
//! player.set_lifecycle_state(PipelineState::Playing)?;
//!
//! while !player.completion_fired() {
//!     player.wait_and_dispatch(None);
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod media;
pub mod pipeline;

// Re-export commonly used types
pub use config::BridgeConfig;
pub use engine::{MediaEngine, PipelineState};
pub use error::{BridgeError, Result, ResultExt};
pub use media::{AudioInfo, Caps, MediaKind, MediaProperties, VideoInfo};
pub use pipeline::{
    BridgeHandle, CapsNotification, DrainReport, EndpointState, Player, SamplePayload, SinkEvent,
    SinkEventKind,
};
