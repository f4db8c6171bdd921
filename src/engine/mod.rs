//! Media engine interface
//!
//! The bridge consumes a small slice of an external pipeline engine: graph
//! construction from a textual description, name resolution, app-sink pulls,
//! pad caps probes and a bus end-of-stream hook. This module defines that
//! slice as traits so the bridge runs against a real engine or an in-process
//! mock.
//!
//! # Threading
//!
//! The trait methods are called on the consumer thread only. The hooks handed
//! to the engine ([`EngineHook`], [`CapsHook`]) are the exception: the engine
//! invokes them on its own worker threads, so they must be `Send + Sync` and
//! must not block.
//!
//! # Implementations
//!
//! - [`mock::MockEngine`] - in-process engine for tests (feature `mock-engine`)
//! - [`gst::GstEngine`] - GStreamer backend (feature `gstreamer`)

#[cfg(feature = "gstreamer")]
pub mod gst;
#[cfg(any(test, feature = "mock-engine"))]
pub mod mock;

use crate::error::{BridgeError, Result};
use crate::media::Caps;
use crate::pipeline::id::{EndpointId, PadId, ProbeId};
use std::sync::Arc;

/// Hook invoked by the engine on one of its worker threads.
pub type EngineHook = Arc<dyn Fn() + Send + Sync>;

/// Hook invoked with a fresh caps snapshot whenever a pad renegotiates.
pub type CapsHook = Arc<dyn Fn(Caps) + Send + Sync>;

/// Lifecycle states of a pipeline, with the engine's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PipelineState {
    VoidPending = 0,
    Null = 1,
    Ready = 2,
    Paused = 3,
    Playing = 4,
}

impl PipelineState {
    pub const ALL: [PipelineState; 5] = [
        PipelineState::VoidPending,
        PipelineState::Null,
        PipelineState::Ready,
        PipelineState::Paused,
        PipelineState::Playing,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or(BridgeError::UnknownState(code))
    }
}

/// Readable memory of a pulled sample.
pub trait SampleBuffer: Send {
    /// Map the buffer for reading; `None` when mapping fails.
    fn map_readable(&self) -> Option<&[u8]>;
}

impl SampleBuffer for Vec<u8> {
    fn map_readable(&self) -> Option<&[u8]> {
        Some(self.as_slice())
    }
}

/// A sample pulled from an app sink.
///
/// Either part may be missing; the dispatcher drops such samples.
pub struct Sample {
    pub caps: Option<Caps>,
    pub buffer: Option<Box<dyn SampleBuffer>>,
}

impl Sample {
    pub fn new(caps: Caps, data: impl Into<Vec<u8>>) -> Self {
        Self {
            caps: Some(caps),
            buffer: Some(Box::new(data.into())),
        }
    }
}

impl std::fmt::Debug for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sample")
            .field("caps", &self.caps.as_ref().map(|c| c.name().to_string()))
            .field("has_buffer", &self.buffer.is_some())
            .finish()
    }
}

/// Notifications an app sink raises on engine threads. `eos` fires when the
/// sink receives end-of-stream, possibly with samples still queued.
#[derive(Clone)]
pub struct SinkCallbacks {
    pub new_preroll: EngineHook,
    pub new_sample: EngineHook,
    pub eos: EngineHook,
}

impl SinkCallbacks {
    /// Use one hook for all three notifications.
    pub fn uniform(hook: EngineHook) -> Self {
        Self {
            new_preroll: hook.clone(),
            new_sample: hook.clone(),
            eos: hook,
        }
    }
}

/// An app-facing sink inside a graph.
pub trait AppSinkEndpoint: Send {
    /// Stable identity while the graph is alive
    fn id(&self) -> EndpointId;

    fn name(&self) -> String;

    /// Current queue depth; 0 means unlimited
    fn max_buffers(&self) -> u32;

    fn set_max_buffers(&self, max_buffers: u32);

    fn set_drop(&self, drop: bool);

    fn set_callbacks(&self, callbacks: SinkCallbacks);

    fn clear_callbacks(&self);

    /// Non-blocking preroll pull
    fn try_pull_preroll(&self) -> Option<Sample>;

    /// Non-blocking sample pull
    fn try_pull_sample(&self) -> Option<Sample>;

    /// True once EOS was received and no samples remain queued.
    ///
    /// Engines may also answer `true` while the sink is not running; callers
    /// only trust it after the `eos` hook fired.
    fn is_eos(&self) -> bool;
}

/// A pad inside a graph.
pub trait EnginePad: Send {
    fn id(&self) -> PadId;

    /// Install a downstream probe firing `hook` on caps events only.
    fn add_caps_probe(&self, hook: CapsHook) -> Option<ProbeId>;

    fn remove_probe(&self, probe: ProbeId);
}

/// A constructed processing graph.
pub trait EngineGraph: Send {
    /// Resolve a named element as an app sink.
    ///
    /// Fails with [`BridgeError::ElementNotFound`] or [`BridgeError::NotAnAppSink`].
    fn app_sink(&self, name: &str) -> Result<Box<dyn AppSinkEndpoint>>;

    /// Resolve a named pad on a named element.
    fn pad(&self, element: &str, pad: &str) -> Result<Box<dyn EnginePad>>;

    /// Install the graph-level end-of-stream hook, called synchronously from
    /// whichever thread posts the bus message.
    fn set_bus_eos_handler(&self, hook: EngineHook);

    fn clear_bus_eos_handler(&self);

    fn set_state(&self, state: PipelineState) -> Result<()>;

    /// Inject an end-of-stream event; returns whether the engine accepted it.
    fn send_eos(&self) -> bool;
}

/// Entry point of an engine: builds graphs from descriptions.
#[cfg_attr(test, mockall::automock)]
pub trait MediaEngine {
    fn parse_launch(&mut self, description: &str) -> Result<Box<dyn EngineGraph>>;
}
