//! GStreamer backend.
//!
//! Graphs come from `gst::parse::launch`; app sinks are `appsink` elements
//! looked up by name. Endpoint and pad identities are the GObject addresses,
//! which stay stable while the graph holds a reference.

use super::{
    AppSinkEndpoint, CapsHook, EngineGraph, EngineHook, EnginePad, MediaEngine, PipelineState,
    Sample, SampleBuffer, SinkCallbacks,
};
use crate::error::{BridgeError, Result};
use crate::media::{Caps, CapsValue};
use crate::pipeline::id::{EndpointId, PadId, ProbeId};
use gst::glib;
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

fn object_key<T: glib::object::ObjectType>(object: &T) -> u64 {
    object.as_ptr() as usize as u64
}

fn gst_state(state: PipelineState) -> gst::State {
    match state {
        PipelineState::VoidPending => gst::State::VoidPending,
        PipelineState::Null => gst::State::Null,
        PipelineState::Ready => gst::State::Ready,
        PipelineState::Paused => gst::State::Paused,
        PipelineState::Playing => gst::State::Playing,
    }
}

fn convert_value(value: &glib::Value) -> CapsValue {
    if let Ok(v) = value.get::<i32>() {
        CapsValue::Int(v)
    } else if let Ok(v) = value.get::<bool>() {
        CapsValue::Bool(v)
    } else if let Ok(v) = value.get::<String>() {
        CapsValue::Str(v)
    } else if let Ok(v) = value.get::<f64>() {
        CapsValue::Double(v)
    } else if let Ok(v) = value.get::<gst::Fraction>() {
        CapsValue::Fraction(v.numer(), v.denom())
    } else if let Ok(list) = value.get::<gst::List>() {
        CapsValue::List(list.iter().map(|v| convert_value(v)).collect())
    } else {
        // Ranges, flags and other exotic types keep their textual form.
        CapsValue::Str(
            value
                .serialize()
                .map(|s| s.to_string())
                .unwrap_or_default(),
        )
    }
}

/// Snapshot the first structure of engine caps.
pub fn convert_caps(caps: &gst::CapsRef) -> Option<Caps> {
    let structure = caps.structure(0)?;
    let mut converted = Caps::new(structure.name().to_string());
    for (field, value) in structure.iter() {
        converted.set(field.to_string(), convert_value(value));
    }
    Some(converted)
}

struct MappedSampleBuffer(gst::MappedBuffer<gst::buffer::Readable>);

impl SampleBuffer for MappedSampleBuffer {
    fn map_readable(&self) -> Option<&[u8]> {
        Some(self.0.as_slice())
    }
}

fn convert_sample(sample: gst::Sample) -> Sample {
    let caps = sample.caps().and_then(convert_caps);
    let buffer = sample.buffer_owned().and_then(|buffer| {
        match buffer.into_mapped_buffer_readable() {
            Ok(mapped) => Some(Box::new(MappedSampleBuffer(mapped)) as Box<dyn SampleBuffer>),
            Err(_) => {
                tracing::trace!("Failed to map sample buffer");
                None
            }
        }
    });
    Sample { caps, buffer }
}

// ==================== App sinks ====================

struct GstAppSink {
    sink: gst_app::AppSink,
}

impl AppSinkEndpoint for GstAppSink {
    fn id(&self) -> EndpointId {
        EndpointId(object_key(&self.sink))
    }

    fn name(&self) -> String {
        self.sink.name().to_string()
    }

    fn max_buffers(&self) -> u32 {
        self.sink.max_buffers()
    }

    fn set_max_buffers(&self, max_buffers: u32) {
        self.sink.set_max_buffers(max_buffers);
    }

    fn set_drop(&self, drop: bool) {
        self.sink.set_drop(drop);
    }

    fn set_callbacks(&self, callbacks: SinkCallbacks) {
        let SinkCallbacks {
            new_preroll,
            new_sample,
            eos,
        } = callbacks;
        self.sink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_preroll(move |_| {
                    new_preroll();
                    Ok(gst::FlowSuccess::Ok)
                })
                .new_sample(move |_| {
                    new_sample();
                    Ok(gst::FlowSuccess::Ok)
                })
                .eos(move |_| eos())
                .build(),
        );
    }

    fn clear_callbacks(&self) {
        self.sink
            .set_callbacks(gst_app::AppSinkCallbacks::builder().build());
    }

    fn try_pull_preroll(&self) -> Option<Sample> {
        self.sink
            .try_pull_preroll(gst::ClockTime::ZERO)
            .map(convert_sample)
    }

    fn try_pull_sample(&self) -> Option<Sample> {
        self.sink
            .try_pull_sample(gst::ClockTime::ZERO)
            .map(convert_sample)
    }

    /// Also `true` while the appsink is below Paused.
    fn is_eos(&self) -> bool {
        self.sink.is_eos()
    }
}

// ==================== Pads ====================

struct GstPad {
    pad: gst::Pad,
    probes: Mutex<HashMap<u64, gst::PadProbeId>>,
}

static NEXT_PROBE: AtomicU64 = AtomicU64::new(1);

impl EnginePad for GstPad {
    fn id(&self) -> PadId {
        PadId(object_key(&self.pad))
    }

    fn add_caps_probe(&self, hook: CapsHook) -> Option<ProbeId> {
        let probe_id = self
            .pad
            .add_probe(gst::PadProbeType::EVENT_DOWNSTREAM, move |_, info| {
                if let Some(gst::PadProbeData::Event(ref event)) = info.data {
                    if let gst::EventView::Caps(caps) = event.view() {
                        if let Some(snapshot) = convert_caps(caps.caps()) {
                            hook(snapshot);
                        }
                    }
                }
                gst::PadProbeReturn::Ok
            })?;

        let key = NEXT_PROBE.fetch_add(1, Ordering::Relaxed);
        self.probes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, probe_id);
        Some(ProbeId(key))
    }

    fn remove_probe(&self, probe: ProbeId) {
        let removed = self
            .probes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&probe.0);
        if let Some(probe_id) = removed {
            self.pad.remove_probe(probe_id);
        }
    }
}

// ==================== Graphs ====================

struct GstGraph {
    bin: gst::Bin,
}

impl GstGraph {
    fn element(&self, name: &str) -> Result<gst::Element> {
        self.bin
            .by_name(name)
            .ok_or_else(|| BridgeError::ElementNotFound(name.to_string()))
    }
}

impl EngineGraph for GstGraph {
    fn app_sink(&self, name: &str) -> Result<Box<dyn AppSinkEndpoint>> {
        let sink = self
            .element(name)?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| BridgeError::NotAnAppSink(name.to_string()))?;
        Ok(Box::new(GstAppSink { sink }))
    }

    fn pad(&self, element: &str, pad: &str) -> Result<Box<dyn EnginePad>> {
        let found = self
            .element(element)?
            .static_pad(pad)
            .ok_or_else(|| BridgeError::PadNotFound {
                element: element.to_string(),
                pad: pad.to_string(),
            })?;
        Ok(Box::new(GstPad {
            pad: found,
            probes: Mutex::new(HashMap::new()),
        }))
    }

    fn set_bus_eos_handler(&self, hook: EngineHook) {
        let Some(bus) = self.bin.bus() else {
            tracing::warn!("Pipeline has no bus; graph-level EOS will not be observed");
            return;
        };
        // Nothing else reads this bus, so every message is consumed here.
        bus.set_sync_handler(move |_, message| {
            match message.view() {
                gst::MessageView::Eos(_) => hook(),
                gst::MessageView::Error(err) => tracing::warn!(
                    "Pipeline error from {:?}: {} ({:?})",
                    err.src().map(|s| s.path_string()),
                    err.error(),
                    err.debug()
                ),
                gst::MessageView::Warning(warning) => tracing::debug!(
                    "Pipeline warning from {:?}: {}",
                    warning.src().map(|s| s.path_string()),
                    warning.error()
                ),
                _ => {}
            }
            gst::BusSyncReply::Drop
        });
    }

    fn clear_bus_eos_handler(&self) {
        if let Some(bus) = self.bin.bus() {
            bus.unset_sync_handler();
        }
    }

    fn set_state(&self, state: PipelineState) -> Result<()> {
        self.bin
            .set_state(gst_state(state))
            .map(|_| ())
            .map_err(|e| BridgeError::StateChange(format!("{:?}: {}", state, e)))
    }

    fn send_eos(&self) -> bool {
        self.bin.send_event(gst::event::Eos::new())
    }
}

// ==================== Engine ====================

/// GStreamer-backed [`MediaEngine`].
#[derive(Debug)]
pub struct GstEngine {
    _private: (),
}

impl GstEngine {
    /// Initialize GStreamer; safe to call more than once.
    pub fn new() -> Result<Self> {
        gst::init().map_err(|e| BridgeError::Engine(format!("GStreamer init failed: {}", e)))?;
        tracing::info!("GStreamer {} initialized", gst::version_string());
        Ok(Self { _private: () })
    }
}

impl MediaEngine for GstEngine {
    fn parse_launch(&mut self, description: &str) -> Result<Box<dyn EngineGraph>> {
        let element =
            gst::parse::launch(description).map_err(|e| BridgeError::Parse(e.to_string()))?;

        let bin = match element.downcast::<gst::Bin>() {
            Ok(bin) => bin,
            Err(element) => {
                // A single-element description is not wrapped in a pipeline.
                let pipeline = gst::Pipeline::new();
                pipeline
                    .add(&element)
                    .map_err(|e| BridgeError::Engine(e.to_string()))?;
                pipeline.upcast::<gst::Bin>()
            }
        };
        Ok(Box::new(GstGraph { bin }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_convert_caps_fields() {
        gst::init().unwrap();
        let caps = gst::Caps::builder("video/x-raw")
            .field("format", "I420")
            .field("width", 320i32)
            .field("height", 240i32)
            .field("framerate", gst::Fraction::new(30, 1))
            .build();

        let converted = convert_caps(&caps).unwrap();
        assert_eq!(converted.name(), "video/x-raw");
        assert_eq!(converted.get_str("format"), Some("I420"));
        assert_eq!(converted.get_int("width"), Some(320));
        assert_eq!(
            converted.field("framerate"),
            Some(&CapsValue::Fraction(30, 1))
        );
    }

    #[test]
    fn test_resolve_app_sink() {
        let mut engine = GstEngine::new().unwrap();
        let graph = engine
            .parse_launch("fakesrc name=src ! appsink name=out")
            .unwrap();
        assert!(graph.app_sink("out").is_ok());
        assert!(matches!(
            graph.app_sink("src").err(),
            Some(BridgeError::NotAnAppSink(_))
        ));
        assert!(graph.pad("out", "sink").is_ok());
        graph.set_state(PipelineState::Null).unwrap();
    }

    #[test]
    fn test_bus_messages_do_not_accumulate() {
        GstEngine::new().unwrap();
        let bin = gst::parse::launch("fakesrc ! fakesink")
            .unwrap()
            .downcast::<gst::Bin>()
            .unwrap();
        let bus = bin.bus().unwrap();
        let graph = GstGraph { bin };
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        graph.set_bus_eos_handler(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        bus.post(gst::message::Eos::new()).unwrap();
        bus.post(gst::message::Eos::new()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(!bus.have_pending());

        graph.clear_bus_eos_handler();
    }

    #[test]
    fn test_stopped_appsink_reports_eos() {
        let mut engine = GstEngine::new().unwrap();
        let graph = engine.parse_launch("fakesrc ! appsink name=out").unwrap();
        let sink = graph.app_sink("out").unwrap();
        // The dispatcher must not take this for a real end-of-stream.
        assert!(sink.is_eos());
    }
}
