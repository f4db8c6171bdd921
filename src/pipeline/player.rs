//! Host-facing player.
//!
//! A [`Player`] owns at most one pipeline at a time and lives on the consumer
//! thread. Engine threads only ever see the [`BridgeHandle`] clones captured
//! by the hooks the player installs.

use crate::config::BridgeConfig;
use crate::engine::{EngineGraph, EngineHook, MediaEngine, PipelineState, SinkCallbacks};
use crate::error::{BridgeError, Result, ResultExt};
use crate::pipeline::bridge::{BridgeHandle, Notifier, QueuedEvent, WakeReceiver};
use crate::pipeline::dispatcher::{DispatchStats, Dispatcher, DrainReport};
use crate::pipeline::id::{EndpointId, Generation, PadId};
use crate::pipeline::packet::{CapsCallback, CompletionCallback, SinkCallback};
use crate::pipeline::registry::{
    EndpointState, ProbeEndpoint, ProbeRegistry, SinkEndpoint, SinkRegistry,
};
use std::sync::Arc;
use std::time::Duration;

/// The live graph plus the generation its hooks post with.
struct PipelineHandle {
    graph: Box<dyn EngineGraph>,
    generation: Generation,
    description: String,
}

/// Bridges one engine pipeline to a single-threaded host.
///
/// Every method must be called on the consumer thread. Host callbacks run
/// inside [`Player::dispatch`] and friends, never on engine threads.
pub struct Player {
    engine: Box<dyn MediaEngine>,
    config: BridgeConfig,
    pipeline: Option<PipelineHandle>,
    sinks: SinkRegistry,
    probes: ProbeRegistry,
    dispatcher: Dispatcher,
    bridge: BridgeHandle,
    wake: WakeReceiver,
}

impl Player {
    pub fn new(engine: Box<dyn MediaEngine>, config: BridgeConfig) -> Self {
        let (notifier, wake) = Notifier::new();
        Self::with_notifier(engine, config, notifier, wake)
    }

    /// Like [`Player::new`], additionally forwarding each fresh wake to `hook`
    /// (on whichever thread raised it).
    pub fn with_wake_hook(
        engine: Box<dyn MediaEngine>,
        config: BridgeConfig,
        hook: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        let (notifier, wake) = Notifier::new();
        Self::with_notifier(engine, config, notifier.with_hook(hook), wake)
    }

    fn with_notifier(
        engine: Box<dyn MediaEngine>,
        config: BridgeConfig,
        notifier: Notifier,
        wake: WakeReceiver,
    ) -> Self {
        Self {
            engine,
            dispatcher: Dispatcher::new(config.dispatch.clone()),
            config,
            pipeline: None,
            sinks: SinkRegistry::new(),
            probes: ProbeRegistry::new(),
            bridge: BridgeHandle::new(notifier),
            wake,
        }
    }

    /// Build a pipeline from a textual description, replacing the current one.
    ///
    /// The previous pipeline is torn down first, so on failure the player is
    /// left without a pipeline.
    pub fn build(&mut self, description: &str) -> Result<()> {
        self.teardown();

        let graph = self.engine.parse_launch(description).map_err(|e| {
            tracing::warn!("Failed to build pipeline '{}': {}", description, e);
            e
        })?;

        let generation = self.bridge.advance_generation();
        let bridge = self.bridge.clone();
        graph.set_bus_eos_handler(Arc::new(move || {
            bridge.post(generation, QueuedEvent::EndOfStream);
        }));

        tracing::info!("Built pipeline ({:?}): {}", generation, description);
        self.pipeline = Some(PipelineHandle {
            graph,
            generation,
            description: description.to_string(),
        });
        Ok(())
    }

    fn require_pipeline(&self) -> Result<&PipelineHandle> {
        self.pipeline.as_ref().ok_or(BridgeError::NoPipeline)
    }

    /// Attach a callback to a named app sink.
    ///
    /// Registering the same sink again only swaps the callback; its state and
    /// classification are kept.
    pub fn register_sink(
        &mut self,
        name: &str,
        callback: impl Into<SinkCallback>,
    ) -> Result<EndpointId> {
        let pipeline = self.pipeline.as_ref().ok_or(BridgeError::NoPipeline)?;
        if name.is_empty() {
            return Err(BridgeError::EmptyName("sink"));
        }
        let handle = pipeline
            .graph
            .app_sink(name)
            .with_context(|| format!("Failed to register sink '{}'", name))?;
        let callback = callback.into();
        if callback.is_empty() {
            return Err(BridgeError::EmptyCallback);
        }

        let id = handle.id();
        if let Some(existing) = self.sinks.get_mut(id) {
            tracing::debug!("Replacing callback of sink '{}'", name);
            existing.replace_callback(callback);
            return Ok(id);
        }

        if let Some(depth) = self.config.sink.depth_for(handle.max_buffers()) {
            handle.set_max_buffers(depth);
            handle.set_drop(self.config.sink.drop);
        }

        let generation = pipeline.generation;
        let data_bridge = self.bridge.clone();
        let eos_bridge = self.bridge.clone();
        let data_ready: EngineHook = Arc::new(move || {
            data_bridge.post(generation, QueuedEvent::NewDataAvailable(id));
        });
        handle.set_callbacks(SinkCallbacks {
            new_preroll: data_ready.clone(),
            new_sample: data_ready,
            eos: Arc::new(move || eos_bridge.post(generation, QueuedEvent::SinkEos(id))),
        });

        tracing::debug!("Registered sink '{}' as {}", name, id);
        self.sinks.insert(SinkEndpoint::new(name, handle, callback));
        // Data queued before registration raised no notification.
        self.bridge.wake();
        Ok(id)
    }

    /// Observe caps renegotiations on `element`'s pad `pad`.
    pub fn register_caps_probe(
        &mut self,
        element: &str,
        pad: &str,
        callback: impl Into<CapsCallback>,
    ) -> Result<PadId> {
        let pipeline = self.require_pipeline()?;
        if element.is_empty() {
            return Err(BridgeError::EmptyName("element"));
        }
        if pad.is_empty() {
            return Err(BridgeError::EmptyName("pad"));
        }
        let engine_pad = pipeline
            .graph
            .pad(element, pad)
            .with_context(|| format!("Failed to probe caps on {}:{}", element, pad))?;
        let callback = callback.into();
        if callback.is_empty() {
            return Err(BridgeError::EmptyCallback);
        }

        let pad_id = engine_pad.id();
        if self.probes.contains(pad_id) {
            return Err(BridgeError::ProbeAlreadyRegistered {
                element: element.to_string(),
                pad: pad.to_string(),
            });
        }

        let bridge = self.bridge.clone();
        let generation = pipeline.generation;
        let probe = engine_pad
            .add_caps_probe(Arc::new(move |caps| {
                bridge.post(generation, QueuedEvent::CapsChanged { pad: pad_id, caps });
            }))
            .ok_or_else(|| {
                BridgeError::Engine(format!("could not install probe on {}:{}", element, pad))
            })?;

        tracing::debug!("Registered caps probe on {}:{}", element, pad);
        self.probes
            .insert(ProbeEndpoint::new(element, pad, engine_pad, probe, callback));
        Ok(pad_id)
    }

    /// Forward a lifecycle transition to the pipeline.
    pub fn set_lifecycle_state(&mut self, state: PipelineState) -> Result<()> {
        let pipeline = self.require_pipeline()?;
        tracing::debug!("Setting pipeline state to {:?}", state);
        pipeline.graph.set_state(state)
    }

    /// [`Player::set_lifecycle_state`] with the engine's numeric state code.
    pub fn set_lifecycle_state_code(&mut self, code: u32) -> Result<()> {
        self.set_lifecycle_state(PipelineState::from_code(code)?)
    }

    /// Inject end-of-stream into the pipeline; `Ok(false)` if the engine
    /// refused it.
    pub fn send_end_of_stream(&mut self) -> Result<bool> {
        let pipeline = self.require_pipeline()?;
        let accepted = pipeline.graph.send_eos();
        if !accepted {
            tracing::warn!("Engine refused end-of-stream event");
        }
        Ok(accepted)
    }

    /// Set the callback fired once all sinks of a pipeline reached EOS.
    pub fn set_completion_callback(&mut self, callback: impl Into<CompletionCallback>) {
        self.dispatcher.set_completion(callback.into());
    }

    /// Deliver everything pending, without blocking.
    pub fn dispatch(&mut self) -> DrainReport {
        self.wake.try_take();
        self.drain()
    }

    /// Block until woken (or `timeout` elapses), then dispatch.
    ///
    /// Returns `None` on timeout. `None` as timeout waits indefinitely.
    pub fn wait_and_dispatch(&mut self, timeout: Option<Duration>) -> Option<DrainReport> {
        let woke = match timeout {
            Some(timeout) => self.wake.wait_timeout(timeout),
            None => self.wake.wait(),
        };
        woke.then(|| self.drain())
    }

    fn drain(&mut self) -> DrainReport {
        self.dispatcher
            .drain(&self.bridge, &mut self.sinks, &mut self.probes)
    }

    /// Handle for waking the consumer from other threads.
    pub fn bridge(&self) -> BridgeHandle {
        self.bridge.clone()
    }

    pub fn has_pipeline(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn description(&self) -> Option<&str> {
        self.pipeline.as_ref().map(|p| p.description.as_str())
    }

    /// Generation of the live pipeline.
    pub fn generation(&self) -> Option<Generation> {
        self.pipeline.as_ref().map(|p| p.generation)
    }

    pub fn sink_state(&self, name: &str) -> Option<EndpointState> {
        self.sinks.find_by_name(name).map(SinkEndpoint::state)
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.len()
    }

    pub fn completion_fired(&self) -> bool {
        self.dispatcher.completion_fired()
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Stop and release the pipeline. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let Some(pipeline) = self.pipeline.take() else {
            return;
        };

        if let Err(e) = pipeline.graph.set_state(PipelineState::Null) {
            tracing::warn!("Failed to stop pipeline: {}", e);
        }
        pipeline.graph.clear_bus_eos_handler();
        let probes = self.probes.clear();
        let sinks = self.sinks.clear();

        self.bridge.advance_generation();
        let discarded = self.bridge.queue().clear();
        drop(pipeline);
        self.dispatcher.reset();

        tracing::info!(
            "Pipeline released ({} sinks, {} probes, {} pending events discarded)",
            sinks,
            probes,
            discarded
        );
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("description", &self.description())
            .field("sinks", &self.sinks.len())
            .field("probes", &self.probes.len())
            .field("bridge", &self.bridge)
            .finish()
    }
}
