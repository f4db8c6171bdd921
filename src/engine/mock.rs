//! Mock Engine Implementation for Testing
//!
//! This module provides an in-process media engine that can be used to drive
//! the bridge without a real media framework. Graphs are built from a
//! `gst-launch`-style description and every element is inert: data only moves
//! when a test pushes it through a controller.
//!
//! # Description Grammar
//!
//! ```text
//! description := segment ( "!" segment )*
//! segment     := element+
//!              | media/type ( "," key "=" value )*      (caps filter)
//! element     := factory ( key "=" value )*
//! ```
//!
//! - `appsink` elements are exposed as app sinks; `max-buffers` and `drop`
//!   properties set their initial buffering policy.
//! - A bare word after an element's properties starts a new chain.
//! - Every element has a `src` and a `sink` pad.
//! - App sinks answer the EOS query with `true` while the graph is below
//!   Paused, the way GStreamer's appsink does.
//! - Elements without a `name` property get `<factory><n>` names.
//! - Empty descriptions, empty segments, malformed properties and duplicate
//!   names fail to parse.
//!
//! # Controllers
//!
//! [`MockEngine`] is cheaply cloneable. A test keeps one clone and hands the
//! other to the player; the kept clone reaches into the current graph:
//!
//! - [`MockEngine::sink`] returns a [`MockAppSink`] to push prerolls, samples
//!   and EOS from any thread
//! - [`MockEngine::pad`] returns a [`MockPad`] to renegotiate caps
//! - [`MockEngine::post_bus_eos`] fires the graph-level EOS hook
//!
//! Engine hooks are always invoked with no internal lock held, the same way a
//! streaming thread would call them.
//!
//! # Example
//!
//! ```ignore
//! use sample_bridge::engine::mock::MockEngine;
//!
//! let engine = MockEngine::new();
//! let mut player = Player::new(Box::new(engine.clone()), BridgeConfig::default());
//! player.build("videotestsrc ! appsink name=video")?;
//! engine.sink("video").unwrap().push_sample(sample);
//! player.dispatch();
//! ```

use super::{
    AppSinkEndpoint, CapsHook, EngineGraph, EngineHook, EnginePad, MediaEngine, PipelineState,
    Sample, SinkCallbacks,
};
use crate::error::{BridgeError, Result};
use crate::media::{Caps, CapsValue};
use crate::pipeline::id::{EndpointId, PadId, ProbeId};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

fn next_object_id() -> u64 {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ==================== Sinks ====================

struct SinkInner {
    max_buffers: u32,
    drop: bool,
    callbacks: Option<SinkCallbacks>,
    preroll: Option<Sample>,
    queue: VecDeque<Sample>,
    eos: bool,
    dropped: usize,
}

struct SinkShared {
    id: EndpointId,
    name: String,
    inner: Mutex<SinkInner>,
    /// Shared with the graph; true while it is Paused or Playing.
    running: Arc<AtomicBool>,
}

/// App sink of a mock graph.
///
/// Serves both as the endpoint handed to the bridge and as the test-side
/// controller that feeds it.
#[derive(Clone)]
pub struct MockAppSink {
    shared: Arc<SinkShared>,
}

impl MockAppSink {
    fn new(name: &str, max_buffers: u32, drop: bool, running: Arc<AtomicBool>) -> Self {
        Self {
            shared: Arc::new(SinkShared {
                id: EndpointId(next_object_id()),
                name: name.to_string(),
                running,
                inner: Mutex::new(SinkInner {
                    max_buffers,
                    drop,
                    callbacks: None,
                    preroll: None,
                    queue: VecDeque::new(),
                    eos: false,
                    dropped: 0,
                }),
            }),
        }
    }

    /// Offer a preroll sample, replacing any preroll not yet pulled.
    pub fn push_preroll(&self, sample: Sample) {
        let hook = {
            let mut inner = lock(&self.shared.inner);
            inner.preroll = Some(sample);
            inner.callbacks.as_ref().map(|c| c.new_preroll.clone())
        };
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Queue a sample.
    ///
    /// A full queue drops its oldest sample when dropping is enabled and
    /// rejects the new one otherwise. Samples after EOS are rejected.
    pub fn push_sample(&self, sample: Sample) -> bool {
        let hook = {
            let mut inner = lock(&self.shared.inner);
            if inner.eos {
                return false;
            }
            let limit = inner.max_buffers as usize;
            if limit > 0 && inner.queue.len() >= limit {
                if !inner.drop {
                    return false;
                }
                inner.queue.pop_front();
                inner.dropped += 1;
            }
            inner.queue.push_back(sample);
            inner.callbacks.as_ref().map(|c| c.new_sample.clone())
        };
        if let Some(hook) = hook {
            hook();
        }
        true
    }

    /// Shorthand for pushing a well-formed sample.
    pub fn push(&self, caps: &Caps, data: impl Into<Vec<u8>>) -> bool {
        self.push_sample(Sample::new(caps.clone(), data))
    }

    /// Mark end-of-stream. Already queued samples stay pullable.
    pub fn set_eos(&self) {
        let hook = {
            let mut inner = lock(&self.shared.inner);
            if inner.eos {
                return;
            }
            inner.eos = true;
            inner.callbacks.as_ref().map(|c| c.eos.clone())
        };
        if let Some(hook) = hook {
            hook();
        }
    }

    pub fn queued(&self) -> usize {
        lock(&self.shared.inner).queue.len()
    }

    /// Samples discarded by the drop-oldest policy
    pub fn dropped(&self) -> usize {
        lock(&self.shared.inner).dropped
    }

    pub fn drop_enabled(&self) -> bool {
        lock(&self.shared.inner).drop
    }

    pub fn has_callbacks(&self) -> bool {
        lock(&self.shared.inner).callbacks.is_some()
    }
}

impl AppSinkEndpoint for MockAppSink {
    fn id(&self) -> EndpointId {
        self.shared.id
    }

    fn name(&self) -> String {
        self.shared.name.clone()
    }

    fn max_buffers(&self) -> u32 {
        lock(&self.shared.inner).max_buffers
    }

    fn set_max_buffers(&self, max_buffers: u32) {
        let mut inner = lock(&self.shared.inner);
        inner.max_buffers = max_buffers;
        let limit = max_buffers as usize;
        while limit > 0 && inner.queue.len() > limit {
            inner.queue.pop_front();
            inner.dropped += 1;
        }
    }

    fn set_drop(&self, drop: bool) {
        lock(&self.shared.inner).drop = drop;
    }

    fn set_callbacks(&self, callbacks: SinkCallbacks) {
        lock(&self.shared.inner).callbacks = Some(callbacks);
    }

    fn clear_callbacks(&self) {
        lock(&self.shared.inner).callbacks = None;
    }

    fn try_pull_preroll(&self) -> Option<Sample> {
        lock(&self.shared.inner).preroll.take()
    }

    fn try_pull_sample(&self) -> Option<Sample> {
        lock(&self.shared.inner).queue.pop_front()
    }

    /// Like GStreamer's appsink, a sink whose graph is not Paused or Playing
    /// also answers `true`.
    fn is_eos(&self) -> bool {
        if !self.shared.running.load(Ordering::Acquire) {
            return true;
        }
        let inner = lock(&self.shared.inner);
        inner.eos && inner.queue.is_empty()
    }
}

// ==================== Pads ====================

struct PadShared {
    id: PadId,
    probes: Mutex<Vec<(ProbeId, CapsHook)>>,
}

/// Pad of a mock element; also the controller for caps renegotiation.
#[derive(Clone)]
pub struct MockPad {
    shared: Arc<PadShared>,
}

impl MockPad {
    fn new() -> Self {
        Self {
            shared: Arc::new(PadShared {
                id: PadId(next_object_id()),
                probes: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Push a caps event through the pad; returns how many probes saw it.
    pub fn renegotiate(&self, caps: &Caps) -> usize {
        let hooks: Vec<CapsHook> = lock(&self.shared.probes)
            .iter()
            .map(|(_, hook)| hook.clone())
            .collect();
        for hook in &hooks {
            hook(caps.clone());
        }
        hooks.len()
    }

    pub fn probe_count(&self) -> usize {
        lock(&self.shared.probes).len()
    }
}

impl EnginePad for MockPad {
    fn id(&self) -> PadId {
        self.shared.id
    }

    fn add_caps_probe(&self, hook: CapsHook) -> Option<ProbeId> {
        let probe = ProbeId(next_object_id());
        lock(&self.shared.probes).push((probe, hook));
        Some(probe)
    }

    fn remove_probe(&self, probe: ProbeId) {
        lock(&self.shared.probes).retain(|(id, _)| *id != probe);
    }
}

// ==================== Graphs ====================

struct MockElement {
    name: String,
    factory: String,
    sink: Option<MockAppSink>,
    src_pad: MockPad,
    sink_pad: MockPad,
}

impl MockElement {
    fn pad(&self, name: &str) -> Option<&MockPad> {
        match name {
            "src" => Some(&self.src_pad),
            "sink" => Some(&self.sink_pad),
            _ => None,
        }
    }
}

struct GraphShared {
    description: String,
    elements: Vec<MockElement>,
    bus_eos: Mutex<Option<EngineHook>>,
    state: Mutex<PipelineState>,
    state_history: Mutex<Vec<PipelineState>>,
    fail_state_changes: AtomicBool,
    released: AtomicBool,
    running: Arc<AtomicBool>,
}

impl GraphShared {
    fn element(&self, name: &str) -> Option<&MockElement> {
        self.elements.iter().find(|e| e.name == name)
    }

    fn post_bus_eos(&self) -> bool {
        let hook = lock(&self.bus_eos).clone();
        match hook {
            Some(hook) => {
                hook();
                true
            }
            None => false,
        }
    }
}

/// Graph handle given to the bridge. Dropping it marks the graph released.
struct MockGraph {
    shared: Arc<GraphShared>,
}

impl EngineGraph for MockGraph {
    fn app_sink(&self, name: &str) -> Result<Box<dyn AppSinkEndpoint>> {
        let element = self
            .shared
            .element(name)
            .ok_or_else(|| BridgeError::ElementNotFound(name.to_string()))?;
        match &element.sink {
            Some(sink) => Ok(Box::new(sink.clone())),
            None => Err(BridgeError::NotAnAppSink(name.to_string())),
        }
    }

    fn pad(&self, element: &str, pad: &str) -> Result<Box<dyn EnginePad>> {
        let found = self
            .shared
            .element(element)
            .ok_or_else(|| BridgeError::ElementNotFound(element.to_string()))?;
        found
            .pad(pad)
            .map(|p| Box::new(p.clone()) as Box<dyn EnginePad>)
            .ok_or_else(|| BridgeError::PadNotFound {
                element: element.to_string(),
                pad: pad.to_string(),
            })
    }

    fn set_bus_eos_handler(&self, hook: EngineHook) {
        *lock(&self.shared.bus_eos) = Some(hook);
    }

    fn clear_bus_eos_handler(&self) {
        *lock(&self.shared.bus_eos) = None;
    }

    fn set_state(&self, state: PipelineState) -> Result<()> {
        if self.shared.fail_state_changes.load(Ordering::Acquire) {
            return Err(BridgeError::StateChange(format!(
                "mock graph refused {:?}",
                state
            )));
        }
        *lock(&self.shared.state) = state;
        self.shared.running.store(
            matches!(state, PipelineState::Paused | PipelineState::Playing),
            Ordering::Release,
        );
        lock(&self.shared.state_history).push(state);
        Ok(())
    }

    fn send_eos(&self) -> bool {
        for sink in self.shared.elements.iter().filter_map(|e| e.sink.as_ref()) {
            sink.set_eos();
        }
        self.shared.post_bus_eos();
        true
    }
}

impl Drop for MockGraph {
    fn drop(&mut self) {
        self.shared.released.store(true, Ordering::Release);
    }
}

// ==================== Parsing ====================

fn parse_property(token: &str, segment: &str) -> Result<(String, String)> {
    match token.split_once('=') {
        Some((key, value)) if !key.is_empty() && !value.is_empty() => {
            Ok((key.to_string(), value.trim_matches('"').to_string()))
        }
        _ => Err(BridgeError::Parse(format!(
            "malformed property '{}' in '{}'",
            token, segment
        ))),
    }
}

fn valid_factory(factory: &str) -> bool {
    factory
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn parse_caps_value(raw: &str) -> CapsValue {
    if let Ok(v) = raw.parse::<i32>() {
        return CapsValue::Int(v);
    }
    if let Some((num, den)) = raw.split_once('/') {
        if let (Ok(num), Ok(den)) = (num.parse(), den.parse()) {
            return CapsValue::Fraction(num, den);
        }
    }
    match raw {
        "true" => CapsValue::Bool(true),
        "false" => CapsValue::Bool(false),
        _ => CapsValue::Str(raw.to_string()),
    }
}

/// Parse a caps-filter segment such as `video/x-raw,format=I420,width=320`.
fn parse_caps_filter(segment: &str) -> Result<Caps> {
    let mut parts = segment.split(',').map(str::trim);
    let name = parts.next().unwrap_or_default();
    let mut caps = Caps::new(name);
    for part in parts {
        let (key, value) = parse_property(part, segment)?;
        caps.set(key, parse_caps_value(&value));
    }
    Ok(caps)
}

/// Element factory plus its `key=value` properties.
type ElementSpec = (String, Vec<(String, String)>);

/// Split one `!`-delimited segment into element specs.
///
/// A bare word after an element's properties starts a new, unlinked chain,
/// as in `a ! b c ! d`.
fn parse_segment(segment: &str) -> Result<Vec<ElementSpec>> {
    let head = segment.split_whitespace().next().unwrap_or_default();
    if head.contains('/') {
        parse_caps_filter(segment)?;
        return Ok(vec![("capsfilter".to_string(), Vec::new())]);
    }

    let mut specs = Vec::new();
    let mut current: Option<ElementSpec> = None;
    for token in segment.split_whitespace() {
        if token.contains('=') {
            let Some((_, properties)) = current.as_mut() else {
                return Err(BridgeError::Parse(format!(
                    "property '{}' without an element",
                    token
                )));
            };
            properties.push(parse_property(token, segment)?);
        } else {
            if !valid_factory(token) {
                return Err(BridgeError::Parse(format!(
                    "invalid element factory '{}'",
                    token
                )));
            }
            specs.extend(current.take());
            current = Some((token.to_string(), Vec::new()));
        }
    }
    specs.extend(current);
    Ok(specs)
}

fn create_element(
    (factory, properties): ElementSpec,
    counters: &mut HashMap<String, usize>,
    running: &Arc<AtomicBool>,
) -> Result<MockElement> {
    let lookup = |key: &str| {
        properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };

    let name = match lookup("name") {
        Some(name) => name.to_string(),
        None => {
            let n = counters.entry(factory.clone()).or_insert(0);
            let name = format!("{}{}", factory, n);
            *n += 1;
            name
        }
    };

    let sink = if factory == "appsink" {
        let max_buffers = match lookup("max-buffers") {
            Some(v) => v
                .parse::<u32>()
                .map_err(|_| BridgeError::Parse(format!("invalid max-buffers '{}'", v)))?,
            None => 0,
        };
        let drop = lookup("drop") == Some("true");
        Some(MockAppSink::new(&name, max_buffers, drop, running.clone()))
    } else {
        None
    };

    Ok(MockElement {
        name,
        factory,
        sink,
        src_pad: MockPad::new(),
        sink_pad: MockPad::new(),
    })
}

fn build_graph(description: &str) -> Result<GraphShared> {
    if description.trim().is_empty() {
        return Err(BridgeError::Parse("empty pipeline description".to_string()));
    }

    let mut elements: Vec<MockElement> = Vec::new();
    let mut counters: HashMap<String, usize> = HashMap::new();
    let running = Arc::new(AtomicBool::new(false));

    for segment in description.split('!').map(str::trim) {
        if segment.is_empty() {
            return Err(BridgeError::Parse(format!(
                "empty element in '{}'",
                description
            )));
        }
        for spec in parse_segment(segment)? {
            let element = create_element(spec, &mut counters, &running)?;
            if elements.iter().any(|e| e.name == element.name) {
                return Err(BridgeError::Parse(format!(
                    "duplicate element name '{}'",
                    element.name
                )));
            }
            elements.push(element);
        }
    }

    Ok(GraphShared {
        description: description.to_string(),
        elements,
        bus_eos: Mutex::new(None),
        state: Mutex::new(PipelineState::Null),
        state_history: Mutex::new(Vec::new()),
        fail_state_changes: AtomicBool::new(false),
        released: AtomicBool::new(false),
        running,
    })
}

// ==================== Engine ====================

#[derive(Default)]
struct EngineState {
    current: Option<Arc<GraphShared>>,
    graphs_built: usize,
    parse_failures: usize,
}

/// In-process engine with test controllers.
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<EngineState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Option<Arc<GraphShared>> {
        lock(&self.state).current.clone()
    }

    /// App sink controller of the most recently built graph.
    pub fn sink(&self, name: &str) -> Option<MockAppSink> {
        self.current()?.element(name)?.sink.clone()
    }

    /// Pad controller of the most recently built graph.
    pub fn pad(&self, element: &str, pad: &str) -> Option<MockPad> {
        self.current()?.element(element)?.pad(pad).cloned()
    }

    /// Fire the graph-level EOS hook; `false` if none is installed.
    pub fn post_bus_eos(&self) -> bool {
        self.current().is_some_and(|g| g.post_bus_eos())
    }

    pub fn bus_handler_installed(&self) -> bool {
        self.current()
            .is_some_and(|g| lock(&g.bus_eos).is_some())
    }

    pub fn state(&self) -> Option<PipelineState> {
        self.current().map(|g| *lock(&g.state))
    }

    /// Every state the current graph was moved to, oldest first.
    pub fn state_history(&self) -> Vec<PipelineState> {
        self.current()
            .map(|g| lock(&g.state_history).clone())
            .unwrap_or_default()
    }

    /// Make state changes of the current graph fail.
    pub fn fail_state_changes(&self, fail: bool) {
        if let Some(graph) = self.current() {
            graph.fail_state_changes.store(fail, Ordering::Release);
        }
    }

    /// Whether the player dropped the current graph.
    pub fn graph_released(&self) -> bool {
        self.current()
            .is_some_and(|g| g.released.load(Ordering::Acquire))
    }

    pub fn description(&self) -> Option<String> {
        self.current().map(|g| g.description.clone())
    }

    /// Element names of the current graph, in description order.
    pub fn element_names(&self) -> Vec<String> {
        self.current()
            .map(|g| g.elements.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Factory of a named element in the current graph.
    pub fn factory_of(&self, element: &str) -> Option<String> {
        self.current()?.element(element).map(|e| e.factory.clone())
    }

    pub fn graphs_built(&self) -> usize {
        lock(&self.state).graphs_built
    }

    pub fn parse_failures(&self) -> usize {
        lock(&self.state).parse_failures
    }
}

impl MediaEngine for MockEngine {
    fn parse_launch(&mut self, description: &str) -> Result<Box<dyn EngineGraph>> {
        let mut state = lock(&self.state);
        match build_graph(description) {
            Ok(graph) => {
                let shared = Arc::new(graph);
                state.current = Some(shared.clone());
                state.graphs_built += 1;
                tracing::trace!(
                    "Mock engine built graph with {} elements",
                    shared.elements.len()
                );
                Ok(Box::new(MockGraph { shared }))
            }
            Err(e) => {
                state.parse_failures += 1;
                Err(e)
            }
        }
    }
}
