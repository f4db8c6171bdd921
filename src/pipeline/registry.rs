//! Endpoint registries owned by the consumer thread.
//!
//! The sink registry keeps endpoints in registration order (the order the
//! dispatcher polls them in) with a hash index from [`EndpointId`] for event
//! lookups. The probe registry maps [`PadId`] to installed caps probes.
//! Neither needs a lock: only the consumer thread touches them.

use crate::engine::{AppSinkEndpoint, EnginePad};
use crate::pipeline::classify::Classification;
use crate::pipeline::id::{EndpointId, PadId, ProbeId};
use crate::pipeline::packet::{CapsCallback, SinkCallback};
use std::cell::OnceCell;
use std::collections::HashMap;

/// Lifecycle of a sink endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EndpointState {
    NotStarted,
    Prerolled,
    Streaming,
    Eos,
}

/// Monotonic endpoint flags. There are no setters back to `false`; a fresh
/// endpoint is the only way to reset them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointFlags {
    prerolled: bool,
    first_sample_delivered: bool,
    streaming: bool,
    eos_signalled: bool,
    eos: bool,
}

impl EndpointFlags {
    pub fn prerolled(&self) -> bool {
        self.prerolled
    }

    /// Set by the first delivered preroll or sample; gates `Setup`.
    pub fn first_sample_delivered(&self) -> bool {
        self.first_sample_delivered
    }

    pub fn streaming(&self) -> bool {
        self.streaming
    }

    pub fn eos(&self) -> bool {
        self.eos
    }

    pub fn mark_prerolled(&mut self) {
        self.prerolled = true;
    }

    pub fn mark_first_sample_delivered(&mut self) {
        self.first_sample_delivered = true;
    }

    pub fn mark_streaming(&mut self) {
        self.streaming = true;
    }

    /// The engine reported end-of-stream for this sink; `Eos` is delivered
    /// once its queue is drained.
    pub fn eos_signalled(&self) -> bool {
        self.eos_signalled
    }

    pub fn mark_eos_signalled(&mut self) {
        self.eos_signalled = true;
    }

    /// Returns `true` if this call performed the transition.
    pub fn mark_eos(&mut self) -> bool {
        !std::mem::replace(&mut self.eos, true)
    }

    pub fn state(&self) -> EndpointState {
        if self.eos {
            EndpointState::Eos
        } else if self.streaming {
            EndpointState::Streaming
        } else if self.prerolled {
            EndpointState::Prerolled
        } else {
            EndpointState::NotStarted
        }
    }
}

/// A registered app sink and everything the bridge knows about it.
pub struct SinkEndpoint {
    pub(crate) id: EndpointId,
    pub(crate) name: String,
    pub(crate) handle: Box<dyn AppSinkEndpoint>,
    pub(crate) callback: SinkCallback,
    /// Written once, from the first usable sample.
    pub(crate) classification: OnceCell<Classification>,
    pub(crate) flags: EndpointFlags,
}

impl SinkEndpoint {
    pub fn new(name: impl Into<String>, handle: Box<dyn AppSinkEndpoint>, callback: SinkCallback) -> Self {
        Self {
            id: handle.id(),
            name: name.into(),
            handle,
            callback,
            classification: OnceCell::new(),
            flags: EndpointFlags::default(),
        }
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> EndpointFlags {
        self.flags
    }

    pub fn state(&self) -> EndpointState {
        self.flags.state()
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.classification.get()
    }

    /// Swap in a new callback, keeping flags and classification.
    pub fn replace_callback(&mut self, callback: SinkCallback) {
        self.callback = callback;
    }
}

impl std::fmt::Debug for SinkEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkEndpoint")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("kind", &self.classification.get().map(|c| c.kind))
            .finish()
    }
}

/// Registered sinks in registration order.
#[derive(Default)]
pub struct SinkRegistry {
    endpoints: Vec<SinkEndpoint>,
    index: HashMap<EndpointId, usize>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn contains(&self, id: EndpointId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: EndpointId) -> Option<&SinkEndpoint> {
        self.index.get(&id).map(|&i| &self.endpoints[i])
    }

    pub fn get_mut(&mut self, id: EndpointId) -> Option<&mut SinkEndpoint> {
        self.index.get(&id).map(|&i| &mut self.endpoints[i])
    }

    pub fn find_by_name(&self, name: &str) -> Option<&SinkEndpoint> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    /// Append a new endpoint. An endpoint with the same id is replaced in place.
    pub fn insert(&mut self, endpoint: SinkEndpoint) {
        match self.index.get(&endpoint.id) {
            Some(&i) => self.endpoints[i] = endpoint,
            None => {
                self.index.insert(endpoint.id, self.endpoints.len());
                self.endpoints.push(endpoint);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SinkEndpoint> {
        self.endpoints.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SinkEndpoint> {
        self.endpoints.iter_mut()
    }

    /// True when at least one sink is registered and every sink is at EOS.
    pub fn all_eos(&self) -> bool {
        !self.endpoints.is_empty() && self.endpoints.iter().all(|e| e.flags.eos())
    }

    /// Detach engine callbacks and release every endpoint handle.
    pub fn clear(&mut self) -> usize {
        let released = self.endpoints.len();
        for endpoint in self.endpoints.drain(..) {
            endpoint.handle.clear_callbacks();
        }
        self.index.clear();
        released
    }
}

/// An installed caps probe.
pub struct ProbeEndpoint {
    pub(crate) element: String,
    pub(crate) pad_name: String,
    pub(crate) pad: Box<dyn EnginePad>,
    pub(crate) probe: ProbeId,
    pub(crate) callback: CapsCallback,
}

impl ProbeEndpoint {
    pub fn new(
        element: impl Into<String>,
        pad_name: impl Into<String>,
        pad: Box<dyn EnginePad>,
        probe: ProbeId,
        callback: CapsCallback,
    ) -> Self {
        Self {
            element: element.into(),
            pad_name: pad_name.into(),
            pad,
            probe,
            callback,
        }
    }

    pub fn pad_id(&self) -> PadId {
        self.pad.id()
    }

    /// `element:pad` label for logs.
    pub fn label(&self) -> String {
        format!("{}:{}", self.element, self.pad_name)
    }
}

/// Installed caps probes keyed by pad.
#[derive(Default)]
pub struct ProbeRegistry {
    probes: HashMap<PadId, ProbeEndpoint>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn contains(&self, pad: PadId) -> bool {
        self.probes.contains_key(&pad)
    }

    pub fn get_mut(&mut self, pad: PadId) -> Option<&mut ProbeEndpoint> {
        self.probes.get_mut(&pad)
    }

    pub fn insert(&mut self, endpoint: ProbeEndpoint) {
        self.probes.insert(endpoint.pad_id(), endpoint);
    }

    /// Remove every probe from its pad and forget it.
    pub fn clear(&mut self) -> usize {
        let released = self.probes.len();
        for (_, endpoint) in self.probes.drain() {
            endpoint.pad.remove_probe(endpoint.probe);
        }
        released
    }
}
