//! Cross-thread sample delivery.
//!
//! Engine worker threads produce notifications; one consumer thread turns
//! them into host callbacks. The two sides only share a [`BridgeHandle`].
//!
//! # Architecture
//!
//! ```text
//! engine threads                          consumer thread
//! ──────────────                          ───────────────
//! appsink hook ──┐
//! pad probe ─────┼──► EventQueue + Notifier ──► Dispatcher ──► SinkCallback
//! bus EOS ───────┘        (push, signal)         │  ▲          CapsCallback
//!                                                ▼  │          completion
//!                                        SinkRegistry (pull, classify)
//! ```
//!
//! # Design
//!
//! - **O(1) producers**: hooks push a small event and signal; they never
//!   touch endpoint state or wait on the consumer.
//! - **Coalesced wakes**: any number of signals before a drain cost one wake.
//! - **Generations**: every event is tagged with the pipeline it came from;
//!   events of a torn-down pipeline are dropped on drain.
//! - **Write-once classification**: a sink's media kind and properties are
//!   fixed by its first usable sample.

pub mod bridge;
pub mod classify;
pub mod dispatcher;
pub mod id;
pub mod packet;
pub mod player;
pub mod registry;

pub use bridge::{BridgeHandle, Envelope, EventQueue, Notifier, QueuedEvent, WakeReceiver};
pub use classify::{caps_notification, classify, extract_payload, Classification};
pub use dispatcher::{DispatchStats, Dispatcher, DrainReport};
pub use id::{EndpointId, Generation, PadId, ProbeId};
pub use packet::{
    Callback, CapsCallback, CapsNotification, CompletionCallback, SamplePayload, SinkCallback,
    SinkEvent, SinkEventKind,
};
pub use player::Player;
pub use registry::{EndpointFlags, EndpointState, ProbeRegistry, SinkEndpoint, SinkRegistry};
