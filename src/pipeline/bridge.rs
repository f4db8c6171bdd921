//! Thread boundary between engine worker threads and the consumer thread.
//!
//! Engine threads never touch endpoint state. All they do is append a small
//! [`QueuedEvent`] to the [`EventQueue`] and signal the [`Notifier`]; both are
//! O(1) and never wait on the consumer. The consumer owns the matching
//! [`WakeReceiver`], wakes once per burst of signals and swaps the whole queue
//! out under the lock before processing anything.

use crate::media::Caps;
use crate::pipeline::id::{EndpointId, Generation, PadId};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Events posted from engine threads.
#[derive(Debug, Clone, PartialEq)]
pub enum QueuedEvent {
    /// A sink has a preroll or a sample ready to be pulled.
    NewDataAvailable(EndpointId),
    /// A sink received end-of-stream; queued samples may still be pending.
    SinkEos(EndpointId),
    /// The whole graph reached end-of-stream.
    EndOfStream,
    /// A probed pad renegotiated; the snapshot is owned by the event.
    CapsChanged { pad: PadId, caps: Caps },
}

/// A queued event tagged with the pipeline generation that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub generation: Generation,
    pub event: QueuedEvent,
}

/// Mutex-guarded FIFO of pending events.
#[derive(Debug, Default)]
pub struct EventQueue {
    inner: Mutex<VecDeque<Envelope>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Envelope>> {
        // A panicking host callback cannot leave the deque half-updated,
        // so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, envelope: Envelope) {
        self.lock().push_back(envelope);
    }

    /// Swap out everything queued so far, in enqueue order.
    pub fn take_all(&self) -> VecDeque<Envelope> {
        std::mem::take(&mut *self.lock())
    }

    /// Discard all pending events; returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = self.take_all();
        dropped.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Cross-thread wake signal with coalescing.
///
/// Backed by a one-slot channel: a signal that finds the slot full is
/// absorbed by the wake already pending.
#[derive(Clone)]
pub struct Notifier {
    tx: Sender<()>,
    hook: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Notifier {
    /// Create a notifier and its consumer-side receiver.
    pub fn new() -> (Self, WakeReceiver) {
        let (tx, rx) = bounded(1);
        (Self { tx, hook: None }, WakeReceiver { rx })
    }

    /// Also forward every fresh wake to `hook`, e.g. to poke a host event loop.
    pub fn with_hook(mut self, hook: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Signal the consumer. Returns `false` if the signal was coalesced into
    /// one already pending (or the consumer is gone).
    pub fn signal(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => {
                if let Some(hook) = &self.hook {
                    hook();
                }
                true
            }
            Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => false,
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("pending", &!self.tx.is_empty())
            .field("has_hook", &self.hook.is_some())
            .finish()
    }
}

/// Consumer side of the [`Notifier`].
#[derive(Debug)]
pub struct WakeReceiver {
    rx: Receiver<()>,
}

impl WakeReceiver {
    /// Consume a pending wake without blocking.
    pub fn try_take(&self) -> bool {
        match self.rx.try_recv() {
            Ok(()) => true,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => false,
        }
    }

    /// Block until a wake arrives or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Block until a wake arrives.
    pub fn wait(&self) -> bool {
        self.rx.recv().is_ok()
    }

    pub fn is_pending(&self) -> bool {
        !self.rx.is_empty()
    }
}

struct Shared {
    queue: EventQueue,
    generation: AtomicU64,
}

/// Cloneable `Send + Sync` handle shared between engine hooks and the consumer.
#[derive(Clone)]
pub struct BridgeHandle {
    shared: Arc<Shared>,
    notifier: Notifier,
}

impl BridgeHandle {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: EventQueue::new(),
                generation: AtomicU64::new(Generation::NONE.0),
            }),
            notifier,
        }
    }

    /// Enqueue an event and wake the consumer. Safe on any thread.
    pub fn post(&self, generation: Generation, event: QueuedEvent) {
        self.shared.queue.push(Envelope { generation, event });
        self.notifier.signal();
    }

    /// Wake the consumer without queuing anything.
    pub fn wake(&self) -> bool {
        self.notifier.signal()
    }

    pub fn queue(&self) -> &EventQueue {
        &self.shared.queue
    }

    pub fn current_generation(&self) -> Generation {
        Generation(self.shared.generation.load(Ordering::Acquire))
    }

    /// Start a new generation, invalidating every event tagged with an older one.
    pub fn advance_generation(&self) -> Generation {
        let next = self.current_generation().next();
        self.shared.generation.store(next.0, Ordering::Release);
        next
    }

    /// Whether an envelope belongs to the live pipeline.
    pub fn is_current(&self, envelope: &Envelope) -> bool {
        envelope.generation != Generation::NONE && envelope.generation == self.current_generation()
    }
}

impl std::fmt::Debug for BridgeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHandle")
            .field("pending_events", &self.shared.queue.len())
            .field("generation", &self.current_generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn data(id: u64) -> QueuedEvent {
        QueuedEvent::NewDataAvailable(EndpointId(id))
    }

    #[test]
    fn test_queue_take_all_preserves_order() {
        let queue = EventQueue::new();
        for id in 0..5 {
            queue.push(Envelope {
                generation: Generation(1),
                event: data(id),
            });
        }
        let taken: Vec<_> = queue.take_all().into_iter().map(|e| e.event).collect();
        assert_eq!(taken, (0..5).map(data).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_notifier_coalesces() {
        let (notifier, wake) = Notifier::new();
        assert!(notifier.signal());
        assert!(!notifier.signal());
        assert!(!notifier.signal());

        assert!(wake.try_take());
        assert!(!wake.try_take());
    }

    #[test]
    fn test_notifier_hook_fires_once_per_wake() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let (notifier, wake) = Notifier::new();
        let notifier = notifier.with_hook(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        notifier.signal();
        notifier.signal();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        wake.try_take();
        notifier.signal();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wait_timeout_without_signal() {
        let (_notifier, wake) = Notifier::new();
        assert!(!wake.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn test_generation_filtering() {
        let (notifier, _wake) = Notifier::new();
        let bridge = BridgeHandle::new(notifier);
        let first = bridge.advance_generation();
        bridge.post(first, QueuedEvent::EndOfStream);

        let second = bridge.advance_generation();
        bridge.post(second, QueuedEvent::EndOfStream);

        let current: Vec<_> = bridge
            .queue()
            .take_all()
            .into_iter()
            .filter(|e| bridge.is_current(e))
            .collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].generation, second);
    }

    #[test]
    fn test_concurrent_posts_all_arrive_with_one_wake() {
        let (notifier, wake) = Notifier::new();
        let bridge = BridgeHandle::new(notifier);
        let generation = bridge.advance_generation();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let bridge = bridge.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        bridge.post(generation, data(t * 1000 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(wake.try_take());
        assert!(!wake.try_take());

        let events = bridge.queue().take_all();
        assert_eq!(events.len(), 800);

        // Per-producer order survives interleaving.
        for t in 0..8u64 {
            let ids: Vec<u64> = events
                .iter()
                .filter_map(|e| match e.event {
                    QueuedEvent::NewDataAvailable(EndpointId(id)) if id / 1000 == t => Some(id),
                    _ => None,
                })
                .collect();
            let mut sorted = ids.clone();
            sorted.sort_unstable();
            assert_eq!(ids, sorted);
        }
    }

    proptest! {
        #[test]
        fn test_signals_before_wake_collapse(signals in 1usize..64) {
            let (notifier, wake) = Notifier::new();
            let bridge = BridgeHandle::new(notifier);
            let generation = bridge.advance_generation();
            for i in 0..signals {
                bridge.post(generation, data(i as u64));
            }

            prop_assert!(wake.try_take());
            prop_assert!(!wake.try_take());
            let ids: Vec<_> = bridge.queue().take_all().into_iter().map(|e| e.event).collect();
            prop_assert_eq!(ids, (0..signals as u64).map(data).collect::<Vec<_>>());
        }
    }
}
