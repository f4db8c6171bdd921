//! Mock engine and recording callbacks

use sample_bridge::engine::mock::MockEngine;
use sample_bridge::pipeline::{CapsCallback, CompletionCallback, SinkCallback};
use sample_bridge::{BridgeConfig, CapsNotification, Player, SinkEvent, SinkEventKind};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A player on a fresh mock engine, plus the engine controller
pub fn create_test_player() -> (Player, MockEngine) {
    let engine = MockEngine::new();
    let player = Player::new(Box::new(engine.clone()), BridgeConfig::default());
    (player, engine)
}

/// Records every event a sink callback receives
#[derive(Clone, Default)]
pub struct SinkRecorder {
    events: Rc<RefCell<Vec<SinkEvent>>>,
}

impl SinkRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> SinkCallback {
        let events = self.events.clone();
        SinkCallback::new(move |event| events.borrow_mut().push(event))
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.borrow().clone()
    }

    pub fn kinds(&self) -> Vec<SinkEventKind> {
        self.events.borrow().iter().map(SinkEvent::kind).collect()
    }

    pub fn count(&self, kind: SinkEventKind) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.kind() == kind)
            .count()
    }

    /// First payload byte of each Preroll/NewSample, in delivery order
    pub fn tags(&self) -> Vec<u8> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| e.payload().and_then(|p| p.data.first().copied()))
            .collect()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

/// Records caps notifications
#[derive(Clone, Default)]
pub struct CapsRecorder {
    notifications: Rc<RefCell<Vec<CapsNotification>>>,
}

impl CapsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> CapsCallback {
        let notifications = self.notifications.clone();
        CapsCallback::new(move |n| notifications.borrow_mut().push(n))
    }

    pub fn notifications(&self) -> Vec<CapsNotification> {
        self.notifications.borrow().clone()
    }
}

/// Counts completion callback invocations
#[derive(Clone, Default)]
pub struct CompletionCounter {
    hits: Rc<Cell<usize>>,
}

impl CompletionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> CompletionCallback {
        let hits = self.hits.clone();
        CompletionCallback::new(move |()| hits.set(hits.get() + 1))
    }

    pub fn hits(&self) -> usize {
        self.hits.get()
    }
}
