//! Consumer-side drain loop.
//!
//! One call to [`Dispatcher::drain`] handles one wake of the consumer thread.
//! Each pass:
//! 1. Swap out the event queue and drop events from older generations.
//! 2. Apply the rest in enqueue order (graph EOS, caps notifications).
//! 3. Poll every sink in registration order: preroll, samples, EOS.
//!    EOS is delivered once the sink signalled it and its queue is empty.
//! 4. Fire the completion callback once every sink is at EOS.
//!
//! Passes repeat until one finds nothing to do. The queue carries the
//! order-sensitive notifications; sample data is always pulled from the
//! sinks, so a coalesced `NewDataAvailable` never loses a sample.

use crate::config::DispatchConfig;
use crate::engine::Sample;
use crate::pipeline::bridge::{BridgeHandle, QueuedEvent};
use crate::pipeline::classify::{caps_notification, classify, extract_payload};
use crate::pipeline::packet::{CompletionCallback, SinkEvent};
use crate::pipeline::registry::{ProbeRegistry, SinkEndpoint, SinkRegistry};

/// What a single drain did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Passes that found work
    pub passes: usize,
    pub events_processed: usize,
    /// Events from a torn-down pipeline
    pub stale_events: usize,
    /// Prerolls and samples handed to callbacks
    pub samples_delivered: usize,
    /// Samples without a usable buffer or caps
    pub samples_dropped: usize,
    pub eos_delivered: usize,
    pub caps_notifications: usize,
    pub completion_fired: bool,
    /// The pass bound was hit before an idle pass; the consumer was re-woken
    pub truncated: bool,
}

impl DrainReport {
    pub fn is_idle(&self) -> bool {
        self.passes == 0 && self.stale_events == 0
    }
}

/// Totals over the life of a player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub drains: u64,
    pub events_processed: u64,
    pub stale_events: u64,
    pub samples_delivered: u64,
    pub samples_dropped: u64,
    pub eos_delivered: u64,
    pub caps_notifications: u64,
    pub completions: u64,
    pub truncated_drains: u64,
}

impl DispatchStats {
    fn absorb(&mut self, report: &DrainReport) {
        self.drains += 1;
        self.events_processed += report.events_processed as u64;
        self.stale_events += report.stale_events as u64;
        self.samples_delivered += report.samples_delivered as u64;
        self.samples_dropped += report.samples_dropped as u64;
        self.eos_delivered += report.eos_delivered as u64;
        self.caps_notifications += report.caps_notifications as u64;
        self.completions += u64::from(report.completion_fired);
        self.truncated_drains += u64::from(report.truncated);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PullKind {
    Preroll,
    Sample,
}

/// Drives delivery for one player.
#[derive(Debug)]
pub struct Dispatcher {
    config: DispatchConfig,
    completion: CompletionCallback,
    completion_fired: bool,
    graph_eos: bool,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            completion: CompletionCallback::empty(),
            completion_fired: false,
            graph_eos: false,
            stats: DispatchStats::default(),
        }
    }

    /// Replace the completion callback. It survives pipeline rebuilds.
    pub fn set_completion(&mut self, callback: CompletionCallback) {
        self.completion = callback;
    }

    pub fn completion_fired(&self) -> bool {
        self.completion_fired
    }

    pub fn graph_eos(&self) -> bool {
        self.graph_eos
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Forget per-pipeline state; called when a pipeline is torn down.
    pub fn reset(&mut self) {
        self.completion_fired = false;
        self.graph_eos = false;
    }

    /// Drain everything pending.
    pub fn drain(
        &mut self,
        bridge: &BridgeHandle,
        sinks: &mut SinkRegistry,
        probes: &mut ProbeRegistry,
    ) -> DrainReport {
        let mut report = DrainReport::default();
        let mut budget = self.config.max_passes;

        loop {
            let mut progress = self.apply_events(bridge, sinks, probes, &mut report);

            for endpoint in sinks.iter_mut() {
                progress |= self.poll_sink(endpoint, &mut report);
            }

            if self.check_completion(sinks) {
                report.completion_fired = true;
                progress = true;
            }

            if !progress && bridge.queue().is_empty() {
                break;
            }
            if progress {
                report.passes += 1;
            }

            budget = budget.saturating_sub(1);
            if budget == 0 {
                tracing::debug!(
                    "Drain stopped after {} passes; re-signalling consumer",
                    self.config.max_passes
                );
                bridge.wake();
                report.truncated = true;
                break;
            }
        }

        self.stats.absorb(&report);
        report
    }

    /// Apply queued events; returns whether any live event was processed.
    fn apply_events(
        &mut self,
        bridge: &BridgeHandle,
        sinks: &mut SinkRegistry,
        probes: &mut ProbeRegistry,
        report: &mut DrainReport,
    ) -> bool {
        let mut progress = false;

        for envelope in bridge.queue().take_all() {
            if !bridge.is_current(&envelope) {
                tracing::debug!(
                    "Dropping stale event from generation {:?}",
                    envelope.generation
                );
                report.stale_events += 1;
                continue;
            }
            report.events_processed += 1;
            progress = true;

            match envelope.event {
                // Data is picked up by the sink poll below.
                QueuedEvent::NewDataAvailable(_) => {}
                QueuedEvent::SinkEos(id) => match sinks.get_mut(id) {
                    Some(endpoint) => endpoint.flags.mark_eos_signalled(),
                    None => tracing::debug!("EOS for unknown sink {}", id),
                },
                QueuedEvent::EndOfStream => {
                    if !self.graph_eos {
                        tracing::info!("Pipeline reached end-of-stream");
                    }
                    self.graph_eos = true;
                    // Graph EOS implies every sink has seen EOS.
                    for endpoint in sinks.iter_mut() {
                        endpoint.flags.mark_eos_signalled();
                    }
                }
                QueuedEvent::CapsChanged { pad, caps } => match probes.get_mut(pad) {
                    Some(probe) => {
                        tracing::debug!("Caps changed on {}: {}", probe.label(), caps);
                        probe.callback.call(caps_notification(&caps));
                        report.caps_notifications += 1;
                    }
                    None => tracing::debug!("Caps event for unknown pad {}", pad),
                },
            }
        }

        progress
    }

    fn poll_sink(&mut self, endpoint: &mut SinkEndpoint, report: &mut DrainReport) -> bool {
        if endpoint.flags.eos() {
            return false;
        }
        let mut progress = false;

        if !endpoint.flags.prerolled() {
            if let Some(sample) = endpoint.handle.try_pull_preroll() {
                // A refused preroll can be handed out again, so it is not progress.
                progress = deliver(endpoint, sample, PullKind::Preroll, report);
                if !progress {
                    tracing::debug!("Preroll on '{}' dropped; still not prerolled", endpoint.name);
                }
            }
        }

        let mut drained = false;
        for _ in 0..self.config.max_pulls_per_pass {
            let Some(sample) = endpoint.handle.try_pull_sample() else {
                drained = true;
                break;
            };
            progress = true;
            deliver(endpoint, sample, PullKind::Sample, report);
        }

        // The engine's EOS query also holds while a sink is not running, so
        // it only counts after the sink itself signalled EOS.
        if endpoint.flags.eos_signalled()
            && drained
            && endpoint.handle.is_eos()
            && endpoint.flags.mark_eos()
        {
            tracing::debug!("Sink '{}' reached end-of-stream", endpoint.name);
            endpoint.callback.call(SinkEvent::Eos);
            report.eos_delivered += 1;
            progress = true;
        }

        progress
    }

    fn check_completion(&mut self, sinks: &SinkRegistry) -> bool {
        if self.completion_fired {
            return false;
        }
        let complete = if sinks.is_empty() {
            self.graph_eos
        } else {
            sinks.all_eos()
        };
        if !complete {
            return false;
        }

        self.completion_fired = true;
        tracing::info!("All sinks finished");
        self.completion.call(());
        true
    }
}

/// Classify, announce and hand one pulled sample to the endpoint callback.
///
/// Returns `false` when the sample was dropped; endpoint flags only change
/// for delivered samples.
fn deliver(
    endpoint: &mut SinkEndpoint,
    sample: Sample,
    kind: PullKind,
    report: &mut DrainReport,
) -> bool {
    let Sample { caps, buffer } = sample;

    let Some(buffer) = buffer.filter(|b| b.map_readable().is_some()) else {
        tracing::trace!("Dropping unmappable sample on '{}'", endpoint.name);
        report.samples_dropped += 1;
        return false;
    };

    let classification = match (endpoint.classification.get(), caps.as_ref()) {
        (Some(existing), _) => existing,
        (None, Some(caps)) => endpoint.classification.get_or_init(|| classify(caps)),
        (None, None) => {
            tracing::trace!("Dropping sample without caps on '{}'", endpoint.name);
            report.samples_dropped += 1;
            return false;
        }
    };

    let Some(payload) = extract_payload(classification, &*buffer) else {
        report.samples_dropped += 1;
        return false;
    };

    if !endpoint.flags.first_sample_delivered() {
        tracing::debug!(
            "Sink '{}' classified as {:?} ({})",
            endpoint.name,
            classification.kind,
            classification.media_type_string
        );
        endpoint.callback.call(SinkEvent::Setup {
            media_type: classification.media_type_string.clone(),
            properties: classification.properties.clone(),
        });
    }

    tracing::trace!(
        "Delivering {:?} of {} bytes to '{}'",
        kind,
        payload.len(),
        endpoint.name
    );
    endpoint.flags.mark_prerolled();
    endpoint.flags.mark_first_sample_delivered();
    let event = match kind {
        PullKind::Preroll => SinkEvent::Preroll(payload),
        PullKind::Sample => {
            endpoint.flags.mark_streaming();
            SinkEvent::NewSample(payload)
        }
    };
    endpoint.callback.call(event);
    report.samples_delivered += 1;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockEngine;
    use crate::engine::{
        AppSinkEndpoint, EngineGraph, EngineHook, MediaEngine, PipelineState, SinkCallbacks,
    };
    use crate::media::Caps;
    use crate::pipeline::bridge::Notifier;
    use crate::pipeline::packet::{SinkCallback, SinkEventKind};
    use crate::pipeline::registry::EndpointState;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    struct Fixture {
        engine: MockEngine,
        graph: Box<dyn EngineGraph>,
        bridge: BridgeHandle,
        sinks: SinkRegistry,
        probes: ProbeRegistry,
        dispatcher: Dispatcher,
    }

    impl Fixture {
        fn new(description: &str) -> Self {
            let engine = MockEngine::new();
            let graph = engine.clone().parse_launch(description).unwrap();
            let (notifier, _wake) = Notifier::new();
            let bridge = BridgeHandle::new(notifier);
            bridge.advance_generation();
            Self {
                engine,
                graph,
                bridge,
                sinks: SinkRegistry::new(),
                probes: ProbeRegistry::new(),
                dispatcher: Dispatcher::new(DispatchConfig::default()),
            }
        }

        fn add_sink(&mut self, name: &str) -> Rc<RefCell<Vec<SinkEvent>>> {
            let seen = Rc::new(RefCell::new(Vec::new()));
            let log = seen.clone();
            let handle = self.graph.app_sink(name).unwrap();
            let id = handle.id();
            let generation = self.bridge.current_generation();
            let data_bridge = self.bridge.clone();
            let eos_bridge = self.bridge.clone();
            let data: EngineHook =
                Arc::new(move || data_bridge.post(generation, QueuedEvent::NewDataAvailable(id)));
            handle.set_callbacks(SinkCallbacks {
                new_preroll: data.clone(),
                new_sample: data,
                eos: Arc::new(move || eos_bridge.post(generation, QueuedEvent::SinkEos(id))),
            });
            self.sinks.insert(SinkEndpoint::new(
                name,
                handle,
                SinkCallback::new(move |e| log.borrow_mut().push(e)),
            ));
            seen
        }

        fn drain(&mut self) -> DrainReport {
            self.dispatcher
                .drain(&self.bridge, &mut self.sinks, &mut self.probes)
        }
    }

    fn kinds(events: &[SinkEvent]) -> Vec<SinkEventKind> {
        events.iter().map(SinkEvent::kind).collect()
    }

    fn video_caps() -> Caps {
        Caps::new("video/x-raw")
            .with_field("format", "X")
            .with_field("width", 640)
            .with_field("height", 480)
    }

    #[test]
    fn test_setup_then_preroll() {
        let mut fx = Fixture::new("videotestsrc ! appsink name=v");
        let seen = fx.add_sink("v");
        fx.engine
            .sink("v")
            .unwrap()
            .push_preroll(Sample::new(video_caps(), vec![0u8; 64]));

        let report = fx.drain();
        assert_eq!(report.samples_delivered, 1);
        let events = seen.borrow();
        assert_eq!(kinds(&events), vec![SinkEventKind::Setup, SinkEventKind::NewPreroll]);
        match &events[0] {
            SinkEvent::Setup { media_type, properties } => {
                assert_eq!(media_type, "video/x-raw");
                assert_eq!(properties.video().unwrap().width, 640);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(events[1].payload().unwrap().len(), 64);
        assert_eq!(
            fx.sinks.find_by_name("v").unwrap().state(),
            EndpointState::Prerolled
        );
    }

    #[test]
    fn test_setup_only_once() {
        let mut fx = Fixture::new("appsink name=v");
        let seen = fx.add_sink("v");
        let sink = fx.engine.sink("v").unwrap();
        sink.push(&video_caps(), vec![1]);
        fx.drain();
        sink.push(&video_caps(), vec![2]);
        fx.drain();

        assert_eq!(
            kinds(&seen.borrow()),
            vec![SinkEventKind::Setup, SinkEventKind::NewSample, SinkEventKind::NewSample]
        );
    }

    #[test]
    fn test_unmappable_sample_leaves_state_untouched() {
        let mut fx = Fixture::new("appsink name=v");
        let seen = fx.add_sink("v");
        fx.engine.sink("v").unwrap().push_sample(Sample {
            caps: Some(video_caps()),
            buffer: None,
        });

        let report = fx.drain();
        assert_eq!(report.samples_dropped, 1);
        assert!(seen.borrow().is_empty());
        let endpoint = fx.sinks.find_by_name("v").unwrap();
        assert!(endpoint.classification().is_none());
        assert_eq!(endpoint.state(), EndpointState::NotStarted);
    }

    #[test]
    fn test_dropped_preroll_leaves_state_untouched() {
        let mut fx = Fixture::new("appsink name=v");
        let seen = fx.add_sink("v");
        fx.engine.sink("v").unwrap().push_preroll(Sample {
            caps: Some(video_caps()),
            buffer: None,
        });

        let report = fx.drain();
        assert_eq!(report.samples_dropped, 1);
        assert!(!report.truncated);
        assert!(seen.borrow().is_empty());
        let endpoint = fx.sinks.find_by_name("v").unwrap();
        assert_eq!(endpoint.state(), EndpointState::NotStarted);
        assert!(!endpoint.flags().prerolled());

        // The next usable preroll is still delivered, Setup first.
        fx.engine
            .sink("v")
            .unwrap()
            .push_preroll(Sample::new(video_caps(), vec![7]));
        fx.drain();
        assert_eq!(
            kinds(&seen.borrow()),
            vec![SinkEventKind::Setup, SinkEventKind::NewPreroll]
        );
        assert_eq!(
            fx.sinks.find_by_name("v").unwrap().state(),
            EndpointState::Prerolled
        );
    }

    #[test]
    fn test_preroll_without_caps_on_fresh_sink_is_dropped() {
        let mut fx = Fixture::new("appsink name=v");
        let seen = fx.add_sink("v");
        fx.engine.sink("v").unwrap().push_preroll(Sample {
            caps: None,
            buffer: Some(Box::new(vec![1u8, 2])),
        });

        let report = fx.drain();
        assert_eq!(report.samples_dropped, 1);
        assert!(seen.borrow().is_empty());
        assert_eq!(
            fx.sinks.find_by_name("v").unwrap().state(),
            EndpointState::NotStarted
        );
    }

    #[test]
    fn test_setup_gated_by_first_delivery() {
        let mut fx = Fixture::new("appsink name=v");
        let seen = fx.add_sink("v");
        let sink = fx.engine.sink("v").unwrap();
        sink.push_preroll(Sample::new(video_caps(), vec![1]));
        fx.drain();
        assert!(fx.sinks.find_by_name("v").unwrap().flags().first_sample_delivered());

        sink.push(&video_caps(), vec![2]);
        fx.drain();
        assert_eq!(
            kinds(&seen.borrow()),
            vec![
                SinkEventKind::Setup,
                SinkEventKind::NewPreroll,
                SinkEventKind::NewSample
            ]
        );
        assert_eq!(
            fx.sinks.find_by_name("v").unwrap().state(),
            EndpointState::Streaming
        );
    }

    #[test]
    fn test_no_samples_after_eos() {
        let mut fx = Fixture::new("appsink name=v");
        let seen = fx.add_sink("v");
        let sink = fx.engine.sink("v").unwrap();
        sink.push(&video_caps(), vec![1]);
        sink.set_eos();
        fx.drain();

        // A misbehaving engine keeps producing after EOS.
        sink.push_preroll(Sample::new(video_caps(), vec![9]));
        fx.drain();

        assert_eq!(
            kinds(&seen.borrow()),
            vec![SinkEventKind::Setup, SinkEventKind::NewSample, SinkEventKind::Eos]
        );
    }

    #[test]
    fn test_stopped_sink_is_not_eos_until_signalled() {
        let mut fx = Fixture::new("appsink name=v");
        let seen = fx.add_sink("v");
        // Below Paused the engine already answers the EOS query with true.
        assert!(fx.engine.sink("v").unwrap().is_eos());

        let report = fx.drain();
        assert_eq!(report.eos_delivered, 0);
        assert!(!report.completion_fired);
        assert!(seen.borrow().is_empty());
        assert_eq!(
            fx.sinks.find_by_name("v").unwrap().state(),
            EndpointState::NotStarted
        );

        fx.graph.set_state(PipelineState::Playing).unwrap();
        fx.engine.sink("v").unwrap().push(&video_caps(), vec![1]);
        fx.graph.set_state(PipelineState::Ready).unwrap();
        fx.drain();
        assert_eq!(
            kinds(&seen.borrow()),
            vec![SinkEventKind::Setup, SinkEventKind::NewSample]
        );
    }

    #[test]
    fn test_eos_waits_for_queue_to_drain() {
        let mut fx = Fixture::new("appsink name=v max-buffers=8");
        fx.dispatcher = Dispatcher::new(DispatchConfig {
            max_passes: 1,
            max_pulls_per_pass: 2,
        });
        let seen = fx.add_sink("v");
        let sink = fx.engine.sink("v").unwrap();
        for i in 0..4u8 {
            sink.push(&video_caps(), vec![i]);
        }
        sink.set_eos();

        let report = fx.drain();
        assert_eq!(report.samples_delivered, 2);
        assert_eq!(report.eos_delivered, 0);

        fx.drain();
        let report = fx.drain();
        assert_eq!(report.eos_delivered, 1);
        assert_eq!(
            kinds(&seen.borrow()).last(),
            Some(&SinkEventKind::Eos)
        );
        assert_eq!(fx.sinks.find_by_name("v").unwrap().state(), EndpointState::Eos);
    }

    #[test]
    fn test_graph_eos_releases_every_sink() {
        let mut fx = Fixture::new("appsink name=a appsink name=b");
        fx.add_sink("a");
        fx.add_sink("b");
        let generation = fx.bridge.current_generation();
        fx.bridge.post(generation, QueuedEvent::EndOfStream);

        let report = fx.drain();
        assert_eq!(report.eos_delivered, 2);
        assert!(report.completion_fired);
    }

    #[test]
    fn test_completion_once() {
        let mut fx = Fixture::new("appsink name=a ! appsink name=b");
        fx.add_sink("a");
        fx.add_sink("b");
        let fired = Rc::new(RefCell::new(0));
        let counter = fired.clone();
        fx.dispatcher
            .set_completion(CompletionCallback::new(move |()| *counter.borrow_mut() += 1));

        fx.engine.sink("a").unwrap().set_eos();
        assert!(!fx.drain().completion_fired);
        fx.engine.sink("b").unwrap().set_eos();
        assert!(fx.drain().completion_fired);
        fx.drain();
        assert_eq!(*fired.borrow(), 1);
        assert_eq!(fx.dispatcher.stats().completions, 1);
    }

    #[test]
    fn test_graph_eos_completes_without_sinks() {
        let mut fx = Fixture::new("fakesrc ! fakesink");
        let generation = fx.bridge.current_generation();
        fx.bridge.post(generation, QueuedEvent::EndOfStream);
        let report = fx.drain();
        assert!(report.completion_fired);
        assert!(fx.dispatcher.graph_eos());
    }

    #[test]
    fn test_stale_events_ignored() {
        let mut fx = Fixture::new("appsink name=v");
        let old = fx.bridge.current_generation();
        fx.bridge.advance_generation();
        fx.bridge.post(old, QueuedEvent::EndOfStream);

        let report = fx.drain();
        assert_eq!(report.stale_events, 1);
        assert_eq!(report.events_processed, 0);
        assert!(!fx.dispatcher.graph_eos());
    }

    #[test]
    fn test_pull_bound_spreads_over_passes() {
        let mut fx = Fixture::new("appsink name=v");
        fx.dispatcher = Dispatcher::new(DispatchConfig {
            max_passes: 64,
            max_pulls_per_pass: 2,
        });
        let seen = fx.add_sink("v");
        let sink = fx.engine.sink("v").unwrap();
        for i in 0..5u8 {
            sink.push(&video_caps(), vec![i]);
        }

        let report = fx.drain();
        assert_eq!(report.samples_delivered, 5);
        assert_eq!(report.passes, 3);
        let bytes: Vec<u8> = seen
            .borrow()
            .iter()
            .filter_map(|e| e.payload().map(|p| p.data[0]))
            .collect();
        assert_eq!(bytes, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_pass_bound_truncates_and_rewakes() {
        let engine = MockEngine::new();
        let graph = engine.clone().parse_launch("appsink name=v").unwrap();
        let (notifier, wake) = Notifier::new();
        let bridge = BridgeHandle::new(notifier);
        bridge.advance_generation();

        let mut sinks = SinkRegistry::new();
        sinks.insert(SinkEndpoint::new(
            "v",
            graph.app_sink("v").unwrap(),
            SinkCallback::new(|_| {}),
        ));
        let mut dispatcher = Dispatcher::new(DispatchConfig {
            max_passes: 1,
            max_pulls_per_pass: 1,
        });
        let sink = engine.sink("v").unwrap();
        sink.push(&video_caps(), vec![1]);
        sink.push(&video_caps(), vec![2]);
        while wake.try_take() {}

        let report = dispatcher.drain(&bridge, &mut sinks, &mut ProbeRegistry::new());
        assert!(report.truncated);
        assert_eq!(report.samples_delivered, 1);
        assert!(wake.try_take());
    }
}
