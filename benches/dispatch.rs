//! Benchmarks for the delivery path
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sample_bridge::engine::mock::MockEngine;
use sample_bridge::media::{CapsValue, VideoInfo};
use sample_bridge::pipeline::{
    classify, BridgeHandle, EndpointId, Notifier, QueuedEvent, SinkCallback,
};
use sample_bridge::{BridgeConfig, Caps, Player};

fn video_caps(width: i32, height: i32) -> Caps {
    Caps::new("video/x-raw")
        .with_field("format", "I420")
        .with_field("width", width)
        .with_field("height", height)
        .with_field("framerate", CapsValue::Fraction(30, 1))
}

fn bench_post(c: &mut Criterion) {
    let (notifier, wake) = Notifier::new();
    let bridge = BridgeHandle::new(notifier);
    let generation = bridge.advance_generation();

    c.bench_function("bridge_post", |b| {
        b.iter(|| {
            bridge.post(
                generation,
                black_box(QueuedEvent::NewDataAvailable(EndpointId(1))),
            );
            if bridge.queue().len() >= 4096 {
                bridge.queue().clear();
                wake.try_take();
            }
        })
    });
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    for (width, height) in [(320, 240), (1920, 1080)] {
        let caps = video_caps(width, height);
        group.bench_with_input(
            BenchmarkId::new("video", format!("{}x{}", width, height)),
            &caps,
            |b, caps| b.iter(|| classify(black_box(caps))),
        );
    }
    let audio = Caps::new("audio/x-raw")
        .with_field("format", "S16LE")
        .with_field("rate", 48_000)
        .with_field("channels", 2);
    group.bench_function("audio", |b| b.iter(|| classify(black_box(&audio))));
    group.finish();

    let caps = video_caps(1920, 1080);
    c.bench_function("video_info_from_caps", |b| {
        b.iter(|| VideoInfo::from_caps(black_box(&caps)))
    });
}

fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain");

    for (width, height) in [(320, 240), (1280, 720)] {
        let frame = width * height * 3 / 2;
        group.throughput(Throughput::Bytes(frame as u64 * 16));
        group.bench_function(
            BenchmarkId::new("16_frames", format!("{}x{}", width, height)),
            |b| {
                let engine = MockEngine::new();
                let mut player = Player::new(Box::new(engine.clone()), BridgeConfig::default());
                player.build("videotestsrc ! appsink name=v max-buffers=64").unwrap();
                player
                    .register_sink("v", SinkCallback::new(|e| {
                        black_box(e);
                    }))
                    .unwrap();
                let sink = engine.sink("v").unwrap();
                let caps = video_caps(width as i32, height as i32);
                let data = vec![0x10u8; frame];

                b.iter(|| {
                    for _ in 0..16 {
                        sink.push(&caps, data.clone());
                    }
                    player.dispatch()
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_post, bench_classify, bench_drain);
criterion_main!(benches);
