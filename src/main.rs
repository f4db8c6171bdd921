//! Sample bridge command-line player
//!
//! Builds a GStreamer pipeline, attaches to its app sinks and pad probes, and
//! logs every delivery until all sinks reach end-of-stream.
//!
//! # Usage
//!
//! ```bash
//! sample-bridge "videotestsrc num-buffers=30 ! videoconvert ! appsink name=video" \
//!     --sink video --probe video:sink
//!
//! RUST_LOG=sample_bridge=trace sample-bridge "audiotestsrc num-buffers=10 ! appsink name=a" -s a
//! ```

use anyhow::{bail, Context};
use clap::Parser;
use sample_bridge::engine::gst::GstEngine;
use sample_bridge::{
    logging, BridgeConfig, CapsNotification, PipelineState, Player, SinkEvent,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sample-bridge")]
#[command(about = "Deliver samples from a GStreamer pipeline to a single consumer thread")]
#[command(version)]
struct Cli {
    /// Pipeline description in gst-launch syntax
    pipeline: String,

    /// Name of an appsink to attach to (repeatable)
    #[arg(short, long = "sink")]
    sinks: Vec<String>,

    /// Caps probe as `element:pad` (repeatable)
    #[arg(short, long = "probe")]
    probes: Vec<String>,

    /// Config file; defaults to the platform config directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
}

fn parse_probe(spec: &str) -> anyhow::Result<(&str, &str)> {
    match spec.split_once(':') {
        Some((element, pad)) if !element.is_empty() && !pad.is_empty() => Ok((element, pad)),
        _ => bail!("probe '{}' is not of the form element:pad", spec),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => BridgeConfig::load_or_default(),
    };
    logging::init(&config.logging);

    if cli.sinks.is_empty() {
        tracing::warn!("No sinks given; waiting for pipeline end-of-stream only");
    }

    let engine = GstEngine::new()?;
    let mut player = Player::new(Box::new(engine), config);
    player
        .build(&cli.pipeline)
        .context("building pipeline")?;

    for name in &cli.sinks {
        let sink = name.clone();
        player
            .register_sink(name, move |event: SinkEvent| match &event {
                SinkEvent::Setup { media_type, properties } => {
                    tracing::info!("[{}] setup {} {:?}", sink, media_type, properties)
                }
                SinkEvent::Preroll(payload) | SinkEvent::NewSample(payload) => {
                    tracing::info!(
                        "[{}] {:?} {} bytes {}",
                        sink,
                        event.kind(),
                        payload.len(),
                        serde_json::Value::Object(payload.named_properties())
                    )
                }
                SinkEvent::Eos => tracing::info!("[{}] end-of-stream", sink),
            })
            .with_context(|| format!("registering sink '{}'", name))?;
    }

    for spec in &cli.probes {
        let (element, pad) = parse_probe(spec)?;
        let label = spec.clone();
        player
            .register_caps_probe(element, pad, move |n: CapsNotification| {
                tracing::info!("[{}] caps {}", label, n.caps)
            })
            .with_context(|| format!("registering probe '{}'", spec))?;
    }

    player.set_completion_callback(|()| tracing::info!("All sinks finished"));
    player.set_lifecycle_state(PipelineState::Playing)?;

    let deadline = cli
        .timeout
        .map(|secs| std::time::Instant::now() + Duration::from_secs(secs));
    while !player.completion_fired() {
        if deadline.is_some_and(|d| std::time::Instant::now() >= d) {
            tracing::warn!("Timed out before end-of-stream");
            break;
        }
        player.wait_and_dispatch(Some(Duration::from_millis(100)));
    }

    let stats = player.stats();
    tracing::info!(
        "Delivered {} samples ({} dropped, {} caps changes)",
        stats.samples_delivered,
        stats.samples_dropped,
        stats.caps_notifications
    );
    player.close();
    Ok(())
}
