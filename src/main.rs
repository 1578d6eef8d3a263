//! statebus demo - Main Entry Point
//!
//! Runs the capture loop on a synthetic source and one region-tracking
//! worker against a freshly compiled segment, then shuts both down and
//! reports their statistics.
//!
//! Usage: `statebus [config.toml|config.json]`

use anyhow::Context;
use crossbeam_channel::unbounded;
use statebus_rs::{
    capture::SyntheticCapture,
    config::BusConfig,
    store::{PropertyValue, Record},
    worker::{OrchestratorMessage, RegionTracker, WorkerContext, WorkerRunner},
    FrameProducer, SchemaCompiler, SharedSegment,
};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const WORKER_ID: u32 = 1;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,statebus_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting statebus demo");

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => BusConfig::load(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => BusConfig::load_or_default(BusConfig::default_path()),
    };

    let schema = SchemaCompiler::compile(&config.schema_decls()).context("compiling schema")?;
    tracing::info!(
        properties = schema.len(),
        lanes = schema.total_lanes,
        fingerprint = %format!("{:016x}", schema.fingerprint),
        "Schema compiled"
    );

    let segment = Arc::new(SharedSegment::new(schema, config.capture.frame_limits()));
    segment.configure_capture(config.capture.window_handle, config.capture.target_fps);

    // Capture loop
    let source = SyntheticCapture::new(config.demo.width, config.demo.height);
    let mut producer = FrameProducer::new(segment.clone(), Box::new(source), config.capture.clone());
    let producer_stop = producer.stop_handle();
    let producer_handle = std::thread::Builder::new()
        .name("capture".to_string())
        .spawn(move || {
            let result = producer.run();
            (result, producer.stats().clone())
        })
        .context("spawning capture thread")?;

    // Region tracking worker
    let (orchestrator_tx, orchestrator_rx) = unbounded();
    let ctx = WorkerContext::new(segment.clone(), &config, WORKER_ID)?;
    let mut runner = WorkerRunner::new(
        RegionTracker::new().announce_empty(true),
        ctx,
        orchestrator_rx,
        Arc::new(AtomicBool::new(true)),
        config.worker.poll_interval(),
    );
    let worker_handle = std::thread::Builder::new()
        .name("region-tracker".to_string())
        .spawn(move || {
            runner.run();
            (runner.stats().clone(), runner.context().gate.stats().clone())
        })
        .context("spawning worker thread")?;

    orchestrator_tx.send(OrchestratorMessage::InitialSnapshot(vec![(
        "botConfig".to_string(),
        PropertyValue::Struct(
            Record::new()
                .with("enabled", true)
                .with("scanIntervalMs", config.worker.poll_interval_ms as u32)
                .with("matchThreshold", 0.8f32)
                .with("profile", "demo"),
        ),
    )]))?;

    std::thread::sleep(Duration::from_millis(config.demo.duration_ms));

    orchestrator_tx.send(OrchestratorMessage::Shutdown)?;
    producer_stop.stop();

    let (worker_stats, gate_stats) = worker_handle
        .join()
        .map_err(|_| anyhow::anyhow!("worker thread panicked"))?;
    let (producer_result, producer_stats) = producer_handle
        .join()
        .map_err(|_| anyhow::anyhow!("capture thread panicked"))?;
    producer_result.context("capture loop failed")?;

    tracing::info!(
        published = producer_stats.frames_published,
        skipped = producer_stats.frames_skipped,
        rects_dropped = producer_stats.rects_dropped,
        late = producer_stats.late_iterations,
        "Producer finished"
    );
    tracing::info!(
        frames = worker_stats.frames,
        skipped = worker_stats.frames_skipped,
        full_scans = gate_stats.full_scans,
        partial_scans = gate_stats.partial_scans,
        merges = gate_stats.merges,
        "Worker finished"
    );

    Ok(())
}
