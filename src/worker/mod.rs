//! Worker runtime
//!
//! Every worker runs on its own thread and talks to the others only through
//! the shared segment. A [`WorkerRunner`] owns one [`Worker`] implementation
//! together with its explicit [`WorkerContext`] and drives the polling loop:
//!
//! 1. drain orchestrator messages (initial snapshot, state diffs, shutdown)
//! 2. idle while the capture loop is not running
//! 3. poll the frame consumer; on a new frame run the scan gate and call
//!    [`Worker::on_frame`]
//! 4. hand control-channel messages to [`Worker::on_message`]
//! 5. sleep on the frame counter for up to the poll interval
//!
//! Errors from a single tick are logged and counted; they never stop the loop.
//! Stopping is cooperative through the shared `running` flag.

pub mod region_tracker;

pub use region_tracker::RegionTracker;

use crate::capture::{FrameConsumer, FrameUpdate};
use crate::channel::{ControlChannel, Message};
use crate::config::BusConfig;
use crate::error::{Result, StateBusError};
use crate::scan_gate::{ScanDecision, ScanGate};
use crate::schema::PropertyKind;
use crate::segment::SharedSegment;
use crate::store::{PropertyValue, SharedStateStore};
use crossbeam_channel::{Receiver, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Out-of-band control from the process that owns a worker
#[derive(Debug, Clone)]
pub enum OrchestratorMessage {
    /// Full state to seed the store with on startup
    InitialSnapshot(Vec<(String, PropertyValue)>),
    /// Properties changed by the orchestrator
    StateDiff(Vec<(String, PropertyValue)>),
    /// Stop the worker loop
    Shutdown,
}

/// Everything a worker needs; passed explicitly instead of globals
#[derive(Debug)]
pub struct WorkerContext {
    pub worker_id: u32,
    pub store: SharedStateStore,
    /// Absent when the schema declares no control channel
    pub channel: Option<ControlChannel>,
    pub frames: FrameConsumer,
    pub gate: ScanGate,
}

impl WorkerContext {
    pub fn new(segment: Arc<SharedSegment>, config: &BusConfig, worker_id: u32) -> Result<Self> {
        let channel = match segment.schema().descriptor(&config.channel.property) {
            Ok(desc) if matches!(desc.kind, PropertyKind::RingBuffer { .. }) => Some(
                ControlChannel::new(segment.clone(), &config.channel, worker_id)?,
            ),
            Ok(desc) => {
                return Err(StateBusError::kind_mismatch(
                    &config.channel.property,
                    format!("expected ring_buffer, found {}", desc.kind.name()),
                ))
            }
            Err(_) => None,
        };

        Ok(Self {
            worker_id,
            store: SharedStateStore::new(segment.clone(), &config.store),
            channel,
            frames: FrameConsumer::new(segment),
            gate: ScanGate::new(config.scan_gate.clone()),
        })
    }
}

/// Behavior plugged into a [`WorkerRunner`]
pub trait Worker: Send {
    fn name(&self) -> &str;

    /// A new frame was published; `decision` is the scan gate's verdict
    fn on_frame(
        &mut self,
        ctx: &mut WorkerContext,
        frame: &FrameUpdate,
        decision: &ScanDecision,
    ) -> Result<()>;

    /// A control-channel message addressed to this worker
    fn on_message(&mut self, _ctx: &mut WorkerContext, _message: &Message) -> Result<()> {
        Ok(())
    }

    /// Called each tick while the capture loop is not running
    fn on_idle(&mut self, _ctx: &mut WorkerContext) -> Result<()> {
        Ok(())
    }
}

/// Counters kept by a worker loop
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    pub ticks: u64,
    pub frames: u64,
    /// Frames published but never seen by this worker
    pub frames_skipped: u64,
    pub full_scans: u64,
    pub partial_scans: u64,
    pub messages: u64,
    pub idle_ticks: u64,
    pub state_updates: u64,
    pub errors: u64,
}

/// Drives one [`Worker`] on the calling thread
pub struct WorkerRunner<W: Worker> {
    worker: W,
    ctx: WorkerContext,
    orchestrator: Receiver<OrchestratorMessage>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    stats: WorkerStats,
}

impl<W: Worker> WorkerRunner<W> {
    pub fn new(
        worker: W,
        ctx: WorkerContext,
        orchestrator: Receiver<OrchestratorMessage>,
        running: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            worker,
            ctx,
            orchestrator,
            running,
            poll_interval,
            stats: WorkerStats::default(),
        }
    }

    pub fn worker(&self) -> &W {
        &self.worker
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Shared flag that stops [`run`](Self::run) when cleared
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Run ticks until the running flag is cleared
    pub fn run(&mut self) {
        tracing::info!(
            worker = self.worker.name(),
            id = self.ctx.worker_id,
            "Worker started"
        );

        while self.is_running() {
            if let Err(e) = self.tick() {
                self.stats.errors += 1;
                if e.is_transient() {
                    tracing::debug!(worker = self.worker.name(), "Tick dropped: {}", e);
                } else {
                    tracing::warn!(worker = self.worker.name(), "Tick failed: {}", e);
                }
            }

            if self.is_running() {
                self.ctx.frames.wait(self.poll_interval);
            }
        }

        tracing::info!(
            worker = self.worker.name(),
            ticks = self.stats.ticks,
            frames = self.stats.frames,
            skipped = self.stats.frames_skipped,
            messages = self.stats.messages,
            errors = self.stats.errors,
            "Worker stopped"
        );
    }

    /// One iteration of the worker loop
    pub fn tick(&mut self) -> Result<()> {
        self.stats.ticks += 1;

        self.process_orchestrator();
        if !self.is_running() {
            return Ok(());
        }

        if self.ctx.frames.is_source_running() {
            self.process_frame()?;
        } else {
            self.stats.idle_ticks += 1;
            self.worker.on_idle(&mut self.ctx)?;
        }

        self.process_messages()
    }

    fn process_orchestrator(&mut self) {
        loop {
            match self.orchestrator.try_recv() {
                Ok(OrchestratorMessage::InitialSnapshot(values)) => {
                    tracing::debug!(properties = values.len(), "Applying initial snapshot");
                    self.apply_state(&values);
                }
                Ok(OrchestratorMessage::StateDiff(values)) => self.apply_state(&values),
                Ok(OrchestratorMessage::Shutdown) => {
                    tracing::info!(worker = self.worker.name(), "Shutdown requested");
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::info!(worker = self.worker.name(), "Orchestrator disconnected");
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    fn apply_state(&mut self, values: &[(String, PropertyValue)]) {
        let updates: Vec<(&str, PropertyValue)> = values
            .iter()
            .map(|(name, value)| (name.as_str(), value.clone()))
            .collect();

        match self.ctx.store.set_many(&updates) {
            Ok(_) => self.stats.state_updates += updates.len() as u64,
            Err(e) => {
                self.stats.errors += 1;
                tracing::warn!(worker = self.worker.name(), "Failed to apply state: {}", e);
            }
        }
    }

    fn process_frame(&mut self) -> Result<()> {
        let Some(frame) = self.ctx.frames.poll() else {
            return Ok(());
        };

        self.stats.frames += 1;
        self.stats.frames_skipped += frame.skipped as u64;

        self.ctx
            .gate
            .ingest(&frame.dirty_rects, frame.metadata.frame_counter);
        let decision = self.ctx.gate.decide(
            Instant::now(),
            frame.metadata.width,
            frame.metadata.height,
        );
        match decision {
            ScanDecision::Full { .. } => self.stats.full_scans += 1,
            ScanDecision::Partial { .. } => self.stats.partial_scans += 1,
        }

        self.worker.on_frame(&mut self.ctx, &frame, &decision)
    }

    fn process_messages(&mut self) -> Result<()> {
        let messages = match &self.ctx.channel {
            Some(channel) => channel.poll()?,
            None => return Ok(()),
        };

        for message in &messages {
            self.stats.messages += 1;
            if message.command == crate::channel::Command::Shutdown {
                tracing::info!(
                    worker = self.worker.name(),
                    sender = message.sender,
                    "Shutdown received on control channel"
                );
                self.running.store(false, Ordering::SeqCst);
            }
            self.worker.on_message(&mut self.ctx, message)?;
        }
        Ok(())
    }
}

impl<W: Worker> std::fmt::Debug for WorkerRunner<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRunner")
            .field("worker", &self.worker.name())
            .field("id", &self.ctx.worker_id)
            .field("stats", &self.stats)
            .finish()
    }
}
