//! The capture loop.
//!
//! # Lifecycle
//!
//! `Stopped -> Running -> Stopped`. [`FrameProducer::start`] reads the window
//! handle and target rate from the sync block (falling back to
//! [`CaptureConfig`]), starts the source and raises the running lane.
//! [`FrameProducer::run`] then publishes frames until a [`StopHandle`] is
//! triggered or the source fails. A stop requested through the handle is
//! final: if it lands before `run` gets going, `run` returns without
//! starting the source. A source failure clears the running lane,
//! wakes every waiter and ends the loop; consumers see it through
//! [`FrameConsumer::is_source_running`](super::FrameConsumer::is_source_running).
//!
//! # Pacing
//!
//! Iterations are scheduled against absolute deadlines one frame interval
//! apart, so a slow iteration is absorbed by shorter sleeps afterwards
//! instead of pushing every later frame back. When the loop falls more than
//! one interval behind, the schedule is reset to now.

use super::CaptureSource;
use crate::config::CaptureConfig;
use crate::error::{Result, StateBusError};
use crate::segment::sync_block::{self, dirty_rect_lane, RECT_LANES};
use crate::segment::SharedSegment;
use crate::types::Rect;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Producer lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Stopped,
    Running,
}

/// Counters kept by the capture loop
#[derive(Debug, Clone, Default)]
pub struct ProducerStats {
    /// Frames made visible to consumers
    pub frames_published: u64,
    /// Calls where the source had nothing new, or the frame did not fit
    pub frames_skipped: u64,
    /// Dirty rectangles beyond the per-frame cap
    pub rects_dropped: u64,
    /// Iterations that overran their deadline
    pub late_iterations: u64,
    /// Duration of the most recent iteration
    pub last_iteration: Duration,
}

/// Cloneable handle that asks a running producer to stop
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    segment: Arc<SharedSegment>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.segment
            .notify(self.segment.sync_index(sync_block::RUNNING));
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst) || !self.running.load(Ordering::SeqCst)
    }
}

/// Single writer of the capture sync block and image buffers
pub struct FrameProducer {
    segment: Arc<SharedSegment>,
    source: Box<dyn CaptureSource>,
    config: CaptureConfig,
    state: ProducerState,
    stats: ProducerStats,
    running: Arc<AtomicBool>,
    /// Set by a [`StopHandle`]; never cleared
    stop_requested: Arc<AtomicBool>,
    scratch: Vec<u32>,
    target_fps: u32,
}

impl FrameProducer {
    pub fn new(
        segment: Arc<SharedSegment>,
        source: Box<dyn CaptureSource>,
        config: CaptureConfig,
    ) -> Self {
        let scratch = vec![0u32; segment.limits().pixels()];
        Self {
            segment,
            source,
            target_fps: config.target_fps,
            config,
            state: ProducerState::Stopped,
            stats: ProducerStats::default(),
            running: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            scratch,
        }
    }

    pub fn state(&self) -> ProducerState {
        self.state
    }

    pub fn stats(&self) -> &ProducerStats {
        &self.stats
    }

    /// Handle for stopping [`run`](Self::run) from another thread
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: self.running.clone(),
            stop_requested: self.stop_requested.clone(),
            segment: self.segment.clone(),
        }
    }

    /// Interval between frames at the effective target rate
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.target_fps.max(1) as u64)
    }

    /// Start the capture source and raise the running lane
    pub fn start(&mut self) -> Result<()> {
        if self.state == ProducerState::Running {
            return Ok(());
        }

        let window = match self.segment.sync_load(sync_block::WINDOW_ID) {
            0 => self.config.window_handle,
            id => id,
        };
        self.target_fps = match self.segment.sync_load(sync_block::TARGET_FPS) {
            0 => self.config.target_fps.max(1),
            fps => fps,
        };

        self.source
            .start_monitor(window, self.target_fps)
            .map_err(capture_failure)?;

        self.running.store(true, Ordering::SeqCst);
        self.segment.sync_store(sync_block::RUNNING, 1);
        self.state = ProducerState::Running;

        tracing::info!(
            window = %format!("{:#x}", window),
            target_fps = self.target_fps,
            "Capture loop started"
        );
        Ok(())
    }

    /// Clear the running lane, wake waiters and stop the source
    pub fn stop(&mut self) {
        if self.state == ProducerState::Stopped {
            return;
        }

        self.running.store(false, Ordering::SeqCst);
        self.segment.sync_store(sync_block::RUNNING, 0);
        self.segment
            .notify(self.segment.sync_index(sync_block::RUNNING));
        self.source.stop_monitor();
        self.state = ProducerState::Stopped;

        tracing::info!(
            frames = self.stats.frames_published,
            skipped = self.stats.frames_skipped,
            late = self.stats.late_iterations,
            "Capture loop stopped"
        );
    }

    /// Pull one frame and publish it if the source had something new.
    ///
    /// Returns whether a frame was published. A source error stops the
    /// producer and is returned as [`StateBusError::CaptureSourceFailure`].
    pub fn step(&mut self) -> Result<bool> {
        if self.state != ProducerState::Running {
            return Err(StateBusError::CaptureSourceFailure(
                "producer is not running".to_string(),
            ));
        }

        let frame = match self.source.get_latest_frame(&mut self.scratch) {
            Ok(frame) => frame,
            Err(e) => {
                let err = capture_failure(e);
                tracing::error!("Capture source failed: {}", err);
                self.stop();
                return Err(err);
            }
        };

        if !frame.success {
            self.stats.frames_skipped += 1;
            return Ok(false);
        }

        let pixels = frame.width as usize * frame.height as usize;
        if pixels > self.scratch.len() {
            tracing::warn!(
                width = frame.width,
                height = frame.height,
                limit = ?self.segment.limits(),
                "Frame larger than the image buffer, skipped"
            );
            self.stats.frames_skipped += 1;
            return Ok(false);
        }

        self.publish(frame.width, frame.height, pixels, &frame.changed_regions);
        Ok(true)
    }

    fn publish(&mut self, width: u32, height: u32, pixels: usize, regions: &[Rect]) {
        let segment = &self.segment;

        let inactive = (segment.sync_load(sync_block::ACTIVE_BUFFER) ^ 1) & 1;
        let buffer = segment.image_buffer(inactive as usize);
        for (lane, pixel) in buffer.iter().zip(&self.scratch[..pixels]) {
            lane.store(*pixel, Ordering::Relaxed);
        }

        segment.sync_store(sync_block::WIDTH, width);
        segment.sync_store(sync_block::HEIGHT, height);

        let cap = self.config.dirty_rect_cap();
        let published = regions.len().min(cap);
        for (i, rect) in regions.iter().take(published).enumerate() {
            for (j, lane) in rect.to_lanes().into_iter().enumerate().take(RECT_LANES) {
                segment.sync_store(dirty_rect_lane(i, j), lane);
            }
        }
        segment.sync_store(sync_block::DIRTY_COUNT, published as u32);
        segment.sync_store(sync_block::TIMESTAMP, segment.timestamp_ms());
        segment.sync_store(sync_block::ACTIVE_BUFFER, inactive);

        let counter = segment.sync_index(sync_block::FRAME_COUNTER);
        let previous = segment.fetch_add(counter, 1);
        segment.notify(counter);

        let dropped = regions.len() - published;
        if dropped > 0 {
            self.stats.rects_dropped += dropped as u64;
            tracing::debug!(dropped, cap, "Dirty rectangles over the per-frame cap dropped");
        }
        self.stats.frames_published += 1;
        tracing::trace!(
            frame = previous.wrapping_add(1),
            rects = published,
            "Frame published"
        );
    }

    /// Start and publish frames until stopped or the source fails
    pub fn run(&mut self) -> Result<()> {
        if self.stop_requested.load(Ordering::SeqCst) {
            tracing::debug!("Stop requested before the capture loop started");
            return Ok(());
        }
        self.start()?;

        let mut deadline = Instant::now();
        // start() raises `running`, so a stop racing it is caught by the flag
        while self.running.load(Ordering::SeqCst) && !self.stop_requested.load(Ordering::SeqCst) {
            let interval = self.frame_interval();
            let iteration_start = Instant::now();

            self.step()?;

            self.stats.last_iteration = iteration_start.elapsed();
            deadline += interval;

            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            } else {
                self.stats.late_iterations += 1;
                if now - deadline > interval {
                    deadline = now;
                }
            }
        }

        self.stop();
        Ok(())
    }
}

impl Drop for FrameProducer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FrameProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameProducer")
            .field("state", &self.state)
            .field("target_fps", &self.target_fps)
            .field("stats", &self.stats)
            .finish()
    }
}

fn capture_failure(err: StateBusError) -> StateBusError {
    match err {
        StateBusError::CaptureSourceFailure(_) => err,
        other => StateBusError::CaptureSourceFailure(other.to_string()),
    }
}
