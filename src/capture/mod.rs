//! Frame synchronization between the capture loop and its consumers.
//!
//! One [`FrameProducer`] pulls frames from a [`CaptureSource`] into the
//! segment's double-buffered image area and publishes them through the
//! capture sync block. Any number of [`FrameConsumer`]s poll (or wait on) the
//! frame counter and pick up the dirty rectangles of the newest frame.
//!
//! # Publish order
//!
//! ```text
//! producer                               consumer
//! --------                               --------
//! pixels -> inactive buffer
//! width, height, dirty rects, timestamp
//! active_buffer = inactive
//! frame_counter += 1  ------------------> sees counter != last_seen
//! notify                                  reads metadata, re-checks counter
//! ```
//!
//! The producer never waits on consumers. A slow consumer skips frames and
//! only ever sees the newest one.

pub mod consumer;
pub mod producer;
pub mod synthetic;

pub use consumer::{FrameConsumer, FrameUpdate};
pub use producer::{FrameProducer, ProducerState, ProducerStats, StopHandle};
pub use synthetic::SyntheticCapture;

use crate::error::Result;
use crate::types::CapturedFrame;

/// A native screen-capture backend.
///
/// Implementations must be `Send` so the producer can run on its own thread.
#[cfg_attr(test, mockall::automock)]
pub trait CaptureSource: Send {
    /// Begin monitoring `window_handle` at roughly `target_fps`
    fn start_monitor(&mut self, window_handle: u32, target_fps: u32) -> Result<()>;

    /// Copy the newest frame into `dest` (row-major, one pixel per lane).
    ///
    /// Returns `success == false` when nothing changed since the last call.
    fn get_latest_frame(&mut self, dest: &mut [u32]) -> Result<CapturedFrame>;

    /// Stop monitoring; safe to call when not started
    fn stop_monitor(&mut self);
}
