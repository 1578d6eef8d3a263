//! Consumer side of the frame protocol.
//!
//! Each worker owns one [`FrameConsumer`] holding the last frame counter it
//! processed. Metadata and dirty rectangles are read between two loads of
//! the frame counter; if the counter moved, the read is repeated.

use crate::error::{Result, StateBusError};
use crate::segment::sync_block::{self, dirty_rect_lane, MAX_DIRTY_RECTS};
use crate::segment::{SharedSegment, WaitOutcome};
use crate::types::{FrameMetadata, Rect};
use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Attempts at a stable read before giving up on a frame
const READ_ATTEMPTS: u32 = 4;

/// A frame newer than the last one this consumer processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameUpdate {
    pub metadata: FrameMetadata,
    /// Changed regions reported with this frame
    pub dirty_rects: Vec<Rect>,
    /// Frames published since the previous update that this consumer never saw
    pub skipped: u32,
}

/// Per-worker reader of the capture sync block
#[derive(Debug, Clone)]
pub struct FrameConsumer {
    segment: Arc<SharedSegment>,
    last_seen: u32,
}

impl FrameConsumer {
    /// A consumer that treats every published frame as new
    pub fn new(segment: Arc<SharedSegment>) -> Self {
        Self {
            segment,
            last_seen: 0,
        }
    }

    /// A consumer that ignores frames published before now
    pub fn from_latest(segment: Arc<SharedSegment>) -> Self {
        let last_seen = segment.sync_load(sync_block::FRAME_COUNTER);
        Self { segment, last_seen }
    }

    pub fn last_seen(&self) -> u32 {
        self.last_seen
    }

    /// Whether the producer is currently publishing frames
    pub fn is_source_running(&self) -> bool {
        self.segment.capture_running()
    }

    fn counter(&self) -> u32 {
        self.segment.sync_load(sync_block::FRAME_COUNTER)
    }

    fn read_metadata(&self, frame_counter: u32) -> (FrameMetadata, Vec<Rect>) {
        let segment = &self.segment;
        let metadata = FrameMetadata {
            frame_counter,
            width: segment.sync_load(sync_block::WIDTH),
            height: segment.sync_load(sync_block::HEIGHT),
            timestamp: segment.sync_load(sync_block::TIMESTAMP),
        };

        let count = (segment.sync_load(sync_block::DIRTY_COUNT) as usize).min(MAX_DIRTY_RECTS);
        let rects = (0..count)
            .map(|i| {
                Rect::from_lanes([
                    segment.sync_load(dirty_rect_lane(i, 0)),
                    segment.sync_load(dirty_rect_lane(i, 1)),
                    segment.sync_load(dirty_rect_lane(i, 2)),
                    segment.sync_load(dirty_rect_lane(i, 3)),
                ])
            })
            .collect();

        (metadata, rects)
    }

    /// Return the newest frame if the counter moved since the last call.
    ///
    /// When the producer keeps publishing during every attempt, the rectangles
    /// of the last attempt are returned anyway; they are advisory.
    pub fn poll(&mut self) -> Option<FrameUpdate> {
        if self.counter() == self.last_seen {
            return None;
        }

        let mut attempt = 0;
        let (metadata, dirty_rects) = loop {
            attempt += 1;
            let before = self.counter();
            let (metadata, rects) = self.read_metadata(before);
            let after = self.counter();

            if before == after || attempt >= READ_ATTEMPTS {
                if before != after {
                    tracing::trace!(before, after, "Frame metadata read raced the producer");
                }
                break (metadata, rects);
            }
        };

        let skipped = metadata
            .frame_counter
            .wrapping_sub(self.last_seen)
            .wrapping_sub(1);
        self.last_seen = metadata.frame_counter;

        Some(FrameUpdate {
            metadata,
            dirty_rects,
            skipped,
        })
    }

    /// Block until a new frame is published or `timeout` elapses
    pub fn wait_for_frame(&mut self, timeout: Duration) -> Option<FrameUpdate> {
        if let Some(update) = self.poll() {
            return Some(update);
        }

        let lane = self.segment.sync_index(sync_block::FRAME_COUNTER);
        match self.segment.wait(lane, self.last_seen, timeout) {
            WaitOutcome::Changed => self.poll(),
            WaitOutcome::TimedOut => None,
        }
    }

    /// Sleep until the frame counter moves past `last_seen` or `timeout`
    /// elapses, without consuming the frame
    pub fn wait(&self, timeout: Duration) -> bool {
        let lane = self.segment.sync_index(sync_block::FRAME_COUNTER);
        self.segment.wait(lane, self.last_seen, timeout) == WaitOutcome::Changed
    }

    /// Copy the active image buffer into `dest`, resized to `width * height`.
    ///
    /// The copy is repeated while the producer publishes in the middle of it.
    pub fn read_pixels(&self, dest: &mut Vec<u32>) -> Result<FrameMetadata> {
        let segment = &self.segment;

        for _ in 0..READ_ATTEMPTS {
            let before = self.counter();
            let active = segment.sync_load(sync_block::ACTIVE_BUFFER) as usize;
            let width = segment.sync_load(sync_block::WIDTH);
            let height = segment.sync_load(sync_block::HEIGHT);
            let timestamp = segment.sync_load(sync_block::TIMESTAMP);

            let buffer = segment.image_buffer(active);
            let pixels = (width as usize * height as usize).min(buffer.len());
            dest.clear();
            dest.extend(buffer[..pixels].iter().map(|p| p.load(Ordering::Relaxed)));

            // Keeps the relaxed pixel loads ahead of the counter re-check
            fence(Ordering::Acquire);
            if self.counter() == before {
                return Ok(FrameMetadata {
                    frame_counter: before,
                    width,
                    height,
                    timestamp,
                });
            }
        }

        Err(StateBusError::InconsistentSnapshot("image buffer".to_string()))
    }
}
