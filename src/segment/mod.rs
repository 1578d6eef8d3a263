//! The shared segment: a fixed block of 32-bit atomic lanes.
//!
//! All realtime data shared between workers lives here:
//!
//! - the schema-compiled property lanes (`[0, total_lanes)`)
//! - the capture sync block (`[total_lanes, total_lanes + SYNC_BLOCK_LANES)`)
//! - two image buffers, double buffered by the capture loop
//!
//! Lanes are only touched through atomic load/store/add/compare-and-swap and
//! wait/notify, all sequentially consistent. Waiting is bounded by a timeout;
//! a notify wakes every waiter and each waiter re-checks its own lane.

pub mod sync_block;

use crate::schema::CompiledSchema;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

pub use sync_block::{MAX_DIRTY_RECTS, SYNC_BLOCK_LANES};

/// Outcome of a bounded wait on a lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The lane no longer holds the expected value
    Changed,
    /// The timeout elapsed with the lane unchanged
    TimedOut,
}

/// Largest frame the image buffers can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_width: u32,
    pub max_height: u32,
}

impl FrameLimits {
    pub fn pixels(&self) -> usize {
        self.max_width as usize * self.max_height as usize
    }
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
        }
    }
}

/// One process-wide shared segment, shared between worker threads via `Arc`
pub struct SharedSegment {
    schema: CompiledSchema,
    lanes: Box<[AtomicU32]>,
    sync_base: usize,
    images: [Box<[AtomicU32]>; 2],
    limits: FrameLimits,
    waiters: Mutex<()>,
    wakeup: Condvar,
    epoch: Instant,
}

fn zeroed_lanes(len: usize) -> Box<[AtomicU32]> {
    (0..len).map(|_| AtomicU32::new(0)).collect()
}

impl SharedSegment {
    /// Allocate a zeroed segment for `schema` with image buffers sized by `limits`
    pub fn new(schema: CompiledSchema, limits: FrameLimits) -> Self {
        let sync_base = schema.total_lanes;
        let lanes = zeroed_lanes(sync_base + SYNC_BLOCK_LANES);
        let images = [zeroed_lanes(limits.pixels()), zeroed_lanes(limits.pixels())];

        tracing::info!(
            property_lanes = sync_base,
            image_pixels = limits.pixels(),
            "Allocated shared segment"
        );

        Self {
            schema,
            lanes,
            sync_base,
            images,
            limits,
            waiters: Mutex::new(()),
            wakeup: Condvar::new(),
            epoch: Instant::now(),
        }
    }

    /// The layout this segment was allocated for
    pub fn schema(&self) -> &CompiledSchema {
        &self.schema
    }

    pub fn limits(&self) -> FrameLimits {
        self.limits
    }

    /// Total lanes including the sync block
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    // ==================== Lane Access ====================

    #[inline]
    pub fn load(&self, index: usize) -> u32 {
        self.lanes[index].load(Ordering::SeqCst)
    }

    #[inline]
    pub fn store(&self, index: usize, value: u32) {
        self.lanes[index].store(value, Ordering::SeqCst);
    }

    /// Add to a lane, returning the previous value (wrapping)
    #[inline]
    pub fn fetch_add(&self, index: usize, value: u32) -> u32 {
        self.lanes[index].fetch_add(value, Ordering::SeqCst)
    }

    /// Subtract from a lane, returning the previous value (wrapping)
    #[inline]
    pub fn fetch_sub(&self, index: usize, value: u32) -> u32 {
        self.lanes[index].fetch_sub(value, Ordering::SeqCst)
    }

    #[inline]
    pub fn fetch_or(&self, index: usize, value: u32) -> u32 {
        self.lanes[index].fetch_or(value, Ordering::SeqCst)
    }

    /// Compare-and-swap; `Ok(previous)` on success, `Err(actual)` otherwise
    #[inline]
    pub fn compare_exchange(&self, index: usize, current: u32, new: u32) -> Result<u32, u32> {
        self.lanes[index].compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst)
    }

    // ==================== Wait / Notify ====================

    /// Block until lane `index` differs from `expected` or `timeout` elapses.
    pub fn wait(&self, index: usize, expected: u32, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut guard = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if self.load(index) != expected {
                return WaitOutcome::Changed;
            }

            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::TimedOut;
            }

            guard = self
                .wakeup
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Wake every thread blocked in [`wait`](Self::wait).
    ///
    /// Call after the store that waiters are watching for.
    pub fn notify(&self, _index: usize) {
        let _guard = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        self.wakeup.notify_all();
    }

    // ==================== Capture Sync Block ====================

    /// Absolute lane index of sync block lane `lane`
    #[inline]
    pub fn sync_index(&self, lane: usize) -> usize {
        self.sync_base + lane
    }

    #[inline]
    pub fn sync_load(&self, lane: usize) -> u32 {
        self.load(self.sync_index(lane))
    }

    #[inline]
    pub fn sync_store(&self, lane: usize, value: u32) {
        self.store(self.sync_index(lane), value);
    }

    /// Seed the shared capture configuration read by the producer on start
    pub fn configure_capture(&self, window_id: u32, target_fps: u32) {
        self.sync_store(sync_block::WINDOW_ID, window_id);
        self.sync_store(sync_block::TARGET_FPS, target_fps);
    }

    /// Whether the capture loop is currently publishing valid frames
    pub fn capture_running(&self) -> bool {
        self.sync_load(sync_block::RUNNING) != 0
    }

    /// Image buffer `which` (0 or 1)
    pub fn image_buffer(&self, which: usize) -> &[AtomicU32] {
        &self.images[which & 1]
    }

    /// Milliseconds since the segment was created, wrapping at `u32::MAX`
    pub fn timestamp_ms(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }
}

impl std::fmt::Debug for SharedSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSegment")
            .field("properties", &self.schema.len())
            .field("lanes", &self.lanes.len())
            .field("limits", &self.limits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDecl, PropertyDecl, SchemaCompiler};
    use std::sync::Arc;
    use std::thread;

    fn small_segment() -> SharedSegment {
        let schema = SchemaCompiler::compile(&[PropertyDecl::structure(
            "a",
            vec![FieldDecl::u32("v")],
        )])
        .unwrap();
        SharedSegment::new(
            schema,
            FrameLimits {
                max_width: 4,
                max_height: 4,
            },
        )
    }

    #[test]
    fn test_sync_block_follows_properties() {
        let segment = small_segment();
        assert_eq!(segment.sync_index(0), 2);
        assert_eq!(segment.len(), 2 + SYNC_BLOCK_LANES);
        assert_eq!(segment.image_buffer(1).len(), 16);
    }

    #[test]
    fn test_atomic_ops() {
        let segment = small_segment();
        segment.store(0, 5);
        assert_eq!(segment.fetch_add(0, 2), 5);
        assert_eq!(segment.load(0), 7);
        assert_eq!(segment.compare_exchange(0, 7, 1), Ok(7));
        assert_eq!(segment.compare_exchange(0, 7, 2), Err(1));
    }

    #[test]
    fn test_wait_times_out_when_unchanged() {
        let segment = small_segment();
        let outcome = segment.wait(0, 0, Duration::from_millis(10));
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn test_wait_returns_immediately_when_changed() {
        let segment = small_segment();
        segment.store(0, 3);
        assert_eq!(
            segment.wait(0, 0, Duration::from_secs(5)),
            WaitOutcome::Changed
        );
    }

    #[test]
    fn test_notify_wakes_waiter() {
        let segment = Arc::new(small_segment());
        let waiter = {
            let segment = segment.clone();
            thread::spawn(move || segment.wait(0, 0, Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        segment.store(0, 1);
        segment.notify(0);

        assert_eq!(waiter.join().unwrap(), WaitOutcome::Changed);
    }

    #[test]
    fn test_configure_capture() {
        let segment = small_segment();
        segment.configure_capture(0xBEEF, 30);
        assert_eq!(segment.sync_load(sync_block::WINDOW_ID), 0xBEEF);
        assert_eq!(segment.sync_load(sync_block::TARGET_FPS), 30);
        assert!(!segment.capture_running());
    }
}
