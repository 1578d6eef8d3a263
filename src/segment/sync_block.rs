//! Capture sync block lane indices.
//!
//! The sync block sits directly after the last schema property. The capture
//! loop is its only writer; every consumer reads it.

/// Maximum dirty rectangles the producer publishes per frame
pub const MAX_DIRTY_RECTS: usize = 32;

/// Lanes per published dirty rectangle `(x, y, width, height)`
pub const RECT_LANES: usize = 4;

pub const FRAME_COUNTER: usize = 0;
pub const WIDTH: usize = 1;
pub const HEIGHT: usize = 2;
/// 1 while the producer is publishing valid frames
pub const RUNNING: usize = 3;
pub const WINDOW_ID: usize = 4;
/// Which of the two image buffers holds the latest frame
pub const ACTIVE_BUFFER: usize = 5;
pub const DIRTY_COUNT: usize = 6;
pub const TARGET_FPS: usize = 7;
pub const TIMESTAMP: usize = 8;
pub const DIRTY_RECTS: usize = 9;

/// Total lanes of the sync block
pub const SYNC_BLOCK_LANES: usize = DIRTY_RECTS + MAX_DIRTY_RECTS * RECT_LANES;

/// Sync-block-relative index of lane `lane` of dirty rectangle `rect`
pub const fn dirty_rect_lane(rect: usize, lane: usize) -> usize {
    DIRTY_RECTS + rect * RECT_LANES + lane
}
