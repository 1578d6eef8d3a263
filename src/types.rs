//! Core data types shared across the coordination layer
//!
//! This module contains the plain geometry and frame types that flow between
//! the capture loop and its consumers.

use serde::{Deserialize, Serialize};

/// Axis-aligned screen rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Create a new rectangle
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// A rectangle with no positive area
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Area in pixels (zero for empty rectangles)
    pub fn area(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.width as u64 * self.height as u64
        }
    }

    /// Whether the two rectangles share at least one pixel
    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Grow the rectangle by `padding` pixels on every side
    pub fn expand(&self, padding: i32) -> Rect {
        Rect::new(
            self.x.saturating_sub(padding),
            self.y.saturating_sub(padding),
            self.width.saturating_add(padding.saturating_mul(2)),
            self.height.saturating_add(padding.saturating_mul(2)),
        )
    }

    /// Clip the rectangle to `[0, width) x [0, height)`
    pub fn clamp_to(&self, width: i32, height: i32) -> Rect {
        let x = self.x.clamp(0, width);
        let y = self.y.clamp(0, height);
        let right = self.right().clamp(0, width);
        let bottom = self.bottom().clamp(0, height);
        Rect::new(x, y, (right - x).max(0), (bottom - y).max(0))
    }

    /// Encode as four lanes `(x, y, width, height)`
    pub fn to_lanes(&self) -> [u32; 4] {
        [
            self.x as u32,
            self.y as u32,
            self.width as u32,
            self.height as u32,
        ]
    }

    /// Decode from four lanes `(x, y, width, height)`
    pub fn from_lanes(lanes: [u32; 4]) -> Self {
        Rect::new(
            lanes[0] as i32,
            lanes[1] as i32,
            lanes[2] as i32,
            lanes[3] as i32,
        )
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@({},{})", self.width, self.height, self.x, self.y)
    }
}

/// Metadata of the most recently published frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameMetadata {
    /// Monotonic publish counter; the only liveness signal
    pub frame_counter: u32,
    pub width: u32,
    pub height: u32,
    /// Milliseconds since the segment was created (wrapping)
    pub timestamp: u32,
}

/// Result of pulling one frame from a capture source
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapturedFrame {
    /// False when the source had no new frame since the last call
    pub success: bool,
    pub width: u32,
    pub height: u32,
    /// Regions that changed since the previous frame
    pub changed_regions: Vec<Rect>,
}

impl CapturedFrame {
    /// A frame result carrying no new data
    pub fn unchanged() -> Self {
        Self::default()
    }
}
