//! Deterministic capture source for tests and the demo binary.
//!
//! Draws a small square that moves across the frame one step per call. The
//! changed regions reported are the square's previous and current positions,
//! unless a script of regions was supplied.

use super::CaptureSource;
use crate::error::{Result, StateBusError};
use crate::types::{CapturedFrame, Rect};
use std::collections::VecDeque;

const SQUARE_SIZE: i32 = 16;
const SQUARE_STEP: i32 = 8;
const BACKGROUND: u32 = 0xFF20_2020;
const FOREGROUND: u32 = 0xFFE0_C040;

/// Scripted or procedurally animated frame generator
#[derive(Debug, Clone)]
pub struct SyntheticCapture {
    width: u32,
    height: u32,
    frames_served: u32,
    monitoring: bool,
    square: Rect,
    script: VecDeque<Option<Vec<Rect>>>,
    fail_after: Option<u32>,
}

impl SyntheticCapture {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frames_served: 0,
            monitoring: false,
            square: Rect::new(0, 0, SQUARE_SIZE, SQUARE_SIZE),
            script: VecDeque::new(),
            fail_after: None,
        }
    }

    /// Serve these changed-region lists in order before animating.
    ///
    /// A `None` entry reports "no new frame".
    pub fn with_script(mut self, script: impl IntoIterator<Item = Option<Vec<Rect>>>) -> Self {
        self.script = script.into_iter().collect();
        self
    }

    /// Fail every call after `frames` frames have been served
    pub fn fail_after(mut self, frames: u32) -> Self {
        self.fail_after = Some(frames);
        self
    }

    pub fn frames_served(&self) -> u32 {
        self.frames_served
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    fn advance_square(&mut self) -> Vec<Rect> {
        let previous = self.square;
        let max_x = (self.width as i32 - SQUARE_SIZE).max(0);
        let max_y = (self.height as i32 - SQUARE_SIZE).max(0);

        let mut next = previous;
        next.x += SQUARE_STEP;
        if next.x > max_x {
            next.x = 0;
            next.y += SQUARE_SIZE;
            if next.y > max_y {
                next.y = 0;
            }
        }
        self.square = next;
        vec![previous, next]
    }

    fn draw(&self, dest: &mut [u32]) {
        let bounds = self.square.clamp_to(self.width as i32, self.height as i32);
        for (i, pixel) in dest.iter_mut().enumerate() {
            let x = (i % self.width as usize) as i32;
            let y = (i / self.width as usize) as i32;
            let inside =
                x >= bounds.x && x < bounds.right() && y >= bounds.y && y < bounds.bottom();
            *pixel = if inside { FOREGROUND } else { BACKGROUND };
        }
    }
}

impl CaptureSource for SyntheticCapture {
    fn start_monitor(&mut self, window_handle: u32, target_fps: u32) -> Result<()> {
        tracing::debug!(window_handle, target_fps, "Synthetic capture started");
        self.monitoring = true;
        Ok(())
    }

    fn get_latest_frame(&mut self, dest: &mut [u32]) -> Result<CapturedFrame> {
        if !self.monitoring {
            return Err(StateBusError::CaptureSourceFailure(
                "monitor not started".to_string(),
            ));
        }
        if self.fail_after.is_some_and(|limit| self.frames_served >= limit) {
            return Err(StateBusError::CaptureSourceFailure(format!(
                "synthetic failure after {} frames",
                self.frames_served
            )));
        }

        let changed_regions = match self.script.pop_front() {
            Some(None) => return Ok(CapturedFrame::unchanged()),
            Some(Some(regions)) => regions,
            None => self.advance_square(),
        };

        let pixels = (self.width as usize * self.height as usize).min(dest.len());
        self.draw(&mut dest[..pixels]);
        self.frames_served += 1;

        Ok(CapturedFrame {
            success: true,
            width: self.width,
            height: self.height,
            changed_regions,
        })
    }

    fn stop_monitor(&mut self) {
        self.monitoring = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_start() {
        let mut source = SyntheticCapture::new(32, 32);
        let mut buf = vec![0u32; 32 * 32];
        assert!(source.get_latest_frame(&mut buf).is_err());
    }

    #[test]
    fn test_script_then_animation() {
        let mut source = SyntheticCapture::new(64, 32)
            .with_script([Some(vec![Rect::new(10, 10, 20, 20)]), None]);
        let mut buf = vec![0u32; 64 * 32];
        source.start_monitor(1, 60).unwrap();

        let first = source.get_latest_frame(&mut buf).unwrap();
        assert!(first.success);
        assert_eq!(first.changed_regions, vec![Rect::new(10, 10, 20, 20)]);

        assert!(!source.get_latest_frame(&mut buf).unwrap().success);

        let animated = source.get_latest_frame(&mut buf).unwrap();
        assert_eq!(animated.changed_regions.len(), 2);
        assert_eq!(source.frames_served(), 2);
        assert!(buf.contains(&FOREGROUND));
    }

    #[test]
    fn test_fail_after() {
        let mut source = SyntheticCapture::new(16, 16).fail_after(1);
        let mut buf = vec![0u32; 256];
        source.start_monitor(1, 60).unwrap();
        assert!(source.get_latest_frame(&mut buf).is_ok());
        assert!(matches!(
            source.get_latest_frame(&mut buf),
            Err(StateBusError::CaptureSourceFailure(_))
        ));
    }

    #[test]
    fn test_square_wraps() {
        let mut source = SyntheticCapture::new(32, 16);
        for _ in 0..10 {
            let regions = source.advance_square();
            assert!(regions[1].right() <= 32);
            assert!(regions[1].bottom() <= 16);
        }
    }
}
