//! Mock construction helpers

use crossbeam_channel::{bounded, Receiver, Sender};
use statebus_rs::config::CaptureConfig;
use statebus_rs::types::Rect;
use statebus_rs::{FrameProducer, SharedSegment, SyntheticCapture};
use std::sync::Arc;

/// Create test channels with default size
pub fn create_test_channels<T, U>() -> (Sender<T>, Receiver<T>, Sender<U>, Receiver<U>) {
    let (tx1, rx1) = bounded(16);
    let (tx2, rx2) = bounded(16);
    (tx1, rx1, tx2, rx2)
}

/// Capture config matching the segment's image buffer
pub fn capture_config(segment: &SharedSegment) -> CaptureConfig {
    let limits = segment.limits();
    CaptureConfig {
        max_width: limits.max_width,
        max_height: limits.max_height,
        ..Default::default()
    }
}

/// Producer over a synthetic source serving `script` before animating
pub fn scripted_producer(
    segment: &Arc<SharedSegment>,
    script: Vec<Option<Vec<Rect>>>,
) -> FrameProducer {
    let limits = segment.limits();
    let source = SyntheticCapture::new(limits.max_width, limits.max_height).with_script(script);
    FrameProducer::new(segment.clone(), Box::new(source), capture_config(segment))
}
