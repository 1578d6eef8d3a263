//! Stand-in for the UI-region scanner used by the demo binary.
//!
//! The matching itself lives outside this crate. The tracker treats the
//! merged dirty rectangles of a full scan as the detected regions, republishes
//! them through the `uiRegions` array property and answers `Pause`, `Resume`
//! and `Invalidate` on the control channel.

use super::{Worker, WorkerContext};
use crate::capture::FrameUpdate;
use crate::channel::{Command, Message, Payload};
use crate::error::Result;
use crate::scan_gate::ScanDecision;
use crate::store::{PropertyValue, Record};
use crate::types::Rect;

/// Property the tracker publishes its regions to
pub const REGIONS_PROPERTY: &str = "uiRegions";

#[derive(Debug)]
pub struct RegionTracker {
    paused: bool,
    published: u64,
    /// Broadcast `Invalidate` after a full scan finds nothing
    announce_empty: bool,
}

impl RegionTracker {
    pub fn new() -> Self {
        Self {
            paused: false,
            published: 0,
            announce_empty: false,
        }
    }

    pub fn announce_empty(mut self, enabled: bool) -> Self {
        self.announce_empty = enabled;
        self
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Number of `uiRegions` writes so far
    pub fn published(&self) -> u64 {
        self.published
    }

    fn publish(&mut self, ctx: &WorkerContext, regions: &[Rect], confidence: f32) -> Result<()> {
        let records: Vec<Record> = regions
            .iter()
            .map(|r| {
                Record::new()
                    .with("x", r.x)
                    .with("y", r.y)
                    .with("width", r.width)
                    .with("height", r.height)
                    .with("kind", 0u32)
                    .with("confidence", confidence)
            })
            .collect();

        ctx.store
            .set(REGIONS_PROPERTY, &PropertyValue::Array(records))?;
        self.published += 1;
        Ok(())
    }
}

impl Default for RegionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Worker for RegionTracker {
    fn name(&self) -> &str {
        "region-tracker"
    }

    fn on_frame(
        &mut self,
        ctx: &mut WorkerContext,
        frame: &FrameUpdate,
        decision: &ScanDecision,
    ) -> Result<()> {
        if self.paused {
            return Ok(());
        }

        match decision {
            ScanDecision::Full { reason } => {
                let screen = Rect::new(
                    0,
                    0,
                    frame.metadata.width as i32,
                    frame.metadata.height as i32,
                );
                let regions: Vec<Rect> = frame
                    .dirty_rects
                    .iter()
                    .map(|r| r.clamp_to(screen.width, screen.height))
                    .filter(|r| !r.is_empty())
                    .collect();

                tracing::debug!(
                    ?reason,
                    regions = regions.len(),
                    frame = frame.metadata.frame_counter,
                    "Full region scan"
                );

                if regions.is_empty() && self.announce_empty {
                    if let Some(channel) = &ctx.channel {
                        channel.broadcast(Command::Invalidate, Payload::region(screen), 0)?;
                    }
                }

                self.publish(ctx, &regions, 1.0)?;
                ctx.gate.record_regions(regions);
            }
            ScanDecision::Partial { regions } if !regions.is_empty() => {
                let known = ctx.gate.known_regions().to_vec();
                self.publish(ctx, &known, 0.5)?;
            }
            ScanDecision::Partial { .. } => {}
        }
        Ok(())
    }

    fn on_message(&mut self, ctx: &mut WorkerContext, message: &Message) -> Result<()> {
        match message.command {
            Command::Pause => self.paused = true,
            Command::Resume => self.paused = false,
            Command::Invalidate => ctx.gate.invalidate(),
            _ => {}
        }
        Ok(())
    }
}
