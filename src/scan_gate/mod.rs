//! Dirty-rectangle gating for the adaptive UI-region scanner.
//!
//! Each consumer owns a [`ScanGate`]. Per frame it:
//!
//! 1. appends the published dirty rectangles tagged with the frame counter
//! 2. drops rectangles older than `max_age_frames`
//! 3. merges rectangles whose padded bounds overlap, until none do
//! 4. decides between a full scan and a partial scan of the last-known
//!    regions that intersect something dirty
//!
//! A full scan is forced when no regions are known yet, when the safety-net
//! interval has elapsed since the last full scan (even with nothing dirty),
//! or when the dirty area covers more than `fallback_area_percent` of the
//! screen on the occupancy grid.

pub mod grid;

pub use grid::OccupancyGrid;

use crate::config::ScanGateConfig;
use crate::types::Rect;
use std::time::Instant;

/// A dirty rectangle and the frame it arrived with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRect {
    pub rect: Rect,
    /// Frame counter of the newest rectangle merged into this one
    pub arrived: u32,
}

impl DirtyRect {
    /// Frames since arrival as of `frame_counter`
    pub fn age(&self, frame_counter: u32) -> u32 {
        frame_counter.wrapping_sub(self.arrived)
    }
}

/// Why a full scan was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullScanReason {
    /// No full scan has happened yet
    FirstScan,
    /// No regions are known from a previous scan
    NoKnownRegions,
    /// The safety-net interval elapsed
    Interval,
    /// Too much of the screen is dirty
    Area,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanDecision {
    Full { reason: FullScanReason },
    /// Rescan only these previously known regions
    Partial { regions: Vec<Rect> },
}

impl ScanDecision {
    pub fn is_full(&self) -> bool {
        matches!(self, ScanDecision::Full { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct GateStats {
    pub full_scans: u64,
    pub partial_scans: u64,
    pub merges: u64,
    pub aged_out: u64,
}

/// Per-consumer dirty-rectangle tracker
#[derive(Debug, Clone)]
pub struct ScanGate {
    config: ScanGateConfig,
    dirty: Vec<DirtyRect>,
    known_regions: Vec<Rect>,
    last_full_scan: Option<Instant>,
    grid: OccupancyGrid,
    stats: GateStats,
}

impl ScanGate {
    pub fn new(config: ScanGateConfig) -> Self {
        let grid = OccupancyGrid::new(config.grid_cell_size);
        Self {
            config,
            dirty: Vec::new(),
            known_regions: Vec::new(),
            last_full_scan: None,
            grid,
            stats: GateStats::default(),
        }
    }

    pub fn dirty(&self) -> &[DirtyRect] {
        &self.dirty
    }

    pub fn known_regions(&self) -> &[Rect] {
        &self.known_regions
    }

    pub fn stats(&self) -> &GateStats {
        &self.stats
    }

    pub fn last_full_scan(&self) -> Option<Instant> {
        self.last_full_scan
    }

    /// Track the rectangles published with frame `frame_counter`
    pub fn ingest(&mut self, rects: &[Rect], frame_counter: u32) {
        self.dirty.extend(
            rects
                .iter()
                .filter(|r| !r.is_empty())
                .map(|&rect| DirtyRect {
                    rect,
                    arrived: frame_counter,
                }),
        );
        self.age_out(frame_counter);
        self.merge();
    }

    fn age_out(&mut self, frame_counter: u32) {
        let max_age = self.config.max_age_frames;
        let before = self.dirty.len();
        self.dirty.retain(|d| d.age(frame_counter) < max_age);
        self.stats.aged_out += (before - self.dirty.len()) as u64;
    }

    /// Merge until no two padded rectangles overlap
    fn merge(&mut self) {
        let padding = self.config.merge_padding;

        'restart: loop {
            for i in 0..self.dirty.len() {
                let a = self.dirty[i].rect.expand(padding);
                for j in (i + 1)..self.dirty.len() {
                    if a.intersects(&self.dirty[j].rect.expand(padding)) {
                        let other = self.dirty.swap_remove(j);
                        let merged = &mut self.dirty[i];
                        merged.rect = merged.rect.union(&other.rect);
                        // The newest arrival keeps the merged rectangle alive
                        if other.arrived.wrapping_sub(merged.arrived) as i32 > 0 {
                            merged.arrived = other.arrived;
                        }
                        self.stats.merges += 1;
                        continue 'restart;
                    }
                }
            }
            break;
        }
    }

    /// Choose between a full and a partial scan of a `width` x `height` screen
    pub fn decide(&mut self, now: Instant, width: u32, height: u32) -> ScanDecision {
        if let Some(reason) = self.full_scan_reason(now, width, height) {
            tracing::debug!(?reason, dirty = self.dirty.len(), "Full scan");
            self.dirty.clear();
            self.last_full_scan = Some(now);
            self.stats.full_scans += 1;
            return ScanDecision::Full { reason };
        }

        let regions: Vec<Rect> = self
            .known_regions
            .iter()
            .filter(|region| self.dirty.iter().any(|d| d.rect.intersects(region)))
            .copied()
            .collect();

        self.stats.partial_scans += 1;
        ScanDecision::Partial { regions }
    }

    fn full_scan_reason(&mut self, now: Instant, width: u32, height: u32) -> Option<FullScanReason> {
        let Some(last) = self.last_full_scan else {
            return Some(FullScanReason::FirstScan);
        };
        if self.known_regions.is_empty() {
            return Some(FullScanReason::NoKnownRegions);
        }
        if now.saturating_duration_since(last) >= self.config.full_scan_interval() {
            return Some(FullScanReason::Interval);
        }

        let coverage = self
            .grid
            .coverage_percent(self.dirty.iter().map(|d| &d.rect), width, height);
        if coverage > self.config.fallback_area_percent {
            return Some(FullScanReason::Area);
        }
        None
    }

    /// Remember the regions found by the latest scan
    pub fn record_regions(&mut self, regions: impl IntoIterator<Item = Rect>) {
        self.known_regions = regions.into_iter().collect();
    }

    /// Force the next decision to be a full scan
    pub fn invalidate(&mut self) {
        self.last_full_scan = None;
    }
}
