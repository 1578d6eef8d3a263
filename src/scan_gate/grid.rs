//! Coarse occupancy grid used to measure how much of the screen is dirty.
//!
//! Overlapping rectangles are counted once: the screen is divided into
//! fixed-size cells and a cell counts as dirty if any rectangle touches it.

use crate::types::Rect;

#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    cell_size: u32,
    cols: usize,
    rows: usize,
    cells: Vec<bool>,
}

impl OccupancyGrid {
    pub fn new(cell_size: u32) -> Self {
        Self {
            cell_size: cell_size.max(1),
            cols: 0,
            rows: 0,
            cells: Vec::new(),
        }
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    fn reset(&mut self, width: u32, height: u32) {
        self.cols = width.div_ceil(self.cell_size) as usize;
        self.rows = height.div_ceil(self.cell_size) as usize;
        self.cells.clear();
        self.cells.resize(self.cols * self.rows, false);
    }

    /// Percentage (0..=100) of a `width` x `height` screen touched by `rects`
    pub fn coverage_percent<'a>(
        &mut self,
        rects: impl IntoIterator<Item = &'a Rect>,
        width: u32,
        height: u32,
    ) -> f32 {
        self.reset(width, height);
        if self.cells.is_empty() {
            return 0.0;
        }

        let cell = self.cell_size as i32;
        for rect in rects {
            let clipped = rect.clamp_to(width as i32, height as i32);
            if clipped.is_empty() {
                continue;
            }

            let col_start = (clipped.x / cell) as usize;
            let col_end = ((clipped.right() - 1) / cell) as usize;
            let row_start = (clipped.y / cell) as usize;
            let row_end = ((clipped.bottom() - 1) / cell) as usize;

            for row in row_start..=row_end.min(self.rows - 1) {
                let line = row * self.cols;
                for col in col_start..=col_end.min(self.cols - 1) {
                    self.cells[line + col] = true;
                }
            }
        }

        let marked = self.cells.iter().filter(|c| **c).count();
        marked as f32 * 100.0 / self.cells.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_screen() {
        let mut grid = OccupancyGrid::new(32);
        assert_eq!(grid.coverage_percent(&[Rect::new(0, 0, 10, 10)], 0, 0), 0.0);
    }

    #[test]
    fn test_overlap_counted_once() {
        let mut grid = OccupancyGrid::new(10);
        let rects = [Rect::new(0, 0, 50, 100), Rect::new(0, 0, 50, 100)];
        assert_eq!(grid.coverage_percent(&rects, 100, 100), 50.0);
    }

    #[test]
    fn test_partial_cells_round_up() {
        let mut grid = OccupancyGrid::new(10);
        // Touches 4 cells of 100
        let coverage = grid.coverage_percent(&[Rect::new(5, 5, 10, 10)], 100, 100);
        assert_eq!(coverage, 4.0);
    }

    #[test]
    fn test_offscreen_ignored() {
        let mut grid = OccupancyGrid::new(10);
        let coverage = grid.coverage_percent(&[Rect::new(-50, -50, 20, 20)], 100, 100);
        assert_eq!(coverage, 0.0);
    }
}
