//! Logical-dimensioned pixel store (§3, §4.2).

use crate::color::Rgb565;
use crate::error::{PanelError, Result};

/// A `width x height` RGB565 pixel store in row-major order.
///
/// Never resized in place: a dimension change allocates a fresh buffer
/// (mirrors `driver::set_orientation`, which replaces the shadow rather
/// than mutating it).
#[derive(Debug, Clone)]
pub struct ScreenBuffer {
    width: usize,
    height: usize,
    cells: Vec<Rgb565>,
}

impl ScreenBuffer {
    /// Creates a buffer of the given logical dimensions, all cells zeroed.
    pub fn new(width: usize, height: usize) -> Self {
        ScreenBuffer {
            width,
            height,
            cells: vec![0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn index(&self, x: usize, y: usize) -> Result<usize> {
        if x >= self.width || y >= self.height {
            return Err(PanelError::InvalidArgument(
                "coordinate outside logical surface",
            ));
        }
        Ok(y * self.width + x)
    }

    pub fn get(&self, x: usize, y: usize) -> Result<Rgb565> {
        self.index(x, y).map(|i| self.cells[i])
    }

    pub fn set(&mut self, x: usize, y: usize, color: Rgb565) -> Result<()> {
        let i = self.index(x, y)?;
        self.cells[i] = color;
        Ok(())
    }

    /// Direct slice access for the diff scanner and transmitter, which
    /// operate on whole rows rather than per-coordinate.
    pub fn as_slice(&self) -> &[Rgb565] {
        &self.cells
    }

    pub fn as_mut_slice(&mut self) -> &mut [Rgb565] {
        &mut self.cells
    }

    pub fn clear_to_zero(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = 0);
    }

    pub fn clear_to_color(&mut self, color: Rgb565) {
        self.cells.iter_mut().for_each(|c| *c = color);
    }
}
