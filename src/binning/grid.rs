//! Grid geometry: position → cell mapping.

use serde::{Deserialize, Serialize};

use crate::domain::CellIndex;
use crate::error::AppError;

/// Narrow read interface the binner needs from a spatial grid.
pub trait GridGeometry: Sync {
    /// `(ny, nx)`.
    fn shape(&self) -> (usize, usize);

    /// Cell containing `(x, y)`, or `None` outside the domain.
    fn locate(&self, x: f64, y: f64) -> Option<CellIndex>;

    fn center(&self, cell: CellIndex) -> (f64, f64);

    /// Offset of `(x, y)` from the center of `cell`.
    fn offset(&self, cell: CellIndex, x: f64, y: f64) -> (f64, f64) {
        let (cx, cy) = self.center(cell);
        (x - cx, y - cy)
    }
}

/// Regular lon/lat-style grid with lower-left corner `(x0, y0)`.
///
/// With `periodic_x`, positions wrap into `[x0, x0 + nx·dx)` (e.g. longitude).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegularGrid {
    pub x0: f64,
    pub y0: f64,
    pub dx: f64,
    pub dy: f64,
    pub nx: usize,
    pub ny: usize,
    pub periodic_x: bool,
}

impl RegularGrid {
    pub fn new(
        x0: f64,
        y0: f64,
        dx: f64,
        dy: f64,
        nx: usize,
        ny: usize,
        periodic_x: bool,
    ) -> Result<Self, AppError> {
        if !(x0.is_finite() && y0.is_finite()) {
            return Err(AppError::config("Grid origin must be finite."));
        }
        if !(dx.is_finite() && dx > 0.0 && dy.is_finite() && dy > 0.0) {
            return Err(AppError::config(format!(
                "Invalid grid spacing dx={dx}, dy={dy} (must be finite and > 0)."
            )));
        }
        if nx == 0 || ny == 0 {
            return Err(AppError::config(format!("Empty grid {ny}x{nx}.")));
        }
        Ok(Self {
            x0,
            y0,
            dx,
            dy,
            nx,
            ny,
            periodic_x,
        })
    }

    fn wrap_x(&self, x: f64) -> f64 {
        if self.periodic_x {
            let width = self.nx as f64 * self.dx;
            self.x0 + (x - self.x0).rem_euclid(width)
        } else {
            x
        }
    }
}

impl GridGeometry for RegularGrid {
    fn shape(&self) -> (usize, usize) {
        (self.ny, self.nx)
    }

    fn locate(&self, x: f64, y: f64) -> Option<CellIndex> {
        if !(x.is_finite() && y.is_finite()) {
            return None;
        }
        let fx = (self.wrap_x(x) - self.x0) / self.dx;
        let fy = (y - self.y0) / self.dy;
        if fx < 0.0 || fy < 0.0 {
            return None;
        }
        // `as usize` saturates; the bounds check below handles the far edge.
        let (mut col, row) = (fx.floor() as usize, fy.floor() as usize);
        if self.periodic_x {
            // rem_euclid can round up to exactly the period width.
            col %= self.nx;
        }
        (col < self.nx && row < self.ny).then(|| CellIndex::new(row, col))
    }

    fn center(&self, cell: CellIndex) -> (f64, f64) {
        (
            self.x0 + (cell.col as f64 + 0.5) * self.dx,
            self.y0 + (cell.row as f64 + 0.5) * self.dy,
        )
    }

    fn offset(&self, cell: CellIndex, x: f64, y: f64) -> (f64, f64) {
        let (cx, cy) = self.center(cell);
        let mut ox = x - cx;
        if self.periodic_x {
            // Nearest periodic image of x, so a point wrapped onto the seam
            // stays within half a cell of its center.
            let width = self.nx as f64 * self.dx;
            ox -= width * (ox / width).round();
        }
        (ox, y - cy)
    }
}
