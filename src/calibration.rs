//! Camera-to-display calibration map.
//!
//! The map is a dense per-camera-pixel lookup built from the four detected
//! corners. Cells are independent, so rows are computed in parallel. Once
//! built the map is immutable; recalibration swaps in a whole new map.

use rayon::prelude::*;
use thiserror::Error;

use crate::border::BorderSide;
use crate::corners::{CornerId, Corners};
use crate::geometry::{DisplayPoint, Line, Vec2, EPS};

/// Recoverable calibration failures. None of these are fatal: the
/// previously installed map (or none) simply stays in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CalibrationError {
    #[error("no boundary candidates in the reference frames")]
    NoBoundaryCandidates,
    #[error("no accepted border samples for the {side} border")]
    InsufficientBorderSamples { side: BorderSide },
    #[error("border lines at the {corner} corner are parallel")]
    DegenerateCornerIntersection { corner: CornerId },
}

/// Dense camera-pixel to display-pixel lookup table.
pub struct CalibrationMap {
    width: usize,
    height: usize,
    display_width: usize,
    display_height: usize,
    cells: Vec<Option<DisplayPoint>>,
}

impl CalibrationMap {
    /// Build the lookup table for a camera of `width` x `height` pixels
    /// mapping onto a display of `display_width` x `display_height`.
    pub fn build(
        corners: &Corners,
        width: usize,
        height: usize,
        display_width: usize,
        display_height: usize,
    ) -> Self {
        let tl = corners.top_left.to_vec();
        let tr = corners.top_right.to_vec();
        let bl = corners.bottom_left.to_vec();
        let br = corners.bottom_right.to_vec();
        let top = Line::through(tl, tr);
        let bottom = Line::through(bl, br);
        let left = Line::through(tl, bl);
        let right = Line::through(tr, br);

        let cells = (0..height)
            .into_par_iter()
            .flat_map_iter(|y| {
                (0..width).map(move |x| {
                    map_cell(
                        Vec2::new(x as f64, y as f64),
                        top,
                        bottom,
                        left,
                        right,
                        display_width,
                        display_height,
                    )
                })
            })
            .collect();

        Self {
            width,
            height,
            display_width,
            display_height,
            cells,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn display_width(&self) -> usize {
        self.display_width
    }

    pub fn display_height(&self) -> usize {
        self.display_height
    }

    /// Display-space coordinate for a camera pixel, `None` when the cell
    /// is unmapped or out of frame.
    pub fn lookup(&self, x: usize, y: usize) -> Option<DisplayPoint> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells[y * self.width + x]
    }

    /// Number of cells carrying a display coordinate.
    pub fn mapped_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }
}

/// Fraction of `offset` along `dir`, negative when it points against it.
fn signed_fraction(offset: Vec2, dir: Vec2) -> f64 {
    let f = offset.norm() / dir.norm();
    if offset.dot(dir) < 0.0 {
        -f
    } else {
        f
    }
}

fn map_cell(
    p: Vec2,
    top: Line,
    bottom: Line,
    left: Line,
    right: Line,
    display_width: usize,
    display_height: usize,
) -> Option<DisplayPoint> {
    let foot_top = top.project(p)?;
    let foot_bottom = bottom.project(p)?;
    let foot_left = left.project(p)?;
    let foot_right = right.project(p)?;

    // Position of each foot point along its own border.
    let along_top = signed_fraction(foot_top - top.origin, top.dir);
    let along_bottom = signed_fraction(foot_bottom - bottom.origin, bottom.dir);
    let along_left = signed_fraction(foot_left - left.origin, left.dir);
    let along_right = signed_fraction(foot_right - right.origin, right.dir);

    let dist_top = (p - foot_top).norm();
    let dist_bottom = (p - foot_bottom).norm();
    let dist_left = (p - foot_left).norm();
    let dist_right = (p - foot_right).norm();
    if dist_top + dist_bottom < EPS || dist_left + dist_right < EPS {
        return None;
    }

    // Blend each axis from its two bordering fractions, weighted by the
    // inverse distance to the opposing border; the closer border dominates.
    let fx = (along_bottom * dist_top + along_top * dist_bottom) / (dist_top + dist_bottom);
    let fy = (along_left * dist_right + along_right * dist_left) / (dist_left + dist_right);

    let x = fx * (display_width as f64 - 1.0);
    let y = fy * (display_height as f64 - 1.0);

    // Pixels outside the projected quad land outside the display raster
    // and stay unmapped.
    if x < -0.5 || y < -0.5 || x >= display_width as f64 - 0.5 || y >= display_height as f64 - 0.5
    {
        return None;
    }
    Some(DisplayPoint::new(x, y))
}
