//! Border-line aggregation and corner intersection.

use std::fmt;

use tracing::debug;

use crate::border::{BorderEstimate, BorderSet, BorderSide};
use crate::calibration::CalibrationError;
use crate::geometry::{CameraPoint, Line, Vec2};

/// Corner naming by adjacent border pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CornerId {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl CornerId {
    pub fn as_str(self) -> &'static str {
        match self {
            CornerId::TopLeft => "top-left",
            CornerId::TopRight => "top-right",
            CornerId::BottomLeft => "bottom-left",
            CornerId::BottomRight => "bottom-right",
        }
    }
}

impl fmt::Display for CornerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four projected-rectangle corners, in camera space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corners {
    pub top_left: CameraPoint,
    pub top_right: CameraPoint,
    pub bottom_left: CameraPoint,
    pub bottom_right: CameraPoint,
}

impl Corners {
    pub fn get(&self, id: CornerId) -> CameraPoint {
        match id {
            CornerId::TopLeft => self.top_left,
            CornerId::TopRight => self.top_right,
            CornerId::BottomLeft => self.bottom_left,
            CornerId::BottomRight => self.bottom_right,
        }
    }
}

/// Aggregate a consistently-oriented direction vector for one border.
///
/// Member points lie on both sides of the mean, so each term's sign is
/// flipped whenever adding it unflipped would shrink the running total.
pub fn direction_vector(estimate: &BorderEstimate) -> Vec2 {
    let mean = estimate.real_mean();
    let mut total = Vec2::default();
    for member in &estimate.members {
        let mut term = mean - *member;
        if (total + term).norm() < total.norm() {
            term = -term;
        }
        total = total + term;
    }
    total
}

/// Intersect the four border lines into the four corners.
pub fn estimate_corners(borders: &BorderSet) -> Result<Corners, CalibrationError> {
    let line = |side: BorderSide| {
        let estimate = borders.get(side);
        Line::new(estimate.real_mean(), direction_vector(estimate))
    };
    let left = line(BorderSide::Left);
    let right = line(BorderSide::Right);
    let top = line(BorderSide::Top);
    let bottom = line(BorderSide::Bottom);

    let corner = |a: Line, b: Line, id: CornerId| {
        a.intersect(b)
            .map(|v| CameraPoint::new(v.x, v.y))
            .ok_or(CalibrationError::DegenerateCornerIntersection { corner: id })
    };

    let corners = Corners {
        top_left: corner(top, left, CornerId::TopLeft)?,
        top_right: corner(top, right, CornerId::TopRight)?,
        bottom_left: corner(bottom, left, CornerId::BottomLeft)?,
        bottom_right: corner(bottom, right, CornerId::BottomRight)?,
    };
    debug!(
        top_left = ?corners.top_left,
        top_right = ?corners.top_right,
        bottom_left = ?corners.bottom_left,
        bottom_right = ?corners.bottom_right,
        "estimated corners"
    );
    Ok(corners)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate_with(side: BorderSide, points: &[(f64, f64)]) -> BorderEstimate {
        let mut est = BorderEstimate::new(side);
        for &(x, y) in points {
            est.push(Vec2::new(x, y));
        }
        est
    }

    fn synthetic_borders() -> BorderSet {
        let mut set = BorderSet::new();
        *set.get_mut(BorderSide::Left) =
            estimate_with(BorderSide::Left, &[(10.0, 20.0), (10.0, 80.0), (10.0, 140.0)]);
        *set.get_mut(BorderSide::Right) =
            estimate_with(BorderSide::Right, &[(190.0, 30.0), (190.0, 90.0), (190.0, 160.0)]);
        *set.get_mut(BorderSide::Top) =
            estimate_with(BorderSide::Top, &[(40.0, 15.0), (100.0, 15.0), (170.0, 15.0)]);
        *set.get_mut(BorderSide::Bottom) =
            estimate_with(BorderSide::Bottom, &[(50.0, 170.0), (120.0, 170.0), (180.0, 170.0)]);
        set
    }

    #[test]
    fn test_axis_aligned_corners() {
        let corners = estimate_corners(&synthetic_borders()).unwrap();
        assert_eq!(corners.get(CornerId::TopLeft), corners.top_left);
        assert!((corners.top_left.x - 10.0).abs() < 1e-9);
        assert!((corners.top_left.y - 15.0).abs() < 1e-9);
        assert!((corners.top_right.x - 190.0).abs() < 1e-9);
        assert!((corners.top_right.y - 15.0).abs() < 1e-9);
        assert!((corners.bottom_left.x - 10.0).abs() < 1e-9);
        assert!((corners.bottom_left.y - 170.0).abs() < 1e-9);
        assert!((corners.bottom_right.x - 190.0).abs() < 1e-9);
        assert!((corners.bottom_right.y - 170.0).abs() < 1e-9);
    }

    #[test]
    fn test_direction_survives_symmetric_members() {
        // Naive summation of (mean - member) cancels for symmetric members;
        // the sign-flip rule must keep the total nonzero.
        let est = estimate_with(
            BorderSide::Top,
            &[(0.0, 0.0), (2.0, 0.0), (4.0, 0.0), (6.0, 0.0)],
        );
        let dir = direction_vector(&est);
        assert!(dir.norm() > 1.0);
        assert!(dir.y.abs() < 1e-9);
    }

    #[test]
    fn test_parallel_borders_fail() {
        let mut set = synthetic_borders();
        // Make the left border parallel to the top one.
        *set.get_mut(BorderSide::Left) =
            estimate_with(BorderSide::Left, &[(10.0, 15.0), (60.0, 15.0), (110.0, 15.0)]);
        let err = estimate_corners(&set).unwrap_err();
        assert_eq!(
            err,
            CalibrationError::DegenerateCornerIntersection {
                corner: CornerId::TopLeft
            }
        );
    }

    #[test]
    fn test_single_member_has_zero_direction() {
        // One member sitting at the mean gives a zero direction; the
        // intersection step reports it as degenerate.
        let mut set = synthetic_borders();
        *set.get_mut(BorderSide::Left) = estimate_with(BorderSide::Left, &[(10.0, 50.0)]);
        assert!(estimate_corners(&set).is_err());
    }
}
