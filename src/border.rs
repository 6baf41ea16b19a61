//! Boundary-point extraction from the two calibration reference frames.
//!
//! The projected rectangle is the only thing that changes between the
//! white-filled and black-filled reference frames, so diff + threshold +
//! Laplacian leaves its outline. Random samples of that outline are
//! filtered down to clean on-border points and bucketed into the four
//! border estimates.

use std::fmt;

use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

use crate::calibration::CalibrationError;
use crate::frame::GrayFrame;
use crate::geometry::Vec2;

/// Scan window half-size; neighbours are looked up on the ±6 rows/columns
/// of a 13x13 square around each sample.
const WINDOW: i32 = 6;

/// Which projected border a sample was attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderSide {
    Left,
    Right,
    Top,
    Bottom,
}

impl BorderSide {
    pub const ALL: [BorderSide; 4] = [
        BorderSide::Left,
        BorderSide::Right,
        BorderSide::Top,
        BorderSide::Bottom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BorderSide::Left => "left",
            BorderSide::Right => "right",
            BorderSide::Top => "top",
            BorderSide::Bottom => "bottom",
        }
    }

    fn index(self) -> usize {
        match self {
            BorderSide::Left => 0,
            BorderSide::Right => 1,
            BorderSide::Top => 2,
            BorderSide::Bottom => 3,
        }
    }
}

impl fmt::Display for BorderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulated evidence for one border line.
#[derive(Debug, Clone)]
pub struct BorderEstimate {
    pub side: BorderSide,
    pub count: usize,
    /// Running mean, updated as samples arrive.
    pub mean: Vec2,
    pub members: Vec<Vec2>,
}

impl BorderEstimate {
    pub fn new(side: BorderSide) -> Self {
        Self {
            side,
            count: 0,
            mean: Vec2::default(),
            members: Vec::new(),
        }
    }

    pub fn push(&mut self, point: Vec2) {
        self.count += 1;
        let k = 1.0 / self.count as f64;
        self.mean = self.mean + (point - self.mean).scale(k);
        self.members.push(point);
    }

    /// Exact mean recomputed from the member list.
    pub fn real_mean(&self) -> Vec2 {
        let mut sum = Vec2::default();
        for m in &self.members {
            sum = sum + *m;
        }
        sum.scale(1.0 / self.members.len().max(1) as f64)
    }
}

/// The four border estimates, indexed by side.
#[derive(Debug, Clone)]
pub struct BorderSet {
    estimates: [BorderEstimate; 4],
}

impl BorderSet {
    pub fn new() -> Self {
        Self {
            estimates: BorderSide::ALL.map(BorderEstimate::new),
        }
    }

    pub fn get(&self, side: BorderSide) -> &BorderEstimate {
        &self.estimates[side.index()]
    }

    pub fn get_mut(&mut self, side: BorderSide) -> &mut BorderEstimate {
        &mut self.estimates[side.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &BorderEstimate> {
        self.estimates.iter()
    }
}

impl Default for BorderSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Tunables for the border scan.
#[derive(Debug, Clone, Copy)]
pub struct BorderScanParams {
    /// Binary threshold applied to the white/black difference.
    pub diff_threshold: u8,
    /// Number of random candidate draws.
    pub samples: usize,
    /// Minimum normalized dot product between the two neighbour vectors.
    pub collinearity_min: f64,
}

impl Default for BorderScanParams {
    fn default() -> Self {
        Self {
            diff_threshold: 80,
            samples: 500,
            collinearity_min: 0.95,
        }
    }
}

/// Border estimates plus the intermediate frames, kept for debug snapshots.
#[derive(Debug, Clone)]
pub struct BorderScan {
    pub borders: BorderSet,
    pub diff: GrayFrame,
    pub mask: GrayFrame,
    pub gradient: GrayFrame,
}

/// Extract the four border estimates from the reference frame pair.
pub fn detect_borders(
    white: &GrayFrame,
    black: &GrayFrame,
    params: &BorderScanParams,
    rng: &mut StdRng,
) -> Result<BorderScan, CalibrationError> {
    let diff = white.absdiff(black);
    let mask = diff.threshold_binary(params.diff_threshold);
    let gradient = mask.laplacian();

    let mut candidates = Vec::new();
    for y in 0..gradient.height() {
        for x in 0..gradient.width() {
            if gradient.get(x, y) != 0 {
                candidates.push((x as i32, y as i32));
            }
        }
    }
    if candidates.is_empty() {
        return Err(CalibrationError::NoBoundaryCandidates);
    }
    debug!(candidates = candidates.len(), "border candidate points");

    let mut borders = BorderSet::new();
    let half_w = white.width() as f64 / 2.0;
    let half_h = white.height() as f64 / 2.0;

    for _ in 0..params.samples {
        let (cx, cy) = candidates[rng.random_range(0..candidates.len())];

        // Walk the square path around the sample: the two offset rows
        // classify vertically-offset neighbours, the two offset columns
        // classify horizontally-offset ones.
        let mut up = None;
        let mut down = None;
        let mut left = None;
        let mut right = None;
        for d in -WINDOW..=WINDOW {
            for off in [-WINDOW, WINDOW] {
                if gradient.at(cx + d, cy + off) != 0 {
                    let hit = Vec2::new((cx + d) as f64, (cy + off) as f64);
                    if off < 0 {
                        up = Some(hit);
                    } else {
                        down = Some(hit);
                    }
                }
                if gradient.at(cx + off, cy + d) != 0 {
                    let hit = Vec2::new((cx + off) as f64, (cy + d) as f64);
                    if off < 0 {
                        left = Some(hit);
                    } else {
                        right = Some(hit);
                    }
                }
            }
        }

        let sample = Vec2::new(cx as f64, cy as f64);

        // Exactly one pair of opposite neighbours; anything else is a
        // corner or noise.
        let (first, second, side) = match (up, down, left, right) {
            (Some(u), Some(d), None, None) => {
                let side = if sample.x < half_w {
                    BorderSide::Left
                } else {
                    BorderSide::Right
                };
                (u, d, side)
            }
            (None, None, Some(l), Some(r)) => {
                let side = if sample.y < half_h {
                    BorderSide::Top
                } else {
                    BorderSide::Bottom
                };
                (l, r, side)
            }
            _ => continue,
        };

        // Collinearity: the vector to one neighbour must line up with the
        // reflected vector to the other.
        let v1 = first - sample;
        let v2 = sample - second;
        let norms = v1.norm() * v2.norm();
        if norms <= 0.0 || v1.dot(v2) / norms <= params.collinearity_min {
            continue;
        }

        borders.get_mut(side).push(sample);
    }

    for estimate in borders.iter() {
        if estimate.count == 0 {
            return Err(CalibrationError::InsufficientBorderSamples {
                side: estimate.side,
            });
        }
    }
    debug!(
        left = borders.get(BorderSide::Left).count,
        right = borders.get(BorderSide::Right).count,
        top = borders.get(BorderSide::Top).count,
        bottom = borders.get(BorderSide::Bottom).count,
        "border samples accepted"
    );

    Ok(BorderScan {
        borders,
        diff,
        mask,
        gradient,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    /// White frame lit inside the given rectangle, black frame dark.
    fn reference_pair(
        width: usize,
        height: usize,
        x0: usize,
        y0: usize,
        x1: usize,
        y1: usize,
    ) -> (GrayFrame, GrayFrame) {
        let mut white = GrayFrame::new(width, height);
        for y in y0..y1 {
            for x in x0..x1 {
                white.set(x, y, 220);
            }
        }
        let black = GrayFrame::new(width, height);
        (white, black)
    }

    #[test]
    fn test_detects_all_four_borders_of_a_rectangle() {
        let (white, black) = reference_pair(200, 200, 40, 50, 160, 150);
        let mut rng = StdRng::seed_from_u64(1);
        let scan = detect_borders(&white, &black, &BorderScanParams::default(), &mut rng)
            .expect("rectangle outline should calibrate");

        for side in BorderSide::ALL {
            assert!(scan.borders.get(side).count > 0, "{side} border empty");
        }

        // Means should sit on (or right next to) the corresponding edges.
        let left = scan.borders.get(BorderSide::Left).real_mean();
        assert!((left.x - 40.0).abs() < 3.0, "left mean at x={}", left.x);
        let right = scan.borders.get(BorderSide::Right).real_mean();
        assert!((right.x - 160.0).abs() < 3.0, "right mean at x={}", right.x);
        let top = scan.borders.get(BorderSide::Top).real_mean();
        assert!((top.y - 50.0).abs() < 3.0, "top mean at y={}", top.y);
        let bottom = scan.borders.get(BorderSide::Bottom).real_mean();
        assert!(
            (bottom.y - 150.0).abs() < 3.0,
            "bottom mean at y={}",
            bottom.y
        );
    }

    #[test]
    fn test_identical_frames_have_no_candidates() {
        let white = GrayFrame::new(64, 64);
        let black = GrayFrame::new(64, 64);
        let mut rng = StdRng::seed_from_u64(1);
        let err = detect_borders(&white, &black, &BorderScanParams::default(), &mut rng)
            .unwrap_err();
        assert_eq!(err, CalibrationError::NoBoundaryCandidates);
    }

    #[test]
    fn test_running_mean_matches_real_mean() {
        let mut est = BorderEstimate::new(BorderSide::Left);
        est.push(Vec2::new(10.0, 20.0));
        est.push(Vec2::new(10.0, 40.0));
        est.push(Vec2::new(10.0, 90.0));
        let real = est.real_mean();
        assert!((est.mean.x - real.x).abs() < 1e-9);
        assert!((est.mean.y - real.y).abs() < 1e-9);
        assert!((real.y - 50.0).abs() < 1e-9);
    }
}
