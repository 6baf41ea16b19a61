//! Trigger-raster resolution with two-frame confirmation.
//!
//! Each frame the camera-space trigger raster is pushed through the
//! calibration map, masked down to the element bounding boxes, confirmed
//! against the previous frame and resolved into at most one claim per
//! element. Claims drive the registry's touch-debounce state machine.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{trace, warn};

use crate::calibration::CalibrationMap;
use crate::canvas::Canvas;
use crate::elements::{ElementId, ElementRegistry};
use crate::frame::BitRaster;
use crate::geometry::DisplayPoint;

pub struct TouchDispatcher {
    /// Previous frame's transformed (masked) raster.
    prev: Option<BitRaster>,
    rng: StdRng,
}

impl TouchDispatcher {
    pub fn new(seed: u64) -> Self {
        Self {
            prev: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Drop the confirmation state, e.g. after a recalibration.
    pub fn reset(&mut self) {
        self.prev = None;
    }

    /// Resolve one frame's trigger raster. Returns the ids claimed this
    /// frame; never errors.
    pub fn dispatch(
        &mut self,
        canvas: &mut dyn Canvas,
        map: &CalibrationMap,
        registry: &mut ElementRegistry,
        raster: &BitRaster,
    ) -> Vec<ElementId> {
        if raster.width() != map.width() || raster.height() != map.height() {
            warn!(
                raster_width = raster.width(),
                raster_height = raster.height(),
                map_width = map.width(),
                map_height = map.height(),
                "trigger raster does not match the calibration map resolution"
            );
            return Vec::new();
        }

        let display_width = map.display_width();
        let display_height = map.display_height();

        // 1. Camera space -> display space through the calibration map.
        let mut transformed = BitRaster::new(display_width, display_height);
        for (x, y) in raster.set_points() {
            if let Some(p) = map.lookup(x, y) {
                let dx = p.x.round();
                let dy = p.y.round();
                if dx >= 0.0
                    && dy >= 0.0
                    && (dx as usize) < display_width
                    && (dy as usize) < display_height
                {
                    transformed.set(dx as usize, dy as usize);
                }
            }
        }

        // 2. Only points inside some element's bounding box can matter.
        let mut bbox_mask = BitRaster::new(display_width, display_height);
        for id in registry.ids().to_vec() {
            if let Some(bounds) = registry.bounds(id) {
                bbox_mask.set_rect(&bounds);
            }
        }
        transformed.intersect(&bbox_mask);

        // 3. Two-frame confirmation: a point counts only if it was also
        // asserted in the previous frame.
        let mut confirmed = match self.prev.take() {
            Some(prev)
                if prev.width() == display_width && prev.height() == display_height =>
            {
                let mut c = transformed.clone();
                c.intersect(&prev);
                c
            }
            _ => BitRaster::new(display_width, display_height),
        };
        self.prev = Some(transformed);

        // 4. Resolution loop: random confirmed points claim elements in
        // registration order; a claimed element's whole bounding box is
        // consumed so a region contributes at most one claim.
        let mut unresolved: Vec<ElementId> = registry.ids().to_vec();
        let mut claimed = Vec::new();
        while !unresolved.is_empty() {
            let points = confirmed.set_points();
            if points.is_empty() {
                break;
            }
            let (px, py) = points[self.rng.random_range(0..points.len())];
            let p = DisplayPoint::new(px as f64, py as f64);
            match unresolved
                .iter()
                .position(|&id| registry.hit_test(id, p))
            {
                Some(pos) => {
                    let id = unresolved.remove(pos);
                    match registry.bounds(id) {
                        Some(bounds) => confirmed.clear_rect(&bounds),
                        None => confirmed.clear(px, py),
                    }
                    claimed.push(id);
                }
                None => confirmed.clear(px, py),
            }
        }
        if !claimed.is_empty() {
            trace!(?claimed, "raster claims");
        }

        // 5./6. Advance debounce counters; elements claimed on an earlier
        // frame but not this one are released back to base.
        registry.apply_touch_frame(canvas, &claimed);
        claimed
    }
}
