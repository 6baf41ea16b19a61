//! Engine facade: element registry, raster dispatcher and calibration
//! sequencing behind one surface.
//!
//! Everything here runs on the single frame-driven control loop. The two
//! concessions to the outside world are the `SharedFlags` block (read by
//! collaborator threads under a short-lived lock) and the atomically
//! swapped calibration map handle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::border::{detect_borders, BorderScanParams};
use crate::calibration::{CalibrationError, CalibrationMap};
use crate::canvas::{Canvas, Color};
use crate::config::Config;
use crate::corners::estimate_corners;
use crate::dispatch::TouchDispatcher;
use crate::elements::{
    ActivationFn, ElementId, ElementRegistry, PointerEvent, ShapeDraw, StateDraw,
};
use crate::frame::{BitRaster, GrayFrame};
use crate::snapshot;

/// Flags owned by collaborators on other threads (control surface,
/// encoder). Snapshot them at the top of a loop iteration; never hold the
/// lock across blocking calibration steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlFlags {
    pub recording_locked: bool,
    pub calibration_requested: bool,
}

#[derive(Debug, Default)]
pub struct SharedFlags {
    inner: Mutex<ControlFlags>,
}

impl SharedFlags {
    pub fn snapshot(&self) -> ControlFlags {
        *self.inner.lock()
    }

    pub fn set_recording_locked(&self, locked: bool) {
        self.inner.lock().recording_locked = locked;
    }

    pub fn recording_locked(&self) -> bool {
        self.inner.lock().recording_locked
    }

    pub fn request_calibration(&self) {
        self.inner.lock().calibration_requested = true;
    }

    /// Read and clear the calibration request.
    pub fn take_calibration_request(&self) -> bool {
        let mut guard = self.inner.lock();
        std::mem::take(&mut guard.calibration_requested)
    }
}

pub struct Overlay {
    registry: ElementRegistry,
    dispatcher: TouchDispatcher,
    map: ArcSwapOption<CalibrationMap>,
    flags: Arc<SharedFlags>,
    border_params: BorderScanParams,
    settle: Duration,
    display_width: usize,
    display_height: usize,
    snapshot_dir: Option<PathBuf>,
    rng: StdRng,
}

impl Overlay {
    pub fn new(config: &Config, seed: u64) -> Self {
        Self {
            registry: ElementRegistry::new(config.touch.hold_frames),
            dispatcher: TouchDispatcher::new(seed),
            map: ArcSwapOption::from(None),
            flags: Arc::new(SharedFlags::default()),
            border_params: BorderScanParams {
                diff_threshold: config.calibration.diff_threshold,
                samples: config.calibration.samples,
                collinearity_min: config.calibration.collinearity,
            },
            settle: Duration::from_millis(config.calibration.settle_ms),
            display_width: config.display.width,
            display_height: config.display.height,
            snapshot_dir: config.debug.snapshot_dir.clone(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Handle to the externally-owned flag block.
    pub fn flags(&self) -> Arc<SharedFlags> {
        self.flags.clone()
    }

    /// The installed calibration map, if any.
    pub fn calibration_map(&self) -> Option<Arc<CalibrationMap>> {
        self.map.load_full()
    }

    pub fn registry(&self) -> &ElementRegistry {
        &self.registry
    }

    pub fn add_element(
        &mut self,
        canvas: &mut dyn Canvas,
        id: ElementId,
        base: ShapeDraw,
        hover: Option<StateDraw>,
        active: Option<StateDraw>,
        on_activate: Option<ActivationFn>,
    ) {
        self.registry
            .add_element(canvas, id, base, hover, active, on_activate);
    }

    /// Feed the pointer-path state machine.
    pub fn dispatch_pointer_event(&mut self, canvas: &mut dyn Canvas, event: PointerEvent) {
        self.registry.dispatch_pointer_event(canvas, event);
    }

    /// Feed the raster path. A no-op until a calibration map is installed.
    pub fn dispatch_trigger_raster(
        &mut self,
        canvas: &mut dyn Canvas,
        raster: &BitRaster,
    ) -> Vec<ElementId> {
        let Some(map) = self.map.load_full() else {
            debug!("trigger raster ignored: no calibration map installed");
            return Vec::new();
        };
        self.dispatcher
            .dispatch(canvas, &map, &mut self.registry, raster)
    }

    /// Repaint every element in its current state.
    pub fn redraw_all(&mut self, canvas: &mut dyn Canvas) {
        self.registry.redraw_all(canvas);
    }

    /// Run the blocking calibration sequence: white reference frame, black
    /// reference frame, border scan, corner estimation, map build. On
    /// success the new map is installed atomically; on failure the
    /// previous map stays in effect.
    pub fn run_calibration<F>(
        &mut self,
        canvas: &mut dyn Canvas,
        mut capture: F,
    ) -> Result<(), CalibrationError>
    where
        F: FnMut() -> GrayFrame,
    {
        info!("starting calibration");

        canvas.fill(Color::WHITE);
        canvas.present();
        std::thread::sleep(self.settle);
        let white = capture();

        canvas.fill(Color::BLACK);
        canvas.present();
        std::thread::sleep(self.settle);
        let black = capture();

        // Restore the display before the (potentially slow) analysis.
        canvas.fill(Color::WHITE);
        canvas.present();

        let scan = detect_borders(&white, &black, &self.border_params, &mut self.rng)?;
        if let Some(dir) = &self.snapshot_dir {
            if let Err(err) = snapshot::dump_border_scan(dir, &white, &black, &scan) {
                warn!("failed to write calibration snapshots: {err:#}");
            }
        }

        let corners = estimate_corners(&scan.borders)?;
        let map = CalibrationMap::build(
            &corners,
            white.width(),
            white.height(),
            self.display_width,
            self.display_height,
        );
        info!(
            mapped = map.mapped_cells(),
            total = map.width() * map.height(),
            "calibration map installed"
        );
        self.map.store(Some(Arc::new(map)));
        self.dispatcher.reset();
        Ok(())
    }
}
