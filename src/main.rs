//! BeamTouch - interactive touch overlay for a projector/camera rig
//!
//! The engine calibrates the mapping between the camera's pixel grid and
//! the projected display, then resolves camera-derived trigger rasters
//! into element interactions. Capture and presentation hardware are out of
//! process; the demo driver below stands them in with a synthetic camera
//! watching an in-memory canvas, so the whole pipeline can be exercised on
//! a desk.

mod border;
mod calibration;
mod canvas;
mod config;
mod corners;
mod dispatch;
mod elements;
mod frame;
mod geometry;
mod overlay;
mod snapshot;

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use canvas::{BufferCanvas, Canvas, Color};
use elements::{ElementShape, PointerEvent, PointerKind, ShapeDraw, StateDraw};
use frame::{BitRaster, GrayFrame};
use geometry::{DisplayPoint, Rect, Vec2};
use overlay::Overlay;

/// BeamTouch - touch overlay engine for a projector/camera rig
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// RNG seed for border sampling and raster resolution
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Write calibration snapshot PNGs to this directory
    #[arg(long)]
    snapshots: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Canvas handle shared between the engine and the synthetic camera.
#[derive(Clone)]
struct SharedCanvas(Rc<RefCell<BufferCanvas>>);

impl SharedCanvas {
    fn new(width: usize, height: usize) -> Self {
        Self(Rc::new(RefCell::new(BufferCanvas::new(width, height))))
    }

    fn mean_luma(&self) -> f64 {
        self.0.borrow().mean_luma()
    }
}

impl Canvas for SharedCanvas {
    fn width(&self) -> usize {
        self.0.borrow().width()
    }
    fn height(&self) -> usize {
        self.0.borrow().height()
    }
    fn fill(&mut self, color: Color) {
        self.0.borrow_mut().fill(color);
    }
    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Color) {
        self.0.borrow_mut().fill_rect(x, y, w, h, color);
    }
    fn fill_circle(&mut self, cx: f64, cy: f64, r: f64, color: Color) {
        self.0.borrow_mut().fill_circle(cx, cy, r, color);
    }
    fn present(&mut self) {
        self.0.borrow_mut().present();
    }
}

/// Stand-in for the capture subsystem: the projected display shows up as a
/// lit convex quad against a dark room.
struct SyntheticCamera {
    width: usize,
    height: usize,
    /// Projected quad in camera space: top-left, top-right, bottom-right,
    /// bottom-left.
    quad: [Vec2; 4],
    display: SharedCanvas,
}

impl SyntheticCamera {
    fn new(width: usize, height: usize, quad: [Vec2; 4], display: SharedCanvas) -> Self {
        Self {
            width,
            height,
            quad,
            display,
        }
    }

    fn contains(&self, p: Vec2) -> bool {
        // Inside test for a convex clockwise quad.
        for i in 0..4 {
            let a = self.quad[i];
            let b = self.quad[(i + 1) % 4];
            let edge = b - a;
            let rel = p - a;
            if edge.x * rel.y - edge.y * rel.x < 0.0 {
                return false;
            }
        }
        true
    }

    fn capture(&self) -> GrayFrame {
        let lit = self.display.mean_luma() > 0.5;
        let (inside, ambient) = if lit { (225, 14) } else { (18, 14) };
        let mut frame = GrayFrame::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let value = if self.contains(Vec2::new(x as f64, y as f64)) {
                    inside
                } else {
                    ambient
                };
                frame.set(x, y, value);
            }
        }
        frame
    }
}

/// Rectangular button: the base draw paints it and returns its shape.
fn button_base(x: f64, y: f64, w: f64, h: f64) -> ShapeDraw {
    Box::new(move |canvas: &mut dyn Canvas| {
        canvas.fill_rect(x, y, w, h, Color::rgb(0.98, 0.98, 0.98));
        ElementShape {
            bounds: Rect::new(x, y, w, h),
            hit_test: Box::new(move |p: DisplayPoint| {
                p.x > x && p.x < x + w && p.y > y && p.y < y + h
            }),
        }
    })
}

fn button_state(x: f64, y: f64, w: f64, h: f64, color: Color) -> StateDraw {
    Box::new(move |canvas: &mut dyn Canvas| {
        canvas.fill_rect(x, y, w, h, color);
    })
}

/// Round button, hit-tested against its radius.
fn round_base(cx: f64, cy: f64, radius: f64) -> ShapeDraw {
    Box::new(move |canvas: &mut dyn Canvas| {
        canvas.fill_circle(cx, cy, radius, Color::rgb(0.9, 0.2, 0.2));
        ElementShape {
            bounds: Rect::new(cx - radius, cy - radius, radius * 2.0, radius * 2.0),
            hit_test: Box::new(move |p: DisplayPoint| {
                let dx = p.x - cx;
                let dy = p.y - cy;
                dx * dx + dy * dy < radius * radius
            }),
        }
    })
}

fn round_state(cx: f64, cy: f64, radius: f64, color: Color) -> StateDraw {
    Box::new(move |canvas: &mut dyn Canvas| {
        canvas.fill_circle(cx, cy, radius, color);
    })
}

/// Find a camera pixel whose mapped display point hits the given element.
fn camera_pixel_hitting(
    map: &calibration::CalibrationMap,
    overlay: &Overlay,
    id: elements::ElementId,
) -> Option<(usize, usize)> {
    for y in 0..map.height() {
        for x in 0..map.width() {
            if let Some(p) = map.lookup(x, y) {
                // The dispatcher rasterizes to whole display cells, so test
                // the rounded point it will actually resolve.
                let cell = DisplayPoint::new(p.x.round(), p.y.round());
                if overlay.registry().hit_test(id, cell) {
                    return Some((x, y));
                }
            }
        }
    }
    None
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("BeamTouch v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::Config::load_or_create(&args.config)?;
    if let Some(dir) = args.snapshots {
        config.debug.snapshot_dir = Some(dir);
    }

    info!(
        "Display: {}x{}, camera: {}x{}",
        config.display.width, config.display.height, config.camera.width, config.camera.height
    );

    let mut display = SharedCanvas::new(config.display.width, config.display.height);
    let mut overlay = Overlay::new(&config, args.seed);
    let flags = overlay.flags();

    // The synthetic projector throws a keystoned quad onto the camera.
    let cw = config.camera.width as f64;
    let ch = config.camera.height as f64;
    let camera = SyntheticCamera::new(
        config.camera.width,
        config.camera.height,
        [
            Vec2::new(cw * 0.11, ch * 0.12),
            Vec2::new(cw * 0.88, ch * 0.17),
            Vec2::new(cw * 0.91, ch * 0.87),
            Vec2::new(cw * 0.08, ch * 0.83),
        ],
        display.clone(),
    );

    // Interface: a "save" button and a round "record" toggle, as the
    // device UI lays them out.
    let dw = config.display.width as f64;
    let dh = config.display.height as f64;
    let (bx, by, bw, bh) = (dw * 0.1, dh * 0.75, dw * 0.25, dh * 0.12);
    let saves = Rc::new(std::cell::Cell::new(0u32));
    let save_count = saves.clone();
    overlay.add_element(
        &mut display,
        1,
        button_base(bx, by, bw, bh),
        Some(button_state(bx, by, bw, bh, Color::rgb(1.0, 1.0, 0.85))),
        Some(button_state(bx, by, bw, bh, Color::rgb(0.75, 0.75, 0.75))),
        Some(Box::new(move || {
            save_count.set(save_count.get() + 1);
            info!("save requested");
        })),
    );

    let (rx, ry, rr) = (dw * 0.8, dh * 0.8, dh * 0.07);
    let record_flags = flags.clone();
    overlay.add_element(
        &mut display,
        2,
        round_base(rx, ry, rr),
        Some(round_state(rx, ry, rr, Color::rgb(1.0, 0.4, 0.4))),
        Some(round_state(rx, ry, rr, Color::rgb(0.6, 0.0, 0.0))),
        Some(Box::new(move || {
            let locked = !record_flags.recording_locked();
            record_flags.set_recording_locked(locked);
            info!(locked, "recording lock toggled");
        })),
    );

    info!(elements = overlay.registry().len(), "interface registered");

    // Calibration pass, normally requested through the control surface.
    flags.request_calibration();
    if flags.take_calibration_request() {
        match overlay.run_calibration(&mut display, || camera.capture()) {
            Ok(()) => {
                let map = overlay.calibration_map();
                if let Some(map) = map {
                    info!(
                        mapped = map.mapped_cells(),
                        "calibration complete, overlay is live"
                    );
                }
            }
            Err(err) => warn!("calibration failed: {err}"),
        }
        overlay.redraw_all(&mut display);
        display.present();
    }

    // Pointer path: move over the save button, press, release.
    overlay.dispatch_pointer_event(
        &mut display,
        PointerEvent::new(PointerKind::Move, bx + bw / 2.0, by + bh / 2.0),
    );
    overlay.dispatch_pointer_event(
        &mut display,
        PointerEvent::with_button(PointerKind::Down, bx + bw / 2.0, by + bh / 2.0, 1),
    );
    overlay.dispatch_pointer_event(
        &mut display,
        PointerEvent::with_button(PointerKind::Up, bx + bw / 2.0, by + bh / 2.0, 1),
    );
    info!(count = saves.get(), "pointer path exercised the save button");

    // Raster path: hold a synthetic touch on the record button until the
    // debounce threshold trips, then lift it.
    let Some(map) = overlay.calibration_map() else {
        warn!("no calibration map; skipping the raster demo");
        return Ok(());
    };
    let Some((tx, ty)) = camera_pixel_hitting(&map, &overlay, 2) else {
        warn!("record button is outside the mapped area");
        return Ok(());
    };

    let mut touch = BitRaster::new(config.camera.width, config.camera.height);
    touch.set(tx, ty);
    let empty = BitRaster::new(config.camera.width, config.camera.height);

    for frame_index in 0..config.touch.hold_frames + 2 {
        let snapshot = flags.snapshot();
        if snapshot.recording_locked {
            info!(frame_index, "recording is locked");
        }
        let claimed = overlay.dispatch_trigger_raster(&mut display, &touch);
        if !claimed.is_empty() {
            info!(frame_index, ?claimed, "trigger raster claims");
        }
    }
    overlay.dispatch_trigger_raster(&mut display, &empty);
    info!(
        recording_locked = flags.recording_locked(),
        "sustained touch toggled the record button"
    );

    Ok(())
}
