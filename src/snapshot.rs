//! PNG side-files for calibration debugging.
//!
//! Mirrors what the device writes when a calibration run needs to be
//! inspected offline: the two reference frames plus the intermediate
//! diff/threshold/gradient stages.

use std::path::Path;

use anyhow::{Context, Result};
use image::GrayImage;
use tracing::debug;

use crate::border::BorderScan;
use crate::frame::{BitRaster, GrayFrame};

pub fn write_frame(path: &Path, frame: &GrayFrame) -> Result<()> {
    let img = GrayImage::from_raw(
        frame.width() as u32,
        frame.height() as u32,
        frame.data().to_vec(),
    )
    .context("frame buffer size mismatch")?;
    img.save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_raster(path: &Path, raster: &BitRaster) -> Result<()> {
    let mut frame = GrayFrame::new(raster.width(), raster.height());
    for (x, y) in raster.set_points() {
        frame.set(x, y, 255);
    }
    write_frame(path, &frame)
}

/// Write the full set of border-scan intermediates into `dir`.
pub fn dump_border_scan(
    dir: &Path,
    white: &GrayFrame,
    black: &GrayFrame,
    scan: &BorderScan,
) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create snapshot directory {}", dir.display()))?;
    write_frame(&dir.join("white.png"), white)?;
    write_frame(&dir.join("black.png"), black)?;
    write_frame(&dir.join("diff.png"), &scan.diff)?;
    write_frame(&dir.join("threshold.png"), &scan.mask)?;
    write_frame(&dir.join("gradient.png"), &scan.gradient)?;
    debug!(dir = %dir.display(), "calibration snapshots written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_frame_roundtrip() {
        let dir = std::env::temp_dir().join("beamtouch-snapshot-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("frame.png");

        let mut frame = GrayFrame::new(8, 8);
        frame.set(3, 4, 200);
        write_frame(&path, &frame).unwrap();

        let read = image::open(&path).unwrap().to_luma8();
        assert_eq!(read.width(), 8);
        assert_eq!(read.get_pixel(3, 4).0[0], 200);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_write_raster_uses_full_white() {
        let dir = std::env::temp_dir().join("beamtouch-snapshot-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("raster.png");

        let mut raster = BitRaster::new(4, 4);
        raster.set(1, 2);
        write_raster(&path, &raster).unwrap();

        let read = image::open(&path).unwrap().to_luma8();
        assert_eq!(read.get_pixel(1, 2).0[0], 255);
        assert_eq!(read.get_pixel(0, 0).0[0], 0);
        std::fs::remove_file(&path).ok();
    }
}
