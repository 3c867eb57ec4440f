// THEORY:
// The debug overlay is a diagnostic side channel for calibration. It draws what
// the detector accepted onto the working frame (the regions, one hollow circle
// per accepted blob, and a dot at each centroid) and writes the result as a
// PNG. Nothing downstream reads these files; they exist so a human can see why
// a census came out the way it did.

use crate::core_modules::census::FrameCensus;
use crate::core_modules::color_profile::BallLabel;
use crate::core_modules::region::{Region, Regions};
use crate::error::Result;
use image::{ImageEncoder, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const REGION_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const BLACK_REGION_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const CENTROID_RADIUS: i32 = 2;

fn label_color(label: BallLabel) -> Rgb<u8> {
    match label {
        BallLabel::White => Rgb([255, 255, 255]),
        // Pure black would vanish into dark felt.
        BallLabel::Black => Rgb([90, 90, 90]),
        BallLabel::Yellow => Rgb([255, 220, 0]),
        BallLabel::Red => Rgb([255, 40, 40]),
    }
}

fn outline(frame: &mut RgbImage, region: Region, color: Rgb<u8>) {
    let rect = Rect::at(region.x as i32, region.y as i32).of_size(region.width, region.height);
    draw_hollow_rect_mut(frame, rect, color);
}

/// Draws the regions and every accepted detection onto a copy of `frame`.
pub fn annotate(frame: &RgbImage, regions: &Regions, census: &FrameCensus) -> RgbImage {
    let mut canvas = frame.clone();
    outline(&mut canvas, regions.primary, REGION_COLOR);
    if let Some(black) = regions.black.filter(|_| regions.has_separate_black()) {
        outline(&mut canvas, black, BLACK_REGION_COLOR);
    }

    for label in BallLabel::ALL {
        let region = regions.for_label(label);
        let (dx, dy) = (region.x as f64, region.y as f64);
        let color = label_color(label);
        for circle in census.detections(label) {
            let center = ((circle.center.0 + dx).round() as i32, (circle.center.1 + dy).round() as i32);
            let centroid = ((circle.centroid.0 + dx).round() as i32, (circle.centroid.1 + dy).round() as i32);
            draw_hollow_circle_mut(&mut canvas, center, circle.radius.round() as i32, color);
            draw_filled_circle_mut(&mut canvas, centroid, CENTROID_RADIUS, color);
        }
    }
    canvas
}

/// Encodes `frame` as PNG at `path`.
pub fn save_png(path: &Path, frame: &RgbImage) -> Result<()> {
    let output = std::io::BufWriter::new(std::fs::File::create(path)?);
    let encoder = image::codecs::png::PngEncoder::new(output);
    encoder.write_image(frame.as_raw(), frame.width(), frame.height(), image::ExtendedColorType::Rgb8)?;
    Ok(())
}

/// Writes annotated frames as `<session>-<counter>.png` into one directory.
#[derive(Debug)]
pub struct OverlayWriter {
    dir: PathBuf,
    session: String,
    counter: AtomicU64,
}

impl OverlayWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let session = chrono::Utc::now().format("%Y%m%dT%H%M%S").to_string();
        tracing::info!(dir = %dir.display(), session = %session, "Writing debug overlays");
        Ok(Self {
            dir,
            session,
            counter: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Annotates and saves one frame. Returns the written path.
    pub fn write(&self, frame: &RgbImage, regions: &Regions, census: &FrameCensus) -> Result<PathBuf> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("{}-{:06}.png", self.session, index));
        save_png(&path, &annotate(frame, regions, census))?;
        tracing::trace!(path = %path.display(), "Saved overlay");
        Ok(path)
    }
}
