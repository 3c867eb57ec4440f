// THEORY:
// The `pipeline` module is the top-level, per-frame API of the vision side. It
// owns the immutable calibration (color profiles, regions, acceptance band,
// working width) and turns one raw camera frame into one `FrameCensus`.
//
// Stage 1: Normalization. The frame is resized to the working width so the
//          regions and radius band, both calibrated at that width, line up
//          with it regardless of the camera's native resolution.
// Stage 2: Region check. Regions are validated against the working frame
//          before any crop, so a calibration made for another camera is
//          reported as a configuration error.
// Stage 3: Census. Each label runs through the blob detector on its region
//          and the accepted circles are counted.
//
// The pipeline holds no per-frame state and is shared across threads behind an
// `Arc`; the occupancy history lives in the tracker, not here.

use crate::core_modules::blob_detector::AcceptanceBand;
use crate::core_modules::census::{FrameCensus, build_census};
use crate::core_modules::color_profile::ColorProfiles;
use crate::core_modules::region::Regions;
use crate::error::Result;
use image::RgbImage;
use image::imageops::{self, FilterType};

/// Calibration the pipeline runs with.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub profiles: ColorProfiles,
    pub regions: Regions,
    pub band: AcceptanceBand,
    /// Target width for incoming frames; `None` keeps the native size.
    pub working_width: Option<u32>,
}

/// The output of the pipeline for a single frame.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// The frame at working resolution, as the detector saw it.
    pub frame: RgbImage,
    pub census: FrameCensus,
}

/// The main, top-level struct for the per-frame census.
#[derive(Debug, Clone)]
pub struct TablePipeline {
    config: PipelineConfig,
}

impl TablePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Dimensions a `width` x `height` frame has after normalization.
    pub fn working_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        match self.config.working_width {
            Some(target) if target != width && width > 0 => {
                let scaled = (height as u64 * target as u64 + width as u64 / 2) / width as u64;
                (target, (scaled as u32).max(1))
            }
            _ => (width, height),
        }
    }

    /// Resizes `frame` to the working width, preserving the aspect ratio.
    pub fn prepare(&self, frame: RgbImage) -> RgbImage {
        let (width, height) = self.working_dimensions(frame.width(), frame.height());
        if (width, height) == frame.dimensions() {
            return frame;
        }
        imageops::resize(&frame, width, height, FilterType::Triangle)
    }

    /// Checks the calibrated regions against a working-resolution frame.
    pub fn validate_frame(&self, frame: &RgbImage) -> Result<()> {
        self.config.regions.validate_against(frame.width(), frame.height())
    }

    /// Stage 1 through 3 for one raw frame.
    pub fn process(&self, frame: RgbImage) -> Result<ProcessedFrame> {
        let frame = self.prepare(frame);
        self.validate_frame(&frame)?;
        let census = build_census(&frame, &self.config.regions, &self.config.profiles, self.config.band)?;
        Ok(ProcessedFrame { frame, census })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::census::CensusSnapshot;
    use crate::core_modules::color_profile::{BallLabel, ColorProfile, ColorSpace};
    use crate::core_modules::region::Region;
    use crate::error::Error;
    use image::Rgb;
    use imageproc::drawing::draw_filled_circle_mut;

    fn config(working_width: Option<u32>, roi: Region) -> PipelineConfig {
        let profiles = ColorProfiles::new(
            ColorSpace::Rgb,
            [
                ColorProfile::new(BallLabel::White, [200, 200, 200], [255, 255, 255]).unwrap(),
                ColorProfile::new(BallLabel::Black, [0, 0, 0], [10, 10, 10]).unwrap(),
                ColorProfile::new(BallLabel::Yellow, [200, 200, 0], [255, 255, 60]).unwrap(),
                ColorProfile::new(BallLabel::Red, [200, 0, 0], [255, 60, 60]).unwrap(),
            ],
        )
        .unwrap();
        PipelineConfig {
            profiles,
            regions: Regions::new(roi, None),
            band: AcceptanceBand::default(),
            working_width,
        }
    }

    fn felt(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([20, 120, 40]))
    }

    #[test]
    fn frames_are_scaled_to_the_working_width() {
        let pipeline = TablePipeline::new(config(Some(800), Region::new(0, 0, 10, 10).unwrap()));
        assert_eq!(pipeline.working_dimensions(1600, 900), (800, 450));
        assert_eq!(pipeline.working_dimensions(800, 600), (800, 600));
        assert_eq!(pipeline.prepare(felt(400, 300)).dimensions(), (800, 600));
    }

    #[test]
    fn native_size_is_kept_without_a_working_width() {
        let pipeline = TablePipeline::new(config(None, Region::new(0, 0, 10, 10).unwrap()));
        assert_eq!(pipeline.working_dimensions(1920, 1080), (1920, 1080));
    }

    #[test]
    fn process_counts_balls_on_the_table() {
        let mut frame = felt(200, 120);
        draw_filled_circle_mut(&mut frame, (50, 60), 8, Rgb([255, 255, 255]));
        draw_filled_circle_mut(&mut frame, (100, 60), 8, Rgb([240, 230, 30]));
        draw_filled_circle_mut(&mut frame, (150, 60), 8, Rgb([240, 230, 30]));

        let pipeline = TablePipeline::new(config(None, Region::new(0, 0, 200, 120).unwrap()));
        let processed = pipeline.process(frame).unwrap();

        assert_eq!(processed.census.snapshot, CensusSnapshot::new(1, 0, 2, 0));
        assert_eq!(processed.frame.dimensions(), (200, 120));
    }

    #[test]
    fn region_outside_the_working_frame_is_rejected() {
        let pipeline = TablePipeline::new(config(Some(100), Region::new(0, 0, 120, 50).unwrap()));
        let result = pipeline.process(felt(400, 200));
        assert!(matches!(result, Err(Error::RegionOutOfBounds { frame_width: 100, .. })));
    }
}
