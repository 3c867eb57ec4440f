// THEORY:
// The Region Extractor is the bridge between a full camera frame and the
// detector. Calibration picks a primary rectangle (the playing surface) and,
// optionally, a second rectangle used only for the black ball, whose threshold
// is tuned against a sub-area that excludes table-edge shadow.
//
// A region that does not fit inside the frame is a calibration mistake, not a
// runtime condition: it is reported as a configuration error instead of being
// clamped.

use crate::core_modules::color_profile::BallLabel;
use crate::error::{Error, Result};
use image::{RgbImage, imageops};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A rectangle in working-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::Config(format!(
                "region {width}x{height}+{x}+{y} has no area"
            )));
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Builds a region from the calibration layout `[x, y, width, height]`.
    pub fn from_array(values: [u32; 4]) -> Result<Self> {
        let [x, y, width, height] = values;
        Self::new(x, y, width, height)
    }

    /// True when the whole rectangle lies inside a `frame_width` x `frame_height` frame.
    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        let right = self.x as u64 + self.width as u64;
        let bottom = self.y as u64 + self.height as u64;
        right <= frame_width as u64 && bottom <= frame_height as u64
    }

    pub fn validate_against(&self, frame_width: u32, frame_height: u32) -> Result<()> {
        if self.fits_within(frame_width, frame_height) {
            Ok(())
        } else {
            Err(Error::RegionOutOfBounds {
                region: *self,
                frame_width,
                frame_height,
            })
        }
    }

    /// Copies the region out of `frame`.
    pub fn extract(&self, frame: &RgbImage) -> Result<RgbImage> {
        self.validate_against(frame.width(), frame.height())?;
        Ok(imageops::crop_imm(frame, self.x, self.y, self.width, self.height).to_image())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// The calibrated regions of one camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Regions {
    pub primary: Region,
    /// Dedicated area for the black ball; the primary region is used when absent.
    pub black: Option<Region>,
}

impl Regions {
    pub fn new(primary: Region, black: Option<Region>) -> Self {
        Self { primary, black }
    }

    pub fn for_label(&self, label: BallLabel) -> Region {
        match (label, self.black) {
            (BallLabel::Black, Some(black)) => black,
            _ => self.primary,
        }
    }

    /// True when the black ball is read from its own crop.
    pub fn has_separate_black(&self) -> bool {
        self.black.is_some_and(|black| black != self.primary)
    }

    pub fn validate_against(&self, frame_width: u32, frame_height: u32) -> Result<()> {
        self.primary.validate_against(frame_width, frame_height)?;
        if let Some(black) = self.black {
            black.validate_against(frame_width, frame_height)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn extract_copies_the_rectangle() {
        let frame = RgbImage::from_fn(10, 8, |x, y| Rgb([x as u8, y as u8, 0]));
        let region = Region::new(2, 3, 4, 2).unwrap();

        let crop = region.extract(&frame).unwrap();

        assert_eq!(crop.dimensions(), (4, 2));
        assert_eq!(crop.get_pixel(0, 0), &Rgb([2, 3, 0]));
        assert_eq!(crop.get_pixel(3, 1), &Rgb([5, 4, 0]));
    }

    #[test]
    fn region_touching_the_edge_fits() {
        let region = Region::new(6, 4, 4, 4).unwrap();
        assert!(region.fits_within(10, 8));
        assert!(!region.fits_within(9, 8));
    }

    #[test]
    fn out_of_bounds_region_is_a_config_error() {
        let frame = RgbImage::new(10, 8);
        let region = Region::new(8, 0, 4, 4).unwrap();
        assert!(matches!(
            region.extract(&frame),
            Err(Error::RegionOutOfBounds {
                frame_width: 10,
                frame_height: 8,
                ..
            })
        ));
    }

    #[test]
    fn huge_offsets_do_not_overflow() {
        let region = Region::new(u32::MAX, u32::MAX, 1, 1).unwrap();
        assert!(!region.fits_within(u32::MAX, u32::MAX));
    }

    #[test]
    fn empty_region_is_rejected() {
        assert!(Region::from_array([0, 0, 0, 5]).is_err());
    }

    #[test]
    fn black_label_uses_its_own_region() {
        let primary = Region::new(0, 0, 100, 50).unwrap();
        let black = Region::new(10, 5, 80, 40).unwrap();

        let regions = Regions::new(primary, Some(black));
        assert_eq!(regions.for_label(BallLabel::Black), black);
        assert_eq!(regions.for_label(BallLabel::Red), primary);
        assert!(regions.has_separate_black());

        let shared = Regions::new(primary, None);
        assert_eq!(shared.for_label(BallLabel::Black), primary);
        assert!(!shared.has_separate_black());
    }
}
