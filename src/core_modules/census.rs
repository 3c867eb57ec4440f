// THEORY:
// The Frame Census Builder folds one frame's detections into a count per
// label. It is a pure reduction with no memory of earlier frames: a ball that
// rolls between captures is simply counted again wherever it now lies. Keeping
// identity out of this layer is what lets the occupancy tracker reason only
// about "did the counts change", and the raw detections are kept next to the
// counts so anything that later wants identity can be layered on top.
//
// After counting, the census is checked against a full rack (1 white, 1 black,
// 7 yellow, 7 red). Counts above a quota point at misdetections and are logged;
// a complete rack is flagged as a diagnostic. Neither check ever blocks the
// snapshot.

use crate::core_modules::blob_detector::{AcceptanceBand, blob_detector};
use crate::core_modules::circle::DetectedCircle;
use crate::core_modules::color_profile::{BallLabel, ColorProfiles};
use crate::core_modules::region::Regions;
use crate::error::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Accepted detections per label for one capture cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CensusSnapshot {
    pub white: u32,
    pub black: u32,
    pub yellow: u32,
    pub red: u32,
}

impl CensusSnapshot {
    pub fn new(white: u32, black: u32, yellow: u32, red: u32) -> Self {
        Self {
            white,
            black,
            yellow,
            red,
        }
    }

    pub fn count(&self, label: BallLabel) -> u32 {
        match label {
            BallLabel::White => self.white,
            BallLabel::Black => self.black,
            BallLabel::Yellow => self.yellow,
            BallLabel::Red => self.red,
        }
    }

    fn count_mut(&mut self, label: BallLabel) -> &mut u32 {
        match label {
            BallLabel::White => &mut self.white,
            BallLabel::Black => &mut self.black,
            BallLabel::Yellow => &mut self.yellow,
            BallLabel::Red => &mut self.red,
        }
    }

    pub fn total(&self) -> u32 {
        BallLabel::ALL.iter().map(|label| self.count(*label)).sum()
    }

    /// Labels counted more often than a rack allows.
    pub fn over_quota(&self) -> Vec<BallLabel> {
        BallLabel::ALL
            .into_iter()
            .filter(|label| self.count(*label) > label.expected_max())
            .collect()
    }

    /// True when every label is present exactly as in a fresh rack.
    pub fn quotas_satisfied(&self) -> bool {
        BallLabel::ALL
            .iter()
            .all(|label| self.count(*label) == label.expected_max())
    }
}

impl fmt::Display for CensusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "white={} black={} yellow={} red={}",
            self.white, self.black, self.yellow, self.red
        )
    }
}

/// A snapshot together with the circles it was counted from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameCensus {
    pub snapshot: CensusSnapshot,
    detections: [Vec<DetectedCircle>; 4],
}

impl FrameCensus {
    /// Counts detections per label. Labels not mentioned count as zero.
    pub fn from_detections<I>(detections: I) -> Self
    where
        I: IntoIterator<Item = (BallLabel, Vec<DetectedCircle>)>,
    {
        let mut census = FrameCensus::default();
        for (label, circles) in detections {
            *census.snapshot.count_mut(label) += circles.len() as u32;
            census.detections[label.index()].extend(circles);
        }
        census
    }

    /// Region-local circles accepted for `label`.
    pub fn detections(&self, label: BallLabel) -> &[DetectedCircle] {
        &self.detections[label.index()]
    }

    /// Logs quota diagnostics. Returns the labels found over quota.
    pub fn check_quotas(&self) -> Vec<BallLabel> {
        let over = self.snapshot.over_quota();
        for label in &over {
            tracing::warn!(
                label = %label,
                count = self.snapshot.count(*label),
                expected_max = label.expected_max(),
                "Census exceeds quota, likely misdetection"
            );
        }
        if self.snapshot.quotas_satisfied() {
            tracing::debug!("Census matches a full rack");
        }
        over
    }
}

/// Runs the detector once per label against its region and counts the result.
pub fn build_census(
    frame: &RgbImage,
    regions: &Regions,
    profiles: &ColorProfiles,
    band: AcceptanceBand,
) -> Result<FrameCensus> {
    let primary = blob_detector::smooth(&regions.primary.extract(frame)?);
    let black = match regions.black {
        Some(region) if regions.has_separate_black() => Some(blob_detector::smooth(&region.extract(frame)?)),
        _ => None,
    };

    let color_space = profiles.color_space();
    let detections = BallLabel::ALL.into_iter().map(|label| {
        let smoothed = match (label, &black) {
            (BallLabel::Black, Some(black)) => black,
            _ => &primary,
        };
        let circles = blob_detector::find_circles_in_smoothed(smoothed, profiles.get(label), color_space, band);
        (label, circles)
    });

    let census = FrameCensus::from_detections(detections);
    census.check_quotas();
    Ok(census)
}
