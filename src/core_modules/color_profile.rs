// THEORY:
// The `ColorProfile` store is the static half of the detector. Every ball label
// owns one inclusive lower/upper bound triple, calibrated offline in a single
// color space shared by all labels. Profiles are validated once when settings
// load and never change afterwards, so the detector can borrow them freely
// from any worker.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of ball colors the census counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BallLabel {
    White,
    Black,
    Yellow,
    Red,
}

impl BallLabel {
    pub const ALL: [BallLabel; 4] = [
        BallLabel::White,
        BallLabel::Black,
        BallLabel::Yellow,
        BallLabel::Red,
    ];

    /// Dense index for per-label arrays, matching the order of `ALL`.
    pub fn index(self) -> usize {
        match self {
            BallLabel::White => 0,
            BallLabel::Black => 1,
            BallLabel::Yellow => 2,
            BallLabel::Red => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BallLabel::White => "white",
            BallLabel::Black => "black",
            BallLabel::Yellow => "yellow",
            BallLabel::Red => "red",
        }
    }

    /// How many balls of this color a full rack holds.
    pub fn expected_max(self) -> u32 {
        match self {
            BallLabel::White | BallLabel::Black => 1,
            BallLabel::Yellow | BallLabel::Red => 7,
        }
    }
}

impl fmt::Display for BallLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The space pixels are converted into before thresholding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    /// Raw frame channels in R, G, B order.
    Rgb,
    /// 8-bit HSV: hue 0..=179 (degrees / 2), saturation and value 0..=255.
    Hsv,
}

/// Inclusive per-channel bounds for one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorProfile {
    pub label: BallLabel,
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl ColorProfile {
    pub fn new(label: BallLabel, lower: [u8; 3], upper: [u8; 3]) -> Result<Self> {
        if lower.iter().zip(upper.iter()).any(|(lo, hi)| lo > hi) {
            return Err(Error::InvalidBounds {
                label,
                lower,
                upper,
            });
        }
        Ok(Self {
            label,
            lower,
            upper,
        })
    }

    /// Builds a profile from the calibration layout `[l1, l2, l3, u1, u2, u3]`.
    pub fn from_bounds(label: BallLabel, bounds: [u8; 6]) -> Result<Self> {
        let [l1, l2, l3, u1, u2, u3] = bounds;
        Self::new(label, [l1, l2, l3], [u1, u2, u3])
    }

    /// True when every channel lies inside its bound, both ends included.
    #[inline]
    pub fn contains(&self, channels: [u8; 3]) -> bool {
        channels
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .all(|(value, (lo, hi))| lo <= value && value <= hi)
    }
}

/// One profile per label, all calibrated in the same color space.
#[derive(Debug, Clone)]
pub struct ColorProfiles {
    color_space: ColorSpace,
    profiles: [ColorProfile; 4],
}

impl ColorProfiles {
    /// Profiles may be given in any order; each label must appear exactly once.
    pub fn new(color_space: ColorSpace, profiles: [ColorProfile; 4]) -> Result<Self> {
        let mut slots: [Option<ColorProfile>; 4] = [None; 4];
        for profile in profiles {
            let slot = &mut slots[profile.label.index()];
            if slot.is_some() {
                return Err(Error::Config(format!(
                    "color profile for {} given more than once",
                    profile.label
                )));
            }
            *slot = Some(profile);
        }

        let mut ordered = profiles;
        for label in BallLabel::ALL {
            ordered[label.index()] = slots[label.index()].ok_or_else(|| {
                Error::Config(format!("missing color profile for {label}"))
            })?;
        }

        Ok(Self {
            color_space,
            profiles: ordered,
        })
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn get(&self, label: BallLabel) -> &ColorProfile {
        &self.profiles[label.index()]
    }
}
