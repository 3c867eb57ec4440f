//! Settings loading.
//!
//! The settings file is the JSON document the calibration tools write: one
//! bound array per ball color, the region of interest, and a color-space flag.
//! Everything else has a default so a calibration-only file keeps working.

use crate::core_modules::blob_detector::AcceptanceBand;
use crate::core_modules::color_profile::{BallLabel, ColorProfile, ColorProfiles, ColorSpace};
use crate::core_modules::occupancy::{
    CAPTURE_CADENCE, HISTORY_CAPACITY, LOOKBACK_WINDOW, MIN_CHANGES_IN_WINDOW, TrackerConfig,
};
use crate::core_modules::region::{Region, Regions};
use crate::error::{Error, Result};
use crate::pipeline::PipelineConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Frames are resized to this width before regions are applied.
pub const DEFAULT_WORKING_WIDTH: u32 = 800;

fn default_working_width() -> Option<u32> {
    Some(DEFAULT_WORKING_WIDTH)
}

fn default_min_radius() -> f64 {
    AcceptanceBand::DEFAULT_MIN_RADIUS
}

fn default_max_radius() -> f64 {
    AcceptanceBand::DEFAULT_MAX_RADIUS
}

fn default_cadence_secs() -> u64 {
    CAPTURE_CADENCE.as_secs()
}

fn default_lookback_window() -> usize {
    LOOKBACK_WINDOW
}

fn default_history_capacity() -> usize {
    HISTORY_CAPACITY
}

fn default_min_changes() -> usize {
    MIN_CHANGES_IN_WINDOW
}

/// The settings document as written on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSettings {
    #[serde(default)]
    pub hsv: Option<bool>,
    #[serde(default)]
    pub rgb: Option<bool>,
    pub white: [u8; 6],
    pub black: [u8; 6],
    pub yellow: [u8; 6],
    pub red: [u8; 6],
    pub roi: [u32; 4],
    #[serde(default)]
    pub black_roi: Option<[u32; 4]>,
    #[serde(default = "default_working_width")]
    pub working_width: Option<u32>,
    #[serde(default = "default_min_radius")]
    pub min_radius: f64,
    #[serde(default = "default_max_radius")]
    pub max_radius: f64,
    #[serde(default = "default_cadence_secs")]
    pub cadence_secs: u64,
    #[serde(default = "default_lookback_window")]
    pub lookback_window: usize,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_min_changes")]
    pub min_changes_in_window: usize,
}

impl RawSettings {
    /// `hsv` wins when only it is given; the legacy `rgb` flag is its inverse.
    fn color_space(&self) -> Result<ColorSpace> {
        match (self.hsv, self.rgb) {
            (Some(hsv), Some(rgb)) if hsv == rgb => Err(Error::Config(format!(
                "settings set both \"hsv\" and \"rgb\" to {hsv}"
            ))),
            (Some(true), _) | (None, Some(false)) => Ok(ColorSpace::Hsv),
            (Some(false), _) | (None, Some(true)) => Ok(ColorSpace::Rgb),
            (None, None) => Ok(ColorSpace::Hsv),
        }
    }

    fn bounds(&self, label: BallLabel) -> [u8; 6] {
        match label {
            BallLabel::White => self.white,
            BallLabel::Black => self.black,
            BallLabel::Yellow => self.yellow,
            BallLabel::Red => self.red,
        }
    }
}

/// Validated, ready-to-use settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub profiles: ColorProfiles,
    pub regions: Regions,
    pub band: AcceptanceBand,
    /// `None` keeps frames at their native size.
    pub working_width: Option<u32>,
    pub cadence: Duration,
    pub tracker: TrackerConfig,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_json_str(&text)?;
        tracing::info!(
            path = %path.display(),
            color_space = ?settings.profiles.color_space(),
            roi = %settings.regions.primary,
            "Loaded settings"
        );
        Ok(settings)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: RawSettings = serde_json::from_str(text)?;
        Self::try_from(raw)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            profiles: self.profiles.clone(),
            regions: self.regions,
            band: self.band,
            working_width: self.working_width,
        }
    }
}

impl TryFrom<RawSettings> for Settings {
    type Error = Error;

    fn try_from(raw: RawSettings) -> Result<Self> {
        let color_space = raw.color_space()?;
        let profiles = ColorProfiles::new(
            color_space,
            [
                ColorProfile::from_bounds(BallLabel::White, raw.bounds(BallLabel::White))?,
                ColorProfile::from_bounds(BallLabel::Black, raw.bounds(BallLabel::Black))?,
                ColorProfile::from_bounds(BallLabel::Yellow, raw.bounds(BallLabel::Yellow))?,
                ColorProfile::from_bounds(BallLabel::Red, raw.bounds(BallLabel::Red))?,
            ],
        )?;

        let primary = Region::from_array(raw.roi)?;
        let black = raw.black_roi.map(Region::from_array).transpose()?;

        let band = AcceptanceBand {
            min_radius: raw.min_radius,
            max_radius: raw.max_radius,
        };
        if !(band.min_radius >= 0.0 && band.min_radius < band.max_radius) {
            return Err(Error::Config(format!(
                "radius band ({}, {}) is empty",
                band.min_radius, band.max_radius
            )));
        }

        if raw.working_width == Some(0) {
            return Err(Error::Config("working_width must be non-zero".to_string()));
        }
        if raw.cadence_secs == 0 {
            return Err(Error::Config("cadence_secs must be non-zero".to_string()));
        }

        let tracker = TrackerConfig {
            history_capacity: raw.history_capacity,
            lookback_window: raw.lookback_window,
            min_changes_in_window: raw.min_changes_in_window,
        };
        tracker.validate()?;

        Ok(Self {
            profiles,
            regions: Regions::new(primary, black),
            band,
            working_width: raw.working_width,
            cadence: Duration::from_secs(raw.cadence_secs),
            tracker,
        })
    }
}
