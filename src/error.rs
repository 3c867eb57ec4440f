//! Error handling for the occupancy pipeline.

use crate::core_modules::color_profile::BallLabel;
use crate::core_modules::region::Region;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
///
/// Configuration variants are fatal at startup. Capture variants only cost the
/// current cycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// A color profile whose lower bound exceeds its upper bound
    #[error("Invalid bounds for {label}: lower {lower:?} exceeds upper {upper:?}")]
    InvalidBounds {
        label: BallLabel,
        lower: [u8; 3],
        upper: [u8; 3],
    },

    /// A calibrated region that does not fit inside the frame
    #[error("Region {region} does not fit inside a {frame_width}x{frame_height} frame")]
    RegionOutOfBounds {
        region: Region,
        frame_width: u32,
        frame_height: u32,
    },

    /// Settings parse error
    #[error("Settings parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame source error
    #[error("Capture error: {0}")]
    Capture(String),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// True for errors that only cost one capture cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Capture(_) | Error::Image(_) | Error::Http(_) | Error::Io(_)
        )
    }
}
