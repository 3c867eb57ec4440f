pub mod blob_detector;
pub mod census;
pub mod circle;
pub mod color_profile;
pub mod history;
pub mod occupancy;
pub mod pixel;
pub mod region;
pub mod transition;
