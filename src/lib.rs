// THEORY:
// This file is the main entry point for the `cue_vision` library crate. It
// exposes the pieces the binary wires together: the per-frame `TablePipeline`,
// the occupancy tracker and transition notifier under `core_modules`, the
// frame sources and capture cycle, and the HTTP and command surfaces.
//
// The vision half (`core_modules` detectors, `pipeline`) is pure and
// synchronous. The service half (`capture`, `notify`, `server`) is async and
// owns all long-lived state. Only `capture` crosses between the two.

pub mod capture;
pub mod commands;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod notify;
pub mod overlay;
pub mod pipeline;
pub mod server;

pub use error::{Error, Result};
