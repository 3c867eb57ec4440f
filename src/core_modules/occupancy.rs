// THEORY:
// The Occupancy State Tracker turns a stream of census snapshots into one
// debounced answer: is the table in use right now? A single frame cannot say
// that; a ball that moved between two captures can. So the tracker looks back
// over the last `W` cycles and calls the table busy as soon as enough of them
// carry a change.
//
// Key architectural principles:
// 1.  **One writer, many readers**: `OccupancyTracker` is the only handle that
//     can `ingest`, and it is not `Clone`. Readers get cheap
//     `OccupancyReader` handles sharing the same ring, so the capture task and
//     the HTTP server never coordinate beyond the lock itself.
// 2.  **Whole-operation locking**: the ring's mutex is held for the entire
//     append and for the entire window scan. A reader sees some prefix of
//     ingests, never half of one.
// 3.  **Any-of-W by default**: one changed record inside the window is enough.
//     A false "busy" is preferred over a missed game. `min_changes_in_window`
//     raises the bar when shadow flicker proves too noisy.

use crate::core_modules::census::CensusSnapshot;
use crate::core_modules::history::{HistoryRecord, HistoryRing};
use crate::error::{Error, Result};
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Records kept in memory (24 minutes at the default cadence).
pub const HISTORY_CAPACITY: usize = 360;
/// Records scanned when deciding occupancy (96 s at the default cadence).
pub const LOOKBACK_WINDOW: usize = 24;
/// Changed records the window must hold to count as in use.
pub const MIN_CHANGES_IN_WINDOW: usize = 1;
/// Time between capture cycles.
pub const CAPTURE_CADENCE: Duration = Duration::from_secs(4);

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(HISTORY_CAPACITY) {
    Some(capacity) => capacity,
    None => panic!("HISTORY_CAPACITY must be non-zero"),
};

/// Tuning for the tracker. Validated once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub history_capacity: usize,
    pub lookback_window: usize,
    pub min_changes_in_window: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_capacity: HISTORY_CAPACITY,
            lookback_window: LOOKBACK_WINDOW,
            min_changes_in_window: MIN_CHANGES_IN_WINDOW,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lookback_window == 0 || self.lookback_window > self.history_capacity {
            return Err(Error::Config(format!(
                "lookback_window must be in 1..={}, got {}",
                self.history_capacity, self.lookback_window
            )));
        }
        if self.min_changes_in_window == 0 || self.min_changes_in_window > self.lookback_window {
            return Err(Error::Config(format!(
                "min_changes_in_window must be in 1..={}, got {}",
                self.lookback_window, self.min_changes_in_window
            )));
        }
        Ok(())
    }
}

/// The derived "is the table in use" answer plus the record it was read at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub in_use: bool,
    pub latest: HistoryRecord,
}

#[derive(Debug)]
struct Shared {
    config: TrackerConfig,
    ring: Mutex<HistoryRing>,
}

impl Shared {
    /// The ring is consistent between statements, so a poisoned lock is safe to reuse.
    fn ring(&self) -> MutexGuard<'_, HistoryRing> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn occupancy(&self) -> Occupancy {
        let ring = self.ring();
        let threshold = self.config.min_changes_in_window;
        let mut seen = 0;
        let in_use = ring
            .newest(self.config.lookback_window)
            .any(|record| {
                if record.changed {
                    seen += 1;
                }
                seen >= threshold
            });
        Occupancy {
            in_use,
            latest: ring.latest(),
        }
    }
}

/// Sole writer of the occupancy history.
#[derive(Debug)]
pub struct OccupancyTracker {
    shared: Arc<Shared>,
}

impl OccupancyTracker {
    pub fn new() -> Self {
        Self::build(TrackerConfig::default(), DEFAULT_CAPACITY)
    }

    pub fn with_config(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.history_capacity)
            .ok_or_else(|| Error::Config("history_capacity must be non-zero".to_string()))?;
        Ok(Self::build(config, capacity))
    }

    fn build(config: TrackerConfig, capacity: NonZeroUsize) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                ring: Mutex::new(HistoryRing::seeded(capacity)),
            }),
        }
    }

    pub fn config(&self) -> TrackerConfig {
        self.shared.config
    }

    /// Appends one cycle's census and returns the stored record.
    pub fn ingest(&mut self, snapshot: CensusSnapshot) -> HistoryRecord {
        let record = self.shared.ring().push(snapshot);
        tracing::debug!(
            census = %record.snapshot,
            changed = record.changed,
            "Ingested census"
        );
        record
    }

    pub fn occupancy(&self) -> Occupancy {
        self.shared.occupancy()
    }

    pub fn latest(&self) -> HistoryRecord {
        self.shared.ring().latest()
    }

    /// A read-only handle for other tasks.
    pub fn reader(&self) -> OccupancyReader {
        OccupancyReader {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for OccupancyTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of a tracker's history.
#[derive(Debug, Clone)]
pub struct OccupancyReader {
    shared: Arc<Shared>,
}

impl OccupancyReader {
    pub fn occupancy(&self) -> Occupancy {
        self.shared.occupancy()
    }

    pub fn latest(&self) -> HistoryRecord {
        self.shared.ring().latest()
    }
}
