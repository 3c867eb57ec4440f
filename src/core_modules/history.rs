// THEORY:
// The `history` module is the memory of the occupancy layer. Every capture
// cycle appends one `HistoryRecord`: the census snapshot plus a single bit
// saying whether it differs from the record before it. Occupancy is then a
// question about recent bits, never about raw pixels.
//
// Key architectural principles:
// 1.  **Fixed capacity**: the ring is a boxed slice with a head index. Pushing
//     overwrites the oldest slot in O(1) and never allocates after
//     construction, so a long-running process keeps a flat footprint.
// 2.  **Pre-seeded**: the ring starts full of zero, unchanged records. A window
//     over a fresh ring therefore reads as "nothing moved", which is the same
//     thing a quiet, empty table reports.
// 3.  **Change bit at write time**: `changed` is computed once, against the
//     immediately preceding record, so readers never compare snapshots.

use crate::core_modules::census::CensusSnapshot;
use serde::Serialize;
use std::num::NonZeroUsize;

/// One cycle's census and whether it differs from the previous cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HistoryRecord {
    pub snapshot: CensusSnapshot,
    pub changed: bool,
}

impl HistoryRecord {
    /// The all-zero, unchanged record the ring is filled with.
    pub fn seed() -> Self {
        Self::default()
    }

    /// The record that `snapshot` produces when appended after `self`.
    pub fn following(&self, snapshot: CensusSnapshot) -> Self {
        Self {
            snapshot,
            changed: snapshot != self.snapshot,
        }
    }
}

/// Fixed-capacity ring of history records, oldest evicted first.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    slots: Box<[HistoryRecord]>,
    /// Index of the oldest record; the newest sits just before it.
    head: usize,
    ingested: u64,
}

impl HistoryRing {
    pub fn seeded(capacity: NonZeroUsize) -> Self {
        Self {
            slots: vec![HistoryRecord::seed(); capacity.get()].into_boxed_slice(),
            head: 0,
            ingested: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of real snapshots pushed since construction.
    pub fn ingested(&self) -> u64 {
        self.ingested
    }

    fn newest_index(&self) -> usize {
        (self.head + self.slots.len() - 1) % self.slots.len()
    }

    pub fn latest(&self) -> HistoryRecord {
        self.slots[self.newest_index()]
    }

    pub fn oldest(&self) -> HistoryRecord {
        self.slots[self.head]
    }

    /// Appends `snapshot`, evicting the oldest record. Returns the stored record.
    pub fn push(&mut self, snapshot: CensusSnapshot) -> HistoryRecord {
        let record = self.latest().following(snapshot);
        self.slots[self.head] = record;
        self.head = (self.head + 1) % self.slots.len();
        self.ingested += 1;
        record
    }

    /// Up to `n` records, newest first.
    pub fn newest(&self, n: usize) -> impl Iterator<Item = &HistoryRecord> + '_ {
        let len = self.slots.len();
        let newest = self.newest_index();
        (0..n.min(len)).map(move |offset| &self.slots[(newest + len - offset) % len])
    }
}
