// THEORY:
// The Transition Notifier is the edge detector sitting on top of occupancy.
// Occupancy is a level ("busy" or "free") recomputed every cycle; people only
// want to hear about edges. The notifier remembers what it last announced and
// emits an event only when the level disagrees with it.
//
// The notifier starts out having announced "busy". A fresh history reads as
// free, so the very first cycle after startup announces the table as free
// exactly once, and every later edge is reported exactly once.

use crate::core_modules::occupancy::Occupancy;
use std::fmt;

/// An edge between the reported "free" and "busy" states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionEvent {
    BecameFree,
    BecameBusy,
}

impl TransitionEvent {
    pub fn message(&self) -> &'static str {
        match self {
            TransitionEvent::BecameFree => "The pool table is now free",
            TransitionEvent::BecameBusy => "The pool table is no longer free",
        }
    }
}

impl fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Receives every transition the notifier emits.
pub trait NotificationDispatch: Send + Sync {
    fn dispatch(&self, event: &TransitionEvent);
}

/// Remembers the last announced state and reports edges.
#[derive(Debug, Clone, Default)]
pub struct TransitionNotifier {
    reported_free: bool,
}

impl TransitionNotifier {
    /// Starts in the "busy" announced state.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reported_free(&self) -> bool {
        self.reported_free
    }

    /// Feeds one occupancy level. Returns the event when the level is an edge.
    pub fn observe(&mut self, in_use: bool) -> Option<TransitionEvent> {
        match (in_use, self.reported_free) {
            (false, false) => {
                self.reported_free = true;
                Some(TransitionEvent::BecameFree)
            }
            (true, true) => {
                self.reported_free = false;
                Some(TransitionEvent::BecameBusy)
            }
            _ => None,
        }
    }

    /// Observes `occupancy` and hands any resulting event to `dispatch`.
    pub fn notify(&mut self, occupancy: &Occupancy, dispatch: &dyn NotificationDispatch) -> Option<TransitionEvent> {
        let event = self.observe(occupancy.in_use)?;
        tracing::info!(
            event = ?event,
            census = %occupancy.latest.snapshot,
            "{}",
            event.message()
        );
        dispatch.dispatch(&event);
        Some(event)
    }
}
