//! Session state tracking: the bounded event ledger other components read
//! session truth from, plus the store decorator that feeds it.

mod tracker;


pub use tracker::{
    EVENT_LOG_CAP, EventKind, SessionEvent, SessionSummary, SessionTracker, TrackedStore,
    classify_event,
};
