use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;

/// Running totals of evaluated submissions.
///
/// Only the evaluation loop writes; any number of readers may load concurrently.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    total: AtomicU64,
    correct: AtomicU64,
    incorrect: AtomicU64,
}

impl Counters {
    pub(crate) fn record(&self, correct: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if correct {
            self.correct.fetch_add(1, Ordering::Relaxed);
        } else {
            self.incorrect.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Each field is exact at the moment it is read. The three loads are not one
    /// transaction, so a reader racing the evaluation loop may see `total` one ahead
    /// of `correct + incorrect`.
    pub(crate) fn snapshot(&self, winner_id: Option<i64>) -> Stats {
        Stats {
            total: self.total.load(Ordering::Relaxed),
            correct: self.correct.load(Ordering::Relaxed),
            incorrect: self.incorrect.load(Ordering::Relaxed),
            winner_id,
        }
    }
}

/// A point-in-time view of the engine's counters and winner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total: u64,
    pub correct: u64,
    pub incorrect: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<i64>,
}
