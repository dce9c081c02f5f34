//! # race-core
//!
//! `race-core` decides the single first submitter who answered correctly, under any
//! amount of concurrent load.
//!
//! ## Core Philosophy
//!
//! Many producers submit answers concurrently through a bounded queue. A single
//! evaluation task drains that queue, so counter updates and the winner check are
//! serialized without a `Mutex`. All state that observers read (the counters and
//! the winner slot) lives in atomics, so queries never stall the evaluation task.
//!
//! ## Key Concepts
//!
//! * **Backpressure**: A full queue makes [`Engine::submit`] wait. Nothing is
//!   silently dropped; every submission is either accepted or handed back in a
//!   [`SubmitError`].
//! * **Exactly One Winner**: The winner slot is claimed with a Compare-And-Swap,
//!   so at most one identifier is ever recorded, even with parallel evaluators.
//! * **One-Shot Announcement**: Subscribers obtained with
//!   [`Engine::subscribe_winner`] observe the winner exactly once.
//!
//! ## Example
//!
//! ```rust
//! use std::num::NonZeroUsize;
//!
//! use race_core::Engine;
//! use race_core::Submission;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = Engine::new(NonZeroUsize::new(16).unwrap());
//! let cancel = CancellationToken::new();
//! let evaluator = engine.start(cancel.clone()).unwrap();
//!
//! engine.submit(Submission::new(1, false)).await.unwrap();
//! engine.submit(Submission::new(7, true)).await.unwrap();
//!
//! // Stopping drains everything already accepted.
//! cancel.cancel();
//! evaluator.await.unwrap();
//!
//! assert_eq!(engine.winner(), Some(7));
//! assert_eq!(engine.snapshot().total, 2);
//! # }
//! ```

use serde::Deserialize;
use serde::Serialize;

mod counters;
mod engine;
mod error;
mod winner;

pub use counters::Stats;
pub use engine::Engine;
pub use error::StartError;
pub use error::SubmitError;
pub use winner::WinnerEvent;
pub use winner::WinnerSlot;

/// One subject's answer.
///
/// The engine performs no validation: any `i64` is a legal subject identifier.
/// Rejecting nonsensical identifiers is the job of whoever feeds the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Submission {
    #[serde(rename = "user_id")]
    pub subject_id: i64,
    pub correct: bool,
}

impl Submission {
    pub const fn new(subject_id: i64, correct: bool) -> Self {
        Self {
            subject_id,
            correct,
        }
    }
}
