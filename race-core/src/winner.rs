use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;

use tokio::sync::watch;
use tracing::info;

const UNSET: u8 = 0;
const CLAIMING: u8 = 1;
const SET: u8 = 2;

/// A write-once winner identifier.
///
/// Any `i64` may be stored, so there is no sentinel value. The state word moves
/// `UNSET -> CLAIMING -> SET` and only the caller that wins the Compare-And-Swap out
/// of `UNSET` gets to publish its identifier. Readers only trust the identifier once
/// they observe `SET`.
#[derive(Debug)]
pub struct WinnerSlot {
    state: AtomicU8,
    id: AtomicI64,
}

impl Default for WinnerSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl WinnerSlot {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNSET),
            id: AtomicI64::new(0),
        }
    }

    /// Attempt to record `id` as the winner.
    ///
    /// Returns `true` for exactly one call over the lifetime of the slot, no matter
    /// how many threads race here.
    pub fn declare(&self, id: i64) -> bool {
        // Cheap check first: once claimed, every later caller bails without a CAS.
        if self.state.load(Ordering::Relaxed) != UNSET {
            return false;
        }
        if self
            .state
            .compare_exchange(UNSET, CLAIMING, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        self.id.store(id, Ordering::Relaxed);
        self.state.store(SET, Ordering::Release);
        true
    }

    /// The recorded winner, if any. Never blocks.
    pub fn get(&self) -> Option<i64> {
        if self.state.load(Ordering::Acquire) == SET {
            Some(self.id.load(Ordering::Relaxed))
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Announcement {
    Pending,
    Winner(i64),
    Closed,
}

/// Fires the winner side effects (log line and subscriber fan-out) exactly once.
#[derive(Debug)]
pub(crate) struct Announcer {
    fired: AtomicBool,
    tx: watch::Sender<Announcement>,
}

impl Announcer {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(Announcement::Pending);
        Self {
            fired: AtomicBool::new(false),
            tx,
        }
    }

    /// Announce `id` as the winner. Only the first call has any effect.
    pub(crate) fn announce(&self, id: i64) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        info!(winner = id, "winner declared");
        self.tx.send_replace(Announcement::Winner(id));
        true
    }

    /// Release pending subscribers when the engine stops without a winner.
    pub(crate) fn close(&self) {
        self.tx.send_if_modified(|current| {
            if *current == Announcement::Pending {
                *current = Announcement::Closed;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn subscribe(&self) -> Option<WinnerEvent> {
        let rx = self.tx.subscribe();
        if *rx.borrow() != Announcement::Pending {
            return None;
        }
        Some(WinnerEvent { rx })
    }
}

/// A one-shot notification of the winning identifier.
///
/// Obtained from [`Engine::subscribe_winner`](crate::Engine::subscribe_winner).
/// Every event that exists when the winner is announced observes that single
/// announcement. Consuming the event with [`WinnerEvent::recv`] is the only way to
/// read it, so it can be delivered at most once per subscription.
#[derive(Debug)]
pub struct WinnerEvent {
    rx: watch::Receiver<Announcement>,
}

impl WinnerEvent {
    /// Wait for the announcement.
    ///
    /// Resolves to `Some(id)` once the winner is announced, or `None` if the engine
    /// stops (or is dropped) without ever declaring a winner.
    pub async fn recv(mut self) -> Option<i64> {
        match self
            .rx
            .wait_for(|announcement| *announcement != Announcement::Pending)
            .await
        {
            Ok(announcement) => match *announcement {
                Announcement::Winner(id) => Some(id),
                _ => None,
            },
            Err(_) => None,
        }
    }
}
