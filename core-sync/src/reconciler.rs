//! # Update Reconciler
//!
//! Orders updates arriving from two unsynchronized channels.
//!
//! Each update is stamped with a [`Ticket`] from a monotonic counter: a poll
//! takes its ticket when the request is *issued*, a push frame when it
//! *arrives*. A poll response that was in flight while a newer push frame
//! landed therefore carries the older ticket and is dropped instead of
//! rolling the state back.
//!
//! Terminal updates ignore ticket order. The first one from either source
//! latches the reconciler and everything after it is discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::update::{SyncProgress, SyncUpdate};

/// Position of an update in issue/arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Where an update came from. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Push,
    Poll,
}

/// What the caller should do with an update.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision<T> {
    /// Newer than anything applied so far.
    Progress(SyncProgress),
    /// First terminal: ready.
    Ready(T),
    /// First terminal: failure.
    Failed(String),
    /// An update with a newer ticket was already applied.
    Stale,
    /// A terminal update already won.
    Latched,
}

#[derive(Debug, Default)]
struct State {
    last_applied: Option<Ticket>,
    terminal: bool,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    next_ticket: AtomicU64,
    state: Mutex<State>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp an update. Strictly increasing across both channels.
    pub fn issue(&self) -> Ticket {
        Ticket(self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_terminal(&self) -> bool {
        self.lock().terminal
    }

    pub fn apply<T>(&self, ticket: Ticket, update: SyncUpdate<T>) -> Decision<T> {
        let mut state = self.lock();
        if state.terminal {
            return Decision::Latched;
        }

        match update {
            SyncUpdate::Progress(progress) => {
                if state.last_applied.is_some_and(|last| ticket <= last) {
                    return Decision::Stale;
                }
                state.last_applied = Some(ticket);
                Decision::Progress(progress)
            }
            SyncUpdate::Ready(value) => {
                state.terminal = true;
                state.last_applied = Some(ticket);
                Decision::Ready(value)
            }
            SyncUpdate::Failed(message) => {
                state.terminal = true;
                state.last_applied = Some(ticket);
                Decision::Failed(message)
            }
        }
    }

    /// Latch on a locally decided terminal (timeout, error threshold).
    ///
    /// Returns `false` if a terminal update already won.
    pub fn latch(&self) -> bool {
        let mut state = self.lock();
        if state.terminal {
            return false;
        }
        state.terminal = true;
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(stage: &str) -> SyncUpdate<u32> {
        SyncUpdate::Progress(SyncProgress::default().with_stage(stage))
    }

    #[test]
    fn test_tickets_strictly_increase() {
        let reconciler = Reconciler::new();
        let a = reconciler.issue();
        let b = reconciler.issue();
        assert!(b > a);
        assert_eq!(a.value() + 1, b.value());
    }

    #[test]
    fn test_stale_poll_does_not_overwrite_newer_push() {
        let reconciler = Reconciler::new();

        let poll_ticket = reconciler.issue(); // request issued
        let push_ticket = reconciler.issue(); // frame arrives while poll in flight

        assert!(matches!(
            reconciler.apply(push_ticket, progress("probing")),
            Decision::Progress(_)
        ));
        assert_eq!(reconciler.apply(poll_ticket, progress("queued")), Decision::Stale);
    }

    #[test]
    fn test_first_terminal_wins() {
        let reconciler = Reconciler::new();
        let first = reconciler.issue();
        let second = reconciler.issue();

        assert_eq!(
            reconciler.apply(second, SyncUpdate::<u32>::Failed("bad".to_string())),
            Decision::Failed("bad".to_string())
        );
        assert_eq!(reconciler.apply(first, SyncUpdate::Ready(7)), Decision::Latched);
        assert_eq!(reconciler.apply(reconciler.issue(), progress("late")), Decision::Latched);
    }

    #[test]
    fn test_terminal_applies_even_with_older_ticket() {
        let reconciler = Reconciler::new();
        let old = reconciler.issue();
        let new = reconciler.issue();

        reconciler.apply(new, progress("probing"));
        assert_eq!(reconciler.apply(old, SyncUpdate::Ready(1)), Decision::Ready(1));
        assert!(reconciler.is_terminal());
    }

    #[test]
    fn test_local_latch_blocks_later_updates() {
        let reconciler = Reconciler::new();
        assert!(reconciler.latch());
        assert!(!reconciler.latch());
        assert_eq!(
            reconciler.apply(reconciler.issue(), SyncUpdate::Ready(1)),
            Decision::Latched
        );
    }
}
