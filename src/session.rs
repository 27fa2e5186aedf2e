use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Reason recorded when a slot exhausts its retry budget.
pub const FAILED_AFTER_RETRIES: &str = "Request failed after retries";

/// Reason recorded for slots still pending when their batch is dropped.
pub const ABANDONED: &str = "batch abandoned before completion";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum SlotState {
    Pending,
    Succeeded(String),
    Failed(String),
}

impl SlotState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseSlot {
    pub index: usize,
    #[serde(flatten)]
    pub state: SlotState,
}

impl ResponseSlot {
    /// Text shown in the slot's card: the completion, `Error: <reason>`, or
    /// nothing while pending.
    pub fn display_text(&self) -> Option<String> {
        match &self.state {
            SlotState::Pending => None,
            SlotState::Succeeded(text) => Some(text.clone()),
            SlotState::Failed(reason) => Some(format!("Error: {reason}")),
        }
    }
}

/// What observers see: the current batch's slots and the loading flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BoardView {
    pub generation: u64,
    pub slots: Vec<ResponseSlot>,
    pub loading: bool,
}

impl BoardView {
    pub fn terminal_count(&self) -> usize {
        self.slots.iter().filter(|s| s.state.is_terminal()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(|s| s.state.is_terminal())
    }
}

/// Handle for one batch. Retry loops check `cancel` between attempts.
#[derive(Debug, Clone)]
pub struct BatchTicket {
    pub generation: u64,
    pub cancel: CancellationToken,
}

/// One display's state, shared between the runner and whatever renders the
/// slots. Independent callers each get their own session; a new batch on the
/// same session supersedes the running one.
///
/// Slot writes go through `record`, which rejects writes from superseded
/// generations, out-of-range indices, and second writes to a terminal slot.
/// Every accepted write is published to subscribers immediately.
pub struct Session {
    board: watch::Sender<BoardView>,
    cancel: Mutex<CancellationToken>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let (board, _) = watch::channel(BoardView::default());
        Self {
            board,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Replace the board with `n` pending slots under a new generation and
    /// cancel whatever batch was running.
    pub fn begin_batch(&self, n: usize) -> BatchTicket {
        let fresh = CancellationToken::new();
        if let Ok(mut current) = self.cancel.lock() {
            current.cancel();
            *current = fresh.clone();
        }

        let mut generation = 0;
        self.board.send_modify(|view| {
            view.generation += 1;
            view.slots = (0..n)
                .map(|index| ResponseSlot {
                    index,
                    state: SlotState::Pending,
                })
                .collect();
            view.loading = true;
            generation = view.generation;
        });

        tracing::debug!(generation, slots = n, "batch started");
        BatchTicket {
            generation,
            cancel: fresh,
        }
    }

    /// Write a terminal state into slot `index`. Returns false when the write
    /// was dropped.
    pub fn record(&self, generation: u64, index: usize, state: SlotState) -> bool {
        let accepted = self.board.send_if_modified(|view| {
            if view.generation != generation {
                return false;
            }
            match view.slots.get_mut(index) {
                Some(slot) if !slot.state.is_terminal() => {
                    slot.state = state;
                    true
                }
                _ => false,
            }
        });
        if !accepted {
            tracing::debug!(generation, index, "dropped stale slot write");
        }
        accepted
    }

    /// Clear the loading flag, if `generation` is still current.
    pub fn finish_batch(&self, generation: u64) {
        self.board.send_if_modified(|view| {
            if view.generation == generation && view.loading {
                view.loading = false;
                true
            } else {
                false
            }
        });
    }

    /// End `generation` early: every still-pending slot becomes
    /// `Failed(reason)` and loading clears. Returns the number of slots failed.
    pub fn abandon_batch(&self, generation: u64, reason: &str) -> usize {
        let mut failed = 0;
        self.board.send_if_modified(|view| {
            if view.generation != generation {
                return false;
            }
            for slot in view.slots.iter_mut().filter(|s| !s.state.is_terminal()) {
                slot.state = SlotState::Failed(reason.to_string());
                failed += 1;
            }
            let was_loading = std::mem::replace(&mut view.loading, false);
            failed > 0 || was_loading
        });
        if failed > 0 {
            tracing::warn!(generation, failed, "batch abandoned with pending slots");
        }
        failed
    }

    pub fn snapshot(&self) -> BoardView {
        self.board.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BoardView> {
        self.board.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.board.borrow().generation
    }

    pub fn is_loading(&self) -> bool {
        self.board.borrow().loading
    }
}

/// Holds a batch open. Dropping it, whether the batch finished or its future
/// was dropped mid-flight, cancels the batch token and settles the board.
pub struct BatchGuard {
    session: Arc<Session>,
    ticket: BatchTicket,
}

impl BatchGuard {
    pub fn begin(session: &Arc<Session>, n: usize) -> Self {
        let ticket = session.begin_batch(n);
        Self {
            session: session.clone(),
            ticket,
        }
    }

    pub fn ticket(&self) -> &BatchTicket {
        &self.ticket
    }

    pub fn generation(&self) -> u64 {
        self.ticket.generation
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.ticket.cancel.cancel();
        self.session.abandon_batch(self.ticket.generation, ABANDONED);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_resets_to_pending() {
        let session = Session::new();
        let ticket = session.begin_batch(3);
        let view = session.snapshot();
        assert_eq!(ticket.generation, 1);
        assert_eq!(view.slots.len(), 3);
        assert!(view.loading);
        assert_eq!(view.terminal_count(), 0);
    }

    #[test]
    fn stale_generation_is_dropped() {
        let session = Session::new();
        let old = session.begin_batch(4);
        let new = session.begin_batch(2);
        assert!(old.cancel.is_cancelled());
        assert!(!new.cancel.is_cancelled());

        assert!(!session.record(old.generation, 0, SlotState::Succeeded("late".into())));
        assert!(!session.record(old.generation, 3, SlotState::Succeeded("late".into())));
        assert!(session.record(new.generation, 0, SlotState::Succeeded("fresh".into())));

        let view = session.snapshot();
        assert_eq!(view.slots.len(), 2);
        assert_eq!(view.slots[0].display_text().as_deref(), Some("fresh"));
    }

    #[test]
    fn terminal_slot_is_written_once() {
        let session = Session::new();
        let t = session.begin_batch(1);
        assert!(session.record(t.generation, 0, SlotState::Failed(FAILED_AFTER_RETRIES.into())));
        assert!(!session.record(t.generation, 0, SlotState::Succeeded("x".into())));
        assert_eq!(
            session.snapshot().slots[0].display_text().as_deref(),
            Some("Error: Request failed after retries")
        );
    }

    #[test]
    fn finish_ignores_superseded_batch() {
        let session = Session::new();
        let old = session.begin_batch(1);
        let _new = session.begin_batch(1);
        session.finish_batch(old.generation);
        assert!(session.is_loading());
    }

    #[test]
    fn dropped_guard_settles_pending_slots() {
        let session = Arc::new(Session::new());
        let guard = BatchGuard::begin(&session, 3);
        let cancel = guard.ticket().cancel.clone();
        assert!(session.record(guard.generation(), 1, SlotState::Succeeded("kept".into())));
        drop(guard);

        let view = session.snapshot();
        assert!(cancel.is_cancelled());
        assert!(!view.loading);
        assert!(view.is_complete());
        assert_eq!(view.slots[1].display_text().as_deref(), Some("kept"));
        assert_eq!(
            view.slots[0].display_text().as_deref(),
            Some("Error: batch abandoned before completion")
        );
    }

    #[test]
    fn dropped_guard_leaves_newer_batch_alone() {
        let session = Arc::new(Session::new());
        let old = BatchGuard::begin(&session, 1);
        let _new = session.begin_batch(2);
        drop(old);

        let view = session.snapshot();
        assert_eq!(view.generation, 2);
        assert!(view.loading);
        assert_eq!(view.terminal_count(), 0);
    }
}
