use std::collections::HashMap;

use tokio::task::JoinHandle;
// tokio's Instant, so throttle arithmetic honours the paused test clock.
use tokio::time::Instant;
use tracing::debug;

use charade_core::types::UserId;

/// Admission timestamp for one conversation.
///
/// `last_admitted_at` is recorded immediately before a completion call is
/// issued, which makes the throttle a hard ceiling on call rate regardless
/// of how long the stream itself takes.
#[derive(Debug, Default)]
pub struct ThrottleState {
    pub last_admitted_at: Option<Instant>,
}

impl ThrottleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_admitted(&mut self, now: Instant) {
        self.last_admitted_at = Some(now);
    }
}

/// Per-user deferred-retry slots for one conversation.
///
/// At most one pending retry exists per originating user: scheduling a new
/// handle aborts and discards the previous one (last write wins).
#[derive(Debug, Default)]
pub struct RetrySlots {
    slots: HashMap<UserId, JoinHandle<()>>,
}

impl RetrySlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a retry handle for `user`, aborting any prior handle.
    pub fn schedule(&mut self, user: &UserId, handle: JoinHandle<()>) {
        if let Some(previous) = self.slots.insert(user.clone(), handle) {
            debug!(user = %user, "superseding pending retry");
            previous.abort();
        }
    }

    /// Discard the slot for `user` without aborting it (the retry ran, or
    /// the user's message was admitted directly).
    pub fn clear(&mut self, user: &UserId) {
        self.slots.remove(user);
    }

    pub fn pending(&self, user: &UserId) -> bool {
        self.slots.contains_key(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn second_schedule_supersedes_first() {
        let fired = Arc::new(AtomicUsize::new(0));
        let user = UserId::from("u1");
        let mut slots = RetrySlots::new();

        for _ in 0..2 {
            let fired = Arc::clone(&fired);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                fired.fetch_add(1, Ordering::SeqCst);
            });
            slots.schedule(&user, handle);
        }

        tokio::time::sleep(Duration::from_secs(10)).await;
        // The first handle was aborted; exactly one retry fired.
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(slots.pending(&user));
    }

    #[tokio::test(start_paused = true)]
    async fn slots_are_keyed_by_user() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut slots = RetrySlots::new();

        for name in ["u1", "u2"] {
            let fired = Arc::clone(&fired);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                fired.fetch_add(1, Ordering::SeqCst);
            });
            slots.schedule(&UserId::from(name), handle);
        }

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_leaves_the_task_running() {
        let fired = Arc::new(AtomicUsize::new(0));
        let user = UserId::from("u1");
        let mut slots = RetrySlots::new();

        let fired2 = Arc::clone(&fired);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        slots.schedule(&user, handle);
        slots.clear(&user);
        assert!(!slots.pending(&user));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
