use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::debug;

use charade_core::types::{ConversationId, Turn, UserId};

use crate::log::HistoryLog;
use crate::throttle::{RetrySlots, ThrottleState};

/// All mutable state owned by one conversation.
///
/// Writes are serialized per conversation through the contained mutexes;
/// the critical sections are short and never held across an await point.
pub struct ConversationSession {
    history: Mutex<HistoryLog>,
    throttle: Mutex<ThrottleState>,
    retries: Mutex<RetrySlots>,
    in_flight: AtomicBool,
    last_author: Mutex<Option<UserId>>,
}

impl ConversationSession {
    fn new(history_cap: usize) -> Self {
        Self {
            history: Mutex::new(HistoryLog::new(history_cap)),
            throttle: Mutex::new(ThrottleState::new()),
            retries: Mutex::new(RetrySlots::new()),
            in_flight: AtomicBool::new(false),
            last_author: Mutex::new(None),
        }
    }

    /// Append a turn and return its sequence number.
    pub fn append_turn(&self, speaker: &str, text: &str) -> u64 {
        self.history.lock().unwrap().append(speaker, text)
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap().len()
    }

    /// Budget-bounded history slice (oldest-fitting prefix).
    pub fn slice_within_budget<F>(&self, budget: usize, cost: F) -> Vec<Turn>
    where
        F: Fn(&str) -> usize,
    {
        self.history.lock().unwrap().slice_within_budget(budget, cost)
    }

    /// Run `f` with the throttle state locked.
    pub fn with_throttle<R>(&self, f: impl FnOnce(&mut ThrottleState) -> R) -> R {
        f(&mut self.throttle.lock().unwrap())
    }

    /// Store a deferred-retry handle for `user`, aborting any prior one.
    pub fn schedule_retry(&self, user: &UserId, handle: JoinHandle<()>) {
        self.retries.lock().unwrap().schedule(user, handle);
    }

    /// Drop the retry slot for `user` (its message was admitted).
    pub fn clear_retry(&self, user: &UserId) {
        self.retries.lock().unwrap().clear(user);
    }

    /// Try to claim the single in-flight completion slot.
    ///
    /// Returns `None` while another streaming call is active for this
    /// conversation. The returned guard releases the slot on drop, on every
    /// exit path.
    pub fn try_begin_completion(&self) -> Option<CompletionGuard<'_>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(CompletionGuard { session: self })
        } else {
            None
        }
    }

    pub fn set_last_author(&self, user: UserId) {
        *self.last_author.lock().unwrap() = Some(user);
    }

    /// The author of the most recent inbound turn, if any.
    pub fn last_author(&self) -> Option<UserId> {
        self.last_author.lock().unwrap().clone()
    }
}

/// RAII claim on a conversation's single streaming-completion slot.
pub struct CompletionGuard<'a> {
    session: &'a ConversationSession,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        self.session.in_flight.store(false, Ordering::Release);
    }
}

/// Mapping from `ConversationId` to its owned state object.
///
/// Injected into every pipeline operation; replaces process-wide mutable
/// maps so unit tests can run against isolated registries.
pub struct SessionRegistry {
    conversations: DashMap<ConversationId, Arc<ConversationSession>>,
    history_cap: usize,
}

impl SessionRegistry {
    pub fn new(history_cap: usize) -> Self {
        Self {
            conversations: DashMap::new(),
            history_cap,
        }
    }

    /// Return the session for `id`, creating it lazily on first contact.
    pub fn get_or_create(&self, id: &ConversationId) -> Arc<ConversationSession> {
        if let Some(existing) = self.conversations.get(id) {
            return Arc::clone(&existing);
        }
        debug!(conversation = %id, "creating conversation session");
        let session = Arc::new(ConversationSession::new(self.history_cap));
        self.conversations
            .entry(id.clone())
            .or_insert(session)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_same_session() {
        let registry = SessionRegistry::new(10);
        let id = ConversationId::from("room-1");
        let a = registry.get_or_create(&id);
        let b = registry.get_or_create(&id);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn conversations_are_isolated() {
        let registry = SessionRegistry::new(10);
        let a = registry.get_or_create(&ConversationId::from("room-a"));
        let b = registry.get_or_create(&ConversationId::from("room-b"));
        a.append_turn("alice", "hi");
        assert_eq!(a.history_len(), 1);
        assert_eq!(b.history_len(), 0);
    }

    #[test]
    fn completion_latch_admits_one() {
        let registry = SessionRegistry::new(10);
        let session = registry.get_or_create(&ConversationId::from("room"));

        let first = session.try_begin_completion();
        assert!(first.is_some());
        assert!(session.try_begin_completion().is_none());

        drop(first);
        assert!(session.try_begin_completion().is_some());
    }

    #[test]
    fn last_author_tracks_most_recent() {
        let registry = SessionRegistry::new(10);
        let session = registry.get_or_create(&ConversationId::from("room"));
        assert_eq!(session.last_author(), None);
        session.set_last_author(UserId::from("a"));
        session.set_last_author(UserId::from("b"));
        assert_eq!(session.last_author(), Some(UserId::from("b")));
    }
}
