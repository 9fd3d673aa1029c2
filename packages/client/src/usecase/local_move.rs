//! Echo suppression for locally moved reservations.
//!
//! When the user drags a reservation, the calendar is updated optimistically
//! and a mutation is sent. The server then broadcasts the same change back.
//! Applying that echo while the drag is still settling would snap the event
//! back and forth, so the echo is dropped once if it arrives within the
//! window.

use std::{collections::HashMap, sync::Arc};

use yoyaku_shared::time::Clock;

use crate::{config::DEFAULT_SUPPRESSION_WINDOW_MS, domain::EventId};

/// TTL cache of recently moved events
pub struct LocalMoveRegistry {
    clock: Arc<dyn Clock>,
    window_ms: i64,
    /// Expiry timestamp (ms) per event
    marks: HashMap<EventId, i64>,
}

impl LocalMoveRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_window(clock, DEFAULT_SUPPRESSION_WINDOW_MS)
    }

    pub fn with_window(clock: Arc<dyn Clock>, window_ms: i64) -> Self {
        Self {
            clock,
            window_ms,
            marks: HashMap::new(),
        }
    }

    /// Record a local optimistic move
    pub fn mark_moved(&mut self, id: EventId) {
        self.purge_expired();
        let expires_at = self.clock.now_millis() + self.window_ms;
        tracing::debug!("Marked '{}' as locally moved until {}", id, expires_at);
        self.marks.insert(id, expires_at);
    }

    pub fn is_recently_moved(&self, id: &EventId) -> bool {
        let now = self.clock.now_millis();
        self.marks.get(id).is_some_and(|expires_at| now < *expires_at)
    }

    /// Whether a remote update for `id` is the echo of a local move.
    ///
    /// Only one message is dropped per mark.
    pub fn should_suppress(&mut self, id: &EventId, drag_in_progress: bool) -> bool {
        self.purge_expired();
        if drag_in_progress && self.is_recently_moved(id) {
            self.marks.remove(id);
            return true;
        }
        false
    }

    pub fn purge_expired(&mut self) {
        let now = self.clock.now_millis();
        self.marks.retain(|_, expires_at| now < *expires_at);
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yoyaku_shared::time::ManualClock;

    fn registry() -> (Arc<ManualClock>, LocalMoveRegistry) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let registry = LocalMoveRegistry::new(clock.clone());
        (clock, registry)
    }

    #[test]
    fn test_echo_within_window_is_suppressed_once() {
        // テスト項目: ドラッグ中に窓内で届いた自分の更新は 1 回だけ抑止される
        // given (前提条件):
        let (clock, mut registry) = registry();
        let id = EventId::new("42");
        registry.mark_moved(id.clone());
        clock.advance(300);

        // when (操作):
        let first = registry.should_suppress(&id, true);
        let second = registry.should_suppress(&id, true);

        // then (期待する結果):
        assert!(first);
        assert!(!second);
    }

    #[test]
    fn test_echo_is_applied_without_drag() {
        // テスト項目: ドラッグ中でなければ印があっても抑止しない
        // given (前提条件):
        let (_clock, mut registry) = registry();
        let id = EventId::new("42");
        registry.mark_moved(id.clone());

        // when (操作):
        let suppressed = registry.should_suppress(&id, false);

        // then (期待する結果):
        assert!(!suppressed);
        assert!(registry.is_recently_moved(&id));
    }

    #[test]
    fn test_mark_expires_after_window() {
        // テスト項目: 窓（1000ms）を過ぎた印は無効になり遅延削除される
        // given (前提条件):
        let (clock, mut registry) = registry();
        let id = EventId::new("42");
        registry.mark_moved(id.clone());

        // when (操作):
        clock.advance(1_000);

        // then (期待する結果):
        assert!(!registry.is_recently_moved(&id));
        assert!(!registry.should_suppress(&id, true));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_marks_are_per_event() {
        // テスト項目: 他のイベントの印では抑止されない
        // given (前提条件):
        let (_clock, mut registry) = registry();
        registry.mark_moved(EventId::new("1"));

        // when (操作):
        let suppressed = registry.should_suppress(&EventId::new("2"), true);

        // then (期待する結果):
        assert!(!suppressed);
        assert_eq!(registry.len(), 1);
    }
}
