//! In-memory event log.
//!
//! Reference implementation of [`EventLog`] backed by a sorted vector.
//! Suitable for tests and single-process deployments; a persistent backend
//! implements the same trait against real storage.

use crate::log::{EventLog, LogError};
use async_trait::async_trait;
use banter_protocol::{ChatEvent, EventId, GroupId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

/// In-memory [`EventLog`].
///
/// Events are kept ordered by `(timestamp, id)` so every query reads a
/// slice in its natural order.
#[derive(Debug, Default)]
pub struct MemoryLog {
    events: RwLock<Vec<Arc<ChatEvent>>>,
    next_id: AtomicU64,
}

impl MemoryLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of events in the log.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Whether the log is empty.
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    async fn filtered<F>(&self, keep: F) -> Vec<Arc<ChatEvent>>
    where
        F: Fn(&ChatEvent) -> bool,
    {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| keep(e))
            .cloned()
            .collect()
    }
}

fn orders_before(a: &ChatEvent, b: &ChatEvent) -> bool {
    (a.timestamp, a.id) < (b.timestamp, b.id)
}

#[async_trait]
impl EventLog for MemoryLog {
    async fn append(&self, mut event: ChatEvent) -> Result<Arc<ChatEvent>, LogError> {
        if event.id == 0 {
            event.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        }
        let event = Arc::new(event);

        let mut events = self.events.write().await;
        // Appends arrive in near-timestamp order; walk back from the end to
        // keep the vec sorted when two writers raced on the clock.
        let mut pos = events.len();
        while pos > 0 && orders_before(&event, &events[pos - 1]) {
            pos -= 1;
        }
        events.insert(pos, Arc::clone(&event));

        trace!(id = event.id, kind = ?event.kind, "Event appended");
        Ok(event)
    }

    async fn history(&self) -> Result<Vec<Arc<ChatEvent>>, LogError> {
        Ok(self.events.read().await.to_vec())
    }

    async fn recent(&self, page: usize, size: usize) -> Result<Vec<Arc<ChatEvent>>, LogError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .rev()
            .skip(page.saturating_mul(size))
            .take(size)
            .cloned()
            .collect())
    }

    async fn public_history(&self) -> Result<Vec<Arc<ChatEvent>>, LogError> {
        Ok(self.filtered(ChatEvent::is_public).await)
    }

    async fn private_between(&self, a: &str, b: &str) -> Result<Vec<Arc<ChatEvent>>, LogError> {
        Ok(self
            .filtered(|e| {
                e.is_private()
                    && match e.recipient.as_deref() {
                        Some(r) => {
                            (e.sender == a && r == b) || (e.sender == b && r == a)
                        }
                        None => false,
                    }
            })
            .await)
    }

    async fn group_history(&self, group_id: GroupId) -> Result<Vec<Arc<ChatEvent>>, LogError> {
        Ok(self.filtered(|e| e.group_id == Some(group_id)).await)
    }

    async fn group_recent(
        &self,
        group_id: GroupId,
        limit: usize,
    ) -> Result<Vec<Arc<ChatEvent>>, LogError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .rev()
            .filter(|e| e.group_id == Some(group_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn group_since(
        &self,
        group_id: GroupId,
        since: u64,
    ) -> Result<Vec<Arc<ChatEvent>>, LogError> {
        Ok(self
            .filtered(|e| e.group_id == Some(group_id) && e.timestamp > since)
            .await)
    }

    async fn group_search(
        &self,
        group_id: GroupId,
        term: &str,
    ) -> Result<Vec<Arc<ChatEvent>>, LogError> {
        Ok(self
            .filtered(|e| e.group_id == Some(group_id) && e.content.contains(term))
            .await)
    }

    async fn group_count(&self, group_id: GroupId) -> Result<usize, LogError> {
        let events = self.events.read().await;
        Ok(events.iter().filter(|e| e.group_id == Some(group_id)).count())
    }

    async fn get(&self, id: EventId) -> Result<Arc<ChatEvent>, LogError> {
        self.events
            .read()
            .await
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(LogError::NotFound(id))
    }

    async fn set_content(
        &self,
        id: EventId,
        content: String,
        edited_at: u64,
    ) -> Result<Arc<ChatEvent>, LogError> {
        let mut events = self.events.write().await;
        let slot = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(LogError::NotFound(id))?;

        let mut edited = ChatEvent::clone(slot);
        edited.content = content;
        edited.edited = true;
        edited.edited_at = Some(edited_at);

        let edited = Arc::new(edited);
        *slot = Arc::clone(&edited);
        Ok(edited)
    }

    async fn remove(&self, id: EventId) -> Result<(), LogError> {
        let mut events = self.events.write().await;
        let pos = events
            .iter()
            .position(|e| e.id == id)
            .ok_or(LogError::NotFound(id))?;
        events.remove(pos);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_protocol::event::EventKind;

    fn public(sender: &str, content: &str) -> ChatEvent {
        ChatEvent::public(EventKind::Chat, sender, content)
    }

    #[tokio::test]
    async fn test_append_assigns_monotonic_ids() {
        let log = MemoryLog::new();
        let a = log.append(public("alice", "one")).await.unwrap();
        let b = log.append(public("alice", "two")).await.unwrap();
        assert!(a.id > 0);
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn test_history_ordering_and_tie_break() {
        let log = MemoryLog::new();
        // Same timestamp, ids break the tie by insertion order.
        let mut first = public("alice", "first");
        first.timestamp = 1000;
        let mut second = public("bob", "second");
        second.timestamp = 1000;
        log.append(first).await.unwrap();
        log.append(second).await.unwrap();

        let history = log.history().await.unwrap();
        assert_eq!(history[0].content, "first");
        assert_eq!(history[1].content, "second");

        // A late append with an older timestamp is filed in order.
        let mut early = public("carol", "earliest");
        early.timestamp = 500;
        log.append(early).await.unwrap();
        let history = log.history().await.unwrap();
        assert_eq!(history[0].content, "earliest");
    }

    #[tokio::test]
    async fn test_recent_pagination() {
        let log = MemoryLog::new();
        for i in 0..5 {
            let mut e = public("alice", &format!("msg-{i}"));
            e.timestamp = 1000 + i;
            log.append(e).await.unwrap();
        }

        let page0 = log.recent(0, 2).await.unwrap();
        assert_eq!(page0.len(), 2);
        assert_eq!(page0[0].content, "msg-4");
        assert_eq!(page0[1].content, "msg-3");

        let page2 = log.recent(2, 2).await.unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].content, "msg-0");
    }

    #[tokio::test]
    async fn test_public_and_private_filters() {
        let log = MemoryLog::new();
        log.append(public("alice", "to everyone")).await.unwrap();
        log.append(ChatEvent::private("alice", "bob", "psst"))
            .await
            .unwrap();
        log.append(ChatEvent::private("bob", "alice", "yes?"))
            .await
            .unwrap();
        log.append(ChatEvent::private("alice", "carol", "other"))
            .await
            .unwrap();
        log.append(ChatEvent::group(EventKind::Chat, "alice", 1, "in group"))
            .await
            .unwrap();

        let public_events = log.public_history().await.unwrap();
        assert_eq!(public_events.len(), 1);
        assert_eq!(public_events[0].content, "to everyone");

        // Both directions, argument order irrelevant.
        let pair = log.private_between("bob", "alice").await.unwrap();
        assert_eq!(pair.len(), 2);
        assert_eq!(pair[0].content, "psst");
        assert_eq!(pair[1].content, "yes?");
    }

    #[tokio::test]
    async fn test_group_queries() {
        let log = MemoryLog::new();
        for i in 0..3 {
            let mut e = ChatEvent::group(EventKind::Chat, "alice", 7, format!("g7-{i}"));
            e.timestamp = 1000 + i;
            log.append(e).await.unwrap();
        }
        log.append(ChatEvent::group(EventKind::Chat, "bob", 8, "g8"))
            .await
            .unwrap();

        assert_eq!(log.group_history(7).await.unwrap().len(), 3);
        assert_eq!(log.group_count(7).await.unwrap(), 3);

        let recent = log.group_recent(7, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "g7-2");

        // Strictly after.
        let since = log.group_since(7, 1000).await.unwrap();
        assert_eq!(since.len(), 2);

        let found = log.group_search(7, "7-1").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content, "g7-1");
    }

    #[tokio::test]
    async fn test_set_content_marks_edited() {
        let log = MemoryLog::new();
        let event = log.append(public("alice", "typo")).await.unwrap();
        let created_at = event.timestamp;

        let edited = log
            .set_content(event.id, "fixed".into(), created_at + 5)
            .await
            .unwrap();
        assert_eq!(edited.content, "fixed");
        assert!(edited.edited);
        assert_eq!(edited.edited_at, Some(created_at + 5));
        // Sender and creation timestamp are immutable.
        assert_eq!(edited.sender, "alice");
        assert_eq!(edited.timestamp, created_at);

        let fetched = log.get(event.id).await.unwrap();
        assert!(fetched.edited);
    }

    #[tokio::test]
    async fn test_remove_and_not_found() {
        let log = MemoryLog::new();
        let event = log.append(public("alice", "gone soon")).await.unwrap();

        log.remove(event.id).await.unwrap();
        assert!(matches!(
            log.get(event.id).await,
            Err(LogError::NotFound(_))
        ));
        assert!(matches!(
            log.remove(event.id).await,
            Err(LogError::NotFound(_))
        ));
    }
}
