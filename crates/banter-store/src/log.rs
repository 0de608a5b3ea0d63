//! The event log contract.

use async_trait::async_trait;
use banter_protocol::{ChatEvent, EventId, GroupId};
use std::sync::Arc;
use thiserror::Error;

/// Log errors.
#[derive(Debug, Error)]
pub enum LogError {
    /// No event with the given id.
    #[error("Event not found: {0}")]
    NotFound(EventId),

    /// The storage backend failed.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Append/query service for chat events.
///
/// All query results are ordered by event timestamp, ties broken by the
/// monotonic event id. Implementations must not require callers to hold any
/// lock across calls, and must not hold internal locks across backend I/O.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Persist an event, assigning an id if it does not have one yet.
    ///
    /// Returns the persisted event.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    async fn append(&self, event: ChatEvent) -> Result<Arc<ChatEvent>, LogError>;

    /// Full history, ascending by time.
    async fn history(&self) -> Result<Vec<Arc<ChatEvent>>, LogError>;

    /// Paginated recent events, descending by time.
    async fn recent(&self, page: usize, size: usize) -> Result<Vec<Arc<ChatEvent>>, LogError>;

    /// Public-room events only (no recipient, no group), ascending.
    async fn public_history(&self) -> Result<Vec<Arc<ChatEvent>>, LogError>;

    /// Private events between two identities, either direction, ascending.
    async fn private_between(&self, a: &str, b: &str) -> Result<Vec<Arc<ChatEvent>>, LogError>;

    /// All events of a group, ascending.
    async fn group_history(&self, group_id: GroupId) -> Result<Vec<Arc<ChatEvent>>, LogError>;

    /// The most recent `limit` events of a group, descending.
    async fn group_recent(
        &self,
        group_id: GroupId,
        limit: usize,
    ) -> Result<Vec<Arc<ChatEvent>>, LogError>;

    /// Group events strictly after the given timestamp, ascending.
    async fn group_since(
        &self,
        group_id: GroupId,
        since: u64,
    ) -> Result<Vec<Arc<ChatEvent>>, LogError>;

    /// Group events whose content contains the given substring, ascending.
    async fn group_search(
        &self,
        group_id: GroupId,
        term: &str,
    ) -> Result<Vec<Arc<ChatEvent>>, LogError>;

    /// Number of events persisted for a group.
    async fn group_count(&self, group_id: GroupId) -> Result<usize, LogError>;

    /// Look up a single event by id.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::NotFound`] if no such event exists.
    async fn get(&self, id: EventId) -> Result<Arc<ChatEvent>, LogError>;

    /// Replace the content of an event in place, marking it edited.
    ///
    /// This is the only permitted mutation of a persisted event; sender,
    /// kind, and creation timestamp are immutable.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::NotFound`] if no such event exists.
    async fn set_content(
        &self,
        id: EventId,
        content: String,
        edited_at: u64,
    ) -> Result<Arc<ChatEvent>, LogError>;

    /// Remove an event.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::NotFound`] if no such event exists.
    async fn remove(&self, id: EventId) -> Result<(), LogError>;
}
