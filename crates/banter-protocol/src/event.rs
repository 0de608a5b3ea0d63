//! Chat event records.
//!
//! A [`ChatEvent`] is the unified record for every kind of chat traffic:
//! public broadcasts, private messages, group messages, and system records
//! such as joins and leaves. The same shape is persisted in the durable log
//! and fanned out to subscribers, with the recipient and group fields
//! optional rather than split across separate schemas.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A unique, monotonically increasing event identifier assigned by the log.
pub type EventId = u64;

/// A group identifier.
pub type GroupId = u64;

/// Maximum content length in bytes for any chat event.
pub const MAX_CONTENT_LENGTH: usize = 2000;

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Discriminates the kinds of chat events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A regular chat message.
    Chat,
    /// A user joined (the public room or a group).
    Join,
    /// A user left (the public room or a group).
    Leave,
    /// A group was created.
    GroupCreated,
    /// A group was updated.
    GroupUpdated,
    /// A member was added to a group.
    MemberAdded,
    /// A member was removed from a group.
    MemberRemoved,
    /// A server-generated system message.
    System,
}

impl EventKind {
    /// Whether events of this kind are system records rather than user chat.
    #[must_use]
    pub fn is_system(self) -> bool {
        self != EventKind::Chat
    }
}

/// A chat event.
///
/// The `id` is assigned by the durable log on append (zero until then).
/// The `timestamp` is always stamped by the server; anything a client
/// supplies is discarded. `recipient` is set for private messages,
/// `group_id` for group-scoped events, and neither for public-room events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Log-assigned identifier (0 before persistence).
    #[serde(default)]
    pub id: EventId,
    /// Event kind.
    pub kind: EventKind,
    /// Sender identity.
    pub sender: String,
    /// Message content.
    pub content: String,
    /// Server-assigned timestamp in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Recipient identity for private messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Group identifier for group-scoped events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    /// Whether the content has been edited after persistence.
    #[serde(default)]
    pub edited: bool,
    /// When the content was last edited, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<u64>,
}

impl ChatEvent {
    fn new(kind: EventKind, sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: 0,
            kind,
            sender: sender.into(),
            content: content.into(),
            timestamp: now_millis(),
            recipient: None,
            group_id: None,
            edited: false,
            edited_at: None,
        }
    }

    /// Create a public-room event.
    #[must_use]
    pub fn public(kind: EventKind, sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(kind, sender, content)
    }

    /// Create a private message between two identities.
    #[must_use]
    pub fn private(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut event = Self::new(EventKind::Chat, sender, content);
        event.recipient = Some(recipient.into());
        event
    }

    /// Create a group-scoped event.
    #[must_use]
    pub fn group(
        kind: EventKind,
        sender: impl Into<String>,
        group_id: GroupId,
        content: impl Into<String>,
    ) -> Self {
        let mut event = Self::new(kind, sender, content);
        event.group_id = Some(group_id);
        event
    }

    /// Whether this is a private (point-to-point) event.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.recipient.is_some()
    }

    /// Whether this is a group-scoped event.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.group_id.is_some()
    }

    /// Whether this is a public-room event (no recipient, no group).
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.recipient.is_none() && self.group_id.is_none()
    }

    /// Whether the given identity may edit this event.
    ///
    /// Only the original sender may edit, and only regular chat messages.
    #[must_use]
    pub fn can_be_edited_by(&self, identity: &str) -> bool {
        self.sender == identity && self.kind == EventKind::Chat
    }
}

/// Summary of a group, carried in lifecycle notices and API responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    /// Group identifier.
    pub id: GroupId,
    /// Group name.
    pub name: String,
    /// Group description.
    pub description: String,
    /// Visibility kind (`public`, `private`, `restricted`).
    pub visibility: String,
    /// Maximum member count.
    pub max_members: usize,
    /// Current member count.
    pub member_count: usize,
    /// Owner identity.
    pub owner: String,
}

/// A tagged group-lifecycle notification.
///
/// Published on the fixed lifecycle topic so every client can keep its
/// group list current without polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum GroupNotice {
    /// A group was created.
    #[serde(rename = "GROUP_CREATED")]
    Created {
        /// The new group.
        group: GroupSummary,
    },

    /// A member was added to a group.
    #[serde(rename = "MEMBER_ADDED")]
    MemberAdded {
        /// The group after the change.
        group: GroupSummary,
        /// The added member.
        username: String,
    },

    /// A member was removed from a group.
    #[serde(rename = "MEMBER_REMOVED")]
    MemberRemoved {
        /// The group after the change.
        group: GroupSummary,
        /// The removed member.
        username: String,
    },
}
