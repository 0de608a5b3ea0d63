//! Frame types exchanged over a connection.
//!
//! Frames carry inbound chat operations from clients, subscription
//! management, and outbound deliveries from the server. Inbound message
//! frames may carry a client timestamp; the server discards it and stamps
//! its own.

use crate::event::GroupId;
use serde::{Deserialize, Serialize};

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Send a public-room chat message.
    #[serde(rename = "chat.send")]
    SendPublic {
        /// Sender identity.
        sender: String,
        /// Message content.
        content: String,
        /// Client timestamp; ignored by the server.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Announce a user joining the public room.
    #[serde(rename = "chat.add_user")]
    AddUser {
        /// Joining identity; bound to this connection's session.
        sender: String,
    },

    /// Send a private message to one recipient.
    #[serde(rename = "chat.private")]
    SendPrivate {
        /// Sender identity.
        sender: String,
        /// Recipient identity.
        recipient: String,
        /// Message content.
        content: String,
        /// Client timestamp; ignored by the server.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Send a message to a group.
    #[serde(rename = "group.send")]
    SendGroup {
        /// Sender identity.
        sender: String,
        /// Target group.
        group_id: GroupId,
        /// Message content.
        content: String,
        /// Client timestamp; ignored by the server.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Announce presence in a group (membership is managed separately).
    #[serde(rename = "group.join")]
    JoinGroup {
        /// Announcing identity.
        sender: String,
        /// Target group.
        group_id: GroupId,
    },

    /// Announce leaving a group (does not remove membership).
    #[serde(rename = "group.leave")]
    LeaveGroup {
        /// Announcing identity.
        sender: String,
        /// Target group.
        group_id: GroupId,
    },

    /// Subscribe this connection to a destination.
    #[serde(rename = "subscribe")]
    Subscribe {
        /// Topic or queue name.
        destination: String,
    },

    /// Unsubscribe this connection from a destination.
    #[serde(rename = "unsubscribe")]
    Unsubscribe {
        /// Topic or queue name.
        destination: String,
    },

    /// Connection established response.
    #[serde(rename = "connected")]
    Connected {
        /// Server-assigned session identifier.
        session_id: String,
    },

    /// A payload delivered from a subscribed destination.
    #[serde(rename = "deliver")]
    Deliver {
        /// The destination the payload was published on.
        destination: String,
        /// Encoded payload (a `ChatEvent` or `GroupNotice`).
        #[serde(with = "serde_bytes")]
        payload: Vec<u8>,
    },

    /// Error response.
    #[serde(rename = "error")]
    Error {
        /// Error code.
        code: u16,
        /// Human-readable error message.
        message: String,
    },
}

impl Frame {
    /// A short name for the frame variant, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::SendPublic { .. } => "chat.send",
            Frame::AddUser { .. } => "chat.add_user",
            Frame::SendPrivate { .. } => "chat.private",
            Frame::SendGroup { .. } => "group.send",
            Frame::JoinGroup { .. } => "group.join",
            Frame::LeaveGroup { .. } => "group.leave",
            Frame::Subscribe { .. } => "subscribe",
            Frame::Unsubscribe { .. } => "unsubscribe",
            Frame::Connected { .. } => "connected",
            Frame::Deliver { .. } => "deliver",
            Frame::Error { .. } => "error",
        }
    }

    /// Create a Connected frame.
    #[must_use]
    pub fn connected(session_id: impl Into<String>) -> Self {
        Frame::Connected {
            session_id: session_id.into(),
        }
    }

    /// Create a Deliver frame.
    #[must_use]
    pub fn deliver(destination: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Frame::Deliver {
            destination: destination.into(),
            payload: payload.into(),
        }
    }

    /// Create an Error frame.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            code,
            message: message.into(),
        }
    }

    /// Create a Subscribe frame.
    #[must_use]
    pub fn subscribe(destination: impl Into<String>) -> Self {
        Frame::Subscribe {
            destination: destination.into(),
        }
    }
}
