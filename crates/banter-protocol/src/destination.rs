//! Deterministic destination naming.
//!
//! Destination names are part of the wire contract: a reconnecting client
//! must be able to derive the exact topic or queue name to resubscribe to
//! from nothing but a recipient identity or a group id.
//!
//! - public room: a single fixed topic
//! - private messages: one queue per recipient identity
//! - group messages: one topic per group id
//! - group lifecycle notices: a single fixed topic

use crate::event::GroupId;

/// The fixed public-room topic.
pub const PUBLIC_TOPIC: &str = "topic/public";

/// The fixed group-lifecycle topic.
pub const GROUP_LIFECYCLE_TOPIC: &str = "topic/groups.update";

/// The private queue for a recipient identity.
#[must_use]
pub fn private_queue(identity: &str) -> String {
    format!("queue/private.{identity}")
}

/// The topic for a group.
#[must_use]
pub fn group_topic(group_id: GroupId) -> String {
    format!("topic/group.{group_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_names() {
        assert_eq!(private_queue("bob"), "queue/private.bob");
        assert_eq!(group_topic(42), "topic/group.42");
        assert_eq!(PUBLIC_TOPIC, "topic/public");
        assert_eq!(GROUP_LIFECYCLE_TOPIC, "topic/groups.update");
    }
}
