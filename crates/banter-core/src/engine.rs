//! The message routing and authorization engine.
//!
//! The engine is a stateless validator/dispatcher invoked once per inbound
//! event. Each event is validated against the current directory, presence,
//! and membership state, persisted to the durable log, and only then fanned
//! out through the broker. The engine holds no authoritative copies of any
//! state; it keeps only the session-to-identity bindings needed to resolve
//! disconnects.
//!
//! Validation failures that originate from a stale or malicious client
//! (unknown sender, not a member, group missing) are logged and the event
//! is dropped; broker fan-out has no per-message acknowledgment channel
//! back to the origin, so no error is surfaced to any topic.
//! Administrative operations surface typed errors synchronously instead.

use crate::broker::Broker;
use crate::directory::{DirectoryError, UserDirectory};
use crate::group::{Group, GroupError, GroupRegistry, GroupUpdate, Visibility};
use crate::presence::PresenceRegistry;
use banter_protocol::codec;
use banter_protocol::destination::{
    group_topic, private_queue, GROUP_LIFECYCLE_TOPIC, PUBLIC_TOPIC,
};
use banter_protocol::event::{now_millis, MAX_CONTENT_LENGTH};
use banter_protocol::{ChatEvent, EventId, EventKind, GroupId, GroupNotice};
use banter_store::{EventLog, LogError};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Engine errors, surfaced by administrative and read operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Group/membership failure.
    #[error(transparent)]
    Group(#[from] GroupError),

    /// Identity directory failure.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Durable log failure.
    #[error(transparent)]
    Storage(#[from] LogError),

    /// Authorization failure.
    #[error("Not allowed to {0}")]
    Forbidden(&'static str),

    /// Malformed request.
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum event content length in bytes.
    pub max_content_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_content_length: MAX_CONTENT_LENGTH,
        }
    }
}

/// The routing engine.
pub struct RoutingEngine {
    directory: Arc<UserDirectory>,
    presence: Arc<PresenceRegistry>,
    groups: Arc<GroupRegistry>,
    log: Arc<dyn EventLog>,
    broker: Arc<dyn Broker>,
    /// Session id -> bound identity, for disconnect handling.
    sessions: DashMap<String, String>,
    config: EngineConfig,
}

impl RoutingEngine {
    /// Create an engine with default configuration.
    pub fn new(
        directory: Arc<UserDirectory>,
        presence: Arc<PresenceRegistry>,
        groups: Arc<GroupRegistry>,
        log: Arc<dyn EventLog>,
        broker: Arc<dyn Broker>,
    ) -> Self {
        Self::with_config(directory, presence, groups, log, broker, EngineConfig::default())
    }

    /// Create an engine with custom configuration.
    pub fn with_config(
        directory: Arc<UserDirectory>,
        presence: Arc<PresenceRegistry>,
        groups: Arc<GroupRegistry>,
        log: Arc<dyn EventLog>,
        broker: Arc<dyn Broker>,
        config: EngineConfig,
    ) -> Self {
        Self {
            directory,
            presence,
            groups,
            log,
            broker,
            sessions: DashMap::new(),
            config,
        }
    }

    /// Number of sessions with a bound identity.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn content_ok(&self, content: &str) -> bool {
        if content.len() > self.config.max_content_length {
            warn!(
                length = content.len(),
                max = self.config.max_content_length,
                "Dropping event with oversized content"
            );
            return false;
        }
        true
    }

    /// Persist an event, then fan it out to the given destinations.
    ///
    /// Persistence happens-before publish: if the append fails the event is
    /// dropped and never fanned out (at-most-once, no retry).
    async fn persist_and_publish(
        &self,
        event: ChatEvent,
        destinations: &[String],
    ) -> Option<Arc<ChatEvent>> {
        let event = match self.log.append(event).await {
            Ok(event) => event,
            Err(e) => {
                error!(error = %e, "Failed to persist event; dropping");
                return None;
            }
        };

        let payload = match codec::encode_payload(event.as_ref()) {
            Ok(payload) => payload,
            Err(e) => {
                error!(id = event.id, error = %e, "Failed to encode event; not delivered");
                return Some(event);
            }
        };

        for destination in destinations {
            match self.broker.publish(destination, payload.clone()).await {
                Ok(count) => {
                    debug!(id = event.id, destination = %destination, recipients = count, "Fanned out")
                }
                Err(e) => error!(destination = %destination, error = %e, "Fan-out failed"),
            }
        }

        Some(event)
    }

    async fn publish_notice(&self, notice: &GroupNotice) {
        let payload = match codec::encode_payload(notice) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to encode group notice");
                return;
            }
        };
        if let Err(e) = self.broker.publish(GROUP_LIFECYCLE_TOPIC, payload).await {
            error!(error = %e, "Failed to publish group notice");
        }
    }

    // ---- Routing operations -------------------------------------------------
    //
    // These return `None` when the event was dropped; the reason is logged.

    /// Route a public-room chat message.
    pub async fn send_public_message(
        &self,
        sender: &str,
        content: &str,
    ) -> Option<Arc<ChatEvent>> {
        if !self.content_ok(content) {
            return None;
        }

        let event = ChatEvent::public(EventKind::Chat, sender, content);
        self.persist_and_publish(event, &[PUBLIC_TOPIC.to_string()])
            .await
    }

    /// Handle a user joining the public room.
    ///
    /// Binds the identity to the originating session so the eventual
    /// disconnect can be resolved back to it.
    pub async fn add_user(&self, session_id: &str, identity: &str) -> Option<Arc<ChatEvent>> {
        if identity.trim().is_empty() {
            warn!(session = %session_id, "Dropping add_user with blank identity");
            return None;
        }

        self.sessions
            .insert(session_id.to_string(), identity.to_string());
        self.presence.add_user(identity);
        self.directory.set_online(identity, true);
        info!(identity = %identity, session = %session_id, "User joined the public room");

        let event = ChatEvent::public(
            EventKind::Join,
            identity,
            format!("{identity} joined the chat"),
        );
        self.persist_and_publish(event, &[PUBLIC_TOPIC.to_string()])
            .await
    }

    /// Route a private message.
    ///
    /// Fans out to the recipient's queue and to the sender's own queue, so
    /// the sender's other connected clients see their outbound message.
    pub async fn send_private_message(
        &self,
        sender: &str,
        recipient: &str,
        content: &str,
    ) -> Option<Arc<ChatEvent>> {
        if recipient.trim().is_empty() {
            warn!(sender = %sender, "Dropping private message without recipient");
            return None;
        }
        if !self.content_ok(content) {
            return None;
        }

        let event = ChatEvent::private(sender, recipient, content);
        self.persist_and_publish(event, &[private_queue(recipient), private_queue(sender)])
            .await
    }

    /// Route a group chat message.
    ///
    /// The sender must be a known identity and a current member of an
    /// active group; otherwise the event is dropped with a warning.
    pub async fn send_group_message(
        &self,
        sender: &str,
        group_id: GroupId,
        content: &str,
    ) -> Option<Arc<ChatEvent>> {
        if !self.content_ok(content) {
            return None;
        }
        if !self.directory.validate(sender) {
            warn!(sender = %sender, group = group_id, "Dropping group message from unknown sender");
            return None;
        }
        if self.groups.get(group_id).is_none() {
            warn!(sender = %sender, group = group_id, "Dropping group message for missing group");
            return None;
        }
        if !self.groups.is_member(group_id, sender) {
            warn!(sender = %sender, group = group_id, "Dropping group message from non-member");
            return None;
        }

        let event = ChatEvent::group(EventKind::Chat, sender, group_id, content);
        self.persist_and_publish(event, &[group_topic(group_id)])
            .await
    }

    /// Handle a group join announcement.
    ///
    /// Membership is established through [`RoutingEngine::add_member`]; this
    /// event only announces presence in the group's topic.
    pub async fn join_group(&self, sender: &str, group_id: GroupId) -> Option<Arc<ChatEvent>> {
        if !self.groups.is_member(group_id, sender) {
            warn!(sender = %sender, group = group_id, "Dropping group join from non-member");
            return None;
        }

        self.presence.add_user(sender);
        self.directory.set_online(sender, true);

        let event = ChatEvent::group(
            EventKind::Join,
            sender,
            group_id,
            format!("{sender} joined the group"),
        );
        self.persist_and_publish(event, &[group_topic(group_id)])
            .await
    }

    /// Handle a group leave announcement.
    ///
    /// Does not remove membership; that is the separate
    /// [`RoutingEngine::remove_member`] operation.
    pub async fn leave_group(&self, sender: &str, group_id: GroupId) -> Option<Arc<ChatEvent>> {
        if self.groups.get(group_id).is_none() {
            warn!(sender = %sender, group = group_id, "Dropping group leave for missing group");
            return None;
        }

        let event = ChatEvent::group(
            EventKind::Leave,
            sender,
            group_id,
            format!("{sender} left the group"),
        );
        self.persist_and_publish(event, &[group_topic(group_id)])
            .await
    }

    /// Handle a session-end signal.
    ///
    /// If the session carries a bound identity, takes it offline and
    /// announces the departure in the public room.
    pub async fn disconnect(&self, session_id: &str) -> Option<Arc<ChatEvent>> {
        let (_, identity) = self.sessions.remove(session_id)?;

        self.presence.remove_user(&identity);
        self.directory.set_online(&identity, false);
        info!(identity = %identity, session = %session_id, "User disconnected");

        let event = ChatEvent::public(
            EventKind::Leave,
            &identity,
            format!("{identity} left the chat"),
        );
        self.persist_and_publish(event, &[PUBLIC_TOPIC.to_string()])
            .await
    }

    // ---- Message editing ----------------------------------------------------

    /// Edit a persisted chat message in place.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Forbidden`] unless the editor is the original
    /// sender and the event is a regular chat message.
    pub async fn edit_message(
        &self,
        id: EventId,
        new_content: &str,
        editor: &str,
    ) -> Result<Arc<ChatEvent>, EngineError> {
        if new_content.len() > self.config.max_content_length {
            return Err(EngineError::InvalidArgument("content too long"));
        }

        let event = self.log.get(id).await?;
        if !event.can_be_edited_by(editor) {
            return Err(EngineError::Forbidden("edit this message"));
        }

        let edited = self
            .log
            .set_content(id, new_content.to_string(), now_millis())
            .await?;
        info!(id, editor = %editor, "Message edited");
        Ok(edited)
    }

    /// Delete a persisted message.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Forbidden`] unless the requester is the sender
    /// or the owner of the group the message belongs to.
    pub async fn delete_message(&self, id: EventId, requester: &str) -> Result<(), EngineError> {
        let event = self.log.get(id).await?;

        let allowed = event.sender == requester
            || event
                .group_id
                .is_some_and(|g| self.groups.is_owner(g, requester));
        if !allowed {
            return Err(EngineError::Forbidden("delete this message"));
        }

        self.log.remove(id).await?;
        info!(id, requester = %requester, "Message deleted");
        Ok(())
    }

    // ---- Group administration -----------------------------------------------

    /// Create a group and announce it on the lifecycle topic.
    ///
    /// # Errors
    ///
    /// Returns a directory error for unknown owners or a group error for
    /// duplicate/invalid names.
    pub async fn create_group(
        &self,
        name: &str,
        description: &str,
        owner: &str,
        visibility: Visibility,
        max_members: Option<usize>,
    ) -> Result<Group, EngineError> {
        if !self.directory.validate(owner) {
            return Err(DirectoryError::NotFound(owner.to_string()).into());
        }

        let group = self
            .groups
            .create(name, description, owner, visibility, max_members)?;
        self.publish_notice(&GroupNotice::Created {
            group: group.summary(),
        })
        .await;
        Ok(group)
    }

    /// Add a member and announce it on the lifecycle topic.
    ///
    /// # Errors
    ///
    /// Returns a directory error for unknown identities or a group error
    /// for missing/full groups and duplicate members.
    pub async fn add_member(
        &self,
        group_id: GroupId,
        identity: &str,
    ) -> Result<Group, EngineError> {
        if !self.directory.validate(identity) {
            return Err(DirectoryError::NotFound(identity.to_string()).into());
        }

        let group = self.groups.add_member(group_id, identity)?;
        self.publish_notice(&GroupNotice::MemberAdded {
            group: group.summary(),
            username: identity.to_string(),
        })
        .await;
        Ok(group)
    }

    /// Remove a member and announce it on the lifecycle topic.
    ///
    /// # Errors
    ///
    /// Returns a group error; removing the owner yields
    /// [`GroupError::OwnerCannotLeave`].
    pub async fn remove_member(
        &self,
        group_id: GroupId,
        identity: &str,
    ) -> Result<Group, EngineError> {
        let group = self.groups.remove_member(group_id, identity)?;
        self.publish_notice(&GroupNotice::MemberRemoved {
            group: group.summary(),
            username: identity.to_string(),
        })
        .await;
        Ok(group)
    }

    /// Update a group's name, description, or capacity. Owner only.
    ///
    /// # Errors
    ///
    /// Returns a group error on authorization or constraint failure.
    pub fn update_group(
        &self,
        group_id: GroupId,
        requester: &str,
        update: GroupUpdate,
    ) -> Result<Group, EngineError> {
        Ok(self.groups.update(group_id, requester, update)?)
    }

    /// Soft-delete a group. Owner only.
    ///
    /// # Errors
    ///
    /// Returns a group error on authorization failure.
    pub fn deactivate_group(&self, group_id: GroupId, requester: &str) -> Result<(), EngineError> {
        Ok(self.groups.deactivate(group_id, requester)?)
    }

    // ---- Read-side queries --------------------------------------------------

    fn require_membership(&self, group_id: GroupId, requester: &str) -> Result<(), EngineError> {
        let group = self
            .groups
            .get(group_id)
            .ok_or(GroupError::NotFound(group_id))?;
        if !group.is_member(requester) {
            return Err(GroupError::NotMember(requester.to_string()).into());
        }
        Ok(())
    }

    /// Full history, ascending.
    pub async fn history(&self) -> Result<Vec<Arc<ChatEvent>>, EngineError> {
        Ok(self.log.history().await?)
    }

    /// Paginated recent history, descending.
    pub async fn recent(
        &self,
        page: usize,
        size: usize,
    ) -> Result<Vec<Arc<ChatEvent>>, EngineError> {
        Ok(self.log.recent(page, size).await?)
    }

    /// Public-room history, ascending.
    pub async fn public_history(&self) -> Result<Vec<Arc<ChatEvent>>, EngineError> {
        Ok(self.log.public_history().await?)
    }

    /// Private history between two identities, ascending.
    pub async fn private_history(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Vec<Arc<ChatEvent>>, EngineError> {
        Ok(self.log.private_between(a, b).await?)
    }

    /// Group history; requester must be a member.
    pub async fn group_history(
        &self,
        group_id: GroupId,
        requester: &str,
    ) -> Result<Vec<Arc<ChatEvent>>, EngineError> {
        self.require_membership(group_id, requester)?;
        Ok(self.log.group_history(group_id).await?)
    }

    /// Recent group messages; requester must be a member.
    pub async fn group_recent(
        &self,
        group_id: GroupId,
        requester: &str,
        limit: usize,
    ) -> Result<Vec<Arc<ChatEvent>>, EngineError> {
        self.require_membership(group_id, requester)?;
        Ok(self.log.group_recent(group_id, limit).await?)
    }

    /// Group messages strictly after a timestamp; requester must be a member.
    pub async fn group_since(
        &self,
        group_id: GroupId,
        requester: &str,
        since: u64,
    ) -> Result<Vec<Arc<ChatEvent>>, EngineError> {
        self.require_membership(group_id, requester)?;
        Ok(self.log.group_since(group_id, since).await?)
    }

    /// Search group messages by content substring; requester must be a member.
    pub async fn group_search(
        &self,
        group_id: GroupId,
        requester: &str,
        term: &str,
    ) -> Result<Vec<Arc<ChatEvent>>, EngineError> {
        self.require_membership(group_id, requester)?;
        Ok(self.log.group_search(group_id, term).await?)
    }

    /// Number of persisted events for an active group.
    pub async fn group_count(&self, group_id: GroupId) -> Result<usize, EngineError> {
        self.groups
            .get(group_id)
            .ok_or(GroupError::NotFound(group_id))?;
        Ok(self.log.group_count(group_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InProcessBroker;
    use banter_store::MemoryLog;
    use tokio::sync::broadcast::error::TryRecvError;

    struct Harness {
        engine: RoutingEngine,
        broker: Arc<InProcessBroker>,
        log: Arc<MemoryLog>,
        directory: Arc<UserDirectory>,
        presence: Arc<PresenceRegistry>,
        groups: Arc<GroupRegistry>,
    }

    fn harness() -> Harness {
        let directory = Arc::new(UserDirectory::new());
        let presence = Arc::new(PresenceRegistry::new());
        let groups = Arc::new(GroupRegistry::new());
        let log = Arc::new(MemoryLog::new());
        let broker = Arc::new(InProcessBroker::new());

        let engine = RoutingEngine::new(
            Arc::clone(&directory),
            Arc::clone(&presence),
            Arc::clone(&groups),
            Arc::clone(&log) as Arc<dyn EventLog>,
            Arc::clone(&broker) as Arc<dyn Broker>,
        );

        Harness {
            engine,
            broker,
            log,
            directory,
            presence,
            groups,
        }
    }

    fn decode_event(delivery: &Arc<crate::broker::Delivery>) -> ChatEvent {
        codec::decode_payload(&delivery.payload).unwrap()
    }

    #[tokio::test]
    async fn test_public_message_persist_before_publish() {
        let h = harness();
        let mut rx = h.broker.subscribe(PUBLIC_TOPIC).unwrap();

        let event = h
            .engine
            .send_public_message("alice", "hello everyone")
            .await
            .unwrap();

        // History issued right after the call includes the event.
        let history = h.log.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, event.id);

        let delivered = decode_event(&rx.recv().await.unwrap());
        assert_eq!(delivered.id, event.id);
        assert_eq!(delivered.content, "hello everyone");
        assert_eq!(delivered.kind, EventKind::Chat);
    }

    #[tokio::test]
    async fn test_oversized_content_dropped() {
        let h = harness();
        let huge = "x".repeat(MAX_CONTENT_LENGTH + 1);
        assert!(h.engine.send_public_message("alice", &huge).await.is_none());
        assert!(h.log.is_empty().await);
    }

    #[tokio::test]
    async fn test_add_user_and_disconnect() {
        let h = harness();
        h.directory.register("alice").unwrap();
        let mut rx = h.broker.subscribe(PUBLIC_TOPIC).unwrap();

        let joined = h.engine.add_user("sess-1", "alice").await.unwrap();
        assert_eq!(joined.kind, EventKind::Join);
        assert!(h.presence.is_online("alice"));
        assert!(h.directory.get("alice").unwrap().online);
        assert_eq!(h.engine.session_count(), 1);
        assert_eq!(decode_event(&rx.recv().await.unwrap()).kind, EventKind::Join);

        let left = h.engine.disconnect("sess-1").await.unwrap();
        assert_eq!(left.kind, EventKind::Leave);
        assert!(!h.presence.is_online("alice"));
        assert_eq!(h.engine.session_count(), 0);
        assert!(!h.directory.get("alice").unwrap().online);

        // A session with no bound identity disconnects silently.
        assert!(h.engine.disconnect("sess-unknown").await.is_none());
    }

    #[tokio::test]
    async fn test_private_message_fans_out_to_both_queues() {
        let h = harness();
        let mut bob_rx = h.broker.subscribe("queue/private.bob").unwrap();
        let mut alice_rx = h.broker.subscribe("queue/private.alice").unwrap();

        h.engine
            .send_private_message("alice", "bob", "hi")
            .await
            .unwrap();

        let history = h.log.private_between("alice", "bob").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sender, "alice");
        assert_eq!(history[0].recipient.as_deref(), Some("bob"));

        assert_eq!(decode_event(&bob_rx.recv().await.unwrap()).content, "hi");
        assert_eq!(decode_event(&alice_rx.recv().await.unwrap()).content, "hi");
    }

    #[tokio::test]
    async fn test_group_message_from_non_member_dropped() {
        let h = harness();
        h.directory.register("alice").unwrap();
        h.directory.register("dave").unwrap();
        let group = h
            .groups
            .create("devs", "", "alice", Visibility::Public, Some(10))
            .unwrap();
        let mut rx = h.broker.subscribe(&group_topic(group.id)).unwrap();

        let result = h.engine.send_group_message("dave", group.id, "let me in").await;

        assert!(result.is_none());
        assert!(h.log.is_empty().await);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_group_message_unknown_sender_and_missing_group() {
        let h = harness();
        h.directory.register("alice").unwrap();
        let group = h
            .groups
            .create("devs", "", "alice", Visibility::Public, None)
            .unwrap();

        // Sender never registered.
        assert!(h
            .engine
            .send_group_message("ghost", group.id, "boo")
            .await
            .is_none());
        // Group does not exist.
        assert!(h
            .engine
            .send_group_message("alice", 999, "anyone?")
            .await
            .is_none());
        assert!(h.log.is_empty().await);
    }

    #[tokio::test]
    async fn test_group_message_success() {
        let h = harness();
        h.directory.register("alice").unwrap();
        let group = h
            .groups
            .create("devs", "", "alice", Visibility::Public, None)
            .unwrap();
        let mut rx = h.broker.subscribe(&group_topic(group.id)).unwrap();

        let event = h
            .engine
            .send_group_message("alice", group.id, "ship it")
            .await
            .unwrap();
        assert_eq!(event.group_id, Some(group.id));

        assert_eq!(h.log.group_count(group.id).await.unwrap(), 1);
        assert_eq!(decode_event(&rx.recv().await.unwrap()).content, "ship it");
    }

    #[tokio::test]
    async fn test_join_group_announcement() {
        let h = harness();
        h.directory.register("alice").unwrap();
        h.directory.register("bob").unwrap();
        let group = h
            .groups
            .create("devs", "", "alice", Visibility::Public, None)
            .unwrap();

        // bob is not a member yet: announcement dropped.
        assert!(h.engine.join_group("bob", group.id).await.is_none());

        h.groups.add_member(group.id, "bob").unwrap();
        let event = h.engine.join_group("bob", group.id).await.unwrap();
        assert_eq!(event.kind, EventKind::Join);
        assert!(h.presence.is_online("bob"));
        assert!(h.directory.get("bob").unwrap().online);
    }

    #[tokio::test]
    async fn test_leave_group_keeps_membership() {
        let h = harness();
        h.directory.register("alice").unwrap();
        h.directory.register("bob").unwrap();
        let group = h
            .groups
            .create("devs", "", "alice", Visibility::Public, None)
            .unwrap();
        h.groups.add_member(group.id, "bob").unwrap();

        let event = h.engine.leave_group("bob", group.id).await.unwrap();
        assert_eq!(event.kind, EventKind::Leave);

        // The announcement does not mutate membership.
        assert!(h.groups.is_member(group.id, "bob"));
    }

    #[tokio::test]
    async fn test_edit_message_rules() {
        let h = harness();
        h.directory.register("alice").unwrap();
        let group = h
            .groups
            .create("devs", "", "alice", Visibility::Public, None)
            .unwrap();

        let event = h
            .engine
            .send_group_message("alice", group.id, "tpyo")
            .await
            .unwrap();

        assert!(matches!(
            h.engine.edit_message(event.id, "nope", "bob").await,
            Err(EngineError::Forbidden(_))
        ));

        let edited = h
            .engine
            .edit_message(event.id, "typo", "alice")
            .await
            .unwrap();
        assert!(edited.edited);
        assert_eq!(edited.sender, "alice");
        assert_eq!(edited.timestamp, event.timestamp);

        // System records cannot be edited, even by their sender.
        let join = h.engine.join_group("alice", group.id).await.unwrap();
        assert!(matches!(
            h.engine.edit_message(join.id, "hm", "alice").await,
            Err(EngineError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_message_rules() {
        let h = harness();
        h.directory.register("alice").unwrap();
        h.directory.register("bob").unwrap();
        h.directory.register("carol").unwrap();
        let group = h
            .groups
            .create("devs", "", "alice", Visibility::Public, None)
            .unwrap();
        h.groups.add_member(group.id, "bob").unwrap();
        h.groups.add_member(group.id, "carol").unwrap();

        let event = h
            .engine
            .send_group_message("bob", group.id, "delete me")
            .await
            .unwrap();

        // A bystander may not delete.
        assert!(matches!(
            h.engine.delete_message(event.id, "carol").await,
            Err(EngineError::Forbidden(_))
        ));

        // The group owner may delete another member's message.
        h.engine.delete_message(event.id, "alice").await.unwrap();
        assert!(matches!(
            h.engine.delete_message(event.id, "bob").await,
            Err(EngineError::Storage(LogError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_create_group_publishes_lifecycle_notice() {
        let h = harness();
        h.directory.register("alice").unwrap();
        h.directory.register("bob").unwrap();
        let mut rx = h.broker.subscribe(GROUP_LIFECYCLE_TOPIC).unwrap();

        let group = h
            .engine
            .create_group("devs", "dev talk", "alice", Visibility::Public, Some(5))
            .await
            .unwrap();

        let notice: GroupNotice = codec::decode_payload(&rx.recv().await.unwrap().payload).unwrap();
        match notice {
            GroupNotice::Created { group: summary } => {
                assert_eq!(summary.id, group.id);
                assert_eq!(summary.owner, "alice");
                assert_eq!(summary.member_count, 1);
            }
            other => panic!("unexpected notice: {other:?}"),
        }

        h.engine.add_member(group.id, "bob").await.unwrap();
        let notice: GroupNotice = codec::decode_payload(&rx.recv().await.unwrap().payload).unwrap();
        assert!(matches!(notice, GroupNotice::MemberAdded { username, .. } if username == "bob"));

        h.engine.remove_member(group.id, "bob").await.unwrap();
        let notice: GroupNotice = codec::decode_payload(&rx.recv().await.unwrap().payload).unwrap();
        assert!(matches!(notice, GroupNotice::MemberRemoved { username, .. } if username == "bob"));
    }

    #[tokio::test]
    async fn test_membership_gated_reads() {
        let h = harness();
        h.directory.register("alice").unwrap();
        h.directory.register("dave").unwrap();
        let group = h
            .groups
            .create("devs", "", "alice", Visibility::Public, None)
            .unwrap();
        h.engine
            .send_group_message("alice", group.id, "first")
            .await
            .unwrap();

        let history = h.engine.group_history(group.id, "alice").await.unwrap();
        assert_eq!(history.len(), 1);

        assert!(matches!(
            h.engine.group_history(group.id, "dave").await,
            Err(EngineError::Group(GroupError::NotMember(_)))
        ));
        assert!(matches!(
            h.engine.group_history(999, "alice").await,
            Err(EngineError::Group(GroupError::NotFound(_)))
        ));

        // Unauthenticated count still requires an active group.
        assert_eq!(h.engine.group_count(group.id).await.unwrap(), 1);
        h.groups.deactivate(group.id, "alice").unwrap();
        assert!(matches!(
            h.engine.group_count(group.id).await,
            Err(EngineError::Group(GroupError::NotFound(_)))
        ));
    }
}
