//! Groups and membership.
//!
//! The group registry is the membership authority: it owns group entities,
//! their member sets, and the rules for joining, leaving, and ownership.
//! Mutations on a single group are serialized through its map entry, so the
//! capacity invariant `|members| <= max_members` holds under concurrent
//! joins while unrelated groups mutate in parallel.

use banter_protocol::event::now_millis;
use banter_protocol::{GroupId, GroupSummary};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info};

/// Default maximum member count for new groups.
pub const DEFAULT_MAX_MEMBERS: usize = 100;

/// Maximum group name length.
pub const MAX_NAME_LENGTH: usize = 100;

/// Maximum group description length.
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

/// Group errors.
#[derive(Debug, Error)]
pub enum GroupError {
    /// The group name is already in use by an active group.
    #[error("Group name already in use: {0}")]
    DuplicateName(String),

    /// The name is blank or too long.
    #[error("Invalid group name: {0}")]
    InvalidName(&'static str),

    /// No active group with the given id.
    #[error("Group not found: {0}")]
    NotFound(GroupId),

    /// The group is at capacity.
    #[error("Group is full: maximum of {0} members")]
    Full(usize),

    /// The identity is already a member.
    #[error("User is already a member: {0}")]
    AlreadyMember(String),

    /// The identity is not a member.
    #[error("User is not a member: {0}")]
    NotMember(String),

    /// The owner tried to leave without transferring ownership.
    #[error("Owner cannot leave the group without transferring ownership")]
    OwnerCannotLeave,

    /// Requester is not the owner.
    #[error("Only the group owner may {0}")]
    Forbidden(&'static str),

    /// Requested capacity is below the current member count.
    #[error("Cannot reduce capacity to {requested} below current size {current}")]
    CapacityBelowCurrentSize {
        /// Requested maximum.
        requested: usize,
        /// Current member count.
        current: usize,
    },
}

/// Group visibility kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Anyone may join.
    Public,
    /// Invite only.
    Private,
    /// Joining requires owner approval.
    Restricted,
}

impl Visibility {
    /// The lowercase wire name of this visibility kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Restricted => "restricted",
        }
    }
}

/// A group entity.
#[derive(Debug, Clone)]
pub struct Group {
    /// Registry-assigned identifier.
    pub id: GroupId,
    /// Globally unique name among active groups.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Visibility kind.
    pub visibility: Visibility,
    /// Maximum member count.
    pub max_members: usize,
    /// Inactive groups reject all mutation, routing, and reads.
    pub active: bool,
    /// Owner identity; always a member.
    pub owner: String,
    /// Member identities.
    pub members: HashSet<String>,
    /// Creation timestamp, milliseconds.
    pub created_at: u64,
    /// Last update timestamp, milliseconds.
    pub updated_at: u64,
}

impl Group {
    /// Whether an identity is a member.
    #[must_use]
    pub fn is_member(&self, identity: &str) -> bool {
        self.members.contains(identity)
    }

    /// Whether an identity is the owner.
    #[must_use]
    pub fn is_owner(&self, identity: &str) -> bool {
        self.owner == identity
    }

    /// Current member count.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Summary DTO for lifecycle notices and API responses.
    #[must_use]
    pub fn summary(&self) -> GroupSummary {
        GroupSummary {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            visibility: self.visibility.as_str().to_string(),
            max_members: self.max_members,
            member_count: self.members.len(),
            owner: self.owner.clone(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = now_millis();
    }
}

/// Fields of a group that the owner may update.
#[derive(Debug, Default, Clone)]
pub struct GroupUpdate {
    /// New name, if renaming.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New maximum member count.
    pub max_members: Option<usize>,
}

fn validate_name(name: &str) -> Result<&str, GroupError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GroupError::InvalidName("name cannot be blank"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(GroupError::InvalidName("name too long"));
    }
    Ok(name)
}

/// The membership authority.
///
/// Stores `group -> member-set` as the single source of truth;
/// "groups for a user" is a query, never a second owned back-pointer.
/// The name index covers active groups only, so deactivation frees the
/// name for reuse.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: DashMap<GroupId, Group>,
    names: DashMap<String, GroupId>,
    next_id: AtomicU64,
}

impl GroupRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
            names: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a group with the given owner as its first member.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::DuplicateName`] if an active group already has
    /// the name, or [`GroupError::InvalidName`] for blank/oversized names.
    pub fn create(
        &self,
        name: &str,
        description: &str,
        owner: &str,
        visibility: Visibility,
        max_members: Option<usize>,
    ) -> Result<Group, GroupError> {
        let name = validate_name(name)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // Reserve the name atomically before the group exists; the entry
        // guard is the uniqueness lock.
        match self.names.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(GroupError::DuplicateName(name.to_string()));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let now = now_millis();
        let group = Group {
            id,
            name: name.to_string(),
            description: description.trim().to_string(),
            visibility,
            max_members: max_members.filter(|m| *m > 0).unwrap_or(DEFAULT_MAX_MEMBERS),
            active: true,
            owner: owner.to_string(),
            members: HashSet::from([owner.to_string()]),
            created_at: now,
            updated_at: now,
        };
        self.groups.insert(id, group.clone());

        info!(group = %group.name, id, owner = %owner, "Group created");
        Ok(group)
    }

    /// Add a member to a group.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::NotFound`] if the group is missing or inactive,
    /// [`GroupError::Full`] at capacity, or [`GroupError::AlreadyMember`].
    pub fn add_member(&self, group_id: GroupId, identity: &str) -> Result<Group, GroupError> {
        let mut entry = self
            .groups
            .get_mut(&group_id)
            .filter(|g| g.active)
            .ok_or(GroupError::NotFound(group_id))?;

        if entry.is_member(identity) {
            return Err(GroupError::AlreadyMember(identity.to_string()));
        }
        if entry.members.len() >= entry.max_members {
            return Err(GroupError::Full(entry.max_members));
        }

        entry.members.insert(identity.to_string());
        entry.touch();

        debug!(group = %entry.name, identity = %identity, members = entry.members.len(), "Member added");
        Ok(entry.clone())
    }

    /// Remove a member from a group.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::NotFound`], [`GroupError::NotMember`], or
    /// [`GroupError::OwnerCannotLeave`] when the member is the owner.
    pub fn remove_member(&self, group_id: GroupId, identity: &str) -> Result<Group, GroupError> {
        let mut entry = self
            .groups
            .get_mut(&group_id)
            .filter(|g| g.active)
            .ok_or(GroupError::NotFound(group_id))?;

        if !entry.is_member(identity) {
            return Err(GroupError::NotMember(identity.to_string()));
        }
        if entry.is_owner(identity) {
            return Err(GroupError::OwnerCannotLeave);
        }

        entry.members.remove(identity);
        entry.touch();

        debug!(group = %entry.name, identity = %identity, members = entry.members.len(), "Member removed");
        Ok(entry.clone())
    }

    /// Whether an identity is a member of an active group.
    #[must_use]
    pub fn is_member(&self, group_id: GroupId, identity: &str) -> bool {
        self.groups
            .get(&group_id)
            .is_some_and(|g| g.active && g.is_member(identity))
    }

    /// Whether an identity owns an active group.
    #[must_use]
    pub fn is_owner(&self, group_id: GroupId, identity: &str) -> bool {
        self.groups
            .get(&group_id)
            .is_some_and(|g| g.active && g.is_owner(identity))
    }

    /// Look up an active group.
    #[must_use]
    pub fn get(&self, group_id: GroupId) -> Option<Group> {
        self.groups
            .get(&group_id)
            .filter(|g| g.active)
            .map(|g| g.clone())
    }

    /// Member count of an active group.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::NotFound`] if the group is missing or inactive.
    pub fn member_count(&self, group_id: GroupId) -> Result<usize, GroupError> {
        self.groups
            .get(&group_id)
            .filter(|g| g.active)
            .map(|g| g.members.len())
            .ok_or(GroupError::NotFound(group_id))
    }

    /// Update name, description, or capacity. Owner only.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::Forbidden`] for non-owners,
    /// [`GroupError::DuplicateName`] if renaming collides with another
    /// active group, or [`GroupError::CapacityBelowCurrentSize`] when
    /// shrinking below the current member count.
    pub fn update(
        &self,
        group_id: GroupId,
        requester: &str,
        update: GroupUpdate,
    ) -> Result<Group, GroupError> {
        let mut entry = self
            .groups
            .get_mut(&group_id)
            .filter(|g| g.active)
            .ok_or(GroupError::NotFound(group_id))?;

        if !entry.is_owner(requester) {
            return Err(GroupError::Forbidden("update the group"));
        }

        if let Some(max) = update.max_members {
            if max < entry.members.len() {
                return Err(GroupError::CapacityBelowCurrentSize {
                    requested: max,
                    current: entry.members.len(),
                });
            }
        }

        if let Some(name) = update.name.as_deref() {
            let name = validate_name(name)?;
            if name != entry.name {
                match self.names.entry(name.to_string()) {
                    dashmap::mapref::entry::Entry::Occupied(_) => {
                        return Err(GroupError::DuplicateName(name.to_string()));
                    }
                    dashmap::mapref::entry::Entry::Vacant(slot) => {
                        slot.insert(group_id);
                    }
                }
                self.names.remove(&entry.name);
                entry.name = name.to_string();
            }
        }

        if let Some(description) = update.description {
            entry.description = description.trim().to_string();
        }
        if let Some(max) = update.max_members {
            entry.max_members = max;
        }
        entry.touch();

        info!(group = %entry.name, id = group_id, "Group updated");
        Ok(entry.clone())
    }

    /// Soft-delete a group. Owner only.
    ///
    /// The name is freed for reuse; persisted history keeps its references.
    ///
    /// # Errors
    ///
    /// Returns [`GroupError::NotFound`] or [`GroupError::Forbidden`].
    pub fn deactivate(&self, group_id: GroupId, requester: &str) -> Result<(), GroupError> {
        let mut entry = self
            .groups
            .get_mut(&group_id)
            .filter(|g| g.active)
            .ok_or(GroupError::NotFound(group_id))?;

        if !entry.is_owner(requester) {
            return Err(GroupError::Forbidden("delete the group"));
        }

        entry.active = false;
        entry.touch();
        self.names.remove(&entry.name);

        info!(group = %entry.name, id = group_id, "Group deactivated");
        Ok(())
    }

    /// All active public groups.
    #[must_use]
    pub fn public_groups(&self) -> Vec<Group> {
        self.groups
            .iter()
            .filter(|g| g.active && g.visibility == Visibility::Public)
            .map(|g| g.clone())
            .collect()
    }

    /// All active groups an identity belongs to.
    #[must_use]
    pub fn groups_for_user(&self, identity: &str) -> Vec<Group> {
        self.groups
            .iter()
            .filter(|g| g.active && g.is_member(identity))
            .map(|g| g.clone())
            .collect()
    }

    /// Active public groups whose name contains the given term.
    #[must_use]
    pub fn search_public(&self, term: &str) -> Vec<Group> {
        self.groups
            .iter()
            .filter(|g| {
                g.active && g.visibility == Visibility::Public && g.name.contains(term)
            })
            .map(|g| g.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn registry_with(name: &str, owner: &str, max: usize) -> (GroupRegistry, GroupId) {
        let registry = GroupRegistry::new();
        let group = registry
            .create(name, "", owner, Visibility::Public, Some(max))
            .unwrap();
        (registry, group.id)
    }

    #[test]
    fn test_create_owner_is_first_member() {
        let registry = GroupRegistry::new();
        let group = registry
            .create("devs", "dev talk", "alice", Visibility::Public, None)
            .unwrap();

        assert!(group.is_member("alice"));
        assert!(group.is_owner("alice"));
        assert_eq!(group.member_count(), 1);
        assert_eq!(group.max_members, DEFAULT_MAX_MEMBERS);
    }

    #[test]
    fn test_duplicate_name() {
        let registry = GroupRegistry::new();
        registry
            .create("devs", "", "alice", Visibility::Public, None)
            .unwrap();
        assert!(matches!(
            registry.create("devs", "", "bob", Visibility::Public, None),
            Err(GroupError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_capacity_scenario() {
        // create devs {owner: alice, max: 2} -> add bob ok -> add carol Full
        let (registry, id) = registry_with("devs", "alice", 2);

        registry.add_member(id, "bob").unwrap();
        assert!(matches!(
            registry.add_member(id, "carol"),
            Err(GroupError::Full(2))
        ));
        assert_eq!(registry.member_count(id).unwrap(), 2);
    }

    #[test]
    fn test_already_member() {
        let (registry, id) = registry_with("devs", "alice", 10);
        registry.add_member(id, "bob").unwrap();
        assert!(matches!(
            registry.add_member(id, "bob"),
            Err(GroupError::AlreadyMember(_))
        ));
    }

    #[test]
    fn test_remove_member_rules() {
        let (registry, id) = registry_with("devs", "alice", 10);
        registry.add_member(id, "bob").unwrap();

        assert!(matches!(
            registry.remove_member(id, "carol"),
            Err(GroupError::NotMember(_))
        ));
        assert!(matches!(
            registry.remove_member(id, "alice"),
            Err(GroupError::OwnerCannotLeave)
        ));

        let group = registry.remove_member(id, "bob").unwrap();
        assert!(!group.is_member("bob"));
        assert!(group.is_member("alice"));
    }

    #[test]
    fn test_update_authorization_and_capacity() {
        let (registry, id) = registry_with("devs", "alice", 10);
        registry.add_member(id, "bob").unwrap();

        assert!(matches!(
            registry.update(id, "bob", GroupUpdate::default()),
            Err(GroupError::Forbidden(_))
        ));

        assert!(matches!(
            registry.update(
                id,
                "alice",
                GroupUpdate {
                    max_members: Some(1),
                    ..GroupUpdate::default()
                }
            ),
            Err(GroupError::CapacityBelowCurrentSize {
                requested: 1,
                current: 2
            })
        ));

        let group = registry
            .update(
                id,
                "alice",
                GroupUpdate {
                    name: Some("devs-2".into()),
                    description: Some("renamed".into()),
                    max_members: Some(5),
                },
            )
            .unwrap();
        assert_eq!(group.name, "devs-2");
        assert_eq!(group.max_members, 5);

        // Old name freed, new name reserved.
        assert!(registry
            .create("devs", "", "carol", Visibility::Public, None)
            .is_ok());
        assert!(matches!(
            registry.create("devs-2", "", "carol", Visibility::Public, None),
            Err(GroupError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_rename_collision() {
        let registry = GroupRegistry::new();
        let a = registry
            .create("alpha", "", "alice", Visibility::Public, None)
            .unwrap();
        registry
            .create("beta", "", "bob", Visibility::Public, None)
            .unwrap();

        assert!(matches!(
            registry.update(
                a.id,
                "alice",
                GroupUpdate {
                    name: Some("beta".into()),
                    ..GroupUpdate::default()
                }
            ),
            Err(GroupError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_deactivate() {
        let (registry, id) = registry_with("devs", "alice", 10);

        assert!(matches!(
            registry.deactivate(id, "bob"),
            Err(GroupError::Forbidden(_))
        ));
        registry.deactivate(id, "alice").unwrap();

        // Inactive groups reject everything and disappear from listings.
        assert!(registry.get(id).is_none());
        assert!(!registry.is_member(id, "alice"));
        assert!(matches!(
            registry.add_member(id, "bob"),
            Err(GroupError::NotFound(_))
        ));
        assert!(registry.public_groups().is_empty());

        // Name is reusable after deactivation.
        assert!(registry
            .create("devs", "", "bob", Visibility::Public, None)
            .is_ok());
    }

    #[test]
    fn test_listings_and_search() {
        let registry = GroupRegistry::new();
        registry
            .create("rust-devs", "", "alice", Visibility::Public, None)
            .unwrap();
        registry
            .create("secret", "", "alice", Visibility::Private, None)
            .unwrap();
        let g = registry
            .create("go-devs", "", "bob", Visibility::Public, None)
            .unwrap();
        registry.add_member(g.id, "alice").unwrap();

        assert_eq!(registry.public_groups().len(), 2);
        assert_eq!(registry.groups_for_user("alice").len(), 3);
        assert_eq!(registry.groups_for_user("bob").len(), 1);

        let found = registry.search_public("devs");
        assert_eq!(found.len(), 2);
        assert!(registry.search_public("secret").is_empty());
    }

    #[test]
    fn test_concurrent_add_never_exceeds_capacity() {
        let (registry, id) = registry_with("devs", "alice", 5);
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.add_member(id, &format!("user-{i}")).is_ok())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&ok| ok)
            .count();

        // Owner holds one slot; exactly four racing joins may win.
        assert_eq!(successes, 4);
        assert_eq!(registry.member_count(id).unwrap(), 5);
    }
}
