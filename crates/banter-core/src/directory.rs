//! Registered identities.
//!
//! The directory tracks every identity that has ever registered: a stable,
//! case-sensitive username, an online flag, and a last-seen timestamp.
//! Identities are never hard-deleted, only deactivated, so history records
//! keep resolving. Credential storage is out of scope; this is the identity
//! surface the routing engine validates senders against.

use banter_protocol::event::now_millis;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Directory errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The username is already registered.
    #[error("Username already taken: {0}")]
    DuplicateName(String),

    /// The username is empty or blank.
    #[error("Username cannot be blank")]
    BlankName,

    /// No such identity.
    #[error("User not found: {0}")]
    NotFound(String),
}

/// A registered identity.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Unique, case-sensitive username.
    pub username: String,
    /// Whether the identity currently has a live session.
    pub online: bool,
    /// Last activity in milliseconds since the Unix epoch.
    pub last_seen: u64,
    /// Deactivated identities keep their name but reject all activity.
    pub active: bool,
}

/// Concurrent directory of registered identities.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: DashMap<String, User>,
}

impl UserDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new identity.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::DuplicateName`] if the username is taken,
    /// or [`DirectoryError::BlankName`] for blank usernames.
    pub fn register(&self, username: &str) -> Result<User, DirectoryError> {
        if username.trim().is_empty() {
            return Err(DirectoryError::BlankName);
        }

        match self.users.entry(username.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(DirectoryError::DuplicateName(username.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let user = User {
                    username: username.to_string(),
                    online: false,
                    last_seen: now_millis(),
                    active: true,
                };
                slot.insert(user.clone());
                debug!(username = %username, "User registered");
                Ok(user)
            }
        }
    }

    /// Whether the identity exists and is active.
    #[must_use]
    pub fn validate(&self, username: &str) -> bool {
        self.users.get(username).is_some_and(|u| u.active)
    }

    /// Look up an identity.
    #[must_use]
    pub fn get(&self, username: &str) -> Option<User> {
        self.users.get(username).map(|u| u.clone())
    }

    /// Update the persisted online flag and last-seen timestamp.
    pub fn set_online(&self, username: &str, online: bool) {
        match self.users.get_mut(username) {
            Some(mut user) => {
                user.online = online;
                user.last_seen = now_millis();
            }
            None => warn!(username = %username, "Online status update for unknown user"),
        }
    }

    /// Deactivate an identity.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::NotFound`] if the identity does not exist.
    pub fn deactivate(&self, username: &str) -> Result<(), DirectoryError> {
        let mut user = self
            .users
            .get_mut(username)
            .ok_or_else(|| DirectoryError::NotFound(username.to_string()))?;
        user.active = false;
        user.online = false;
        debug!(username = %username, "User deactivated");
        Ok(())
    }

    /// All active identities with the online flag set.
    #[must_use]
    pub fn online_users(&self) -> Vec<User> {
        self.users
            .iter()
            .filter(|u| u.active && u.online)
            .map(|u| u.clone())
            .collect()
    }

    /// Active identities whose username contains the given term.
    #[must_use]
    pub fn search(&self, term: &str) -> Vec<User> {
        self.users
            .iter()
            .filter(|u| u.active && u.username.contains(term))
            .map(|u| u.clone())
            .collect()
    }

    /// Number of registered identities, active or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
