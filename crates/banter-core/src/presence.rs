//! Presence tracking.
//!
//! The presence registry is the live set of online identities. It is
//! addressed by identity, not by connection, and is safe to call from any
//! number of connection-handling tasks without external locking.

use dashmap::DashSet;
use tracing::debug;

/// Concurrent set of online identities.
///
/// Adds and removals are idempotent: adding an identity that is already
/// online or removing one that is not is a no-op.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    online: DashSet<String>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an identity online.
    ///
    /// Returns `true` if the identity was not already online. Blank
    /// identities are ignored.
    pub fn add_user(&self, identity: &str) -> bool {
        if identity.trim().is_empty() {
            return false;
        }
        let added = self.online.insert(identity.to_string());
        if added {
            debug!(identity = %identity, online = self.online.len(), "Presence: user online");
        }
        added
    }

    /// Mark an identity offline.
    ///
    /// Returns `true` if the identity was online.
    pub fn remove_user(&self, identity: &str) -> bool {
        let removed = self.online.remove(identity).is_some();
        if removed {
            debug!(identity = %identity, online = self.online.len(), "Presence: user offline");
        }
        removed
    }

    /// Whether an identity is online.
    #[must_use]
    pub fn is_online(&self, identity: &str) -> bool {
        self.online.contains(identity)
    }

    /// Snapshot of all online identities.
    ///
    /// Returns a copy; callers never observe registry mutation while
    /// iterating.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.online.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of online identities.
    #[must_use]
    pub fn count(&self) -> usize {
        self.online.len()
    }
}
