//! Presence tracking: counterparty id → online status.
//!
//! Admin viewers key by each visitor's user id. A visitor only ever sees one
//! counterparty (the admin desk), stored under [`ADMIN_PRESENCE_KEY`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::core::model::{Presence, Role};

/// Key under which a user-role viewer stores the admin's presence.
pub const ADMIN_PRESENCE_KEY: &str = "admin";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceTracker {
    entries: HashMap<String, Presence>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the storage key for a presence event seen by `viewer`.
    ///
    /// Returns `None` for an admin viewer receiving an event without a user id.
    pub fn key_for(viewer: Role, user_id: Option<&str>) -> Option<String> {
        match viewer {
            Role::User => Some(ADMIN_PRESENCE_KEY.to_string()),
            Role::Admin => user_id.map(str::to_string),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, is_online: bool, last_active_at: Option<DateTime<Utc>>) {
        let key = key.into();
        // An offline event without a timestamp keeps the last known activity time.
        let last_active_at = last_active_at.or_else(|| self.entries.get(&key).and_then(|p| p.last_active_at));
        self.entries.insert(
            key,
            Presence {
                is_online,
                last_active_at,
            },
        );
    }

    pub fn insert(&mut self, key: impl Into<String>, presence: Presence) {
        self.entries.insert(key.into(), presence);
    }

    pub fn get(&self, key: &str) -> Option<&Presence> {
        self.entries.get(key)
    }

    pub fn is_online(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|p| p.is_online)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ts;

    #[test]
    fn test_key_for_user_viewer_is_singleton() {
        assert_eq!(
            PresenceTracker::key_for(Role::User, Some("whatever")).as_deref(),
            Some(ADMIN_PRESENCE_KEY)
        );
        assert_eq!(PresenceTracker::key_for(Role::User, None).as_deref(), Some(ADMIN_PRESENCE_KEY));
    }

    #[test]
    fn test_key_for_admin_viewer_requires_user_id() {
        assert_eq!(PresenceTracker::key_for(Role::Admin, Some("u1")).as_deref(), Some("u1"));
        assert!(PresenceTracker::key_for(Role::Admin, None).is_none());
    }

    #[test]
    fn test_set_keeps_last_active_when_missing() {
        let mut tracker = PresenceTracker::new();
        tracker.set("u1", true, Some(ts(10)));
        tracker.set("u1", false, None);
        let p = tracker.get("u1").unwrap();
        assert!(!p.is_online);
        assert_eq!(p.last_active_at, Some(ts(10)));
        assert!(!tracker.is_online("u1"));
        assert!(!tracker.is_online("unknown"));
    }
}
