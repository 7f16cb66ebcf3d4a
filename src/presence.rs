use std::collections::{HashMap, HashSet};

use log::{info, warn};

use crate::types::PresenceCounts;

#[derive(Clone, Debug)]
pub struct ConnectedEntry {
    pub connected_at_ms: u64,
}

#[derive(Clone, Debug)]
pub struct AuthenticatedEntry {
    pub account_id: i64,
    pub username: String,
    pub authenticated_at_ms: u64,
}

#[derive(Clone, Debug)]
pub struct WorldEntry {
    pub character_id: i64,
    pub character_name: String,
    pub entered_at_ms: u64,
}

/// Tracks every connection through three strictly increasing commitment
/// tiers, from raw socket through proven identity to a character in the
/// world. Containment (in_world ⊆ authenticated ⊆ connected) holds after
/// every operation; `reconcile` prunes ids the transport no longer
/// reports as live.
#[derive(Default)]
pub struct PresenceTracker {
    connected: HashMap<String, ConnectedEntry>,
    authenticated: HashMap<String, AuthenticatedEntry>,
    in_world: HashMap<String, WorldEntry>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(&mut self, conn_id: &str, now_ms: u64) {
        self.connected.insert(
            conn_id.to_string(),
            ConnectedEntry {
                connected_at_ms: now_ms,
            },
        );
        info!(
            "connection registered: {conn_id} (total connected: {})",
            self.connected.len()
        );
    }

    /// Records a verified identity for a connection. Refuses (and logs)
    /// when the connection is unknown, which only happens if transport
    /// wiring is broken.
    pub fn on_authenticated(
        &mut self,
        conn_id: &str,
        account_id: i64,
        username: &str,
        now_ms: u64,
    ) -> bool {
        if !self.connected.contains_key(conn_id) {
            warn!("authentication for unknown connection ignored: {conn_id}");
            return false;
        }
        self.authenticated.insert(
            conn_id.to_string(),
            AuthenticatedEntry {
                account_id,
                username: username.to_string(),
                authenticated_at_ms: now_ms,
            },
        );
        info!(
            "player authenticated: {username} ({conn_id}), total authenticated: {}",
            self.authenticated.len()
        );
        true
    }

    /// Promotes a connection into the in-world tier. Requires a prior
    /// authentication on the same connection.
    pub fn on_world_enter(
        &mut self,
        conn_id: &str,
        character_id: i64,
        character_name: &str,
        now_ms: u64,
    ) -> bool {
        if !self.authenticated.contains_key(conn_id) {
            warn!("world entry without authentication ignored: {conn_id}");
            return false;
        }
        self.in_world.insert(
            conn_id.to_string(),
            WorldEntry {
                character_id,
                character_name: character_name.to_string(),
                entered_at_ms: now_ms,
            },
        );
        info!(
            "player entered world: {character_name} ({conn_id}), total in world: {}",
            self.in_world.len()
        );
        true
    }

    pub fn on_world_leave(&mut self, conn_id: &str) {
        if let Some(entry) = self.in_world.remove(conn_id) {
            info!(
                "player left world: {} ({conn_id}), total in world: {}",
                entry.character_name,
                self.in_world.len()
            );
        }
    }

    /// Removes the connection from every tier. Safe to call repeatedly.
    pub fn on_disconnect(&mut self, conn_id: &str) {
        self.connected.remove(conn_id);
        self.authenticated.remove(conn_id);
        self.in_world.remove(conn_id);
    }

    /// Drops every id the transport no longer reports as live from all
    /// three tiers. This is the self-healing pass against sockets that
    /// vanished without a close callback; counts can never drift upward
    /// permanently. Returns how many connections were evicted.
    pub fn reconcile(&mut self, live: &HashSet<String>) -> usize {
        let before = self.connected.len();
        self.connected.retain(|conn_id, _| live.contains(conn_id));
        self.authenticated
            .retain(|conn_id, _| live.contains(conn_id));
        self.in_world.retain(|conn_id, _| live.contains(conn_id));
        let evicted = before.saturating_sub(self.connected.len());
        if evicted > 0 {
            info!("reconcile evicted {evicted} dead connection(s)");
        }
        evicted
    }

    pub fn counts(&self) -> PresenceCounts {
        PresenceCounts {
            connected: self.connected.len(),
            authenticated: self.authenticated.len(),
            in_world: self.in_world.len(),
        }
    }

    pub fn is_connected(&self, conn_id: &str) -> bool {
        self.connected.contains_key(conn_id)
    }

    pub fn is_authenticated(&self, conn_id: &str) -> bool {
        self.authenticated.contains_key(conn_id)
    }

    pub fn is_in_world(&self, conn_id: &str) -> bool {
        self.in_world.contains_key(conn_id)
    }

    pub fn authenticated_entry(&self, conn_id: &str) -> Option<&AuthenticatedEntry> {
        self.authenticated.get(conn_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_lifecycle(tracker: &mut PresenceTracker, conn_id: &str, character_id: i64) {
        tracker.on_connect(conn_id, 0);
        assert!(tracker.on_authenticated(conn_id, character_id, "user", 1));
        assert!(tracker.on_world_enter(conn_id, character_id, "hero", 2));
    }

    fn assert_containment(tracker: &PresenceTracker, conn_ids: &[&str]) {
        for conn_id in conn_ids {
            if tracker.is_in_world(conn_id) {
                assert!(tracker.is_authenticated(conn_id));
            }
            if tracker.is_authenticated(conn_id) {
                assert!(tracker.is_connected(conn_id));
            }
        }
    }

    #[test]
    fn tiers_are_contained_after_any_operation_sequence() {
        let mut tracker = PresenceTracker::new();
        let conn_ids = ["c1", "c2", "c3"];

        tracker.on_connect("c1", 0);
        assert_containment(&tracker, &conn_ids);

        tracker.on_authenticated("c1", 10, "alice", 1);
        assert_containment(&tracker, &conn_ids);

        // c2 skips straight to world entry; both promotions must refuse.
        assert!(!tracker.on_authenticated("c2", 11, "bram", 1));
        assert!(!tracker.on_world_enter("c2", 2, "Bram", 2));
        assert_containment(&tracker, &conn_ids);

        tracker.on_world_enter("c1", 1, "Aria", 2);
        assert_containment(&tracker, &conn_ids);

        tracker.on_world_leave("c1");
        assert_containment(&tracker, &conn_ids);
        assert!(tracker.is_authenticated("c1"));

        tracker.on_disconnect("c1");
        assert_containment(&tracker, &conn_ids);
        assert_eq!(tracker.counts(), PresenceCounts::default());
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut tracker = PresenceTracker::new();
        full_lifecycle(&mut tracker, "c1", 1);

        tracker.on_disconnect("c1");
        let after_first = tracker.counts();
        tracker.on_disconnect("c1");
        assert_eq!(tracker.counts(), after_first);
        assert_eq!(after_first, PresenceCounts::default());
    }

    #[test]
    fn reconcile_removes_exactly_the_dead_connections() {
        let mut tracker = PresenceTracker::new();
        full_lifecycle(&mut tracker, "c1", 1);
        full_lifecycle(&mut tracker, "c2", 2);
        full_lifecycle(&mut tracker, "c3", 3);

        let live: HashSet<String> = ["c1".to_string(), "c3".to_string()].into_iter().collect();
        let evicted = tracker.reconcile(&live);

        assert_eq!(evicted, 1);
        assert!(tracker.is_in_world("c1"));
        assert!(tracker.is_in_world("c3"));
        assert!(!tracker.is_connected("c2"));
        assert!(!tracker.is_authenticated("c2"));
        assert!(!tracker.is_in_world("c2"));
        assert_eq!(
            tracker.counts(),
            PresenceCounts {
                connected: 2,
                authenticated: 2,
                in_world: 2,
            }
        );
    }

    #[test]
    fn reconcile_against_empty_live_set_clears_everything() {
        let mut tracker = PresenceTracker::new();
        full_lifecycle(&mut tracker, "c1", 1);

        tracker.reconcile(&HashSet::new());
        assert_eq!(tracker.counts(), PresenceCounts::default());
    }

    #[test]
    fn world_leave_keeps_lower_tiers() {
        let mut tracker = PresenceTracker::new();
        full_lifecycle(&mut tracker, "c1", 1);

        tracker.on_world_leave("c1");
        assert_eq!(
            tracker.counts(),
            PresenceCounts {
                connected: 1,
                authenticated: 1,
                in_world: 0,
            }
        );
    }

    #[test]
    fn authenticated_entry_exposes_account_data() {
        let mut tracker = PresenceTracker::new();
        tracker.on_connect("c1", 0);
        tracker.on_authenticated("c1", 42, "alice", 5);

        let entry = tracker.authenticated_entry("c1").expect("entry should exist");
        assert_eq!(entry.account_id, 42);
        assert_eq!(entry.username, "alice");
        assert_eq!(entry.authenticated_at_ms, 5);
    }
}
