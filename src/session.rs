use std::collections::{HashMap, HashSet};

use crate::types::{CharacterView, TargetType};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CombatTarget {
    pub target_id: i64,
    pub target_type: TargetType,
}

/// The record binding a connection to a character actively simulated in
/// the world. The snapshot is only reachable through `SessionContext`
/// mutators so no other component can write to it directly.
#[derive(Clone, Debug)]
pub struct WorldSession {
    snapshot: CharacterView,
    target: Option<CombatTarget>,
}

impl WorldSession {
    pub fn character(&self) -> &CharacterView {
        &self.snapshot
    }

    pub fn target(&self) -> Option<CombatTarget> {
        self.target
    }
}

/// Per-connection session registry. HP is written by the combat path,
/// map and position by the movement path, always after the matching
/// persistence write confirmed.
#[derive(Default)]
pub struct SessionContext {
    sessions: HashMap<String, WorldSession>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, conn_id: &str, snapshot: CharacterView) {
        self.sessions.insert(
            conn_id.to_string(),
            WorldSession {
                snapshot,
                target: None,
            },
        );
    }

    pub fn remove(&mut self, conn_id: &str) -> Option<WorldSession> {
        self.sessions.remove(conn_id)
    }

    pub fn get(&self, conn_id: &str) -> Option<&WorldSession> {
        self.sessions.get(conn_id)
    }

    pub fn conn_for_character(&self, character_id: i64) -> Option<&str> {
        self.sessions
            .iter()
            .find(|(_, session)| session.snapshot.id == character_id)
            .map(|(conn_id, _)| conn_id.as_str())
    }

    pub fn set_position(&mut self, conn_id: &str, pos_x: f32, pos_y: f32, pos_z: f32) {
        if let Some(session) = self.sessions.get_mut(conn_id) {
            session.snapshot.pos_x = pos_x;
            session.snapshot.pos_y = pos_y;
            session.snapshot.pos_z = pos_z;
        }
    }

    pub fn set_map(&mut self, conn_id: &str, map: &str) {
        if let Some(session) = self.sessions.get_mut(conn_id) {
            session.snapshot.map = map.to_string();
        }
    }

    pub fn set_vitals(&mut self, conn_id: &str, hp: Option<i32>, mp: Option<i32>) {
        if let Some(session) = self.sessions.get_mut(conn_id) {
            if let Some(hp) = hp {
                session.snapshot.hp = hp.clamp(0, session.snapshot.max_hp);
            }
            if let Some(mp) = mp {
                session.snapshot.mp = mp.clamp(0, session.snapshot.max_mp);
            }
        }
    }

    /// Replaces the whole snapshot, used after store-confirmed changes
    /// that touch many fields at once (leveling).
    pub fn refresh_character(&mut self, conn_id: &str, snapshot: CharacterView) {
        if let Some(session) = self.sessions.get_mut(conn_id) {
            session.snapshot = snapshot;
        }
    }

    pub fn set_target(&mut self, conn_id: &str, target: CombatTarget) {
        if let Some(session) = self.sessions.get_mut(conn_id) {
            session.target = Some(target);
        }
    }

    pub fn clear_target(&mut self, conn_id: &str) {
        if let Some(session) = self.sessions.get_mut(conn_id) {
            session.target = None;
        }
    }

    /// Clears the selection of every session aiming at a now-dead
    /// target.
    pub fn clear_targets_on(&mut self, target: CombatTarget) {
        for session in self.sessions.values_mut() {
            if session.target == Some(target) {
                session.target = None;
            }
        }
    }

    /// Drops sessions whose connection is no longer live, returning the
    /// removed pairs so callers can clean up group membership and notify
    /// the maps they were on.
    pub fn retain_live(&mut self, live: &HashSet<String>) -> Vec<(String, WorldSession)> {
        let dead: Vec<String> = self
            .sessions
            .keys()
            .filter(|conn_id| !live.contains(*conn_id))
            .cloned()
            .collect();
        dead.into_iter()
            .filter_map(|conn_id| {
                self.sessions
                    .remove(&conn_id)
                    .map(|session| (conn_id, session))
            })
            .collect()
    }
}
