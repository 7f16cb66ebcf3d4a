use std::collections::{HashMap, HashSet};

/// Map-keyed broadcast groups. A connection belongs to at most one group
/// per map id; a map transfer is always leave-then-join so the
/// connection is never observable in two groups.
#[derive(Default)]
pub struct MapGroups {
    groups: HashMap<String, HashSet<String>>,
}

impl MapGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, conn_id: &str, map: &str) {
        self.groups
            .entry(map.to_string())
            .or_default()
            .insert(conn_id.to_string());
    }

    pub fn leave(&mut self, conn_id: &str, map: &str) {
        if let Some(group) = self.groups.get_mut(map) {
            group.remove(conn_id);
            if group.is_empty() {
                self.groups.remove(map);
            }
        }
    }

    pub fn transfer(&mut self, conn_id: &str, old_map: &str, new_map: &str) {
        self.leave(conn_id, old_map);
        self.join(conn_id, new_map);
    }

    /// Membership snapshot used for broadcasts.
    pub fn members(&self, map: &str) -> Vec<String> {
        self.groups
            .get(map)
            .map(|group| group.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, conn_id: &str, map: &str) -> bool {
        self.groups
            .get(map)
            .is_some_and(|group| group.contains(conn_id))
    }

    pub fn remove_everywhere(&mut self, conn_id: &str) {
        self.groups.retain(|_, group| {
            group.remove(conn_id);
            !group.is_empty()
        });
    }

    pub fn retain_live(&mut self, live: &HashSet<String>) {
        self.groups.retain(|_, group| {
            group.retain(|conn_id| live.contains(conn_id));
            !group.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_leave_are_idempotent() {
        let mut groups = MapGroups::new();
        groups.join("c1", "gludin");
        groups.join("c1", "gludin");
        assert_eq!(groups.members("gludin"), vec!["c1".to_string()]);

        groups.leave("c1", "gludin");
        groups.leave("c1", "gludin");
        assert!(groups.members("gludin").is_empty());
    }

    #[test]
    fn leave_of_absent_member_is_a_no_op() {
        let mut groups = MapGroups::new();
        groups.leave("c1", "nowhere");
        assert!(groups.members("nowhere").is_empty());
    }

    #[test]
    fn transfer_moves_membership_exclusively() {
        let mut groups = MapGroups::new();
        groups.join("c1", "gludin");
        groups.join("c2", "gludin");

        groups.transfer("c1", "gludin", "harbor");

        assert!(groups.contains("c1", "harbor"));
        assert!(!groups.contains("c1", "gludin"));
        assert!(groups.contains("c2", "gludin"));
    }

    #[test]
    fn remove_everywhere_clears_all_memberships() {
        let mut groups = MapGroups::new();
        groups.join("c1", "gludin");
        groups.join("c1", "harbor");
        groups.join("c2", "harbor");

        groups.remove_everywhere("c1");

        assert!(!groups.contains("c1", "gludin"));
        assert!(!groups.contains("c1", "harbor"));
        assert_eq!(groups.members("harbor"), vec!["c2".to_string()]);
    }

    #[test]
    fn retain_live_prunes_dead_connections() {
        let mut groups = MapGroups::new();
        groups.join("c1", "gludin");
        groups.join("c2", "gludin");
        groups.join("c3", "harbor");

        let live: HashSet<String> = ["c2".to_string()].into_iter().collect();
        groups.retain_live(&live);

        assert_eq!(groups.members("gludin"), vec!["c2".to_string()]);
        assert!(groups.members("harbor").is_empty());
    }
}
