use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::database::models::{Team, TeamMembership};

/// Username to active-team index. Built once after roster sync and never
/// mutated afterwards; a roster change needs a fresh build.
#[derive(Debug, Clone, Default)]
pub struct MembershipIndex {
    teams: BTreeMap<i64, String>,
    memberships: HashMap<String, BTreeSet<i64>>,
}

impl MembershipIndex {
    pub fn from_rows(teams: Vec<Team>, memberships: Vec<TeamMembership>) -> Self {
        let teams = teams.into_iter().map(|t| (t.id, t.name)).collect();

        let mut index: HashMap<String, BTreeSet<i64>> = HashMap::new();
        for membership in memberships.into_iter().filter(|m| m.left_at.is_none()) {
            index
                .entry(membership.github_username)
                .or_default()
                .insert(membership.team_id);
        }

        Self {
            teams,
            memberships: index,
        }
    }

    /// True if the user has at least one active membership.
    pub fn is_member(&self, username: &str) -> bool {
        self.memberships.contains_key(username)
    }

    pub fn teams_for_user(&self, username: &str) -> BTreeSet<i64> {
        self.memberships.get(username).cloned().unwrap_or_default()
    }

    /// Users without memberships are external to every team.
    pub fn is_external_reviewer(&self, username: &str, team_id: i64) -> bool {
        !self
            .memberships
            .get(username)
            .is_some_and(|teams| teams.contains(&team_id))
    }

    pub fn all_team_ids(&self) -> BTreeSet<i64> {
        self.teams.keys().copied().collect()
    }

    pub fn team_name(&self, team_id: i64) -> Option<&str> {
        self.teams.get(&team_id).map(String::as_str)
    }

    pub fn member_count(&self) -> usize {
        self.memberships.len()
    }
}
