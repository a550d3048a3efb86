use chrono::Utc;
use tracing::{debug, info};

use super::index::MembershipIndex;
use crate::config::TeamConfig;
use crate::database::models::TeamMembership;
use crate::database::Database;
use crate::error::{CollectorError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub teams: usize,
    pub memberships: usize,
}

pub struct TeamResolver {
    storage: Database,
}

impl TeamResolver {
    pub fn new(storage: Database) -> Self {
        Self { storage }
    }

    /// Upserts every configured team and member. Members missing from the
    /// roster keep their stored rows; nothing is deactivated here.
    pub async fn sync(&self, roster: &[TeamConfig]) -> Result<SyncReport> {
        let now = Utc::now();
        let mut report = SyncReport::default();

        for (position, team_config) in roster.iter().enumerate() {
            let team_id = team_config.resolved_id(position);
            self.storage
                .upsert_team(team_id, &team_config.name, now)
                .await
                .map_err(|e| {
                    CollectorError::DatabaseError(format!("Failed to upsert team {}: {}", team_id, e))
                })?;
            report.teams += 1;

            for member in &team_config.members {
                // joined_at is part of the conflict key, so reuse the stored
                // value when the roster does not pin one.
                let joined_at = match member.joined_at {
                    Some(declared) => declared,
                    None => self
                        .storage
                        .active_joined_at(team_id, &member.username)
                        .await?
                        .unwrap_or(now),
                };

                let membership = TeamMembership {
                    team_id,
                    github_username: member.username.clone(),
                    allocation_weight: member.allocation,
                    joined_at,
                    left_at: None,
                };
                self.storage
                    .upsert_membership(&membership, now)
                    .await
                    .map_err(|e| {
                        CollectorError::DatabaseError(format!(
                            "Failed to upsert membership for {}: {}",
                            member.username, e
                        ))
                    })?;
                report.memberships += 1;
            }

            debug!(
                "Synced team {} ({}) with {} members",
                team_id,
                team_config.name,
                team_config.members.len()
            );
        }

        info!(
            "Synced {} teams and {} memberships",
            report.teams, report.memberships
        );
        Ok(report)
    }

    pub async fn load_index(&self) -> Result<MembershipIndex> {
        let teams = self.storage.load_teams().await?;
        let memberships = self.storage.load_active_memberships().await?;
        Ok(MembershipIndex::from_rows(teams, memberships))
    }

    /// Sync followed by an index build, the order a collection run needs.
    pub async fn sync_and_load(&self, roster: &[TeamConfig]) -> Result<MembershipIndex> {
        self.sync(roster).await?;
        self.load_index().await
    }
}
