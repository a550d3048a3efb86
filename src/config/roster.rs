//! Team roster loader
//! Reads the declarative team/member roster from inline JSON or a YAML file

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{CollectorError, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TeamMemberConfig {
    pub username: String,
    #[serde(default = "default_allocation")]
    pub allocation: f64,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TeamConfig {
    #[serde(default)]
    pub team_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub members: Vec<TeamMemberConfig>,
}

fn default_allocation() -> f64 {
    1.0
}

impl TeamConfig {
    /// Declared id, or the 1-based position in the roster when none is given.
    pub fn resolved_id(&self, position: usize) -> i64 {
        self.team_id.unwrap_or(position as i64 + 1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CollectorError::ConfigError(
                "Team name cannot be empty".to_string(),
            ));
        }

        for member in &self.members {
            if member.username.trim().is_empty() {
                return Err(CollectorError::ConfigError(format!(
                    "Team {}: member username cannot be empty",
                    self.name
                )));
            }
            if !(0.0..=1.0).contains(&member.allocation) {
                return Err(CollectorError::ConfigError(format!(
                    "Team {}: allocation for {} ({}) must be between 0.0 and 1.0",
                    self.name, member.username, member.allocation
                )));
            }
        }

        Ok(())
    }
}

pub fn parse_roster_json(raw: &str) -> Result<Vec<TeamConfig>> {
    serde_json::from_str(raw)
        .map_err(|e| CollectorError::ConfigError(format!("Failed to parse TEAM_CONFIG_JSON: {}", e)))
}

/// YAML is a superset of JSON, so either format is accepted here.
pub fn load_roster_file(path: &Path) -> Result<Vec<TeamConfig>> {
    info!("Loading team roster from: {:?}", path);

    if !path.exists() {
        return Err(CollectorError::ConfigError(format!(
            "Team roster file not found: {:?}",
            path
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        CollectorError::ConfigError(format!("Failed to read {:?}: {}", path, e))
    })?;

    serde_yaml::from_str(&contents)
        .map_err(|e| CollectorError::ConfigError(format!("Failed to parse {:?}: {}", path, e)))
}
