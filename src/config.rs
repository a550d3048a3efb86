pub mod roster;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;

use crate::error::{CollectorError, Result};
pub use roster::{TeamConfig, TeamMemberConfig};

pub const DEFAULT_LOOKBACK_DAYS: i64 = 90;
pub const DEFAULT_RATE_LIMIT_THRESHOLD: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbDriver {
    Sqlite,
    Postgres,
}

impl DbDriver {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "sqlite3" | "sqlite" => Ok(DbDriver::Sqlite),
            "postgres" | "postgresql" => Ok(DbDriver::Postgres),
            other => Err(CollectorError::ConfigError(format!(
                "DB_DRIVER must be 'sqlite3' or 'postgres', got: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DbDriver::Sqlite => "sqlite3",
            DbDriver::Postgres => "postgres",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub db_driver: DbDriver,
    pub db_url: String,
    pub github_token: String,
    pub github_api_url: Option<String>,
    pub lookback_days: i64,
    pub rate_limit_threshold: u64,
    pub repositories: Vec<String>,
    pub teams: Vec<TeamConfig>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let db_driver = DbDriver::parse(&env_or("DB_DRIVER", "sqlite3"))?;
        let db_url = env_or("DB_URL", "./data/dora_metrics.db");
        let github_token = env_or("GITHUB_PAT", "");
        let github_api_url = env::var("GITHUB_API_URL").ok().filter(|v| !v.is_empty());

        let lookback_days = env_or("LOOKBACK_DAYS", &DEFAULT_LOOKBACK_DAYS.to_string())
            .parse()
            .map_err(|e| CollectorError::ConfigError(format!("LOOKBACK_DAYS: {}", e)))?;

        let rate_limit_threshold = env_or(
            "RATE_LIMIT_THRESHOLD",
            &DEFAULT_RATE_LIMIT_THRESHOLD.to_string(),
        )
        .parse()
        .map_err(|e| CollectorError::ConfigError(format!("RATE_LIMIT_THRESHOLD: {}", e)))?;

        let repositories = parse_repository_list(&env_or("REPOSITORIES", ""));

        let teams = match env::var("TEAM_CONFIG_PATH").ok().filter(|v| !v.is_empty()) {
            Some(path) => roster::load_roster_file(Path::new(&path))?,
            None => roster::parse_roster_json(&env_or("TEAM_CONFIG_JSON", "[]"))?,
        };

        let config = AppConfig {
            db_driver,
            db_url,
            github_token,
            github_api_url,
            lookback_days,
            rate_limit_threshold,
            repositories,
            teams,
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.db_url.is_empty() {
            return Err(CollectorError::ConfigError("DB_URL is required".to_string()));
        }

        if self.lookback_days <= 0 {
            return Err(CollectorError::ConfigError(format!(
                "LOOKBACK_DAYS must be positive, got: {}",
                self.lookback_days
            )));
        }

        let mut seen = HashSet::new();
        for (position, team) in self.teams.iter().enumerate() {
            team.validate()?;
            let id = team.resolved_id(position);
            if !seen.insert(id) {
                return Err(CollectorError::ConfigError(format!(
                    "Duplicate team id {} (team '{}')",
                    id, team.name
                )));
            }
        }

        Ok(())
    }

    /// Collection needs a token; migrations alone do not.
    pub fn require_github_token(&self) -> Result<&str> {
        if self.github_token.is_empty() {
            return Err(CollectorError::ConfigError(
                "GITHUB_PAT is required for collection".to_string(),
            ));
        }
        Ok(&self.github_token)
    }
}

pub fn parse_repository_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|repo| repo.trim().to_string())
        .filter(|repo| !repo.is_empty())
        .collect()
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            db_driver: DbDriver::Sqlite,
            db_url: "sqlite::memory:".to_string(),
            github_token: String::new(),
            github_api_url: None,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            rate_limit_threshold: DEFAULT_RATE_LIMIT_THRESHOLD,
            repositories: vec![],
            teams: vec![],
        }
    }

    #[test]
    fn test_driver_parsing() {
        assert_eq!(DbDriver::parse("sqlite3").unwrap(), DbDriver::Sqlite);
        assert_eq!(DbDriver::parse("postgres").unwrap(), DbDriver::Postgres);
        assert!(DbDriver::parse("mysql").is_err());
    }

    #[test]
    fn test_repository_list_trims_and_drops_empties() {
        let repos = parse_repository_list(" acme/api , acme/web,,  ");
        assert_eq!(repos, vec!["acme/api".to_string(), "acme/web".to_string()]);
        assert!(parse_repository_list("").is_empty());
    }

    #[test]
    fn test_validation_rejects_bad_lookback() {
        let mut config = base_config();
        config.lookback_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_duplicate_team_ids() {
        let mut config = base_config();
        config.teams = roster::parse_roster_json(
            r#"[{"team_id": 1, "name": "Platform", "members": []},
                {"name": "Payments", "members": []}]"#,
        )
        .unwrap();
        // second team resolves to implicit id 2, so this is fine
        assert!(config.validate().is_ok());

        config.teams[1].team_id = Some(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_required_for_collection() {
        let mut config = base_config();
        assert!(config.require_github_token().is_err());
        config.github_token = "ghp_test".to_string();
        assert_eq!(config.require_github_token().unwrap(), "ghp_test");
    }
}
