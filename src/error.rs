use thiserror::Error;

impl From<serde_json::Error> for CollectorError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl From<serde_yaml::Error> for CollectorError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ConfigError(format!("YAML parse error: {}", err))
    }
}

impl From<sqlx::Error> for CollectorError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(format!("Database error: {}", err))
    }
}

impl From<octocrab::Error> for CollectorError {
    fn from(err: octocrab::Error) -> Self {
        Self::GitHubError(format!("GitHub API error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("GitHub API error: {0}")]
    GitHubError(String),

    #[error("Rate limit check failed: {0}")]
    RateLimitError(String),

    #[error("Pull requests returned out of order: {0}")]
    OutOfOrderError(String),

    #[error("Invalid repository identifier: {0}")]
    InvalidRepository(String),

    #[error("Migration {version} failed: {reason}")]
    MigrationError { version: String, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl CollectorError {
    pub fn migration(version: &str, reason: impl std::fmt::Display) -> Self {
        Self::MigrationError {
            version: version.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for errors that abort a single repository's pass rather than the
    /// whole process.
    pub fn is_repository_scoped(&self) -> bool {
        matches!(
            self,
            Self::GitHubError(_)
                | Self::RateLimitError(_)
                | Self::OutOfOrderError(_)
                | Self::InvalidRepository(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CollectorError>;
