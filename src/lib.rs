pub mod collector;
pub mod config;
pub mod database;
pub mod error;
pub mod github;
pub mod team;

pub use error::{CollectorError, Result};
