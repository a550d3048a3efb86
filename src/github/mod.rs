pub mod client;
pub mod fetcher;
pub mod types;

pub use client::{GitHubClient, RemoteApi};
pub use fetcher::{ActivityFetcher, ActivitySource};
pub use types::{CommentRecord, PullRequestRecord, ReviewRecord};
