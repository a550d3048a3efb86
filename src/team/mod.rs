//! Team membership
//!
//! Roster sync mirrors the configured teams into storage; the resulting
//! [`MembershipIndex`] answers every scoping question for a collection run.

pub mod index;
pub mod resolver;

pub use index::MembershipIndex;
pub use resolver::{SyncReport, TeamResolver};
