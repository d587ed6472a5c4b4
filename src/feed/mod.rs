//! Feed reconciliation
//!
//! Handles:
//! - Paged post feeds (home, live home, one author's profile)
//! - Merging realtime inserts/deletes into a loaded feed
//! - The post detail thread and its live comments
//! - Optimistic like toggles
//!
//! Controllers are single-owner state: every mutation goes through
//! `&mut self`, so the owner's event loop serializes user actions and
//! change events.

mod detail;
mod likes;
mod timeline;

pub use detail::PostDetail;
pub use likes::{LikeAction, PendingLike, begin_toggle};
pub use timeline::FeedController;

use crate::config::FeedConfig;

/// Which posts a feed shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedKind {
    /// Everyone's posts
    Home,
    /// Everyone's posts, kept current by the change feed
    LiveHome,
    /// One author's posts
    Profile { user_id: String },
}

impl FeedKind {
    /// Rows added to the page on each `load_more`
    pub fn step(&self, config: &FeedConfig) -> usize {
        match self {
            Self::Home => config.home_step,
            Self::LiveHome => config.live_step,
            Self::Profile { .. } => config.profile_step,
        }
    }

    pub fn author(&self) -> Option<&str> {
        match self {
            Self::Profile { user_id } => Some(user_id),
            _ => None,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::LiveHome)
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::LiveHome => "live_home",
            Self::Profile { .. } => "profile",
        }
    }
}
