//! Paged feed controller
//!
//! # Paging
//! `load_more` re-fetches the newest `page_size` rows (a growing prefix,
//! not an offset page) and replaces `items` with it. `page_size` only grows
//! and only moves once a fetch succeeds; a new controller starts over.
//!
//! # Termination
//! With [`TerminationPolicy::ShortPage`] the fetch asks for one row past the
//! page and the feed is exhausted when that row is missing. With
//! [`TerminationPolicy::LengthUnchanged`] the feed is exhausted when a
//! fetch returns as many rows as are held locally.
//!
//! # Live changes
//! Inserts are prepended (never sorted in) and deletes are removed by id.

use serde::Deserialize;

use super::FeedKind;
use super::likes::{PendingLike, begin_toggle};
use crate::config::{FeedConfig, TerminationPolicy};
use crate::data::{Post, PostId, PostRow, UserSummary};
use crate::error::{AppError, Outcome};
use crate::platform::{ChangeEvent, ChangeKind, Subscription};
use crate::screen::Liveness;
use crate::service::{PostService, UserService};

/// Primary key of a deleted row
#[derive(Debug, Deserialize)]
struct RowKey {
    id: PostId,
}

/// State behind one feed screen
pub struct FeedController {
    posts: PostService,
    users: UserService,
    kind: FeedKind,
    step: usize,
    termination: TerminationPolicy,
    rollback_failed_likes: bool,
    items: Vec<Post>,
    page_size: usize,
    has_more: bool,
    subscription: Option<Subscription>,
    liveness: Liveness,
}

impl FeedController {
    pub fn new(
        posts: PostService,
        users: UserService,
        kind: FeedKind,
        config: &FeedConfig,
        liveness: Liveness,
    ) -> Self {
        Self {
            posts,
            users,
            step: kind.step(config),
            kind,
            termination: config.termination,
            rollback_failed_likes: config.rollback_failed_likes,
            items: Vec::new(),
            page_size: 0,
            has_more: true,
            subscription: None,
            liveness,
        }
    }

    pub fn kind(&self) -> &FeedKind {
        &self.kind
    }

    /// Posts, newest first
    pub fn items(&self) -> &[Post] {
        &self.items
    }

    pub fn post(&self, post_id: PostId) -> Option<&Post> {
        self.items.iter().find(|post| post.id() == post_id)
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Subscribe when the feed is live, then load the first page
    pub async fn start(&mut self) -> Outcome<()> {
        if self.kind.is_live() {
            if let Err(error) = self.subscribe().await {
                tracing::warn!(feed = self.kind.label(), %error, "Live updates unavailable");
            }
        }
        self.load_more().await
    }

    // =========================================================================
    // Paging
    // =========================================================================

    /// Grow the page by one step
    ///
    /// No-op once the feed is exhausted. On failure nothing changes.
    pub async fn load_more(&mut self) -> Outcome<()> {
        if !self.has_more {
            return Ok(());
        }

        let requested = self.page_size + self.step;
        let limit = match self.termination {
            TerminationPolicy::ShortPage => requested + 1,
            TerminationPolicy::LengthUnchanged => requested,
        };
        let mut fetched = self.posts.fetch_posts(limit, self.kind.author()).await?;
        if !self.liveness.is_alive() {
            tracing::debug!(feed = self.kind.label(), "Feed unmounted; page dropped");
            return Ok(());
        }

        self.page_size = requested;
        match self.termination {
            TerminationPolicy::ShortPage => {
                self.has_more = fetched.len() > requested;
                fetched.truncate(requested);
                self.items = fetched;
            }
            TerminationPolicy::LengthUnchanged => {
                if fetched.len() == self.items.len() {
                    self.has_more = false;
                } else {
                    self.items = fetched;
                }
            }
        }

        tracing::debug!(
            feed = self.kind.label(),
            page_size = self.page_size,
            items = self.items.len(),
            has_more = self.has_more,
            "Feed page loaded"
        );
        self.record_len();
        Ok(())
    }

    // =========================================================================
    // Live changes
    // =========================================================================

    /// Join the `posts` change feed; a second call is a no-op
    pub async fn subscribe(&mut self) -> Result<(), AppError> {
        if self.subscription.is_none() {
            self.subscription = Some(self.posts.watch_posts().await?);
        }
        Ok(())
    }

    /// Wait for the next change
    ///
    /// Pends forever without a subscription. Returns None once when the
    /// feed closes; the subscription is dropped at that point.
    pub async fn next_change(&mut self) -> Option<ChangeEvent> {
        let Some(subscription) = self.subscription.as_mut() else {
            return std::future::pending().await;
        };
        let event = subscription.recv().await;
        if event.is_none() {
            tracing::info!(feed = self.kind.label(), "Change feed closed");
            self.subscription = None;
        }
        event
    }

    /// Apply one change; true when `items` changed
    pub async fn handle_change(&mut self, event: ChangeEvent) -> bool {
        match event.kind {
            ChangeKind::Insert => match event.new_row::<PostRow>() {
                Ok(row) => self.on_remote_insert(row).await,
                Err(error) => {
                    tracing::warn!(%error, "Undecodable post insert");
                    false
                }
            },
            ChangeKind::Delete => match event.old_row::<RowKey>() {
                Ok(key) => self.on_remote_delete(key.id),
                Err(error) => {
                    tracing::warn!(%error, "Undecodable post delete");
                    false
                }
            },
            ChangeKind::Update => {
                tracing::trace!("Ignoring post update");
                false
            }
        }
    }

    /// Prepend a post created elsewhere
    ///
    /// The author is fetched separately; if that fails the post is shown
    /// with an empty author. Rows already held, and rows by other authors
    /// on a profile feed, are ignored.
    pub async fn on_remote_insert(&mut self, row: PostRow) -> bool {
        if let Some(author) = self.kind.author() {
            if row.user_id != author {
                return false;
            }
        }
        if self.post(row.id).is_some() {
            tracing::debug!(post_id = row.id, "Duplicate insert ignored");
            return false;
        }

        let user = match self.users.get_user_data(&row.user_id).await {
            Ok(user) => UserSummary::from(&user),
            Err(failure) => {
                tracing::warn!(post_id = row.id, reason = %failure, "Author unavailable");
                UserSummary::default()
            }
        };
        if !self.liveness.is_alive() {
            return false;
        }

        tracing::debug!(post_id = row.id, feed = self.kind.label(), "Post prepended");
        self.items.insert(0, Post::from_row(row, user));
        self.record_len();
        true
    }

    /// Drop a post deleted elsewhere; false when it was not held
    pub fn on_remote_delete(&mut self, post_id: PostId) -> bool {
        let before = self.items.len();
        self.items.retain(|post| post.id() != post_id);
        let removed = self.items.len() != before;
        if removed {
            tracing::debug!(post_id, feed = self.kind.label(), "Post removed");
            self.record_len();
        }
        removed
    }

    // =========================================================================
    // Likes
    // =========================================================================

    /// Flip the like locally; None when the post is not in the feed
    pub fn begin_like(&mut self, post_id: PostId, user_id: &str) -> Option<PendingLike> {
        let post = self.items.iter_mut().find(|post| post.id() == post_id)?;
        Some(begin_toggle(&mut post.likes, post_id, user_id))
    }

    pub fn settle_like(&mut self, pending: PendingLike, result: Outcome<()>) -> Outcome<()> {
        let rollback = self.rollback_failed_likes;
        match self
            .items
            .iter_mut()
            .find(|post| post.id() == pending.post_id())
        {
            Some(post) => pending.settle(&mut post.likes, result, rollback),
            None => result,
        }
    }

    /// Like or unlike a post: local change, request, then settle
    pub async fn toggle_like(&mut self, post_id: PostId, user_id: &str) -> Outcome<()> {
        let Some(pending) = self.begin_like(post_id, user_id) else {
            tracing::debug!(post_id, "Like on a post not in this feed");
            return Ok(());
        };
        let result = pending.send(&self.posts).await;
        self.settle_like(pending, result)
    }

    fn record_len(&self) {
        use crate::metrics::FEED_ITEMS;
        FEED_ITEMS
            .with_label_values(&[self.kind.label()])
            .set(self.items.len() as i64);
    }
}
