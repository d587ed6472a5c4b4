//! Post detail thread
//!
//! One post with its comments, newest first. New comments by anyone arrive
//! through a change feed scoped to this post; deletes are applied locally
//! after the request succeeds.

use super::likes::{PendingLike, begin_toggle};
use crate::config::FeedConfig;
use crate::data::{
    Comment, CommentId, DeletedComment, NewComment, NewNotification, PostDetails, PostId, User,
    UserSummary,
};
use crate::error::{AppError, Failure, Outcome};
use crate::platform::{ChangeEvent, ChangeKind, Subscription};
use crate::screen::Liveness;
use crate::service::{NotificationService, PostService, UserService};

const POST_NOT_FOUND: &str = "Post not found!";

/// State behind the post detail screen
pub struct PostDetail {
    posts: PostService,
    users: UserService,
    notifications: NotificationService,
    post_id: PostId,
    /// Comment to highlight when opened from a notification
    target_comment: Option<CommentId>,
    post: Option<PostDetails>,
    loaded: bool,
    rollback_failed_likes: bool,
    subscription: Option<Subscription>,
    liveness: Liveness,
}

impl PostDetail {
    pub fn new(
        posts: PostService,
        users: UserService,
        notifications: NotificationService,
        post_id: PostId,
        target_comment: Option<CommentId>,
        config: &FeedConfig,
        liveness: Liveness,
    ) -> Self {
        Self {
            posts,
            users,
            notifications,
            post_id,
            target_comment,
            post: None,
            loaded: false,
            rollback_failed_likes: config.rollback_failed_likes,
            subscription: None,
            liveness,
        }
    }

    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    pub fn post(&self) -> Option<&PostDetails> {
        self.post.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        !self.loaded
    }

    /// Loaded, but there is no such post
    pub fn is_not_found(&self) -> bool {
        self.loaded && self.post.is_none()
    }

    pub fn comments(&self) -> &[Comment] {
        self.post
            .as_ref()
            .map(|post| post.comments.as_slice())
            .unwrap_or_default()
    }

    /// The comment a notification pointed at, once it is in the thread
    pub fn highlighted(&self) -> Option<&Comment> {
        let target = self.target_comment?;
        self.comments().iter().find(|comment| comment.id == target)
    }

    /// A comment can be deleted by its author or by the post's author
    pub fn can_delete(&self, comment: &Comment, viewer_id: &str) -> bool {
        comment.user_id == viewer_id
            || self
                .post
                .as_ref()
                .is_some_and(|post| post.row.user_id == viewer_id)
    }

    /// Subscribe to new comments, then load the post
    pub async fn open(&mut self) -> Outcome<()> {
        if let Err(error) = self.subscribe().await {
            tracing::warn!(post_id = self.post_id, %error, "Live comments unavailable");
        }
        self.load().await
    }

    /// Fetch the post and its comments
    ///
    /// A failed fetch still ends loading; the screen then shows "not found".
    pub async fn load(&mut self) -> Outcome<()> {
        let result = self.posts.fetch_post_details(self.post_id).await;
        if !self.liveness.is_alive() {
            return result.map(|_| ());
        }
        self.loaded = true;
        let details = result?;
        tracing::debug!(
            post_id = self.post_id,
            comments = details.comments.len(),
            "Post details loaded"
        );
        self.post = Some(details);
        Ok(())
    }

    // =========================================================================
    // Live comments
    // =========================================================================

    pub async fn subscribe(&mut self) -> Result<(), AppError> {
        if self.subscription.is_none() {
            self.subscription = Some(self.posts.watch_comments(self.post_id).await?);
        }
        Ok(())
    }

    /// Wait for the next comment change; pends forever without a
    /// subscription
    pub async fn next_change(&mut self) -> Option<ChangeEvent> {
        let Some(subscription) = self.subscription.as_mut() else {
            return std::future::pending().await;
        };
        let event = subscription.recv().await;
        if event.is_none() {
            self.subscription = None;
        }
        event
    }

    pub async fn handle_change(&mut self, event: ChangeEvent) -> bool {
        if event.kind != ChangeKind::Insert {
            return false;
        }
        match event.new_row::<Comment>() {
            Ok(comment) => self.on_remote_comment(comment).await,
            Err(error) => {
                tracing::warn!(%error, "Undecodable comment insert");
                false
            }
        }
    }

    /// Prepend a comment inserted elsewhere, with its author fetched
    /// separately (empty author if that fails)
    pub async fn on_remote_comment(&mut self, mut comment: Comment) -> bool {
        if comment.post_id != self.post_id || self.has_comment(comment.id) {
            return false;
        }
        if self.post.is_none() {
            tracing::debug!(comment_id = comment.id, "Comment arrived before the post");
            return false;
        }

        comment.user = match self.users.get_user_data(&comment.user_id).await {
            Ok(user) => UserSummary::from(&user),
            Err(failure) => {
                tracing::warn!(comment_id = comment.id, reason = %failure, "Commenter unavailable");
                UserSummary::default()
            }
        };
        if !self.liveness.is_alive() {
            return false;
        }
        self.prepend(comment)
    }

    fn has_comment(&self, comment_id: CommentId) -> bool {
        self.comments().iter().any(|comment| comment.id == comment_id)
    }

    fn prepend(&mut self, comment: Comment) -> bool {
        if self.has_comment(comment.id) {
            return false;
        }
        match self.post.as_mut() {
            Some(post) => {
                post.comments.insert(0, comment);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Comment as `viewer`
    ///
    /// The post's author is notified unless they are commenting on their own
    /// post; a failed notification does not fail the comment. The comment
    /// is shown at once; its echo from the change feed is ignored.
    pub async fn add_comment(&mut self, viewer: &User, text: &str) -> Outcome<Comment> {
        let Some(author_id) = self.post.as_ref().map(|post| post.row.user_id.clone()) else {
            return Err(Failure::new(POST_NOT_FOUND));
        };

        let mut comment = self
            .posts
            .create_comment(NewComment {
                post_id: self.post_id,
                user_id: viewer.id.clone(),
                text: text.trim().to_string(),
            })
            .await?;
        comment.user = UserSummary::from(viewer);

        if viewer.id != author_id {
            self.notify_author(&viewer.id, &author_id, comment.id).await;
        }

        if self.liveness.is_alive() {
            self.prepend(comment.clone());
        }
        Ok(comment)
    }

    async fn notify_author(&self, sender_id: &str, author_id: &str, comment_id: CommentId) {
        let notification =
            match NewNotification::comment(sender_id, author_id, self.post_id, Some(comment_id)) {
                Ok(notification) => notification,
                Err(error) => {
                    tracing::warn!(%error, "Could not encode notification");
                    return;
                }
            };
        if let Err(failure) = self.notifications.create_notification(notification).await {
            tracing::warn!(post_id = self.post_id, reason = %failure, "Author not notified");
        }
    }

    pub async fn delete_comment(&mut self, comment_id: CommentId) -> Outcome<DeletedComment> {
        let deleted = self.posts.delete_comment(comment_id).await?;
        if let Some(post) = self.post.as_mut() {
            post.comments.retain(|comment| comment.id != deleted.comment_id);
        }
        Ok(deleted)
    }

    pub async fn delete_post(&mut self) -> Outcome<()> {
        self.posts.remove_post(self.post_id).await
    }

    // =========================================================================
    // Likes
    // =========================================================================

    pub fn begin_like(&mut self, user_id: &str) -> Option<PendingLike> {
        let post = self.post.as_mut()?;
        Some(begin_toggle(&mut post.likes, self.post_id, user_id))
    }

    pub fn settle_like(&mut self, pending: PendingLike, result: Outcome<()>) -> Outcome<()> {
        let rollback = self.rollback_failed_likes;
        match self.post.as_mut() {
            Some(post) => pending.settle(&mut post.likes, result, rollback),
            None => result,
        }
    }

    pub async fn toggle_like(&mut self, user_id: &str) -> Outcome<()> {
        let Some(pending) = self.begin_like(user_id) else {
            return Ok(());
        };
        let result = pending.send(&self.posts).await;
        self.settle_like(pending, result)
    }
}
