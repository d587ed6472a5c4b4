//! Optimistic like toggle
//!
//! The like list is changed before the request goes out so the count and
//! heart update at once. [`begin_toggle`] applies the change and returns a
//! [`PendingLike`]; the caller sends it and then settles the result, which
//! undoes the change on failure when rollback is enabled.

use crate::data::{PostId, PostLike};
use crate::error::Outcome;
use crate::service::PostService;

/// Direction of a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeAction {
    Like,
    Unlike,
}

/// A toggle applied locally but not yet confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a pending like must be sent and settled"]
pub struct PendingLike {
    post_id: PostId,
    user_id: String,
    action: LikeAction,
}

/// Flip `user_id`'s like in `likes`
pub fn begin_toggle(likes: &mut Vec<PostLike>, post_id: PostId, user_id: &str) -> PendingLike {
    let liked = likes.iter().any(|like| like.user_id == user_id);
    let action = if liked {
        likes.retain(|like| like.user_id != user_id);
        LikeAction::Unlike
    } else {
        likes.push(PostLike {
            post_id,
            user_id: user_id.to_string(),
        });
        LikeAction::Like
    };

    PendingLike {
        post_id,
        user_id: user_id.to_string(),
        action,
    }
}

impl PendingLike {
    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    pub fn action(&self) -> LikeAction {
        self.action
    }

    /// Issue the create/delete matching the local change
    pub async fn send(&self, posts: &PostService) -> Outcome<()> {
        match self.action {
            LikeAction::Like => {
                let like = PostLike {
                    post_id: self.post_id,
                    user_id: self.user_id.clone(),
                };
                posts.create_post_like(like).await.map(|_| ())
            }
            LikeAction::Unlike => posts.remove_post_like(self.post_id, &self.user_id).await,
        }
    }

    /// Undo the local change for this user only
    pub fn rollback(&self, likes: &mut Vec<PostLike>) {
        match self.action {
            LikeAction::Like => likes.retain(|like| like.user_id != self.user_id),
            LikeAction::Unlike => {
                if !likes.iter().any(|like| like.user_id == self.user_id) {
                    likes.push(PostLike {
                        post_id: self.post_id,
                        user_id: self.user_id.clone(),
                    });
                }
            }
        }
    }

    /// Apply the request result to `likes`
    pub fn settle(
        self,
        likes: &mut Vec<PostLike>,
        result: Outcome<()>,
        rollback_on_failure: bool,
    ) -> Outcome<()> {
        if let Err(failure) = &result {
            tracing::warn!(
                post_id = self.post_id,
                action = ?self.action,
                reason = %failure,
                rolled_back = rollback_on_failure,
                "Like toggle failed"
            );
            if rollback_on_failure {
                self.rollback(likes);
            }
        }
        result
    }
}
