//! Post service
//!
//! Handles posts, likes, and comments.

use std::sync::Arc;

use super::{is_blank, messages};
use crate::data::{
    Comment, CommentId, DeletedComment, NewComment, Post, PostDetails, PostDraft, PostId, PostLike,
    PostRow, PostUpsert,
};
use crate::error::{AppError, Failure, Outcome};
use crate::platform::{Backend, ChangeFilter, ChangeKind, PostQuery, Subscription, table};
use crate::storage::{MediaFolder, MediaRef, MediaStorage};

/// Post service
#[derive(Clone)]
pub struct PostService {
    backend: Arc<dyn Backend>,
    media: MediaStorage,
}

impl PostService {
    pub fn new(backend: Arc<dyn Backend>, media: MediaStorage) -> Self {
        Self { backend, media }
    }

    pub fn media(&self) -> &MediaStorage {
        &self.media
    }

    // =========================================================================
    // Posts
    // =========================================================================

    /// Create a post, or update it when `draft.id` is set
    ///
    /// A freshly picked file is uploaded first, into `postImages/` or
    /// `postVideos/` by kind; the stored path is what the row keeps.
    ///
    /// # Returns
    /// The row as stored
    pub async fn create_or_update_post(&self, draft: PostDraft) -> Outcome<PostRow> {
        if is_blank(&draft.body) && draft.file.is_none() {
            return Err(Failure::new(messages::EMPTY_POST));
        }

        let file = match draft.file {
            Some(MediaRef::Local(local)) => {
                let folder = MediaFolder::for_post(local.kind);
                Some(self.media.upload_file(folder, &local).await?)
            }
            Some(MediaRef::Remote(remote)) => Some(remote.path),
            None => None,
        };

        let upsert = PostUpsert {
            id: draft.id,
            body: draft.body,
            file,
            user_id: draft.user_id,
        };
        let row = self
            .backend
            .upsert_post(upsert)
            .await
            .map_err(|e| Failure::from_error("create_or_update_post", messages::CREATE_POST, e))?;

        tracing::info!(post_id = row.id, user_id = %row.user_id, "Post saved");
        Ok(row)
    }

    /// Newest `limit` posts, optionally by one author
    pub async fn fetch_posts(&self, limit: usize, user_id: Option<&str>) -> Outcome<Vec<Post>> {
        let query = PostQuery {
            limit,
            user_id: user_id.map(str::to_string),
        };
        self.backend
            .fetch_posts(query)
            .await
            .map_err(|e| Failure::from_error("fetch_posts", messages::FETCH_POSTS, e))
    }

    /// One post with its comments, newest first
    pub async fn fetch_post_details(&self, post_id: PostId) -> Outcome<PostDetails> {
        self.backend
            .fetch_post_details(post_id)
            .await
            .map_err(|e| {
                Failure::from_error("fetch_post_details", messages::FETCH_POST_DETAILS, e)
            })
    }

    pub async fn remove_post(&self, post_id: PostId) -> Outcome<()> {
        self.backend
            .delete_post(post_id)
            .await
            .map_err(|e| Failure::from_error("remove_post", messages::REMOVE_POST, e))?;
        tracing::info!(post_id, "Post removed");
        Ok(())
    }

    // =========================================================================
    // Likes
    // =========================================================================

    pub async fn create_post_like(&self, like: PostLike) -> Outcome<PostLike> {
        self.backend
            .insert_post_like(like)
            .await
            .map_err(|e| Failure::from_error("create_post_like", messages::LIKE_POST, e))
    }

    pub async fn remove_post_like(&self, post_id: PostId, user_id: &str) -> Outcome<()> {
        let like = PostLike {
            post_id,
            user_id: user_id.to_string(),
        };
        self.backend
            .delete_post_like(like)
            .await
            .map_err(|e| Failure::from_error("remove_post_like", messages::REMOVE_LIKE, e))
    }

    // =========================================================================
    // Comments
    // =========================================================================

    pub async fn create_comment(&self, comment: NewComment) -> Outcome<Comment> {
        if is_blank(&comment.text) {
            return Err(Failure::from_error(
                "create_comment",
                messages::CREATE_COMMENT,
                AppError::Validation(messages::EMPTY_COMMENT.to_string()),
            ));
        }
        self.backend
            .insert_comment(comment)
            .await
            .map_err(|e| Failure::from_error("create_comment", messages::CREATE_COMMENT, e))
    }

    pub async fn delete_comment(&self, comment_id: CommentId) -> Outcome<DeletedComment> {
        self.backend
            .delete_comment(comment_id)
            .await
            .map_err(|e| Failure::from_error("delete_comment", messages::DELETE_COMMENT, e))?;
        Ok(DeletedComment { comment_id })
    }

    // =========================================================================
    // Live changes
    // =========================================================================

    /// Every insert, update and delete on `posts`
    pub async fn watch_posts(&self) -> Result<Subscription, AppError> {
        self.backend
            .subscribe(ChangeFilter::table("posts", table::POSTS))
            .await
    }

    /// New comments on one post
    pub async fn watch_comments(&self, post_id: PostId) -> Result<Subscription, AppError> {
        let filter = ChangeFilter::table("comments", table::COMMENTS)
            .only(ChangeKind::Insert)
            .filter_eq("postId", post_id);
        self.backend.subscribe(filter).await
    }
}
