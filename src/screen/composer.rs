//! New/edit post screen

use super::Liveness;
use crate::data::{Post, PostDraft, PostId, PostRow};
use crate::error::{Failure, Outcome};
use crate::service::{PostService, messages};
use crate::storage::{LocalMedia, MediaKind, MediaRef};

/// Draft state of the composer
pub struct Composer {
    posts: PostService,
    editing: Option<PostId>,
    body: String,
    media: Option<MediaRef>,
    busy: bool,
    liveness: Liveness,
}

impl Composer {
    /// Empty composer for a new post
    pub fn new(posts: PostService, liveness: Liveness) -> Self {
        Self {
            posts,
            editing: None,
            body: String::new(),
            media: None,
            busy: false,
            liveness,
        }
    }

    /// Composer seeded from an existing post
    pub fn edit(posts: PostService, post: &Post, liveness: Liveness) -> Self {
        let mut composer = Self::new(posts, liveness);
        composer.editing = Some(post.id());
        composer.body = post.row.body.clone();
        composer.media = post.row.file.clone().map(MediaRef::remote);
        composer
    }

    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    pub fn media(&self) -> Option<&MediaRef> {
        self.media.as_ref()
    }

    pub fn pick_media(&mut self, media: LocalMedia) {
        self.media = Some(MediaRef::Local(media));
    }

    pub fn clear_media(&mut self) {
        self.media = None;
    }

    /// URI and kind for the attachment preview
    pub fn display_media(&self) -> Option<(String, MediaKind)> {
        let media = self.media.as_ref()?;
        Some((
            self.posts.media().resolve_display_uri(media),
            media.classify_kind(),
        ))
    }

    /// Validate and mark busy
    ///
    /// # Returns
    /// The draft to save, or the validation failure. Fails while a previous
    /// submit is still in flight.
    pub fn begin_submit(&mut self, user_id: &str) -> Outcome<PostDraft> {
        if self.busy {
            return Err(Failure::new(messages::POST_NOT_SAVED));
        }
        if self.body.trim().is_empty() && self.media.is_none() {
            return Err(Failure::new(messages::EMPTY_POST));
        }
        self.busy = true;
        Ok(PostDraft {
            id: self.editing,
            body: self.body.clone(),
            file: self.media.clone(),
            user_id: user_id.to_string(),
        })
    }

    /// Apply the save result: clear the draft on success
    pub fn finish_submit(&mut self, result: Outcome<PostRow>) -> Outcome<PostRow> {
        self.busy = false;
        match result {
            Ok(row) => {
                if self.liveness.is_alive() {
                    self.body.clear();
                    self.media = None;
                }
                Ok(row)
            }
            Err(failure) => {
                tracing::warn!(reason = %failure, editing = ?self.editing, "Post not saved");
                Err(Failure::new(messages::POST_NOT_SAVED))
            }
        }
    }

    /// Save the draft as `user_id`
    pub async fn submit(&mut self, user_id: &str) -> Outcome<PostRow> {
        let draft = self.begin_submit(user_id)?;
        let result = self.posts.create_or_update_post(draft).await;
        self.finish_submit(result)
    }
}
