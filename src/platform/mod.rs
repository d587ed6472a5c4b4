//! Hosted backend platform
//!
//! Handles:
//! - Table queries over REST (`rest`)
//! - Email/password auth (`auth`)
//! - Object uploads (`storage`)
//! - Row change notifications over WebSocket (`realtime`)
//!
//! Everything above this module talks to the platform through the
//! [`Backend`] trait; [`SupabaseBackend`] is the HTTP implementation.

mod auth;
mod client;
mod realtime;
mod rest;
mod storage;

use async_trait::async_trait;
use tokio::sync::watch;

pub use auth::AuthClient;
pub use client::ProjectClient;
pub use realtime::{
    ChangeEvent, ChangeFilter, ChangeKind, EventFilter, RealtimeClient, Subscription, socket_url,
};
pub use rest::{QueryBuilder, RestClient};
pub use storage::{ObjectStorage, ObjectUpload};

use crate::config::AppConfig;
use crate::data::{
    AuthSession, AuthUser, Comment, CommentId, NewComment, NewNotification, Notification, Post,
    PostDetails, PostId, PostLike, PostRow, PostUpsert, User, UserUpdate,
};
use crate::error::AppError;

/// Embedded selects
pub mod select {
    pub const FEED_POST: &str = "*, user: users (id, name, image), postLikes(*), comments(count)";
    pub const POST_DETAILS: &str =
        "*, user: users (id, name, image), postLikes(*), comments(*, user: users (id, name, image))";
    pub const NOTIFICATION: &str = "*, sender: senderId (id, name, image)";
}

/// Table names
pub mod table {
    pub const USERS: &str = "users";
    pub const POSTS: &str = "posts";
    pub const POST_LIKES: &str = "postLikes";
    pub const COMMENTS: &str = "comments";
    pub const NOTIFICATIONS: &str = "notifications";
}

/// Feed query: newest first, at most `limit` rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    pub limit: usize,
    /// Restrict to one author
    pub user_id: Option<String>,
}

/// Operations the client needs from the platform
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    // ---- auth ----

    /// Register; None when e-mail confirmation is pending
    async fn sign_up(
        &self,
        email: String,
        password: String,
        name: String,
    ) -> Result<Option<AuthSession>, AppError>;

    async fn sign_in(&self, email: String, password: String) -> Result<AuthSession, AppError>;

    async fn sign_out(&self) -> Result<(), AppError>;

    /// Identity changes: Some on sign-in, None on sign-out
    fn auth_changes(&self) -> watch::Receiver<Option<AuthUser>>;

    // ---- users ----

    async fn fetch_user(&self, user_id: String) -> Result<User, AppError>;

    async fn update_user(&self, user_id: String, update: UserUpdate) -> Result<(), AppError>;

    // ---- posts ----

    async fn fetch_posts(&self, query: PostQuery) -> Result<Vec<Post>, AppError>;

    async fn fetch_post_details(&self, post_id: PostId) -> Result<PostDetails, AppError>;

    async fn upsert_post(&self, post: PostUpsert) -> Result<PostRow, AppError>;

    async fn delete_post(&self, post_id: PostId) -> Result<(), AppError>;

    async fn insert_post_like(&self, like: PostLike) -> Result<PostLike, AppError>;

    async fn delete_post_like(&self, like: PostLike) -> Result<(), AppError>;

    // ---- comments ----

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, AppError>;

    async fn delete_comment(&self, comment_id: CommentId) -> Result<(), AppError>;

    // ---- notifications ----

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, AppError>;

    async fn fetch_notifications(&self, receiver_id: String)
    -> Result<Vec<Notification>, AppError>;

    // ---- storage / realtime ----

    /// Store an object in the uploads bucket; returns its path
    async fn upload_object(&self, object: ObjectUpload) -> Result<String, AppError>;

    async fn subscribe(&self, filter: ChangeFilter) -> Result<Subscription, AppError>;
}

/// The hosted platform, over HTTP and WebSocket
pub struct SupabaseBackend {
    client: ProjectClient,
    rest: RestClient,
    auth: AuthClient,
    storage: ObjectStorage,
    realtime: RealtimeClient,
    identity: watch::Sender<Option<AuthUser>>,
}

impl SupabaseBackend {
    /// Build the backend from configuration
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built or the project URL
    /// has no WebSocket form
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let client = ProjectClient::new(config)?;
        Self::with_client(client, config)
    }

    pub fn with_client(client: ProjectClient, config: &AppConfig) -> Result<Self, AppError> {
        let (identity, _) = watch::channel(None);
        Ok(Self {
            rest: RestClient::new(client.clone()),
            auth: AuthClient::new(client.clone()),
            storage: ObjectStorage::new(client.clone(), &config.storage.bucket),
            realtime: RealtimeClient::new(client.clone(), &config.realtime)?,
            client,
            identity,
        })
    }

    pub fn client(&self) -> &ProjectClient {
        &self.client
    }

    fn start_session(&self, session: &AuthSession) {
        self.client
            .set_access_token(Some(session.access_token.clone()));
        self.identity.send_replace(Some(session.user.clone()));
        tracing::info!(user_id = %session.user.id, "Session started");
    }
}

#[async_trait]
impl Backend for SupabaseBackend {
    async fn sign_up(
        &self,
        email: String,
        password: String,
        name: String,
    ) -> Result<Option<AuthSession>, AppError> {
        let session = self.auth.sign_up(&email, &password, &name).await?;
        match &session {
            Some(session) => self.start_session(session),
            None => tracing::info!("Sign-up pending e-mail confirmation"),
        }
        Ok(session)
    }

    async fn sign_in(&self, email: String, password: String) -> Result<AuthSession, AppError> {
        let session = self.auth.sign_in_with_password(&email, &password).await?;
        self.start_session(&session);
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        self.auth.sign_out().await?;
        self.client.set_access_token(None);
        self.identity.send_replace(None);
        tracing::info!("Session ended");
        Ok(())
    }

    fn auth_changes(&self) -> watch::Receiver<Option<AuthUser>> {
        self.identity.subscribe()
    }

    async fn fetch_user(&self, user_id: String) -> Result<User, AppError> {
        self.rest
            .from(table::USERS)
            .select("*")
            .eq("id", user_id)
            .single()
            .await
    }

    async fn update_user(&self, user_id: String, update: UserUpdate) -> Result<(), AppError> {
        self.rest
            .from(table::USERS)
            .eq("id", user_id)
            .update(&update)
            .await
    }

    async fn fetch_posts(&self, query: PostQuery) -> Result<Vec<Post>, AppError> {
        let mut builder = self.rest.from(table::POSTS).select(select::FEED_POST);
        if let Some(user_id) = &query.user_id {
            builder = builder.eq("userId", user_id);
        }
        builder
            .order("created_at", false)
            .limit(query.limit)
            .fetch()
            .await
    }

    async fn fetch_post_details(&self, post_id: PostId) -> Result<PostDetails, AppError> {
        self.rest
            .from(table::POSTS)
            .select(select::POST_DETAILS)
            .eq("id", post_id)
            .order_embedded(table::COMMENTS, "created_at", false)
            .single()
            .await
    }

    async fn upsert_post(&self, post: PostUpsert) -> Result<PostRow, AppError> {
        self.rest.from(table::POSTS).upsert(&post).await
    }

    async fn delete_post(&self, post_id: PostId) -> Result<(), AppError> {
        self.rest.from(table::POSTS).eq("id", post_id).delete().await
    }

    async fn insert_post_like(&self, like: PostLike) -> Result<PostLike, AppError> {
        self.rest.from(table::POST_LIKES).insert(&like).await
    }

    async fn delete_post_like(&self, like: PostLike) -> Result<(), AppError> {
        self.rest
            .from(table::POST_LIKES)
            .eq("userId", like.user_id)
            .eq("postId", like.post_id)
            .delete()
            .await
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, AppError> {
        self.rest.from(table::COMMENTS).insert(&comment).await
    }

    async fn delete_comment(&self, comment_id: CommentId) -> Result<(), AppError> {
        self.rest
            .from(table::COMMENTS)
            .eq("id", comment_id)
            .delete()
            .await
    }

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, AppError> {
        self.rest
            .from(table::NOTIFICATIONS)
            .insert(&notification)
            .await
    }

    async fn fetch_notifications(
        &self,
        receiver_id: String,
    ) -> Result<Vec<Notification>, AppError> {
        self.rest
            .from(table::NOTIFICATIONS)
            .select(select::NOTIFICATION)
            .eq("receiverId", receiver_id)
            .order("created_at", false)
            .fetch()
            .await
    }

    async fn upload_object(&self, object: ObjectUpload) -> Result<String, AppError> {
        self.storage.upload(object).await
    }

    async fn subscribe(&self, filter: ChangeFilter) -> Result<Subscription, AppError> {
        self.realtime.subscribe(filter).await
    }
}
