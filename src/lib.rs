//! LinkUp - client core of a small social feed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Screen / Feed controllers                    │
//! │  - Paginated feeds with live inserts/deletes                │
//! │  - Post detail, composer, profile editor, notifications     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - One operation per entity, returning Outcome<T>           │
//! │  - Session store, media upload/download                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Platform (Backend trait)                      │
//! │  - REST query builder, password auth                        │
//! │  - Object storage, realtime change feed (WebSocket)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `platform`: Hosted backend client and the `Backend` seam
//! - `service`: Data-access operations
//! - `feed`: Feed reconciliation, post detail, like toggle
//! - `screen`: Composer, profile editor, notifications, share text
//! - `storage`: Media references, upload and download
//! - `auth`: Session store
//! - `data`: Row and view models
//! - `config`: Configuration management
//! - `error`: Error types

pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod platform;
pub mod screen;
pub mod service;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use data::{CommentId, Post, PostId};
use feed::{FeedController, FeedKind, PostDetail};
use screen::{Composer, NotificationsScreen, ProfileEditor, ScreenScope};

/// Services shared by every screen
///
/// Cloned into each controller the UI mounts.
#[derive(Clone)]
pub struct LinkUp {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Hosted backend
    pub backend: Arc<dyn platform::Backend>,

    pub auth: service::AuthService,
    pub users: service::UserService,
    pub posts: service::PostService,
    pub notifications: service::NotificationService,

    /// Upload/download of post and profile media
    pub media: storage::MediaStorage,

    /// Signed-in identity and profile
    pub session: auth::SessionStore,
}

impl LinkUp {
    /// Connect to the configured project
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built or the project URL
    /// has no realtime endpoint
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!(project = %config.backend.base_url(), "Initializing LinkUp...");

        let backend = platform::SupabaseBackend::new(&config)?;
        let http = backend.client().http().clone();
        Ok(Self::assemble(config, Arc::new(backend), http))
    }

    /// Wire the services over any backend
    pub fn with_backend(
        config: config::AppConfig,
        backend: Arc<dyn platform::Backend>,
    ) -> Result<Self, error::AppError> {
        let http = reqwest::Client::builder()
            .user_agent(config.http.user_agent.clone())
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .build()?;
        Ok(Self::assemble(config, backend, http))
    }

    fn assemble(
        config: config::AppConfig,
        backend: Arc<dyn platform::Backend>,
        http: reqwest::Client,
    ) -> Self {
        let media = storage::MediaStorage::new(backend.clone(), http, &config);
        let users = service::UserService::new(backend.clone());

        Self {
            auth: service::AuthService::new(backend.clone()),
            posts: service::PostService::new(backend.clone(), media.clone()),
            notifications: service::NotificationService::new(backend.clone()),
            session: auth::SessionStore::new(users.clone()),
            users,
            media,
            backend,
            config: Arc::new(config),
        }
    }

    /// Apply auth-state changes to the session until the backend goes away
    pub async fn run_session(&self, on_route: impl FnMut(auth::Route)) {
        self.session
            .run(self.backend.auth_changes(), on_route)
            .await;
    }

    pub fn home_feed(&self, scope: &ScreenScope) -> FeedController {
        self.feed(FeedKind::Home, scope)
    }

    /// Home feed that is meant to follow live inserts/deletes
    pub fn live_feed(&self, scope: &ScreenScope) -> FeedController {
        self.feed(FeedKind::LiveHome, scope)
    }

    pub fn profile_feed(&self, user_id: &str, scope: &ScreenScope) -> FeedController {
        self.feed(
            FeedKind::Profile {
                user_id: user_id.to_string(),
            },
            scope,
        )
    }

    fn feed(&self, kind: FeedKind, scope: &ScreenScope) -> FeedController {
        FeedController::new(
            self.posts.clone(),
            self.users.clone(),
            kind,
            &self.config.feed,
            scope.liveness(),
        )
    }

    /// Detail view, optionally deep-linked to a comment
    pub fn post_detail(
        &self,
        post_id: PostId,
        target_comment: Option<CommentId>,
        scope: &ScreenScope,
    ) -> PostDetail {
        PostDetail::new(
            self.posts.clone(),
            self.users.clone(),
            self.notifications.clone(),
            post_id,
            target_comment,
            &self.config.feed,
            scope.liveness(),
        )
    }

    /// Composer for a new post, or for editing `post`
    pub fn composer(&self, post: Option<&Post>, scope: &ScreenScope) -> Composer {
        match post {
            Some(post) => Composer::edit(self.posts.clone(), post, scope.liveness()),
            None => Composer::new(self.posts.clone(), scope.liveness()),
        }
    }

    pub fn profile_editor(&self, scope: &ScreenScope) -> ProfileEditor {
        ProfileEditor::new(
            self.users.clone(),
            self.media.clone(),
            self.session.clone(),
            scope.liveness(),
        )
    }

    pub fn notifications_screen(&self, scope: &ScreenScope) -> NotificationsScreen {
        NotificationsScreen::new(self.notifications.clone(), scope.liveness())
    }
}
