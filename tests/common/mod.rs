//! Common test utilities for integration tests

#![allow(dead_code)]

pub mod schema_validator;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use linkup::LinkUp;
use linkup::config::AppConfig;
use linkup::data::{
    AuthSession, AuthUser, Comment, CommentId, NewComment, NewNotification, Notification, Post,
    PostDetails, PostId, PostLike, PostRow, PostUpsert, User, UserSummary, UserUpdate,
};
use linkup::error::AppError;
use linkup::platform::{
    Backend, ChangeEvent, ChangeFilter, ObjectUpload, PostQuery, Subscription, table,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

/// Test configuration rooted in a temporary download directory
pub fn test_config(download_dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::for_project("https://project.example.com", "anon-key");
    config.storage.download_dir = download_dir.path().to_path_buf();
    config.http.user_agent = "LinkUp/test".to_string();
    config
}

/// Services wired over an in-memory backend
pub struct TestApp {
    pub app: LinkUp,
    pub backend: Arc<MemoryBackend>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir);
        adjust(&mut config);
        let backend = Arc::new(MemoryBackend::new());
        let app = LinkUp::with_backend(config, backend.clone()).unwrap();
        Self {
            app,
            backend,
            _temp_dir: temp_dir,
        }
    }
}

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    posts: Vec<PostRow>,
    likes: Vec<PostLike>,
    comments: Vec<Comment>,
    notifications: Vec<Notification>,
    uploads: Vec<ObjectUpload>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn summary(&self, user_id: &str) -> UserSummary {
        self.users
            .get(user_id)
            .map(UserSummary::from)
            .unwrap_or_default()
    }
}

/// In-memory stand-in for the hosted platform
///
/// Rows live in plain vectors; writes to `posts` and `comments` are echoed
/// to matching subscriptions the way the change feed would.
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    subscribers: Arc<Mutex<Vec<(ChangeFilter, mpsc::UnboundedSender<ChangeEvent>)>>>,
    failing: Mutex<HashSet<&'static str>>,
    identity: watch::Sender<Option<AuthUser>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            tables: Mutex::new(Tables {
                next_id: 1000,
                ..Default::default()
            }),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            failing: Mutex::new(HashSet::new()),
            identity,
        }
    }

    /// Make `operation` (a `Backend` method name) fail until `recover`
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.failing.lock().unwrap().remove(operation);
    }

    fn check(&self, operation: &'static str) -> Result<(), AppError> {
        if self.failing.lock().unwrap().contains(operation) {
            return Err(AppError::Backend(format!("{operation} unavailable")));
        }
        Ok(())
    }

    pub fn add_user(&self, id: &str, name: &str) -> User {
        let user = User {
            id: id.to_string(),
            name: Some(name.to_string()),
            image: Some(format!("profiles/{id}.png")),
            ..Default::default()
        };
        self.tables
            .lock()
            .unwrap()
            .users
            .insert(id.to_string(), user.clone());
        user
    }

    /// Store a post without echoing it to subscribers
    pub fn seed_post(&self, user_id: &str, body: &str, created_at: DateTime<Utc>) -> PostRow {
        let mut tables = self.tables.lock().unwrap();
        let row = PostRow {
            id: tables.next_id(),
            user_id: user_id.to_string(),
            body: body.to_string(),
            file: None,
            created_at,
        };
        tables.posts.push(row.clone());
        row
    }

    /// `count` posts by `user_id`, one minute apart, newest last
    pub fn seed_posts(&self, user_id: &str, count: usize) -> Vec<PostRow> {
        (0..count)
            .map(|index| self.seed_post(user_id, &format!("<p>post {index}</p>"), minute(index)))
            .collect()
    }

    pub fn seed_comment(&self, post_id: PostId, user_id: &str, text: &str) -> Comment {
        let mut tables = self.tables.lock().unwrap();
        let comment = Comment {
            id: tables.next_id(),
            post_id,
            user_id: user_id.to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
            user: UserSummary::default(),
        };
        tables.comments.push(comment.clone());
        comment
    }

    pub fn post_ids(&self) -> Vec<PostId> {
        self.tables.lock().unwrap().posts.iter().map(|row| row.id).collect()
    }

    pub fn likes(&self) -> Vec<PostLike> {
        self.tables.lock().unwrap().likes.clone()
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.tables.lock().unwrap().comments.clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.tables.lock().unwrap().notifications.clone()
    }

    pub fn uploads(&self) -> Vec<ObjectUpload> {
        self.tables.lock().unwrap().uploads.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|(_, sender)| !sender.is_closed());
        subscribers.len()
    }

    /// Deliver a change as if committed by another client
    pub fn emit(&self, event: ChangeEvent) {
        let subscribers = self.subscribers.lock().unwrap();
        for (filter, sender) in subscribers.iter() {
            if matches(filter, &event) {
                let _ = sender.send(event.clone());
            }
        }
    }

    fn sign_in_as(&self, user: AuthUser) -> AuthSession {
        self.identity.send_replace(Some(user.clone()));
        AuthSession {
            access_token: format!("token-{}", user.id),
            refresh_token: None,
            expires_at: None,
            user,
        }
    }
}

fn matches(filter: &ChangeFilter, event: &ChangeEvent) -> bool {
    if filter.table != event.table || !filter.event.matches(event.kind) {
        return false;
    }
    let Some(predicate) = &filter.filter else {
        return true;
    };
    let Some((column, value)) = predicate.split_once("=eq.") else {
        return false;
    };
    match event.record.get(column) {
        Some(Value::String(actual)) => actual == value,
        Some(other) => other.to_string() == value,
        None => false,
    }
}

/// Timestamp `index` minutes after a fixed origin
pub fn minute(index: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::minutes(index as i64)
}

pub fn row_json(row: &PostRow) -> Value {
    serde_json::to_value(row).unwrap()
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn sign_up(
        &self,
        email: String,
        _password: String,
        name: String,
    ) -> Result<Option<AuthSession>, AppError> {
        self.check("sign_up")?;
        let id = format!("user-{}", self.tables.lock().unwrap().next_id());
        self.add_user(&id, &name);
        Ok(Some(self.sign_in_as(AuthUser {
            id,
            email: Some(email),
        })))
    }

    async fn sign_in(&self, email: String, _password: String) -> Result<AuthSession, AppError> {
        self.check("sign_in")?;
        let id = email.split('@').next().unwrap_or_default().to_string();
        Ok(self.sign_in_as(AuthUser {
            id,
            email: Some(email),
        }))
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        self.check("sign_out")?;
        self.identity.send_replace(None);
        Ok(())
    }

    fn auth_changes(&self) -> watch::Receiver<Option<AuthUser>> {
        self.identity.subscribe()
    }

    async fn fetch_user(&self, user_id: String) -> Result<User, AppError> {
        self.check("fetch_user")?;
        self.tables
            .lock()
            .unwrap()
            .users
            .get(&user_id)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn update_user(&self, user_id: String, update: UserUpdate) -> Result<(), AppError> {
        self.check("update_user")?;
        let mut tables = self.tables.lock().unwrap();
        let user = tables.users.get_mut(&user_id).ok_or(AppError::NotFound)?;
        user.apply(&update);
        Ok(())
    }

    async fn fetch_posts(&self, query: PostQuery) -> Result<Vec<Post>, AppError> {
        self.check("fetch_posts")?;
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<&PostRow> = tables
            .posts
            .iter()
            .filter(|row| query.user_id.as_ref().is_none_or(|id| &row.user_id == id))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .take(query.limit)
            .map(|row| Post {
                row: row.clone(),
                user: tables.summary(&row.user_id),
                likes: tables
                    .likes
                    .iter()
                    .filter(|like| like.post_id == row.id)
                    .cloned()
                    .collect(),
                comment_count: tables
                    .comments
                    .iter()
                    .filter(|comment| comment.post_id == row.id)
                    .count() as u64,
            })
            .collect())
    }

    async fn fetch_post_details(&self, post_id: PostId) -> Result<PostDetails, AppError> {
        self.check("fetch_post_details")?;
        let tables = self.tables.lock().unwrap();
        let row = tables
            .posts
            .iter()
            .find(|row| row.id == post_id)
            .cloned()
            .ok_or(AppError::NotFound)?;
        let mut comments: Vec<Comment> = tables
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .map(|comment| Comment {
                user: tables.summary(&comment.user_id),
                ..comment.clone()
            })
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(PostDetails {
            user: tables.summary(&row.user_id),
            likes: tables
                .likes
                .iter()
                .filter(|like| like.post_id == post_id)
                .cloned()
                .collect(),
            comments,
            row,
        })
    }

    async fn upsert_post(&self, post: PostUpsert) -> Result<PostRow, AppError> {
        self.check("upsert_post")?;
        let (row, inserted) = {
            let mut tables = self.tables.lock().unwrap();
            let position = post
                .id
                .and_then(|id| tables.posts.iter().position(|row| row.id == id));
            match position {
                Some(index) => {
                    let existing = &mut tables.posts[index];
                    existing.body = post.body;
                    existing.file = post.file;
                    (existing.clone(), false)
                }
                None => {
                    let row = PostRow {
                        id: tables.next_id(),
                        user_id: post.user_id,
                        body: post.body,
                        file: post.file,
                        created_at: Utc::now(),
                    };
                    tables.posts.push(row.clone());
                    (row, true)
                }
            }
        };
        if inserted {
            self.emit(ChangeEvent::insert(table::POSTS, row_json(&row)));
        }
        Ok(row)
    }

    async fn delete_post(&self, post_id: PostId) -> Result<(), AppError> {
        self.check("delete_post")?;
        self.tables
            .lock()
            .unwrap()
            .posts
            .retain(|row| row.id != post_id);
        self.emit(ChangeEvent::delete(
            table::POSTS,
            serde_json::json!({ "id": post_id }),
        ));
        Ok(())
    }

    async fn insert_post_like(&self, like: PostLike) -> Result<PostLike, AppError> {
        self.check("insert_post_like")?;
        self.tables.lock().unwrap().likes.push(like.clone());
        Ok(like)
    }

    async fn delete_post_like(&self, like: PostLike) -> Result<(), AppError> {
        self.check("delete_post_like")?;
        self.tables
            .lock()
            .unwrap()
            .likes
            .retain(|existing| existing != &like);
        Ok(())
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, AppError> {
        self.check("insert_comment")?;
        let created = {
            let mut tables = self.tables.lock().unwrap();
            let created = Comment {
                id: tables.next_id(),
                post_id: comment.post_id,
                user_id: comment.user_id,
                text: comment.text,
                created_at: Utc::now(),
                user: UserSummary::default(),
            };
            tables.comments.push(created.clone());
            created
        };
        self.emit(ChangeEvent::insert(
            table::COMMENTS,
            serde_json::to_value(&created)?,
        ));
        Ok(created)
    }

    async fn delete_comment(&self, comment_id: CommentId) -> Result<(), AppError> {
        self.check("delete_comment")?;
        self.tables
            .lock()
            .unwrap()
            .comments
            .retain(|comment| comment.id != comment_id);
        Ok(())
    }

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, AppError> {
        self.check("insert_notification")?;
        let mut tables = self.tables.lock().unwrap();
        let created = Notification {
            id: tables.next_id(),
            sender: tables.summary(&notification.sender_id),
            sender_id: notification.sender_id,
            receiver_id: notification.receiver_id,
            title: notification.title,
            data: notification.data,
            created_at: Utc::now(),
        };
        tables.notifications.push(created.clone());
        Ok(created)
    }

    async fn fetch_notifications(
        &self,
        receiver_id: String,
    ) -> Result<Vec<Notification>, AppError> {
        self.check("fetch_notifications")?;
        let tables = self.tables.lock().unwrap();
        let mut items: Vec<Notification> = tables
            .notifications
            .iter()
            .filter(|item| item.receiver_id == receiver_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(items)
    }

    async fn upload_object(&self, object: ObjectUpload) -> Result<String, AppError> {
        self.check("upload_object")?;
        let path = object.path.trim_start_matches('/').to_string();
        self.tables.lock().unwrap().uploads.push(object);
        Ok(path)
    }

    async fn subscribe(&self, filter: ChangeFilter) -> Result<Subscription, AppError> {
        self.check("subscribe")?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let topic = format!("realtime:{}", filter.channel);
        self.subscribers.lock().unwrap().push((filter, sender));
        Ok(Subscription::new(topic, receiver, || {}))
    }
}
