//! Data models
//!
//! Rust structs mirroring the rows the client reads from and writes to the
//! hosted tables. Field names on the wire follow the table columns
//! (`userId`, `postLikes`, `created_at`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::storage::MediaRef;

// =============================================================================
// ID Types
// =============================================================================

/// `posts.id`
pub type PostId = i64;
/// `comments.id`
pub type CommentId = i64;
/// `notifications.id`
pub type NotificationId = i64;

/// Treat an explicit `null` like a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Users
// =============================================================================

/// Author summary embedded in posts, comments and notifications
///
/// Every field is optional: an author that could not be fetched is the
/// empty object `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl UserSummary {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_none() && self.image.is_none()
    }
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: Some(user.id.clone()),
            name: user.name.clone(),
            image: user.image.clone(),
        }
    }
}

/// A `users` row, plus the e-mail merged in from the auth session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "phoneNumber", default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    /// Stored path of the avatar (e.g. "profiles/1712345678901.png")
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl User {
    /// Merge a profile update into this record
    pub fn apply(&mut self, update: &UserUpdate) {
        self.name = Some(update.name.clone());
        self.phone_number = Some(update.phone_number.clone());
        self.address = Some(update.address.clone());
        self.bio = Some(update.bio.clone());
        self.image = update.image.clone();
    }
}

/// Columns written by the profile editor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    pub name: String,
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
    pub image: Option<String>,
    pub bio: String,
    pub address: String,
}

/// Identity carried by the auth session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A signed-in session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds) at which `access_token` expires
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

// =============================================================================
// Posts
// =============================================================================

/// A bare `posts` row, as delivered by the change feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRow {
    pub id: PostId,
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Rich-text HTML
    #[serde(default, deserialize_with = "nullable")]
    pub body: String,
    /// Stored media path
    #[serde(default)]
    pub file: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A post as shown in a feed
///
/// Denormalized at fetch time with the author summary, the likes, and the
/// comment count (`comments: [{"count": n}]` on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(flatten)]
    pub row: PostRow,
    #[serde(default, deserialize_with = "nullable")]
    pub user: UserSummary,
    #[serde(rename = "postLikes", default, deserialize_with = "nullable")]
    pub likes: Vec<PostLike>,
    #[serde(rename = "comments", default, with = "comment_count")]
    pub comment_count: u64,
}

impl Post {
    /// A freshly inserted row: no likes, no comments yet
    pub fn from_row(row: PostRow, user: UserSummary) -> Self {
        Self {
            row,
            user,
            likes: Vec::new(),
            comment_count: 0,
        }
    }

    pub fn id(&self) -> PostId {
        self.row.id
    }

    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|like| like.user_id == user_id)
    }
}

/// A post with its full comment list (newest first)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDetails {
    #[serde(flatten)]
    pub row: PostRow,
    #[serde(default, deserialize_with = "nullable")]
    pub user: UserSummary,
    #[serde(rename = "postLikes", default, deserialize_with = "nullable")]
    pub likes: Vec<PostLike>,
    #[serde(default, deserialize_with = "nullable")]
    pub comments: Vec<Comment>,
}

impl PostDetails {
    pub fn id(&self) -> PostId {
        self.row.id
    }

    /// The feed form of this post (comment list collapsed to its count)
    pub fn as_post(&self) -> Post {
        Post {
            row: self.row.clone(),
            user: self.user.clone(),
            likes: self.likes.clone(),
            comment_count: self.comments.len() as u64,
        }
    }
}

/// `comments(count)` aggregate: `[{"count": n}]` on the wire
mod comment_count {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Aggregate {
        count: u64,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Aggregate(Vec<Aggregate>),
        Plain(u64),
    }

    pub fn serialize<S: Serializer>(count: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        vec![Aggregate { count: *count }].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        Ok(match Option::<Wire>::deserialize(deserializer)? {
            Some(Wire::Aggregate(rows)) => rows.first().map_or(0, |row| row.count),
            Some(Wire::Plain(count)) => count,
            None => 0,
        })
    }
}

/// Post as submitted by the composer
///
/// `file` may still be a local pick; it is uploaded before the upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct PostDraft {
    /// Set when editing an existing post
    pub id: Option<PostId>,
    pub body: String,
    pub file: Option<MediaRef>,
    pub user_id: String,
}

/// Row sent to `posts` on create/update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostUpsert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PostId>,
    pub body: String,
    pub file: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: String,
}

// =============================================================================
// Likes
// =============================================================================

/// A `postLikes` row; its existence means "liked"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostLike {
    #[serde(rename = "postId")]
    pub post_id: PostId,
    #[serde(rename = "userId")]
    pub user_id: String,
}

// =============================================================================
// Comments
// =============================================================================

/// A `comments` row, with its author once denormalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    #[serde(rename = "postId")]
    pub post_id: PostId,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "nullable")]
    pub user: UserSummary,
}

/// Row sent to `comments` on create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    #[serde(rename = "postId")]
    pub post_id: PostId,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub text: String,
}

/// Payload of a successful comment delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedComment {
    #[serde(rename = "commentId")]
    pub comment_id: CommentId,
}

// =============================================================================
// Notifications
// =============================================================================

/// A `notifications` row with its sender summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "senderId")]
    pub sender_id: String,
    #[serde(rename = "receiverId")]
    pub receiver_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    /// JSON text, opaque to the table
    #[serde(default, deserialize_with = "nullable")]
    pub data: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "nullable")]
    pub sender: UserSummary,
}

impl Notification {
    /// Decode the deep-link target from `data`
    pub fn target(&self) -> Option<NotificationTarget> {
        match serde_json::from_str(&self.data) {
            Ok(target) => Some(target),
            Err(error) => {
                tracing::debug!(
                    notification_id = self.id,
                    %error,
                    "Notification data has no post target"
                );
                None
            }
        }
    }
}

/// Deep-link target stored in `notifications.data`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTarget {
    #[serde(rename = "postId", deserialize_with = "lenient_id")]
    pub post_id: PostId,
    #[serde(
        rename = "commentId",
        default,
        deserialize_with = "lenient_optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub comment_id: Option<CommentId>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(i64),
    Text(String),
}

impl IdRepr {
    fn into_id<E: serde::de::Error>(self) -> Result<i64, E> {
        match self {
            IdRepr::Number(id) => Ok(id),
            IdRepr::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid id: {text:?}"))),
        }
    }
}

/// Ids written by older clients may be strings (`"42"`)
fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    IdRepr::deserialize(deserializer)?.into_id()
}

fn lenient_optional_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<i64>, D::Error> {
    Option::<IdRepr>::deserialize(deserializer)?
        .map(IdRepr::into_id)
        .transpose()
}

/// Row sent to `notifications` on create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    #[serde(rename = "senderId")]
    pub sender_id: String,
    #[serde(rename = "receiverId")]
    pub receiver_id: String,
    pub title: String,
    pub data: String,
}

impl NewNotification {
    pub const COMMENT_TITLE: &'static str = "Commented on your post";

    /// Notification sent to a post's author when someone comments on it
    pub fn comment(
        sender_id: &str,
        receiver_id: &str,
        post_id: PostId,
        comment_id: Option<CommentId>,
    ) -> Result<Self, serde_json::Error> {
        let data = serde_json::to_string(&NotificationTarget {
            post_id,
            comment_id,
        })?;
        Ok(Self {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            title: Self::COMMENT_TITLE.to_string(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed_row() -> serde_json::Value {
        json!({
            "id": 7,
            "userId": "user-1",
            "body": "<p>hello</p>",
            "file": "postImages/1712.png",
            "created_at": "2024-05-01T12:00:00.123456+00:00",
            "user": {"id": "user-1", "name": "Ada", "image": null},
            "postLikes": [{"id": 3, "postId": 7, "userId": "user-2", "created_at": "2024-05-01T12:01:00+00:00"}],
            "comments": [{"count": 4}]
        })
    }

    #[test]
    fn feed_post_decodes_aggregates() {
        let post: Post = serde_json::from_value(feed_row()).unwrap();
        assert_eq!(post.id(), 7);
        assert_eq!(post.user.name.as_deref(), Some("Ada"));
        assert_eq!(post.comment_count, 4);
        assert_eq!(post.like_count(), 1);
        assert!(post.is_liked_by("user-2"));
        assert!(!post.is_liked_by("user-1"));
    }

    #[test]
    fn feed_post_tolerates_nulls() {
        let post: Post = serde_json::from_value(json!({
            "id": 1,
            "userId": "u",
            "body": null,
            "file": null,
            "created_at": "2024-05-01T12:00:00Z",
            "user": null,
            "postLikes": null,
            "comments": null
        }))
        .unwrap();
        assert_eq!(post.row.body, "");
        assert!(post.user.is_empty());
        assert!(post.likes.is_empty());
        assert_eq!(post.comment_count, 0);
    }

    #[test]
    fn comment_count_serializes_as_aggregate() {
        let post: Post = serde_json::from_value(feed_row()).unwrap();
        let value = serde_json::to_value(&post).unwrap();
        assert_eq!(value["comments"], json!([{"count": 4}]));
        assert_eq!(value["userId"], json!("user-1"));
    }

    #[test]
    fn empty_author_serializes_as_empty_object() {
        assert_eq!(
            serde_json::to_value(UserSummary::default()).unwrap(),
            json!({})
        );
    }

    #[test]
    fn details_collapse_to_feed_form() {
        let details: PostDetails = serde_json::from_value(json!({
            "id": 9,
            "userId": "author",
            "body": "b",
            "file": null,
            "created_at": "2024-05-01T12:00:00Z",
            "user": {"id": "author"},
            "postLikes": [],
            "comments": [
                {"id": 2, "postId": 9, "userId": "x", "text": "second", "created_at": "2024-05-01T12:02:00Z", "user": {"id": "x"}},
                {"id": 1, "postId": 9, "userId": "y", "text": "first", "created_at": "2024-05-01T12:01:00Z"}
            ]
        }))
        .unwrap();
        assert_eq!(details.comments.len(), 2);
        assert!(details.comments[1].user.is_empty());
        assert_eq!(details.as_post().comment_count, 2);
    }

    #[test]
    fn notification_target_accepts_string_ids() {
        let notification = Notification {
            id: 1,
            sender_id: "a".to_string(),
            receiver_id: "b".to_string(),
            title: NewNotification::COMMENT_TITLE.to_string(),
            data: r#"{"postId":"12","commentId":34}"#.to_string(),
            created_at: Utc::now(),
            sender: UserSummary::default(),
        };
        assert_eq!(
            notification.target(),
            Some(NotificationTarget {
                post_id: 12,
                comment_id: Some(34)
            })
        );
    }

    #[test]
    fn notification_without_json_has_no_target() {
        let notification = Notification {
            id: 1,
            sender_id: "a".to_string(),
            receiver_id: "b".to_string(),
            title: "hi".to_string(),
            data: String::new(),
            created_at: Utc::now(),
            sender: UserSummary::default(),
        };
        assert_eq!(notification.target(), None);
    }

    #[test]
    fn comment_notification_payload() {
        let notification = NewNotification::comment("me", "author", 5, Some(8)).unwrap();
        assert_eq!(notification.title, "Commented on your post");
        let data: serde_json::Value = serde_json::from_str(&notification.data).unwrap();
        assert_eq!(data, json!({"postId": 5, "commentId": 8}));
    }

    #[test]
    fn user_update_merges_into_profile() {
        let mut user = User {
            id: "u".to_string(),
            email: Some("u@example.com".to_string()),
            ..Default::default()
        };
        user.apply(&UserUpdate {
            name: "Ada".to_string(),
            phone_number: "555".to_string(),
            image: Some("profiles/1.png".to_string()),
            bio: "bio".to_string(),
            address: "addr".to_string(),
        });
        assert_eq!(user.name.as_deref(), Some("Ada"));
        assert_eq!(user.phone_number.as_deref(), Some("555"));
        assert_eq!(user.email.as_deref(), Some("u@example.com"));
    }
}
