//! Service layer
//!
//! One method per entity operation. Each issues a single platform request
//! (plus an upload where media is involved) and returns `Outcome<T>`:
//! failures are logged and reduced to a user-facing message.

mod auth;
mod notification;
mod post;
mod user;

pub use auth::AuthService;
pub use notification::NotificationService;
pub use post::PostService;
pub use user::UserService;

/// Messages shown for failed operations
pub mod messages {
    pub const FILL_ALL_FIELDS: &str = "Please fill all the fields";
    pub const FILL_ALL_PROFILE_FIELDS: &str = "Please fill all the fields!";
    pub const EMPTY_POST: &str = "Please choose an image or add a post text";
    pub const EMPTY_COMMENT: &str = "Comment cannot be empty";

    pub const FETCH_POSTS: &str = "Error fetching posts";
    pub const FETCH_POST_DETAILS: &str = "Error fetching post details";
    pub const CREATE_POST: &str = "Error creating post";
    pub const REMOVE_POST: &str = "Could not remove post";
    pub const LIKE_POST: &str = "Could not like post";
    pub const REMOVE_LIKE: &str = "Could not remove like";
    pub const CREATE_COMMENT: &str = "Could not create comment";
    pub const DELETE_COMMENT: &str = "Could not delete comment";
    pub const SEND_NOTIFICATION: &str = "Could not send notification";
    pub const FETCH_NOTIFICATIONS: &str = "Error fetching notifications";
    pub const SIGN_OUT: &str = "Error signing out!";

    pub const POST_NOT_SAVED: &str = "There was an error creating your post!";
    pub const PROFILE_NOT_UPDATED: &str = "There was an error updating your profile!";
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}
