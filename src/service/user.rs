//! User service
//!
//! Profile reads and writes. Failures carry the platform's own message.

use std::sync::Arc;

use crate::data::{User, UserUpdate};
use crate::error::{Failure, Outcome};
use crate::platform::Backend;

/// User service
#[derive(Clone)]
pub struct UserService {
    backend: Arc<dyn Backend>,
}

impl UserService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// The `users` row for `user_id`
    pub async fn get_user_data(&self, user_id: &str) -> Outcome<User> {
        self.backend
            .fetch_user(user_id.to_string())
            .await
            .map_err(|e| Failure::passthrough("get_user_data", e))
    }

    pub async fn update_user(&self, user_id: &str, update: UserUpdate) -> Outcome<()> {
        self.backend
            .update_user(user_id.to_string(), update)
            .await
            .map_err(|e| Failure::passthrough("update_user", e))?;
        tracing::info!(user_id, "Profile updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::platform::MockBackend;

    #[tokio::test]
    async fn backend_message_is_surfaced() {
        let mut backend = MockBackend::new();
        backend.expect_fetch_user().returning(|_| {
            Err(AppError::Backend(
                "JSON object requested, multiple (or no) rows returned".to_string(),
            ))
        });

        let failure = UserService::new(Arc::new(backend))
            .get_user_data("u-1")
            .await
            .unwrap_err();
        assert_eq!(
            failure.msg,
            "JSON object requested, multiple (or no) rows returned"
        );
    }

    #[tokio::test]
    async fn user_is_fetched_by_id() {
        let mut backend = MockBackend::new();
        backend
            .expect_fetch_user()
            .withf(|id| id == "u-1")
            .returning(|id| {
                Ok(User {
                    id,
                    name: Some("Ada".to_string()),
                    ..Default::default()
                })
            });

        let user = UserService::new(Arc::new(backend))
            .get_user_data("u-1")
            .await
            .unwrap();
        assert_eq!(user.name.as_deref(), Some("Ada"));
    }
}
