//! Auth service
//!
//! Email/password sign-up and sign-in. The session itself lives in the
//! platform client; identity changes reach the app through
//! `Backend::auth_changes`.

use std::sync::Arc;

use super::{is_blank, messages};
use crate::data::AuthSession;
use crate::error::{Failure, Outcome};
use crate::platform::Backend;

/// Auth service
#[derive(Clone)]
pub struct AuthService {
    backend: Arc<dyn Backend>,
}

impl AuthService {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Create an account
    ///
    /// # Returns
    /// The new session, or None while e-mail confirmation is pending
    pub async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Outcome<Option<AuthSession>> {
        if is_blank(name) || is_blank(email) || is_blank(password) {
            return Err(Failure::new(messages::FILL_ALL_FIELDS));
        }
        self.backend
            .sign_up(
                email.trim().to_string(),
                password.trim().to_string(),
                name.trim().to_string(),
            )
            .await
            .map_err(|e| Failure::passthrough("sign_up", e))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Outcome<AuthSession> {
        if is_blank(email) || is_blank(password) {
            return Err(Failure::new(messages::FILL_ALL_FIELDS));
        }
        self.backend
            .sign_in(email.trim().to_string(), password.trim().to_string())
            .await
            .map_err(|e| Failure::passthrough("sign_in", e))
    }

    pub async fn sign_out(&self) -> Outcome<()> {
        self.backend
            .sign_out()
            .await
            .map_err(|e| Failure::from_error("sign_out", messages::SIGN_OUT, e))
    }
}
