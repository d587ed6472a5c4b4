//! Email/password authentication against the project's auth service

use reqwest::Method;
use serde::Deserialize;

use super::client::ProjectClient;
use crate::data::{AuthSession, AuthUser};
use crate::error::AppError;

/// Auth endpoints
#[derive(Clone)]
pub struct AuthClient {
    client: ProjectClient,
}

/// Token grant as returned by `/token` and (when auto-confirm is on) `/signup`
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl From<TokenResponse> for AuthSession {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token.expires_at.or_else(|| {
            token
                .expires_in
                .map(|secs| chrono::Utc::now().timestamp() + secs)
        });
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user,
        }
    }
}

impl AuthClient {
    pub fn new(client: ProjectClient) -> Self {
        Self { client }
    }

    /// Register a new account
    ///
    /// `name` is stored in the user metadata, from which the project
    /// creates the `users` row.
    ///
    /// # Returns
    /// The new session, or None when the project requires e-mail
    /// confirmation before the first sign-in
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Option<AuthSession>, AppError> {
        let method = Method::POST;
        let builder = self
            .client
            .request(method.clone(), "/auth/v1/signup")
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "data": { "name": name },
            }));
        let response = self.client.send(builder, &method, "auth").await?;
        let body: serde_json::Value = response.json().await?;
        parse_sign_up(body)
    }

    /// Exchange email/password for a session
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AppError> {
        let method = Method::POST;
        let builder = self
            .client
            .request(method.clone(), "/auth/v1/token")
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({
                "email": email,
                "password": password,
            }));
        let response = self.client.send(builder, &method, "auth").await?;
        let token: TokenResponse = response.json().await?;
        Ok(token.into())
    }

    /// Revoke the current access token
    pub async fn sign_out(&self) -> Result<(), AppError> {
        let method = Method::POST;
        let builder = self.client.request(method.clone(), "/auth/v1/logout");
        self.client.send(builder, &method, "auth").await?;
        Ok(())
    }
}

fn parse_sign_up(body: serde_json::Value) -> Result<Option<AuthSession>, AppError> {
    if body.get("access_token").is_some() {
        let token: TokenResponse = serde_json::from_value(body)?;
        Ok(Some(token.into()))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sign_up_with_confirmation_has_no_session() {
        let session = parse_sign_up(json!({"id": "u-1", "email": "a@example.com"})).unwrap();
        assert!(session.is_none());
    }

    #[test]
    fn sign_up_with_auto_confirm_yields_session() {
        let session = parse_sign_up(json!({
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "refresh",
            "user": {"id": "u-1", "email": "a@example.com", "role": "authenticated"}
        }))
        .unwrap()
        .expect("session expected");
        assert_eq!(session.access_token, "jwt");
        assert_eq!(session.user.id, "u-1");
        assert!(session.expires_at.is_some());
    }

    #[test]
    fn explicit_expiry_wins() {
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "jwt",
            "expires_in": 3600,
            "expires_at": 10,
            "user": {"id": "u-1"}
        }))
        .unwrap();
        let session = AuthSession::from(token);
        assert_eq!(session.expires_at, Some(10));
    }
}
