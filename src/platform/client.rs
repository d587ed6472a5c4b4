//! Shared HTTP plumbing for the hosted project
//!
//! Every request carries the project's `apikey` and a bearer token: the
//! signed-in user's access token when there is one, the anon key otherwise.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::config::AppConfig;
use crate::error::AppError;

/// HTTP client bound to one project
#[derive(Clone)]
pub struct ProjectClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl ProjectClient {
    /// Build a client from configuration
    ///
    /// # Errors
    /// Returns error if the underlying HTTP client cannot be built
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(config.http.user_agent.clone())
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .build()?;

        Ok(Self::with_http(
            http,
            config.backend.base_url(),
            &config.backend.anon_key,
        ))
    }

    pub fn with_http(http: reqwest::Client, base_url: &str, anon_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Replace the user access token (None after sign-out)
    pub fn set_access_token(&self, token: Option<String>) {
        match self.access_token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    /// Token sent as `Authorization: Bearer`
    pub fn bearer(&self) -> String {
        let token = match self.access_token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        token.unwrap_or_else(|| self.anon_key.clone())
    }

    /// Start a request to `{base_url}{path}` with project headers attached
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }

    /// Send a request, recording metrics and mapping error statuses
    ///
    /// # Arguments
    /// * `resource` - Label for logs and metrics (table name, "auth", "storage")
    pub async fn send(
        &self,
        builder: RequestBuilder,
        method: &Method,
        resource: &str,
    ) -> Result<Response, AppError> {
        use crate::metrics::{BACKEND_REQUEST_DURATION_SECONDS, BACKEND_REQUESTS_TOTAL};

        let started = Instant::now();
        let result = builder.send().await;
        BACKEND_REQUEST_DURATION_SECONDS
            .with_label_values(&[method.as_str(), resource])
            .observe(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                BACKEND_REQUESTS_TOTAL
                    .with_label_values(&[method.as_str(), resource, "error"])
                    .inc();
                tracing::warn!(%error, %method, resource, "Backend request failed");
                return Err(error.into());
            }
        };

        let status = response.status();
        BACKEND_REQUESTS_TOTAL
            .with_label_values(&[method.as_str(), resource, status.as_str()])
            .inc();

        if status.is_success() {
            tracing::debug!(%method, resource, status = status.as_u16(), "Backend request completed");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = error_from_response(status, &body);
        tracing::warn!(
            %method,
            resource,
            status = status.as_u16(),
            error = %error,
            "Backend returned an error"
        );
        Err(error)
    }
}

/// Error bodies differ between the REST, auth and storage services
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// PostgREST code for "single row requested, zero rows returned"
const NO_ROWS_CODE: &str = "PGRST116";

pub(crate) fn error_from_response(status: StatusCode, body: &str) -> AppError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();

    let no_rows = parsed
        .code
        .as_ref()
        .and_then(|code| code.as_str())
        .is_some_and(|code| code == NO_ROWS_CODE);
    if status == StatusCode::NOT_FOUND || no_rows {
        return AppError::NotFound;
    }
    if status == StatusCode::UNAUTHORIZED {
        return AppError::Unauthorized;
    }

    let message = parsed
        .message
        .or(parsed.msg)
        .or(parsed.error_description)
        .or_else(|| {
            parsed.error.and_then(|error| match error {
                serde_json::Value::String(text) => Some(text),
                other => other
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string),
            })
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                format!("request failed with status {}", status.as_u16())
            } else {
                trimmed.to_string()
            }
        });

    AppError::Backend(message)
}
