//! Object storage uploads

use reqwest::Method;

use super::client::ProjectClient;
use crate::error::AppError;

/// One object to store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUpload {
    /// Destination inside the bucket (e.g. "/postImages/1712345678901.png")
    pub path: String,
    pub bytes: Vec<u8>,
    /// MIME type (e.g. "image/*")
    pub content_type: String,
    /// Cache-Control max-age in seconds
    pub cache_control_secs: u64,
}

/// Uploads into a single bucket
#[derive(Clone)]
pub struct ObjectStorage {
    client: ProjectClient,
    bucket: String,
}

impl ObjectStorage {
    pub fn new(client: ProjectClient, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    /// Upload without overwriting
    ///
    /// # Returns
    /// The stored path, relative to the bucket
    pub async fn upload(&self, object: ObjectUpload) -> Result<String, AppError> {
        let path = clean_path(&object.path);
        if path.is_empty() {
            return Err(AppError::Storage("upload path is empty".to_string()));
        }

        let method = Method::POST;
        let size = object.bytes.len();
        let builder = self
            .client
            .request(
                method.clone(),
                &format!("/storage/v1/object/{}/{}", self.bucket, path),
            )
            .header(reqwest::header::CONTENT_TYPE, object.content_type.as_str())
            .header(
                reqwest::header::CACHE_CONTROL,
                format!("max-age={}", object.cache_control_secs),
            )
            .header("x-upsert", "false")
            .body(object.bytes);

        self.client
            .send(builder, &method, "storage")
            .await
            .map_err(|error| match error {
                AppError::Backend(msg) => AppError::Storage(msg),
                other => other,
            })?;

        tracing::info!(bucket = %self.bucket, path = %path, size, "Object uploaded");
        Ok(path)
    }
}

/// Strip leading/trailing slashes and collapse empty segments
pub(crate) fn clean_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
