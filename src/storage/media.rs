//! Media references, upload, and download
//!
//! A post's or avatar's media is either a file the user just picked on this
//! device or a path already stored in the `uploads` bucket. Stored paths are
//! served publicly at `{base}/storage/v1/object/public/{bucket}/{path}`.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Failure, Outcome};
use crate::platform::{Backend, ObjectUpload};

const UPLOAD_FAILED: &str = "There was an error uploading the file";

/// Image or video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Content type sent with uploads
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Image => "image/*",
            Self::Video => "video/*",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Image => "png",
            Self::Video => "mp4",
        }
    }
}

/// Top-level folders of the uploads bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFolder {
    Profiles,
    PostImages,
    PostVideos,
}

impl MediaFolder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::PostImages => "postImages",
            Self::PostVideos => "postVideos",
        }
    }

    /// Folder a post attachment of `kind` goes to
    pub fn for_post(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Image => Self::PostImages,
            MediaKind::Video => Self::PostVideos,
        }
    }
}

/// A file picked on this device, not uploaded yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMedia {
    /// `file://` URI or plain filesystem path
    pub uri: String,
    pub kind: MediaKind,
}

impl LocalMedia {
    pub fn new(uri: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            uri: uri.into(),
            kind,
        }
    }

    /// Filesystem path behind `uri`
    pub fn path(&self) -> Result<PathBuf, AppError> {
        match url::Url::parse(&self.uri) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map_err(|_| AppError::Validation(format!("not a local file: {}", self.uri))),
            _ => Ok(PathBuf::from(&self.uri)),
        }
    }
}

/// A path inside the uploads bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMedia {
    pub path: String,
}

/// Media attached to a post or profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRef {
    Local(LocalMedia),
    Remote(RemoteMedia),
}

impl MediaRef {
    pub fn local(uri: impl Into<String>, kind: MediaKind) -> Self {
        Self::Local(LocalMedia::new(uri, kind))
    }

    pub fn remote(path: impl Into<String>) -> Self {
        Self::Remote(RemoteMedia { path: path.into() })
    }

    /// Stored path, for media that is already uploaded
    pub fn stored_path(&self) -> Option<&str> {
        match self {
            Self::Local(_) => None,
            Self::Remote(remote) => Some(&remote.path),
        }
    }

    /// URI a media view can load
    ///
    /// Local media is shown from its own URI. A stored path becomes its
    /// public URL; a value that already is one is returned unchanged.
    pub fn resolve_display_uri(&self, base_url: &str, bucket: &str) -> String {
        match self {
            Self::Local(local) => local.uri.clone(),
            Self::Remote(remote) => public_url(base_url, bucket, &remote.path),
        }
    }

    /// Local media knows its kind; stored media goes by folder name.
    pub fn classify_kind(&self) -> MediaKind {
        match self {
            Self::Local(local) => local.kind,
            Self::Remote(remote) => {
                let path = remote.path.as_str();
                if path.contains(MediaFolder::PostImages.as_str())
                    || path.contains(MediaFolder::Profiles.as_str())
                {
                    MediaKind::Image
                } else {
                    MediaKind::Video
                }
            }
        }
    }
}

/// Where an avatar is loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// A file on this device
    Local(String),
    Remote(String),
    /// The bundled placeholder avatar
    DefaultAvatar,
}

/// Public URL of a stored path
pub fn public_url(base_url: &str, bucket: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/storage/v1/object/public/{}/{}",
        base_url.trim_end_matches('/'),
        bucket,
        path.trim_start_matches('/')
    )
}

/// `/{folder}/{unix_millis}.{png|mp4}`
pub fn upload_path(folder: MediaFolder, kind: MediaKind) -> String {
    format!(
        "/{}/{}.{}",
        folder.as_str(),
        chrono::Utc::now().timestamp_millis(),
        kind.extension()
    )
}

/// Uploads picked files and downloads stored ones
#[derive(Clone)]
pub struct MediaStorage {
    backend: Arc<dyn Backend>,
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    cache_control_secs: u64,
    download_dir: PathBuf,
}

impl MediaStorage {
    pub fn new(
        backend: Arc<dyn Backend>,
        http: reqwest::Client,
        config: &crate::config::AppConfig,
    ) -> Self {
        Self {
            backend,
            http,
            base_url: config.backend.base_url().to_string(),
            bucket: config.storage.bucket.clone(),
            cache_control_secs: config.storage.cache_control_secs,
            download_dir: config.storage.download_dir.clone(),
        }
    }

    pub fn public_url(&self, path: &str) -> String {
        public_url(&self.base_url, &self.bucket, path)
    }

    pub fn resolve_display_uri(&self, media: &MediaRef) -> String {
        media.resolve_display_uri(&self.base_url, &self.bucket)
    }

    /// Avatar for a user's stored image path
    pub fn user_image_source(&self, path: Option<&str>) -> ImageSource {
        match path {
            Some(path) if !path.is_empty() => ImageSource::Remote(self.public_url(path)),
            _ => ImageSource::DefaultAvatar,
        }
    }

    /// Upload a picked file into `folder`
    ///
    /// # Returns
    /// The stored path (e.g. "postImages/1712345678901.png")
    pub async fn upload_file(&self, folder: MediaFolder, media: &LocalMedia) -> Outcome<String> {
        self.try_upload(folder, media)
            .await
            .map_err(|e| Failure::from_error("upload_file", UPLOAD_FAILED, e))
    }

    async fn try_upload(&self, folder: MediaFolder, media: &LocalMedia) -> Result<String, AppError> {
        use crate::metrics::{MEDIA_BYTES_UPLOADED, MEDIA_UPLOADS_TOTAL};

        let bytes = tokio::fs::read(media.path()?).await?;
        let size = bytes.len();
        let object = ObjectUpload {
            path: upload_path(folder, media.kind),
            bytes,
            content_type: media.kind.content_type().to_string(),
            cache_control_secs: self.cache_control_secs,
        };

        let stored = self.backend.upload_object(object).await?;
        MEDIA_UPLOADS_TOTAL
            .with_label_values(&[media.kind.as_str()])
            .inc();
        MEDIA_BYTES_UPLOADED.inc_by(size as u64);
        Ok(stored)
    }

    /// Fetch a public URL into the download directory
    ///
    /// # Returns
    /// The local file, named after the URL's last path segment; None on
    /// any failure
    pub async fn download_file(&self, url: &str) -> Option<PathBuf> {
        match self.try_download(url).await {
            Ok(path) => Some(path),
            Err(error) => {
                tracing::warn!(%url, %error, "Media download failed");
                None
            }
        }
    }

    async fn try_download(&self, url: &str) -> Result<PathBuf, AppError> {
        let file_name = url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::Validation(format!("no file name in {url}")))?
            .to_string();

        let response = self.http.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;

        let dir = self.download_dir.clone();
        let target = dir.join(&file_name);
        let written = tokio::task::spawn_blocking(move || -> std::io::Result<PathBuf> {
            use std::io::Write;

            std::fs::create_dir_all(&dir)?;
            let mut file = tempfile::NamedTempFile::new_in(&dir)?;
            file.write_all(&bytes)?;
            file.persist(&target).map_err(|e| e.error)?;
            Ok(target)
        })
        .await
        .map_err(|e| AppError::Internal(e.into()))??;

        tracing::debug!(path = %written.display(), "Media downloaded");
        Ok(written)
    }
}
