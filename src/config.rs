//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub feed: FeedConfig,
    pub http: HttpConfig,
    pub realtime: RealtimeConfig,
    pub logging: LoggingConfig,
}

/// Hosted backend project
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Project URL (e.g., "https://abcd.supabase.co")
    pub url: String,
    /// Public anon key sent as `apikey` on every request
    pub anon_key: String,
}

impl BackendConfig {
    /// Project URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket holding all uploads (default: "uploads")
    pub bucket: String,
    /// Cache-Control max-age for uploaded objects, in seconds
    pub cache_control_secs: u64,
    /// Directory downloaded media is written to (for sharing)
    pub download_dir: PathBuf,
}

/// Feed pagination and reconciliation
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Page-size step of the home feed (default: 10)
    pub home_step: usize,
    /// Page-size step of the home feed when the realtime channel is on (default: 5)
    pub live_step: usize,
    /// Page-size step of a profile feed (default: 4)
    pub profile_step: usize,
    /// How `load_more` decides that the server has no more rows
    #[serde(default)]
    pub termination: TerminationPolicy,
    /// Undo an optimistic like/unlike when the request fails (default: true)
    pub rollback_failed_likes: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            home_step: 10,
            live_step: 5,
            profile_step: 4,
            termination: TerminationPolicy::default(),
            rollback_failed_likes: true,
        }
    }
}

/// Pagination termination signal
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TerminationPolicy {
    /// Request one row past the page; the page is the last one when that
    /// extra row is missing.
    #[default]
    ShortPage,
    /// Stop when a fetch returns as many rows as are already held locally.
    LengthUnchanged,
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// User-Agent header
    pub user_agent: String,
}

/// Realtime change feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Heartbeat interval in seconds (default: 30)
    pub heartbeat_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (LINKUP__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("storage.bucket", "uploads")?
            .set_default("storage.cache_control_secs", 3600)?
            .set_default("storage.download_dir", default_download_dir())?
            .set_default("feed.home_step", 10)?
            .set_default("feed.live_step", 5)?
            .set_default("feed.profile_step", 4)?
            .set_default("feed.termination", "short_page")?
            .set_default("feed.rollback_failed_likes", true)?
            .set_default("http.timeout_secs", 30)?
            .set_default("http.user_agent", "LinkUp/0.1.0")?
            .set_default("realtime.heartbeat_secs", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("LINKUP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Configuration for `url`/`anon_key` with every other setting at
    /// its default
    pub fn for_project(url: &str, anon_key: &str) -> Self {
        Self {
            backend: BackendConfig {
                url: url.to_string(),
                anon_key: anon_key.to_string(),
            },
            storage: StorageConfig {
                bucket: "uploads".to_string(),
                cache_control_secs: 3600,
                download_dir: PathBuf::from(default_download_dir()),
            },
            feed: FeedConfig::default(),
            http: HttpConfig {
                timeout_secs: 30,
                user_agent: "LinkUp/0.1.0".to_string(),
            },
            realtime: RealtimeConfig {
                heartbeat_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        let url = url::Url::parse(&self.backend.url)
            .map_err(|e| AppError::Config(format!("backend.url is not a valid URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Config(
                "backend.url must use http or https".to_string(),
            ));
        }
        if url.host_str().is_none() {
            return Err(AppError::Config("backend.url must have a host".to_string()));
        }

        if self.backend.anon_key.trim().is_empty() {
            return Err(AppError::Config(
                "backend.anon_key must not be empty".to_string(),
            ));
        }

        if self.storage.bucket.trim().is_empty() {
            return Err(AppError::Config(
                "storage.bucket must not be empty".to_string(),
            ));
        }

        for (name, step) in [
            ("feed.home_step", self.feed.home_step),
            ("feed.live_step", self.feed.live_step),
            ("feed.profile_step", self.feed.profile_step),
        ] {
            if step == 0 {
                return Err(AppError::Config(format!("{name} must be greater than 0")));
            }
        }

        if url.scheme() == "http" && !is_local_host(url.host_str().unwrap_or_default()) {
            tracing::warn!(
                url = %self.backend.url,
                "Backend reached over plain http"
            );
        }

        Ok(())
    }
}

fn default_download_dir() -> String {
    std::env::temp_dir()
        .join("linkup-downloads")
        .to_string_lossy()
        .into_owned()
}

fn is_local_host(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    match host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<std::net::IpAddr>()
    {
        Ok(ip) => ip.is_loopback() || ip.is_unspecified(),
        Err(_) => false,
    }
}
