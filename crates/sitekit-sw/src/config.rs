//! Worker configuration.

use serde::{Deserialize, Serialize};
use sitekit_common::{ResultExt, SiteKitError};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default cache version label.
pub const DEFAULT_VERSION: &str = "site-v1";

/// Worker configuration.
///
/// The version label names the cache store; bumping it is the only way to
/// invalidate previously cached content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Cache store name for this worker version.
    #[serde(default = "default_version")]
    pub version: String,

    /// Site origin. Only same-origin responses are cached at runtime.
    pub origin: Url,

    /// Root-relative URLs precached at install.
    #[serde(default = "default_static_assets")]
    pub static_assets: Vec<String>,

    /// Replacement for the built-in offline document.
    #[serde(default)]
    pub offline_page: Option<String>,

    /// Icon and badge used for push notifications.
    #[serde(default)]
    pub notification: NotificationConfig,

    /// Upper bound on a network attempt before falling back to cache.
    /// `None` leaves timeouts to the network stack.
    #[serde(default)]
    pub network_timeout_ms: Option<u64>,

    /// Activate immediately after install instead of waiting.
    #[serde(default = "default_skip_waiting")]
    pub skip_waiting: bool,
}

/// Fixed notification assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub icon: String,
    pub badge: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            icon: "/android-chrome-192x192.png".to_string(),
            badge: "/favicon-32x32.png".to_string(),
        }
    }
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn default_static_assets() -> Vec<String> {
    [
        "/",
        "/favicon.ico",
        "/favicon-32x32.png",
        "/android-chrome-192x192.png",
        "/apple-touch-icon.png",
        "/site.webmanifest",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_skip_waiting() -> bool {
    true
}

impl WorkerConfig {
    /// Create a config for `origin` with default version and assets.
    pub fn new(origin: Url) -> Self {
        Self {
            version: default_version(),
            origin,
            static_assets: default_static_assets(),
            offline_page: None,
            notification: NotificationConfig::default(),
            network_timeout_ms: None,
            skip_waiting: default_skip_waiting(),
        }
    }

    /// Set the version label.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Replace the precache list.
    pub fn with_static_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.static_assets = assets.into_iter().map(Into::into).collect();
        self
    }

    /// Bound network attempts.
    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> sitekit_common::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> sitekit_common::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .config_context(format!("reading {}", path.display()))?;
        Self::from_json_str(&contents)
    }

    /// Check invariants that serde can't express.
    pub fn validate(&self) -> sitekit_common::Result<()> {
        if self.version.trim().is_empty() {
            return Err(SiteKitError::config("version label must not be empty"));
        }
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(SiteKitError::config(format!(
                "origin must be http or https, got {}",
                self.origin.scheme()
            )));
        }
        if self.origin.host_str().is_none() {
            return Err(SiteKitError::config("origin has no host"));
        }
        if self.network_timeout_ms == Some(0) {
            return Err(SiteKitError::InvalidArgument(
                "network_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn network_timeout(&self) -> Option<Duration> {
        self.network_timeout_ms.map(Duration::from_millis)
    }

    /// Resolve a root-relative (or absolute) URL against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        self.origin.join(path)
    }
}
