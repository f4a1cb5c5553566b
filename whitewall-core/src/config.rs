//! Process-wide configuration.
//!
//! Loaded once from a TOML file before a run starts and treated as read-only
//! afterwards. Every section is optional; the defaults keep posts younger than
//! 30 days, anything retweeted or favorited at least once, the account's own
//! favorites and posts tagged `#bookmarked`.
//!
//! ```toml
//! [retention]
//! max_age_seconds = 2592000
//! keep_hashtags = ["bookmarked", "keep"]
//!
//! [run]
//! idle_seconds = 3600
//!
//! [credentials]
//! access_token = "..."
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Environment variable that overrides `credentials.access_token`.
pub const ACCESS_TOKEN_ENV: &str = "WHITEWALL_ACCESS_TOKEN";

/// Largest page the timeline endpoint will return.
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub retention: RetentionConfig,
    pub run: RunConfig,
    pub api: ApiConfig,
    pub retry: RetrySettings,
    pub credentials: Credentials,
}

/// Keep rules consulted by the retention policy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetentionConfig {
    pub max_age_seconds: u64,
    /// Zero disables the retweet rule.
    pub min_retweets: u64,
    /// Zero disables the favorite rule.
    pub min_favorites: u64,
    pub keep_replies: bool,
    pub keep_own_favorites: bool,
    /// Matched exactly and case-sensitively, without the leading `#`.
    pub keep_hashtags: BTreeSet<String>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_seconds: 30 * 24 * 60 * 60,
            min_retweets: 1,
            min_favorites: 1,
            keep_replies: false,
            keep_own_favorites: true,
            keep_hashtags: BTreeSet::from(["bookmarked".to_string()]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// 0 terminates once the history is exhausted; otherwise sleep and walk again.
    pub idle_seconds: u64,
    pub start_cursor: Option<String>,
    pub archive_source: Option<PathBuf>,
    pub page_size: u32,
    pub include_retweets: bool,
    pub dry_run: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            idle_seconds: 0,
            start_cursor: None,
            archive_source: None,
            page_size: MAX_PAGE_SIZE,
            include_retweets: false,
            dry_run: false,
        }
    }
}

impl RunConfig {
    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.twitter.com/1.1/".to_string(),
            timeout_seconds: 30,
            user_agent: concat!("whitewall/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ApiConfig {
    /// Base URL with a guaranteed trailing slash so endpoints join beneath it.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let mut raw = self.base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|e| ConfigError::InvalidValue {
            field: "api.base_url".to_string(),
            value: format!("{} ({e})", self.base_url),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Added to the reported rate-limit reset so the retry never races the boundary.
    pub rate_limit_margin_seconds: u64,
    pub transient_delay_seconds: u64,
    /// Used when a rate-limit response carries no reset time.
    pub default_rate_limit_wait_seconds: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            rate_limit_margin_seconds: 2,
            transient_delay_seconds: 5,
            default_rate_limit_wait_seconds: 15 * 60,
        }
    }
}

#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Credentials {
    pub user_id: Option<String>,
    pub access_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Credentials {
    pub fn access_token(&self) -> Result<&str, ConfigError> {
        self.access_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredentials {
                var_name: ACCESS_TOKEN_ENV.to_string(),
            })
    }
}

impl Config {
    /// Reads, parses and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => ConfigError::Unreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            },
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Lets the environment supply the access token without writing it to disk.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.credentials.access_token = Some(token);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.page_size == 0 || self.run.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "run.page_size".to_string(),
                value: self.run.page_size.to_string(),
            });
        }
        if self.api.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "api.timeout_seconds".to_string(),
                value: "0".to_string(),
            });
        }
        if self.retry.transient_delay_seconds == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "retry.transient_delay_seconds must be at least 1".to_string(),
            });
        }
        if let Some(cursor) = &self.run.start_cursor {
            if cursor.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "run.start_cursor".to_string(),
                    value: format!("{cursor:?}"),
                });
            }
        }
        if self
            .retention
            .keep_hashtags
            .iter()
            .any(|tag| tag.starts_with('#') || tag.is_empty())
        {
            return Err(ConfigError::ValidationFailed {
                reason: "retention.keep_hashtags entries must be non-empty and omit the '#'"
                    .to_string(),
            });
        }
        self.api.base_url()?;
        Ok(())
    }
}
