//! Client configuration.
//!
//! Provides the `ClientConfig` struct shared by every Finalyzer front-end to
//! locate the analysis API and tune polling, paging and upload defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{is_http_url, normalize_text_option};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_PAGE_SIZE: usize = 5;
pub const DEFAULT_UPLOAD_QUERY: &str = "Summarize financial insights";
pub const DEFAULT_ROLE: &str = "user";

/// Environment variable overriding the API base URL.
pub const API_URL_ENV: &str = "FINALYZER_API_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base_url: String,
    /// Seconds between two analysis polls.
    pub poll_interval_secs: u64,
    /// Documents per dashboard page.
    pub page_size: usize,
    /// Seconds between dashboard refreshes of the current page; `0` disables.
    pub dashboard_refresh_secs: u64,
    pub upload_query: String,
    pub default_role: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            page_size: DEFAULT_PAGE_SIZE,
            dashboard_refresh_secs: DEFAULT_POLL_INTERVAL_SECS,
            upload_query: DEFAULT_UPLOAD_QUERY.to_string(),
            default_role: DEFAULT_ROLE.to_string(),
        }
    }
}

impl ClientConfig {
    /// Applies `FINALYZER_API_URL` when set.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_api_url_override(std::env::var(API_URL_ENV).ok())
    }

    #[must_use]
    pub fn with_api_url_override(mut self, url: Option<String>) -> Self {
        if let Some(url) = normalize_text_option(url) {
            self.api_base_url = url;
        }
        self
    }

    /// Normalizes the base URL and rejects values the client cannot run with.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        let base = self.api_base_url.trim().trim_end_matches('/').to_string();
        if base.is_empty() {
            return Err(ConfigError::Invalid(
                "API base URL must not be empty".to_string(),
            ));
        }
        if !is_http_url(&base) {
            return Err(ConfigError::Invalid(
                "API base URL must include http:// or https://".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll interval must be at least one second".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid(
                "page size must be at least 1".to_string(),
            ));
        }
        if self.upload_query.trim().is_empty() {
            self.upload_query = DEFAULT_UPLOAD_QUERY.to_string();
        }
        if self.default_role.trim().is_empty() {
            self.default_role = DEFAULT_ROLE.to_string();
        }
        self.api_base_url = base;
        Ok(self)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub const fn dashboard_refresh(&self) -> Option<Duration> {
        if self.dashboard_refresh_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.dashboard_refresh_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_service_conventions() {
        let config = ClientConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.page_size, 5);
        assert_eq!(config.upload_query, "Summarize financial insights");
        assert_eq!(config.dashboard_refresh(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn validated_trims_trailing_slash() {
        let config = ClientConfig {
            api_base_url: " https://api.example.com/ ".to_string(),
            ..Default::default()
        }
        .validated()
        .unwrap();
        assert_eq!(config.api_base_url, "https://api.example.com");
    }

    #[test]
    fn validated_rejects_invalid_values() {
        let missing_scheme = ClientConfig {
            api_base_url: "api.example.com".to_string(),
            ..Default::default()
        };
        assert!(missing_scheme.validated().is_err());

        let zero_page = ClientConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(zero_page.validated().is_err());
    }

    #[test]
    fn zero_refresh_disables_dashboard_refresh() {
        let config = ClientConfig {
            dashboard_refresh_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.dashboard_refresh(), None);
    }

    #[test]
    fn api_url_override_ignores_blank_values() {
        let config = ClientConfig::default().with_api_url_override(Some("  ".to_string()));
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);

        let config = ClientConfig::default()
            .with_api_url_override(Some("https://api.example.com".to_string()));
        assert_eq!(config.api_base_url, "https://api.example.com");
    }
}
