//! Named client profiles persisted as JSON under the user config directory.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use finalyzer_core::config::{ClientConfig, ConfigError};
use finalyzer_core::util::normalize_text_option;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_DIR_NAME: &str = "finalyzer";
const CONFIG_FILE_NAME: &str = "cli-config.json";
const PROFILE_ENV: &str = "FINALYZER_PROFILE";
const DEFAULT_PROFILE: &str = "default";
const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ProfileStoreError {
    #[error("Could not locate a config directory for this user")]
    NoConfigDir,
    #[error("Failed to read profiles from {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Profiles file {} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to write profiles to {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

impl Default for CliProfilesConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            active_profile: None,
            profiles: BTreeMap::new(),
        }
    }
}

/// Per-profile overrides on top of [`ClientConfig`] defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CliProfile {
    pub api_base_url: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub page_size: Option<usize>,
    pub dashboard_refresh_secs: Option<u64>,
    pub upload_query: Option<String>,
}

const fn current_version() -> u32 {
    CURRENT_VERSION
}

pub fn default_config_path() -> Result<PathBuf, ProfileStoreError> {
    let dir = dirs::config_dir().ok_or(ProfileStoreError::NoConfigDir)?;
    Ok(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    normalize_text_option(value.map(ToString::to_string))
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, ProfileStoreError> {
        Self::load_from_path(&default_config_path()?)
    }

    /// Missing file means no profiles yet.
    pub fn load_from_path(path: &Path) -> Result<Self, ProfileStoreError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ProfileStoreError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let mut config =
            serde_json::from_str::<Self>(&raw).map_err(|source| ProfileStoreError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.normalize();
        Ok(config)
    }

    /// Writes to the default location and returns it.
    pub fn save(&self) -> Result<PathBuf, ProfileStoreError> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), ProfileStoreError> {
        let write_error = |source| ProfileStoreError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut normalized = self.clone();
        normalized.normalize();
        let mut serialized =
            serde_json::to_vec_pretty(&normalized).map_err(|error| write_error(error.into()))?;
        serialized.push(b'\n');

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        std::fs::write(path, serialized).map_err(write_error)
    }

    /// Explicit name, then `FINALYZER_PROFILE`, then the stored active
    /// profile, then `default`.
    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        self.resolve_profile_name_with_env(explicit, std::env::var(PROFILE_ENV).ok().as_deref())
    }

    pub fn resolve_profile_name_with_env(
        &self,
        explicit: Option<&str>,
        env_profile: Option<&str>,
    ) -> String {
        normalize_profile_name(explicit)
            .or_else(|| normalize_profile_name(env_profile))
            .or_else(|| normalize_profile_name(self.active_profile.as_deref()))
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    /// Client configuration for this profile.
    ///
    /// Precedence for the API URL: `api_url_override`, then
    /// `FINALYZER_API_URL`, then the profile, then the built-in default.
    pub fn to_client_config(
        &self,
        api_url_override: Option<String>,
    ) -> Result<ClientConfig, ConfigError> {
        let mut config = ClientConfig::default();
        if let Some(url) = normalize_text_option(self.api_base_url.clone()) {
            config.api_base_url = url;
        }
        if let Some(secs) = self.poll_interval_secs {
            config.poll_interval_secs = secs;
        }
        if let Some(size) = self.page_size {
            config.page_size = size;
        }
        if let Some(secs) = self.dashboard_refresh_secs {
            config.dashboard_refresh_secs = secs;
        }
        if let Some(query) = normalize_text_option(self.upload_query.clone()) {
            config.upload_query = query;
        }

        config
            .with_env_overrides()
            .with_api_url_override(api_url_override)
            .validated()
    }

    fn normalize(&mut self) {
        self.api_base_url = normalize_text_option(self.api_base_url.clone())
            .map(|url| url.trim_end_matches('/').to_string());
        self.upload_query = normalize_text_option(self.upload_query.clone());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn normalize_profile_name_rejects_empty() {
        assert_eq!(normalize_profile_name(None), None);
        assert_eq!(normalize_profile_name(Some(" ")), None);
        assert_eq!(normalize_profile_name(Some(" work ")), Some("work".to_string()));
    }

    #[test]
    fn config_roundtrip_preserves_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = CliProfilesConfig {
            version: 1,
            active_profile: Some(" default ".to_string()),
            profiles: BTreeMap::new(),
        };
        config.profiles.insert(
            "default".to_string(),
            CliProfile {
                api_base_url: Some(" https://api.example.com/ ".to_string()),
                page_size: Some(10),
                upload_query: Some("  ".to_string()),
                ..CliProfile::default()
            },
        );

        config.save_to_path(&path).unwrap();
        let loaded = CliProfilesConfig::load_from_path(&path).unwrap();
        let profile = loaded.profile("default").unwrap();
        assert_eq!(loaded.active_profile.as_deref(), Some("default"));
        assert_eq!(profile.api_base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(profile.page_size, Some(10));
        assert_eq!(profile.upload_query, None);
    }

    #[test]
    fn resolve_profile_name_prefers_explicit_then_env_then_active() {
        let config = CliProfilesConfig {
            version: 1,
            active_profile: Some("work".to_string()),
            profiles: BTreeMap::new(),
        };
        assert_eq!(
            config.resolve_profile_name_with_env(Some("mobile"), Some("ci")),
            "mobile"
        );
        assert_eq!(config.resolve_profile_name_with_env(None, Some("ci")), "ci");
        assert_eq!(config.resolve_profile_name_with_env(None, Some(" ")), "work");
        assert_eq!(
            CliProfilesConfig::default().resolve_profile_name_with_env(None, None),
            "default"
        );
    }

    #[test]
    fn to_client_config_applies_profile_and_override() {
        let profile = CliProfile {
            api_base_url: Some("https://profile.example.com".to_string()),
            poll_interval_secs: Some(2),
            ..CliProfile::default()
        };

        let config = profile
            .to_client_config(Some("https://override.example.com/".to_string()))
            .unwrap();
        assert_eq!(config.api_base_url, "https://override.example.com");
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.page_size, 5);
    }

    #[test]
    fn to_client_config_rejects_zero_page_size() {
        let profile = CliProfile {
            page_size: Some(0),
            ..CliProfile::default()
        };
        assert!(profile.to_client_config(None).is_err());
    }
}
