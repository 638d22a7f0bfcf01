//! Builder configuration.
//!
//! Settings come from `~/.hats/config.toml` when it exists, then from the
//! environment (`GITHUB_TOKEN`, `HATS_API_URL`), then fall back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tunables for resolution, download, and packaging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Personal access token sent as a bearer token to the GitHub API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    /// Base URL of the GitHub REST API.
    pub api_url: String,
    /// Width of the resolution and acquisition worker pools.
    pub workers: usize,
    /// Extra download attempts after the first failure.
    pub retries: u32,
    /// Fixed delay between download attempts.
    pub retry_delay_ms: u64,
    /// Per-request timeout for API calls and asset downloads.
    pub request_timeout_secs: u64,
    /// Connect timeout.
    pub connect_timeout_secs: u64,
    /// How many releases to list when picking the newest one.
    pub release_page_size: u32,
    /// Prefix of pack file names (`{prefix}-{ddmmyyyy}-{hash}.zip`).
    pub pack_prefix: String,
    /// Repository publishing prebuilt packs.
    pub pack_repo: String,
    /// Component whose releases define the supported firmware.
    pub firmware_component: String,
    /// Repository scanned for firmware notes.
    pub firmware_repo: String,
    /// How many recent firmware releases to scan.
    pub firmware_window: u32,
    /// Skeleton archive merged under every pack. Defaults to `~/.hats/skeleton.zip`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skeleton: Option<PathBuf>,
    /// Version stamped into manifests.
    pub builder_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_token: None,
            api_url: "https://api.github.com".to_string(),
            workers: 5,
            retries: 2,
            retry_delay_ms: 2000,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            release_page_size: 5,
            pack_prefix: "HATS".to_string(),
            pack_repo: "sthetix/HATS".to_string(),
            firmware_component: "atmosphere".to_string(),
            firmware_repo: "Atmosphere-NX/Atmosphere".to_string(),
            firmware_window: 3,
            skeleton: None,
            builder_version: "1.0.0".to_string(),
        }
    }
}

impl Config {
    /// Load the config file at `path` (defaults if absent) and apply
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env_from(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("GITHUB_TOKEN").filter(|t| !t.is_empty()) {
            self.github_token = Some(token);
        }
        if let Some(url) = lookup("HATS_API_URL").filter(|u| !u.is_empty()) {
            self.api_url = url;
        }
    }

    /// Skeleton archive to merge, configured or default.
    pub fn skeleton_path(&self) -> PathBuf {
        self.skeleton
            .clone()
            .unwrap_or_else(crate::paths::skeleton_path)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Delay between download attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Worker pool width, never zero.
    pub fn pool_width(&self) -> usize {
        self.workers.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str("workers = 8\nretries = 0\n").unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.retries, 0);
        assert_eq!(config.pack_prefix, "HATS");
        assert_eq!(config.firmware_component, "atmosphere");
    }

    #[test]
    fn env_overrides_token_and_api() {
        let mut config = Config::default();
        config.apply_env_from(|key| match key {
            "GITHUB_TOKEN" => Some("ghp_test".to_string()),
            "HATS_API_URL" => Some("http://127.0.0.1:9".to_string()),
            _ => None,
        });
        assert_eq!(config.github_token.as_deref(), Some("ghp_test"));
        assert_eq!(config.api_url, "http://127.0.0.1:9");

        let mut untouched = Config::default();
        untouched.apply_env_from(|_| Some(String::new()));
        assert_eq!(untouched, Config::default());
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.toml")).await.unwrap();
        assert_eq!(config.workers, 5);
        assert_eq!(config.pool_width(), 5);
    }
}
