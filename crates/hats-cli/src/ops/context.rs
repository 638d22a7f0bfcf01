//! Shared command context.
//!
//! Groups the configuration, catalog location and HTTP client that most
//! commands need, so each handler starts from one value.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use hats_core::catalog::{load_catalog, save_catalog};
use hats_core::github::build_http_client;
use hats_core::{Config, GithubClient};
use hats_schema::Catalog;

#[derive(Clone)]
pub struct Context {
    pub config: Config,
    pub catalog_path: PathBuf,
    pub client: reqwest::Client,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("catalog_path", &self.catalog_path)
            .field("api_url", &self.config.api_url)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Load `~/.hats/config.toml` and build the shared client.
    pub async fn load(catalog: Option<PathBuf>) -> Result<Self> {
        let config = Config::load(&hats_core::config_path()).await?;
        let client = build_http_client(&config).context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            catalog_path: catalog.unwrap_or_else(hats_core::catalog_path),
            client,
        })
    }

    pub fn github(&self) -> GithubClient {
        GithubClient::new(self.client.clone(), &self.config)
    }

    pub async fn catalog(&self) -> Result<Catalog> {
        load_catalog(&self.catalog_path).await
    }

    pub async fn save_catalog(&self, catalog: &Catalog) -> Result<()> {
        save_catalog(&self.catalog_path, catalog).await
    }
}
