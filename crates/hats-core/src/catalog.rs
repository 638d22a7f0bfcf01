//! Catalog file IO.

use std::path::Path;

use anyhow::{Context, Result};
use hats_schema::Catalog;

/// Read and validate the catalog at `path`.
///
/// # Errors
///
/// Returns an error if the file is missing, unreadable, or has an invalid
/// entry.
pub async fn load_catalog(path: &Path) -> Result<Catalog> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read catalog {}", path.display()))?;
    Catalog::from_json(&text).with_context(|| format!("Invalid catalog {}", path.display()))
}

/// Write `catalog` back to `path` atomically.
///
/// # Errors
///
/// Returns an error if the catalog cannot be serialized or written.
pub async fn save_catalog(path: &Path, catalog: &Catalog) -> Result<()> {
    let text = catalog.to_json()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, format!("{text}\n"))
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "ftpd": {
            "name": "ftpd",
            "category": "Homebrew",
            "source_type": "github_release",
            "repo": "mtheall/ftpd",
            "asset_pattern": "ftpd.nro",
            "processing_steps": [{"action": "copy_file", "target_path": "switch"}],
            "asset_info": {"version": "v3.2.0"}
        }
    }"#;

    #[tokio::test]
    async fn cached_version_survives_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("components.json");
        tokio::fs::write(&path, CATALOG).await.unwrap();

        let mut catalog = load_catalog(&path).await.unwrap();
        assert_eq!(catalog.get("ftpd").unwrap().cached_version.as_deref(), Some("v3.2.0"));
        assert!(catalog.set_cached_version("ftpd", "v3.3.0"));
        save_catalog(&path, &catalog).await.unwrap();

        let reloaded = load_catalog(&path).await.unwrap();
        assert_eq!(reloaded, catalog);
        assert!(!dir.path().join("components.json.tmp").exists());

        let raw: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert!(raw["ftpd"]["asset_patterns"].is_array());
    }

    #[tokio::test]
    async fn missing_catalog_names_the_path() {
        let err = load_catalog(Path::new("/nowhere/components.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nowhere/components.json"));
    }
}
