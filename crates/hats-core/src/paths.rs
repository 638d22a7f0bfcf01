use dirs::home_dir;
use std::path::{Path, PathBuf};

/// Installed-components manifest, relative to an install target root.
pub const DEVICE_MANIFEST: &str = "manifest.json";

/// Trashed-components manifest, relative to an install target root.
pub const DEVICE_TRASH: &str = "trash.json";

/// Returns the primary configuration directory, or None if the user's home cannot be resolved.
pub fn try_hats_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("HATS_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".hats"))
}

/// Returns the HATS home directory (`~/.hats`), falling back to `./.hats`
/// when no home directory can be resolved.
pub fn hats_home() -> PathBuf {
    try_hats_home().unwrap_or_else(|| PathBuf::from(".hats"))
}

/// Config file: ~/.hats/config.toml
pub fn config_path() -> PathBuf {
    hats_home().join("config.toml")
}

/// Default catalog: ~/.hats/components.json
pub fn catalog_path() -> PathBuf {
    hats_home().join("components.json")
}

/// Last-build reference manifest: ~/.hats/manifest.json
pub fn last_build_path() -> PathBuf {
    hats_home().join("manifest.json")
}

/// Default skeleton archive: ~/.hats/skeleton.zip
pub fn skeleton_path() -> PathBuf {
    hats_home().join("skeleton.zip")
}

/// Temp path: ~/.hats/tmp (staging trees live here)
pub fn tmp_path() -> PathBuf {
    hats_home().join("tmp")
}

/// Extract the filename from a URL, ignoring any query string.
pub fn filename_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or("");
    path.split('/').next_back().unwrap_or("")
}

/// Render a path relative to `root` with `/` separators, the form used in manifests.
pub fn manifest_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
