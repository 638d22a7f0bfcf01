//! Content hash, changelog and pack summary.
//!
//! The content hash identifies a pack by its component/version set alone, so
//! two builds of the same logical selection share a name no matter the order
//! components were picked in.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use hats_schema::{BuildManifest, ContentHash, NOT_AVAILABLE};
use sha2::{Digest, Sha256};

use crate::io::json;

/// Fingerprint a set of `(component id, version)` pairs.
///
/// Pairs are sorted by id, rendered as `id:version` and concatenated before
/// hashing with SHA-256; the first seven hex digits are kept. An empty
/// version counts as `N/A`.
pub fn content_hash<'a, I>(pairs: I) -> ContentHash
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut sorted: Vec<(&str, &str)> = pairs.into_iter().collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for (id, version) in sorted {
        let version = if version.is_empty() { NOT_AVAILABLE } else { version };
        hasher.update(format!("{id}:{version}").as_bytes());
    }
    ContentHash::from_digest_hex(&hex::encode(hasher.finalize()))
}

/// Content hash of everything recorded in `manifest`.
pub fn manifest_hash(manifest: &BuildManifest) -> ContentHash {
    content_hash(
        manifest
            .components
            .iter()
            .map(|(id, entry)| (id.as_str(), entry.version.as_str())),
    )
}

/// One version change between two builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogEntry {
    pub id: String,
    pub name: String,
    pub old: String,
    pub new: String,
}

impl std::fmt::Display for ChangelogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "- {}: {} -> {}", self.name, self.old, self.new)
    }
}

/// Version changes since `previous`, in id order.
///
/// Only components present in both builds with different versions are
/// listed. Added and removed components are not changes.
pub fn changelog(previous: Option<&BuildManifest>, current: &BuildManifest) -> Vec<ChangelogEntry> {
    let Some(previous) = previous else {
        return Vec::new();
    };

    current
        .components
        .iter()
        .filter_map(|(id, entry)| {
            let old = previous.components.get(id)?;
            (old.version != entry.version).then(|| ChangelogEntry {
                id: id.clone(),
                name: entry.name.clone(),
                old: old.version.clone(),
                new: entry.version.clone(),
            })
        })
        .collect()
}

/// Human-readable summary shipped inside the pack as `{pack_base}.txt`.
pub fn summary_text(
    manifest: &BuildManifest,
    changes: &[ChangelogEntry],
    generated: DateTime<Utc>,
) -> String {
    let rule = "===================================";
    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "HATS Pack Summary");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Generated on: {} UTC",
        generated.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out, "Builder Version: {}", manifest.builder_version);
    if !manifest.content_hash.is_pending() {
        let _ = writeln!(out, "Content Hash: {}", manifest.content_hash);
    }
    if manifest.supported_firmware != NOT_AVAILABLE && !manifest.supported_firmware.is_empty() {
        let _ = writeln!(
            out,
            "Supported Firmware: Up to {}",
            manifest.supported_firmware
        );
    }
    if let Some(comment) = manifest.comment.as_deref().filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(out, "Comment: {}", comment.trim());
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "--- CHANGELOG (What's New Since Last Build) ---");
    if changes.is_empty() {
        let _ = writeln!(out, "No version changes");
    }
    for change in changes {
        let _ = writeln!(out, "{change}");
    }
    let _ = writeln!(out, "-------------------------------------------------");
    let _ = writeln!(out);

    let _ = writeln!(out, "--- INCLUDED COMPONENTS ---");
    let mut by_category: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
    for entry in manifest.components.values() {
        let category = if entry.category.is_empty() {
            "Uncategorized"
        } else {
            entry.category.as_str()
        };
        by_category
            .entry(category)
            .or_default()
            .push((entry.name.as_str(), entry.version.as_str()));
    }
    for (category, mut components) in by_category {
        components.sort_unstable();
        let _ = writeln!(out, "\n--- {} ---", category.to_uppercase());
        for (name, version) in components {
            let _ = writeln!(out, " - {name} ({version})");
        }
    }
    out
}

/// Load the last-build reference, if any.
///
/// # Errors
///
/// Returns an error if the file exists but is unreadable or malformed.
pub async fn load_last_build(path: &Path) -> Result<Option<BuildManifest>> {
    json::read_json(path).await
}

/// Replace the last-build reference with `manifest`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub async fn save_last_build(path: &Path, manifest: &BuildManifest) -> Result<()> {
    json::write_json_atomic(path, manifest).await
}
