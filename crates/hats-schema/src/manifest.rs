//! Build and on-device manifests.
//!
//! A [`BuildManifest`] records one build: which components went into the pack,
//! at which versions, and which staged files each one owns. The same
//! component map is mirrored on the install target by two [`DeviceManifest`]
//! files, one for installed components and one for the trash.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

/// Per-component record shared by build and device manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Display name.
    pub name: String,
    /// Version that was built.
    pub version: String,
    /// Display category.
    #[serde(default)]
    pub category: String,
    /// Where the bytes came from (release tag URL or direct URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    /// Staged files owned by the component, relative to the pack root, `/`-separated.
    #[serde(default)]
    pub files: Vec<String>,
}

/// The artifact of one build.
///
/// Missing keys default, so manifests written by older builders still load
/// as the previous-build reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildManifest {
    /// File name of the produced pack.
    pub pack_name: String,
    /// When the build ran.
    pub build_date: DateTime<Utc>,
    /// Version of the builder that produced the pack.
    pub builder_version: String,
    /// Highest firmware the base component supports, or `N/A`.
    pub supported_firmware: String,
    /// Content fingerprint.
    pub content_hash: ContentHash,
    /// Free-text note supplied with the build request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Components in the pack, keyed by id.
    pub components: BTreeMap<String, ManifestEntry>,
}

impl BuildManifest {
    /// An empty manifest for a build starting at `build_date`.
    ///
    /// The firmware field starts from the previous build's value.
    pub fn start(
        builder_version: impl Into<String>,
        build_date: DateTime<Utc>,
        previous: Option<&BuildManifest>,
    ) -> Self {
        Self {
            pack_name: String::new(),
            build_date,
            builder_version: builder_version.into(),
            supported_firmware: previous
                .map(|p| p.supported_firmware.clone())
                .filter(|fw| !fw.is_empty())
                .unwrap_or_else(|| crate::NOT_AVAILABLE.to_string()),
            content_hash: ContentHash::pending(),
            comment: None,
            components: BTreeMap::new(),
        }
    }
}

/// Installed or trashed component records on an install target.
///
/// Keys other than `components` are carried through untouched, so a pack's
/// full `manifest.json` can be rewritten without losing its header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceManifest {
    /// Components keyed by id.
    #[serde(default)]
    pub components: BTreeMap<String, ManifestEntry>,
    /// Everything else found in the file.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DeviceManifest {
    /// Whether no component is recorded.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_older_manifest_with_missing_fields() {
        let manifest: BuildManifest = serde_json::from_str(
            r#"{
                "pack_name": "HATS-01012025-abc1234.zip",
                "build_date": "2025-01-01T10:00:00.123456+00:00",
                "supported_firmware": "19.0.1",
                "content_hash": "abc1234",
                "components": {
                    "atmosphere": {"name": "Atmosphere", "version": "1.8.0", "category": "Core",
                                   "files": ["atmosphere/package3"]}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.supported_firmware, "19.0.1");
        assert!(manifest.builder_version.is_empty());
        assert_eq!(manifest.components["atmosphere"].files.len(), 1);
    }

    #[test]
    fn start_inherits_firmware() {
        let previous = BuildManifest {
            supported_firmware: "18.1.0".into(),
            ..BuildManifest::default()
        };
        let fresh = BuildManifest::start("1.0.0", Utc::now(), Some(&previous));
        assert_eq!(fresh.supported_firmware, "18.1.0");
        assert!(fresh.content_hash.is_pending());

        let first = BuildManifest::start("1.0.0", Utc::now(), None);
        assert_eq!(first.supported_firmware, "N/A");
    }

    #[test]
    fn device_manifest_keeps_unknown_keys() {
        let text = r#"{"pack_name": "HATS-x.zip", "components": {"a": {"name": "A", "version": "1"}}}"#;
        let manifest: DeviceManifest = serde_json::from_str(text).unwrap();
        assert_eq!(manifest.extra["pack_name"], "HATS-x.zip");

        let round: serde_json::Value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(round["pack_name"], "HATS-x.zip");
        assert_eq!(round["components"]["a"]["version"], "1");
    }
}
