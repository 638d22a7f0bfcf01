//! The component catalog.
//!
//! On disk the catalog is a JSON object mapping component id to a
//! duck-typed descriptor whose keys depend on `source_type`. Loading
//! validates every entry into a [`ComponentDescriptor`] with a closed
//! [`Source`] variant; saving writes the list form back with keys sorted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::step::{RawStep, Step};

/// Where a component's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// The newest release of a GitHub repository.
    GithubRelease {
        /// `owner/name`.
        repo: String,
        /// Assets to pick out of the release, in order.
        assets: Vec<AssetSpec>,
    },
    /// A fixed tagged release of a GitHub repository.
    GithubTag {
        /// `owner/name`.
        repo: String,
        /// Release tag, which is also the component version.
        tag: String,
        /// Assets to pick out of the release, in order.
        assets: Vec<AssetSpec>,
    },
    /// A single file at a literal URL.
    DirectUrl {
        /// Download URL.
        url: String,
        /// Steps applied to the downloaded file.
        steps: Vec<Step>,
    },
}

impl Source {
    /// Short wire name of the source kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GithubRelease { .. } => "github_release",
            Self::GithubTag { .. } => "github_tag",
            Self::DirectUrl { .. } => "direct_url",
        }
    }

    /// The GitHub repository, if this is a GitHub source.
    pub fn repo(&self) -> Option<&str> {
        match self {
            Self::GithubRelease { repo, .. } | Self::GithubTag { repo, .. } => Some(repo),
            Self::DirectUrl { .. } => None,
        }
    }
}

/// One asset pattern and the steps that place the matching file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSpec {
    /// Case-insensitive glob matched against release asset names.
    pub pattern: String,
    /// Steps applied to the downloaded asset. Empty means unzip to root.
    pub steps: Vec<Step>,
}

impl AssetSpec {
    /// Build an asset spec.
    pub fn new(pattern: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            pattern: pattern.into(),
            steps,
        }
    }
}

/// One catalog entry.
///
/// The id is fixed at construction: it is the join key against the
/// last-build and on-device manifests. Renaming a component means removing
/// it and inserting a new descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor {
    id: String,
    /// Display name.
    pub name: String,
    /// Display category.
    pub category: String,
    /// Free-text description.
    pub description: String,
    /// Where the component comes from.
    pub source: Source,
    /// Version pinned by the operator. Wins over everything else.
    pub manual_version: Option<String>,
    /// Last version successfully fetched. Advisory only.
    pub cached_version: Option<String>,
    /// Whether the component is part of the default selection.
    pub default_selected: bool,
}

impl ComponentDescriptor {
    /// Create a descriptor with empty display metadata.
    pub fn new(id: impl Into<String>, name: impl Into<String>, source: Source) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: String::new(),
            description: String::new(),
            source,
            manual_version: None,
            cached_version: None,
            default_selected: false,
        }
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// The component id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The display name, falling back to the id when blank.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    fn from_raw(id: String, raw: RawDescriptor) -> Result<Self, SchemaError> {
        let missing = |field: &'static str| SchemaError::MissingField {
            id: id.clone(),
            field,
        };
        let steps = |raw_steps: Option<Vec<RawStep>>| -> Result<Vec<Step>, SchemaError> {
            raw_steps
                .unwrap_or_default()
                .into_iter()
                .map(|s| {
                    Step::try_from(s).map_err(|source| SchemaError::Step {
                        id: id.clone(),
                        source,
                    })
                })
                .collect()
        };

        let source = match raw.source_type.as_str() {
            "github_release" | "github_tag" => {
                let repo = raw
                    .repo
                    .filter(|r| !r.trim().is_empty())
                    .ok_or_else(|| missing("repo"))?;

                // Legacy catalogs carry one pattern with its steps at the top level.
                let assets = match (raw.asset_patterns, raw.asset_pattern) {
                    (Some(list), _) if !list.is_empty() => list
                        .into_iter()
                        .map(|a| {
                            Ok::<_, SchemaError>(AssetSpec {
                                pattern: a.pattern,
                                steps: steps(Some(a.processing_steps))?,
                            })
                        })
                        .collect::<Result<Vec<_>, SchemaError>>()?,
                    (_, Some(pattern)) if !pattern.is_empty() => vec![AssetSpec {
                        pattern,
                        steps: steps(raw.processing_steps)?,
                    }],
                    _ => return Err(missing("asset_patterns")),
                };

                if raw.source_type == "github_tag" {
                    let tag = raw
                        .tag
                        .filter(|t| !t.is_empty())
                        .ok_or_else(|| missing("tag"))?;
                    Source::GithubTag { repo, tag, assets }
                } else {
                    Source::GithubRelease { repo, assets }
                }
            }
            "direct_url" => {
                // Older files keep the URL under `repo`.
                let url = raw
                    .url
                    .or(raw.repo)
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| missing("url"))?;
                Source::DirectUrl {
                    url,
                    steps: steps(raw.processing_steps)?,
                }
            }
            other => {
                return Err(SchemaError::UnknownSourceType {
                    id,
                    source_type: other.to_string(),
                });
            }
        };

        Ok(Self {
            name: raw.name,
            category: raw.category,
            description: raw.description,
            source,
            manual_version: raw.manual_version.filter(|v| !v.is_empty()),
            cached_version: raw
                .asset_info
                .and_then(|info| info.version)
                .filter(|v| !v.is_empty()),
            default_selected: raw.default,
            id,
        })
    }
}

/// Mapping of component id to descriptor, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    components: BTreeMap<String, ComponentDescriptor>,
}

impl Catalog {
    /// Parse and validate a catalog from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] naming the first invalid component.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let raw: BTreeMap<String, RawDescriptor> = serde_json::from_str(text)?;
        let components = raw
            .into_iter()
            .map(|(id, desc)| {
                let desc = ComponentDescriptor::from_raw(id.clone(), desc)?;
                Ok((id, desc))
            })
            .collect::<Result<_, SchemaError>>()?;
        Ok(Self { components })
    }

    /// Render the catalog as pretty JSON with sorted keys.
    ///
    /// # Errors
    ///
    /// Returns an error only if serialization itself fails.
    pub fn to_json(&self) -> Result<String, SchemaError> {
        let raw: BTreeMap<&str, RawDescriptor> = self
            .components
            .iter()
            .map(|(id, desc)| (id.as_str(), RawDescriptor::from(desc)))
            .collect();
        Ok(serde_json::to_string_pretty(&raw)?)
    }

    /// Look up a component.
    pub fn get(&self, id: &str) -> Option<&ComponentDescriptor> {
        self.components.get(id)
    }

    /// Whether the catalog contains `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.components.contains_key(id)
    }

    /// Iterate descriptors in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.components.values()
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the catalog has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Add a new component.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateId`] if the id is already taken.
    pub fn insert(&mut self, desc: ComponentDescriptor) -> Result<(), SchemaError> {
        if self.components.contains_key(desc.id()) {
            return Err(SchemaError::DuplicateId {
                id: desc.id().to_string(),
            });
        }
        self.components.insert(desc.id().to_string(), desc);
        Ok(())
    }

    /// Remove a component, returning it.
    pub fn remove(&mut self, id: &str) -> Option<ComponentDescriptor> {
        self.components.remove(id)
    }

    /// Record a freshly fetched version. Returns `false` for unknown ids.
    pub fn set_cached_version(&mut self, id: &str, version: impl Into<String>) -> bool {
        match self.components.get_mut(id) {
            Some(desc) => {
                desc.cached_version = Some(version.into());
                true
            }
            None => false,
        }
    }

    /// Ids flagged as part of the default selection.
    pub fn default_selection(&self) -> Vec<String> {
        self.components
            .values()
            .filter(|d| d.default_selected)
            .map(|d| d.id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawAsset {
    pattern: String,
    #[serde(default)]
    processing_steps: Vec<RawStep>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawAssetInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawDescriptor {
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    category: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
    source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    asset_patterns: Option<Vec<RawAsset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    asset_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    processing_steps: Option<Vec<RawStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    manual_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    asset_info: Option<RawAssetInfo>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    default: bool,
}

fn raw_assets(assets: &[AssetSpec]) -> Vec<RawAsset> {
    assets
        .iter()
        .map(|a| RawAsset {
            pattern: a.pattern.clone(),
            processing_steps: a.steps.iter().cloned().map(RawStep::from).collect(),
        })
        .collect()
}

impl From<&ComponentDescriptor> for RawDescriptor {
    fn from(desc: &ComponentDescriptor) -> Self {
        let mut raw = RawDescriptor {
            name: desc.name.clone(),
            category: desc.category.clone(),
            description: desc.description.clone(),
            source_type: desc.source.kind().to_string(),
            manual_version: desc.manual_version.clone(),
            asset_info: desc.cached_version.clone().map(|version| RawAssetInfo {
                version: Some(version),
            }),
            default: desc.default_selected,
            ..RawDescriptor::default()
        };
        match &desc.source {
            Source::GithubRelease { repo, assets } => {
                raw.repo = Some(repo.clone());
                raw.asset_patterns = Some(raw_assets(assets));
            }
            Source::GithubTag { repo, tag, assets } => {
                raw.repo = Some(repo.clone());
                raw.tag = Some(tag.clone());
                raw.asset_patterns = Some(raw_assets(assets));
            }
            Source::DirectUrl { url, steps } => {
                raw.url = Some(url.clone());
                raw.processing_steps = Some(steps.iter().cloned().map(RawStep::from).collect());
            }
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"{
        "atmosphere": {
            "name": "Atmosphere",
            "category": "Core",
            "source_type": "github_release",
            "repo": "Atmosphere-NX/Atmosphere",
            "asset_pattern": "atmosphere-*.zip",
            "processing_steps": [{"action": "unzip_to_root"}],
            "asset_info": {"version": "1.7.1"},
            "default": true
        },
        "ftpd": {
            "name": "ftpd",
            "category": "Homebrew",
            "source_type": "direct_url",
            "repo": "https://example.com/releases/3.2.0/ftpd.nro",
            "processing_steps": [{"action": "copy_file", "target_path": "/switch"}]
        }
    }"#;

    #[test]
    fn legacy_singular_pattern_normalizes_to_list() {
        let catalog = Catalog::from_json(LEGACY).unwrap();
        let ams = catalog.get("atmosphere").unwrap();

        match &ams.source {
            Source::GithubRelease { repo, assets } => {
                assert_eq!(repo, "Atmosphere-NX/Atmosphere");
                assert_eq!(assets.len(), 1);
                assert_eq!(assets[0].pattern, "atmosphere-*.zip");
                assert_eq!(assets[0].steps, vec![Step::UnzipToRoot]);
            }
            other => panic!("unexpected source {other:?}"),
        }
        assert_eq!(ams.cached_version.as_deref(), Some("1.7.1"));
        assert_eq!(catalog.default_selection(), vec!["atmosphere".to_string()]);
    }

    #[test]
    fn direct_url_reads_legacy_repo_field() {
        let catalog = Catalog::from_json(LEGACY).unwrap();
        let ftpd = catalog.get("ftpd").unwrap();
        assert_eq!(
            ftpd.source,
            Source::DirectUrl {
                url: "https://example.com/releases/3.2.0/ftpd.nro".into(),
                steps: vec![Step::CopyFile {
                    target_dir: "switch".into()
                }],
            }
        );
    }

    #[test]
    fn multi_asset_list_form() {
        let catalog = Catalog::from_json(
            r#"{"hekate": {
                "name": "hekate",
                "source_type": "github_tag",
                "repo": "CTCaer/hekate",
                "tag": "v6.2.0",
                "asset_patterns": [
                    {"pattern": "hekate_ctcaer_*.zip"},
                    {"pattern": "*.bin", "processing_steps": [
                        {"action": "copy_file", "target_path": "bootloader/payloads"}
                    ]}
                ]
            }}"#,
        )
        .unwrap();

        let Source::GithubTag { tag, assets, .. } = &catalog.get("hekate").unwrap().source else {
            panic!("expected a tag source");
        };
        assert_eq!(tag, "v6.2.0");
        assert_eq!(assets.len(), 2);
        assert!(assets[0].steps.is_empty());
    }

    #[test]
    fn invalid_entries_name_the_component() {
        let err = Catalog::from_json(r#"{"x": {"name": "x", "source_type": "ftp"}}"#).unwrap_err();
        assert!(err.to_string().contains("'x'") && err.to_string().contains("ftp"));

        let err = Catalog::from_json(
            r#"{"y": {"name": "y", "source_type": "github_release", "repo": "a/b"}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("asset_patterns"), "{err}");

        let err = Catalog::from_json(
            r#"{"z": {"name": "z", "source_type": "direct_url", "url": "https://e.com/f",
                "processing_steps": [{"action": "unzip_to_path"}]}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("'z'") && err.to_string().contains("target_path"));
    }

    #[test]
    fn save_and_reload_preserves_entries() {
        let catalog = Catalog::from_json(LEGACY).unwrap();
        let reloaded = Catalog::from_json(&catalog.to_json().unwrap()).unwrap();
        assert_eq!(catalog, reloaded);
    }

    #[test]
    fn insert_rejects_existing_id() {
        let mut catalog = Catalog::from_json(LEGACY).unwrap();
        let dup = ComponentDescriptor::new(
            "ftpd",
            "ftpd again",
            Source::DirectUrl {
                url: "https://example.com/ftpd.nro".into(),
                steps: vec![],
            },
        );
        assert!(matches!(
            catalog.insert(dup),
            Err(SchemaError::DuplicateId { .. })
        ));

        assert!(catalog.remove("ftpd").is_some());
        assert!(!catalog.contains("ftpd"));
        assert!(catalog.set_cached_version("atmosphere", "1.8.0"));
        assert!(!catalog.set_cached_version("missing", "1.0"));
    }
}
