//! Version resolution.
//!
//! Decides which version of a component to build: an operator pin wins, then
//! the last fetched version, then whatever the source reports now. Also hosts
//! the "fetch versions" batch, which refreshes cached versions for a set of
//! components concurrently and reports per-component outcomes.

use std::sync::LazyLock;

use futures::StreamExt;
use hats_schema::{Catalog, ComponentDescriptor, NOT_AVAILABLE, Source};
use regex::Regex;
use thiserror::Error;

use crate::config::Config;
use crate::github::{GithubClient, GithubError};
use crate::reporter::{Phase, Reporter};

static URL_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/([vV]?\d+(?:\.\d+)*)/").expect("URL version pattern is valid")
});

/// Extract a version-looking path segment (`/1.2.3/`, `/v2/`, `/658/`) from a URL.
pub fn version_from_url(url: &str) -> Option<String> {
    URL_VERSION
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Where a resolved version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrigin {
    /// Operator pin.
    Manual,
    /// Previously fetched and stored in the catalog.
    Cached,
    /// The configured release tag.
    Tag,
    /// A path segment of the download URL.
    Url,
    /// The newest release upstream.
    Latest,
    /// Nothing could be determined; the version is `N/A`.
    Unknown,
}

/// A version and how it was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// Version string, `N/A` when unknown.
    pub version: String,
    /// How it was chosen.
    pub origin: VersionOrigin,
}

impl ResolvedVersion {
    fn new(version: impl Into<String>, origin: VersionOrigin) -> Self {
        Self {
            version: version.into(),
            origin,
        }
    }
}

/// Version resolution failures. Both are soft for batch operations.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The API refused the request; a token would help.
    #[error("{id}: {source}")]
    RateLimited {
        /// Component being resolved.
        id: String,
        /// Upstream error.
        source: GithubError,
    },

    /// Any other lookup failure.
    #[error("{id}: version lookup failed: {source}")]
    Fetch {
        /// Component being resolved.
        id: String,
        /// Upstream error.
        source: GithubError,
    },
}

impl ResolveError {
    fn from_github(id: &str, source: GithubError) -> Self {
        match source {
            GithubError::RateLimited { .. } => Self::RateLimited {
                id: id.to_string(),
                source,
            },
            _ => Self::Fetch {
                id: id.to_string(),
                source,
            },
        }
    }
}

/// Resolve the version to build for `desc`.
///
/// Order: `manual_version`, then for tag sources the tag itself, then
/// `cached_version`, then the source: URL segment for direct URLs (soft miss
/// yields `N/A`) or the newest published release for GitHub releases.
///
/// # Errors
///
/// Only the GitHub release lookup can fail.
pub async fn resolve(
    desc: &ComponentDescriptor,
    github: &GithubClient,
    config: &Config,
) -> Result<ResolvedVersion, ResolveError> {
    if let Some(manual) = &desc.manual_version {
        return Ok(ResolvedVersion::new(manual, VersionOrigin::Manual));
    }
    if let Source::GithubTag { tag, .. } = &desc.source {
        return Ok(ResolvedVersion::new(tag, VersionOrigin::Tag));
    }
    if let Some(cached) = &desc.cached_version {
        return Ok(ResolvedVersion::new(cached, VersionOrigin::Cached));
    }
    fetch_current(desc, github, config).await
}

/// Ask the source for its current version, ignoring pins and caches.
///
/// # Errors
///
/// Returns [`ResolveError`] if the GitHub lookup fails.
pub async fn fetch_current(
    desc: &ComponentDescriptor,
    github: &GithubClient,
    config: &Config,
) -> Result<ResolvedVersion, ResolveError> {
    match &desc.source {
        Source::DirectUrl { url, .. } => Ok(version_from_url(url).map_or_else(
            || ResolvedVersion::new(NOT_AVAILABLE, VersionOrigin::Unknown),
            |v| ResolvedVersion::new(v, VersionOrigin::Url),
        )),
        Source::GithubTag { tag, .. } => Ok(ResolvedVersion::new(tag, VersionOrigin::Tag)),
        Source::GithubRelease { repo, .. } => {
            let release = github
                .latest_release(repo, config.release_page_size)
                .await
                .map_err(|e| ResolveError::from_github(desc.id(), e))?;
            Ok(ResolvedVersion::new(release.tag_name, VersionOrigin::Latest))
        }
    }
}

/// Result of refreshing one component's version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A version was found.
    Updated {
        /// Component id.
        id: String,
        /// The fetched version.
        version: String,
    },
    /// The lookup failed; the rest of the batch carried on.
    Failed {
        /// Component id.
        id: String,
        /// Human-readable cause.
        reason: String,
        /// Whether the failure was an API rate limit.
        rate_limited: bool,
    },
    /// Nothing to fetch for this component.
    Skipped {
        /// Component id.
        id: String,
        /// Why it was skipped.
        reason: String,
    },
}

/// Per-component outcomes of a version fetch batch.
#[derive(Debug, Clone, Default)]
pub struct FetchSummary {
    /// One entry per requested id, in completion order.
    pub outcomes: Vec<FetchOutcome>,
}

impl FetchSummary {
    /// Number of components with a fresh version.
    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Updated { .. }))
    }

    /// Number of failed lookups.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Failed { .. }))
    }

    /// Number of skipped components.
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FetchOutcome::Skipped { .. }))
    }

    /// Whether any failure was a rate limit.
    pub fn rate_limited(&self) -> bool {
        self.outcomes.iter().any(|o| {
            matches!(
                o,
                FetchOutcome::Failed {
                    rate_limited: true,
                    ..
                }
            )
        })
    }

    fn count(&self, pred: impl Fn(&FetchOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }

    /// Store every fetched version as the component's cached version.
    /// Returns how many catalog entries changed.
    pub fn apply(&self, catalog: &mut Catalog) -> usize {
        let mut changed = 0;
        for outcome in &self.outcomes {
            if let FetchOutcome::Updated { id, version } = outcome {
                let current = catalog.get(id).and_then(|d| d.cached_version.as_deref());
                if current != Some(version.as_str()) && catalog.set_cached_version(id, version) {
                    changed += 1;
                }
            }
        }
        changed
    }
}

/// Refresh versions for `ids` concurrently.
///
/// Failures never abort the batch; each id gets exactly one outcome. Tag
/// sources are skipped since their version is fixed, and a direct URL with no
/// version segment counts as a failure.
pub async fn fetch_versions<R: Reporter>(
    catalog: &Catalog,
    ids: &[String],
    github: &GithubClient,
    config: &Config,
    reporter: &R,
) -> FetchSummary {
    let outcomes = futures::stream::iter(ids)
        .map(|id| async move {
            let Some(desc) = catalog.get(id) else {
                reporter.warning(Some(id.as_str()), "not in catalog");
                return FetchOutcome::Skipped {
                    id: id.clone(),
                    reason: "not in catalog".to_string(),
                };
            };

            if let Source::GithubTag { tag, .. } = &desc.source {
                return FetchOutcome::Skipped {
                    id: id.clone(),
                    reason: format!("pinned to tag {tag}"),
                };
            }

            reporter.step(id, Phase::Resolve, "checking for latest version");
            match fetch_current(desc, github, config).await {
                Ok(resolved) if resolved.origin == VersionOrigin::Unknown => {
                    let reason = "no version segment in URL".to_string();
                    reporter.failed(id, &reason);
                    FetchOutcome::Failed {
                        id: id.clone(),
                        reason,
                        rate_limited: false,
                    }
                }
                Ok(resolved) => {
                    reporter.done(id, &resolved.version);
                    FetchOutcome::Updated {
                        id: id.clone(),
                        version: resolved.version,
                    }
                }
                Err(e) => {
                    tracing::warn!("{e}");
                    reporter.failed(id, &e.to_string());
                    FetchOutcome::Failed {
                        id: id.clone(),
                        reason: e.to_string(),
                        rate_limited: matches!(e, ResolveError::RateLimited { .. }),
                    }
                }
            }
        })
        .buffer_unordered(config.pool_width())
        .collect::<Vec<_>>()
        .await;

    FetchSummary { outcomes }
}
