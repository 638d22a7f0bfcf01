//! Pack build orchestration.
//!
//! A build runs in two phases. Acquisition fans out over a bounded pool:
//! resolve each component's version and download its assets. Once every
//! download has landed, materialization runs on a single path: skeleton,
//! processing steps in selection order, firmware lookup, hash, metadata and
//! the zip. Any component failure halts the build before a pack or a new
//! last-build reference is written.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use hats_schema::{BuildManifest, Catalog, ComponentDescriptor, ManifestEntry};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::acquire::{self, Acquired, Acquirer};
use crate::config::Config;
use crate::firmware;
use crate::github::GithubClient;
use crate::io::download::{AssetTransport, DownloadError, HttpTransport};
use crate::manifest::{self, ChangelogEntry};
use crate::package::{self, PackageError};
use crate::paths;
use crate::process::{self, StepError};
use crate::reporter::{Phase, ProgressEvent, Reporter};
use crate::resolver::{ResolveError, VersionOrigin};

/// What to build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequest {
    /// Component ids, in the order they should be processed.
    pub selected_ids: Vec<String>,
    /// Per-component version pins, overriding the catalog's.
    pub manual_versions: BTreeMap<String, String>,
    /// Free-text note recorded in the manifest and summary.
    pub comment: Option<String>,
}

impl BuildRequest {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selected_ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_manual_version(mut self, id: impl Into<String>, version: impl Into<String>) -> Self {
        self.manual_versions.insert(id.into(), version.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// A finished build.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// The manifest written into the pack and saved as last build.
    pub manifest: BuildManifest,
    /// Where the pack landed.
    pub pack_path: PathBuf,
    /// Version changes since the previous build.
    pub changelog: Vec<ChangelogEntry>,
    /// Versions learned from upstream during the build, as `(id, version)`.
    /// Callers may store them as cached versions.
    pub fetched_versions: Vec<(String, String)>,
}

/// Why a build stopped.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Nothing selected to build")]
    EmptySelection,

    #[error("Component '{0}' is not in the catalog")]
    UnknownComponent(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Component '{id}': {source}")]
    Acquire { id: String, source: DownloadError },

    #[error("Component '{id}': {source}")]
    Process { id: String, source: StepError },

    #[error("Build cancelled")]
    Cancelled,

    #[error("Packaging failed: {0}")]
    Package(#[from] PackageError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    State(#[from] anyhow::Error),
}

impl BuildError {
    /// The component the failure is attributed to, if any.
    pub fn component_id(&self) -> Option<&str> {
        match self {
            Self::UnknownComponent(id)
            | Self::Acquire { id, .. }
            | Self::Process { id, .. }
            | Self::Resolve(ResolveError::RateLimited { id, .. } | ResolveError::Fetch { id, .. }) => {
                Some(id.as_str())
            }
            _ => None,
        }
    }
}

/// Runs builds against one configuration.
pub struct PackBuilder<R> {
    config: Config,
    github: GithubClient,
    transport: Arc<dyn AssetTransport>,
    reporter: R,
    cancel: CancellationToken,
    output_dir: PathBuf,
    work_dir: PathBuf,
    last_build_path: PathBuf,
}

impl<R: Reporter + Clone + 'static> PackBuilder<R> {
    /// A builder downloading over the GitHub client's HTTP client, writing
    /// packs to the current directory.
    pub fn new(config: Config, github: GithubClient, reporter: R) -> Self {
        let transport = Arc::new(HttpTransport::new(github.http().clone()));
        Self {
            config,
            github,
            transport,
            reporter,
            cancel: CancellationToken::new(),
            output_dir: PathBuf::from("."),
            work_dir: paths::tmp_path(),
            last_build_path: paths::last_build_path(),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn AssetTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Parent of the per-build scratch directory.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_last_build_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.last_build_path = path.into();
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that aborts the running build when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one build.
    ///
    /// # Errors
    ///
    /// Fails on an unknown or empty selection before any network call, and
    /// on the first component that cannot be acquired or processed.
    pub async fn build(
        &self,
        catalog: &Catalog,
        request: &BuildRequest,
    ) -> Result<BuildOutcome, BuildError> {
        let descriptors = select(catalog, request)?;
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let previous = match manifest::load_last_build(&self.last_build_path).await {
            Ok(previous) => previous,
            Err(e) => {
                self.reporter
                    .warning(None, &format!("ignoring unreadable last build: {e:#}"));
                None
            }
        };

        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|source| BuildError::Io {
                context: format!("creating {}", self.work_dir.display()),
                source,
            })?;
        let scratch = tempfile::Builder::new()
            .prefix("build-")
            .tempdir_in(&self.work_dir)
            .map_err(|source| BuildError::Io {
                context: format!("creating scratch in {}", self.work_dir.display()),
                source,
            })?;
        let downloads = scratch.path().join("downloads");
        let staging = scratch.path().join("staging");
        tracing::debug!("build scratch at {}", scratch.path().display());

        // Phase one: parallel acquisition.
        self.reporter.info(&format!(
            "acquiring {} component(s) with {} worker(s)",
            descriptors.len(),
            self.config.pool_width()
        ));
        let acquirer = Arc::new(Acquirer::new(
            self.github.clone(),
            Arc::clone(&self.transport),
            self.config.clone(),
            downloads,
        ));
        let mut acquired = acquire::acquire_all(
            acquirer,
            descriptors.clone(),
            self.config.pool_width(),
            self.reporter.clone(),
            &self.cancel,
        )
        .await?;
        let order: BTreeMap<&str, usize> = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id(), i))
            .collect();
        acquired.sort_by_key(|a| order.get(a.id.as_str()).copied().unwrap_or(usize::MAX));

        // Phase two: sequential materialization.
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|source| BuildError::Io {
                context: format!("creating {}", staging.display()),
                source,
            })?;
        package::merge_skeleton(&self.config.skeleton_path(), &staging, &self.reporter).await?;

        let mut manifest = BuildManifest::start(
            self.config.builder_version.clone(),
            Utc::now(),
            previous.as_ref(),
        );
        manifest.comment = request
            .comment
            .clone()
            .filter(|c| !c.trim().is_empty());

        for component in &acquired {
            if self.cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            let Some(desc) = descriptors.iter().find(|d| d.id() == component.id) else {
                continue;
            };
            let files = self.process(component, &staging).await?;
            self.reporter.done(
                &component.id,
                &format!("{} ({} files)", component.version, files.len()),
            );
            manifest.components.insert(
                component.id.clone(),
                ManifestEntry {
                    name: desc.display_name().to_string(),
                    version: component.version.clone(),
                    category: desc.category.clone(),
                    source_ref: Some(component.source_ref.clone()),
                    files,
                },
            );
        }

        self.apply_firmware(&mut manifest).await;

        manifest.content_hash = manifest::manifest_hash(&manifest);
        let base_name = package::pack_base_name(
            &self.config.pack_prefix,
            manifest.build_date,
            &manifest.content_hash,
        );
        manifest.pack_name = format!("{base_name}.zip");

        let changelog = manifest::changelog(previous.as_ref(), &manifest);
        let summary = manifest::summary_text(&manifest, &changelog, Utc::now());
        self.reporter.report(ProgressEvent::global(
            Phase::Package,
            format!("writing {}", manifest.pack_name),
        ));
        let pack_path =
            package::write_pack(&staging, &self.output_dir, &manifest, &summary, &base_name)
                .await?;

        manifest::save_last_build(&self.last_build_path, &manifest).await?;
        self.reporter.report(ProgressEvent::global(
            Phase::Done,
            format!("{} ({})", pack_path.display(), manifest.content_hash),
        ));

        let fetched_versions = acquired
            .iter()
            .filter(|a| matches!(a.origin, VersionOrigin::Latest | VersionOrigin::Url))
            .map(|a| (a.id.clone(), a.version.clone()))
            .collect();

        Ok(BuildOutcome {
            manifest,
            pack_path,
            changelog,
            fetched_versions,
        })
    }

    async fn process(
        &self,
        component: &Acquired,
        staging: &std::path::Path,
    ) -> Result<Vec<String>, BuildError> {
        let mut files = Vec::new();
        for asset in &component.assets {
            let steps = asset.steps.clone();
            let asset_path = asset.path.clone();
            let staging = staging.to_path_buf();
            let id = component.id.clone();
            let reporter = self.reporter.clone();

            let written = tokio::task::spawn_blocking(move || {
                process::apply_steps(&steps, &asset_path, &staging, &id, &reporter)
            })
            .await?
            .map_err(|source| BuildError::Process {
                id: component.id.clone(),
                source,
            })?;

            for file in written {
                if !files.contains(&file) {
                    files.push(file);
                }
            }
        }
        Ok(files)
    }

    /// Refresh `supported_firmware` when the firmware-defining component is
    /// part of the build. Lookup problems keep the inherited value.
    async fn apply_firmware(&self, manifest: &mut BuildManifest) {
        let Some(entry) = manifest.components.get(&self.config.firmware_component) else {
            return;
        };
        let id = self.config.firmware_component.as_str();
        let version = entry.version.clone();

        self.reporter
            .step(id, Phase::Firmware, "scanning releases for firmware support");
        match firmware::lookup_firmware(&self.github, &self.config, &version).await {
            Ok(Some(fw)) => {
                self.reporter
                    .step(id, Phase::Firmware, &format!("{version} supports firmware up to {fw}"));
                manifest.supported_firmware = fw;
            }
            Ok(None) => self.reporter.warning(
                Some(id),
                &format!(
                    "could not determine firmware support for {version}, keeping {}",
                    manifest.supported_firmware
                ),
            ),
            Err(e) => self.reporter.warning(
                Some(id),
                &format!("firmware lookup failed ({e}), keeping {}", manifest.supported_firmware),
            ),
        }
    }
}

/// Validate the selection and apply request pins. Duplicate ids collapse to
/// their first occurrence.
fn select(catalog: &Catalog, request: &BuildRequest) -> Result<Vec<ComponentDescriptor>, BuildError> {
    if request.selected_ids.is_empty() {
        return Err(BuildError::EmptySelection);
    }

    let mut seen = Vec::new();
    let mut descriptors = Vec::new();
    for id in &request.selected_ids {
        if seen.contains(id) {
            continue;
        }
        seen.push(id.clone());

        let mut desc = catalog
            .get(id)
            .cloned()
            .ok_or_else(|| BuildError::UnknownComponent(id.clone()))?;
        if let Some(pin) = request.manual_versions.get(id) {
            desc.manual_version = Some(pin.clone());
        }
        descriptors.push(desc);
    }
    Ok(descriptors)
}
