//! Asset acquisition.
//!
//! One task per component resolves its version, locates each asset and
//! downloads it into the component's own scratch directory. Assets within a
//! component go one after another; components run in parallel on a bounded
//! pool that stops at the first failure or when the build is cancelled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hats_schema::{AssetSpec, ComponentDescriptor, Source, Step};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::builder::BuildError;
use crate::config::Config;
use crate::github::GithubClient;
use crate::io::download::{
    AssetTransport, DownloadError, DownloadRequest, RetryPolicy, find_asset, report_size,
};
use crate::paths::filename_from_url;
use crate::reporter::{Phase, Reporter};
use crate::resolver::{self, ResolvedVersion, VersionOrigin, version_from_url};

/// Local name for direct downloads whose URL ends in `/`.
pub const FALLBACK_FILENAME: &str = "downloaded_file";

/// A downloaded asset waiting for its steps.
#[derive(Debug, Clone)]
pub struct AcquiredAsset {
    /// Downloaded file.
    pub path: PathBuf,
    /// Steps to run on it.
    pub steps: Vec<Step>,
}

/// Everything one component needs for the processing phase.
#[derive(Debug, Clone)]
pub struct Acquired {
    pub id: String,
    /// Version that was built.
    pub version: String,
    pub origin: VersionOrigin,
    /// Release page or direct URL the bytes came from.
    pub source_ref: String,
    pub assets: Vec<AcquiredAsset>,
}

/// Shared state for acquisition tasks.
pub struct Acquirer {
    github: GithubClient,
    transport: Arc<dyn AssetTransport>,
    config: Config,
    scratch: PathBuf,
}

impl Acquirer {
    pub fn new(
        github: GithubClient,
        transport: Arc<dyn AssetTransport>,
        config: Config,
        scratch: PathBuf,
    ) -> Self {
        Self {
            github,
            transport,
            config,
            scratch,
        }
    }

    /// Resolve and download every asset of `desc`.
    ///
    /// # Errors
    ///
    /// Fails on the first resolution, lookup or download error, attributed to
    /// the component.
    pub async fn acquire<R: Reporter>(
        &self,
        desc: &ComponentDescriptor,
        reporter: &R,
    ) -> Result<Acquired, BuildError> {
        let id = desc.id();
        let resolved = resolver::resolve(desc, &self.github, &self.config).await?;
        reporter.step(
            id,
            Phase::Resolve,
            &format!("{} ({:?})", resolved.version, resolved.origin),
        );

        let dir = self.scratch.join(id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| BuildError::Io {
                context: format!("creating {}", dir.display()),
                source,
            })?;

        match &desc.source {
            Source::GithubRelease { repo, assets } | Source::GithubTag { repo, assets, .. } => {
                self.acquire_release(id, repo, assets, resolved, &dir, reporter)
                    .await
            }
            Source::DirectUrl { url, steps } => {
                self.acquire_url(id, url, steps, resolved, &dir, reporter)
                    .await
            }
        }
    }

    async fn acquire_release<R: Reporter>(
        &self,
        id: &str,
        repo: &str,
        specs: &[AssetSpec],
        resolved: ResolvedVersion,
        dir: &Path,
        reporter: &R,
    ) -> Result<Acquired, BuildError> {
        let attribute = |source: DownloadError| BuildError::Acquire {
            id: id.to_string(),
            source,
        };

        reporter.step(id, Phase::Download, &format!("looking up {repo}@{}", resolved.version));
        let release = self
            .github
            .release_by_tag(repo, &resolved.version, self.config.release_page_size)
            .await
            .map_err(|e| attribute(e.into()))?;

        let mut assets = Vec::with_capacity(specs.len());
        for spec in specs {
            let asset = find_asset(&release, &spec.pattern).map_err(attribute)?;
            let dest = dir.join(&asset.name);
            let bytes = self.download(id, &asset.browser_download_url, &dest, reporter)
                .await
                .map_err(attribute)?;
            report_size(reporter, id, &asset.name, bytes);
            assets.push(AcquiredAsset {
                path: dest,
                steps: spec.steps.clone(),
            });
        }

        Ok(Acquired {
            id: id.to_string(),
            version: resolved.version,
            origin: resolved.origin,
            source_ref: format!("https://github.com/{repo}/releases/tag/{}", release.tag_name),
            assets,
        })
    }

    async fn acquire_url<R: Reporter>(
        &self,
        id: &str,
        url: &str,
        steps: &[Step],
        resolved: ResolvedVersion,
        dir: &Path,
        reporter: &R,
    ) -> Result<Acquired, BuildError> {
        let name = match filename_from_url(url) {
            "" => FALLBACK_FILENAME,
            name => name,
        };
        let dest = dir.join(name);
        let bytes = self
            .download(id, url, &dest, reporter)
            .await
            .map_err(|source| BuildError::Acquire {
                id: id.to_string(),
                source,
            })?;
        report_size(reporter, id, name, bytes);

        // A pin stays a pin; otherwise the URL is the authority on the version.
        let (version, origin) = match (resolved.origin, version_from_url(url)) {
            (VersionOrigin::Manual, _) | (_, None) => (resolved.version, resolved.origin),
            (_, Some(token)) => (token, VersionOrigin::Url),
        };

        Ok(Acquired {
            id: id.to_string(),
            version,
            origin,
            source_ref: url.to_string(),
            assets: vec![AcquiredAsset {
                path: dest,
                steps: steps.to_vec(),
            }],
        })
    }

    async fn download<R: Reporter>(
        &self,
        id: &str,
        url: &str,
        dest: &Path,
        reporter: &R,
    ) -> Result<u64, DownloadError> {
        reporter.step(id, Phase::Download, url);
        DownloadRequest::new(self.transport.as_ref(), id, url, dest, reporter)
            .with_policy(RetryPolicy::from_config(&self.config))
            .execute()
            .await
    }
}

/// Acquire every component in `descriptors` on a pool of `width` tasks.
///
/// Results come back in completion order. The first failure aborts every
/// other task; so does cancelling `cancel`, which yields
/// [`BuildError::Cancelled`].
///
/// # Errors
///
/// Returns the first component error, or `Cancelled`.
pub async fn acquire_all<R>(
    acquirer: Arc<Acquirer>,
    descriptors: Vec<ComponentDescriptor>,
    width: usize,
    reporter: R,
    cancel: &CancellationToken,
) -> Result<Vec<Acquired>, BuildError>
where
    R: Reporter + Clone + 'static,
{
    let permits = Arc::new(Semaphore::new(width.max(1)));
    let mut tasks = JoinSet::new();

    for desc in descriptors {
        let acquirer = Arc::clone(&acquirer);
        let permits = Arc::clone(&permits);
        let reporter = reporter.clone();
        tasks.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| BuildError::Cancelled)?;
            acquirer.acquire(&desc, &reporter).await
        });
    }

    let mut acquired = Vec::with_capacity(tasks.len());
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tasks.abort_all();
                return Err(BuildError::Cancelled);
            }
            next = tasks.join_next() => match next {
                None => break,
                Some(Ok(Ok(component))) => acquired.push(component),
                Some(Ok(Err(e))) => {
                    tasks.abort_all();
                    return Err(e);
                }
                Some(Err(e)) => {
                    tasks.abort_all();
                    return Err(BuildError::Join(e));
                }
            }
        }
    }
    Ok(acquired)
}
