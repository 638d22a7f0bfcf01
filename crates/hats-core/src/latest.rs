//! Fetch the newest published pack.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::Config;
use crate::github::{GithubClient, GithubError};
use crate::io::download::{AssetTransport, DownloadError, DownloadRequest, RetryPolicy};
use crate::reporter::{Phase, Reporter};

const PACK_ID: &str = "pack";

#[derive(Error, Debug)]
pub enum LatestError {
    #[error(transparent)]
    Release(#[from] GithubError),

    #[error("Release {tag} of {repo} has no .zip asset")]
    NoPackAsset { repo: String, tag: String },

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("Failed to prepare {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A published pack on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestPack {
    pub tag: String,
    pub path: PathBuf,
    /// Size advertised by the release.
    pub size: u64,
    /// `false` when an existing file was kept.
    pub downloaded: bool,
}

/// Download the first `.zip` asset of the newest `pack_repo` release into
/// `dest_dir`. An existing file of the same name is kept unless `force`.
///
/// # Errors
///
/// Returns an error if the release lookup or the download fails, or if the
/// release carries no archive.
pub async fn latest_pack<R: Reporter>(
    github: &GithubClient,
    transport: &dyn AssetTransport,
    config: &Config,
    dest_dir: &Path,
    force: bool,
    reporter: &R,
) -> Result<LatestPack, LatestError> {
    let repo = config.pack_repo.as_str();
    let release = github
        .latest_release(repo, config.release_page_size)
        .await?;
    let asset = release
        .assets
        .iter()
        .find(|a| a.name.to_ascii_lowercase().ends_with(".zip"))
        .ok_or_else(|| LatestError::NoPackAsset {
            repo: repo.to_string(),
            tag: release.tag_name.clone(),
        })?;

    reporter.step(
        PACK_ID,
        Phase::Resolve,
        &format!(
            "{} {} ({:.1} MiB)",
            release.tag_name,
            asset.name,
            asset.size as f64 / (1024.0 * 1024.0)
        ),
    );

    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|source| LatestError::Io {
            path: dest_dir.to_path_buf(),
            source,
        })?;
    let dest = dest_dir.join(&asset.name);

    let downloaded = if dest.is_file() && !force {
        reporter.info(&format!("{} already present, use --force to download again", dest.display()));
        false
    } else {
        DownloadRequest::new(transport, PACK_ID, &asset.browser_download_url, &dest, reporter)
            .with_policy(RetryPolicy::from_config(config))
            .execute()
            .await?;
        reporter.done(PACK_ID, &dest.display().to_string());
        true
    };

    Ok(LatestPack {
        tag: release.tag_name.clone(),
        path: dest,
        size: asset.size,
        downloaded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use crate::github::build_http_client;
    use crate::io::download::HttpTransport;
    use mockito::{Matcher, Server};

    async fn setup(server: &mut mockito::ServerGuard) -> (GithubClient, HttpTransport, Config) {
        let releases = format!(
            r#"[
                {{"tag_name": "v2", "published_at": "2025-02-01T00:00:00Z",
                  "assets": [
                    {{"name": "README.txt", "browser_download_url": "{0}/dl/README.txt", "size": 3}},
                    {{"name": "HATS-01022025-abcdef0.zip", "browser_download_url": "{0}/dl/new.zip", "size": 4}}
                  ]}},
                {{"tag_name": "v1", "published_at": "2025-01-01T00:00:00Z",
                  "assets": [{{"name": "old.zip", "browser_download_url": "{0}/dl/old.zip", "size": 4}}]}}
            ]"#,
            server.url()
        );
        server
            .mock("GET", "/repos/sthetix/HATS/releases")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(releases)
            .create_async()
            .await;

        let config = Config {
            api_url: server.url(),
            retry_delay_ms: 1,
            ..Config::default()
        };
        let client = build_http_client(&config).unwrap();
        (
            GithubClient::new(client.clone(), &config),
            HttpTransport::new(client),
            config,
        )
    }

    #[tokio::test]
    async fn downloads_first_zip_of_newest_release() {
        let mut server = Server::new_async().await;
        let (github, transport, config) = setup(&mut server).await;
        let asset = server
            .mock("GET", "/dl/new.zip")
            .with_status(200)
            .with_body("PK..")
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let pack = latest_pack(&github, &transport, &config, dir.path(), false, &NullReporter)
            .await
            .unwrap();
        assert_eq!(pack.tag, "v2");
        assert!(pack.downloaded);
        assert_eq!(pack.path, dir.path().join("HATS-01022025-abcdef0.zip"));
        assert_eq!(std::fs::read(&pack.path).unwrap(), b"PK..");

        let again = latest_pack(&github, &transport, &config, dir.path(), false, &NullReporter)
            .await
            .unwrap();
        assert!(!again.downloaded);
        asset.assert_async().await;
    }

    #[tokio::test]
    async fn release_without_archive_is_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/sthetix/HATS/releases")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"tag_name": "v3", "published_at": "2025-03-01T00:00:00Z", "assets": []}]"#)
            .create_async()
            .await;
        let config = Config {
            api_url: server.url(),
            ..Config::default()
        };
        let client = build_http_client(&config).unwrap();
        let github = GithubClient::new(client.clone(), &config);

        let dir = tempfile::tempdir().unwrap();
        let err = latest_pack(
            &github,
            &HttpTransport::new(client),
            &config,
            dir.path(),
            false,
            &NullReporter,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LatestError::NoPackAsset { ref tag, .. } if tag == "v3"));
    }
}
