//! Asset downloads with bounded retry.
//!
//! Bytes are streamed to disk through an 8 KiB buffer. When the server sends
//! `Content-Length`, a short body counts as a failed attempt. Transport
//! failures are retried with a fixed delay; a missing asset is not.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::config::Config;
use crate::github::{GithubAsset, GithubError, GithubRelease};
use crate::reporter::{Phase, Reporter};

/// Write buffer size for streamed downloads.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// One failed attempt at fetching bytes.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Incomplete download: received {received} of {expected} bytes")]
    Incomplete { expected: u64, received: u64 },
}

impl TransportError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Incomplete { .. } => true,
            Self::Io(_) => false,
        }
    }
}

/// Errors surfaced to the component that asked for an asset.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("No asset matching '{pattern}' in release {tag} (available: {})", .available.join(", "))]
    AssetNotFound {
        pattern: String,
        tag: String,
        available: Vec<String>,
    },

    #[error("Download of {url} failed after {attempts} attempt(s): {source}")]
    Transport {
        url: String,
        attempts: u32,
        source: TransportError,
    },

    #[error(transparent)]
    Release(#[from] GithubError),
}

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first.
    pub retries: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Policy from the configured retry budget.
    pub fn from_config(config: &Config) -> Self {
        Self {
            retries: config.retries,
            delay: config.retry_delay(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Something that can put the bytes at a URL into a file.
#[async_trait]
pub trait AssetTransport: Send + Sync {
    /// Fetch `url` into `dest`, returning the number of bytes written.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, TransportError>;
}

/// Streaming HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Wrap a configured client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetTransport for HttpTransport {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, TransportError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let expected = response.content_length();
        let mut file = BufWriter::with_capacity(CHUNK_SIZE, File::create(dest).await?);
        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
        }
        file.flush().await?;

        if let Some(expected) = expected {
            if received < expected {
                return Err(TransportError::Incomplete { expected, received });
            }
        }
        Ok(received)
    }
}

/// Request for a download operation
pub struct DownloadRequest<'a, R: Reporter> {
    pub transport: &'a dyn AssetTransport,
    pub component_id: &'a str,
    pub url: &'a str,
    pub dest: &'a Path,
    pub reporter: &'a R,
    pub policy: RetryPolicy,
}

impl<'a, R: Reporter> DownloadRequest<'a, R> {
    pub fn new(
        transport: &'a dyn AssetTransport,
        component_id: &'a str,
        url: &'a str,
        dest: &'a Path,
        reporter: &'a R,
    ) -> Self {
        Self {
            transport,
            component_id,
            url,
            dest,
            reporter,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run the download, retrying retryable failures within the budget.
    ///
    /// A partially written file from a failed attempt is removed.
    pub async fn execute(self) -> Result<u64, DownloadError> {
        let max_attempts = self.policy.retries.saturating_add(1);

        for attempt in 1..=max_attempts {
            match self.transport.fetch(self.url, self.dest).await {
                Ok(bytes) => {
                    tracing::debug!("downloaded {} ({bytes} bytes)", self.url);
                    return Ok(bytes);
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(self.dest).await;

                    if !e.is_retryable() || attempt == max_attempts {
                        return Err(DownloadError::Transport {
                            url: self.url.to_string(),
                            attempts: attempt,
                            source: e,
                        });
                    }

                    tracing::warn!("attempt {attempt}/{max_attempts} for {} failed: {e}", self.url);
                    self.reporter.warning(
                        Some(self.component_id),
                        &format!("attempt {attempt}/{max_attempts} failed ({e}), retrying"),
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
            }
        }

        unreachable!("the final attempt always returns")
    }
}

/// Find the first asset of `release` whose name matches `pattern`,
/// ignoring case.
///
/// # Errors
///
/// Returns [`DownloadError::AssetNotFound`] naming the pattern, the release
/// tag and the assets that were there.
pub fn find_asset<'r>(
    release: &'r GithubRelease,
    pattern: &str,
) -> Result<&'r GithubAsset, DownloadError> {
    let options = glob::MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    let matcher = glob::Pattern::new(pattern).ok();

    release
        .assets
        .iter()
        .find(|asset| match &matcher {
            Some(p) => p.matches_with(&asset.name, options),
            None => asset.name.eq_ignore_ascii_case(pattern),
        })
        .ok_or_else(|| DownloadError::AssetNotFound {
            pattern: pattern.to_string(),
            tag: release.tag_name.clone(),
            available: release.assets.iter().map(|a| a.name.clone()).collect(),
        })
}

/// Report a finished download in human units.
pub(crate) fn report_size<R: Reporter>(reporter: &R, id: &str, name: &str, bytes: u64) {
    reporter.step(
        id,
        Phase::Download,
        &format!("{name} ({:.1} KiB)", bytes as f64 / 1024.0),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use mockito::Server;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails a fixed number of times before writing the payload.
    struct FlakyTransport {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyTransport {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl AssetTransport for FlakyTransport {
        async fn fetch(&self, _url: &str, dest: &Path) -> Result<u64, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(TransportError::Incomplete {
                    expected: 10,
                    received: 3,
                });
            }
            tokio::fs::write(dest, b"0123456789").await?;
            Ok(10)
        }
    }

    fn quick() -> RetryPolicy {
        RetryPolicy {
            retries: 2,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("asset.zip");
        let transport = FlakyTransport::new(2);

        let bytes = DownloadRequest::new(&transport, "a", "https://x/asset.zip", &dest, &NullReporter)
            .with_policy(quick())
            .execute()
            .await
            .unwrap();

        assert_eq!(bytes, 10);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert_eq!(std::fs::read(&dest).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn unbounded_retry_count_does_not_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("asset.zip");
        let transport = FlakyTransport::new(1);

        let bytes = DownloadRequest::new(&transport, "a", "https://x/asset.zip", &dest, &NullReporter)
            .with_policy(RetryPolicy {
                retries: u32::MAX,
                delay: Duration::from_millis(1),
            })
            .execute()
            .await
            .unwrap();

        assert_eq!(bytes, 10);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_budget_surfaces_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("asset.zip");
        let transport = FlakyTransport::new(u32::MAX);

        let err = DownloadRequest::new(&transport, "a", "https://x/asset.zip", &dest, &NullReporter)
            .with_policy(quick())
            .execute()
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Transport { attempts: 3, .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/missing.zip")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.zip");
        let transport = HttpTransport::new(Client::new());
        let url = format!("{}/missing.zip", server.url());

        let err = DownloadRequest::new(&transport, "a", &url, &dest, &NullReporter)
            .with_policy(quick())
            .execute()
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Transport { attempts: 1, .. }));
        assert!(err.to_string().contains("404"));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn http_transport_streams_body_to_disk() {
        let mut server = Server::new_async().await;
        let body = vec![7u8; 3 * CHUNK_SIZE + 17];
        let _m = server
            .mock("GET", "/dl/2.0.0/file.nro")
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.nro");
        let transport = HttpTransport::new(Client::new());
        let written = transport
            .fetch(&format!("{}/dl/2.0.0/file.nro", server.url()), &dest)
            .await
            .unwrap();

        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[test]
    fn asset_matching_ignores_case_and_reports_candidates() {
        let release: GithubRelease = serde_json::from_str(
            r#"{"tag_name": "v1.0.0", "assets": [
                {"name": "Tool-Switch.ZIP", "browser_download_url": "https://dl/tool.zip"},
                {"name": "tool.nro", "browser_download_url": "https://dl/tool.nro"}
            ]}"#,
        )
        .unwrap();

        let asset = find_asset(&release, "tool-*.zip").unwrap();
        assert_eq!(asset.browser_download_url, "https://dl/tool.zip");

        let err = find_asset(&release, "*.7z").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("*.7z") && msg.contains("v1.0.0") && msg.contains("tool.nro"));
    }
}
