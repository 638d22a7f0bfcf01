//! GitHub release listing.
//!
//! Only the two calls the builder needs: list a repository's releases and
//! fetch one release by tag. Authentication is optional and only affects
//! rate limits.

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use thiserror::Error;

use crate::config::Config;

/// A release as returned by the GitHub REST API.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubRelease {
    /// Git tag of the release.
    pub tag_name: String,
    /// Release title.
    #[serde(default)]
    pub name: Option<String>,
    /// Free-text release notes.
    #[serde(default)]
    pub body: Option<String>,
    /// Unpublished draft.
    #[serde(default)]
    pub draft: bool,
    /// Marked as a pre-release.
    #[serde(default)]
    pub prerelease: bool,
    /// Publication time. Drafts have none.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Downloadable files attached to the release.
    #[serde(default)]
    pub assets: Vec<GithubAsset>,
}

/// A file attached to a release.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubAsset {
    /// File name.
    pub name: String,
    /// Public download URL.
    pub browser_download_url: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
}

/// Errors talking to the GitHub API.
#[derive(Error, Debug)]
pub enum GithubError {
    /// HTTP 403/429 from the API.
    #[error("GitHub API rate limit hit for {repo} (HTTP {status}); set GITHUB_TOKEN to raise the limit")]
    RateLimited {
        /// Repository being queried.
        repo: String,
        /// Upstream status code.
        status: u16,
    },

    /// Any other non-success status.
    #[error("GitHub API returned HTTP {status} for {url}")]
    Status {
        /// Upstream status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Transport-level failure (DNS, TLS, timeout, malformed body).
    #[error("Request to {url} failed: {source}")]
    Request {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        source: reqwest::Error,
    },

    /// The repository has no published releases.
    #[error("No releases found for {repo}")]
    NoReleases {
        /// Repository being queried.
        repo: String,
    },

    /// The tag is not among the repository's releases.
    #[error("Release '{tag}' not found in {repo} (recent tags: {})", .nearby.join(", "))]
    TagNotFound {
        /// Repository being queried.
        repo: String,
        /// Requested tag.
        tag: String,
        /// Tags that were found, to help spot typos.
        nearby: Vec<String>,
    },
}

/// Build the shared HTTP client: user agent, connect timeout, read timeout.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_http_client(config: &Config) -> reqwest::Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_static(crate::USER_AGENT),
    );

    Client::builder()
        .default_headers(headers)
        .connect_timeout(config.connect_timeout())
        .read_timeout(config.request_timeout())
        .build()
}

/// Thin GitHub REST client.
#[derive(Debug, Clone)]
pub struct GithubClient {
    client: Client,
    api_url: String,
    token: Option<String>,
    timeout: std::time::Duration,
}

impl GithubClient {
    /// Create a client for the API configured in `config`.
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.github_token.clone(),
            timeout: config.request_timeout(),
        }
    }

    /// The underlying HTTP client, shared with asset downloads.
    pub fn http(&self) -> &Client {
        &self.client
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        repo: &str,
        url: &str,
    ) -> Result<Option<T>, GithubError> {
        let mut req = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .timeout(self.timeout);
        if let Some(token) = &self.token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request_error = |source| GithubError::Request {
            url: url.to_string(),
            source,
        };
        let resp = req.send().await.map_err(request_error)?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                Err(GithubError::RateLimited {
                    repo: repo.to_string(),
                    status: resp.status().as_u16(),
                })
            }
            status if !status.is_success() => Err(GithubError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }),
            _ => resp.json().await.map(Some).map_err(request_error),
        }
    }

    /// List the most recent releases of `repo` (`owner/name`).
    ///
    /// # Errors
    ///
    /// Returns [`GithubError::RateLimited`] on 403/429 and
    /// [`GithubError::Status`] for other failures, including 404.
    pub async fn list_releases(
        &self,
        repo: &str,
        per_page: u32,
    ) -> Result<Vec<GithubRelease>, GithubError> {
        let url = format!("{}/repos/{repo}/releases?per_page={per_page}", self.api_url);
        self.get_json(repo, &url)
            .await?
            .ok_or_else(|| GithubError::Status {
                status: StatusCode::NOT_FOUND.as_u16(),
                url,
            })
    }

    /// The newest published release of `repo`.
    ///
    /// List order is not trusted: drafts are skipped and the release with the
    /// latest publish time wins.
    ///
    /// # Errors
    ///
    /// Returns [`GithubError::NoReleases`] when nothing is published.
    pub async fn latest_release(
        &self,
        repo: &str,
        per_page: u32,
    ) -> Result<GithubRelease, GithubError> {
        let releases = self.list_releases(repo, per_page).await?;
        newest_published(releases).ok_or_else(|| GithubError::NoReleases {
            repo: repo.to_string(),
        })
    }

    /// The release tagged `tag`.
    ///
    /// Uses the get-by-tag endpoint, falling back to scanning a page of the
    /// release list (tags compared with any leading `v` ignored).
    ///
    /// # Errors
    ///
    /// Returns [`GithubError::TagNotFound`] with the tags that were seen.
    pub async fn release_by_tag(
        &self,
        repo: &str,
        tag: &str,
        per_page: u32,
    ) -> Result<GithubRelease, GithubError> {
        let url = format!("{}/repos/{repo}/releases/tags/{tag}", self.api_url);
        if let Some(release) = self.get_json::<GithubRelease>(repo, &url).await? {
            return Ok(release);
        }

        tracing::debug!("tag endpoint missed {repo}@{tag}, scanning release list");
        let releases = self.list_releases(repo, per_page).await?;
        let wanted = strip_v(tag);
        let nearby = releases.iter().map(|r| r.tag_name.clone()).collect();
        releases
            .into_iter()
            .find(|r| strip_v(&r.tag_name) == wanted)
            .ok_or_else(|| GithubError::TagNotFound {
                repo: repo.to_string(),
                tag: tag.to_string(),
                nearby,
            })
    }
}

/// Strip one leading `v`/`V` from a tag.
pub fn strip_v(tag: &str) -> &str {
    tag.strip_prefix(['v', 'V']).unwrap_or(tag)
}

/// Pick the non-draft release with the latest publish time. Ties and missing
/// timestamps keep list order.
pub fn newest_published(releases: Vec<GithubRelease>) -> Option<GithubRelease> {
    releases
        .into_iter()
        .filter(|r| !r.draft)
        .reduce(|best, candidate| {
            if candidate.published_at > best.published_at {
                candidate
            } else {
                best
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client_for(url: &str, token: Option<&str>) -> GithubClient {
        let config = Config {
            api_url: url.to_string(),
            github_token: token.map(str::to_string),
            ..Config::default()
        };
        GithubClient::new(build_http_client(&config).unwrap(), &config)
    }

    const UNORDERED: &str = r#"[
        {"tag_name": "v1.1.0", "published_at": "2024-03-01T00:00:00Z", "assets": []},
        {"tag_name": "v1.3.0-draft", "draft": true, "published_at": null, "assets": []},
        {"tag_name": "v1.2.0", "published_at": "2024-05-01T00:00:00Z",
         "assets": [{"name": "pkg-1.2.0.zip", "browser_download_url": "https://dl/pkg-1.2.0.zip", "size": 10}]}
    ]"#;

    #[tokio::test]
    async fn latest_release_uses_publish_time_not_list_order() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/x/y/releases")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(UNORDERED)
            .create_async()
            .await;

        let gh = client_for(&server.url(), None);
        let latest = gh.latest_release("x/y", 5).await.unwrap();
        assert_eq!(latest.tag_name, "v1.2.0");
        assert_eq!(latest.assets[0].size, 10);
    }

    #[tokio::test]
    async fn forbidden_is_reported_as_rate_limit() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/x/y/releases")
            .match_query(Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let gh = client_for(&server.url(), None);
        let err = gh.latest_release("x/y", 5).await.unwrap_err();
        assert!(matches!(err, GithubError::RateLimited { status: 403, .. }));
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }

    #[tokio::test]
    async fn token_is_sent_as_bearer() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/repos/x/y/releases")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer s3cret")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let gh = client_for(&server.url(), Some("s3cret"));
        let err = gh.latest_release("x/y", 5).await.unwrap_err();
        assert!(matches!(err, GithubError::NoReleases { .. }));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn release_by_tag_falls_back_to_list_scan() {
        let mut server = Server::new_async().await;
        let _tag = server
            .mock(
                "GET",
                Matcher::Regex(r"^/repos/x/y/releases/tags/.+$".to_string()),
            )
            .with_status(404)
            .create_async()
            .await;
        let _list = server
            .mock("GET", "/repos/x/y/releases")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(UNORDERED)
            .create_async()
            .await;

        let gh = client_for(&server.url(), None);
        let release = gh.release_by_tag("x/y", "1.1.0", 5).await.unwrap();
        assert_eq!(release.tag_name, "v1.1.0");

        let err = gh.release_by_tag("x/y", "9.9.9", 5).await.unwrap_err();
        match err {
            GithubError::TagNotFound { nearby, .. } => {
                assert!(nearby.contains(&"v1.2.0".to_string()));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn newest_published_ignores_drafts() {
        let releases: Vec<GithubRelease> = serde_json::from_str(UNORDERED).unwrap();
        assert_eq!(newest_published(releases).unwrap().tag_name, "v1.2.0");
        assert!(newest_published(Vec::new()).is_none());
    }
}
