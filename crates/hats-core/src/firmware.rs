//! Supported-firmware lookup.
//!
//! The firmware-defining component's release notes usually say which system
//! firmware they support ("Basic support was added for 19.0.0"). Releases
//! that say nothing inherit the value of the nearest older release that did.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::Config;
use crate::github::{GithubClient, GithubError, GithubRelease, strip_v};

/// Tried in order; the first that matches wins.
static FIRMWARE_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)(?:support|support was added|HOS)\s*.*?(?:for|up to)\s*(\d+\.\d+\.\d+)")
            .expect("firmware pattern 1 is valid"),
        Regex::new(r"(?i)(?:HOS|firmware)\s*(\d+\.\d+\.\d+)").expect("firmware pattern 2 is valid"),
        Regex::new(r"(?i)supports\s*up\s*to\s*(\d+\.\d+\.\d+)").expect("firmware pattern 3 is valid"),
    ]
});

/// Pull a firmware version out of free-text release notes.
pub fn firmware_from_notes(body: &str) -> Option<String> {
    FIRMWARE_PATTERNS.iter().find_map(|re| {
        re.captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// Firmware supported by the release tagged `tag`, inheriting from older
/// releases that mention it when this one does not.
///
/// Releases are ordered oldest first by publish time before inheritance is
/// applied. Returns `None` if `tag` is not among `releases` or nothing up to
/// it mentions firmware.
pub fn firmware_for_tag(releases: &[GithubRelease], tag: &str) -> Option<String> {
    let mut ordered: Vec<&GithubRelease> = releases.iter().filter(|r| !r.draft).collect();
    ordered.sort_by_key(|r| r.published_at);

    let wanted = strip_v(tag);
    let mut known: Option<String> = None;
    for release in ordered {
        if let Some(fw) = release.body.as_deref().and_then(firmware_from_notes) {
            known = Some(fw);
        }
        if strip_v(&release.tag_name) == wanted {
            return known;
        }
    }
    None
}

/// Scan the configured firmware repository's recent releases for `version`.
///
/// # Errors
///
/// Returns the GitHub error if the release list cannot be fetched.
pub async fn lookup_firmware(
    github: &GithubClient,
    config: &Config,
    version: &str,
) -> Result<Option<String>, GithubError> {
    let releases = github
        .list_releases(&config.firmware_repo, config.firmware_window)
        .await?;
    let found = firmware_for_tag(&releases, version);
    tracing::debug!(
        "scanned {} {} releases for {version}: {found:?}",
        releases.len(),
        config.firmware_repo
    );
    Ok(found)
}
