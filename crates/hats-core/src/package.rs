//! Pack assembly.
//!
//! The staging tree starts from the skeleton archive, receives every
//! component's files, then gets `manifest.json` and the summary text before
//! it is zipped to `{prefix}-{ddmmyyyy}-{hash}.zip`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hats_schema::{BuildManifest, ContentHash};
use thiserror::Error;

use crate::io::archive::{self, ArchiveError};
use crate::paths::DEVICE_MANIFEST;
use crate::reporter::Reporter;

/// Errors while writing the pack.
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Failed to serialize manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// `{prefix}-{ddmmyyyy}-{hash}`, the pack file name without extension.
pub fn pack_base_name(prefix: &str, date: DateTime<Utc>, hash: &ContentHash) -> String {
    format!("{prefix}-{}-{hash}", date.format("%d%m%Y"))
}

/// Extract the skeleton archive into `staging`. A missing skeleton only
/// warns. Returns the number of files extracted.
///
/// # Errors
///
/// Returns an error if the skeleton exists but cannot be extracted.
pub async fn merge_skeleton<R: Reporter>(
    skeleton: &Path,
    staging: &Path,
    reporter: &R,
) -> Result<usize, PackageError> {
    if !skeleton.exists() {
        reporter.warning(
            None,
            &format!("{} not found, pack may be incomplete", skeleton.display()),
        );
        return Ok(0);
    }

    let skeleton = skeleton.to_path_buf();
    let staging = staging.to_path_buf();
    let files = tokio::task::spawn_blocking(move || archive::extract(&skeleton, &staging, None))
        .await??;
    reporter.info(&format!("skeleton extracted ({} files)", files.len()));
    Ok(files.len())
}

/// Write the metadata files into `staging` and zip it into `output_dir`.
///
/// The archive is written under a temporary name and renamed into place, so
/// a failed build never leaves a pack behind. Returns the pack path.
///
/// # Errors
///
/// Returns an error if any file cannot be written.
pub async fn write_pack(
    staging: &Path,
    output_dir: &Path,
    manifest: &BuildManifest,
    summary: &str,
    base_name: &str,
) -> Result<PathBuf, PackageError> {
    let manifest_json = serde_json::to_string_pretty(manifest)?;
    tokio::fs::write(staging.join(DEVICE_MANIFEST), manifest_json).await?;
    tokio::fs::write(staging.join(format!("{base_name}.txt")), summary).await?;

    tokio::fs::create_dir_all(output_dir).await?;
    let pack_path = output_dir.join(format!("{base_name}.zip"));
    let partial = output_dir.join(format!("{base_name}.zip.part"));

    let src = staging.to_path_buf();
    let dest = partial.clone();
    let written = tokio::task::spawn_blocking(move || archive::write_dir_zip(&src, &dest)).await;
    match written {
        Ok(Ok(count)) => tracing::debug!("zipped {count} files into {}", partial.display()),
        Ok(Err(e)) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
    }

    tokio::fs::rename(&partial, &pack_path).await?;
    Ok(pack_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use crate::io::archive::tests::make_zip;

    #[test]
    fn base_name_uses_day_month_year() {
        let date = DateTime::parse_from_rfc3339("2025-03-09T23:59:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let hash = ContentHash::from_digest_hex("1a2b3c4d5e");
        assert_eq!(pack_base_name("HATS", date, &hash), "HATS-09032025-1a2b3c4");
    }

    #[tokio::test]
    async fn pack_contains_skeleton_staged_files_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let skeleton = dir.path().join("skeleton.zip");
        make_zip(&skeleton, &[("bootloader/", ""), ("bootloader/hekate_ipl.ini", "[config]")]);

        let merged = merge_skeleton(&skeleton, &staging, &NullReporter).await.unwrap();
        assert_eq!(merged, 1);
        std::fs::create_dir_all(staging.join("switch")).unwrap();
        std::fs::write(staging.join("switch/app.nro"), b"nro").unwrap();

        let manifest = BuildManifest {
            pack_name: "HATS-01012025-abcdef0.zip".into(),
            ..BuildManifest::default()
        };
        let out = dir.path().join("out");
        let pack = write_pack(&staging, &out, &manifest, "summary", "HATS-01012025-abcdef0")
            .await
            .unwrap();

        assert_eq!(pack, out.join("HATS-01012025-abcdef0.zip"));
        assert!(!out.join("HATS-01012025-abcdef0.zip.part").exists());
        let names = archive::entry_names(&pack).unwrap();
        for expected in [
            "bootloader/hekate_ipl.ini",
            "switch/app.nro",
            "manifest.json",
            "HATS-01012025-abcdef0.txt",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn missing_skeleton_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let merged = merge_skeleton(&dir.path().join("nope.zip"), dir.path(), &NullReporter)
            .await
            .unwrap();
        assert_eq!(merged, 0);
    }
}
