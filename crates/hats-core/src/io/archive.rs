//! Zip archive helpers.
//!
//! Everything here is blocking; async callers go through `spawn_blocking`.
//! Entry paths are checked with `enclosed_name`, so a hostile archive cannot
//! write outside the destination.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::NaiveDate;
use thiserror::Error;
use walkdir::WalkDir;
use zip::ZipArchive;
use zip::write::SimpleFileOptions;

use crate::paths::manifest_path;

/// Errors reading or writing archives.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to read archive {}: {source}", .path.display())]
    Zip {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error("Failed to write archive: {0}")]
    Write(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn open(archive_path: &Path) -> Result<ZipArchive<File>, ArchiveError> {
    let file = File::open(archive_path)?;
    ZipArchive::new(file).map_err(|source| ArchiveError::Zip {
        path: archive_path.to_path_buf(),
        source,
    })
}

/// Raw entry names, in archive order.
pub fn entry_names(archive_path: &Path) -> Result<Vec<String>, ArchiveError> {
    let archive = open(archive_path)?;
    Ok(archive.file_names().map(str::to_string).collect())
}

/// Distinct first path segments of entries that live inside a directory.
///
/// Loose files at the archive root do not count.
pub fn top_level_dirs<S: AsRef<str>>(names: &[S]) -> BTreeSet<String> {
    names
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| name.contains('/'))
        .filter_map(|name| name.split('/').next())
        .filter(|first| !first.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extract `archive_path` under `dest_dir`.
///
/// With `strip_prefix`, only entries below that directory are extracted and
/// the prefix is removed from their paths; the directory marker itself is
/// skipped. Returns the `/`-separated paths of extracted files relative to
/// `dest_dir`. Extracted files keep the modification time recorded in the
/// archive when there is one.
pub fn extract(
    archive_path: &Path,
    dest_dir: &Path,
    strip_prefix: Option<&str>,
) -> Result<Vec<String>, ArchiveError> {
    let mut archive = open(archive_path)?;
    fs::create_dir_all(dest_dir)?;
    let mut written = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|source| ArchiveError::Zip {
            path: archive_path.to_path_buf(),
            source,
        })?;
        let Some(enclosed) = entry.enclosed_name() else {
            tracing::warn!("skipping unsafe entry {}", entry.name());
            continue;
        };

        let relative = match strip_prefix {
            Some(prefix) => match enclosed.strip_prefix(prefix.trim_matches('/')) {
                Ok(rest) => rest.to_path_buf(),
                Err(_) => continue,
            },
            None => enclosed,
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let absolute = dest_dir.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&absolute)?;
            continue;
        }
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = File::create(&absolute)?;
        io::copy(&mut entry, &mut out)?;
        if let Some(mtime) = entry.last_modified().and_then(to_system_time) {
            let _ = out.set_modified(mtime);
        }

        if let Some(rel) = manifest_path(dest_dir, &absolute) {
            written.push(rel);
        }
    }

    Ok(written)
}

fn to_system_time(dt: zip::DateTime) -> Option<SystemTime> {
    let naive = NaiveDate::from_ymd_opt(
        i32::from(dt.year()),
        u32::from(dt.month()),
        u32::from(dt.day()),
    )?
    .and_hms_opt(
        u32::from(dt.hour()),
        u32::from(dt.minute()),
        u32::from(dt.second()),
    )?;
    Some(SystemTime::from(naive.and_utc()))
}

/// Zip the contents of `src_dir` into a new archive at `dest`.
///
/// Entries are added in sorted order with `/` separators and Deflate
/// compression. Returns the number of files written.
pub fn write_dir_zip(src_dir: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let file = File::create(dest)?;
    let mut zip = zip::ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut count = 0;

    for entry in WalkDir::new(src_dir).sort_by_file_name().min_depth(1) {
        let entry = entry.map_err(io::Error::other)?;
        let Some(name) = manifest_path(src_dir, entry.path()) else {
            continue;
        };

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else {
            zip.start_file(name, options)?;
            let mut src = File::open(entry.path())?;
            io::copy(&mut src, &mut zip)?;
            count += 1;
        }
    }

    zip.finish()?;
    Ok(count)
}
