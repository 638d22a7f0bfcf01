//! Install target reconciliation.
//!
//! An install target (an SD card root) carries two manifests: `manifest.json`
//! for installed components and `trash.json` for trashed ones, both keyed by
//! component id. Trashing deletes a component's files and moves its entry to
//! the trash; restoring only moves the entry back, and the files come back
//! with the next install. Every operation persists both manifests so an id is
//! never left in both.

use std::path::{Component, Path, PathBuf};

use hats_schema::{DeviceManifest, ManifestEntry};
use thiserror::Error;

use crate::io::archive::{self, ArchiveError};
use crate::io::json;
use crate::paths::{DEVICE_MANIFEST, DEVICE_TRASH};
use crate::reporter::{Phase, Reporter};

/// Directories a fresh install clears before unpacking.
pub const MUTABLE_DIRS: &[&str] = &["atmosphere", "sept"];

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("Pack {} not found", .0.display())]
    PackNotFound(PathBuf),

    #[error(transparent)]
    State(#[from] anyhow::Error),

    #[error("Failed to clear {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Install task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// What a trash or restore pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Ids whose entries moved.
    pub moved: Vec<String>,
    /// Ids left alone, with the reason.
    pub skipped: Vec<(String, String)>,
    /// Files deleted from the target.
    pub removed_files: usize,
    /// Files that could not be deleted, with the error.
    pub file_errors: Vec<(String, String)>,
}

/// Both manifests of a target, as read at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    pub installed: DeviceManifest,
    pub trash: DeviceManifest,
}

/// An install target root.
#[derive(Debug, Clone)]
pub struct DeviceStore {
    root: PathBuf,
}

impl DeviceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn installed_path(&self) -> PathBuf {
        self.root.join(DEVICE_MANIFEST)
    }

    pub fn trash_path(&self) -> PathBuf {
        self.root.join(DEVICE_TRASH)
    }

    fn ensure_root(&self) -> Result<(), ReconcileError> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(ReconcileError::NotADirectory(self.root.clone()))
        }
    }

    /// Read both manifests. Missing files read as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is missing or a manifest is malformed.
    pub async fn load(&self) -> Result<DeviceState, ReconcileError> {
        self.ensure_root()?;
        Ok(DeviceState {
            installed: json::read_json(&self.installed_path())
                .await?
                .unwrap_or_default(),
            trash: json::read_json(&self.trash_path()).await?.unwrap_or_default(),
        })
    }

    /// Write both manifests.
    ///
    /// # Errors
    ///
    /// Returns an error if either write fails.
    pub async fn save(&self, state: &DeviceState) -> Result<(), ReconcileError> {
        json::write_json_atomic(&self.trash_path(), &state.trash).await?;
        json::write_json_atomic(&self.installed_path(), &state.installed).await?;
        Ok(())
    }

    /// Delete the files of each installed id and move its entry to the trash.
    ///
    /// File deletion is best-effort: failures are reported and the entry
    /// still moves.
    ///
    /// # Errors
    ///
    /// Returns an error only if the manifests cannot be read or written.
    pub async fn move_to_trash<R: Reporter>(
        &self,
        ids: &[String],
        reporter: &R,
    ) -> Result<ReconcileReport, ReconcileError> {
        let mut state = self.load().await?;
        let mut report = ReconcileReport::default();

        for id in ids {
            let Some(entry) = state.installed.components.remove(id) else {
                let reason = if state.trash.components.contains_key(id) {
                    "already in trash"
                } else {
                    "not installed"
                };
                reporter.warning(Some(id), reason);
                report.skipped.push((id.clone(), reason.to_string()));
                continue;
            };

            self.delete_files(id, &entry, &mut report, reporter).await;
            reporter.step(
                id,
                Phase::Reconcile,
                &format!("moved {} {} to trash", entry.name, entry.version),
            );
            state.trash.components.insert(id.clone(), entry);
            report.moved.push(id.clone());
        }

        self.save(&state).await?;
        Ok(report)
    }

    /// Move each trashed id's entry back to the installed manifest.
    ///
    /// No files are recreated; the next install brings them back.
    ///
    /// # Errors
    ///
    /// Returns an error only if the manifests cannot be read or written.
    pub async fn restore<R: Reporter>(
        &self,
        ids: &[String],
        reporter: &R,
    ) -> Result<ReconcileReport, ReconcileError> {
        let mut state = self.load().await?;
        let mut report = ReconcileReport::default();

        for id in ids {
            let Some(entry) = state.trash.components.remove(id) else {
                reporter.warning(Some(id), "not in trash");
                report.skipped.push((id.clone(), "not in trash".to_string()));
                continue;
            };
            reporter.step(
                id,
                Phase::Reconcile,
                &format!(
                    "restored {} {}; reinstall the pack to bring its files back",
                    entry.name, entry.version
                ),
            );
            state.installed.components.insert(id.clone(), entry);
            report.moved.push(id.clone());
        }

        self.save(&state).await?;
        Ok(report)
    }

    /// Wipe the target's mutable state and unpack `pack` over it.
    ///
    /// Clears [`MUTABLE_DIRS`], old `{prefix}-*.txt` summaries and both
    /// manifests, then extracts the pack, which brings its own
    /// `manifest.json`. Returns the number of files extracted.
    ///
    /// # Errors
    ///
    /// Returns an error if clearing or extraction fails.
    pub async fn fresh_install<R: Reporter>(
        &self,
        pack: &Path,
        summary_prefix: &str,
        reporter: &R,
    ) -> Result<usize, ReconcileError> {
        self.ensure_root()?;
        if !pack.is_file() {
            return Err(ReconcileError::PackNotFound(pack.to_path_buf()));
        }

        for dir in MUTABLE_DIRS {
            let path = self.root.join(dir);
            if path.exists() {
                tokio::fs::remove_dir_all(&path)
                    .await
                    .map_err(|source| ReconcileError::Io {
                        path: path.clone(),
                        source,
                    })?;
                reporter.step(dir, Phase::Reconcile, "cleared");
            }
        }

        let summary_glob = format!("{summary_prefix}-*.txt");
        let mut stale = vec![self.installed_path(), self.trash_path()];
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|source| ReconcileError::Io {
                path: self.root.clone(),
                source,
            })?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if glob::Pattern::new(&summary_glob).is_ok_and(|p| p.matches(&name)) {
                stale.push(entry.path());
            }
        }
        for path in stale {
            if path.exists() {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|source| ReconcileError::Io {
                        path: path.clone(),
                        source,
                    })?;
            }
        }

        let pack = pack.to_path_buf();
        let root = self.root.clone();
        let files = tokio::task::spawn_blocking(move || archive::extract(&pack, &root, None))
            .await??;
        reporter.info(&format!("extracted {} files to {}", files.len(), self.root.display()));
        Ok(files.len())
    }

    async fn delete_files<R: Reporter>(
        &self,
        id: &str,
        entry: &ManifestEntry,
        report: &mut ReconcileReport,
        reporter: &R,
    ) {
        for file in &entry.files {
            let Some(path) = self.resolve(file) else {
                let reason = "path escapes the target root".to_string();
                reporter.warning(Some(id), &format!("skipping {file}: {reason}"));
                report.file_errors.push((file.clone(), reason));
                continue;
            };

            match tokio::fs::remove_file(&path).await {
                Ok(()) => report.removed_files += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!("{file} already gone");
                }
                Err(e) => {
                    reporter.warning(Some(id), &format!("could not delete {file}: {e}"));
                    report.file_errors.push((file.clone(), e.to_string()));
                }
            }
        }
    }

    /// Map a manifest path onto the target, refusing anything that would
    /// leave the root.
    fn resolve(&self, manifest_path: &str) -> Option<PathBuf> {
        let rel = Path::new(manifest_path);
        rel.components()
            .all(|c| matches!(c, Component::Normal(_)))
            .then(|| self.root.join(rel))
    }
}
