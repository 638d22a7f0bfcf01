//! Processing-step interpreter.
//!
//! Runs an asset's [`Step`]s, in order, against the shared staging root and
//! collects every file written. Paths in the result are relative to the
//! staging root with `/` separators, ready for the manifest.
//!
//! A step missing a required parameter aborts the asset. An action this
//! build does not know is only a warning, as are find/delete steps that
//! match nothing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use glob::{MatchOptions, Pattern};
use hats_schema::{MissingParameter, Step};
use thiserror::Error;
use walkdir::WalkDir;

use crate::io::archive::{self, ArchiveError};
use crate::paths::manifest_path;
use crate::reporter::{Phase, Reporter};

/// A step that could not run.
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    MissingParameter(#[from] MissingParameter),

    #[error("'unzip_subfolder_to_root' failed: no subfolder found in {archive}")]
    NoSubfolder { archive: String },

    #[error("'unzip_subfolder_to_root' failed: no files below '{subfolder}' in {archive}")]
    SubfolderNotFound { subfolder: String, archive: String },

    #[error("'unzip_subfolder_to_root' failed: ambiguous archive with multiple root folders: {}", .candidates.join(", "))]
    AmbiguousSubfolder { candidates: Vec<String> },

    #[error("'{action}': invalid pattern '{pattern}': {source}")]
    Pattern {
        action: String,
        pattern: String,
        source: glob::PatternError,
    },

    #[error("'{action}' failed: {source}")]
    Archive {
        action: String,
        source: ArchiveError,
    },

    #[error("'{action}' failed on {}: {source}", .path.display())]
    Io {
        action: String,
        path: PathBuf,
        source: io::Error,
    },
}

/// Run `steps` for one downloaded asset.
///
/// An empty step list behaves as a single `unzip_to_root`.
///
/// # Errors
///
/// Returns the first fatal [`StepError`]; later steps do not run.
pub fn apply_steps<R: Reporter>(
    steps: &[Step],
    asset: &Path,
    staging: &Path,
    component_id: &str,
    reporter: &R,
) -> Result<Vec<String>, StepError> {
    let defaults;
    let steps = if steps.is_empty() {
        defaults = Step::default_steps();
        &defaults
    } else {
        steps
    };

    let mut run = StepRun {
        asset,
        staging,
        component_id,
        reporter,
        written: Vec::new(),
    };
    for step in steps {
        reporter.step(
            component_id,
            Phase::Process,
            &format!("executing step: {}", step.action()),
        );
        run.execute(step)?;
    }
    Ok(run.written)
}

struct StepRun<'a, R: Reporter> {
    asset: &'a Path,
    staging: &'a Path,
    component_id: &'a str,
    reporter: &'a R,
    written: Vec<String>,
}

impl<R: Reporter> StepRun<'_, R> {
    fn execute(&mut self, step: &Step) -> Result<(), StepError> {
        step.validate()?;
        let action = step.action();

        match step {
            Step::UnzipToRoot => {
                let files = self.extract(action, self.staging, None)?;
                self.record_all(files);
            }
            Step::UnzipToPath { target_dir } => {
                let target = target_dir.trim_matches('/');
                let files = self.extract(action, &self.staging.join(target), None)?;
                self.record_all(files.into_iter().map(|f| format!("{target}/{f}")));
            }
            Step::UnzipSubfolderToRoot { subfolder } => {
                let explicit = subfolder
                    .as_deref()
                    .map(|s| s.trim_matches('/'))
                    .filter(|s| !s.is_empty());
                let prefix = match explicit {
                    Some(explicit) => explicit.to_string(),
                    None => self.detect_subfolder(action)?,
                };
                let files = self.extract(action, self.staging, Some(&prefix))?;
                if files.is_empty() && explicit.is_some() {
                    return Err(StepError::SubfolderNotFound {
                        subfolder: prefix,
                        archive: self.asset_name(),
                    });
                }
                self.record_all(files);
            }
            Step::CopyFile { target_dir } => {
                let name = self.asset.file_name().unwrap_or_default();
                let dest = self.target_dir(action, target_dir)?.join(name);
                fs::copy(self.asset, &dest).map_err(|e| io_error(action, &dest, e))?;
                self.report(&format!("copied to {}", self.display(&dest)));
                self.record(&dest);
            }
            Step::FindAndCopy {
                source_glob,
                target_dir,
            } => self.find_and_copy(action, source_glob, target_dir)?,
            Step::FindAndRename {
                source_glob,
                target_dir,
                target_filename,
            } => self.find_and_rename(action, source_glob, target_dir, target_filename)?,
            Step::DeleteFile { glob } => self.delete(action, glob)?,
            Step::Unknown { action } => {
                self.reporter
                    .warning(Some(self.component_id), &format!("unimplemented action: {action}"));
            }
        }
        Ok(())
    }

    fn detect_subfolder(&self, action: &str) -> Result<String, StepError> {
        let names = archive::entry_names(self.asset).map_err(|source| StepError::Archive {
            action: action.to_string(),
            source,
        })?;
        let dirs = archive::top_level_dirs(&names);
        match dirs.len() {
            0 => Err(StepError::NoSubfolder {
                archive: self.asset_name(),
            }),
            1 => {
                let found = dirs.into_iter().next().unwrap_or_default();
                self.report(&format!("found single source folder '{found}'"));
                Ok(found)
            }
            _ => Err(StepError::AmbiguousSubfolder {
                candidates: dirs.into_iter().collect(),
            }),
        }
    }

    fn find_and_copy(&mut self, action: &str, glob: &str, target_dir: &str) -> Result<(), StepError> {
        let scratch = scratch_dir(action, self.asset)?;
        self.extract(action, scratch.path(), None)?;
        let matches = find_matches(action, scratch.path(), glob)?;
        if matches.is_empty() {
            self.reporter.warning(
                Some(self.component_id),
                &format!("no file matching '{glob}' in the archive"),
            );
            return Ok(());
        }

        let dest_dir = self.target_dir(action, target_dir)?;
        for source in newest_per_name(matches) {
            let Some(name) = source.file_name() else {
                continue;
            };
            let dest = dest_dir.join(name);
            if source.is_dir() {
                copy_tree(action, &source, &dest_dir)?;
                self.record_tree(&dest);
            } else {
                fs::copy(&source, &dest).map_err(|e| io_error(action, &dest, e))?;
                self.record(&dest);
            }
            self.report(&format!(
                "found and copied '{}' to '{}'",
                name.to_string_lossy(),
                self.display(&dest)
            ));
        }
        Ok(())
    }

    /// Searches the archive first, then the staging tree, so a rename can
    /// also target a file an earlier step already placed.
    fn find_and_rename(
        &mut self,
        action: &str,
        glob: &str,
        target_dir: &str,
        target_filename: &str,
    ) -> Result<(), StepError> {
        let scratch = scratch_dir(action, self.asset)?;
        // Assets that are not archives can only be renamed from staging.
        let in_archive = match archive::extract(self.asset, scratch.path(), None) {
            Ok(_) => find_matches(action, scratch.path(), glob)?.into_iter().next(),
            Err(e) => {
                tracing::debug!("{}: not searching archive: {e}", self.asset_name());
                None
            }
        };
        let in_staging = match &in_archive {
            Some(_) => None,
            None => find_matches(action, self.staging, glob)?.into_iter().next(),
        };

        let dest = self.target_dir(action, target_dir)?.join(target_filename);
        let from = match (in_archive, in_staging) {
            (Some(source), _) => {
                if source.is_dir() {
                    copy_tree_as(action, &source, &dest)?;
                } else {
                    fs::copy(&source, &dest).map_err(|e| io_error(action, &dest, e))?;
                }
                source
            }
            (None, Some(source)) => {
                fs::rename(&source, &dest).map_err(|e| io_error(action, &dest, e))?;
                if let Some(old) = manifest_path(self.staging, &source) {
                    self.forget(&old);
                }
                source
            }
            (None, None) => {
                self.reporter.warning(
                    Some(self.component_id),
                    &format!("could not find file matching '{glob}' to rename"),
                );
                return Ok(());
            }
        };

        self.record_tree(&dest);
        self.report(&format!(
            "renamed '{}' to '{}'",
            from.file_name().unwrap_or_default().to_string_lossy(),
            self.display(&dest)
        ));
        Ok(())
    }

    fn delete(&mut self, action: &str, glob: &str) -> Result<(), StepError> {
        let matches = find_matches(action, self.staging, glob)?;
        if matches.is_empty() {
            self.reporter.warning(
                Some(self.component_id),
                &format!("could not find '{glob}' to delete"),
            );
            return Ok(());
        }

        for path in matches {
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            let shown = self.display(&path);
            match result {
                Ok(()) => {
                    self.forget(&shown);
                    self.report(&format!("deleted {shown}"));
                }
                Err(e) => self
                    .reporter
                    .warning(Some(self.component_id), &format!("error deleting {shown}: {e}")),
            }
        }
        Ok(())
    }

    fn extract(
        &self,
        action: &str,
        dest: &Path,
        strip_prefix: Option<&str>,
    ) -> Result<Vec<String>, StepError> {
        archive::extract(self.asset, dest, strip_prefix).map_err(|source| StepError::Archive {
            action: action.to_string(),
            source,
        })
    }

    fn target_dir(&self, action: &str, target_dir: &str) -> Result<PathBuf, StepError> {
        let dir = self.staging.join(target_dir.trim_matches('/'));
        fs::create_dir_all(&dir).map_err(|e| io_error(action, &dir, e))?;
        Ok(dir)
    }

    fn record(&mut self, path: &Path) {
        if let Some(rel) = manifest_path(self.staging, path) {
            self.push(rel);
        }
    }

    fn record_all(&mut self, files: impl IntoIterator<Item = String>) {
        for file in files {
            self.push(file);
        }
    }

    fn record_tree(&mut self, path: &Path) {
        if path.is_file() {
            self.record(path);
            return;
        }
        for entry in WalkDir::new(path).sort_by_file_name().into_iter().flatten() {
            if entry.file_type().is_file() {
                self.record(entry.path());
            }
        }
    }

    fn push(&mut self, rel: String) {
        if !self.written.contains(&rel) {
            self.written.push(rel);
        }
    }

    /// Drop `rel` and anything below it from the written list.
    fn forget(&mut self, rel: &str) {
        let below = format!("{rel}/");
        self.written
            .retain(|f| f != rel && !f.starts_with(&below));
    }

    fn report(&self, msg: &str) {
        self.reporter.step(self.component_id, Phase::Process, msg);
    }

    fn display(&self, path: &Path) -> String {
        manifest_path(self.staging, path).unwrap_or_else(|| path.display().to_string())
    }

    fn asset_name(&self) -> String {
        self.asset
            .file_name()
            .map_or_else(|| self.asset.display().to_string(), |n| n.to_string_lossy().into_owned())
    }
}

fn io_error(action: &str, path: &Path, source: io::Error) -> StepError {
    StepError::Io {
        action: action.to_string(),
        path: path.to_path_buf(),
        source,
    }
}

fn scratch_dir(action: &str, asset: &Path) -> Result<tempfile::TempDir, StepError> {
    let parent = asset.parent().unwrap_or_else(|| Path::new("."));
    tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(parent)
        .map_err(|e| io_error(action, parent, e))
}

/// Everything under `root` whose relative path matches `pattern` at any
/// depth. A matched directory is returned once, without its contents.
fn find_matches(action: &str, root: &Path, pattern: &str) -> Result<Vec<PathBuf>, StepError> {
    let pattern = pattern.trim_start_matches('/');
    let invalid = |source| StepError::Pattern {
        action: action.to_string(),
        pattern: pattern.to_string(),
        source,
    };
    let anywhere = Pattern::new(&format!("**/{pattern}")).map_err(invalid)?;
    let rooted = Pattern::new(pattern).map_err(invalid)?;
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let mut matches = Vec::new();
    let mut walk = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();
    while let Some(entry) = walk.next() {
        let Ok(entry) = entry else {
            continue;
        };
        let Some(rel) = manifest_path(root, entry.path()) else {
            continue;
        };
        if rooted.matches_with(&rel, options) || anywhere.matches_with(&rel, options) {
            matches.push(entry.path().to_path_buf());
            if entry.file_type().is_dir() {
                walk.skip_current_dir();
            }
        }
    }
    Ok(matches)
}

/// Collapse matches sharing a file name to the most recently modified one.
/// Ties keep the earlier match. Order of first appearance is preserved.
fn newest_per_name(matches: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut kept: Vec<(PathBuf, Option<SystemTime>)> = Vec::new();
    for path in matches {
        let mtime = fs::metadata(&path).and_then(|m| m.modified()).ok();
        match kept
            .iter_mut()
            .find(|(existing, _)| existing.file_name() == path.file_name())
        {
            Some(slot) => {
                if mtime > slot.1 {
                    tracing::debug!("preferring newer {} over {}", path.display(), slot.0.display());
                    *slot = (path, mtime);
                }
            }
            None => kept.push((path, mtime)),
        }
    }
    kept.into_iter().map(|(path, _)| path).collect()
}

/// Copy directory `source` into `dest_parent`, keeping its name.
fn copy_tree(action: &str, source: &Path, dest_parent: &Path) -> Result<(), StepError> {
    let options = fs_extra::dir::CopyOptions::new().overwrite(true);
    fs_extra::dir::copy(source, dest_parent, &options)
        .map(|_| ())
        .map_err(|e| io_error(action, source, io::Error::other(e.to_string())))
}

/// Copy the contents of directory `source` to `dest`.
fn copy_tree_as(action: &str, source: &Path, dest: &Path) -> Result<(), StepError> {
    fs::create_dir_all(dest).map_err(|e| io_error(action, dest, e))?;
    let options = fs_extra::dir::CopyOptions::new()
        .overwrite(true)
        .content_only(true);
    fs_extra::dir::copy(source, dest, &options)
        .map(|_| ())
        .map_err(|e| io_error(action, source, io::Error::other(e.to_string())))
}
