//! Processing steps.
//!
//! A step is one declarative instruction that places (part of) a downloaded
//! asset into the staging tree. Catalog files store steps as loosely-typed
//! parameter bags keyed by `action`; they are parsed into [`Step`] once, at
//! load time, so a missing parameter is reported while reading the catalog
//! rather than halfway through a build.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A step is missing a parameter it cannot run without.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("step '{action}' is missing required parameter '{parameter}'")]
pub struct MissingParameter {
    /// Wire name of the step action (e.g. `copy_file`).
    pub action: String,
    /// Wire name of the missing parameter (e.g. `target_path`).
    pub parameter: &'static str,
}

/// One instruction of the processing-step interpreter.
///
/// Target directories are relative to the staging root and never carry a
/// leading `/`. An empty target directory means the staging root itself,
/// which is only allowed for the find-style steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub enum Step {
    /// Extract every archive entry under the staging root.
    UnzipToRoot,
    /// Extract every archive entry under `target_dir`.
    UnzipToPath {
        /// Destination directory, relative to the staging root.
        target_dir: String,
    },
    /// Extract the contents of one top-level folder, stripping that folder.
    ///
    /// When `subfolder` is `None` the archive must contain exactly one
    /// top-level directory.
    UnzipSubfolderToRoot {
        /// Explicit prefix to strip.
        subfolder: Option<String>,
    },
    /// Copy the downloaded file itself into `target_dir`.
    CopyFile {
        /// Destination directory, relative to the staging root.
        target_dir: String,
    },
    /// Copy every archive member matching `source_glob` into `target_dir`.
    FindAndCopy {
        /// Glob matched against member names at any depth.
        source_glob: String,
        /// Destination directory, relative to the staging root.
        target_dir: String,
    },
    /// Move the first archive member matching `source_glob` to
    /// `target_dir/target_filename`.
    FindAndRename {
        /// Glob matched against member names at any depth.
        source_glob: String,
        /// Destination directory, relative to the staging root.
        target_dir: String,
        /// New file name for the match.
        target_filename: String,
    },
    /// Remove everything under the staging root matching `glob`.
    DeleteFile {
        /// Glob matched against staged paths at any depth.
        glob: String,
    },
    /// An action this build of the tool does not know about. Executing it is
    /// a warning, not an error, so newer catalogs still load.
    Unknown {
        /// The unrecognized action name.
        action: String,
    },
}

impl Step {
    /// The wire name of this step's action.
    pub fn action(&self) -> &str {
        match self {
            Self::UnzipToRoot => "unzip_to_root",
            Self::UnzipToPath { .. } => "unzip_to_path",
            Self::UnzipSubfolderToRoot { .. } => "unzip_subfolder_to_root",
            Self::CopyFile { .. } => "copy_file",
            Self::FindAndCopy { .. } => "find_and_copy",
            Self::FindAndRename { .. } => "find_and_rename",
            Self::DeleteFile { .. } => "delete_file",
            Self::Unknown { action } => action,
        }
    }

    /// Check that every required parameter is present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns the first parameter found missing.
    pub fn validate(&self) -> Result<(), MissingParameter> {
        let missing = match self {
            Self::UnzipToPath { target_dir } | Self::CopyFile { target_dir }
                if target_dir.is_empty() =>
            {
                Some("target_path")
            }
            Self::FindAndCopy { source_glob, .. } if source_glob.is_empty() => {
                Some("source_file_pattern")
            }
            Self::FindAndRename { source_glob, .. } if source_glob.is_empty() => {
                Some("source_file_pattern")
            }
            Self::FindAndRename {
                target_filename, ..
            } if target_filename.is_empty() => Some("target_filename"),
            Self::DeleteFile { glob } if glob.is_empty() => Some("path"),
            _ => None,
        };

        match missing {
            Some(parameter) => Err(MissingParameter {
                action: self.action().to_string(),
                parameter,
            }),
            None => Ok(()),
        }
    }

    /// The steps an asset runs when its descriptor declares none.
    pub fn default_steps() -> Vec<Step> {
        vec![Step::UnzipToRoot]
    }
}

/// Catalog wire shape of a step: an action name plus optional parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct RawStep {
    action: String,
    #[serde(default, alias = "target_dir", skip_serializing_if = "Option::is_none")]
    target_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_file_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default, alias = "subfolder_name", skip_serializing_if = "Option::is_none")]
    subfolder: Option<String>,
}

fn relative(path: Option<String>) -> String {
    path.map(|p| p.trim_start_matches('/').to_string())
        .unwrap_or_default()
}

impl TryFrom<RawStep> for Step {
    type Error = MissingParameter;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let step = match raw.action.as_str() {
            "unzip_to_root" => Step::UnzipToRoot,
            "unzip_to_path" => Step::UnzipToPath {
                target_dir: relative(raw.target_path),
            },
            "unzip_subfolder_to_root" => Step::UnzipSubfolderToRoot {
                subfolder: raw
                    .subfolder
                    .map(|s| s.trim_matches('/').to_string())
                    .filter(|s| !s.is_empty()),
            },
            "copy_file" => Step::CopyFile {
                target_dir: relative(raw.target_path),
            },
            "find_and_copy" => Step::FindAndCopy {
                source_glob: raw.source_file_pattern.unwrap_or_default(),
                target_dir: relative(raw.target_path),
            },
            "find_and_rename" => Step::FindAndRename {
                source_glob: raw.source_file_pattern.unwrap_or_default(),
                target_dir: relative(raw.target_path),
                target_filename: raw.target_filename.unwrap_or_default(),
            },
            "delete_file" => Step::DeleteFile {
                glob: relative(raw.path),
            },
            _ => Step::Unknown { action: raw.action },
        };
        step.validate()?;
        Ok(step)
    }
}

impl From<Step> for RawStep {
    fn from(step: Step) -> Self {
        let mut raw = RawStep {
            action: step.action().to_string(),
            ..RawStep::default()
        };
        match step {
            Step::UnzipToRoot | Step::Unknown { .. } => {}
            Step::UnzipToPath { target_dir } | Step::CopyFile { target_dir } => {
                raw.target_path = Some(target_dir);
            }
            Step::UnzipSubfolderToRoot { subfolder } => raw.subfolder = subfolder,
            Step::FindAndCopy {
                source_glob,
                target_dir,
            } => {
                raw.source_file_pattern = Some(source_glob);
                raw.target_path = Some(target_dir);
            }
            Step::FindAndRename {
                source_glob,
                target_dir,
                target_filename,
            } => {
                raw.source_file_pattern = Some(source_glob);
                raw.target_path = Some(target_dir);
                raw.target_filename = Some(target_filename);
            }
            Step::DeleteFile { glob } => raw.path = Some(glob),
        }
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_find_and_rename() {
        let step: Step = serde_json::from_str(
            r#"{"action": "find_and_rename", "source_file_pattern": "*.bin",
                "target_path": "/bootloader/payloads", "target_filename": "hekate.bin"}"#,
        )
        .unwrap();

        assert_eq!(
            step,
            Step::FindAndRename {
                source_glob: "*.bin".into(),
                target_dir: "bootloader/payloads".into(),
                target_filename: "hekate.bin".into(),
            }
        );
    }

    #[test]
    fn target_dir_alias_is_accepted() {
        let step: Step =
            serde_json::from_str(r#"{"action": "unzip_to_path", "target_dir": "switch"}"#).unwrap();
        assert_eq!(
            step,
            Step::UnzipToPath {
                target_dir: "switch".into()
            }
        );
    }

    #[test]
    fn missing_target_is_rejected_at_load() {
        let err = serde_json::from_str::<Step>(r#"{"action": "copy_file"}"#).unwrap_err();
        assert!(err.to_string().contains("target_path"), "{err}");

        let err = serde_json::from_str::<Step>(r#"{"action": "delete_file", "path": ""}"#)
            .unwrap_err();
        assert!(err.to_string().contains("'path'"), "{err}");
    }

    #[test]
    fn find_and_copy_defaults_to_staging_root() {
        let step: Step =
            serde_json::from_str(r#"{"action": "find_and_copy", "source_file_pattern": "*.nro"}"#)
                .unwrap();
        assert_eq!(
            step,
            Step::FindAndCopy {
                source_glob: "*.nro".into(),
                target_dir: String::new(),
            }
        );
    }

    #[test]
    fn subfolder_name_alias_is_accepted() {
        let step: Step = serde_json::from_str(
            r#"{"action": "unzip_subfolder_to_root", "subfolder_name": "/y/"}"#,
        )
        .unwrap();
        assert_eq!(
            step,
            Step::UnzipSubfolderToRoot {
                subfolder: Some("y".into())
            }
        );

        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["subfolder"], "y");
    }

    #[test]
    fn unknown_action_loads() {
        let step: Step = serde_json::from_str(r#"{"action": "patch_ini"}"#).unwrap();
        assert_eq!(step.action(), "patch_ini");
        assert!(step.validate().is_ok());
    }

    #[test]
    fn serializes_back_to_wire_names() {
        let json = serde_json::to_value(Step::DeleteFile {
            glob: "switch/*.txt".into(),
        })
        .unwrap();
        assert_eq!(json["action"], "delete_file");
        assert_eq!(json["path"], "switch/*.txt");
    }
}
