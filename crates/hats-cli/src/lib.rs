//! hats - HATS pack builder
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! Builds Nintendo Switch homebrew packs from a catalog of components and
//! manages what is installed on an SD card.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.hats/
//! ├── config.toml      # Optional settings
//! ├── components.json  # Component catalog
//! ├── skeleton.zip     # Static files merged into every pack
//! ├── manifest.json    # Last build, for changelogs
//! └── tmp/            # Per-build scratch
//! ```

pub mod cmd;
pub mod ops;
pub mod ui;

pub use hats_core::USER_AGENT;
pub use hats_core::paths::*;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "hats")]
#[command(author, version, about = "hats - build and manage HATS packs")]
pub struct Cli {
    /// Component catalog (default: ~/.hats/components.json)
    #[arg(long, global = true, env = "HATS_CATALOG")]
    pub catalog: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build a pack from the selected components
    Build {
        /// Component ids, built in this order
        ids: Vec<String>,
        /// Select every component in the catalog
        #[arg(long, conflicts_with = "defaults")]
        all: bool,
        /// Select the catalog's default components
        #[arg(long)]
        defaults: bool,
        /// Pin a component version for this build (repeatable)
        #[arg(long = "version", value_name = "ID=VER", value_parser = parse_pin)]
        pins: Vec<(String, String)>,
        /// Note recorded in the manifest and summary
        #[arg(long)]
        comment: Option<String>,
        /// Directory for the finished pack
        #[arg(long, short, default_value = ".")]
        output: PathBuf,
    },
    /// Refresh cached versions from upstream
    Fetch {
        /// Component ids (default: the whole catalog)
        ids: Vec<String>,
    },
    /// List catalog components
    List,
    /// Show installed and trashed components on an SD card
    Status {
        /// SD card root
        #[arg(long)]
        root: PathBuf,
    },
    /// Delete components' files and move them to the trash
    Trash {
        /// SD card root
        #[arg(long)]
        root: PathBuf,
        /// Component ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Move trashed components back to installed
    Restore {
        /// SD card root
        #[arg(long)]
        root: PathBuf,
        /// Component ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Wipe an SD card's mutable state and unpack a pack onto it
    Install {
        /// SD card root
        #[arg(long)]
        root: PathBuf,
        /// Pack archive
        pack: PathBuf,
    },
    /// Download the newest published pack
    Latest {
        /// Download directory
        #[arg(long, default_value = ".")]
        dest: PathBuf,
        /// Download even if the file is already present
        #[arg(long, short)]
        force: bool,
    },
}

/// Parse `ID=VERSION`.
pub fn parse_pin(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((id, version)) if !id.trim().is_empty() && !version.trim().is_empty() => {
            Ok((id.trim().to_string(), version.trim().to_string()))
        }
        _ => Err(format!("expected ID=VERSION, got '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pins_parse() {
        assert_eq!(
            parse_pin("atmosphere=1.7.1").unwrap(),
            ("atmosphere".to_string(), "1.7.1".to_string())
        );
        assert!(parse_pin("atmosphere").is_err());
        assert!(parse_pin("=1.0").is_err());
    }

    #[test]
    fn build_args() {
        let cli = Cli::parse_from([
            "hats", "build", "a", "b", "--version", "a=v2", "--comment", "weekly",
        ]);
        match cli.command {
            Commands::Build {
                ids, pins, comment, ..
            } => {
                assert_eq!(ids, ["a", "b"]);
                assert_eq!(pins, [("a".to_string(), "v2".to_string())]);
                assert_eq!(comment.as_deref(), Some("weekly"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn command_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
