pub mod acquire;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod device;
pub mod firmware;
pub mod github;
pub mod io;
pub mod latest;
pub mod manifest;
pub mod package;
pub mod paths;
pub mod process;
pub mod resolver;

pub mod reporter;

pub use builder::{BuildError, BuildOutcome, BuildRequest, PackBuilder};
pub use config::Config;
pub use device::{DeviceStore, ReconcileError, ReconcileReport};
pub use github::{GithubClient, GithubError};
pub use paths::*;
pub use reporter::{ChannelReporter, NullReporter, Phase, ProgressEvent, Reporter};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("hats-core/", env!("CARGO_PKG_VERSION"));
