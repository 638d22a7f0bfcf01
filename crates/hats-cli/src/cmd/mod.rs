//! Command modules - one file per CLI command

pub mod build;
pub mod fetch;
pub mod install;
pub mod latest;
pub mod list;
pub mod restore;
pub mod status;
pub mod trash;
