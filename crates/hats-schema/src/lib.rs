//! Shared types and wire format for HATS pack builds.
//!
//! This crate is pure data: the component catalog, processing steps, and the
//! build / on-device manifests, with the JSON shapes the builder and the
//! install target exchange. All network and filesystem work lives in
//! `hats-core`.

pub mod catalog;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod step;

// Re-exports
pub use catalog::{AssetSpec, Catalog, ComponentDescriptor, Source};
pub use error::SchemaError;
pub use hash::ContentHash;
pub use manifest::{BuildManifest, DeviceManifest, ManifestEntry};
pub use step::{MissingParameter, Step};

/// Placeholder for a version or firmware value that could not be determined.
pub const NOT_AVAILABLE: &str = "N/A";
