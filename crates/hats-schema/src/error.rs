//! Catalog validation errors.

use thiserror::Error;

use crate::step::MissingParameter;

/// Errors raised while loading or editing a catalog.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The catalog text is not valid JSON of the expected shape.
    #[error("Invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// `source_type` names a source this tool does not know.
    #[error("Component '{id}': unknown source_type '{source_type}'")]
    UnknownSourceType {
        /// Offending component.
        id: String,
        /// The unrecognized value.
        source_type: String,
    },

    /// A field required by the component's source type is absent or empty.
    #[error("Component '{id}': missing required field '{field}'")]
    MissingField {
        /// Offending component.
        id: String,
        /// Wire name of the field.
        field: &'static str,
    },

    /// One of the component's processing steps is incomplete.
    #[error("Component '{id}': {source}")]
    Step {
        /// Offending component.
        id: String,
        /// The step problem.
        source: MissingParameter,
    },

    /// The id is already used by another component.
    #[error("Component '{id}' already exists")]
    DuplicateId {
        /// The taken id.
        id: String,
    },
}
