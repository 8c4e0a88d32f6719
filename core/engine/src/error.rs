//! FILENAME: core/engine/src/error.rs
//! PURPOSE: Error kinds shared by every data-cube crate.
//! CONTEXT: All errors are raised synchronously where they are detected.
//! Validation is eager (names, indexes and specs are checked before any
//! datum is scanned), so a failed call never leaves a half-built tree behind.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CubeError {
    /// A mandatory input is missing.
    #[error("Required argument '{0}' was not specified")]
    ArgumentRequired(String),

    /// A value is malformed or out of range.
    #[error("Invalid argument '{name}': {reason}")]
    ArgumentInvalid { name: String, reason: String },

    /// A grouping or reader references a dimension absent from the schema.
    #[error("Dimension '{0}' is not defined in the schema")]
    SchemaMismatch(String),

    /// The operation is not valid in the current state (e.g. disposed node).
    #[error("Invalid operation: {0}")]
    OperationInvalid(String),

    /// An extension point was left without its required override.
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

impl CubeError {
    pub fn argument_required(name: impl Into<String>) -> Self {
        CubeError::ArgumentRequired(name.into())
    }

    pub fn argument_invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        CubeError::ArgumentInvalid {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn schema_mismatch(dimension: impl Into<String>) -> Self {
        CubeError::SchemaMismatch(dimension.into())
    }

    pub fn operation_invalid(message: impl Into<String>) -> Self {
        CubeError::OperationInvalid(message.into())
    }

    pub fn not_implemented(what: impl Into<String>) -> Self {
        CubeError::NotImplemented(what.into())
    }
}

pub type CubeResult<T> = Result<T, CubeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_argument() {
        let err = CubeError::argument_invalid("indexes", "index 2 is already in use");
        assert_eq!(
            err.to_string(),
            "Invalid argument 'indexes': index 2 is already in use"
        );

        let err = CubeError::schema_mismatch("city");
        assert_eq!(err.to_string(), "Dimension 'city' is not defined in the schema");
    }
}
