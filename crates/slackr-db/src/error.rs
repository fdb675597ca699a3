use thiserror::Error;

/// Errors produced by the record store.
///
/// Callers validate existence before mutating, so `NotFound`,
/// `FieldNotFound`, `TypeMismatch` and `ValueNotFound` reaching the API layer
/// indicate a bug in the caller rather than bad client input.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{collection}: record {key} not found")]
    NotFound { collection: String, key: u64 },

    #[error("{collection}: record {key} has no field '{field}'")]
    FieldNotFound {
        collection: String,
        key: u64,
        field: String,
    },

    #[error("{collection}: field '{field}' on record {key} is not a list")]
    TypeMismatch {
        collection: String,
        key: u64,
        field: String,
    },

    #[error("{collection}: value not present in '{field}' on record {key}")]
    ValueNotFound {
        collection: String,
        key: u64,
        field: String,
    },

    /// Snapshot key that doesn't parse as a record key.
    #[error("{collection}: invalid snapshot key '{key}'")]
    InvalidKey { collection: String, key: String },

    #[error("Unknown query operator '{0}'")]
    UnknownOperator(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record didn't match its collection's schema.
    #[error("{collection}: record {key} does not match schema: {source}")]
    Schema {
        collection: String,
        key: u64,
        source: serde_json::Error,
    },

    #[error("{0}: lock poisoned")]
    Poisoned(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
