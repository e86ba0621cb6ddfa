use thiserror::Error;

/// Errors surfaced by registry construction and lookups.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// A type tag was registered twice.
    #[error("duplicate type tag: {0}")]
    DuplicateTag(String),
    /// A node type was registered without natural-key fields.
    #[error("node type {0} declares no natural key")]
    MissingNaturalKey(String),
    /// A record referenced a tag the registry does not know.
    #[error("unknown type tag: {0}")]
    UnknownTag(String),
}
