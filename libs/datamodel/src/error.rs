use thiserror::Error;

/// A config or cluster mutation could not be applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// A field the mutation depends on is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field holds a value the mutation cannot work with.
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}
