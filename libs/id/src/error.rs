use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("empty identifier")]
    Empty,

    #[error("run ID must start with '{expected}_', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    #[error("run ID has no '_' between prefix and ULID")]
    MissingSeparator,

    #[error("run ID has a malformed ULID: {0}")]
    InvalidUlid(String),

    /// Not `abtest` followed by four lowercase letters.
    #[error("'{name}' is not a generated scale set name: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Every candidate the registry drew was already taken.
    #[error("gave up finding a free scale set name after {attempts} draws")]
    NamesExhausted { attempts: u32 },
}

impl IdError {
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
