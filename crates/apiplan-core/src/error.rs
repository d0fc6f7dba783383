//! Error kinds shared by every error type in the workspace

use std::fmt;

/// Coarse classification of an error, independent of the module that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed constraint, conflicting bounds, unsupported format or method
    Invalid,
    /// Unknown schema, test case, or operation
    NotFound,
    /// Invariant violation inside the engine
    Internal,
    /// Structural or constraint mismatch between a schema and an object
    SchemaMismatch,
    /// Outbound HTTP request failed before a response was received
    Transport,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
            Self::SchemaMismatch => "schema_mismatch",
            Self::Transport => "transport",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
