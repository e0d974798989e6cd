//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::event::ListenerError;

/// Domain errors represent contract violations of the tree, its values and conversions.
/// These are independent of infrastructure concerns.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid value for '{path}': {message}")]
    InvalidValue { path: String, message: String },

    #[error("cannot convert to {target}: {message}")]
    Conversion { target: String, message: String },

    #[error("{} listener(s) failed on {event}: {}", failures.len(), join_failures(failures))]
    ListenersFailed {
        event: String,
        failures: Vec<ListenerError>,
    },
}

impl DomainError {
    pub fn conversion(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conversion {
            target: target.into(),
            message: message.into(),
        }
    }
}

fn join_failures(failures: &[ListenerError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Rejects blank arguments with [`DomainError::InvalidPath`].
pub(crate) fn require_non_blank<'a>(value: &'a str, what: &str) -> DomainResult<&'a str> {
    if value.trim().is_empty() {
        Err(DomainError::InvalidPath(format!("{what} must not be blank")))
    } else {
        Ok(value)
    }
}
