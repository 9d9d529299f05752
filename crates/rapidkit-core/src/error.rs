//! Unified error handling for RapidKit Core.
//!
//! This module provides a unified error type that wraps domain and application
//! errors, with rich context and user-actionable suggestions.

use thiserror::Error;

use crate::application::ApplicationError;
use crate::domain::DomainError;

/// Root error type for RapidKit Core operations.
#[derive(Debug, Error, Clone)]
pub enum RapidkitError {
    /// Errors from the domain layer (business logic violations).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Errors from the application layer (orchestration failures).
    #[error(transparent)]
    Application(#[from] ApplicationError),

    /// Configuration or setup errors.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Unexpected internal errors (bugs).
    #[error("Internal error: {message}. This is a bug, please report it.")]
    Internal { message: String },
}

impl RapidkitError {
    /// Get user-actionable suggestions for fixing this error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Domain(e) => e.suggestions(),
            Self::Application(e) => e.suggestions(),
            Self::Configuration { message } => vec![
                format!("Configuration issue: {message}"),
                "Try: rapidkit config list".into(),
            ],
            Self::Internal { .. } => vec![
                "This appears to be a bug in RapidKit".into(),
                "Re-run with -vvv and include the log when reporting it".into(),
            ],
        }
    }

    /// Get error category for display/styling purposes.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Domain(e) => match e.category() {
                crate::domain::ErrorCategory::Validation => ErrorCategory::Validation,
                crate::domain::ErrorCategory::Conflict => ErrorCategory::Conflict,
                crate::domain::ErrorCategory::NotFound => ErrorCategory::NotFound,
                crate::domain::ErrorCategory::Internal => ErrorCategory::Internal,
            },
            Self::Application(e) => e.category(),
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Process exit code for this error.
    ///
    /// Generator errors carry their own code; everything else is derived
    /// from the category.
    pub fn exit_code(&self) -> i32 {
        if let Self::Application(ApplicationError::Generator { exit_code, .. }) = self {
            return *exit_code;
        }
        self.category().exit_code()
    }
}

/// Error categories for UI display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Conflict,
    NotFound,
    Generator,
    Configuration,
    Internal,
}

impl ErrorCategory {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Validation => 2,
            Self::NotFound => 3,
            Self::Configuration => 4,
            Self::Conflict | Self::Generator | Self::Internal => 1,
        }
    }
}

/// Convenient result type alias.
pub type RapidkitResult<T> = Result<T, RapidkitError>;

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn generator_errors_keep_their_exit_code() {
        let err = RapidkitError::from(ApplicationError::Generator {
            message: "boom".into(),
            exit_code: 7,
            context: BTreeMap::new(),
        });
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn categories_map_to_exit_codes() {
        let not_found = RapidkitError::from(ApplicationError::ModuleNotFound {
            slug: "free/x".into(),
        });
        assert_eq!(not_found.exit_code(), 3);

        let cycle = RapidkitError::from(DomainError::DependencyCycle {
            cycle: vec!["a".into(), "a".into()],
        });
        assert_eq!(cycle.exit_code(), 2);

        let cfg = RapidkitError::Configuration {
            message: "bad".into(),
        };
        assert_eq!(cfg.exit_code(), 4);
    }
}
