//! Error handling for the RapidKit CLI.
//!
//! Provides structured errors with:
//! - User-friendly messages
//! - Actionable suggestions
//! - Proper error chaining
//! - Exit code mapping

use std::error::Error;

use owo_colors::OwoColorize;
use thiserror::Error;

use rapidkit_core::error::{ErrorCategory as CoreCategory, RapidkitError};

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    /// An error propagated from the core or the adapters.
    #[error(transparent)]
    Core(#[from] RapidkitError),

    /// A report came back with failures (`modules validate`, `verify-all`).
    #[error("{message}")]
    ValidationFailed { message: String },

    /// Some modules of a batch failed; the rest were processed.
    #[error("{failed} of {total} modules failed")]
    BatchFailed { failed: usize, total: usize },

    /// A configuration value could not be read or printed.
    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Writing to the terminal or encoding a report failed.
    #[error("I/O error: {message}")]
    IoError {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::IoError {
            message: err.to_string(),
            source: err,
        }
    }
}

impl CliError {
    /// Get user-actionable suggestions for fixing this error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Core(core) => core.suggestions(),
            Self::ValidationFailed { .. } => vec![
                "Re-run with --json for per-module details".into(),
            ],
            Self::BatchFailed { .. } => vec![
                "Fix the failing modules and re-run the batch with just those".into(),
            ],
            Self::ConfigError { .. } => vec![
                format!(
                    "Check your config file at {}",
                    crate::config::AppConfig::config_path().display()
                ),
                "Inspect the effective values with: rapidkit config list".into(),
            ],
            Self::IoError { .. } => vec![
                "Check file permissions".into(),
                "Check available disk space".into(),
            ],
            Self::Encode(_) => vec!["This appears to be a bug in RapidKit".into()],
        }
    }

    /// Get the error category for styling and exit codes.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Core(core) => match core.category() {
                CoreCategory::Validation => ErrorCategory::Validation,
                CoreCategory::NotFound => ErrorCategory::NotFound,
                CoreCategory::Configuration => ErrorCategory::Configuration,
                CoreCategory::Conflict | CoreCategory::Generator => ErrorCategory::UserError,
                CoreCategory::Internal => ErrorCategory::Internal,
            },
            Self::ValidationFailed { .. } => ErrorCategory::Validation,
            Self::BatchFailed { .. } => ErrorCategory::UserError,
            Self::ConfigError { .. } => ErrorCategory::Configuration,
            Self::IoError { .. } | Self::Encode(_) => ErrorCategory::Internal,
        }
    }

    /// Exit code to pass to the OS.
    ///
    /// | Category      | Code |
    /// |---------------|------|
    /// | User error    |  1   |
    /// | Validation    |  2   |
    /// | Not found     |  3   |
    /// | Configuration |  4   |
    /// | Internal      |  1   |
    ///
    /// Generator errors keep the code they were raised with.
    pub fn exit_code(&self) -> u8 {
        if let Self::Core(core) = self {
            return u8::try_from(core.exit_code()).unwrap_or(1);
        }
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::Internal => 1,
            ErrorCategory::Validation => 2,
            ErrorCategory::NotFound => 3,
            ErrorCategory::Configuration => 4,
        }
    }

    /// Format the error for display with colors and suggestions.
    pub fn format_colored(&self, verbose: bool) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "\n{} {}\n\n",
            "✗".red().bold(),
            "Error:".red().bold()
        ));
        output.push_str(&format!("  {}\n", self.to_string().red()));

        if verbose {
            let mut source = self.source();
            while let Some(err) = source {
                output.push_str(&format!(
                    "\n  {} {}\n",
                    "→".dimmed(),
                    err.to_string().dimmed()
                ));
                source = err.source();
            }
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str(&format!("\n{}\n", "Suggestions:".yellow().bold()));
            for suggestion in suggestions {
                output.push_str(&format!("  {suggestion}\n"));
            }
        }

        if !verbose {
            output.push('\n');
            output.push_str(&format!(
                "{} {}\n",
                "\u{2139}".blue(),
                "Use -v / --verbose for more details.".dimmed(),
            ));
        }

        output
    }

    /// Plain-text version of [`Self::format_colored`].
    pub fn format_plain(&self, verbose: bool) -> String {
        let mut out = String::new();
        out.push_str(&format!("\nError: {self}\n"));

        if verbose {
            let mut src = self.source();
            while let Some(err) = src {
                out.push_str(&format!("  Caused by: {err}\n"));
                src = err.source();
            }
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            out.push_str("\nSuggestions:\n");
            for s in &suggestions {
                out.push_str(&format!("  {s}\n"));
            }
        }

        if !verbose {
            out.push_str("\nUse -v / --verbose for more details.\n");
        }

        out
    }

    /// Log the error using tracing.
    pub fn log(&self) {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::Validation => {
                tracing::warn!("User error: {}", self)
            }
            ErrorCategory::NotFound => tracing::warn!("Not found: {}", self),
            ErrorCategory::Configuration => tracing::error!("Configuration error: {}", self),
            ErrorCategory::Internal => tracing::error!("Internal error: {}", self),
        }

        if let Some(source) = self.source() {
            tracing::debug!("Caused by: {}", source);
        }
    }
}

/// Error categories for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected request (conflict, generator failure).
    UserError,
    /// Validation failure (structure, manifest, signature).
    Validation,
    /// Resource not found.
    NotFound,
    /// Configuration error.
    Configuration,
    /// Internal/system error.
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    use rapidkit_core::application::ApplicationError;
    use rapidkit_core::domain::DomainError;

    fn core(err: impl Into<RapidkitError>) -> CliError {
        CliError::Core(err.into())
    }

    #[test]
    fn not_found_exits_three() {
        let err = core(ApplicationError::ModuleNotFound {
            slug: "free/x/y".into(),
        });
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn invalid_slug_exits_two() {
        let err = core(DomainError::InvalidSlug {
            slug: "nope".into(),
            reason: "expected tier/category/name".into(),
        });
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn generator_error_keeps_its_code() {
        let err = core(ApplicationError::Generator {
            message: "requirements".into(),
            exit_code: 7,
            context: Default::default(),
        });
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn report_failures_exit_two() {
        let err = CliError::ValidationFailed {
            message: "Verification failed. Valid: 1, Errors: 1".into(),
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn config_and_io_codes() {
        let config = CliError::ConfigError {
            message: "x".into(),
            source: None,
        };
        assert_eq!(config.exit_code(), 4);
        let io_err = CliError::from(io::Error::other("broken pipe"));
        assert_eq!(io_err.exit_code(), 1);
    }

    #[test]
    fn format_plain_contains_error_header() {
        let err = CliError::BatchFailed {
            failed: 1,
            total: 3,
        };
        let s = err.format_plain(false);
        assert!(s.contains("Error: 1 of 3 modules failed"));
        assert!(s.contains("Suggestions:"));
        assert!(s.contains("--verbose"));
    }

    #[test]
    fn format_plain_verbose_omits_hint() {
        let err = CliError::ValidationFailed {
            message: "x".into(),
        };
        assert!(!err.format_plain(true).contains("--verbose"));
    }
}
