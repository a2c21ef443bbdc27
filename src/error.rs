//! Error types for kwok-e2e
//!
//! Two levels: [`ProbeError`] is what a single probe invocation reports, and
//! [`Error`] is what a step or a whole verification run reports. Probe errors
//! keep the raw output that failed the check so the run report can show it.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single probe invocation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// The call succeeded but its output did not satisfy the probe's predicate
    #[error("unexpected output: {message}")]
    UnexpectedOutput {
        /// What was expected
        message: String,
        /// Raw response body or command stdout
        output: String,
    },

    /// The external command or HTTP request itself failed
    #[error("invocation failed: {message}")]
    Invocation {
        /// Spawn error, exit status, connection error, timeout
        message: String,
    },
}

impl ProbeError {
    /// Create an unexpected-output error carrying the offending output
    pub fn unexpected(message: impl Into<String>, output: impl Into<String>) -> Self {
        Self::UnexpectedOutput {
            message: message.into(),
            output: output.into(),
        }
    }

    /// Create an invocation error
    pub fn invocation(message: impl Into<String>) -> Self {
        Self::Invocation {
            message: message.into(),
        }
    }

    /// Raw output attached to this error, if any
    pub fn output(&self) -> Option<&str> {
        match self {
            ProbeError::UnexpectedOutput { output, .. } => Some(output),
            ProbeError::Invocation { .. } => None,
        }
    }
}

/// Main error type for verification runs
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A retried probe never succeeded within its attempt budget
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Operation (step) name
        operation: String,
        /// Number of invocations made
        attempts: u32,
        /// Failure reported by the final invocation
        last_error: ProbeError,
    },

    /// A probe that runs once failed
    #[error("{step}: {source}")]
    Probe {
        /// Step name
        step: String,
        /// Underlying probe failure
        #[source]
        source: ProbeError,
    },

    /// The run was cancelled from outside
    #[error("{operation} cancelled")]
    Cancelled {
        /// Operation in progress when cancellation was observed
        operation: String,
    },

    /// Invalid policy, runtime name or other input
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
    },

    /// Configuration file could not be read or parsed
    #[error("config error for {}: {message}", path.display())]
    Config {
        /// Path of the configuration file
        path: PathBuf,
        /// Description of what failed
        message: String,
    },

    /// Run-level failure naming the first failing step
    #[error("step {step} {}", step_failure(.source))]
    StepFailed {
        /// Step name
        step: String,
        /// What went wrong in that step
        #[source]
        source: Box<Error>,
    },

    /// I/O error outside of any probe
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client could not be built
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a config error for the given file
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Wrap a single-shot probe failure with its step name
    pub fn probe(step: impl Into<String>, source: ProbeError) -> Self {
        Self::Probe {
            step: step.into(),
            source,
        }
    }

    /// Wrap an error with the name of the step that produced it
    pub fn step_failed(step: impl Into<String>, source: Error) -> Self {
        Self::StepFailed {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// The underlying probe failure, looking through step wrappers
    pub fn probe_error(&self) -> Option<&ProbeError> {
        match self {
            Error::RetryExhausted { last_error, .. } => Some(last_error),
            Error::Probe { source, .. } => Some(source),
            Error::StepFailed { source, .. } => source.probe_error(),
            _ => None,
        }
    }

    /// Whether this error came from cancellation rather than a failed check
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled { .. } => true,
            Error::StepFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Describe a step's error without repeating the step name it already carries
fn step_failure(source: &Error) -> String {
    match source {
        Error::RetryExhausted {
            attempts,
            last_error,
            ..
        } => format!("failed after {attempts} attempts: {last_error}"),
        Error::Probe { source, .. } => format!("failed: {source}"),
        Error::Cancelled { .. } => "cancelled".to_string(),
        other => format!("failed: {other}"),
    }
}
