//! Success predicates for HTTP responses and command output.
//!
//! Each health endpoint has exactly one policy, fixed by the component that
//! serves it. Substring checks over command output are a textual
//! approximation of cluster state and rely on kubectl's table format.

use crate::error::ProbeError;
use crate::http::HttpResponse;

/// How an HTTP health response is judged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyPredicate {
    /// Body equals the sentinel exactly (case-sensitive, no trimming)
    Equals(String),
    /// Body contains `needle` at least `min` times
    MinCount {
        /// Marker to count
        needle: String,
        /// Required number of non-overlapping occurrences
        min: usize,
    },
    /// Status code equals the given value; the body is ignored
    StatusIs(u16),
    /// Body contains the fragment
    Contains(String),
}

impl BodyPredicate {
    /// Check `response` against this policy
    pub fn evaluate(&self, response: &HttpResponse) -> Result<(), ProbeError> {
        let body = &response.body;
        match self {
            BodyPredicate::Equals(expected) => {
                if body == expected {
                    return Ok(());
                }
            }
            BodyPredicate::MinCount { needle, min } => {
                if body.matches(needle.as_str()).count() >= *min {
                    return Ok(());
                }
            }
            BodyPredicate::StatusIs(code) => {
                if response.status == *code {
                    return Ok(());
                }
                return Err(ProbeError::unexpected(
                    format!("status {} is not {}", response.status, code),
                    body.clone(),
                ));
            }
            BodyPredicate::Contains(fragment) => {
                if body.contains(fragment.as_str()) {
                    return Ok(());
                }
            }
        }
        Err(ProbeError::unexpected(
            format!("body does not satisfy: {}", self.describe()),
            body.clone(),
        ))
    }

    /// Human-readable form of the policy
    pub fn describe(&self) -> String {
        match self {
            BodyPredicate::Equals(s) => format!("body == {s:?}"),
            BodyPredicate::MinCount { needle, min } => {
                format!("at least {min} occurrences of {needle}")
            }
            BodyPredicate::StatusIs(code) => format!("status == {code}"),
            BodyPredicate::Contains(s) => format!("body contains {s}"),
        }
    }
}

/// How the stdout of a successful command is judged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputPredicate {
    /// Exit status 0 is enough
    Succeeded,
    /// Stdout contains the fragment
    Contains(String),
    /// Stdout with surrounding whitespace removed equals the value
    TrimmedEquals(String),
}

impl OutputPredicate {
    /// Check `stdout` against this policy
    pub fn evaluate(&self, stdout: &str) -> Result<(), ProbeError> {
        match self {
            OutputPredicate::Succeeded => Ok(()),
            OutputPredicate::Contains(fragment) => {
                if stdout.contains(fragment.as_str()) {
                    Ok(())
                } else {
                    Err(ProbeError::unexpected(
                        format!("output does not contain {fragment:?}"),
                        stdout,
                    ))
                }
            }
            OutputPredicate::TrimmedEquals(expected) => {
                let actual = stdout.trim();
                if actual == expected {
                    Ok(())
                } else {
                    Err(ProbeError::unexpected(
                        format!("got {actual:?}, expected {expected:?}"),
                        stdout,
                    ))
                }
            }
        }
    }
}
