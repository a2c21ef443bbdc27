//! Probes: one external call plus one success predicate.
//!
//! A probe holds everything it needs to run, so the workflow can invoke it
//! repeatedly (under the retrier) or once, without arguments. Probes never
//! retry on their own.

use async_trait::async_trait;

use crate::error::ProbeError;

pub mod command;
pub mod http;
pub mod predicate;

pub use command::{CommandProbe, KubeconfigExportProbe, ScaleKind};
pub use http::HttpProbe;
pub use predicate::{BodyPredicate, OutputPredicate};

/// A single externally-observable check
#[async_trait]
pub trait Probe: Send + Sync {
    /// What this probe talks to: a URL or a command line
    fn target(&self) -> String;

    /// Perform the call and evaluate the result
    async fn check(&self) -> Result<(), ProbeError>;
}
