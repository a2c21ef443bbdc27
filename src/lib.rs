//! kwok-e2e - workability checks for kwokctl clusters
//!
//! Verifies a running kwokctl cluster end to end: kubectl context, fake node
//! and pod scaling, kubeconfig export, and the health endpoints of every
//! control-plane component, polling each one until it converges.
//!
//! # Modules
//!
//! - [`retry`] - Fixed-delay retry with cancellation
//! - [`probe`] - Single external checks (commands, HTTP) and their predicates
//! - [`workflow`] - Ordered, environment-filtered steps and the workable plan
//! - [`environment`] - OS family and cluster runtime descriptor
//! - [`config`] - Endpoints, tool paths, fixtures and timeouts
//! - [`exec`] / [`http`] - External call seams
//! - [`commands`] - CLI subcommands

#![deny(missing_docs)]

pub mod commands;
pub mod config;
pub mod environment;
pub mod error;
pub mod exec;
pub mod http;
pub mod probe;
pub mod retry;
pub mod workflow;

pub use error::{Error, ProbeError};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::config::VerifyConfig;

/// kwok-e2e - Verify that a kwokctl cluster is workable
#[derive(Parser, Debug)]
#[command(name = "kwok-e2e")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// YAML file overriding the default endpoints, fixtures and policies
    #[arg(long, global = true, env = "KWOK_E2E_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the workable checks against a cluster
    Workable(commands::workable::WorkableArgs),
    /// Show which checks would run, without running them
    Plan(commands::plan::PlanArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let config = VerifyConfig::load_or_default(self.config.as_deref())?;
        match self.command {
            Commands::Workable(args) => commands::workable::run(args, config, cancel).await,
            Commands::Plan(args) => commands::plan::run(args, config),
        }
    }
}
