//! Plan command - show which workable checks apply to an environment

use std::sync::Arc;

use async_trait::async_trait;
use clap::Args;

use crate::config::VerifyConfig;
use crate::environment::{Environment, OsFamily, Runtime};
use crate::error::ProbeError;
use crate::exec::{CommandOutput, CommandRunner};
use crate::http::{HttpClient, HttpResponse};
use crate::workflow::{workable_workflow, FailurePolicy, PlannedStep};
use crate::Result;

/// Show which checks would run, without running them
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Cluster name used to render command lines
    #[arg(long, env = "KWOK_E2E_CLUSTER_NAME", default_value = "kwok")]
    pub name: String,

    /// Runtime to plan for
    #[arg(long, env = "KWOK_E2E_RUNTIME", default_value = "binary")]
    pub runtime: Runtime,

    /// OS family to plan for (defaults to the current host)
    #[arg(long)]
    pub os: Option<OsFamily>,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the plan command
pub fn run(args: PlanArgs, config: VerifyConfig) -> Result<()> {
    let env = Environment::new(args.os.unwrap_or_else(OsFamily::current), args.runtime);
    let seams = Arc::new(DryRun);
    let plan = workable_workflow(
        &config,
        &args.name,
        seams.clone(),
        seams,
        FailurePolicy::FailFast,
    )
    .plan(&env);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", render(&env, &plan));
    }
    Ok(())
}

/// Stands in for the command and HTTP seams when nothing may be invoked
struct DryRun;

#[async_trait]
impl CommandRunner for DryRun {
    async fn output(&self, program: &str, _args: &[String]) -> std::result::Result<CommandOutput, ProbeError> {
        Err(ProbeError::invocation(format!("dry run: {program} not executed")))
    }
}

#[async_trait]
impl HttpClient for DryRun {
    async fn get(&self, url: &str) -> std::result::Result<HttpResponse, ProbeError> {
        Err(ProbeError::invocation(format!("dry run: GET {url} not sent")))
    }
}

fn render(env: &Environment, plan: &[PlannedStep]) -> String {
    let mut out = format!("Plan for {}\n", env);
    for step in plan {
        let mark = if step.included { "run " } else { "skip" };
        let attempts = if step.max_attempts > 1 {
            format!(" (up to {} attempts)", step.max_attempts)
        } else {
            String::new()
        };
        out.push_str(&format!(
            "  {}  {:32} {}{}\n",
            mark, step.name, step.target, attempts
        ));
    }
    out
}
