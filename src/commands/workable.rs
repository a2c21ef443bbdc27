//! Workable command - verify a running kwokctl cluster end to end

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::VerifyConfig;
use crate::environment::{Environment, Runtime};
use crate::exec::ProcessRunner;
use crate::http::ReqwestHttpClient;
use crate::workflow::{workable_workflow, FailurePolicy, Workflow};
use crate::{Error, Result};

/// Run the workable checks against a cluster
#[derive(Args, Debug)]
pub struct WorkableArgs {
    /// Cluster name as given to `kwokctl create cluster --name`
    #[arg(long, env = "KWOK_E2E_CLUSTER_NAME")]
    pub name: String,

    /// Runtime the cluster was created with
    #[arg(long, env = "KWOK_E2E_RUNTIME", default_value = "binary")]
    pub runtime: Runtime,

    /// Path to the kwokctl binary
    #[arg(long, env = "KWOK_E2E_KWOKCTL")]
    pub kwokctl: Option<String>,

    /// Path to the kubectl binary
    #[arg(long, env = "KWOK_E2E_KUBECTL")]
    pub kubectl: Option<String>,

    /// Run every check and report all failures instead of stopping at the first
    #[arg(long)]
    pub keep_going: bool,

    /// Attempt budget for checks that wait on convergence
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Delay between attempts, in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Give up on the whole run after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Directory the exported kubeconfig is written to
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Write the step report as JSON to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl WorkableArgs {
    /// Apply flag overrides on top of the loaded configuration
    pub fn apply(&self, mut config: VerifyConfig) -> Result<VerifyConfig> {
        if let Some(ref kwokctl) = self.kwokctl {
            config.tools.kwokctl = kwokctl.clone();
        }
        if let Some(ref kubectl) = self.kubectl {
            config.tools.kubectl = kubectl.clone();
        }
        if let Some(attempts) = self.attempts {
            config.retry.max_attempts = attempts;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.retry.delay = Duration::from_millis(delay_ms);
        }
        if let Some(ref dir) = self.output_dir {
            config.fixtures.output_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }

    fn failure_policy(&self) -> FailurePolicy {
        if self.keep_going {
            FailurePolicy::RunAll
        } else {
            FailurePolicy::FailFast
        }
    }
}

/// Run the workable command
pub async fn run(args: WorkableArgs, config: VerifyConfig, cancel: CancellationToken) -> Result<()> {
    let config = args.apply(config)?;
    let env = Environment::detect(args.runtime);
    let runner = Arc::new(ProcessRunner::new(config.timeouts.command));
    let http = Arc::new(ReqwestHttpClient::new(
        config.timeouts.http,
        config.endpoints.insecure_skip_tls_verify,
    )?);
    let workflow = workable_workflow(&config, &args.name, runner, http, args.failure_policy());

    info!(cluster = %args.name, environment = %env, "Verifying cluster is workable");
    run_workflow(
        &workflow,
        &env,
        args.timeout.map(Duration::from_secs),
        args.report.as_deref(),
        cancel,
    )
    .await
}

/// Run `workflow` under an optional deadline, then log and optionally save
/// the report. The report is written even when the run was cancelled.
pub async fn run_workflow(
    workflow: &Workflow,
    env: &Environment,
    timeout: Option<Duration>,
    report_path: Option<&Path>,
    cancel: CancellationToken,
) -> Result<()> {
    let cancel = cancel.child_token();
    if let Some(timeout) = timeout {
        let deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = deadline.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    warn!(timeout_secs = timeout.as_secs(), "workable run exceeded its deadline, cancelling");
                    deadline.cancel();
                }
            }
        });
    }

    let report = workflow.run(env, &cancel).await;
    cancel.cancel();

    report.log_summary();
    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        tokio::fs::write(path, json).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to write report {}: {}", path.display(), e),
            ))
        })?;
    }

    report.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::OsFamily;
    use crate::exec::{CommandOutput, MockCommandRunner};
    use crate::http::MockHttpClient;
    use crate::workflow::workable::steps;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: WorkableArgs,
    }

    fn parse(argv: &[&str]) -> WorkableArgs {
        Harness::parse_from(std::iter::once("kwok-e2e").chain(argv.iter().copied())).args
    }

    #[test]
    fn flags_override_config() {
        let args = parse(&[
            "--name",
            "e2e",
            "--runtime",
            "kind-podman",
            "--kwokctl",
            "./bin/kwokctl",
            "--attempts",
            "10",
            "--delay-ms",
            "50",
            "--keep-going",
        ]);
        assert_eq!(args.runtime, Runtime::KindPodman);
        assert_eq!(args.failure_policy(), FailurePolicy::RunAll);

        let config = args.apply(VerifyConfig::default()).unwrap();
        assert_eq!(config.tools.kwokctl, "./bin/kwokctl");
        assert_eq!(config.tools.kubectl, "kubectl");
        assert_eq!(config.retry.max_attempts, 10);
        assert_eq!(config.retry.delay, Duration::from_millis(50));
    }

    #[test]
    fn zero_attempts_flag_is_rejected() {
        let args = parse(&["--name", "e2e", "--attempts", "0"]);
        assert!(matches!(
            args.apply(VerifyConfig::default()),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn unknown_runtime_fails_to_parse() {
        let result = Harness::try_parse_from(["kwok-e2e", "--name", "e2e", "--runtime", "k3d"]);
        assert!(result.is_err());
    }

    /// Cluster whose pods never leave Pending
    fn stuck_cluster() -> MockCommandRunner {
        let mut runner = MockCommandRunner::new();
        runner.expect_output().returning(|_, args| {
            if args.first().map(String::as_str) == Some("config") {
                return Ok(CommandOutput::stdout("kwok-e2e\n"));
            }
            if args.iter().any(|a| a == "scale") {
                return Ok(CommandOutput::default());
            }
            Ok(CommandOutput::stdout(
                "NAME       READY   STATUS    RESTARTS   AGE\nfake-pod   0/1     Pending   0          1s\n",
            ))
        });
        runner
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_run_and_still_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let report_path = dir.path().join("report.json");
        let mut config = VerifyConfig::default();
        config.fixtures.output_dir = dir.path().to_path_buf();
        let workflow = workable_workflow(
            &config,
            "e2e",
            Arc::new(stuck_cluster()),
            Arc::new(MockHttpClient::new()),
            FailurePolicy::FailFast,
        );
        let env = Environment::new(OsFamily::Linux, Runtime::Binary);

        let start = tokio::time::Instant::now();
        let err = run_workflow(
            &workflow,
            &env,
            Some(Duration::from_secs(5)),
            Some(&report_path),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(err.is_cancelled(), "{err}");
        assert!(start.elapsed() < Duration::from_secs(6));

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
        let results = report["results"].as_array().unwrap();
        let last = results.last().unwrap();
        assert_eq!(last["name"], steps::POD_RUNNING);
        assert_eq!(last["status"], "failed");
        assert_eq!(results[0]["status"], "passed");
        assert_eq!(report["environment"]["runtime"], "binary");
    }

    #[tokio::test(start_paused = true)]
    async fn outer_cancellation_reaches_the_run() {
        let workflow = workable_workflow(
            &VerifyConfig::default(),
            "e2e",
            Arc::new(stuck_cluster()),
            Arc::new(MockHttpClient::new()),
            FailurePolicy::RunAll,
        );
        let env = Environment::new(OsFamily::Linux, Runtime::Binary);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let err = run_workflow(&workflow, &env, None, None, cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn defaults_to_binary_runtime_and_fail_fast() {
        let args = parse(&["--name", "e2e"]);
        assert_eq!(args.runtime, Runtime::Binary);
        assert_eq!(args.failure_policy(), FailurePolicy::FailFast);
    }
}
