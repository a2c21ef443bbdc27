//! Verification workflow: an ordered list of steps run one after another.
//!
//! Each [`Step`] wraps a probe, an optional retry policy and a filter over the
//! [`Environment`]. Steps run strictly in order on the caller's task. Under
//! [`FailurePolicy::FailFast`] the first failure ends the run; under
//! [`FailurePolicy::RunAll`] every applicable step runs and the report lists
//! every failure. Cancellation always ends the run.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::environment::{Environment, OsFamily};
use crate::error::ProbeError;
use crate::probe::Probe;
use crate::retry::{retry, RetryPolicy};
use crate::{Error, Result};

pub mod workable;

pub use workable::{workable_plan, workable_workflow};

/// Decides whether a step applies to an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFilter {
    /// Runs everywhere
    Always,
    /// Skipped on kind-backed runtimes
    SkipOnThinRuntime,
    /// Skipped on the given OS family
    SkipOnOs(OsFamily),
}

impl StepFilter {
    /// Whether a step with this filter runs in `env`
    pub fn applies(&self, env: &Environment) -> bool {
        match self {
            StepFilter::Always => true,
            StepFilter::SkipOnThinRuntime => !env.runtime.is_thin(),
            StepFilter::SkipOnOs(os) => env.os != *os,
        }
    }
}

/// One named probe in the workflow
pub struct Step {
    name: String,
    probe: Box<dyn Probe>,
    retry: Option<RetryPolicy>,
    filter: StepFilter,
}

impl Step {
    /// Step whose probe runs exactly once
    pub fn once(name: impl Into<String>, probe: impl Probe + 'static) -> Self {
        Self {
            name: name.into(),
            probe: Box::new(probe),
            retry: None,
            filter: StepFilter::Always,
        }
    }

    /// Step whose probe is retried under `policy` until it converges
    pub fn retried(name: impl Into<String>, probe: impl Probe + 'static, policy: RetryPolicy) -> Self {
        Self {
            retry: Some(policy),
            ..Self::once(name, probe)
        }
    }

    /// Restrict the step to environments accepted by `filter`
    pub fn when(mut self, filter: StepFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Step name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL or command line the probe talks to
    pub fn target(&self) -> String {
        self.probe.target()
    }

    /// Retry policy, `None` for single-shot steps
    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry.as_ref()
    }

    /// Run the probe, under the retrier if the step has a policy
    pub async fn execute(&self, cancel: &CancellationToken) -> Result<()> {
        match &self.retry {
            Some(policy) => retry(policy, &self.name, cancel, || self.probe.check()).await,
            None => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(Error::cancelled(&self.name)),
                    result = self.probe.check() => result.map_err(|e| Error::probe(&self.name, e)),
                }
            }
        }
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("target", &self.probe.target())
            .field("retry", &self.retry)
            .field("filter", &self.filter)
            .finish()
    }
}

/// What happens after a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failure
    #[default]
    FailFast,
    /// Keep going and report every failure
    RunAll,
}

/// Result of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Probe succeeded
    Passed,
    /// Probe failed or was cancelled
    Failed,
    /// Filter excluded the step
    Skipped,
}

/// Record of one step in a run
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    /// Step name
    pub name: String,
    /// Outcome
    pub status: StepStatus,
    /// Wall-clock time spent in the step
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// Rendered error for failed steps
    pub error: Option<String>,
}

/// Terminal state of a run
#[derive(Debug)]
pub enum Outcome {
    /// Every applicable step passed
    AllPassed,
    /// The named step is the first that failed
    FailedAt {
        /// Step name
        step: String,
        /// Why it failed
        cause: Error,
    },
}

impl Outcome {
    /// Whether the run passed
    pub fn is_passed(&self) -> bool {
        matches!(self, Outcome::AllPassed)
    }
}

/// Everything a run produced
#[derive(Debug, Serialize)]
pub struct Report {
    /// Environment the run was evaluated against
    pub environment: Environment,
    /// One entry per step reached, in order
    pub results: Vec<StepResult>,
    /// Terminal state
    #[serde(skip)]
    pub outcome: Outcome,
}

impl Report {
    /// Steps with the given status
    pub fn with_status(&self, status: StepStatus) -> impl Iterator<Item = &StepResult> {
        self.results.iter().filter(move |r| r.status == status)
    }

    /// Log a PASS/FAIL/SKIP table for the run
    pub fn log_summary(&self) {
        let total: Duration = self.results.iter().map(|r| r.duration).sum();

        info!("========================================");
        info!("  WORKABLE ({})", self.environment);
        info!("========================================");
        for r in &self.results {
            let tag = match r.status {
                StepStatus::Passed => "PASS",
                StepStatus::Failed => "FAIL",
                StepStatus::Skipped => "SKIP",
            };
            info!("  {tag}  {:32} {:.1}s", r.name, r.duration.as_secs_f64());
            if let Some(ref e) = r.error {
                let truncated = truncate(e, 200);
                info!("        -> {truncated}");
            }
        }
        info!("----------------------------------------");
        info!(
            "  {} passed, {} failed, {} skipped ({:.1}s total)",
            self.with_status(StepStatus::Passed).count(),
            self.with_status(StepStatus::Failed).count(),
            self.with_status(StepStatus::Skipped).count(),
            total.as_secs_f64()
        );
        info!("========================================");
    }

    /// `Ok(())` when every applicable step passed, otherwise the first failure
    pub fn into_result(self) -> Result<()> {
        match self.outcome {
            Outcome::AllPassed => Ok(()),
            Outcome::FailedAt { step, cause } => Err(Error::step_failed(step, cause)),
        }
    }
}

/// Planned step as reported by [`Workflow::plan`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    /// Step name
    pub name: String,
    /// URL or command line
    pub target: String,
    /// Attempt budget, 1 for single-shot steps
    pub max_attempts: u32,
    /// Whether the filter accepts the environment
    pub included: bool,
}

/// Ordered steps plus a failure policy
#[derive(Debug, Default)]
pub struct Workflow {
    steps: Vec<Step>,
    failure_policy: FailurePolicy,
}

impl Workflow {
    /// Workflow over `steps` with fail-fast semantics
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            failure_policy: FailurePolicy::FailFast,
        }
    }

    /// Change what happens after a failure
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Describe which steps would run in `env` without running anything
    pub fn plan(&self, env: &Environment) -> Vec<PlannedStep> {
        self.steps
            .iter()
            .map(|step| PlannedStep {
                name: step.name.clone(),
                target: step.target(),
                max_attempts: step.retry_policy().map_or(1, |p| p.max_attempts),
                included: step.filter.applies(env),
            })
            .collect()
    }

    /// Run every applicable step in order
    pub async fn run(&self, env: &Environment, cancel: &CancellationToken) -> Report {
        let mut results = Vec::with_capacity(self.steps.len());
        let mut first_failure: Option<(String, Error)> = None;

        for step in &self.steps {
            if !step.filter.applies(env) {
                info!(step = %step.name, environment = %env, "skipping step");
                results.push(StepResult {
                    name: step.name.clone(),
                    status: StepStatus::Skipped,
                    duration: Duration::ZERO,
                    error: None,
                });
                continue;
            }

            info!(step = %step.name, target = %step.target(), "running step");
            let start = Instant::now();
            let result = step.execute(cancel).await;
            let duration = start.elapsed();

            match result {
                Ok(()) => {
                    info!(step = %step.name, elapsed_ms = duration.as_millis() as u64, "step passed");
                    results.push(StepResult {
                        name: step.name.clone(),
                        status: StepStatus::Passed,
                        duration,
                        error: None,
                    });
                }
                Err(e) => {
                    report_failure(step, &e);
                    let cancelled = e.is_cancelled();
                    results.push(StepResult {
                        name: step.name.clone(),
                        status: StepStatus::Failed,
                        duration,
                        error: Some(e.to_string()),
                    });
                    if first_failure.is_none() {
                        first_failure = Some((step.name.clone(), e));
                    }
                    if cancelled || self.failure_policy == FailurePolicy::FailFast {
                        break;
                    }
                }
            }
        }

        let outcome = match first_failure {
            None => Outcome::AllPassed,
            Some((step, cause)) => Outcome::FailedAt { step, cause },
        };

        Report {
            environment: *env,
            results,
            outcome,
        }
    }
}

/// Log a failed step with the raw output that failed its predicate
fn report_failure(step: &Step, err: &Error) {
    warn!(step = %step.name, error = %err, "step failed");
    if let Some(output) = err.probe_error().and_then(ProbeError::output) {
        warn!("{}", step.target());
        warn!("{}", output);
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
