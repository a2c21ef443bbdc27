//! Verification settings.
//!
//! Every literal the workable check depends on lives here: the retry policy,
//! the health endpoints, the tool paths and the fixture names. Defaults match
//! what a stock `kwokctl create cluster --enable-metrics-server
//! --enable-jaeger` exposes on localhost.
//!
//! Settings resolve in this order (highest priority first):
//! 1. CLI flags (and their `KWOK_E2E_*` env fallbacks)
//! 2. The YAML file passed with `--config`
//! 3. The defaults below

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::{duration_millis, RetryPolicy};
use crate::{Error, Result};

/// Root configuration for a verification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VerifyConfig {
    /// Policy for steps that wait on convergence
    pub retry: RetryPolicy,
    /// External binaries
    pub tools: ToolPaths,
    /// Names and values the probes create or look for
    pub fixtures: Fixtures,
    /// HTTP health endpoints
    pub endpoints: Endpoints,
    /// Per-call limits
    pub timeouts: Timeouts,
}

/// Paths of the external CLIs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// kwokctl binary
    pub kwokctl: String,
    /// kubectl binary
    pub kubectl: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            kwokctl: "kwokctl".to_string(),
            kubectl: "kubectl".to_string(),
        }
    }
}

/// Resource names, credentials and expected values used by the probes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    /// Fake node scaled by the node scaling step
    pub node_name: String,
    /// Fake pod scaled by the pod scaling step
    pub pod_name: String,
    /// Replica count for both scaling steps
    pub replicas: u32,
    /// Marker that must appear in `get pod` output
    pub pod_ready_marker: String,
    /// User embedded in the exported kubeconfig
    pub kubeconfig_user: String,
    /// Group embedded in the exported kubeconfig
    pub kubeconfig_group: String,
    /// Directory the exported kubeconfig is written to
    pub output_dir: PathBuf,
    /// etcd key looked up through `kwokctl etcdctl`
    pub etcd_key: String,
    /// Fragment that must appear in the etcdctl output
    pub etcd_expected: String,
    /// Marker counted in the metrics targets response
    pub healthy_target_marker: String,
    /// Minimum number of healthy scrape targets
    pub min_healthy_targets: usize,
}

impl Default for Fixtures {
    fn default() -> Self {
        Self {
            node_name: "fake-node".to_string(),
            pod_name: "fake-pod".to_string(),
            replicas: 1,
            pod_ready_marker: "Running".to_string(),
            kubeconfig_user: "cluster-admin".to_string(),
            kubeconfig_group: "system:masters".to_string(),
            output_dir: PathBuf::from("."),
            etcd_key: "/registry/namespaces/default".to_string(),
            etcd_expected: "default".to_string(),
            healthy_target_marker: r#""health":"up""#.to_string(),
            min_healthy_targets: 6,
        }
    }
}

impl Fixtures {
    /// Where the kubeconfig for `cluster_name` is written
    pub fn kubeconfig_path(&self, cluster_name: &str) -> PathBuf {
        self.output_dir.join(format!("{cluster_name}.kubeconfig"))
    }
}

/// HTTP endpoints polled by the health steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Prometheus scrape targets
    pub metrics_targets: String,
    /// Jaeger service list
    pub tracing_services: String,
    /// kwok-controller health
    pub kwok_controller: String,
    /// etcd health
    pub etcd: String,
    /// kube-scheduler health
    pub kube_scheduler: String,
    /// kube-controller-manager health
    pub kube_controller_manager: String,
    /// Skip certificate verification for the https endpoints
    pub insecure_skip_tls_verify: bool,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            metrics_targets: "http://127.0.0.1:9090/api/v1/targets".to_string(),
            tracing_services: "http://127.0.0.1:16686/api/services".to_string(),
            kwok_controller: "http://127.0.0.1:10247/healthz".to_string(),
            etcd: "http://127.0.0.1:2400/health".to_string(),
            kube_scheduler: "https://127.0.0.1:10250/healthz".to_string(),
            kube_controller_manager: "https://127.0.0.1:10260/healthz".to_string(),
            insecure_skip_tls_verify: true,
        }
    }
}

/// Upper bounds for a single external call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Limit for one external command
    #[serde(rename = "command_timeout_ms", with = "duration_millis")]
    pub command: Duration,
    /// Limit for one HTTP request, body included
    #[serde(rename = "http_timeout_ms", with = "duration_millis")]
    pub http: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command: Duration::from_secs(30),
            http: Duration::from_secs(10),
        }
    }
}

impl VerifyConfig {
    /// Load from a YAML file; missing sections and fields keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::config(path, format!("failed to read: {e}")))?;
        let config: VerifyConfig = serde_yaml::from_str(&data)
            .map_err(|e| Error::config(path, format!("failed to parse: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        if self.fixtures.min_healthy_targets == 0 {
            return Err(Error::validation("min_healthy_targets must be at least 1"));
        }
        if self.timeouts.command.is_zero() || self.timeouts.http.is_zero() {
            return Err(Error::validation("timeouts must be greater than zero"));
        }
        Ok(())
    }
}
