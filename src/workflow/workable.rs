//! The "is this kwok cluster workable" plan.
//!
//! Order matters: fake nodes must exist before fake pods can be scheduled,
//! and the kubeconfig must be exported before it is used. Components that
//! settle asynchronously (scaling, pod status, scrape targets, tracing) are
//! retried; facts that are immediately consistent are checked once.

use std::sync::Arc;

use super::{FailurePolicy, Step, StepFilter, Workflow};
use crate::config::VerifyConfig;
use crate::environment::OsFamily;
use crate::exec::CommandRunner;
use crate::http::HttpClient;
use crate::probe::{
    BodyPredicate, CommandProbe, HttpProbe, KubeconfigExportProbe, ScaleKind,
};

/// Step names, in plan order
pub mod steps {
    /// Active kubectl context points at the cluster
    pub const CURRENT_CONTEXT: &str = "current-context";
    /// Fake node scaled up
    pub const SCALE_NODE: &str = "scale-node";
    /// Fake pod scaled up
    pub const SCALE_POD: &str = "scale-pod";
    /// A pod reports Running through kwokctl
    pub const POD_RUNNING: &str = "pod-running";
    /// Admin kubeconfig written to disk
    pub const KUBECONFIG_EXPORT: &str = "kubeconfig-export";
    /// The exported kubeconfig works with plain kubectl
    pub const KUBECONFIG_ACCESS: &str = "kubeconfig-access";
    /// kube-controller-manager healthz
    pub const KUBE_CONTROLLER_MANAGER: &str = "kube-controller-manager-health";
    /// kube-scheduler healthz
    pub const KUBE_SCHEDULER: &str = "kube-scheduler-health";
    /// etcd health
    pub const ETCD_HEALTH: &str = "etcd-health";
    /// etcd key lookup through kwokctl etcdctl
    pub const ETCDCTL_GET: &str = "etcdctl-get";
    /// Prometheus sees enough healthy targets
    pub const PROMETHEUS_TARGETS: &str = "prometheus-targets";
    /// Jaeger answers its services API
    pub const JAEGER_SERVICES: &str = "jaeger-services";
    /// kwok-controller healthz
    pub const KWOK_CONTROLLER: &str = "kwok-controller-health";
}

/// Build the ordered steps verifying `cluster_name`
pub fn workable_plan(
    config: &VerifyConfig,
    cluster_name: &str,
    runner: Arc<dyn CommandRunner>,
    http: Arc<dyn HttpClient>,
) -> Vec<Step> {
    let retry = config.retry;
    let tools = &config.tools;
    let fixtures = &config.fixtures;
    let endpoints = &config.endpoints;
    let kubeconfig = fixtures.kubeconfig_path(cluster_name);

    vec![
        Step::once(
            steps::CURRENT_CONTEXT,
            CommandProbe::current_context(runner.clone(), &tools.kubectl, cluster_name),
        ),
        Step::retried(
            steps::SCALE_NODE,
            CommandProbe::scale(
                runner.clone(),
                &tools.kwokctl,
                cluster_name,
                ScaleKind::Node,
                &fixtures.node_name,
                fixtures.replicas,
            ),
            retry,
        ),
        Step::retried(
            steps::SCALE_POD,
            CommandProbe::scale(
                runner.clone(),
                &tools.kwokctl,
                cluster_name,
                ScaleKind::Pod,
                &fixtures.pod_name,
                fixtures.replicas,
            ),
            retry,
        ),
        Step::retried(
            steps::POD_RUNNING,
            CommandProbe::pods_via_kwokctl(
                runner.clone(),
                &tools.kwokctl,
                cluster_name,
                &fixtures.pod_ready_marker,
            ),
            retry,
        ),
        Step::once(
            steps::KUBECONFIG_EXPORT,
            KubeconfigExportProbe::new(
                runner.clone(),
                &tools.kwokctl,
                cluster_name,
                &fixtures.kubeconfig_user,
                &fixtures.kubeconfig_group,
                kubeconfig.clone(),
            ),
        ),
        Step::retried(
            steps::KUBECONFIG_ACCESS,
            CommandProbe::pods_via_kubeconfig(
                runner.clone(),
                &tools.kubectl,
                &kubeconfig,
                &fixtures.pod_ready_marker,
            ),
            retry,
        ),
        Step::once(
            steps::KUBE_CONTROLLER_MANAGER,
            HttpProbe::healthz(http.clone(), &endpoints.kube_controller_manager),
        )
        .when(StepFilter::SkipOnThinRuntime),
        Step::once(
            steps::KUBE_SCHEDULER,
            HttpProbe::healthz(http.clone(), &endpoints.kube_scheduler),
        )
        .when(StepFilter::SkipOnThinRuntime),
        Step::once(
            steps::ETCD_HEALTH,
            HttpProbe::new(
                http.clone(),
                &endpoints.etcd,
                BodyPredicate::Contains(r#""health""#.to_string()),
            ),
        )
        .when(StepFilter::SkipOnThinRuntime),
        Step::once(
            steps::ETCDCTL_GET,
            CommandProbe::etcdctl_get(
                runner,
                &tools.kwokctl,
                cluster_name,
                &fixtures.etcd_key,
                &fixtures.etcd_expected,
            ),
        )
        .when(StepFilter::SkipOnOs(OsFamily::Windows)),
        Step::retried(
            steps::PROMETHEUS_TARGETS,
            HttpProbe::new(
                http.clone(),
                &endpoints.metrics_targets,
                BodyPredicate::MinCount {
                    needle: fixtures.healthy_target_marker.clone(),
                    min: fixtures.min_healthy_targets,
                },
            ),
            retry,
        ),
        Step::retried(
            steps::JAEGER_SERVICES,
            HttpProbe::new(
                http.clone(),
                &endpoints.tracing_services,
                BodyPredicate::StatusIs(200),
            ),
            retry,
        ),
        Step::once(
            steps::KWOK_CONTROLLER,
            HttpProbe::healthz(http, &endpoints.kwok_controller),
        ),
    ]
}

/// [`workable_plan`] wrapped in a [`Workflow`] with the given failure policy
pub fn workable_workflow(
    config: &VerifyConfig,
    cluster_name: &str,
    runner: Arc<dyn CommandRunner>,
    http: Arc<dyn HttpClient>,
    failure_policy: FailurePolicy,
) -> Workflow {
    Workflow::new(workable_plan(config, cluster_name, runner, http))
        .with_failure_policy(failure_policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Environment, Runtime};
    use crate::exec::MockCommandRunner;
    use crate::http::MockHttpClient;

    fn plan() -> Vec<Step> {
        workable_plan(
            &VerifyConfig::default(),
            "e2e",
            Arc::new(MockCommandRunner::new()),
            Arc::new(MockHttpClient::new()),
        )
    }

    #[test]
    fn steps_are_in_dependency_order() {
        let names: Vec<_> = plan().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                steps::CURRENT_CONTEXT,
                steps::SCALE_NODE,
                steps::SCALE_POD,
                steps::POD_RUNNING,
                steps::KUBECONFIG_EXPORT,
                steps::KUBECONFIG_ACCESS,
                steps::KUBE_CONTROLLER_MANAGER,
                steps::KUBE_SCHEDULER,
                steps::ETCD_HEALTH,
                steps::ETCDCTL_GET,
                steps::PROMETHEUS_TARGETS,
                steps::JAEGER_SERVICES,
                steps::KWOK_CONTROLLER,
            ]
        );
    }

    #[test]
    fn only_convergent_steps_are_retried() {
        let retried: Vec<_> = plan()
            .iter()
            .filter(|s| s.retry_policy().is_some())
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(
            retried,
            vec![
                steps::SCALE_NODE,
                steps::SCALE_POD,
                steps::POD_RUNNING,
                steps::KUBECONFIG_ACCESS,
                steps::PROMETHEUS_TARGETS,
                steps::JAEGER_SERVICES,
            ]
        );
    }

    #[test]
    fn kind_runtimes_skip_control_plane_ports() {
        let workflow = Workflow::new(plan());
        for runtime in [Runtime::Kind, Runtime::KindPodman] {
            let excluded: Vec<_> = workflow
                .plan(&Environment::new(OsFamily::Linux, runtime))
                .into_iter()
                .filter(|p| !p.included)
                .map(|p| p.name)
                .collect();
            assert_eq!(
                excluded,
                vec![
                    steps::KUBE_CONTROLLER_MANAGER,
                    steps::KUBE_SCHEDULER,
                    steps::ETCD_HEALTH,
                ]
            );
        }
    }

    #[test]
    fn windows_skips_etcdctl_only() {
        let workflow = Workflow::new(plan());
        let excluded: Vec<_> = workflow
            .plan(&Environment::new(OsFamily::Windows, Runtime::Binary))
            .into_iter()
            .filter(|p| !p.included)
            .map(|p| p.name)
            .collect();
        assert_eq!(excluded, vec![steps::ETCDCTL_GET]);
    }

    #[test]
    fn targets_use_configured_endpoints_and_tools() {
        let mut config = VerifyConfig::default();
        config.tools.kwokctl = "/opt/bin/kwokctl".to_string();
        config.endpoints.kwok_controller = "http://10.1.2.3:10247/healthz".to_string();

        let built = workable_plan(
            &config,
            "e2e",
            Arc::new(MockCommandRunner::new()),
            Arc::new(MockHttpClient::new()),
        );
        let target = |name: &str| {
            built
                .iter()
                .find(|s| s.name() == name)
                .map(|s| s.target())
                .unwrap()
        };

        assert_eq!(
            target(steps::SCALE_NODE),
            "/opt/bin/kwokctl --name e2e scale node fake-node --replicas=1"
        );
        assert_eq!(
            target(steps::KWOK_CONTROLLER),
            "http://10.1.2.3:10247/healthz"
        );
        assert_eq!(
            target(steps::KUBECONFIG_ACCESS),
            "kubectl --kubeconfig ./e2e.kubeconfig get pod"
        );
    }
}
