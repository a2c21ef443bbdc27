//! Probes that shell out to kwokctl and kubectl.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::predicate::OutputPredicate;
use super::Probe;
use crate::error::ProbeError;
use crate::exec::{command_line, CommandRunner};

/// Prefix kwokctl gives the kubeconfig context of every cluster it creates
pub const CONTEXT_PREFIX: &str = "kwok-";

/// Kind of fake resource scaled by `kwokctl scale`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleKind {
    /// Fake nodes
    Node,
    /// Fake pods
    Pod,
}

impl ScaleKind {
    fn as_str(&self) -> &'static str {
        match self {
            ScaleKind::Node => "node",
            ScaleKind::Pod => "pod",
        }
    }
}

/// Runs one command and judges its stdout
pub struct CommandProbe {
    runner: Arc<dyn CommandRunner>,
    program: String,
    args: Vec<String>,
    predicate: OutputPredicate,
}

impl CommandProbe {
    /// Probe running an arbitrary command
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        program: impl Into<String>,
        args: Vec<String>,
        predicate: OutputPredicate,
    ) -> Self {
        Self {
            runner,
            program: program.into(),
            args,
            predicate,
        }
    }

    /// The active kubectl context must be `kwok-<cluster_name>`
    pub fn current_context(
        runner: Arc<dyn CommandRunner>,
        kubectl: &str,
        cluster_name: &str,
    ) -> Self {
        Self::new(
            runner,
            kubectl,
            strings(&["config", "current-context"]),
            OutputPredicate::TrimmedEquals(format!("{CONTEXT_PREFIX}{cluster_name}")),
        )
    }

    /// `kwokctl scale` of a fake node or pod; exit status 0 passes
    pub fn scale(
        runner: Arc<dyn CommandRunner>,
        kwokctl: &str,
        cluster_name: &str,
        kind: ScaleKind,
        resource: &str,
        replicas: u32,
    ) -> Self {
        let mut args = strings(&["--name", cluster_name, "scale", kind.as_str(), resource]);
        args.push(format!("--replicas={replicas}"));
        Self::new(runner, kwokctl, args, OutputPredicate::Succeeded)
    }

    /// `kwokctl kubectl get pod` must list a pod carrying `marker`
    pub fn pods_via_kwokctl(
        runner: Arc<dyn CommandRunner>,
        kwokctl: &str,
        cluster_name: &str,
        marker: &str,
    ) -> Self {
        Self::new(
            runner,
            kwokctl,
            strings(&["--name", cluster_name, "kubectl", "get", "pod"]),
            OutputPredicate::Contains(marker.to_string()),
        )
    }

    /// `kubectl --kubeconfig <file> get pod` must list a pod carrying `marker`
    pub fn pods_via_kubeconfig(
        runner: Arc<dyn CommandRunner>,
        kubectl: &str,
        kubeconfig: &Path,
        marker: &str,
    ) -> Self {
        let mut args = vec!["--kubeconfig".to_string()];
        args.push(kubeconfig.display().to_string());
        args.extend(strings(&["get", "pod"]));
        Self::new(
            runner,
            kubectl,
            args,
            OutputPredicate::Contains(marker.to_string()),
        )
    }

    /// `kwokctl etcdctl get <key> --keys-only` must mention `expected`
    pub fn etcdctl_get(
        runner: Arc<dyn CommandRunner>,
        kwokctl: &str,
        cluster_name: &str,
        key: &str,
        expected: &str,
    ) -> Self {
        Self::new(
            runner,
            kwokctl,
            vec![
                format!("--name={cluster_name}"),
                "etcdctl".to_string(),
                "get".to_string(),
                key.to_string(),
                "--keys-only".to_string(),
            ],
            OutputPredicate::Contains(expected.to_string()),
        )
    }
}

#[async_trait]
impl Probe for CommandProbe {
    fn target(&self) -> String {
        command_line(&self.program, &self.args)
    }

    async fn check(&self) -> Result<(), ProbeError> {
        let output = self.runner.output(&self.program, &self.args).await?;
        self.predicate.evaluate(&output.stdout)
    }
}

/// Fetches an admin kubeconfig from kwokctl and writes it to disk.
///
/// The file is overwritten on every run and later handed back to kubectl as
/// a credential source.
pub struct KubeconfigExportProbe {
    runner: Arc<dyn CommandRunner>,
    kwokctl: String,
    args: Vec<String>,
    path: PathBuf,
}

impl KubeconfigExportProbe {
    /// Export the kubeconfig of `cluster_name` for `user` in `group` to `path`
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        kwokctl: &str,
        cluster_name: &str,
        user: &str,
        group: &str,
        path: PathBuf,
    ) -> Self {
        Self {
            runner,
            kwokctl: kwokctl.to_string(),
            args: strings(&[
                "--name",
                cluster_name,
                "get",
                "kubeconfig",
                "--user",
                user,
                "--group",
                group,
            ]),
            path,
        }
    }
}

#[async_trait]
impl Probe for KubeconfigExportProbe {
    fn target(&self) -> String {
        format!(
            "{} > {}",
            command_line(&self.kwokctl, &self.args),
            self.path.display()
        )
    }

    async fn check(&self) -> Result<(), ProbeError> {
        let output = self.runner.output(&self.kwokctl, &self.args).await?;
        if output.stdout.trim().is_empty() {
            return Err(ProbeError::unexpected(
                "kwokctl returned an empty kubeconfig",
                output.stderr,
            ));
        }

        write_kubeconfig(&self.path, output.stdout.as_bytes())
            .await
            .map_err(|e| {
                ProbeError::invocation(format!(
                    "failed to write kubeconfig {}: {e}",
                    self.path.display()
                ))
            })?;

        debug!(path = %self.path.display(), "kubeconfig written");
        Ok(())
    }
}

/// Write `contents` to `path` with mode 0644 on unix
async fn write_kubeconfig(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(path, contents).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).await?;
    }

    Ok(())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{CommandOutput, MockCommandRunner};

    #[test]
    fn scale_args_match_kwokctl_cli() {
        let probe = CommandProbe::scale(
            Arc::new(MockCommandRunner::new()),
            "kwokctl",
            "e2e",
            ScaleKind::Node,
            "fake-node",
            1,
        );
        assert_eq!(
            probe.target(),
            "kwokctl --name e2e scale node fake-node --replicas=1"
        );
    }

    #[test]
    fn etcdctl_uses_joined_name_flag() {
        let probe = CommandProbe::etcdctl_get(
            Arc::new(MockCommandRunner::new()),
            "kwokctl",
            "e2e",
            "/registry/namespaces/default",
            "default",
        );
        assert_eq!(
            probe.target(),
            "kwokctl --name=e2e etcdctl get /registry/namespaces/default --keys-only"
        );
    }

    #[tokio::test]
    async fn current_context_must_match_cluster() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .withf(|program, args| {
                program == "kubectl"
                    && args.len() == 2
                    && args[0] == "config"
                    && args[1] == "current-context"
            })
            .times(2)
            .returning(|_, _| Ok(CommandOutput::stdout("kwok-e2e\n")));
        let runner: Arc<dyn CommandRunner> = Arc::new(runner);

        let matching = CommandProbe::current_context(runner.clone(), "kubectl", "e2e");
        assert!(matching.check().await.is_ok());

        let other = CommandProbe::current_context(runner, "kubectl", "prod");
        let err = other.check().await.unwrap_err();
        assert!(err.to_string().contains("kwok-prod"));
    }

    #[tokio::test]
    async fn scale_fails_when_command_fails() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .times(1)
            .returning(|_, _| Err(ProbeError::invocation("exit status: 1")));

        let probe = CommandProbe::scale(
            Arc::new(runner),
            "kwokctl",
            "e2e",
            ScaleKind::Pod,
            "fake-pod",
            1,
        );
        assert_eq!(
            probe.check().await.unwrap_err(),
            ProbeError::invocation("exit status: 1")
        );
    }

    #[tokio::test]
    async fn pods_via_kubeconfig_passes_file_path() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .withf(|program, args| {
                program == "kubectl" && args[0] == "--kubeconfig" && args[1] == "/tmp/e2e.kubeconfig"
            })
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput::stdout(
                    "NAME         READY   STATUS    RESTARTS   AGE\nfake-pod-0   1/1     Running   0          5s\n",
                ))
            });

        let probe = CommandProbe::pods_via_kubeconfig(
            Arc::new(runner),
            "kubectl",
            Path::new("/tmp/e2e.kubeconfig"),
            "Running",
        );
        assert!(probe.check().await.is_ok());
    }

    #[tokio::test]
    async fn kubeconfig_export_writes_owner_writable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e2e.kubeconfig");

        let mut runner = MockCommandRunner::new();
        runner
            .expect_output()
            .withf(|_, args| args.contains(&"system:masters".to_string()))
            .times(2)
            .returning(|_, _| Ok(CommandOutput::stdout("apiVersion: v1\nkind: Config\n")));

        let probe = KubeconfigExportProbe::new(
            Arc::new(runner),
            "kwokctl",
            "e2e",
            "cluster-admin",
            "system:masters",
            path.clone(),
        );

        probe.check().await.unwrap();
        let first = std::fs::read(&path).unwrap();
        probe.check().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);
        assert_eq!(first, b"apiVersion: v1\nkind: Config\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o644);
        }
    }

    #[tokio::test]
    async fn empty_kubeconfig_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e2e.kubeconfig");

        let mut runner = MockCommandRunner::new();
        runner.expect_output().times(1).returning(|_, _| {
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: "cluster e2e not found".to_string(),
            })
        });

        let probe = KubeconfigExportProbe::new(
            Arc::new(runner),
            "kwokctl",
            "e2e",
            "cluster-admin",
            "system:masters",
            path.clone(),
        );
        let err = probe.check().await.unwrap_err();
        assert_eq!(err.output(), Some("cluster e2e not found"));
        assert!(!path.exists());
    }
}
