//! Facts about where a verification run executes.
//!
//! The workable plan skips steps that cannot work in a given environment:
//! kind-backed runtimes do not expose the scheduler, controller-manager and
//! etcd ports, and the etcdctl lookup is unavailable on Windows.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Operating system family of the machine running the checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    /// Linux
    Linux,
    /// macOS
    Macos,
    /// Windows
    Windows,
    /// Anything else
    Other,
}

impl OsFamily {
    /// Family of the current build target
    pub fn current() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` style name to a family
    pub fn from_os_name(name: &str) -> Self {
        match name {
            "linux" => OsFamily::Linux,
            "macos" => OsFamily::Macos,
            "windows" => OsFamily::Windows,
            _ => OsFamily::Other,
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OsFamily::Linux => "linux",
            OsFamily::Macos => "macos",
            OsFamily::Windows => "windows",
            OsFamily::Other => "other",
        };
        f.write_str(s)
    }
}

impl FromStr for OsFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(OsFamily::Linux),
            "macos" | "darwin" => Ok(OsFamily::Macos),
            "windows" => Ok(OsFamily::Windows),
            "other" => Ok(OsFamily::Other),
            other => Err(Error::validation(format!("unknown os family: {other}"))),
        }
    }
}

/// kwokctl runtime the cluster was created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Runtime {
    /// Components run as local binaries
    Binary,
    /// Components run in docker containers
    Docker,
    /// Components run in podman containers
    Podman,
    /// Components run in nerdctl containers
    Nerdctl,
    /// Components run inside a lima VM
    Lima,
    /// Components run inside finch
    Finch,
    /// Control plane runs inside a kind node on docker
    Kind,
    /// Control plane runs inside a kind node on podman
    KindPodman,
}

impl Runtime {
    /// Every runtime kwokctl knows about
    pub const ALL: [Runtime; 8] = [
        Runtime::Binary,
        Runtime::Docker,
        Runtime::Podman,
        Runtime::Nerdctl,
        Runtime::Lima,
        Runtime::Finch,
        Runtime::Kind,
        Runtime::KindPodman,
    ];

    /// Name as accepted by `kwokctl create cluster --runtime`
    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Binary => "binary",
            Runtime::Docker => "docker",
            Runtime::Podman => "podman",
            Runtime::Nerdctl => "nerdctl",
            Runtime::Lima => "lima",
            Runtime::Finch => "finch",
            Runtime::Kind => "kind",
            Runtime::KindPodman => "kind-podman",
        }
    }

    /// Whether control-plane components are hidden inside a kind node.
    ///
    /// In this topology the scheduler, controller-manager and etcd are not
    /// published on host ports.
    pub fn is_thin(&self) -> bool {
        matches!(self, Runtime::Kind | Runtime::KindPodman)
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Runtime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Runtime::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| Error::validation(format!("unknown cluster runtime: {s}")))
    }
}

/// Read-only descriptor used to decide which steps apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Environment {
    /// Operating system family
    pub os: OsFamily,
    /// Cluster runtime flavor
    pub runtime: Runtime,
}

impl Environment {
    /// Create a descriptor for an explicit OS and runtime
    pub fn new(os: OsFamily, runtime: Runtime) -> Self {
        Self { os, runtime }
    }

    /// Descriptor for the current machine
    pub fn detect(runtime: Runtime) -> Self {
        Self::new(OsFamily::current(), runtime)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "os={} runtime={}", self.os, self.runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_names_roundtrip() {
        for runtime in Runtime::ALL {
            assert_eq!(runtime.as_str().parse::<Runtime>().unwrap(), runtime);
        }
    }

    #[test]
    fn only_kind_runtimes_are_thin() {
        let thin: Vec<_> = Runtime::ALL.into_iter().filter(Runtime::is_thin).collect();
        assert_eq!(thin, vec![Runtime::Kind, Runtime::KindPodman]);
    }

    #[test]
    fn unknown_runtime_is_validation_error() {
        let err = "kind_podman".parse::<Runtime>().unwrap_err();
        assert!(err.to_string().contains("unknown cluster runtime"));
    }

    #[test]
    fn os_family_from_target_names() {
        assert_eq!(OsFamily::from_os_name("linux"), OsFamily::Linux);
        assert_eq!(OsFamily::from_os_name("windows"), OsFamily::Windows);
        assert_eq!(OsFamily::from_os_name("freebsd"), OsFamily::Other);
        assert_eq!("Darwin".parse::<OsFamily>().unwrap(), OsFamily::Macos);
    }

    #[test]
    fn environment_display() {
        let env = Environment::new(OsFamily::Linux, Runtime::KindPodman);
        assert_eq!(env.to_string(), "os=linux runtime=kind-podman");
    }
}
