use crate::options::DEFAULT_ALLOWED_OPTIONS;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_IMAGE: &str = "ghcr.io/acts-project/ubuntu2404:53";

/// Which execution environment jobs run in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeKind {
    /// A detached container, driven through the docker CLI.
    Docker,
    /// A plain child process on the host. No isolation.
    Process,
}

/// Everything the orchestrator needs to know to run jobs.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub runtime: RuntimeKind,
    pub image: String,
    pub docker_binary: PathBuf,
    /// Launcher copied into every workspace and invoked as the job entrypoint.
    pub launcher: PathBuf,
    /// Parent directory for workspaces, the system temp dir if unset.
    pub workspace_root: Option<PathBuf>,
    /// Where finished archives are kept so they outlive their workspace.
    pub archive_dir: PathBuf,
    pub poll_interval: Duration,
    pub deadline: Option<Duration>,
    pub allowed_options: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeKind::Docker,
            image: DEFAULT_IMAGE.to_string(),
            docker_binary: PathBuf::from("docker"),
            launcher: PathBuf::from("run.sh"),
            workspace_root: None,
            archive_dir: std::env::temp_dir().join("sandbox-archives"),
            poll_interval: Duration::from_secs(1),
            deadline: None,
            allowed_options: DEFAULT_ALLOWED_OPTIONS
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}
