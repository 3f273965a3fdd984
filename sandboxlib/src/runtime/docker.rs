use super::{Execution, LaunchSpec, Runtime};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Where the workspace is mounted inside the container.
pub const MOUNT_POINT: &str = "/job";

/// Runs jobs in detached containers through the docker CLI.
#[derive(Clone, Debug)]
pub struct DockerRuntime {
    binary: PathBuf,
    image: String,
}

impl DockerRuntime {
    pub fn new(binary: impl Into<PathBuf>, image: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            image: image.into(),
        }
    }

    fn run_args(&self, spec: &LaunchSpec) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--detach".to_string(),
            format!("--label=sandbox.job={}", spec.job_id),
            format!("--volume={}:{}:rw", spec.workspace.display(), MOUNT_POINT),
            format!("--workdir={}", MOUNT_POINT),
        ];
        for (key, value) in &spec.envs {
            args.push(format!("--env={}={}", key, value));
        }
        args.push(self.image.clone());
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(spec.command_line());
        args
    }
}

#[async_trait]
impl Runtime for DockerRuntime {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn Execution>> {
        let container_id = docker(&self.binary, self.run_args(spec)).await?;
        if container_id.is_empty() {
            return Err(Error::Runtime("docker run printed no container id".into()));
        }
        tracing::info!(job_id = %spec.job_id, container = %container_id, image = %self.image, "started container");
        Ok(Box::new(Container {
            binary: self.binary.clone(),
            id: container_id,
        }))
    }
}

struct Container {
    binary: PathBuf,
    id: String,
}

#[async_trait]
impl Execution for Container {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn has_exited(&mut self) -> Result<bool> {
        let state = docker(
            &self.binary,
            ["inspect", "--format={{.State.Status}}", self.id.as_str()],
        )
        .await?;
        Ok(matches!(state.as_str(), "exited" | "dead"))
    }

    async fn wait(&mut self) -> Result<i32> {
        let code = docker(&self.binary, ["wait", self.id.as_str()]).await?;
        code.parse()
            .map_err(|_| Error::Runtime(format!("unexpected exit status {:?}", code)))
    }

    async fn kill(&mut self) -> Result<()> {
        docker(&self.binary, ["kill", self.id.as_str()]).await.map(|_| ())
    }

    async fn remove(&mut self) -> Result<()> {
        docker(&self.binary, ["rm", "--force", self.id.as_str()])
            .await
            .map(|_| ())
    }
}

/// Run one docker command and return its trimmed stdout.
async fn docker<I, S>(binary: &Path, args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|err| Error::Runtime(format!("failed to run {}: {}", binary.display(), err)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Runtime(stderr.trim().to_string()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
