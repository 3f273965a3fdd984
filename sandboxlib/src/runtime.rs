mod docker;
mod process;

pub use docker::DockerRuntime;
pub use process::ProcessRuntime;

use crate::error::Result;
use crate::types::{JobId, JobOptions};
use async_trait::async_trait;
use std::path::PathBuf;

/// What to start for one job.
#[derive(Clone, Debug)]
pub struct LaunchSpec {
    pub job_id: JobId,
    /// Host path of the job's workspace.
    pub workspace: PathBuf,
    pub launcher: String,
    pub log_file: String,
    pub envs: JobOptions,
}

impl LaunchSpec {
    /// Shell line run inside the environment, relative to the workspace directory.
    pub fn command_line(&self) -> String {
        format!("./{} > {} 2>&1", self.launcher, self.log_file)
    }
}

/// Something that can start an isolated execution environment.
#[async_trait]
pub trait Runtime: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn Execution>>;
}

/// A running (or finished) execution environment.
#[async_trait]
pub trait Execution: Send {
    /// Identifier used in logs, e.g. a container id or pid.
    fn id(&self) -> String;

    /// Refresh the environment's state, returning true once it has exited.
    async fn has_exited(&mut self) -> Result<bool>;

    /// Wait for the environment to exit and return its exit code.
    async fn wait(&mut self) -> Result<i32>;

    async fn kill(&mut self) -> Result<()>;

    /// Release whatever the runtime keeps around after exit.
    async fn remove(&mut self) -> Result<()> {
        Ok(())
    }
}
