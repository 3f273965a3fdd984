use super::{Execution, LaunchSpec, Runtime};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// Runs the launcher as a child process directly inside the workspace.
///
/// There is no isolation at all; this exists for development hosts without a
/// container runtime and for tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRuntime;

#[async_trait]
impl Runtime for ProcessRuntime {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn Execution>> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(spec.command_line())
            .current_dir(&spec.workspace)
            .envs(&spec.envs)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| Error::Runtime(format!("failed to spawn launcher: {}", err)))?;
        let pid = child.id().unwrap_or_default();
        tracing::info!(job_id = %spec.job_id, pid, "started launcher process");
        Ok(Box::new(Process { child, pid }))
    }
}

struct Process {
    child: Child,
    pid: u32,
}

#[async_trait]
impl Execution for Process {
    fn id(&self) -> String {
        self.pid.to_string()
    }

    async fn has_exited(&mut self) -> Result<bool> {
        Ok(self.child.try_wait()?.is_some())
    }

    async fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait().await?;
        Ok(exit_code(status))
    }

    async fn kill(&mut self) -> Result<()> {
        self.child.start_kill()?;
        Ok(())
    }
}

/// Shell convention: a process killed by signal N reports 128 + N.
fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}
