mod actor;
mod messages;

use self::{actor::Orchestrator, messages::OrchestratorMessage};
use crate::actors::registry::RegistryHandle;
use crate::actors::worker::JobPipeline;
use crate::archive::ArchiveBuilder;
use crate::config::{EngineConfig, RuntimeKind};
use crate::error::{self, Error};
use crate::job::JobRecord;
use crate::options::OptionsParser;
use crate::runtime::{DockerRuntime, ProcessRuntime, Runtime};
use crate::supervisor::ExecutionSupervisor;
use crate::types::{JobId, Script};
use crate::workspace::WorkspaceManager;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// An `Orchestrator` which accepts scripts, runs each one as a job and answers queries about them.
///
/// This struct is actually an actor handle, the real work is done in the actor spawned by `OrchestratorHandle::spawn`
/// and in one worker task per job. Queries go straight to the job registry, another actor, so they never wait
/// behind a submission. The handle can be cloned freely without any extra synchronization.
#[derive(Clone)]
pub struct OrchestratorHandle {
    sender: mpsc::Sender<OrchestratorMessage>,
    registry: RegistryHandle,
}

impl OrchestratorHandle {
    /// Spawn a new orchestrator running jobs in the runtime named by `config`.
    ///
    /// Specify the capacity for the orchestrator's message queue. This limits the build-up of inbound messages.
    pub fn spawn(config: &EngineConfig, message_capacity: usize) -> Self {
        let runtime: Arc<dyn Runtime> = match config.runtime {
            RuntimeKind::Docker => Arc::new(DockerRuntime::new(
                config.docker_binary.clone(),
                config.image.clone(),
            )),
            RuntimeKind::Process => Arc::new(ProcessRuntime),
        };
        Self::with_runtime(config, runtime, message_capacity)
    }

    pub fn with_runtime(
        config: &EngineConfig,
        runtime: Arc<dyn Runtime>,
        message_capacity: usize,
    ) -> Self {
        let pipeline = JobPipeline {
            parser: OptionsParser::new(config.allowed_options.iter().cloned()),
            workspaces: WorkspaceManager::new(
                config.workspace_root.clone(),
                config.launcher.clone(),
            ),
            supervisor: ExecutionSupervisor::new(runtime, config.poll_interval, config.deadline),
            archiver: ArchiveBuilder,
            archive_dir: config.archive_dir.clone(),
        };
        let registry = RegistryHandle::spawn();
        let (sender, receiver) = mpsc::channel(message_capacity);
        Orchestrator::spawn(receiver, registry.clone(), Arc::new(pipeline));
        Self { sender, registry }
    }

    /// Submit a script. The returned id is already known to the registry.
    pub async fn submit(&self, script: impl Into<Script>) -> error::Result<JobId> {
        let (tx, rx) = oneshot::channel();
        self.send(OrchestratorMessage::Submit {
            script: script.into(),
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| Error::Shutdown("Orchestrator"))?
    }

    /// Cancel a pending or running job.
    pub async fn cancel(&self, job_id: JobId) -> error::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(OrchestratorMessage::Cancel {
            job_id,
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| Error::Shutdown("Orchestrator"))?
    }

    /// Cancel every live job and wait for their workers to finish. Later submissions are refused.
    pub async fn shutdown(&self) -> error::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(OrchestratorMessage::Shutdown { response: tx })
            .await?;
        rx.await.map_err(|_| Error::Shutdown("Orchestrator"))
    }

    pub async fn status(&self, job_id: JobId) -> error::Result<JobRecord> {
        self.registry.get(job_id).await
    }

    pub async fn list(&self) -> error::Result<Vec<JobRecord>> {
        self.registry.list().await
    }

    /// Path of a completed job's archive.
    pub async fn archive(&self, job_id: JobId) -> error::Result<PathBuf> {
        let record = self.registry.get(job_id).await?;
        record.archive().cloned().ok_or(Error::NotCompleted)
    }

    async fn send(&self, msg: OrchestratorMessage) -> error::Result<()> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| Error::Shutdown("Orchestrator"))
    }
}
