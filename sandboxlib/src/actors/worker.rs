mod actor;

use crate::actors::registry::RegistryHandle;
use crate::archive::ArchiveBuilder;
use crate::error::{self, Error};
use crate::options::OptionsParser;
use crate::supervisor::ExecutionSupervisor;
use crate::types::{JobId, Script};
use crate::workspace::WorkspaceManager;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// The stages every job goes through, shared by all workers.
pub struct JobPipeline {
    pub parser: OptionsParser,
    pub workspaces: WorkspaceManager,
    pub supervisor: ExecutionSupervisor,
    pub archiver: ArchiveBuilder,
    pub archive_dir: PathBuf,
}

impl JobPipeline {
    pub fn archive_path(&self, job_id: JobId) -> PathBuf {
        self.archive_dir.join(format!("{}.zip", job_id))
    }
}

/// Handle to the background task running one job.
pub struct WorkerHandle {
    cancel_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn spawn(
        pipeline: Arc<JobPipeline>,
        registry: RegistryHandle,
        job_id: JobId,
        script: Script,
    ) -> Self {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let job = tokio::spawn(actor::run(
                pipeline,
                registry.clone(),
                job_id,
                script,
                cancel_rx,
            ));
            // a panicking job must still end up in a terminal state
            if let Err(err) = job.await {
                tracing::error!(job_id = %job_id, error = %err, "job worker crashed");
                registry.post(job_id, move |record| {
                    record.fail(format!("worker crashed: {}", err))
                });
            }
        });
        Self {
            cancel_tx: Some(cancel_tx),
            task,
        }
    }

    /// Ask the worker to stop its execution environment.
    ///
    /// Fails with `AlreadyFinished` once the job is past execution.
    pub fn cancel(&mut self) -> error::Result<()> {
        match self.cancel_tx.take() {
            Some(cancel_tx) => cancel_tx.send(()).map_err(|_| Error::AlreadyFinished),
            None => Err(Error::AlreadyFinished),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) {
        let _ = self.task.await;
    }
}
