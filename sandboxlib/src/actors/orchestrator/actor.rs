use super::messages::OrchestratorMessage;
use crate::actors::registry::RegistryHandle;
use crate::actors::worker::{JobPipeline, WorkerHandle};
use crate::error::{self, Error};
use crate::types::{JobId, Script};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Orchestrator {
    inbox: mpsc::Receiver<OrchestratorMessage>,
    registry: RegistryHandle,
    pipeline: Arc<JobPipeline>,
    workers: HashMap<JobId, WorkerHandle>,
    shutting_down: bool,
}

impl Orchestrator {
    pub fn spawn(
        inbox: mpsc::Receiver<OrchestratorMessage>,
        registry: RegistryHandle,
        pipeline: Arc<JobPipeline>,
    ) {
        let actor = Self {
            inbox,
            registry,
            pipeline,
            workers: HashMap::new(),
            shutting_down: false,
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        use self::OrchestratorMessage::*;
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                Submit { script, response } => {
                    let _ = response.send(self.submit(script).await);
                }
                Cancel { job_id, response } => {
                    let _ = response.send(self.cancel(job_id).await);
                }
                Shutdown { response } => {
                    self.shutdown().await;
                    let _ = response.send(());
                }
            }
        }
        // every handle is gone, nobody can observe the jobs any more
        self.shutdown().await;
    }

    async fn submit(&mut self, script: Script) -> error::Result<JobId> {
        if self.shutting_down {
            return Err(Error::Shutdown("Orchestrator"));
        }
        self.workers.retain(|_, worker| !worker.is_finished());

        let job_id = uuid::Uuid::new_v4();
        // the record must exist before anyone learns the id
        self.registry.create(job_id).await?;
        tracing::info!(job_id = %job_id, bytes = script.len(), "job submitted");

        let worker = WorkerHandle::spawn(
            self.pipeline.clone(),
            self.registry.clone(),
            job_id,
            script,
        );
        self.workers.insert(job_id, worker);
        Ok(job_id)
    }

    async fn cancel(&mut self, job_id: JobId) -> error::Result<()> {
        let record = self.registry.get(job_id).await?;
        if record.status.is_terminal() {
            return Err(Error::AlreadyFinished);
        }
        match self.workers.get_mut(&job_id) {
            Some(worker) => worker.cancel(),
            None => Err(Error::AlreadyFinished),
        }
    }

    async fn shutdown(&mut self) {
        self.shutting_down = true;
        let mut workers: Vec<_> = self.workers.drain().map(|(_, worker)| worker).collect();
        if !workers.is_empty() {
            tracing::info!(jobs = workers.len(), "cancelling live jobs");
        }
        for worker in &mut workers {
            let _ = worker.cancel();
        }
        for worker in workers {
            worker.join().await;
        }
    }
}
