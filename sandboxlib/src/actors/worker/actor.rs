use super::JobPipeline;
use crate::actors::registry::RegistryHandle;
use crate::error::{self, Error};
use crate::job::JobRecord;
use crate::types::{JobId, Script};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Run one job end to end. Every failure becomes a terminal record update.
pub async fn run(
    pipeline: Arc<JobPipeline>,
    registry: RegistryHandle,
    job_id: JobId,
    script: Script,
    cancel_rx: oneshot::Receiver<()>,
) {
    let result = execute(&pipeline, &registry, job_id, &script, cancel_rx).await;
    let update = match result {
        Ok(record) => {
            tracing::info!(job_id = %job_id, exit_code = ?record.exit_code(), "job completed");
            return;
        }
        Err(Error::Cancelled) => {
            tracing::info!(job_id = %job_id, "job cancelled");
            registry.update(job_id, JobRecord::cancel).await
        }
        Err(err) => {
            tracing::error!(job_id = %job_id, error = %err, "job failed");
            let reason = err.to_string();
            registry.update(job_id, move |record| record.fail(reason)).await
        }
    };
    if let Err(err) = update {
        tracing::error!(job_id = %job_id, error = %err, "failed to record job outcome");
    }
}

async fn execute(
    pipeline: &JobPipeline,
    registry: &RegistryHandle,
    job_id: JobId,
    script: &Script,
    cancel_rx: oneshot::Receiver<()>,
) -> error::Result<JobRecord> {
    let options = pipeline.parser.parse(script);
    tracing::debug!(job_id = %job_id, ?options, "parsed job options");

    let workspace = pipeline.workspaces.stage(script).await?;

    // running only once the environment is up
    let started_registry = registry.clone();
    let on_started = move || started_registry.post(job_id, JobRecord::mark_running);
    let progress_registry = registry.clone();
    let on_progress = move |line: &str| {
        let line = line.to_string();
        progress_registry.post(job_id, move |record| record.set_progress(line));
    };
    let outcome = pipeline
        .supervisor
        .run(job_id, &workspace, &options, on_started, on_progress, cancel_rx)
        .await?;

    let archive = pipeline
        .archiver
        .build(workspace.path(), &workspace.archive_path())
        .await?;
    let archive = workspace
        .retain(&archive, &pipeline.archive_path(job_id))
        .await
        .map_err(|err| Error::Archive(err.to_string()))?;
    tracing::info!(job_id = %job_id, archive = %archive.display(), "archived workspace");
    drop(workspace);

    registry
        .update(job_id, move |record| {
            record.set_progress(outcome.progress);
            record.complete(outcome.exit_code, archive);
        })
        .await
}
