use futures::Stream;
use protobuf::sandbox_jobs_server::SandboxJobs;
use protobuf::{
    CancelRequest, CancelResponse, DownloadRequest, DownloadResponse, JobState, ListRequest,
    ListResponse, StatusRequest, StatusResponse, SubmitRequest, SubmitResponse,
};
use sandboxlib::error::Error;
use sandboxlib::types::JobId;
use sandboxlib::{JobRecord, JobStatus, Orchestrator};
use std::pin::Pin;
use tonic::{Request, Response, Status};
use uuid::Uuid;

/// Archives are streamed to clients in chunks of this size.
const CHUNK_SIZE: usize = 64 * 1024;

pub struct SandboxJobsService {
    orchestrator: Orchestrator,
}

impl SandboxJobsService {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

/// Ids that don't parse can't name a job, so they are reported like any other unknown id.
fn parse_job_id(job_id: &str) -> Result<JobId, Status> {
    Uuid::parse_str(job_id).map_err(|_| to_status(Error::NotFound))
}

fn to_status(err: Error) -> Status {
    match err {
        Error::NotFound => Status::not_found("Job not found"),
        Error::NotCompleted => Status::failed_precondition("Job not completed yet"),
        Error::AlreadyFinished => Status::failed_precondition(err.to_string()),
        Error::Shutdown(_) => Status::unavailable(err.to_string()),
        err => Status::internal(err.to_string()),
    }
}

fn status_response(record: JobRecord) -> StatusResponse {
    let mut response = StatusResponse {
        job_id: record.id.to_string(),
        progress: record.progress,
        download_locator: format!("/download/{}", record.id),
        ..StatusResponse::default()
    };
    let state = match record.status {
        JobStatus::Pending => JobState::Pending,
        JobStatus::Running => JobState::Running,
        JobStatus::Completed { exit_code, .. } => {
            response.exit_code = exit_code;
            JobState::Completed
        }
        JobStatus::Failed { reason } => {
            response.reason = reason;
            JobState::Failed
        }
        JobStatus::Cancelled => JobState::Cancelled,
    };
    response.set_state(state);
    response
}

#[tonic::async_trait]
impl SandboxJobs for SandboxJobsService {
    type DownloadStream = Pin<Box<dyn Stream<Item = Result<DownloadResponse, Status>> + Send>>;

    async fn submit_job(
        &self,
        req: Request<SubmitRequest>,
    ) -> Result<Response<SubmitResponse>, Status> {
        let SubmitRequest { script } = req.into_inner();
        let job_id = self
            .orchestrator
            .submit(script)
            .await
            .map_err(to_status)?;
        Ok(Response::new(SubmitResponse {
            job_id: job_id.to_string(),
        }))
    }

    async fn query_status(
        &self,
        req: Request<StatusRequest>,
    ) -> Result<Response<StatusResponse>, Status> {
        let job_id = parse_job_id(&req.get_ref().job_id)?;
        let record = self
            .orchestrator
            .status(job_id)
            .await
            .map_err(to_status)?;
        Ok(Response::new(status_response(record)))
    }

    async fn download(
        &self,
        req: Request<DownloadRequest>,
    ) -> Result<Response<Self::DownloadStream>, Status> {
        let job_id = parse_job_id(&req.get_ref().job_id)?;
        let archive = self
            .orchestrator
            .archive(job_id)
            .await
            .map_err(to_status)?;
        let data = tokio::fs::read(&archive).await.map_err(|err| {
            tracing::error!(job_id = %job_id, archive = %archive.display(), error = %err, "failed to read archive");
            Status::internal("Archive unavailable")
        })?;

        let chunks: Vec<Result<DownloadResponse, Status>> = data
            .chunks(CHUNK_SIZE)
            .map(|chunk| {
                Ok(DownloadResponse {
                    data: chunk.to_vec(),
                })
            })
            .collect();
        Ok(Response::new(
            Box::pin(tokio_stream::iter(chunks)) as Self::DownloadStream
        ))
    }

    async fn cancel_job(
        &self,
        req: Request<CancelRequest>,
    ) -> Result<Response<CancelResponse>, Status> {
        let job_id = parse_job_id(&req.get_ref().job_id)?;
        self.orchestrator
            .cancel(job_id)
            .await
            .map_err(to_status)?;
        Ok(Response::new(CancelResponse {}))
    }

    async fn list_jobs(&self, _req: Request<ListRequest>) -> Result<Response<ListResponse>, Status> {
        let records = self.orchestrator.list().await.map_err(to_status)?;
        Ok(Response::new(ListResponse {
            jobs: records.into_iter().map(status_response).collect(),
        }))
    }
}
