use crate::error;
use crate::types::{JobId, Script};
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum OrchestratorMessage {
    Submit {
        script: Script,
        response: oneshot::Sender<error::Result<JobId>>,
    },
    Cancel {
        job_id: JobId,
        response: oneshot::Sender<error::Result<()>>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}
