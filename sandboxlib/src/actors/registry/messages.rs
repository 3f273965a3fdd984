use crate::error;
use crate::job::JobRecord;
use crate::types::JobId;
use tokio::sync::oneshot;

pub type Mutator = Box<dyn FnOnce(&mut JobRecord) + Send>;

pub enum RegistryMessage {
    Create {
        job_id: JobId,
        response: oneshot::Sender<error::Result<()>>,
    },
    Get {
        job_id: JobId,
        response: oneshot::Sender<error::Result<JobRecord>>,
    },
    Update {
        job_id: JobId,
        mutator: Mutator,
        response: Option<oneshot::Sender<error::Result<JobRecord>>>,
    },
    List {
        response: oneshot::Sender<Vec<JobRecord>>,
    },
}
