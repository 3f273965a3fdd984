mod actor;
mod messages;

use self::{actor::Actor, messages::RegistryMessage};
use crate::error::{self, Error};
use crate::job::JobRecord;
use crate::types::JobId;
use tokio::sync::{mpsc, oneshot};

/// The job registry: every job's record, keyed by id.
///
/// Like the orchestrator this is an actor handle. Records live inside the actor
/// task and are only ever changed there, so readers get consistent snapshots and
/// updates are atomic without any lock. Clone it freely.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::UnboundedSender<RegistryMessage>,
}

impl RegistryHandle {
    pub fn spawn() -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        Actor::spawn(inbox);
        Self { sender }
    }

    /// Insert a new pending record.
    pub async fn create(&self, job_id: JobId) -> error::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(RegistryMessage::Create {
            job_id,
            response: tx,
        })?;
        rx.await.map_err(|_| Error::Shutdown("JobRegistry"))?
    }

    pub async fn get(&self, job_id: JobId) -> error::Result<JobRecord> {
        let (tx, rx) = oneshot::channel();
        self.send(RegistryMessage::Get {
            job_id,
            response: tx,
        })?;
        rx.await.map_err(|_| Error::Shutdown("JobRegistry"))?
    }

    /// Apply `mutator` to a record atomically and return the result.
    pub async fn update<F>(&self, job_id: JobId, mutator: F) -> error::Result<JobRecord>
    where
        F: FnOnce(&mut JobRecord) + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.send(RegistryMessage::Update {
            job_id,
            mutator: Box::new(mutator),
            response: Some(tx),
        })?;
        rx.await.map_err(|_| Error::Shutdown("JobRegistry"))?
    }

    /// Like `update`, without waiting for it to be applied.
    ///
    /// Updates posted from one task are still applied in the order they were posted.
    pub fn post<F>(&self, job_id: JobId, mutator: F)
    where
        F: FnOnce(&mut JobRecord) + Send + 'static,
    {
        let _ = self.send(RegistryMessage::Update {
            job_id,
            mutator: Box::new(mutator),
            response: None,
        });
    }

    /// All records in submission order.
    pub async fn list(&self) -> error::Result<Vec<JobRecord>> {
        let (tx, rx) = oneshot::channel();
        self.send(RegistryMessage::List { response: tx })?;
        rx.await.map_err(|_| Error::Shutdown("JobRegistry"))
    }

    fn send(&self, msg: RegistryMessage) -> error::Result<()> {
        self.sender
            .send(msg)
            .map_err(|_| Error::Shutdown("JobRegistry"))
    }
}
