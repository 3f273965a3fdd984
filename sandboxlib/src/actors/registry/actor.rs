use super::messages::{Mutator, RegistryMessage};
use crate::error::{self, Error};
use crate::job::JobRecord;
use crate::types::JobId;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Sole owner of the job records. Messages are handled one at a time, so every
/// operation sees and leaves whole records.
pub struct Actor {
    inbox: mpsc::UnboundedReceiver<RegistryMessage>,
    records: HashMap<JobId, JobRecord>,
    submission_order: Vec<JobId>,
}

impl Actor {
    pub fn spawn(inbox: mpsc::UnboundedReceiver<RegistryMessage>) {
        let actor = Self {
            inbox,
            records: HashMap::new(),
            submission_order: Vec::new(),
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        use RegistryMessage::*;
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                Create { job_id, response } => {
                    let _ = response.send(self.create(job_id));
                }
                Get { job_id, response } => {
                    let record = self.records.get(&job_id).cloned();
                    let _ = response.send(record.ok_or(Error::NotFound));
                }
                Update {
                    job_id,
                    mutator,
                    response,
                } => {
                    let result = self.update(job_id, mutator);
                    if let Some(response) = response {
                        let _ = response.send(result);
                    }
                }
                List { response } => {
                    let records = self
                        .submission_order
                        .iter()
                        .filter_map(|job_id| self.records.get(job_id))
                        .cloned()
                        .collect();
                    let _ = response.send(records);
                }
            }
        }
    }

    fn create(&mut self, job_id: JobId) -> error::Result<()> {
        if self.records.contains_key(&job_id) {
            return Err(Error::AlreadyExists);
        }
        self.records.insert(job_id, JobRecord::new(job_id));
        self.submission_order.push(job_id);
        Ok(())
    }

    fn update(&mut self, job_id: JobId, mutator: Mutator) -> error::Result<JobRecord> {
        let record = self.records.get_mut(&job_id).ok_or(Error::NotFound)?;
        mutator(record);
        Ok(record.clone())
    }
}
