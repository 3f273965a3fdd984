use crate::types::JobId;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed { exit_code: i32, archive: PathBuf },
    Failed { reason: String },
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed { .. } | JobStatus::Failed { .. } | JobStatus::Cancelled
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed { .. } => "completed",
            JobStatus::Failed { .. } => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// A snapshot of one job as seen by the registry.
///
/// The exit code and archive only exist inside `JobStatus::Completed`, so a record
/// can never carry one without the other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    /// Last non-empty line of the job's log, empty until the job prints something.
    pub progress: String,
}

impl JobRecord {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            progress: String::new(),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            JobStatus::Completed { exit_code, .. } => Some(exit_code),
            _ => None,
        }
    }

    pub fn archive(&self) -> Option<&PathBuf> {
        match &self.status {
            JobStatus::Completed { archive, .. } => Some(archive),
            _ => None,
        }
    }

    // Transitions below are no-ops once the record is terminal.

    pub fn mark_running(&mut self) {
        if self.status == JobStatus::Pending {
            self.status = JobStatus::Running;
        }
    }

    pub fn set_progress(&mut self, line: String) {
        if !self.status.is_terminal() {
            self.progress = line;
        }
    }

    pub fn complete(&mut self, exit_code: i32, archive: PathBuf) {
        self.finish(JobStatus::Completed { exit_code, archive });
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.finish(JobStatus::Failed {
            reason: reason.into(),
        });
    }

    pub fn cancel(&mut self) {
        self.finish(JobStatus::Cancelled);
    }

    fn finish(&mut self, status: JobStatus) {
        if !self.status.is_terminal() {
            self.status = status;
        }
    }
}
