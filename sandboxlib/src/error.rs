use std::{io, result};
use thiserror;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No such job exists")]
    NotFound,
    #[error("A job with this id already exists")]
    AlreadyExists,
    #[error("Job has not completed")]
    NotCompleted,
    #[error("Job has already finished")]
    AlreadyFinished,
    #[error("failed to stage workspace: {0}")]
    Stage(#[source] io::Error),
    #[error("failed to build archive: {0}")]
    Archive(String),
    #[error("execution environment error: {0}")]
    Runtime(String),
    #[error("job exceeded its deadline")]
    TimedOut,
    #[error("job was cancelled")]
    Cancelled,
    #[error("{0} exited")]
    Shutdown(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Archive(err.to_string())
    }
}

pub type Result<T> = result::Result<T, Error>;
