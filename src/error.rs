use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors returned to the caller of the writer service.
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("writer worker already started")]
    AlreadyStarted,

    #[error("writer is closed")]
    Closed,

    #[error("failed to spawn writer worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("could not connect to syslog: {0}")]
    Syslog(String),
}

pub type Result<T> = std::result::Result<T, WriterError>;

/// A failed write attempt. These never reach the producer; the worker
/// reports them to its observer and keeps going.
#[derive(Error, Debug)]
pub enum WriteFailure {
    #[error("Error writing to file: {0}")]
    Write(#[source] io::Error),

    #[error("Error writing to file: {0}")]
    Flush(#[source] io::Error),
}

impl WriteFailure {
    pub fn io_error(&self) -> &io::Error {
        match self {
            WriteFailure::Write(e) | WriteFailure::Flush(e) => e,
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            WriteFailure::Write(_) => "write",
            WriteFailure::Flush(_) => "flush",
        }
    }
}
