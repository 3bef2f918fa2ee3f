use crate::pipeline::Stage;
use thiserror::Error;
use wordvec_protocol::ErrorKind;
use wordvec_store::StoreError;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Input does not follow the `<count> <dim>` / `<word> <f1> … <fN>` layout.
    #[error("line {line}: {message}")]
    Format { line: u64, message: String },

    #[error("no model given and the source has no name to derive one from")]
    MissingModelName,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub(crate) fn format(line: u64, message: impl Into<String>) -> Self {
        Self::Format {
            line,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Format { .. } | Self::MissingModelName => ErrorKind::BadRequest,
            Self::Store(err) => err.kind(),
            Self::Io(_) => ErrorKind::BadRequest,
        }
    }
}

/// A run that stopped early. Batches flushed before the failure stay committed.
#[derive(Error, Debug)]
#[error("ingestion aborted while {stage} after {flushed} vectors: {cause}")]
pub struct IngestAborted {
    pub stage: Stage,
    pub flushed: u64,
    #[source]
    pub cause: IngestError,
}

impl IngestAborted {
    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }
}
