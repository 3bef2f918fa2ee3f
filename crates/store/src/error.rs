use std::path::PathBuf;
use thiserror::Error;
use wordvec_codec::CodecError;
use wordvec_protocol::ErrorKind;
use wordvec_query::QueryError;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    /// Remote side reported a payload it could not unpack.
    #[error("{0}")]
    Decode(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Query(#[from] QueryError),

    /// The remote answered with a status that has no domain meaning.
    #[error("Remote returned HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Data directory {} is locked by another process", path.display())]
    Locked { path: PathBuf },

    #[error("Store data is corrupt: {0}")]
    Corrupt(String),

    #[error("Store is closed")]
    Closed,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::BadRequest(_) | Self::Query(_) => ErrorKind::BadRequest,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Conflict(_) | Self::Locked { .. } => ErrorKind::Conflict,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Codec(err) if err.is_decode() => ErrorKind::Decode,
            Self::Codec(_) => ErrorKind::BadRequest,
            Self::Transport { .. } | Self::Http(_) => ErrorKind::Transport,
            Self::Io(_) | Self::Serialization(_) | Self::Corrupt(_) | Self::Closed => {
                ErrorKind::Internal
            }
        }
    }

    /// Rebuild an error from a remote status and message.
    pub fn from_remote(status: u16, message: String) -> Self {
        match ErrorKind::from_status(status) {
            Some(ErrorKind::NotFound) => Self::NotFound(message),
            Some(ErrorKind::BadRequest) => Self::BadRequest(message),
            Some(ErrorKind::Unauthorized) => Self::Unauthorized(message),
            Some(ErrorKind::Forbidden) => Self::Forbidden(message),
            Some(ErrorKind::Conflict) => Self::Conflict(message),
            Some(ErrorKind::Decode) => Self::Decode(message),
            _ => Self::Transport {
                status,
                body: message,
            },
        }
    }

    pub(crate) fn model_not_found(key: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("model '{key}' does not exist"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_statuses_map_to_kinds() {
        assert_eq!(StoreError::from_remote(404, "x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(StoreError::from_remote(409, "x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(StoreError::from_remote(422, "x".into()).kind(), ErrorKind::Decode);
        let err = StoreError::from_remote(503, "busy".into());
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(matches!(err, StoreError::Transport { status: 503, .. }));
    }

    #[test]
    fn non_finite_values_are_bad_requests_not_decode_errors() {
        let err = StoreError::from(CodecError::NonFinite {
            index: 0,
            value: f64::NAN,
        });
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }
}
