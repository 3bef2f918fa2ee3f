use thiserror::Error;
use wordvec_protocol::ErrorKind;

/// Result type for query compilation
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors raised while turning caller filters into predicates
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Unknown {record} field '{field}'")]
    UnknownField { record: &'static str, field: String },

    #[error("Field '{field}' expects {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("Cannot sort {record} records by '{field}'")]
    UnknownSortField { record: &'static str, field: String },

    #[error("Invalid sort token '{0}' (expected field or field~desc)")]
    InvalidSortToken(String),

    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl QueryError {
    /// Every query failure is the caller's fault.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::BadRequest
    }
}
