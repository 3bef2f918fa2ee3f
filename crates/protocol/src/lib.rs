//! Records and wire shapes shared by every wordvec backend.
//!
//! [`Model`] and [`Vector`] are the stored records; [`ModelFields`] and
//! [`VectorInput`] are their create/update shapes; [`ModelRef`] is how callers
//! point at a model before the store resolves it.

mod error;
mod model;
pub mod naming;
mod vector;

pub use error::{ErrorEnvelope, ErrorKind};
pub use model::{LossFunction, Model, ModelFields, ModelKey, ModelRef, TrainingParams};
pub use vector::{base64_bytes, Vector, VectorInput, VectorPayload, VectorRecord};

/// Request header carrying the caller's user name.
pub const USERNAME_HEADER: &str = "X-Wordvec-Username";
/// Request header carrying the caller's password.
pub const PASSWORD_HEADER: &str = "X-Wordvec-Password";
/// Session token issued by the server and replayed by clients.
pub const SESSION_HEADER: &str = "X-Wordvec-Session";

/// Prefix shared by every route.
pub const API_PREFIX: &str = "/api";

/// `{"exists": bool}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

/// `{"count": n}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

/// How an ingestion run treats words the model already has.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Update existing words, create new ones.
    #[default]
    Merge,
    /// Create everything; existing words surface as conflicts.
    Force,
}

impl IngestMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Force => "force",
        }
    }
}

/// Serialize with the workspace's JSON conventions (pretty, trailing newline).
pub fn to_pretty_json<T: serde::Serialize>(value: &T) -> serde_json::Result<String> {
    let mut out = serde_json::to_string_pretty(value)?;
    out.push('\n');
    Ok(out)
}
