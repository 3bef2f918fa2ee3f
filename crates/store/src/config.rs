use serde::{Deserialize, Serialize};
use std::time::Duration;
use wordvec_codec::Compression;
use wordvec_protocol::{PASSWORD_HEADER, SESSION_HEADER, USERNAME_HEADER};

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// When a local store makes pending writes durable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitPolicy {
    /// After every mutating call.
    #[default]
    Auto,
    /// Only on `commit()` / `close()`.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderNames {
    pub username: String,
    pub password: String,
    pub session: String,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            username: USERNAME_HEADER.to_string(),
            password: PASSWORD_HEADER.to_string(),
            session: SESSION_HEADER.to_string(),
        }
    }
}

/// Settings shared by every backend the facade can open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Used when the address carries no credentials.
    pub username: Option<String>,
    pub password: Option<String>,
    pub headers: HeaderNames,
    /// Compression applied to newly packed payloads.
    pub compression: Compression,
    pub commit_policy: CommitPolicy,
    pub timeout_secs: u64,
    pub batch_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            headers: HeaderNames::default(),
            compression: Compression::default(),
            commit_policy: CommitPolicy::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ServiceConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    #[must_use]
    pub fn with_commit_policy(mut self, policy: CommitPolicy) -> Self {
        self.commit_policy = policy;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }
}
