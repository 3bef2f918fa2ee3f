use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use wordvec_store::{HeaderNames, DEFAULT_BATCH_SIZE};

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1 << 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Allow binding to non-loopback addresses.
    pub public: bool,
    /// User name to lowercase hex SHA-256 of the password. Empty disables authentication.
    pub users: BTreeMap<String, String>,
    pub headers: HeaderNames,
    pub session_ttl_secs: u64,
    pub max_upload_bytes: usize,
    pub batch_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            public: false,
            users: BTreeMap::new(),
            headers: HeaderNames::default(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs.max(1))
    }

    /// Register `username` with a plaintext password (hashed here).
    #[must_use]
    pub fn with_user(mut self, username: &str, password: &str) -> Self {
        self.users
            .insert(username.to_string(), crate::security::hash_password(password));
        self
    }
}
