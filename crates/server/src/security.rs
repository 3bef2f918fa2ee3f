use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use anyhow::Context as AnyhowContext;
use axum::http::HeaderMap;
use getrandom::getrandom;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use wordvec_store::HeaderNames;

const SESSION_CAPACITY: usize = 4096;
const TOKEN_BYTES: usize = 24;

pub fn hash_password(password: &str) -> String {
    hex_encode_lower(&Sha256::digest(password.as_bytes()))
}

fn hex_encode_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().saturating_mul(2));
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff: u8 = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

struct Session {
    username: String,
    expires_at: Instant,
}

/// Checks credential or session headers and issues session tokens.
pub struct Authenticator {
    users: BTreeMap<String, String>,
    headers: HeaderNames,
    ttl: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

impl Authenticator {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            users: config.users.clone(),
            headers: config.headers.clone(),
            ttl: config.session_ttl(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.users.is_empty()
    }

    pub fn session_header(&self) -> &str {
        &self.headers.session
    }

    /// Returns the session token to echo back, or `None` when authentication is off.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Option<String>> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

        // A stale session falls back to the credentials sent alongside it.
        let session_error = match header(&self.headers.session) {
            Some(token) => match self.resume(token) {
                Ok(token) => return Ok(Some(token)),
                Err(err @ ServerError::Unauthorized(_)) => Some(err),
                Err(err) => return Err(err),
            },
            None => None,
        };

        let (Some(username), Some(password)) =
            (header(&self.headers.username), header(&self.headers.password))
        else {
            return Err(session_error.unwrap_or_else(|| {
                ServerError::Unauthorized("missing credentials or session token".to_string())
            }));
        };
        let expected = self.users.get(username).map(String::as_str).unwrap_or("");
        if !constant_time_eq(&hash_password(password), expected) {
            log::debug!("rejected credentials for user '{username}'");
            return Err(ServerError::Unauthorized("invalid credentials".to_string()));
        }
        self.issue(username).map(Some)
    }

    fn resume(&self, token: &str) -> Result<String> {
        let now = Instant::now();
        let mut sessions = self.lock()?;
        match sessions.get_mut(token) {
            Some(session) if session.expires_at > now => {
                session.expires_at = now + self.ttl;
                Ok(token.to_string())
            }
            Some(session) => {
                log::debug!("session for user '{}' expired", session.username);
                sessions.remove(token);
                Err(ServerError::Unauthorized("session expired".to_string()))
            }
            None => Err(ServerError::Unauthorized("unknown session token".to_string())),
        }
    }

    fn issue(&self, username: &str) -> Result<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        getrandom(&mut bytes)
            .map_err(|err| ServerError::Internal(format!("cannot generate session token: {err}")))?;
        let token = hex_encode_lower(&bytes);

        let now = Instant::now();
        let mut sessions = self.lock()?;
        sessions.retain(|_, session| session.expires_at > now);
        if sessions.len() >= SESSION_CAPACITY {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, session)| session.expires_at)
                .map(|(token, _)| token.clone());
            if let Some(oldest) = oldest {
                sessions.remove(&oldest);
            }
        }
        sessions.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                expires_at: now + self.ttl,
            },
        );
        log::debug!("issued session for user '{username}'");
        Ok(token)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Session>>> {
        self.sessions
            .lock()
            .map_err(|_| ServerError::Internal("session table lock poisoned".to_string()))
    }
}

pub async fn resolve_guarded_bind_addrs(bind: &str, public: bool) -> anyhow::Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(bind)
        .await
        .with_context(|| format!("Failed to resolve bind address: {bind}"))?
        .collect();
    if addrs.is_empty() {
        anyhow::bail!("Bind address resolved to zero socket addrs: {bind}")
    }
    enforce_bind_guard_for_addrs(bind, &addrs, public)?;
    Ok(addrs)
}

fn enforce_bind_guard_for_addrs(bind: &str, addrs: &[SocketAddr], public: bool) -> anyhow::Result<()> {
    let any_non_loopback = addrs.iter().any(|addr| !addr.ip().is_loopback());
    if any_non_loopback && !public {
        anyhow::bail!(
            "Refusing to bind to non-loopback address without --public: {bind}. Configure users before exposing the server."
        )
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use pretty_assertions::assert_eq;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn auth(ttl_secs: u64) -> Authenticator {
        let mut config = ServerConfig::default().with_user("alice", "secret");
        config.session_ttl_secs = ttl_secs;
        Authenticator::new(&config)
    }

    #[test]
    fn password_hashes_are_lowercase_hex_sha256() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn open_server_needs_no_headers() {
        let auth = Authenticator::new(&ServerConfig::default());
        assert_eq!(auth.authenticate(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn credentials_issue_a_replayable_session() {
        let auth = auth(60);
        let token = auth
            .authenticate(&headers(&[
                ("x-wordvec-username", "alice"),
                ("x-wordvec-password", "secret"),
            ]))
            .unwrap()
            .unwrap();
        assert_eq!(token.len(), TOKEN_BYTES * 2);

        let replayed = auth
            .authenticate(&headers(&[("x-wordvec-session", &token)]))
            .unwrap();
        assert_eq!(replayed.as_deref(), Some(token.as_str()));
    }

    #[test]
    fn expired_sessions_fall_back_to_credentials() {
        let auth = auth(0);
        let credentials = [
            ("x-wordvec-username", "alice"),
            ("x-wordvec-password", "secret"),
        ];
        let first = auth.authenticate(&headers(&credentials)).unwrap().unwrap();

        let err = auth
            .authenticate(&headers(&[("x-wordvec-session", &first)]))
            .unwrap_err();
        assert!(matches!(err, ServerError::Unauthorized(_)), "{err}");

        let mut with_credentials = credentials.to_vec();
        with_credentials.push(("x-wordvec-session", &first));
        let renewed = auth.authenticate(&headers(&with_credentials)).unwrap().unwrap();
        assert_ne!(renewed, first);

        let mut wrong = vec![
            ("x-wordvec-username", "alice"),
            ("x-wordvec-password", "nope"),
        ];
        wrong.push(("x-wordvec-session", &renewed));
        assert!(auth.authenticate(&headers(&wrong)).is_err());
    }

    #[test]
    fn bad_credentials_and_unknown_sessions_are_unauthorized() {
        let auth = auth(60);
        for request in [
            headers(&[]),
            headers(&[("x-wordvec-username", "alice")]),
            headers(&[("x-wordvec-username", "alice"), ("x-wordvec-password", "nope")]),
            headers(&[("x-wordvec-username", "mallory"), ("x-wordvec-password", "secret")]),
            headers(&[("x-wordvec-session", "deadbeef")]),
        ] {
            let err = auth.authenticate(&request).unwrap_err();
            assert!(matches!(err, ServerError::Unauthorized(_)), "{err}");
        }
    }

    #[tokio::test]
    async fn bind_guard_requires_public_for_non_loopback() {
        resolve_guarded_bind_addrs("127.0.0.1:0", false).await.unwrap();
        assert!(resolve_guarded_bind_addrs("0.0.0.0:0", false).await.is_err());
        resolve_guarded_bind_addrs("0.0.0.0:0", true).await.unwrap();
    }
}
