use crate::config::ServiceConfig;
use crate::error::{Result, StoreError};
use crate::local::LocalStore;
use crate::remote::RemoteClient;
use crate::service::StorageService;
use std::path::PathBuf;

/// Where a store address points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Remote(String),
    Memory,
    Local(PathBuf),
}

impl Address {
    /// `http(s)://…` is remote, `memory://` is in-memory, `file://…` or a bare path is local.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Remote(raw.to_string())
        } else if lower.starts_with("memory://") {
            Self::Memory
        } else if lower.starts_with("file://") {
            Self::Local(PathBuf::from(&raw["file://".len()..]))
        } else {
            Self::Local(PathBuf::from(raw))
        }
    }
}

/// Open the backend `address` selects.
pub fn open(address: &str, config: &ServiceConfig) -> Result<Box<dyn StorageService + Send>> {
    match Address::parse(address) {
        Address::Remote(url) => Ok(Box::new(RemoteClient::connect(&url, config)?)),
        Address::Memory => Ok(Box::new(LocalStore::in_memory(config))),
        Address::Local(path) => Ok(Box::new(LocalStore::open(path, config)?)),
    }
}

/// Run `f` against a freshly opened service. Commits and closes on success; rolls
/// back and closes on failure.
pub fn with_service<T, E, F>(address: &str, config: &ServiceConfig, f: F) -> std::result::Result<T, E>
where
    F: FnOnce(&mut dyn StorageService) -> std::result::Result<T, E>,
    E: From<StoreError>,
{
    let mut service = open(address, config)?;
    match f(service.as_mut()) {
        Ok(value) => {
            service.commit()?;
            service.close()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = service.rollback() {
                log::warn!("rollback after failure also failed: {rollback_err}");
            }
            if let Err(close_err) = service.close() {
                log::warn!("close after failure also failed: {close_err}");
            }
            Err(err)
        }
    }
}
