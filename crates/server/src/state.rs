use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::security::Authenticator;
use std::sync::{Arc, Mutex};
use wordvec_store::StorageService;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    store: Arc<Mutex<Box<dyn StorageService + Send>>>,
    pub(crate) auth: Authenticator,
    pub(crate) batch_size: usize,
    pub(crate) max_upload_bytes: usize,
}

impl AppState {
    pub fn new(store: Box<dyn StorageService + Send>, config: &ServerConfig) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            auth: Authenticator::new(config),
            batch_size: config.batch_size,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    /// Run `f` against the store on the blocking pool: commit on success, roll back on failure.
    pub async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn StorageService) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let mut guard = store
                .lock()
                .map_err(|_| ServerError::Internal("store lock poisoned".to_string()))?;
            let service: &mut dyn StorageService = &mut **guard;
            match f(&mut *service) {
                Ok(value) => {
                    service.commit()?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(rollback) = service.rollback() {
                        log::warn!("rollback after failed request also failed: {rollback}");
                    }
                    Err(err)
                }
            }
        })
        .await
        .map_err(|err| ServerError::Internal(format!("store task failed: {err}")))?
    }

    /// Commit and release the store; later requests fail with a closed-store error.
    pub async fn close(&self) -> Result<()> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let mut guard = store
                .lock()
                .map_err(|_| ServerError::Internal("store lock poisoned".to_string()))?;
            guard.close()?;
            Ok(())
        })
        .await
        .map_err(|err| ServerError::Internal(format!("store task failed: {err}")))?
    }
}
