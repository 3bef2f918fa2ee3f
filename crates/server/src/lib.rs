//! HTTP API over a single wordvec store.
//!
//! Every route lives under `/api` and answers JSON. Requests are checked by an
//! authentication layer when users are configured, then run one at a time against
//! the store on the blocking pool; each request commits on success and rolls back
//! on failure. Errors use the shared [`wordvec_protocol::ErrorEnvelope`].

mod config;
mod error;
mod routes;
mod security;
mod state;

pub use config::{ServerConfig, DEFAULT_BIND, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_SESSION_TTL_SECS};
pub use error::{Result, ServerError};
pub use routes::router;
pub use security::{hash_password, resolve_guarded_bind_addrs, Authenticator};
pub use state::{AppState, SharedState};

use anyhow::Context as AnyhowContext;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use wordvec_store::StorageService;

/// Bind `config.bind` and serve until Ctrl-C.
pub async fn serve(store: Box<dyn StorageService + Send>, config: &ServerConfig) -> anyhow::Result<()> {
    resolve_guarded_bind_addrs(&config.bind, config.public).await?;
    if config.public && config.users.is_empty() {
        log::warn!("serving publicly without users; every request is accepted");
    }
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    serve_on(listener, store, config, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves, then close the store.
pub async fn serve_on<S>(
    listener: TcpListener,
    store: Box<dyn StorageService + Send>,
    config: &ServerConfig,
    shutdown: S,
) -> anyhow::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let backend = store.backend();
    let state: SharedState = Arc::new(AppState::new(store, config));
    let app = router(Arc::clone(&state));

    let local_addr = listener.local_addr()?;
    log::info!("serving {backend} store at http://{local_addr}/api");
    if state.auth.is_enabled() {
        log::info!("authentication enabled for {} user(s)", config.users.len());
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    log::info!("shutting down; closing store");
    state.close().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::warn!("cannot listen for Ctrl-C: {err}");
        std::future::pending::<()>().await;
    }
}
