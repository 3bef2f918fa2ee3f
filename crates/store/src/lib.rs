//! # wordvec store
//!
//! One storage contract, two backends:
//!
//! ```text
//! facade::open(address)
//!     ├── http(s)://…          -> RemoteClient (HTTP API of another instance)
//!     ├── memory://            -> LocalStore (in memory)
//!     └── file://… | <path>    -> LocalStore (snapshot + journal, fs2 lock)
//! ```
//!
//! Both implement [`StorageService`] with the same observable behavior, so
//! callers never branch on where the data lives.

mod config;
mod error;
mod facade;
mod journal;
mod local;
mod remote;
mod service;

pub use config::{
    CommitPolicy, HeaderNames, ServiceConfig, DEFAULT_BATCH_SIZE, DEFAULT_TIMEOUT_SECS,
};
pub use error::{Result, StoreError};
pub use facade::{open, with_service, Address};
pub use journal::STORE_SCHEMA_VERSION;
pub use local::LocalStore;
pub use remote::RemoteClient;
pub use service::{Resolved, StorageService};
