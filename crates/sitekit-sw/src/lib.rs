//! # SiteKit Offline Worker
//!
//! Offline cache worker for the SiteKit site shell.
//!
//! ## Features
//!
//! - **Lifecycle**: install, activate, skip-waiting, redundant workers
//! - **Cache storage**: versioned named caches, purge-on-activate
//! - **Fetch interception**: network-first with cache and offline-page fallback
//! - **Push**: JSON push payloads shown as notifications, click-to-open
//! - **Background sync**: reserved hook for replaying queued submissions
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerContainer (host)
//!     │
//!     ├── Registration ── installing / waiting / active
//!     │
//!     └── OfflineWorker ── DispatchTable (EventKind → handler)
//!             │
//!             └── WorkerContext (passed in, never global)
//!                     ├── CacheStorage   (version → Cache)
//!                     ├── Clients
//!                     ├── NotificationCenter
//!                     └── BackgroundTasks (fire-and-forget)
//! ```

use sitekit_common::SiteKitError;
use sitekit_net::NetError;
use thiserror::Error;

pub mod background;
pub mod cache;
pub mod clients;
pub mod config;
pub mod container;
pub mod dispatch;
pub mod fetch;
pub mod lifecycle;
pub mod notifications;
pub mod worker;

pub use background::BackgroundTasks;
pub use cache::{Cache, CacheEntry, CacheHandle, CacheKey, CacheStorage};
pub use clients::{Client, ClientId, ClientType, Clients, ClientsHandle};
pub use config::{NotificationConfig, WorkerConfig};
pub use container::{ContainerEvent, ServiceWorkerContainer};
pub use dispatch::{DispatchTable, EventKind, EventOutcome, Handler, WorkerEvent};
pub use fetch::FetchOutcome;
pub use lifecycle::{Registration, ServiceWorker, ServiceWorkerId, ServiceWorkerState};
pub use notifications::{
    Notification, NotificationCenter, NotificationId, NotificationsHandle, PushMessage,
    PushPayload,
};
pub use worker::{ActivateReport, AssetFailure, InstallReport, OfflineWorker, WorkerContext};

// ==================== Errors ====================

/// Errors that can occur in offline worker operations.
#[derive(Error, Debug)]
pub enum SwError {
    #[error("Configuration error: {0}")]
    Config(#[from] SiteKitError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Security error: {0}")]
    SecurityError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Quota exceeded: cache {cache} needs {needed} bytes, limit is {limit}")]
    QuotaExceeded {
        cache: String,
        needed: usize,
        limit: usize,
    },

    #[error("Invalid push payload: {0}")]
    InvalidPayload(String),

    #[error("No handler registered for {0:?} events")]
    NoHandler(EventKind),

    #[error("Handler for {expected:?} received a {actual:?} event")]
    UnexpectedEvent { expected: EventKind, actual: EventKind },

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, SwError>;
