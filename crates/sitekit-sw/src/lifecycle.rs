//! Worker lifecycle and registration slots.
//!
//! ```text
//! Parsed ──install──► Installing ──► Installed (waiting)
//!                                         │ activate
//!                                         ▼
//!                      Activated ◄── Activating
//! ```
//!
//! A worker replaced by a newer version, or whose install failed, becomes
//! `Redundant`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;
use url::Url;

use crate::{Result, SwError};

/// Unique identifier for a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Created, install not started.
    #[default]
    Parsed,
    /// Install event in flight.
    Installing,
    /// Installed, waiting to activate.
    Installed,
    /// Activate event in flight.
    Activating,
    /// Active and handling fetches.
    Activated,
    /// Replaced or failed.
    Redundant,
}

impl ServiceWorkerState {
    /// Only a fully activated worker intercepts fetches.
    pub fn can_handle_fetch(&self) -> bool {
        *self == ServiceWorkerState::Activated
    }
}

/// Lifecycle record for one worker version.
#[derive(Debug, Clone)]
pub struct ServiceWorker {
    pub id: ServiceWorkerId,
    /// Cache version label this worker owns.
    pub version: String,
    pub state: ServiceWorkerState,
    pub state_changed_at: Instant,
}

impl ServiceWorker {
    pub fn new(id: ServiceWorkerId, version: impl Into<String>) -> Self {
        Self {
            id,
            version: version.into(),
            state: ServiceWorkerState::Parsed,
            state_changed_at: Instant::now(),
        }
    }

    /// Set state.
    pub fn set_state(&mut self, state: ServiceWorkerState) {
        debug!(worker = self.id.raw(), version = %self.version, from = ?self.state, to = ?state, "Worker state change");
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }

    pub fn is_redundant(&self) -> bool {
        self.state == ServiceWorkerState::Redundant
    }
}

// ==================== Registration ====================

/// The installing / waiting / active slots for one scope.
#[derive(Debug, Clone)]
pub struct Registration {
    pub scope: Url,
    pub installing: Option<ServiceWorker>,
    pub waiting: Option<ServiceWorker>,
    pub active: Option<ServiceWorker>,
}

impl Registration {
    /// Create an empty registration.
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            installing: None,
            waiting: None,
            active: None,
        }
    }

    /// The worker controlling pages, if fully activated.
    pub fn controller(&self) -> Option<&ServiceWorker> {
        self.active.as_ref().filter(|w| w.state.can_handle_fetch())
    }

    /// Place `worker` in the installing slot.
    ///
    /// Returns a previous installing worker, now redundant.
    pub fn begin_install(&mut self, mut worker: ServiceWorker) -> Option<ServiceWorker> {
        let replaced = self.installing.take().map(|mut old| {
            old.set_state(ServiceWorkerState::Redundant);
            old
        });
        worker.set_state(ServiceWorkerState::Installing);
        self.installing = Some(worker);
        replaced
    }

    /// Move worker `id` from installing to waiting.
    ///
    /// Fails if `id` no longer holds the installing slot. Returns a
    /// previously waiting worker, now redundant.
    pub fn install_complete(&mut self, id: ServiceWorkerId) -> Result<Option<ServiceWorker>> {
        match self.installing.as_ref() {
            Some(worker) if worker.id == id => {}
            Some(worker) => {
                return Err(SwError::StateError(format!(
                    "worker {} is not installing, worker {} is",
                    id.raw(),
                    worker.id.raw()
                )))
            }
            None => return Err(SwError::StateError("no installing worker".to_string())),
        }
        let mut worker = self
            .installing
            .take()
            .ok_or_else(|| SwError::StateError("no installing worker".to_string()))?;
        worker.set_state(ServiceWorkerState::Installed);

        let replaced = self.waiting.replace(worker).map(|mut old| {
            old.set_state(ServiceWorkerState::Redundant);
            old
        });
        Ok(replaced)
    }

    /// Discard the installing worker after a failed install.
    pub fn install_failed(&mut self) -> Option<ServiceWorker> {
        self.installing.take().map(|mut worker| {
            worker.set_state(ServiceWorkerState::Redundant);
            worker
        })
    }

    /// Promote the waiting worker to the active slot in `Activating` state.
    ///
    /// Returns the previously active worker, now redundant.
    pub fn begin_activate(&mut self) -> Result<Option<ServiceWorker>> {
        let mut worker = self
            .waiting
            .take()
            .ok_or_else(|| SwError::StateError("no waiting worker".to_string()))?;
        worker.set_state(ServiceWorkerState::Activating);

        let replaced = self.active.replace(worker).map(|mut old| {
            old.set_state(ServiceWorkerState::Redundant);
            old
        });
        Ok(replaced)
    }

    /// Discard the active worker after a failed activation.
    pub fn activate_failed(&mut self) -> Option<ServiceWorker> {
        if self.active.as_ref()?.state != ServiceWorkerState::Activating {
            return None;
        }
        self.active.take().map(|mut worker| {
            worker.set_state(ServiceWorkerState::Redundant);
            worker
        })
    }

    /// Finish activation of the active slot.
    pub fn activate_complete(&mut self) -> Result<ServiceWorkerId> {
        match self.active.as_mut() {
            Some(worker) if worker.state == ServiceWorkerState::Activating => {
                worker.set_state(ServiceWorkerState::Activated);
                Ok(worker.id)
            }
            Some(worker) => Err(SwError::StateError(format!(
                "active worker is {:?}, not activating",
                worker.state
            ))),
            None => Err(SwError::StateError("no active worker".to_string())),
        }
    }

    /// Mark every worker redundant and clear all slots.
    pub fn unregister(&mut self) -> Vec<ServiceWorkerId> {
        [
            self.installing.take(),
            self.waiting.take(),
            self.active.take(),
        ]
        .into_iter()
        .flatten()
        .map(|mut worker| {
            worker.set_state(ServiceWorkerState::Redundant);
            worker.id
        })
        .collect()
    }
}
