//! Host side: registers worker versions, drives their lifecycle, and routes
//! page fetches through whichever worker is active.

use hashbrown::HashMap;
use sitekit_net::{NetError, Network, Request, Response};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::clients::ClientId;
use crate::config::WorkerConfig;
use crate::dispatch::{EventKind, EventOutcome, WorkerEvent};
use crate::fetch::FetchOutcome;
use crate::lifecycle::{Registration, ServiceWorker, ServiceWorkerId, ServiceWorkerState};
use crate::notifications::{NotificationId, PushMessage};
use crate::worker::{ActivateReport, InstallReport, OfflineWorker, WorkerContext};
use crate::{Result, SwError};

/// Notifications the container emits while driving workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEvent {
    /// A new version started installing.
    UpdateFound { version: String },
    /// A worker changed state.
    StateChange {
        worker_id: ServiceWorkerId,
        version: String,
        new_state: ServiceWorkerState,
    },
    /// Pages are now controlled by a different worker.
    ControllerChange { worker_id: ServiceWorkerId },
    /// A push was displayed.
    NotificationShown { id: NotificationId },
}

/// Worker host for a single scope.
pub struct ServiceWorkerContainer<N: Network> {
    network: Arc<N>,
    context: WorkerContext,
    registration: RwLock<Registration>,
    workers: RwLock<HashMap<ServiceWorkerId, Arc<OfflineWorker<N>>>>,
    /// Held across install and activation so only one version moves
    /// through the slots at a time.
    lifecycle: Mutex<()>,
    event_tx: mpsc::UnboundedSender<ContainerEvent>,
}

impl<N: Network> ServiceWorkerContainer<N> {
    /// Create a container with fresh cache storage, clients, and
    /// notifications.
    pub fn new(network: Arc<N>, scope: Url) -> (Self, mpsc::UnboundedReceiver<ContainerEvent>) {
        Self::with_context(network, scope, WorkerContext::new())
    }

    /// Create a container over existing shared resources.
    pub fn with_context(
        network: Arc<N>,
        scope: Url,
        context: WorkerContext,
    ) -> (Self, mpsc::UnboundedReceiver<ContainerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                network,
                context,
                registration: RwLock::new(Registration::new(scope)),
                workers: RwLock::new(HashMap::new()),
                lifecycle: Mutex::new(()),
                event_tx,
            },
            event_rx,
        )
    }

    pub fn context(&self) -> &WorkerContext {
        &self.context
    }

    /// Snapshot of the registration slots.
    pub async fn registration(&self) -> Registration {
        self.registration.read().await.clone()
    }

    fn emit(&self, event: ContainerEvent) {
        // A dropped receiver just means nobody is listening.
        let _ = self.event_tx.send(event);
    }

    fn emit_state(&self, worker: &ServiceWorker) {
        self.emit(ContainerEvent::StateChange {
            worker_id: worker.id,
            version: worker.version.clone(),
            new_state: worker.state,
        });
    }

    /// Install a new worker version. With skip-waiting it is activated
    /// before this returns.
    ///
    /// Concurrent registrations run one after another.
    pub async fn register(&self, config: WorkerConfig) -> Result<InstallReport> {
        {
            let registration = self.registration.read().await;
            if config.origin.origin() != registration.scope.origin() {
                return Err(SwError::SecurityError(format!(
                    "origin {} is outside scope {}",
                    config.origin, registration.scope
                )));
            }
        }

        let worker = Arc::new(OfflineWorker::new(
            config,
            self.network.clone(),
            self.context.clone(),
        )?);
        let version = worker.version().to_string();
        let _lifecycle = self.lifecycle.lock().await;
        info!(version = %version, worker = worker.id().raw(), "Registering worker");

        {
            let mut registration = self.registration.write().await;
            if let Some(replaced) =
                registration.begin_install(ServiceWorker::new(worker.id(), version.clone()))
            {
                self.emit_state(&replaced);
            }
            if let Some(installing) = registration.installing.as_ref() {
                self.emit_state(installing);
            }
        }
        self.emit(ContainerEvent::UpdateFound {
            version: version.clone(),
        });

        let report = match worker.dispatch(WorkerEvent::Install).await {
            Ok(EventOutcome::Installed(report)) => report,
            Ok(other) => {
                self.fail_install().await;
                return Err(SwError::UnexpectedEvent {
                    expected: EventKind::Install,
                    actual: other.kind(),
                });
            }
            Err(e) => {
                warn!(version = %version, error = %e, "Install failed");
                self.fail_install().await;
                return Err(e);
            }
        };

        let worker_id = worker.id();
        self.workers.write().await.insert(worker_id, worker);
        {
            let mut registration = self.registration.write().await;
            let replaced = match registration.install_complete(worker_id) {
                Ok(replaced) => replaced,
                Err(e) => {
                    self.workers.write().await.remove(&worker_id);
                    return Err(e);
                }
            };
            if let Some(replaced) = replaced {
                self.workers.write().await.remove(&replaced.id);
                self.emit_state(&replaced);
            }
            if let Some(waiting) = registration.waiting.as_ref() {
                self.emit_state(waiting);
            }
        }

        if report.skip_waiting {
            self.activate_waiting().await?;
        }
        Ok(report)
    }

    async fn fail_install(&self) {
        if let Some(failed) = self.registration.write().await.install_failed() {
            self.emit_state(&failed);
        }
    }

    /// Activate the waiting worker.
    pub async fn activate(&self) -> Result<ActivateReport> {
        let _lifecycle = self.lifecycle.lock().await;
        self.activate_waiting().await
    }

    /// Caller holds the lifecycle lock.
    async fn activate_waiting(&self) -> Result<ActivateReport> {
        let waiting_id = self
            .registration
            .read()
            .await
            .waiting
            .as_ref()
            .map(|w| w.id)
            .ok_or_else(|| SwError::StateError("no waiting worker".to_string()))?;
        let worker = self
            .workers
            .read()
            .await
            .get(&waiting_id)
            .cloned()
            .ok_or_else(|| SwError::NotFound(format!("worker {}", waiting_id.raw())))?;

        let (worker_id, replaced) = {
            let mut registration = self.registration.write().await;
            let replaced = registration.begin_activate()?;
            let active = registration
                .active
                .as_ref()
                .ok_or_else(|| SwError::StateError("activation lost its worker".to_string()))?;
            self.emit_state(active);
            (active.id, replaced)
        };

        if let Some(old) = replaced {
            self.workers.write().await.remove(&old.id);
            self.emit_state(&old);
        }

        let report = match worker.dispatch(WorkerEvent::Activate).await {
            Ok(EventOutcome::Activated(report)) => report,
            Ok(other) => {
                self.fail_activate().await;
                return Err(SwError::UnexpectedEvent {
                    expected: EventKind::Activate,
                    actual: other.kind(),
                });
            }
            Err(e) => {
                warn!(worker = worker_id.raw(), error = %e, "Activate failed");
                self.fail_activate().await;
                return Err(e);
            }
        };

        {
            let mut registration = self.registration.write().await;
            registration.activate_complete()?;
            if let Some(active) = registration.active.as_ref() {
                self.emit_state(active);
            }
        }
        self.emit(ContainerEvent::ControllerChange { worker_id });

        Ok(report)
    }

    async fn fail_activate(&self) {
        if let Some(failed) = self.registration.write().await.activate_failed() {
            self.workers.write().await.remove(&failed.id);
            self.emit_state(&failed);
        }
    }

    /// The worker currently handling fetches.
    pub async fn active_worker(&self) -> Option<Arc<OfflineWorker<N>>> {
        let id = self.registration.read().await.controller()?.id;
        self.workers.read().await.get(&id).cloned()
    }

    async fn require_active(&self) -> Result<Arc<OfflineWorker<N>>> {
        self.active_worker()
            .await
            .ok_or_else(|| SwError::StateError("no active worker".to_string()))
    }

    /// Resolve `request` through the active worker without performing
    /// passthrough requests.
    pub async fn fetch_outcome(&self, request: Request) -> Result<FetchOutcome> {
        let Some(worker) = self.active_worker().await else {
            return Ok(FetchOutcome::Passthrough(request));
        };
        match worker.dispatch(WorkerEvent::Fetch(request)).await? {
            EventOutcome::Fetched(outcome) => Ok(outcome),
            other => Err(SwError::UnexpectedEvent {
                expected: EventKind::Fetch,
                actual: other.kind(),
            }),
        }
    }

    /// Fetch as a page would. Requests the worker declines to intercept
    /// (or fails to answer) go to the network untouched, so their errors
    /// reach the caller as-is.
    pub async fn fetch(&self, request: Request) -> std::result::Result<Response, NetError> {
        match self.fetch_outcome(request.clone()).await {
            Ok(FetchOutcome::Passthrough(original)) => self.network.fetch(original).await,
            Ok(outcome) => match outcome.into_response() {
                Some(response) => Ok(response),
                None => self.network.fetch(request).await,
            },
            Err(e) => {
                warn!(url = %request.url, error = %e, "Fetch handler failed, using network");
                self.network.fetch(request).await
            }
        }
    }

    /// Deliver a background sync event.
    pub async fn sync(&self, tag: &str) -> Result<bool> {
        let worker = self.require_active().await?;
        match worker
            .dispatch(WorkerEvent::Sync {
                tag: tag.to_string(),
            })
            .await?
        {
            EventOutcome::Synced { handled, .. } => Ok(handled),
            other => Err(SwError::UnexpectedEvent {
                expected: EventKind::Sync,
                actual: other.kind(),
            }),
        }
    }

    /// Deliver a push message.
    pub async fn push(&self, message: PushMessage) -> Result<Option<NotificationId>> {
        let worker = self.require_active().await?;
        match worker.dispatch(WorkerEvent::Push(message)).await? {
            EventOutcome::Pushed(shown) => {
                if let Some(id) = shown {
                    self.emit(ContainerEvent::NotificationShown { id });
                }
                Ok(shown)
            }
            other => Err(SwError::UnexpectedEvent {
                expected: EventKind::Push,
                actual: other.kind(),
            }),
        }
    }

    /// Deliver a notification click.
    pub async fn notification_click(&self, id: NotificationId) -> Result<Option<ClientId>> {
        let worker = self.require_active().await?;
        match worker
            .dispatch(WorkerEvent::NotificationClick { notification: id })
            .await?
        {
            EventOutcome::NotificationClicked(client) => Ok(client),
            other => Err(SwError::UnexpectedEvent {
                expected: EventKind::NotificationClick,
                actual: other.kind(),
            }),
        }
    }

    /// Drop every worker. Returns whether anything was registered.
    pub async fn unregister(&self) -> bool {
        let ids = self.registration.write().await.unregister();
        let mut workers = self.workers.write().await;
        for id in &ids {
            workers.remove(id);
        }
        debug!(count = ids.len(), "Unregistered workers");
        !ids.is_empty()
    }
}
