//! Event dispatch table.
//!
//! Each lifecycle event kind maps to one handler. A handler returns a boxed
//! future: the work the host must await before it considers the event
//! settled.

use futures::future::BoxFuture;
use hashbrown::HashMap;
use sitekit_net::{Network, Request};

use crate::clients::ClientId;
use crate::fetch::FetchOutcome;
use crate::notifications::{NotificationId, PushMessage};
use crate::worker::{ActivateReport, InstallReport, OfflineWorker};
use crate::{Result, SwError};

/// Kinds of events a worker handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Sync,
    Push,
    NotificationClick,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Install,
        EventKind::Activate,
        EventKind::Fetch,
        EventKind::Sync,
        EventKind::Push,
        EventKind::NotificationClick,
    ];
}

/// An event delivered to a worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Sync { tag: String },
    Push(PushMessage),
    NotificationClick { notification: NotificationId },
}

impl WorkerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WorkerEvent::Install => EventKind::Install,
            WorkerEvent::Activate => EventKind::Activate,
            WorkerEvent::Fetch(_) => EventKind::Fetch,
            WorkerEvent::Sync { .. } => EventKind::Sync,
            WorkerEvent::Push(_) => EventKind::Push,
            WorkerEvent::NotificationClick { .. } => EventKind::NotificationClick,
        }
    }
}

/// What a settled event produced.
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetched(FetchOutcome),
    Synced { tag: String, handled: bool },
    Pushed(Option<NotificationId>),
    NotificationClicked(Option<ClientId>),
}

impl EventOutcome {
    pub fn kind(&self) -> EventKind {
        match self {
            EventOutcome::Installed(_) => EventKind::Install,
            EventOutcome::Activated(_) => EventKind::Activate,
            EventOutcome::Fetched(_) => EventKind::Fetch,
            EventOutcome::Synced { .. } => EventKind::Sync,
            EventOutcome::Pushed(_) => EventKind::Push,
            EventOutcome::NotificationClicked(_) => EventKind::NotificationClick,
        }
    }
}

/// A handler: borrow the worker, consume the event, return work to await.
pub type Handler<N> =
    for<'a> fn(&'a OfflineWorker<N>, WorkerEvent) -> BoxFuture<'a, Result<EventOutcome>>;

/// Map from event kind to handler.
pub struct DispatchTable<N: Network> {
    handlers: HashMap<EventKind, Handler<N>>,
}

impl<N: Network> std::fmt::Debug for DispatchTable<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl<N: Network> Default for DispatchTable<N> {
    fn default() -> Self {
        Self::standard()
    }
}

impl<N: Network> DispatchTable<N> {
    /// A table with no handlers.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The stock handlers for every event kind.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.register(EventKind::Install, on_install::<N>);
        table.register(EventKind::Activate, on_activate::<N>);
        table.register(EventKind::Fetch, on_fetch::<N>);
        table.register(EventKind::Sync, on_sync::<N>);
        table.register(EventKind::Push, on_push::<N>);
        table.register(EventKind::NotificationClick, on_notification_click::<N>);
        table
    }

    /// Install `handler` for `kind`, returning the one it replaced.
    pub fn register(&mut self, kind: EventKind, handler: Handler<N>) -> Option<Handler<N>> {
        self.handlers.insert(kind, handler)
    }

    /// Remove the handler for `kind`.
    pub fn unregister(&mut self, kind: EventKind) -> Option<Handler<N>> {
        self.handlers.remove(&kind)
    }

    pub fn get(&self, kind: EventKind) -> Option<Handler<N>> {
        self.handlers.get(&kind).copied()
    }

    /// Registered kinds, in declaration order.
    pub fn kinds(&self) -> Vec<EventKind> {
        EventKind::ALL
            .into_iter()
            .filter(|k| self.handlers.contains_key(k))
            .collect()
    }
}

fn unexpected(expected: EventKind, event: &WorkerEvent) -> SwError {
    SwError::UnexpectedEvent {
        expected,
        actual: event.kind(),
    }
}

fn on_install<N: Network>(
    worker: &OfflineWorker<N>,
    _event: WorkerEvent,
) -> BoxFuture<'_, Result<EventOutcome>> {
    Box::pin(async move { worker.install().await.map(EventOutcome::Installed) })
}

fn on_activate<N: Network>(
    worker: &OfflineWorker<N>,
    _event: WorkerEvent,
) -> BoxFuture<'_, Result<EventOutcome>> {
    Box::pin(async move { worker.activate().await.map(EventOutcome::Activated) })
}

fn on_fetch<N: Network>(
    worker: &OfflineWorker<N>,
    event: WorkerEvent,
) -> BoxFuture<'_, Result<EventOutcome>> {
    Box::pin(async move {
        match event {
            WorkerEvent::Fetch(request) => {
                Ok(EventOutcome::Fetched(worker.handle_fetch(request).await))
            }
            other => Err(unexpected(EventKind::Fetch, &other)),
        }
    })
}

fn on_sync<N: Network>(
    worker: &OfflineWorker<N>,
    event: WorkerEvent,
) -> BoxFuture<'_, Result<EventOutcome>> {
    Box::pin(async move {
        match event {
            WorkerEvent::Sync { tag } => {
                let handled = worker.handle_sync(&tag).await;
                Ok(EventOutcome::Synced { tag, handled })
            }
            other => Err(unexpected(EventKind::Sync, &other)),
        }
    })
}

fn on_push<N: Network>(
    worker: &OfflineWorker<N>,
    event: WorkerEvent,
) -> BoxFuture<'_, Result<EventOutcome>> {
    Box::pin(async move {
        match event {
            WorkerEvent::Push(message) => {
                Ok(EventOutcome::Pushed(worker.handle_push(&message).await))
            }
            other => Err(unexpected(EventKind::Push, &other)),
        }
    })
}

fn on_notification_click<N: Network>(
    worker: &OfflineWorker<N>,
    event: WorkerEvent,
) -> BoxFuture<'_, Result<EventOutcome>> {
    Box::pin(async move {
        match event {
            WorkerEvent::NotificationClick { notification } => Ok(
                EventOutcome::NotificationClicked(
                    worker.handle_notification_click(notification).await,
                ),
            ),
            other => Err(unexpected(EventKind::NotificationClick, &other)),
        }
    })
}
