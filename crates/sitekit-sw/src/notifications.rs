//! Push messages and displayed notifications.

use bytes::Bytes;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{Result, SwError};

/// Shared handle to the notification center.
pub type NotificationsHandle = Arc<RwLock<NotificationCenter>>;

/// JSON body a push service delivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// An incoming push message.
#[derive(Debug, Clone, Default)]
pub struct PushMessage {
    data: Option<Bytes>,
}

impl PushMessage {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

    /// A push with no data attached.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Encode `payload` as a JSON push.
    pub fn from_payload(payload: &PushPayload) -> Result<Self> {
        let data = serde_json::to_vec(payload).map_err(|e| SwError::InvalidPayload(e.to_string()))?;
        Ok(Self::new(data))
    }

    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// Decode the payload.
    pub fn payload(&self) -> Result<PushPayload> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| SwError::InvalidPayload("push carried no data".to_string()))?;
        serde_json::from_slice(data).map_err(|e| SwError::InvalidPayload(e.to_string()))
    }
}

/// Notification identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationId(u64);

impl NotificationId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A notification currently on screen.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Page to open on click.
    pub url: Option<String>,
    pub shown_at: Instant,
}

/// System notification tray.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    shown: HashMap<NotificationId, Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_handle(self) -> NotificationsHandle {
        Arc::new(RwLock::new(self))
    }

    /// Display a notification built from `payload`.
    pub fn show(&mut self, payload: PushPayload, icon: &str, badge: &str) -> NotificationId {
        let id = NotificationId::next();
        debug!(id = id.raw(), title = %payload.title, "Showing notification");
        self.shown.insert(
            id,
            Notification {
                id,
                title: payload.title,
                body: payload.body,
                icon: icon.to_string(),
                badge: badge.to_string(),
                url: payload.url,
                shown_at: Instant::now(),
            },
        );
        id
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.shown.get(&id)
    }

    /// Dismiss a notification, returning it if it was showing.
    pub fn close(&mut self, id: NotificationId) -> Option<Notification> {
        self.shown.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.shown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }
}
