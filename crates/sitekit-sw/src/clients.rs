//! Clients API: the pages a worker controls.

use hashbrown::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::lifecycle::ServiceWorkerId;
use crate::{Result, SwError};

/// Shared handle to the client list.
pub type ClientsHandle = Arc<RwLock<Clients>>;

/// Client identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
}

/// A client (open page or worker).
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub url: Url,
    pub client_type: ClientType,
    pub focused: bool,
    /// Worker currently controlling this client.
    pub controller: Option<ServiceWorkerId>,
}

/// The set of known clients.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<ClientId, Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_handle(self) -> ClientsHandle {
        Arc::new(RwLock::new(self))
    }

    /// Track an already-open page.
    pub fn add(&mut self, url: Url, client_type: ClientType) -> ClientId {
        let id = ClientId::next();
        self.clients.insert(
            id.clone(),
            Client {
                id: id.clone(),
                url,
                client_type,
                focused: false,
                controller: None,
            },
        );
        id
    }

    pub fn get(&self, id: &ClientId) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Clients of `client_type`, optionally including uncontrolled ones.
    pub fn match_all(&self, client_type: ClientType, include_uncontrolled: bool) -> Vec<&Client> {
        self.clients
            .values()
            .filter(|c| c.client_type == client_type)
            .filter(|c| include_uncontrolled || c.controller.is_some())
            .collect()
    }

    /// A window client already showing `url`.
    pub fn find_window(&self, url: &Url) -> Option<&Client> {
        self.match_all(ClientType::Window, true)
            .into_iter()
            .find(|c| &c.url == url)
    }

    /// Open a new focused window at `url`.
    pub fn open_window(&mut self, url: Url) -> ClientId {
        debug!(url = %url, "Opening window client");
        self.unfocus_all();
        let id = self.add(url, ClientType::Window);
        if let Some(client) = self.clients.get_mut(&id) {
            client.focused = true;
        }
        id
    }

    /// Focus a window client.
    pub fn focus(&mut self, id: &ClientId) -> Result<()> {
        match self.clients.get(id) {
            None => return Err(SwError::NotFound(id.to_string())),
            Some(c) if c.client_type != ClientType::Window => {
                return Err(SwError::StateError(
                    "Can only focus window clients".to_string(),
                ))
            }
            Some(_) => {}
        }
        self.unfocus_all();
        if let Some(client) = self.clients.get_mut(id) {
            client.focused = true;
        }
        Ok(())
    }

    /// Make `worker` the controller of every client. Returns how many
    /// clients changed controller.
    pub fn claim(&mut self, worker: ServiceWorkerId) -> usize {
        let mut changed = 0;
        for client in self.clients.values_mut() {
            if client.controller != Some(worker) {
                client.controller = Some(worker);
                changed += 1;
            }
        }
        debug!(worker = worker.raw(), changed, "Clients claimed");
        changed
    }

    fn unfocus_all(&mut self) {
        for client in self.clients.values_mut() {
            client.focused = false;
        }
    }
}
