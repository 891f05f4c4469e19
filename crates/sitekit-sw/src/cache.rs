//! Versioned cache storage.
//!
//! ```text
//! CacheStorage (caches)
//!     └── Cache "site-v1"
//!             └── (method, url) → Response
//! ```

use hashbrown::HashMap;
use http::Method;
use sitekit_net::{Request, Response};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

use crate::{Result, SwError};

/// Shared handle to the cache storage, passed explicitly to each worker.
pub type CacheHandle = Arc<RwLock<CacheStorage>>;

/// Cache lookup key: request method plus URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: Method,
    pub url: String,
}

impl CacheKey {
    /// Key for a request.
    pub fn for_request(request: &Request) -> Self {
        Self {
            method: request.method.clone(),
            url: request.url.as_str().to_string(),
        }
    }

    /// Key for a plain GET of `url`.
    pub fn get(url: &Url) -> Self {
        Self {
            method: Method::GET,
            url: url.as_str().to_string(),
        }
    }
}

/// A cached request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub response: Response,
    pub cached_at: SystemTime,
}

impl CacheEntry {
    fn size(&self) -> usize {
        self.response.body().len()
    }
}

/// A single named cache.
#[derive(Debug)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Byte limit across all bodies, if any.
    quota: Option<usize>,

    entries: HashMap<CacheKey, CacheEntry>,
}

impl Cache {
    /// Create a new, unbounded cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            quota: None,
            entries: HashMap::new(),
        }
    }

    /// Create a cache whose bodies may total at most `quota` bytes.
    pub fn with_quota(name: &str, quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::new(name)
        }
    }

    /// Store a response, replacing any previous entry for the same key.
    pub fn put(&mut self, request: &Request, response: Response) -> Result<Option<CacheEntry>> {
        let key = CacheKey::for_request(request);

        if let Some(limit) = self.quota {
            let replaced = self.entries.get(&key).map(CacheEntry::size).unwrap_or(0);
            let needed = self.size_bytes() - replaced + response.body().len();
            if needed > limit {
                return Err(SwError::QuotaExceeded {
                    cache: self.name.clone(),
                    needed,
                    limit,
                });
            }
        }

        trace!(cache = %self.name, url = %key.url, "Cache put");
        let entry = CacheEntry {
            key: key.clone(),
            response,
            cached_at: SystemTime::now(),
        };
        Ok(self.entries.insert(key, entry))
    }

    /// Match a request.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        self.entries.get(&CacheKey::for_request(request))
    }

    /// Match a GET for `url`.
    pub fn match_url(&self, url: &Url) -> Option<&CacheEntry> {
        self.entries.get(&CacheKey::get(url))
    }

    /// Delete entry.
    pub fn delete(&mut self, request: &Request) -> bool {
        self.entries.remove(&CacheKey::for_request(request)).is_some()
    }

    /// All keys.
    pub fn keys(&self) -> Vec<&CacheKey> {
        self.entries.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total body bytes held.
    pub fn size_bytes(&self) -> usize {
        self.entries.values().map(CacheEntry::size).sum()
    }
}

// ==================== Cache Storage ====================

/// Cache storage (the `caches` global).
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
    quota_per_cache: Option<usize>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage whose caches are each limited to `quota` body bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            caches: HashMap::new(),
            quota_per_cache: Some(quota),
        }
    }

    /// Wrap into a shareable handle.
    pub fn into_handle(self) -> CacheHandle {
        Arc::new(RwLock::new(self))
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        let quota = self.quota_per_cache;
        self.caches.entry(name.to_string()).or_insert_with(|| {
            debug!(cache = %name, "Creating cache");
            match quota {
                Some(limit) => Cache::with_quota(name, limit),
                None => Cache::new(name),
            }
        })
    }

    /// Get an existing cache without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// Cache names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.keys().cloned().collect();
        names.sort();
        names
    }

    /// Delete every cache except `keep`, returning the deleted names.
    pub fn retain_only(&mut self, keep: &str) -> Vec<String> {
        let stale: Vec<String> = self
            .keys()
            .into_iter()
            .filter(|name| name != keep)
            .collect();
        for name in &stale {
            debug!(cache = %name, "Deleting stale cache");
            self.caches.remove(name);
        }
        stale
    }
}
