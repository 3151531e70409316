//! Sliding-TTL cache of loaded embedding models
//!
//! Model instantiation is expensive (weight files, ONNX session setup),
//! so loaded models are kept hot and evicted only after a TTL window
//! with no access. Any access resets the window (sliding expiration),
//! and expired entries are swept eagerly on every read and write so the
//! cache never grows unbounded.

use super::registry::{EngineDescriptor, EngineRegistry};
use super::LoadedModel;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration as TtlDuration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tracing::{debug, info};

/// Default TTL for cached models (seconds)
pub const DEFAULT_TTL_SECS: u64 = 1800;

/// Instantiates a ready-to-use model for an engine descriptor
///
/// Implementations perform the expensive part: reading weight files and
/// building inference sessions. Errors propagate to the caller and are
/// never cached.
pub trait ModelLoader: Send + Sync {
    fn load(&self, descriptor: &EngineDescriptor) -> Result<LoadedModel>;
}

type NowFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

struct CacheEntry {
    model: Arc<LoadedModel>,
    expires_at: DateTime<Utc>,
}

/// TTL-based cache mapping engine names to loaded models
///
/// Shared process-wide; reads from distinct engines proceed in
/// parallel, and concurrent misses for the same engine are serialized
/// so exactly one load runs.
pub struct ModelCache {
    registry: Arc<EngineRegistry>,
    loader: Arc<dyn ModelLoader>,
    ttl: TtlDuration,
    load_timeout: Option<Duration>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    load_slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    now: NowFn,
}

impl ModelCache {
    /// Create a cache with the given TTL
    pub fn new(registry: Arc<EngineRegistry>, loader: Arc<dyn ModelLoader>, ttl: Duration) -> Self {
        Self {
            registry,
            loader,
            ttl: TtlDuration::from_std(ttl).unwrap_or_else(|_| TtlDuration::days(365 * 100)),
            load_timeout: None,
            entries: Mutex::new(HashMap::new()),
            load_slots: Mutex::new(HashMap::new()),
            now: Arc::new(Utc::now),
        }
    }

    /// Bound model-load time; an elapsed deadline surfaces `LoadTimeout`
    /// instead of blocking the caller indefinitely.
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    /// Replace the clock, letting tests drive expiry deterministically
    pub fn with_clock(mut self, now: NowFn) -> Self {
        self.now = now;
        self
    }

    /// Get a live cached model, or instantiate one
    ///
    /// A hit resets the entry's expiration window. Expired entries are
    /// swept on every call. Two simultaneous misses for the same engine
    /// trigger exactly one underlying load; the second caller waits for
    /// the first load's result. A failed load leaves the cache
    /// unchanged, so the next call retries.
    pub fn get_or_load(&self, name: &str) -> Result<Arc<LoadedModel>> {
        let descriptor = self.registry.get(name)?.clone();
        if !descriptor.supported {
            return Err(Error::UnsupportedEngine {
                name: name.to_string(),
            });
        }

        if let Some(model) = self.lookup_and_touch(name) {
            return Ok(model);
        }

        // Serialize concurrent loads per engine name; loads for distinct
        // engines proceed in parallel.
        let slot = self.load_slot(name);
        let _guard = slot.lock();

        // A load may have completed while we waited on the slot
        if let Some(model) = self.lookup_and_touch(name) {
            return Ok(model);
        }

        let model = self.load_with_deadline(&descriptor)?;
        self.store(name, Arc::clone(&model));
        Ok(model)
    }

    /// Number of entries currently held (expired entries swept first)
    pub fn len(&self) -> usize {
        let now = (self.now)();
        let mut entries = self.entries.lock();
        Self::sweep(&mut entries, now);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup_and_touch(&self, name: &str) -> Option<Arc<LoadedModel>> {
        let now = (self.now)();
        let mut entries = self.entries.lock();
        Self::sweep(&mut entries, now);
        let entry = entries.get_mut(name)?;
        entry.expires_at = now + self.ttl;
        Some(Arc::clone(&entry.model))
    }

    fn store(&self, name: &str, model: Arc<LoadedModel>) {
        let now = (self.now)();
        let mut entries = self.entries.lock();
        entries.insert(
            name.to_string(),
            CacheEntry {
                model,
                expires_at: now + self.ttl,
            },
        );
        Self::sweep(&mut entries, now);
    }

    fn sweep(entries: &mut HashMap<String, CacheEntry>, now: DateTime<Utc>) {
        // Dropping the entry releases the model once the last caller's
        // Arc goes away, freeing session memory.
        entries.retain(|name, entry| {
            let live = now <= entry.expires_at;
            if !live {
                debug!(engine = %name, "evicting expired model");
            }
            live
        });
    }

    fn load_slot(&self, name: &str) -> Arc<Mutex<()>> {
        let mut slots = self.load_slots.lock();
        Arc::clone(slots.entry(name.to_string()).or_default())
    }

    fn load_with_deadline(&self, descriptor: &EngineDescriptor) -> Result<Arc<LoadedModel>> {
        info!(engine = %descriptor.name, "loading embedding model");
        match self.load_timeout {
            None => Ok(Arc::new(self.loader.load(descriptor)?)),
            Some(timeout) => {
                let (tx, rx) = mpsc::sync_channel(1);
                let loader = Arc::clone(&self.loader);
                let descriptor = descriptor.clone();
                let name = descriptor.name.clone();
                std::thread::spawn(move || {
                    // Receiver may have given up on the deadline
                    let _ = tx.send(loader.load(&descriptor));
                });
                match rx.recv_timeout(timeout) {
                    Ok(result) => Ok(Arc::new(result?)),
                    Err(_) => Err(Error::LoadTimeout {
                        name,
                        waited: timeout,
                    }),
                }
            }
        }
    }
}
