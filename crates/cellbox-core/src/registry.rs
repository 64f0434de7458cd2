//! Concurrency-safe cache of built isolates, keyed by module content.
//!
//! The registry owns the key -> handle mapping and guarantees at most one
//! concurrent build per key: when several callers race on a cold key, exactly
//! one runs the build function and the rest wait for its result. A failed
//! build is evicted immediately so the key is never permanently poisoned.
//!
//! The registry is constructor-injected and lives for the service process;
//! there is no ambient global state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

use crate::content_hash::IsolateKey;
use crate::runtime::{IsolateError, IsolateHandle};

pub type SharedHandle = Arc<dyn IsolateHandle>;

type Slot = Arc<OnceCell<SharedHandle>>;

#[derive(Default)]
pub struct IsolateRegistry {
    entries: RwLock<HashMap<IsolateKey, Slot>>,
}

impl IsolateRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the handle for `key`, building it if absent.
    ///
    /// Resolved entries are returned from the read path without building.
    /// On a cold key, concurrent callers share one slot; the slot serializes
    /// initialization so only a single build runs at a time and every waiter
    /// receives the same handle. If the build fails, the slot is removed and
    /// the error propagated; a later call starts a fresh build.
    pub async fn get_or_build<F, Fut>(
        &self,
        key: &IsolateKey,
        build: F,
    ) -> Result<SharedHandle, IsolateError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SharedHandle, IsolateError>>,
    {
        let slot = {
            let entries = self.entries.read().await;
            entries.get(key).cloned()
        };
        let slot = match slot {
            Some(slot) => slot,
            None => {
                let mut entries = self.entries.write().await;
                entries
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new()))
                    .clone()
            }
        };

        match slot.get_or_try_init(|| async { build().await }).await {
            Ok(handle) => Ok(handle.clone()),
            Err(err) => {
                self.evict_unresolved(key, &slot).await;
                Err(err)
            }
        }
    }

    /// Drop the entry for `key` if it still resolves to this exact handle.
    ///
    /// Pointer identity keeps a rebuild race honest: if another caller has
    /// already replaced the entry, the fresh handle is left untouched.
    pub async fn invalidate(&self, key: &IsolateKey, handle: &SharedHandle) {
        let mut entries = self.entries.write().await;
        let matches = entries
            .get(key)
            .and_then(|slot| slot.get())
            .map(|resolved| Arc::ptr_eq(resolved, handle))
            .unwrap_or(false);
        if matches {
            entries.remove(key);
            log::debug!("Invalidated isolate for key {}", key);
        }
    }

    /// Number of cached entries, resolved or in flight.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    // A slot whose build failed stays unresolved; remove it so the next call
    // retries. Another waiter may still succeed on the same slot afterwards,
    // in which case its handle is simply not cached.
    async fn evict_unresolved(&self, key: &IsolateKey, slot: &Slot) {
        let mut entries = self.entries.write().await;
        if let Some(current) = entries.get(key) {
            if Arc::ptr_eq(current, slot) && current.get().is_none() {
                entries.remove(key);
            }
        }
    }
}
