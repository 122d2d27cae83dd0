//! Key/value store holding refresh tokens.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::clock::Clock;
use crate::error::Result;

/// Writes between two sweeps of expired entries.
const PURGE_INTERVAL: usize = 1024;

/// Port for a key/value cache with per-entry expiration.
///
/// Implementations only need single-key atomicity; concurrent writers on the
/// same key resolve as last writer wins.
#[async_trait]
pub trait CredentialCache: Send + Sync {
    /// Get the live value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key` for `ttl` seconds, replacing any entry.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: u64)
    -> Result<()>;

    /// Delete `key`, returning whether a live entry existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Check whether a live entry exists for `key`.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// In-process [`CredentialCache`] for single-node deployments and tests.
///
/// An expired entry is dropped when its key is read or deleted, and a sweep
/// drops all of them once every 1024 writes.
pub struct MemoryCache {
    entries: DashMap<String, (String, u64)>,
    clock: Arc<dyn Clock>,
    writes: AtomicUsize,
}

impl MemoryCache {
    /// Create a new [`MemoryCache`] expiring entries against `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            writes: AtomicUsize::new(0),
        }
    }

    /// Drop every expired entry.
    pub fn purge(&self) {
        let now = self.clock.now();
        self.entries.retain(|_, (_, expire_at)| *expire_at > now);
    }
}

#[async_trait]
impl CredentialCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let value = self
            .entries
            .get(key)
            .filter(|entry| entry.1 > now)
            .map(|entry| entry.0.clone());

        if value.is_none() {
            self.entries.remove_if(key, |_, (_, expire_at)| *expire_at <= now);
        }

        Ok(value)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: u64,
    ) -> Result<()> {
        let expire_at = self.clock.now().saturating_add(ttl);
        self.entries
            .insert(key.to_owned(), (value.to_owned(), expire_at));

        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_INTERVAL
            == PURGE_INTERVAL - 1
        {
            self.purge();
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, (_, expire_at))| expire_at > now))
    }
}

/// Cache whose backend is unreachable.
#[cfg(test)]
pub struct UnavailableCache;

#[cfg(test)]
#[async_trait]
impl CredentialCache for UnavailableCache {
    async fn get(&self, _: &str) -> Result<Option<String>> {
        Err(unreachable_backend())
    }

    async fn set_with_ttl(&self, _: &str, _: &str, _: u64) -> Result<()> {
        Err(unreachable_backend())
    }

    async fn delete(&self, _: &str) -> Result<bool> {
        Err(unreachable_backend())
    }
}

#[cfg(test)]
fn unreachable_backend() -> crate::error::Error {
    crate::error::Error::cache(std::io::Error::other("connection refused"))
}
