use std::future::Future;

use tracing::{debug, warn};

use crate::engine::EngineError;
use crate::model::Ms;
use crate::observability::REMOTE_FETCHES_TOTAL;
use crate::remote::RemoteError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub fetched_at: Ms,
}

/// Outcome of [`RemoteSyncCache::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Within the TTL window, nothing fetched.
    Fresh,
    /// A new payload replaced the old one.
    Fetched,
    /// The fetch failed; the previous payload is still served.
    Stale,
}

/// Time-boxed snapshot of data owned by the remote system of record.
///
/// Valid while `0 <= now - fetched_at < ttl`. A failed fetch keeps the last good
/// payload and opens a new TTL window before the next attempt, so an outage
/// does not turn every read into a remote call. A cache that has never been
/// filled retries on every refresh.
#[derive(Debug)]
pub struct RemoteSyncCache<T> {
    name: &'static str,
    ttl_ms: Ms,
    entry: Option<CacheEntry<T>>,
    failed_at: Option<Ms>,
    invalidated: bool,
}

impl<T> RemoteSyncCache<T> {
    pub fn new(name: &'static str, ttl_ms: Ms) -> Self {
        Self {
            name,
            ttl_ms,
            entry: None,
            failed_at: None,
            invalidated: false,
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.entry.as_ref().map(|e| &e.payload)
    }

    pub fn fetched_at(&self) -> Option<Ms> {
        self.entry.as_ref().map(|e| e.fetched_at)
    }

    /// `now` inside `[at, at + ttl)`. A clock that stepped back before `at`
    /// counts as expired.
    fn within_ttl(&self, at: Ms, now: Ms) -> bool {
        (0..self.ttl_ms).contains(&(now - at))
    }

    pub fn is_fresh(&self, now: Ms) -> bool {
        !self.invalidated
            && self
                .entry
                .as_ref()
                .is_some_and(|e| self.within_ttl(e.fetched_at, now))
    }

    /// Whether [`RemoteSyncCache::refresh`] at `now` would call the remote.
    /// Differs from `!is_fresh` during the backoff after a failed fetch.
    pub fn needs_fetch(&self, now: Ms) -> bool {
        if self.invalidated {
            return true;
        }
        match &self.entry {
            None => true,
            Some(e) => {
                let last_attempt = self.failed_at.map_or(e.fetched_at, |f| f.max(e.fetched_at));
                !self.within_ttl(last_attempt, now)
            }
        }
    }

    pub fn store(&mut self, payload: T, now: Ms) {
        self.entry = Some(CacheEntry {
            payload,
            fetched_at: now,
        });
        self.failed_at = None;
        self.invalidated = false;
    }

    /// Force the next refresh to fetch, regardless of age.
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    pub async fn refresh<F, Fut>(&mut self, now: Ms, fetch: F) -> Result<Refresh, EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        if !self.needs_fetch(now) {
            return Ok(Refresh::Fresh);
        }
        match fetch().await {
            Ok(payload) => {
                debug!(cache = self.name, "remote snapshot refreshed");
                metrics::counter!(REMOTE_FETCHES_TOTAL, "cache" => self.name, "outcome" => "fetched")
                    .increment(1);
                self.store(payload, now);
                Ok(Refresh::Fetched)
            }
            Err(e) => {
                let Some(fetched_at) = self.fetched_at() else {
                    metrics::counter!(REMOTE_FETCHES_TOTAL, "cache" => self.name, "outcome" => "failed")
                        .increment(1);
                    return Err(EngineError::RemoteFetchFailed(format!("{}: {e}", self.name)));
                };
                warn!(
                    cache = self.name,
                    "remote fetch failed, serving snapshot from {fetched_at}: {e}"
                );
                metrics::counter!(REMOTE_FETCHES_TOTAL, "cache" => self.name, "outcome" => "stale")
                    .increment(1);
                self.failed_at = Some(now);
                self.invalidated = false;
                Ok(Refresh::Stale)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    const TTL: Ms = 30_000;

    async fn ok(v: u32) -> Result<u32, RemoteError> {
        Ok(v)
    }

    async fn down() -> Result<u32, RemoteError> {
        Err(RemoteError::Unavailable("connection refused".into()))
    }

    #[test]
    fn cold_cache_fetches() {
        let mut cache = RemoteSyncCache::new("test", TTL);
        assert!(!cache.is_fresh(0));
        let r = block_on(cache.refresh(0, || ok(7))).unwrap();
        assert_eq!(r, Refresh::Fetched);
        assert_eq!(cache.get(), Some(&7));
        assert!(cache.is_fresh(TTL - 1));
        assert!(!cache.is_fresh(TTL));
    }

    #[test]
    fn fresh_cache_does_not_fetch() {
        let mut cache = RemoteSyncCache::new("test", TTL);
        block_on(cache.refresh(0, || ok(1))).unwrap();
        let r = block_on(cache.refresh(TTL - 1, || ok(2))).unwrap();
        assert_eq!(r, Refresh::Fresh);
        assert_eq!(cache.get(), Some(&1));
    }

    #[test]
    fn expired_cache_refetches() {
        let mut cache = RemoteSyncCache::new("test", TTL);
        block_on(cache.refresh(0, || ok(1))).unwrap();
        let r = block_on(cache.refresh(TTL, || ok(2))).unwrap();
        assert_eq!(r, Refresh::Fetched);
        assert_eq!(cache.get(), Some(&2));
        assert_eq!(cache.fetched_at(), Some(TTL));
    }

    #[test]
    fn cold_failure_is_an_error() {
        let mut cache: RemoteSyncCache<u32> = RemoteSyncCache::new("test", TTL);
        let err = block_on(cache.refresh(0, down)).unwrap_err();
        assert!(matches!(err, EngineError::RemoteFetchFailed(_)));
        assert!(cache.get().is_none());
        // Cold caches retry immediately.
        let r = block_on(cache.refresh(1, || ok(3))).unwrap();
        assert_eq!(r, Refresh::Fetched);
    }

    #[test]
    fn warm_failure_keeps_snapshot() {
        let mut cache = RemoteSyncCache::new("test", TTL);
        block_on(cache.refresh(0, || ok(5))).unwrap();
        let r = block_on(cache.refresh(TTL, down)).unwrap();
        assert_eq!(r, Refresh::Stale);
        assert_eq!(cache.get(), Some(&5));
        assert_eq!(cache.fetched_at(), Some(0));
    }

    #[test]
    fn failure_backs_off_for_one_ttl() {
        let mut cache = RemoteSyncCache::new("test", TTL);
        block_on(cache.refresh(0, || ok(5))).unwrap();
        block_on(cache.refresh(TTL, down)).unwrap();
        let r = block_on(cache.refresh(TTL + 1, || ok(6))).unwrap();
        assert_eq!(r, Refresh::Fresh);
        let r = block_on(cache.refresh(2 * TTL, || ok(6))).unwrap();
        assert_eq!(r, Refresh::Fetched);
        assert_eq!(cache.get(), Some(&6));
    }

    #[test]
    fn clock_stepping_back_expires_snapshot() {
        let fetched = 10_000_000;
        let mut cache = RemoteSyncCache::new("test", TTL);
        block_on(cache.refresh(fetched, || ok(1))).unwrap();
        let earlier = fetched - 3_600_000 + 600_000;
        assert!(!cache.is_fresh(earlier));
        assert!(cache.needs_fetch(earlier));
        let r = block_on(cache.refresh(earlier, || ok(2))).unwrap();
        assert_eq!(r, Refresh::Fetched);
        assert_eq!(cache.get(), Some(&2));
        assert_eq!(cache.fetched_at(), Some(earlier));
    }

    #[test]
    fn clock_stepping_back_ends_backoff() {
        let mut cache = RemoteSyncCache::new("test", TTL);
        block_on(cache.refresh(0, || ok(5))).unwrap();
        block_on(cache.refresh(10 * TTL, down)).unwrap();
        assert!(!cache.needs_fetch(10 * TTL + 1));
        let r = block_on(cache.refresh(5 * TTL, || ok(6))).unwrap();
        assert_eq!(r, Refresh::Fetched);
        assert_eq!(cache.get(), Some(&6));
    }

    #[test]
    fn backoff_needs_no_fetch_while_stale() {
        let mut cache = RemoteSyncCache::new("test", TTL);
        block_on(cache.refresh(0, || ok(5))).unwrap();
        block_on(cache.refresh(TTL, down)).unwrap();
        assert!(!cache.is_fresh(TTL + 1));
        assert!(!cache.needs_fetch(TTL + 1));
        assert!(cache.needs_fetch(2 * TTL));
    }

    #[test]
    fn invalidate_forces_fetch() {
        let mut cache = RemoteSyncCache::new("test", TTL);
        block_on(cache.refresh(0, || ok(1))).unwrap();
        cache.invalidate();
        assert!(!cache.is_fresh(1));
        let r = block_on(cache.refresh(1, || ok(2))).unwrap();
        assert_eq!(r, Refresh::Fetched);
        assert_eq!(cache.get(), Some(&2));
    }
}
