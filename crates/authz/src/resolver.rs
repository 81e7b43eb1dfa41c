//! Key resolution with a single-flight key set cache.
//!
//! [`KeyResolver`] owns the only mutable state in the authorization path: the
//! most recently fetched [`SigningKeySet`].
//!
//! # Architecture
//!
//! ```text
//! resolve(kid) → snapshot cached set (read lock)
//!              → fresh, kid present, key within its nbf/exp? → hit
//!              → otherwise refresh_after(snapshot.attempt)
//!                  → async refresh lock
//!                  → attempt moved on? another caller already fetched: reuse its outcome
//!                  → else fetch once (bounded by the fetch timeout), publish outcome
//!              → look up kid in the refreshed set
//! ```
//!
//! # Guarantees
//!
//! - A cached set is never used past its TTL and a key never outside its own
//!   published `nbf`/`exp` window.
//! - A miss triggers at most one refresh before failing.
//! - Callers that miss while a refresh is in flight share its result,
//!   including a failure. N concurrent misses produce exactly one fetch.
//!
//! # Examples
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//! use casting_authz::{HttpKeySetSource, KeyResolver};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = HttpKeySetSource::new(
//!     "https://casting-agency.us.auth0.com/.well-known/jwks.json",
//!     Duration::from_secs(5),
//! )?;
//! let resolver = Arc::new(KeyResolver::new(Arc::new(source), Duration::from_secs(600)));
//!
//! let key = resolver.resolve("NjVBRjY5MDlCMUIwNzU4RTA2QzZFMDQ4QzQ2MDAyQjVDNjk1RTM2Qg").await?;
//! println!("resolved {}", key.kid());
//! # Ok(())
//! # }
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use fail::fail_point;
use parking_lot::{Mutex, RwLock};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{KeyResolutionError, KeySetError},
    key_set::{SigningKeyRecord, SigningKeySet, unix_now},
    source::KeySetSource,
};

/// Default lifetime of a fetched key set (10 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Default bound on a single key set fetch (5 seconds).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct CachedKeySet {
    keys: SigningKeySet,
    fetched_at: Instant,
}

impl CachedKeySet {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// State published after every refresh attempt.
///
/// `attempt` increases by one per completed fetch. `failure` is the outcome
/// of the latest attempt if it failed. A failed attempt leaves the previous
/// `cached` set in place, and lookups keep hitting it until its TTL runs out.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    attempt: u64,
    cached: Option<Arc<CachedKeySet>>,
    failure: Option<Arc<KeySetError>>,
}

impl Snapshot {
    /// Outcome of the latest attempt, or `None` if an invalidation has since
    /// dropped it.
    fn outcome(&self) -> Option<Result<Arc<CachedKeySet>, KeyResolutionError>> {
        if let Some(failure) = &self.failure {
            return Some(Err(KeyResolutionError::Unavailable(Arc::clone(failure))));
        }
        self.cached.as_ref().map(|cached| Ok(Arc::clone(cached)))
    }
}

/// Point-in-time copy of the resolver's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverMetricsSnapshot {
    /// Key set fetches started.
    pub fetch_count: u64,
    /// Fetches that failed or timed out.
    pub fetch_errors: u64,
    /// Misses that reused a refresh performed by another caller.
    pub coalesced_waits: u64,
    /// Lookups served from the cached set.
    pub cache_hits: u64,
}

#[derive(Debug, Default)]
struct ResolverCounters {
    fetch_count: AtomicU64,
    fetch_errors: AtomicU64,
    coalesced_waits: AtomicU64,
    cache_hits: AtomicU64,
}

/// Resolves key identifiers to verification keys, caching the issuer's key
/// set.
///
/// `Send + Sync`; share one instance per issuer through an `Arc`.
pub struct KeyResolver {
    source: Arc<dyn KeySetSource>,
    ttl: Duration,
    fetch_timeout: Duration,
    state: RwLock<Snapshot>,
    refresh_lock: tokio::sync::Mutex<()>,
    counters: ResolverCounters,
    cancel_token: CancellationToken,
    refresh_handle: Mutex<Option<JoinHandle<()>>>,
}

impl KeyResolver {
    /// Creates a resolver over `source` whose fetched sets live for `ttl`.
    ///
    /// Nothing is fetched until the first lookup.
    #[must_use]
    pub fn new(source: Arc<dyn KeySetSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            state: RwLock::new(Snapshot::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
            counters: ResolverCounters::default(),
            cancel_token: CancellationToken::new(),
            refresh_handle: Mutex::new(None),
        }
    }

    /// Sets the bound on a single fetch. A fetch that exceeds it fails with
    /// [`KeySetError::Timeout`].
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Returns the verification key for `kid`.
    ///
    /// Served from the cached set when it is fresh and the key is within its
    /// validity window; otherwise the set is refreshed once and looked up
    /// again.
    ///
    /// # Errors
    ///
    /// - [`KeyResolutionError::KeyNotFound`] if the refreshed set lacks `kid`
    /// - [`KeyResolutionError::KeyNotYetValid`] / [`KeyResolutionError::KeyExpired`] if the key is
    ///   outside its published window
    /// - [`KeyResolutionError::Unavailable`] if the set could not be fetched
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKeyRecord>, KeyResolutionError> {
        let snapshot = self.state.read().clone();

        if let Some(cached) = snapshot.cached.as_ref().filter(|c| c.is_fresh(self.ttl))
            && let Some(record) = cached.keys.get(kid)
            && record.check_validity(unix_now()).is_ok()
        {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(cache = "key_set", "cache hit");
            return Ok(record);
        }
        tracing::debug!(cache = "key_set", "cache miss");

        let cached = self.refresh_after(snapshot.attempt).await?;
        let record = cached.keys.get(kid).ok_or_else(|| KeyResolutionError::key_not_found(kid))?;
        record.check_validity(unix_now())?;
        Ok(record)
    }

    /// Forces a refresh of the key set.
    ///
    /// Joins an in-flight refresh instead of starting a second one.
    ///
    /// # Errors
    ///
    /// Returns [`KeyResolutionError::Unavailable`] if the fetch fails.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), KeyResolutionError> {
        let seen = self.state.read().attempt;
        self.refresh_after(seen).await.map(|_| ())
    }

    /// Drops the cached key set. The next lookup fetches a fresh one.
    ///
    /// Waits for an in-flight refresh so it cannot republish the dropped set.
    /// An audit event is emitted at INFO level.
    #[tracing::instrument(skip(self))]
    pub async fn invalidate(&self) {
        let _guard = self.refresh_lock.lock().await;
        let evicted = {
            let mut state = self.state.write();
            state.failure = None;
            state.cached.take().map_or(0, |cached| cached.keys.len())
        };
        tracing::info!(
            audit.action = "invalidate_key_set",
            audit.resource = %self.source.location(),
            audit.result = "success",
            audit.evicted = evicted,
            "audit_event"
        );
    }

    /// Starts a background task that refreshes the key set every `interval`.
    ///
    /// The task holds only a weak reference and exits when the resolver is
    /// dropped or [`shutdown`](Self::shutdown) is called. Refresh failures are
    /// logged and retried on the next tick.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    #[must_use]
    pub fn with_refresh_interval(self: Arc<Self>, interval: Duration) -> Arc<Self> {
        let resolver = Arc::downgrade(&self);
        let token = self.cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; the first lookup fetches anyway.
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        tracing::info!("background key set refresh shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(resolver) = resolver.upgrade() else { break };
                        if let Err(err) = resolver.refresh().await {
                            tracing::warn!(error = %err, "background key set refresh failed");
                        }
                    }
                }
            }
        });

        *self.refresh_handle.lock() = Some(handle);
        self
    }

    /// Stops background refresh and drops the cached key set.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handle = self.refresh_handle.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            tracing::warn!(error = %err, "background refresh task panicked");
        }
        self.invalidate().await;
    }

    /// Current counter values.
    #[must_use]
    pub fn metrics(&self) -> ResolverMetricsSnapshot {
        ResolverMetricsSnapshot {
            fetch_count: self.counters.fetch_count.load(Ordering::Relaxed),
            fetch_errors: self.counters.fetch_errors.load(Ordering::Relaxed),
            coalesced_waits: self.counters.coalesced_waits.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
        }
    }

    /// Number of keys in the cached set, if one is cached.
    #[must_use]
    pub fn cached_key_count(&self) -> Option<usize> {
        self.state.read().cached.as_ref().map(|cached| cached.keys.len())
    }

    /// Configured key set lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Configured fetch bound.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Refreshes unless another caller completed a refresh after `seen_attempt`
    /// whose outcome is still published, in which case that outcome is
    /// returned. An outcome dropped by [`invalidate`](Self::invalidate) does
    /// not count; the caller fetches for itself.
    async fn refresh_after(
        &self,
        seen_attempt: u64,
    ) -> Result<Arc<CachedKeySet>, KeyResolutionError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.state.read().clone();
        if current.attempt != seen_attempt
            && let Some(outcome) = current.outcome()
        {
            self.counters.coalesced_waits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(attempt = current.attempt, "joined completed refresh");
            return outcome;
        }

        let fetched = self.fetch().await;

        let mut state = self.state.write();
        state.attempt += 1;
        match fetched {
            Ok(keys) => {
                let cached = Arc::new(CachedKeySet { keys, fetched_at: Instant::now() });
                state.cached = Some(Arc::clone(&cached));
                state.failure = None;
                Ok(cached)
            },
            Err(err) => {
                let err = Arc::new(err);
                state.failure = Some(Arc::clone(&err));
                Err(KeyResolutionError::Unavailable(err))
            },
        }
    }

    #[tracing::instrument(skip(self), fields(source = %self.source.location()))]
    async fn fetch(&self) -> Result<SigningKeySet, KeySetError> {
        self.counters.fetch_count.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let result = self.fetch_bounded().await;

        match &result {
            Ok(keys) => {
                tracing::debug!(
                    keys = keys.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "fetched key set"
                );
            },
            Err(err) => {
                self.counters.fetch_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %err, "key set fetch failed");
            },
        }
        result
    }

    async fn fetch_bounded(&self) -> Result<SigningKeySet, KeySetError> {
        fail_point!("resolver-before-fetch", |_| {
            Err(KeySetError::internal("injected failure before key set fetch"))
        });

        match tokio::time::timeout(self.fetch_timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(KeySetError::Timeout(self.fetch_timeout)),
        }
    }
}

impl Drop for KeyResolver {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl std::fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyResolver")
            .field("source", &self.source.location())
            .field("ttl", &self.ttl)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}
