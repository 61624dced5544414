//! In-memory cache store for pull request conversations.
//!
//! Entries are keyed by `(provider id, exact pull request id)` and hold the
//! conversation graph, the wall-clock instant of the last full fetch, and
//! any pending mutation error. The store owns the freshness policy: reads
//! prefer the cached graph unless the caller forces a refetch, the entry is
//! missing, or the entry is stale (older than the TTL, one hour by
//! default). Stale reads are logged at warning level because they force a
//! full refetch instead of the incremental path.
//!
//! The store also hands out per-key async locks so callers can serialise
//! mutations and coalesce concurrent refetches of the same id.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::conversation::ConversationGraph;
use crate::directive::Directive;
use crate::replica::{ApplyOutcome, apply_batch};

/// Freshness TTL applied when none is configured: one hour.
pub const DEFAULT_FRESHNESS_TTL_SECONDS: i64 = 3600;

/// Cache entry key: one logical pull request at one provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Provider identifier (e.g. `gitlab*com`).
    pub provider_id: String,
    /// Exact (native) pull request id.
    pub pull_request_id: String,
}

impl CacheKey {
    /// Creates a key from its two parts.
    #[must_use]
    pub fn new(provider_id: impl Into<String>, pull_request_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            pull_request_id: pull_request_id.into(),
        }
    }
}

/// One cached conversation with its freshness and error bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The cached conversation graph.
    pub graph: ConversationGraph,
    /// Instant of the last successful full fetch.
    pub last_fetched_at: DateTime<Utc>,
    /// Message of the last failed mutation, cleared on the next success.
    pub pending_error: Option<String>,
}

impl CacheEntry {
    /// Whether the entry is older than `ttl` at `now`. The boundary is
    /// strict: an entry exactly `ttl` old is still fresh.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        now.signed_duration_since(self.last_fetched_at) > ttl
    }

    /// Whether the server reports a newer update than the cached graph
    /// carries; used to corroborate lost notifications.
    #[must_use]
    pub fn is_behind(&self, server_updated_at: DateTime<Utc>) -> bool {
        self.graph
            .updated_at()
            .is_none_or(|cached| cached < server_updated_at)
    }
}

/// Why a read could not be served from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefetchReason {
    /// No entry exists for the key.
    Missing,
    /// The entry exceeded the freshness TTL.
    Stale,
    /// The caller forced a refetch.
    Forced,
}

/// Outcome of a freshness-governed read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadDecision {
    /// Serve this cached graph.
    Cached(ConversationGraph),
    /// Perform a full refetch for the stated reason.
    Refetch(RefetchReason),
}

/// Keyed store of cached pull request conversations.
#[derive(Debug)]
pub struct PullRequestCacheStore {
    ttl: TimeDelta,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl PullRequestCacheStore {
    /// Creates a store with the given freshness TTL.
    #[must_use]
    pub fn new(ttl: TimeDelta) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a store with the default one-hour TTL.
    #[must_use]
    pub fn with_default_ttl() -> Self {
        Self::new(TimeDelta::seconds(DEFAULT_FRESHNESS_TTL_SECONDS))
    }

    /// Decides whether a read can be served from cache at `now`.
    pub async fn read(&self, key: &CacheKey, now: DateTime<Utc>, force: bool) -> ReadDecision {
        let entries = self.entries.lock().await;
        let Some(entry) = entries.get(key) else {
            return ReadDecision::Refetch(RefetchReason::Missing);
        };
        if force {
            return ReadDecision::Refetch(RefetchReason::Forced);
        }
        if entry.is_stale(now, self.ttl) {
            warn!(
                provider_id = %key.provider_id,
                pull_request_id = %key.pull_request_id,
                "stale cached conversations, re-fetching"
            );
            return ReadDecision::Refetch(RefetchReason::Stale);
        }
        debug!(
            provider_id = %key.provider_id,
            pull_request_id = %key.pull_request_id,
            "serving cached conversations"
        );
        ReadDecision::Cached(entry.graph.clone())
    }

    /// Creates or wholesale-replaces the entry after a full fetch. Any
    /// pending error is cleared.
    pub async fn insert_conversations(
        &self,
        key: &CacheKey,
        graph: ConversationGraph,
        fetched_at: DateTime<Utc>,
    ) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.clone(),
            CacheEntry {
                graph,
                last_fetched_at: fetched_at,
                pending_error: None,
            },
        );
    }

    /// Applies a directive batch to the cached graph, when one exists.
    ///
    /// The batch is applied to a clone that is swapped in after the pass,
    /// so concurrent readers never observe a half-patched graph. Returns
    /// `None` when no entry is cached for the key (matching the apply-side
    /// contract that uncached conversations are simply not patched).
    pub async fn apply_directives(
        &self,
        key: &CacheKey,
        directives: &[Directive],
    ) -> Option<ApplyOutcome> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(key)?;
        let mut updated = entry.graph.clone();
        let outcome = apply_batch(&mut updated, directives);
        entry.graph = updated;
        Some(outcome)
    }

    /// Returns a clone of the cached entry, when one exists.
    pub async fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Records a mutation failure against the entry, when one exists.
    pub async fn record_error(&self, key: &CacheKey, message: impl Into<String>) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.pending_error = Some(message.into());
        }
    }

    /// Clears any recorded mutation failure.
    pub async fn clear_error(&self, key: &CacheKey) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.pending_error = None;
        }
    }

    /// Removes one cached entry.
    pub async fn remove(&self, key: &CacheKey) {
        self.entries.lock().await.remove(key);
        self.locks.lock().await.remove(key);
    }

    /// Clears the whole store (e.g. on provider disconnect).
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
        self.locks.lock().await.clear();
    }

    /// Hands out the per-key lock used to serialise mutations and coalesce
    /// refetches for one logical pull request.
    pub async fn key_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(key.clone()).or_default())
    }
}
