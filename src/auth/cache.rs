//! Positive credential cache
//!
//! Maps usernames to the password that last validated and the moment it was
//! last used. Entries expire `retention` after their last use; successful
//! re-validation slides the window. The map is sharded, so per-key updates
//! proceed concurrently with the sweeper's traversal.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::debug;

/// One cached validation
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Password that validated
    pub password: String,
    /// Moment of the most recent successful validation
    pub last_used: Instant,
}

impl CacheEntry {
    /// Whether this entry has outlived the retention window
    pub fn is_expired(&self, retention: Duration) -> bool {
        self.last_used.elapsed() >= retention
    }
}

/// Concurrent username -> entry map with sliding retention
#[derive(Debug)]
pub struct AuthCache {
    entries: DashMap<String, CacheEntry>,
    retention: Duration,
}

impl AuthCache {
    /// Create an empty cache with the given retention window
    pub fn new(retention: Duration) -> Self {
        AuthCache {
            entries: DashMap::new(),
            retention,
        }
    }

    /// The configured retention window
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Fetch a snapshot of the entry for a username, expired or not.
    ///
    /// Callers decide what expiry means; the sweeper is the only place that
    /// removes entries.
    pub fn lookup(&self, username: &str) -> Option<CacheEntry> {
        self.entries.get(username).map(|e| e.clone())
    }

    /// Validate against the cache, sliding the window on success.
    ///
    /// Returns true iff an entry exists for `username`, its password matches
    /// and it has not expired; in that case `last_used` is refreshed under
    /// the entry's shard lock. A mismatch or an expired entry leaves the
    /// entry untouched.
    pub fn check_and_refresh(&self, username: &str, password: &str) -> bool {
        if let Some(mut entry) = self.entries.get_mut(username) {
            if entry.password == password && !entry.is_expired(self.retention) {
                entry.last_used = Instant::now();
                return true;
            }
        }
        false
    }

    /// Store a freshly validated pair, overwriting any prior entry
    pub fn upsert(&self, username: &str, password: &str) {
        self.entries.insert(
            username.to_string(),
            CacheEntry {
                password: password.to_string(),
                last_used: Instant::now(),
            },
        );
    }

    /// Drop expired entries; returns how many were evicted
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.is_expired(self.retention));
        before.saturating_sub(self.entries.len())
    }

    /// Number of live entries (including not-yet-swept expired ones)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Spawn the background sweeper.
///
/// Ticks every `interval` and evicts expired entries until a shutdown signal
/// arrives.
pub fn spawn_sweeper(
    cache: Arc<AuthCache>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so an empty sweep does
        // not run at startup.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = cache.sweep();
                    if evicted > 0 {
                        debug!("Auth cache sweep evicted {} entries", evicted);
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Auth cache sweeper shutting down");
                    break;
                }
            }
        }
    })
}
