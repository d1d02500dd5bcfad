//! In-memory reply cache with a uniform entry TTL and a janitor sweep.
//!
//! The cache collapses bursts of identical questions. Entries live for a
//! fixed window regardless of the records' own TTLs, and failure replies
//! are cached the same way so a broken upstream is not hammered.

use crate::config::CacheOptions;
use crate::reply::NormalizedReply;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Cache key over `(qname, qtype)`. The qname is expected to be a
/// lowercase FQDN as produced by the listener; no further
/// canonicalization happens here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    qname: String,
    qtype: u16,
}

impl CacheKey {
    pub fn new(qname: &str, qtype: u16) -> Self {
        Self {
            qname: qname.to_string(),
            qtype,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.qname, self.qtype)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub reply: NormalizedReply,
    pub inserted_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

pub struct ReplyCache {
    entries: DashMap<CacheKey, CacheEntry>,
    entry_ttl: Duration,
    janitor_interval: Duration,
    max_retention: Duration,
}

impl ReplyCache {
    pub fn new(opts: &CacheOptions) -> Self {
        Self {
            entries: DashMap::new(),
            entry_ttl: opts.entry_ttl,
            janitor_interval: opts.janitor_interval,
            max_retention: opts.max_retention,
        }
    }

    /// Stored reply for the key, unchanged (record TTLs are not
    /// decremented). Expired entries are treated as absent even before
    /// the janitor removes them.
    pub fn get(&self, key: &CacheKey) -> Option<NormalizedReply> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            return None;
        }
        Some(entry.reply.clone())
    }

    /// Insert or overwrite. Every entry gets the same TTL, failure
    /// replies included.
    pub fn insert(&self, key: CacheKey, reply: NormalizedReply) {
        let now = Instant::now();
        trace!("caching {key} for {:?}", self.entry_ttl);
        self.entries.insert(
            key,
            CacheEntry {
                reply,
                inserted_at: now,
                expires_at: now + self.entry_ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict expired entries and anything past the retention ceiling.
    /// Returns the number of evictions.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        let max_retention = self.max_retention;
        self.entries
            .retain(|_, entry| !entry.is_expired() && entry.inserted_at.elapsed() < max_retention);
        before - self.entries.len()
    }

    /// Periodic sweep until shutdown.
    pub fn spawn_janitor(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cache.janitor_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick fires immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => {
                        let evicted = cache.sweep();
                        if evicted > 0 {
                            debug!("janitor evicted {evicted} cache entries");
                        }
                    }
                }
            }
        });
    }
}
