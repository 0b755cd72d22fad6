//! TTL+LRU cache of transcoded variants.
//!
//! One mutex-guarded structure owns the mapping: a hash map for lookups and
//! an insertion-order queue for O(1) amortized eviction. Entries are never
//! reordered after insertion (a variant's age is its creation time), so the
//! queue front is always the oldest live entry. Expired entries a read
//! happens to find are dropped on the spot; everything else is the sweep's
//! job.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Cache key: which stored original, at which byte budget.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantKey {
    pub path: PathBuf,
    pub budget: u64,
}

struct CacheEntry {
    bytes: Arc<Vec<u8>>,
    created: Instant,
}

struct CacheInner {
    map: HashMap<VariantKey, CacheEntry>,
    // (key, created) pairs in insertion order; a pair whose `created` no
    // longer matches the map entry is stale and skipped during eviction.
    order: VecDeque<(VariantKey, Instant)>,
}

/// Outcome of one sweep pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_removed: usize,
    pub overflow_removed: usize,
    pub remaining: usize,
}

pub struct VariantCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    max_entries: usize,
}

impl VariantCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// A cached variant younger than the TTL, if any. An expired entry found
    /// here is dropped; reads never evict anything else.
    pub fn get(&self, key: &VariantKey) -> Option<Arc<Vec<u8>>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.map.get(key) {
            Some(entry) if entry.created.elapsed() <= self.ttl => Some(Arc::clone(&entry.bytes)),
            Some(_) => {
                inner.map.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: VariantKey, bytes: Arc<Vec<u8>>) {
        let created = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        inner.order.push_back((key.clone(), created));
        inner.map.insert(key, CacheEntry { bytes, created });
    }

    /// Drop expired entries, then oldest-first until back under the cap.
    pub fn sweep(&self) -> SweepReport {
        let mut inner = self.inner.lock().unwrap();
        let ttl = self.ttl;

        let expired: Vec<VariantKey> = inner
            .map
            .iter()
            .filter(|(_, entry)| entry.created.elapsed() > ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.map.remove(key);
        }

        let mut overflow_removed = 0;
        while inner.map.len() > self.max_entries {
            let Some((key, created)) = inner.order.pop_front() else {
                break;
            };
            match inner.map.get(&key) {
                // Only evict if this queue entry still describes the live
                // one; otherwise it's a leftover of an expired or replaced
                // entry.
                Some(entry) if entry.created == created => {
                    inner.map.remove(&key);
                    overflow_removed += 1;
                }
                _ => {}
            }
        }

        // Shed stale queue heads so the queue can't grow unbounded.
        loop {
            let head_is_stale = match inner.order.front() {
                None => break,
                Some((key, created)) => !matches!(
                    inner.map.get(key),
                    Some(entry) if entry.created == *created
                ),
            };
            if !head_is_stale {
                break;
            }
            inner.order.pop_front();
        }

        SweepReport {
            expired_removed: expired.len(),
            overflow_removed,
            remaining: inner.map.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
