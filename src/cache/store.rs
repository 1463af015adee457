//! Entry stores behind [`ExpiringCache`](super::ExpiringCache).
//!
//! Both stores push whatever they evict onto the caller's overflow queue;
//! neither ever drops a value silently.

use crate::signing::Signature;
use ahash::AHashMap;
use lru::LruCache;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Stale heap nodes tolerated before the heap is rebuilt
const HEAP_SLACK: usize = 32;

/// A cached value and the instant it stops being served
#[derive(Debug)]
pub(crate) struct Entry<V> {
    pub(crate) value: V,
    pub(crate) expires_at: Instant,
    generation: u64,
}

/// The single expiry rule: an entry is gone from `expires_at` onwards.
pub(crate) fn is_expired<V>(entry: &Entry<V>, now: Instant) -> bool {
    now >= entry.expires_at
}

/// Time-to-live store: one map plus a min-heap of deadlines.
///
/// Re-setting a key pushes a fresh deadline and bumps the entry's
/// generation; heap nodes whose generation no longer matches are skipped
/// when they surface.
#[derive(Debug)]
pub(crate) struct TtlStore<V> {
    ttl: Duration,
    capacity: usize,
    entries: AHashMap<Signature, Entry<V>>,
    deadlines: BinaryHeap<Reverse<(Instant, u64, Signature)>>,
    next_generation: u64,
}

impl<V> TtlStore<V> {
    pub(crate) fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            ttl,
            capacity,
            entries: AHashMap::with_capacity(capacity.min(4096)),
            deadlines: BinaryHeap::new(),
            next_generation: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn get_mut(&mut self, sig: &Signature, now: Instant) -> Option<&mut V> {
        match self.entries.get_mut(sig) {
            Some(entry) if !is_expired(entry, now) => Some(&mut entry.value),
            _ => None,
        }
    }

    pub(crate) fn insert(&mut self, sig: Signature, value: V, now: Instant, out: &mut VecDeque<V>) {
        if !self.entries.contains_key(&sig) {
            self.expire(now, out);
            while self.entries.len() >= self.capacity {
                match self.pop_earliest() {
                    Some(evicted) => out.push_back(evicted),
                    None => break,
                }
            }
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        let expires_at = now + self.ttl;
        self.entries.insert(
            sig,
            Entry {
                value,
                expires_at,
                generation,
            },
        );
        self.deadlines.push(Reverse((expires_at, generation, sig)));
        self.compact();
    }

    /// Move every entry expired at `now` onto `out`, earliest deadline first.
    pub(crate) fn expire(&mut self, now: Instant, out: &mut VecDeque<V>) -> usize {
        let mut moved = 0;
        while let Some(Reverse((deadline, generation, sig))) = self.deadlines.peek().copied() {
            if now < deadline {
                break;
            }
            self.deadlines.pop();
            if self.is_current(&sig, generation) {
                if let Some(entry) = self.entries.remove(&sig) {
                    out.push_back(entry.value);
                    moved += 1;
                }
            }
        }
        moved
    }

    pub(crate) fn remove(&mut self, sig: &Signature, now: Instant) -> Option<V> {
        match self.entries.get(sig) {
            Some(entry) if !is_expired(entry, now) => {
                self.entries.remove(sig).map(|entry| entry.value)
            }
            _ => None,
        }
    }

    pub(crate) fn drain(&mut self) -> Vec<V> {
        self.deadlines.clear();
        let mut live: Vec<Entry<V>> = self.entries.drain().map(|(_, entry)| entry).collect();
        live.sort_by_key(|entry| entry.expires_at);
        live.into_iter().map(|entry| entry.value).collect()
    }

    fn pop_earliest(&mut self) -> Option<V> {
        while let Some(Reverse((_, generation, sig))) = self.deadlines.pop() {
            if self.is_current(&sig, generation) {
                return self.entries.remove(&sig).map(|entry| entry.value);
            }
        }
        None
    }

    fn is_current(&self, sig: &Signature, generation: u64) -> bool {
        self.entries
            .get(sig)
            .map_or(false, |entry| entry.generation == generation)
    }

    fn compact(&mut self) {
        if self.deadlines.len() <= self.entries.len() * 2 + HEAP_SLACK {
            return;
        }
        self.deadlines = self
            .entries
            .iter()
            .map(|(sig, entry)| Reverse((entry.expires_at, entry.generation, *sig)))
            .collect();
    }

    #[cfg(test)]
    pub(crate) fn heap_len(&self) -> usize {
        self.deadlines.len()
    }
}

/// Least-recently-used store with no expiry.
#[derive(Debug)]
pub(crate) struct LruStore<V> {
    entries: LruCache<Signature, V>,
}

impl<V> LruStore<V> {
    pub(crate) fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn get_mut(&mut self, sig: &Signature) -> Option<&mut V> {
        self.entries.get_mut(sig)
    }

    pub(crate) fn insert(&mut self, sig: Signature, value: V, out: &mut VecDeque<V>) {
        // `push` hands back either the replaced value for the same key or the
        // evicted least-recently-used pair; only the latter is an eviction.
        if let Some((evicted_sig, evicted)) = self.entries.push(sig, value) {
            if evicted_sig != sig {
                out.push_back(evicted);
            }
        }
    }

    pub(crate) fn remove(&mut self, sig: &Signature) -> Option<V> {
        self.entries.pop(sig)
    }

    pub(crate) fn drain(&mut self) -> Vec<V> {
        let mut values = Vec::with_capacity(self.entries.len());
        while let Some((_, value)) = self.entries.pop_lru() {
            values.push(value);
        }
        values
    }
}
