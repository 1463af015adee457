//! Bounded signature-keyed cache with an overflow queue.
//!
//! `ExpiringCache` stores values under a [`Signature`]. Whenever a value
//! leaves the cache other than by an explicit [`CacheView::remove`] it is
//! moved onto an overflow queue: TTL expiry, capacity eviction, and LRU
//! eviction all end up there. Aggregators drain the queue when flushing, so
//! nothing accumulated in a cached value is lost.
//!
//! All access goes through one mutex. Compound read-modify-write sequences
//! use [`ExpiringCache::with_locked`], which hands the closure a
//! [`CacheView`] bound to a single instant; the guard is released however
//! the closure exits.

mod store;

use crate::core::{CacheOptions, Clock, Eviction};
use crate::signing::Signature;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use store::{LruStore, TtlStore};
use tracing::debug;

enum Store<V> {
    Ttl(TtlStore<V>),
    Lru(LruStore<V>),
}

struct CacheState<V> {
    store: Store<V>,
    out_queue: VecDeque<V>,
}

impl<V> CacheState<V> {
    fn sweep(&mut self, now: Instant) {
        if let Store::Ttl(ttl) = &mut self.store {
            let moved = ttl.expire(now, &mut self.out_queue);
            if moved > 0 {
                debug!(expired = moved, "moved expired cache entries to the overflow queue");
            }
        }
    }

    fn len(&self) -> usize {
        match &self.store {
            Store::Ttl(ttl) => ttl.len(),
            Store::Lru(lru) => lru.len(),
        }
    }
}

/// Signature-keyed cache that never drops an evicted value.
pub struct ExpiringCache<V> {
    state: Mutex<CacheState<V>>,
    clock: Arc<dyn Clock>,
    options: CacheOptions,
}

impl<V> std::fmt::Debug for ExpiringCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<V> ExpiringCache<V> {
    /// Build a cache, or `None` when `options` disable caching.
    pub fn create(options: CacheOptions, clock: Arc<dyn Clock>) -> Option<Self> {
        let capacity = options.capacity()?;
        let store = match options.eviction {
            Eviction::Ttl(ttl) => Store::Ttl(TtlStore::new(capacity, ttl)),
            Eviction::Lru => Store::Lru(LruStore::new(NonZeroUsize::new(capacity)?)),
        };
        Some(Self {
            state: Mutex::new(CacheState {
                store,
                out_queue: VecDeque::new(),
            }),
            clock,
            options,
        })
    }

    /// Options the cache was built with
    pub fn options(&self) -> CacheOptions {
        self.options
    }

    /// Run `f` with exclusive access to the cache.
    ///
    /// Entries already expired at the moment the lock is taken are moved to
    /// the overflow queue before `f` runs.
    pub fn with_locked<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut CacheView<'_, V>) -> R,
    {
        let mut state = self.state.lock();
        let now = self.clock.now();
        state.sweep(now);
        let mut view = CacheView {
            state: &mut state,
            now,
        };
        f(&mut view)
    }

    /// Copy of the live value under `sig`
    pub fn get(&self, sig: &Signature) -> Option<V>
    where
        V: Clone,
    {
        self.with_locked(|view| view.get_mut(sig).cloned())
    }

    /// Store `value` under `sig`, restarting its time to live.
    pub fn set(&self, sig: Signature, value: V) {
        self.with_locked(|view| view.insert(sig, value));
    }

    pub fn contains(&self, sig: &Signature) -> bool {
        self.with_locked(|view| view.contains(sig))
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.with_locked(|view| view.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of evicted values waiting to be drained
    pub fn out_queue_len(&self) -> usize {
        self.with_locked(|view| view.out_queue_len())
    }

    /// Take every evicted value, oldest eviction first.
    pub fn drain_out_queue(&self) -> Vec<V> {
        self.with_locked(|view| view.drain_out_queue())
    }

    /// Empty the cache, returning queued values followed by live ones.
    pub fn clear(&self) -> Vec<V> {
        self.with_locked(|view| view.clear())
    }
}

/// Exclusive handle to a locked cache at a fixed instant
pub struct CacheView<'a, V> {
    state: &'a mut CacheState<V>,
    now: Instant,
}

impl<'a, V> CacheView<'a, V> {
    /// The instant this view was opened at
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Mutable access to a live value; does not restart its time to live.
    pub fn get_mut(&mut self, sig: &Signature) -> Option<&mut V> {
        let now = self.now;
        match &mut self.state.store {
            Store::Ttl(ttl) => ttl.get_mut(sig, now),
            Store::Lru(lru) => lru.get_mut(sig),
        }
    }

    pub fn contains(&mut self, sig: &Signature) -> bool {
        self.get_mut(sig).is_some()
    }

    /// Store `value` under `sig`. Anything evicted to make room goes to the
    /// overflow queue; a value replaced under the same key is dropped.
    pub fn insert(&mut self, sig: Signature, value: V) {
        let now = self.now;
        let state = &mut *self.state;
        let queued = state.out_queue.len();
        match &mut state.store {
            Store::Ttl(ttl) => ttl.insert(sig, value, now, &mut state.out_queue),
            Store::Lru(lru) => lru.insert(sig, value, &mut state.out_queue),
        }
        let evicted = state.out_queue.len() - queued;
        if evicted > 0 {
            debug!(evicted, "cache full, evicted entries to the overflow queue");
        }
    }

    /// Take a live value out of the cache without queueing it.
    pub fn remove(&mut self, sig: &Signature) -> Option<V> {
        let now = self.now;
        match &mut self.state.store {
            Store::Ttl(ttl) => ttl.remove(sig, now),
            Store::Lru(lru) => lru.remove(sig),
        }
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn out_queue_len(&self) -> usize {
        self.state.out_queue.len()
    }

    pub fn drain_out_queue(&mut self) -> Vec<V> {
        self.state.out_queue.drain(..).collect()
    }

    pub fn clear(&mut self) -> Vec<V> {
        let mut values = self.drain_out_queue();
        match &mut self.state.store {
            Store::Ttl(ttl) => values.extend(ttl.drain()),
            Store::Lru(lru) => values.extend(lru.drain()),
        }
        values
    }
}
