//! Caching Check responses and debouncing their refreshes.

use crate::aggregator::operation::OperationAggregator;
use crate::aggregator::stats::{AggregatorStats, StatsSnapshot};
use crate::cache::ExpiringCache;
use crate::core::{
    CheckOptions, CheckRequest, CheckResponse, Clock, KindMap, Operation, Result, SystemClock,
};
use crate::signing::sign_check;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A cached Check verdict and the usage it has absorbed since
#[derive(Debug)]
pub struct CachedCheckItem {
    response: CheckResponse,
    last_check_time: Instant,
    is_flushing: bool,
    pending: Option<OperationAggregator>,
}

impl CachedCheckItem {
    fn new(response: CheckResponse, now: Instant) -> Self {
        Self {
            response,
            last_check_time: now,
            is_flushing: false,
            pending: None,
        }
    }

    pub fn response(&self) -> &CheckResponse {
        &self.response
    }

    /// True while a refresh has been requested but no response has arrived
    pub fn is_flushing(&self) -> bool {
        self.is_flushing
    }

    fn is_current(&self, now: Instant, flush_interval: Duration) -> bool {
        now.saturating_duration_since(self.last_check_time) < flush_interval
    }

    fn absorb(&mut self, op: &Operation, kinds: &Arc<KindMap>) -> Result<()> {
        match &mut self.pending {
            Some(pending) => pending.add(op),
            None => {
                self.pending = Some(OperationAggregator::new(op, Arc::clone(kinds))?);
                Ok(())
            }
        }
    }

    fn into_request(self, service_name: &str) -> Option<CheckRequest> {
        self.pending
            .map(|pending| CheckRequest::new(service_name, pending.as_operation()))
    }
}

/// Answers repeat Checks from cache.
///
/// A cached verdict is served until it is `flush_interval` old. The first
/// Check after that gets `None` and becomes the one refresh in flight; other
/// Checks with the same signature keep receiving the cached verdict until
/// [`add_response`](Self::add_response) stores the fresh one.
#[derive(Debug)]
pub struct CheckAggregator {
    service_name: String,
    options: CheckOptions,
    kinds: Arc<KindMap>,
    cache: Option<ExpiringCache<CachedCheckItem>>,
    stats: AggregatorStats,
}

impl CheckAggregator {
    pub fn new<S: Into<String>>(
        service_name: S,
        options: CheckOptions,
        kinds: KindMap,
    ) -> Result<Self> {
        Self::with_clock(service_name, options, kinds, Arc::new(SystemClock))
    }

    /// Build an aggregator reading time from `clock`.
    pub fn with_clock<S: Into<String>>(
        service_name: S,
        options: CheckOptions,
        kinds: KindMap,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let options = options.normalized();
        options.validate()?;
        let cache = ExpiringCache::create(options.cache_options(), clock);
        if cache.is_none() {
            debug!("check caching disabled");
        }
        Ok(Self {
            service_name: service_name.into(),
            options,
            kinds: Arc::new(kinds),
            cache,
            stats: AggregatorStats::new(),
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// How often cached verdicts are refreshed, `None` when caching is off
    pub fn flush_interval(&self) -> Option<Duration> {
        self.cache.as_ref().map(|_| self.options.flush_interval)
    }

    /// How long a verdict stays cached, `None` when caching is off
    pub fn expiration(&self) -> Option<Duration> {
        self.cache.as_ref().map(|_| self.options.expiration)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Look up a cached verdict for `req`.
    ///
    /// `Ok(None)` means the caller must perform the Check itself and hand
    /// the answer to [`add_response`](Self::add_response).
    pub fn check(&self, req: &CheckRequest) -> Result<Option<CheckResponse>> {
        let cache = match &self.cache {
            Some(cache) => cache,
            None => return Ok(None),
        };
        if !req.operation.is_low_importance() {
            return Ok(None);
        }
        let signature = sign_check(&req.operation)?;
        let flush_interval = self.options.flush_interval;

        cache.with_locked(|view| {
            let now = view.now();
            let item = match view.get_mut(&signature) {
                Some(item) => item,
                None => {
                    debug!(%signature, "check cache miss");
                    self.stats.record_check_miss();
                    return Ok(None);
                }
            };
            let current = item.is_current(now, flush_interval);

            if item.response.has_errors() {
                if current {
                    self.stats.record_check_hit();
                    return Ok(Some(item.response.clone()));
                }
                item.last_check_time = now;
                self.stats.record_check_refresh();
                return Ok(None);
            }

            if current {
                item.absorb(&req.operation, &self.kinds)?;
                self.stats.record_check_hit();
                return Ok(Some(item.response.clone()));
            }

            if item.is_flushing {
                warn!(%signature, "previous check refresh did not complete");
            }
            debug!(%signature, "check response is stale, requesting refresh");
            item.is_flushing = true;
            item.last_check_time = now;
            self.stats.record_check_refresh();
            Ok(None)
        })
    }

    /// Store the live answer to `req`, restarting its expiry.
    pub fn add_response(&self, req: &CheckRequest, response: CheckResponse) -> Result<()> {
        let cache = match &self.cache {
            Some(cache) => cache,
            None => return Ok(()),
        };
        let signature = sign_check(&req.operation)?;

        cache.with_locked(|view| {
            let now = view.now();
            let item = match view.remove(&signature) {
                Some(mut item) => {
                    item.response = response;
                    item.last_check_time = now;
                    item.is_flushing = false;
                    item
                }
                None => CachedCheckItem::new(response, now),
            };
            view.insert(signature, item);
        });
        Ok(())
    }

    /// Drain expired verdicts and return requests carrying the usage they
    /// absorbed while cached.
    pub fn flush(&self) -> Vec<CheckRequest> {
        let cache = match &self.cache {
            Some(cache) => cache,
            None => return Vec::new(),
        };
        let requests: Vec<CheckRequest> = cache
            .drain_out_queue()
            .into_iter()
            .filter_map(|item| item.into_request(&self.service_name))
            .collect();

        self.stats.record_flushed(requests.len());
        debug!(
            requests = requests.len(),
            stats = ?self.stats.snapshot(),
            "flushed check aggregator"
        );
        requests
    }

    /// Drop every cached verdict.
    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            let dropped = cache.clear().len();
            debug!(dropped, "cleared check aggregator");
        }
    }
}
