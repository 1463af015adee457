//! Batching Report operations between flushes.

use crate::aggregator::operation::OperationAggregator;
use crate::aggregator::stats::{AggregatorStats, StatsSnapshot};
use crate::cache::ExpiringCache;
use crate::core::{
    Clock, KindMap, Operation, ReportOptions, ReportRequest, Result, SystemClock, TallyError,
};
use crate::signing::{sign_report, Signature};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Most operations a single flushed [`ReportRequest`] carries
pub const MAX_OPERATION_COUNT: usize = 1000;

/// What [`ReportAggregator::report`] did with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Absorbed; it will go out with a later flush
    Cached,
    /// Not cacheable; the caller must send it now
    SendDirect,
}

/// Folds Report operations with equal signatures together until their
/// pending entry has aged `flush_interval`.
#[derive(Debug)]
pub struct ReportAggregator {
    service_name: String,
    options: ReportOptions,
    kinds: Arc<KindMap>,
    cache: Option<ExpiringCache<OperationAggregator>>,
    stats: AggregatorStats,
}

impl ReportAggregator {
    pub fn new<S: Into<String>>(
        service_name: S,
        options: ReportOptions,
        kinds: KindMap,
    ) -> Result<Self> {
        Self::with_clock(service_name, options, kinds, Arc::new(SystemClock))
    }

    pub fn with_clock<S: Into<String>>(
        service_name: S,
        options: ReportOptions,
        kinds: KindMap,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        options.validate()?;
        let cache = ExpiringCache::create(options.cache_options(), clock);
        if cache.is_none() {
            debug!("report caching disabled");
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

    /// Age at which pending operations are flushed, `None` when caching is off
    pub fn flush_interval(&self) -> Option<Duration> {
        self.cache.as_ref().map(|_| self.options.flush_interval)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Absorb `req` into the pending batch if every operation allows it.
    ///
    /// All operations are signed before the cache is touched, so an invalid
    /// operation rejects the whole request.
    pub fn report(&self, req: &ReportRequest) -> Result<ReportOutcome> {
        let cache = match &self.cache {
            Some(cache) if req.is_low_importance() => cache,
            _ => {
                self.stats.record_report_sent_direct();
                return Ok(ReportOutcome::SendDirect);
            }
        };

        let signed = req
            .operations
            .iter()
            .map(|op| Ok((sign_report(op)?, op)))
            .collect::<Result<Vec<(Signature, &Operation)>>>()?;

        cache.with_locked(|view| {
            for (signature, op) in &signed {
                match view.get_mut(signature) {
                    Some(pending) => pending.add(op)?,
                    None => {
                        let pending = OperationAggregator::new(op, Arc::clone(&self.kinds))?;
                        view.insert(*signature, pending);
                    }
                }
            }
            Ok::<(), TallyError>(())
        })?;

        self.stats.record_report_cached(signed.len());
        Ok(ReportOutcome::Cached)
    }

    /// Drain every entry that has aged out, batched for sending.
    pub fn flush(&self) -> Vec<ReportRequest> {
        let cache = match &self.cache {
            Some(cache) => cache,
            None => return Vec::new(),
        };
        let operations: Vec<Operation> = cache
            .drain_out_queue()
            .iter()
            .map(OperationAggregator::as_operation)
            .collect();

        self.stats.record_flushed(operations.len());
        let batches = self.batch(operations);
        debug!(
            batches = batches.len(),
            stats = ?self.stats.snapshot(),
            "flushed report aggregator"
        );
        batches
    }

    /// Drain everything still pending, due or not. Meant for shutdown.
    pub fn clear(&self) -> Vec<ReportRequest> {
        let cache = match &self.cache {
            Some(cache) => cache,
            None => return Vec::new(),
        };
        let operations: Vec<Operation> = cache
            .clear()
            .iter()
            .map(OperationAggregator::as_operation)
            .collect();

        self.stats.record_flushed(operations.len());
        debug!(operations = operations.len(), "cleared report aggregator");
        self.batch(operations)
    }

    fn batch(&self, operations: Vec<Operation>) -> Vec<ReportRequest> {
        let batch_count = (operations.len() + MAX_OPERATION_COUNT - 1) / MAX_OPERATION_COUNT;
        let mut batches = Vec::with_capacity(batch_count);
        let mut operations = operations.into_iter().peekable();
        while operations.peek().is_some() {
            let chunk: Vec<Operation> = operations.by_ref().take(MAX_OPERATION_COUNT).collect();
            batches.push(ReportRequest::new(self.service_name.as_str(), chunk));
        }
        batches
    }
}
