use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Platform API usage counters
#[derive(Debug, Default)]
pub struct ApiMetrics {
    pub total_requests: AtomicU64,
    pub throttled: AtomicU64,
    pub errors: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_throttled(&self) {
        self.throttled.fetch_add(1, Ordering::Relaxed);
        warn!("Platform API throttled the request");
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> ApiStats {
        ApiStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }

}

/// Point-in-time copy of the counters.
///
/// Counters are process-wide; a run reports the counts `since` a snapshot
/// taken when it started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApiStats {
    pub total_requests: u64,
    pub throttled: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl ApiStats {
    /// Counts accumulated after `baseline` was taken.
    pub fn since(&self, baseline: &ApiStats) -> ApiStats {
        ApiStats {
            total_requests: self.total_requests.saturating_sub(baseline.total_requests),
            throttled: self.throttled.saturating_sub(baseline.throttled),
            errors: self.errors.saturating_sub(baseline.errors),
            cache_hits: self.cache_hits.saturating_sub(baseline.cache_hits),
            cache_misses: self.cache_misses.saturating_sub(baseline.cache_misses),
        }
    }

    pub fn log(&self) {
        info!(
            requests = self.total_requests,
            throttled = self.throttled,
            errors = self.errors,
            cache_hits = self.cache_hits,
            cache_misses = self.cache_misses,
            "Platform API usage"
        );
    }
}

/// Process-wide counters shared by every client instance
static API_METRICS: std::sync::LazyLock<ApiMetrics> = std::sync::LazyLock::new(ApiMetrics::new);

pub fn api_metrics() -> &'static ApiMetrics {
    &API_METRICS
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = ApiMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_error();
        metrics.record_cache_hit();

        let stats = metrics.get_stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 0);
    }

    #[test]
    fn stats_since_baseline_cover_one_run() {
        let metrics = ApiMetrics::new();
        metrics.record_request();
        metrics.record_error();
        let baseline = metrics.get_stats();

        metrics.record_request();
        metrics.record_request();
        metrics.record_cache_miss();

        let run = metrics.get_stats().since(&baseline);
        assert_eq!(
            run,
            ApiStats {
                total_requests: 2,
                cache_misses: 1,
                ..Default::default()
            }
        );
    }
}
