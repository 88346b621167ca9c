//! Prometheus metrics (lock-free atomics, zero allocation on hot path).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    // --- Payments ---
    pub payments_prepared: AtomicU64,
    pub payments_recorded: AtomicU64,
    pub payments_failed: AtomicU64,
    pub record_cache_hits: AtomicU64,

    // --- Wallet ---
    pub wallet_signed: AtomicU64,
    pub wallet_rejections: AtomicU64,
    pub wallet_expiries: AtomicU64,
    pub wallet_connect_failures: AtomicU64,

    // --- Backend (μs, updated via CAS) ---
    pub backend_errors: AtomicU64,
    pub record_duration_us_sum: AtomicU64,
    pub record_duration_us_max: AtomicU64,
}

impl Metrics {
    const fn new() -> Self {
        Self {
            payments_prepared: AtomicU64::new(0),
            payments_recorded: AtomicU64::new(0),
            payments_failed: AtomicU64::new(0),
            record_cache_hits: AtomicU64::new(0),
            wallet_signed: AtomicU64::new(0),
            wallet_rejections: AtomicU64::new(0),
            wallet_expiries: AtomicU64::new(0),
            wallet_connect_failures: AtomicU64::new(0),
            backend_errors: AtomicU64::new(0),
            record_duration_us_sum: AtomicU64::new(0),
            record_duration_us_max: AtomicU64::new(0),
        }
    }

    pub fn record_backend_duration(&self, start: Instant) {
        let us = start.elapsed().as_micros() as u64;
        self.record_duration_us_sum.fetch_add(us, Ordering::Relaxed);
        // CAS loop for max tracking
        let mut cur = self.record_duration_us_max.load(Ordering::Relaxed);
        while us > cur {
            match self.record_duration_us_max.compare_exchange_weak(
                cur,
                us,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Render in Prometheus text exposition format.
    pub fn render(&self, cached_records: usize) -> String {
        let prepared = self.payments_prepared.load(Ordering::Relaxed);
        let recorded = self.payments_recorded.load(Ordering::Relaxed);
        let failed = self.payments_failed.load(Ordering::Relaxed);
        let cache_hits = self.record_cache_hits.load(Ordering::Relaxed);
        let signed = self.wallet_signed.load(Ordering::Relaxed);
        let rejections = self.wallet_rejections.load(Ordering::Relaxed);
        let expiries = self.wallet_expiries.load(Ordering::Relaxed);
        let connect_failures = self.wallet_connect_failures.load(Ordering::Relaxed);
        let backend_errors = self.backend_errors.load(Ordering::Relaxed);
        let dur_sum = self.record_duration_us_sum.load(Ordering::Relaxed);
        let dur_max = self.record_duration_us_max.swap(0, Ordering::Relaxed);

        // Convert μs to seconds for Prometheus conventions
        let dur_sum_s = dur_sum as f64 / 1_000_000.0;
        let dur_max_s = dur_max as f64 / 1_000_000.0;

        format!(
            "\
# HELP marketpay_payments_prepared_total Transaction requests built for wallets.\n\
# TYPE marketpay_payments_prepared_total counter\n\
marketpay_payments_prepared_total {prepared}\n\
# HELP marketpay_payments_recorded_total Payments accepted by the backend.\n\
# TYPE marketpay_payments_recorded_total counter\n\
marketpay_payments_recorded_total {recorded}\n\
# HELP marketpay_payments_failed_total Payment attempts that ended in an error.\n\
# TYPE marketpay_payments_failed_total counter\n\
marketpay_payments_failed_total {failed}\n\
# HELP marketpay_record_cache_hits_total Repeated records served without a backend call.\n\
# TYPE marketpay_record_cache_hits_total counter\n\
marketpay_record_cache_hits_total {cache_hits}\n\
# HELP marketpay_wallet_signed_total Transactions signed by the wallet.\n\
# TYPE marketpay_wallet_signed_total counter\n\
marketpay_wallet_signed_total {signed}\n\
# HELP marketpay_wallet_rejections_total Transactions declined in the wallet.\n\
# TYPE marketpay_wallet_rejections_total counter\n\
marketpay_wallet_rejections_total {rejections}\n\
# HELP marketpay_wallet_expiries_total Requests that passed validUntil unsigned.\n\
# TYPE marketpay_wallet_expiries_total counter\n\
marketpay_wallet_expiries_total {expiries}\n\
# HELP marketpay_wallet_connect_failures_total Declined or timed out wallet connects.\n\
# TYPE marketpay_wallet_connect_failures_total counter\n\
marketpay_wallet_connect_failures_total {connect_failures}\n\
# HELP marketpay_backend_errors_total Backend calls that failed.\n\
# TYPE marketpay_backend_errors_total counter\n\
marketpay_backend_errors_total {backend_errors}\n\
# HELP marketpay_record_duration_seconds_sum Total backend record time (seconds).\n\
# TYPE marketpay_record_duration_seconds_sum counter\n\
marketpay_record_duration_seconds_sum {dur_sum_s:.6}\n\
# HELP marketpay_record_duration_seconds_max Max backend record time since last scrape (seconds).\n\
# TYPE marketpay_record_duration_seconds_max gauge\n\
marketpay_record_duration_seconds_max {dur_max_s:.6}\n\
# HELP marketpay_cached_records Payment records held by this instance.\n\
# TYPE marketpay_cached_records gauge\n\
marketpay_cached_records {cached_records}\n"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_counters() {
        METRICS.payments_prepared.fetch_add(1, Ordering::Relaxed);
        let body = METRICS.render(3);
        assert!(body.contains("# TYPE marketpay_payments_prepared_total counter"));
        assert!(body.contains("marketpay_cached_records 3\n"));
    }

    #[test]
    fn test_duration_max_tracks_largest() {
        let m = Metrics::new();
        m.record_backend_duration(Instant::now());
        let first = m.record_duration_us_max.load(Ordering::Relaxed);
        m.record_duration_us_max.store(first + 1_000_000, Ordering::Relaxed);
        m.record_backend_duration(Instant::now());
        assert!(m.record_duration_us_max.load(Ordering::Relaxed) >= 1_000_000);
    }
}
