//! Prometheus metrics for the bridge relay.

use reth_metrics::{
    Metrics,
    metrics::{Counter, Gauge, Histogram},
};

use crate::{event::EventKind, ledger::LedgerStats};

/// Bridge relay metrics
#[derive(Metrics, Clone)]
#[metrics(scope = "bridge_relay")]
pub struct RelayMetrics {
    /// Number of deposit events applied to the ledger
    pub deposits_seen: Counter,

    /// Number of confirmation events applied to the ledger
    pub confirmations_seen: Counter,

    /// Number of completion events applied to the ledger
    pub completions_seen: Counter,

    /// Number of events rejected as malformed or unknown
    pub malformed_events: Counter,

    /// Number of transfers handed out for confirmation
    pub transfers_scheduled: Counter,

    /// Number of transfers retired after completion
    pub transfers_retired: Counter,

    /// Successful confirmation submissions
    pub confirmation_submissions_success: Counter,

    /// Failed confirmation submissions
    pub confirmation_submissions_failure: Counter,

    /// Failed or timed out event polls
    pub fetch_failures: Counter,

    /// Transfers seen and not yet retired
    pub tracked_transfers: Gauge,

    /// Transfers scheduled and not yet observed as confirmed
    pub in_flight_transfers: Gauge,

    /// RPC call latency in seconds
    pub rpc_latency_seconds: Histogram,
}

impl RelayMetrics {
    /// Record an event accepted by the ledger
    #[inline]
    pub fn record_event(&self, kind: EventKind) {
        match kind {
            EventKind::Deposit => self.deposits_seen.increment(1),
            EventKind::Confirmation => self.confirmations_seen.increment(1),
            EventKind::Completion => self.completions_seen.increment(1),
        }
    }

    /// Record an event rejected by the ledger
    #[inline]
    pub fn record_malformed_event(&self) {
        self.malformed_events.increment(1);
    }

    #[inline]
    pub fn record_scheduled(&self, count: usize) {
        self.transfers_scheduled.increment(count as u64);
    }

    #[inline]
    pub fn record_retired(&self, count: u64) {
        self.transfers_retired.increment(count);
    }

    #[inline]
    pub fn record_submission_success(&self) {
        self.confirmation_submissions_success.increment(1);
    }

    #[inline]
    pub fn record_submission_failure(&self) {
        self.confirmation_submissions_failure.increment(1);
    }

    #[inline]
    pub fn record_fetch_failure(&self) {
        self.fetch_failures.increment(1);
    }

    /// Record the current ledger size
    #[inline]
    pub fn record_ledger(&self, stats: &LedgerStats, in_flight: usize) {
        self.tracked_transfers.set(stats.transfers as f64);
        self.in_flight_transfers.set(in_flight as f64);
    }

    /// Record RPC latency
    #[inline]
    pub fn record_rpc_latency(&self, duration_secs: f64) {
        self.rpc_latency_seconds.record(duration_secs);
    }
}
