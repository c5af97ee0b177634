//! The relay control loop.
//!
//! Each tick polls both chains, feeds the events into the [`TransferLedger`]
//! and submits confirmations for whatever the ledger hands out. The driver is
//! the only owner of the ledger.

use std::time::{Duration, Instant};

use futures::{StreamExt, stream};
use tokio::time::{MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::RelayConfig,
    event::{ChainEvent, TransferEvent, TransferHash},
    ledger::TransferLedger,
    metrics::RelayMetrics,
    source::{EventBatch, EventSource},
    submitter::ConfirmationSubmitter,
};

/// Consecutive failed polls of one chain after which failures are logged as errors.
pub const CONSECUTIVE_FAILURE_ALERT: u32 = 10;

/// Timing and concurrency knobs of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub poll_interval: Duration,
    /// Upper bound for one submission. Event sources bound their own calls.
    pub rpc_timeout: Duration,
    pub max_concurrent_submissions: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            rpc_timeout: Duration::from_secs(30),
            max_concurrent_submissions: 4,
        }
    }
}

impl From<&RelayConfig> for DriverConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            poll_interval: config.transfer_event_poll_interval,
            rpc_timeout: config.rpc_timeout,
            max_concurrent_submissions: config.max_concurrent_submissions,
        }
    }
}

/// How far the relay has read the home chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HomeSyncCursor {
    /// Last home block consumed.
    pub synced_until: Option<u64>,
    /// The last home poll succeeded and reached the safe head.
    pub caught_up: bool,
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Events recorded by the ledger.
    pub applied: usize,
    /// Events rejected as malformed or unknown.
    pub rejected: usize,
    /// Transfers whose confirmation was mined, sorted.
    pub submitted: Vec<TransferHash>,
    /// Transfers whose confirmation failed or timed out, sorted.
    pub failed: Vec<TransferHash>,
}

/// Drives one home source, one foreign source and a submitter.
pub struct RelayDriver<H, F, S> {
    home: H,
    foreign: F,
    submitter: S,
    config: DriverConfig,
    ledger: TransferLedger,
    home_cursor: HomeSyncCursor,
    home_failures: u32,
    foreign_failures: u32,
    retired_reported: u64,
    metrics: RelayMetrics,
}

impl<H, F, S> RelayDriver<H, F, S>
where
    H: EventSource,
    F: EventSource,
    S: ConfirmationSubmitter,
{
    pub fn new(home: H, foreign: F, submitter: S, config: DriverConfig) -> Self {
        Self {
            home,
            foreign,
            submitter,
            config,
            ledger: TransferLedger::new(),
            home_cursor: HomeSyncCursor::default(),
            home_failures: 0,
            foreign_failures: 0,
            retired_reported: 0,
            metrics: RelayMetrics::default(),
        }
    }

    pub const fn ledger(&self) -> &TransferLedger {
        &self.ledger
    }

    pub const fn home_cursor(&self) -> HomeSyncCursor {
        self.home_cursor
    }

    pub const fn submitter(&self) -> &S {
        &self.submitter
    }

    /// Run ticks at the poll interval until `cancel` fires.
    ///
    /// A tick in progress is finished before returning.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            poll_interval = ?self.config.poll_interval,
            rpc_timeout = ?self.config.rpc_timeout,
            max_concurrent_submissions = self.config.max_concurrent_submissions,
            "Starting relay"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Relay shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// Poll, ingest and submit once.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        let home_batch =
            poll_source(&mut self.home, &mut self.home_failures, &self.metrics).await;
        self.home_cursor = match &home_batch {
            Some(batch) => HomeSyncCursor {
                synced_until: batch.synced_until,
                caught_up: batch.caught_up,
            },
            None => HomeSyncCursor {
                caught_up: false,
                ..self.home_cursor
            },
        };
        if let Some(batch) = home_batch {
            let chain = self.home.chain().to_string();
            self.ingest(&chain, &batch.events, &mut report);
        }

        let foreign_batch =
            poll_source(&mut self.foreign, &mut self.foreign_failures, &self.metrics).await;
        if let Some(batch) = foreign_batch {
            let chain = self.foreign.chain().to_string();
            self.ingest(&chain, &batch.events, &mut report);
        }

        if self.home_cursor.caught_up {
            let batch = self.ledger.pull_confirmable();
            self.metrics.record_scheduled(batch.len());
            if !batch.is_empty() {
                info!(
                    count = batch.len(),
                    home_synced_until = ?self.home_cursor.synced_until,
                    "Submitting confirmations"
                );
                self.submit_batch(batch, &mut report).await;
            }
        } else {
            debug!(
                home_synced_until = ?self.home_cursor.synced_until,
                "Home chain not caught up, holding back confirmations"
            );
        }

        let stats = self.ledger.stats();
        self.metrics.record_retired(stats.retired_total - self.retired_reported);
        self.retired_reported = stats.retired_total;
        self.metrics.record_ledger(&stats, self.ledger.in_flight());

        report.submitted.sort_unstable();
        report.failed.sort_unstable();
        report
    }

    fn ingest(&mut self, chain: &str, events: &[ChainEvent], report: &mut TickReport) {
        for event in events {
            match self.ledger.apply(event) {
                Ok(applied) => {
                    report.applied += 1;
                    self.metrics.record_event(applied.kind);
                    debug!(
                        %chain,
                        kind = %applied.kind,
                        transfer_hash = %applied.transfer_hash,
                        block_number = event.block_number,
                        retired = applied.retired,
                        "Applied event"
                    );
                }
                Err(err) => {
                    report.rejected += 1;
                    self.metrics.record_malformed_event();
                    warn!(
                        %chain,
                        name = %event.name,
                        block_number = event.block_number,
                        tx_hash = %event.transaction_hash,
                        error = %err,
                        "Skipping event"
                    );
                }
            }
        }
    }

    async fn submit_batch(&self, batch: Vec<TransferEvent>, report: &mut TickReport) {
        let submitter = &self.submitter;
        let rpc_timeout = self.config.rpc_timeout;

        let outcomes: Vec<_> = stream::iter(batch)
            .map(|transfer| async move {
                let started = Instant::now();
                let outcome = timeout(rpc_timeout, submitter.submit_confirmation(&transfer)).await;
                (transfer, outcome, started.elapsed())
            })
            .buffer_unordered(self.config.max_concurrent_submissions.max(1))
            .collect()
            .await;

        for (transfer, outcome, elapsed) in outcomes {
            self.metrics.record_rpc_latency(elapsed.as_secs_f64());
            match outcome {
                Ok(Ok(tx_hash)) => {
                    self.metrics.record_submission_success();
                    info!(
                        transfer_hash = %transfer.transfer_hash,
                        %tx_hash,
                        "Confirmation submitted"
                    );
                    report.submitted.push(transfer.transfer_hash);
                }
                Ok(Err(err)) => {
                    self.metrics.record_submission_failure();
                    error!(
                        transfer_hash = %transfer.transfer_hash,
                        error = %err,
                        "Confirmation failed"
                    );
                    report.failed.push(transfer.transfer_hash);
                }
                Err(_) => {
                    self.metrics.record_submission_failure();
                    error!(
                        transfer_hash = %transfer.transfer_hash,
                        timeout = ?rpc_timeout,
                        "Confirmation timed out"
                    );
                    report.failed.push(transfer.transfer_hash);
                }
            }
        }
    }
}

async fn poll_source<E: EventSource>(
    source: &mut E,
    failures: &mut u32,
    metrics: &RelayMetrics,
) -> Option<EventBatch> {
    let started = Instant::now();
    let outcome = source.fetch_new_events().await;
    metrics.record_rpc_latency(started.elapsed().as_secs_f64());

    let err = match outcome {
        Ok(batch) => {
            if *failures > 0 {
                info!(chain = source.chain(), failures = *failures, "Event polling recovered");
            }
            *failures = 0;
            debug!(
                chain = source.chain(),
                events = batch.events.len(),
                synced_until = ?batch.synced_until,
                caught_up = batch.caught_up,
                "Polled events"
            );
            return Some(batch);
        }
        Err(err) => err,
    };

    *failures = failures.saturating_add(1);
    metrics.record_fetch_failure();
    if *failures >= CONSECUTIVE_FAILURE_ALERT {
        error!(
            chain = source.chain(),
            failures = *failures,
            error = %err,
            "Event polling keeps failing"
        );
    } else {
        warn!(
            chain = source.chain(),
            failures = *failures,
            error = %err,
            "Event polling failed, retrying next tick"
        );
    }
    None
}
