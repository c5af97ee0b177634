//! Chain event sources.
//!
//! A source polls one chain for the logs the relay cares about and hands them
//! out in ascending block order. It only reads blocks that are at least
//! `max_reorg_depth` blocks below the chain head, so every event it yields is
//! treated as final.

use std::time::Duration;

use alloy::{
    primitives::{Address, B256, Bytes},
    providers::Provider,
    rpc::types::{Filter, Log},
    sol_types::{SolEvent, SolEventInterface},
};
use async_trait::async_trait;
use bridge_relay_contracts::{
    COMPLETION_EVENT_NAME, CONFIRMATION_EVENT_NAME, HomeBridgeEvent, IHomeBridge, ITransferToken,
    TRANSFER_EVENT_NAME,
};
use eyre::{Result, WrapErr, eyre};
use tracing::{debug, warn};

use crate::{
    event::{ChainEvent, EventArgs},
    retry::rpc_call,
};

/// Deadline for one RPC round-trip unless configured otherwise.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// `eth_getLogs` requests a single poll makes before handing back what it has.
pub const DEFAULT_MAX_CHUNKS_PER_POLL: usize = 20;

/// Events fetched by a single poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    /// Decoded events in ascending `(block_number, log_index)` order.
    pub events: Vec<ChainEvent>,
    /// Last block consumed so far, `None` if nothing was consumed yet.
    pub synced_until: Option<u64>,
    /// The source consumed everything up to its safe head.
    pub caught_up: bool,
}

/// A chain the relay polls for events.
#[async_trait]
pub trait EventSource: Send {
    /// Name used in logs.
    fn chain(&self) -> &str;

    /// Fetch events that became final since the previous call.
    ///
    /// A source far behind may return part of its backlog with `caught_up`
    /// unset. An error means nothing was consumed; the next call starts from
    /// the same block.
    async fn fetch_new_events(&mut self) -> Result<EventBatch>;
}

/// Decoder from a raw log into a relay event.
pub type LogDecoder = fn(&Log) -> Result<ChainEvent>;

/// Polls `eth_getLogs` for one filter, tracking the next block to read.
pub struct LogPoller<P> {
    chain: String,
    provider: P,
    filter: Filter,
    decode: LogDecoder,
    next_block: u64,
    max_reorg_depth: u64,
    max_block_range: u64,
    max_chunks_per_poll: usize,
    rpc_timeout: Duration,
}

impl<P: Provider> LogPoller<P> {
    pub fn new(
        chain: impl Into<String>,
        provider: P,
        filter: Filter,
        decode: LogDecoder,
        start_block: u64,
        max_reorg_depth: u64,
    ) -> Self {
        Self {
            chain: chain.into(),
            provider,
            filter,
            decode,
            next_block: start_block,
            max_reorg_depth,
            max_block_range: u64::MAX,
            max_chunks_per_poll: DEFAULT_MAX_CHUNKS_PER_POLL,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    /// Deposits: token `Transfer` events whose `to` is the foreign bridge.
    pub fn foreign_deposits(
        provider: P,
        token: Address,
        foreign_bridge: Address,
        start_block: u64,
        max_reorg_depth: u64,
    ) -> Self {
        let filter = Filter::new()
            .address(token)
            .event_signature(ITransferToken::Transfer::SIGNATURE_HASH)
            .topic2(foreign_bridge.into_word());

        Self::new("foreign", provider, filter, decode_deposit_log, start_block, max_reorg_depth)
    }

    /// `Confirmation` and `TransferCompleted` events of the home bridge.
    pub fn home_bridge_events(
        provider: P,
        home_bridge: Address,
        start_block: u64,
        max_reorg_depth: u64,
    ) -> Self {
        let filter = Filter::new().address(home_bridge).event_signature(vec![
            IHomeBridge::Confirmation::SIGNATURE_HASH,
            IHomeBridge::TransferCompleted::SIGNATURE_HASH,
        ]);

        Self::new("home", provider, filter, decode_home_bridge_log, start_block, max_reorg_depth)
    }

    /// Cap the block range of a single `eth_getLogs` request.
    pub fn with_max_block_range(mut self, max_block_range: u64) -> Self {
        self.max_block_range = max_block_range.max(1);
        self
    }

    /// Cap the `eth_getLogs` requests of a single poll.
    pub fn with_max_chunks_per_poll(mut self, max_chunks: usize) -> Self {
        self.max_chunks_per_poll = max_chunks.max(1);
        self
    }

    /// Deadline for each RPC round-trip.
    pub const fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    /// First block the next poll will read.
    pub const fn next_block(&self) -> u64 {
        self.next_block
    }

    fn synced_until(&self) -> Option<u64> {
        self.next_block.checked_sub(1)
    }

    fn batch(&self, events: Vec<ChainEvent>, caught_up: bool) -> EventBatch {
        EventBatch {
            events,
            synced_until: self.synced_until(),
            caught_up,
        }
    }

    fn decode_logs(&self, logs: Vec<Log>, events: &mut Vec<ChainEvent>) {
        for log in logs {
            if log.removed {
                continue;
            }
            match (self.decode)(&log) {
                Ok(event) => events.push(event),
                Err(err) => warn!(
                    chain = %self.chain,
                    block_number = ?log.block_number,
                    tx_hash = ?log.transaction_hash,
                    error = %err,
                    "Skipping undecodable log"
                ),
            }
        }
    }
}

#[async_trait]
impl<P: Provider> EventSource for LogPoller<P> {
    fn chain(&self) -> &str {
        &self.chain
    }

    async fn fetch_new_events(&mut self) -> Result<EventBatch> {
        let head = rpc_call("get_block_number", self.rpc_timeout, || async {
            Ok(self.provider.get_block_number().await?)
        })
        .await
        .wrap_err_with(|| format!("failed to fetch {} chain head", self.chain))?;

        let Some(safe_head) = head.checked_sub(self.max_reorg_depth) else {
            return Ok(self.batch(Vec::new(), true));
        };

        // Committed only when the batch is returned.
        let mut next_block = self.next_block;
        let mut events = Vec::new();
        let mut chunks = 0;

        while next_block <= safe_head && chunks < self.max_chunks_per_poll {
            let from_block = next_block;
            let to_block = safe_head.min(from_block.saturating_add(self.max_block_range - 1));
            let filter = self.filter.clone().from_block(from_block).to_block(to_block);

            let logs = match rpc_call("get_logs", self.rpc_timeout, || async {
                Ok(self.provider.get_logs(&filter).await?)
            })
            .await
            {
                Ok(logs) => logs,
                Err(err) if from_block == self.next_block => {
                    return Err(err).wrap_err_with(|| {
                        format!(
                            "failed to fetch {} logs for blocks {from_block}..={to_block}",
                            self.chain
                        )
                    });
                }
                Err(err) => {
                    warn!(
                        chain = %self.chain,
                        from_block,
                        to_block,
                        error = %err,
                        "Log fetch failed, returning partial progress"
                    );
                    break;
                }
            };

            debug!(
                chain = %self.chain,
                from_block,
                to_block,
                logs = logs.len(),
                "Fetched logs"
            );
            self.decode_logs(logs, &mut events);
            next_block = to_block + 1;
            chunks += 1;
        }

        events.sort_by_key(|event| (event.block_number, event.transaction_index, event.log_index));
        self.next_block = next_block;

        Ok(self.batch(events, next_block > safe_head))
    }
}

fn log_position(log: &Log) -> Result<(u64, u64, u64, B256)> {
    let block_number = log
        .block_number
        .ok_or_else(|| eyre!("log is missing its block number"))?;
    Ok((
        block_number,
        log.transaction_index.unwrap_or_default(),
        log.log_index.unwrap_or_default(),
        log.transaction_hash.unwrap_or_default(),
    ))
}

/// Decode a token `Transfer` log into a deposit.
pub fn decode_deposit_log(log: &Log) -> Result<ChainEvent> {
    let (block_number, transaction_index, log_index, transaction_hash) = log_position(log)?;
    let transfer = log
        .log_decode::<ITransferToken::Transfer>()
        .wrap_err("failed to decode Transfer log")?
        .inner
        .data;

    Ok(ChainEvent {
        name: TRANSFER_EVENT_NAME.to_string(),
        block_number,
        transaction_index,
        log_index,
        transaction_hash,
        args: EventArgs::Transfer {
            from: transfer.from,
            to: transfer.to,
            value: transfer.value,
        },
    })
}

/// Decode a home bridge `Confirmation` or `TransferCompleted` log.
pub fn decode_home_bridge_log(log: &Log) -> Result<ChainEvent> {
    let (block_number, transaction_index, log_index, transaction_hash) = log_position(log)?;
    let decoded = HomeBridgeEvent::decode_log(&log.inner)
        .wrap_err("failed to decode home bridge log")?
        .data;

    let (name, transfer_hash) = match decoded {
        HomeBridgeEvent::Confirmation(event) => (CONFIRMATION_EVENT_NAME, event.transferHash),
        HomeBridgeEvent::TransferCompleted(event) => (COMPLETION_EVENT_NAME, event.transferHash),
    };

    Ok(ChainEvent {
        name: name.to_string(),
        block_number,
        transaction_index,
        log_index,
        transaction_hash,
        args: EventArgs::TransferHash(Bytes::copy_from_slice(transfer_hash.as_slice())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{
        primitives::{LogData, U64, U256},
        providers::ProviderBuilder,
        transports::mock::Asserter,
    };

    const TOKEN: Address = Address::repeat_byte(0x70);
    const FOREIGN_BRIDGE: Address = Address::repeat_byte(0xFB);
    const HOME_BRIDGE: Address = Address::repeat_byte(0xBB);

    fn rpc_log(address: Address, data: LogData, block_number: u64, log_index: u64) -> Log {
        Log {
            inner: alloy::primitives::Log { address, data },
            block_hash: None,
            block_number: Some(block_number),
            block_timestamp: None,
            transaction_hash: Some(B256::repeat_byte(block_number as u8)),
            transaction_index: Some(0),
            log_index: Some(log_index),
            removed: false,
        }
    }

    fn deposit_log(from: Address, value: u64, block_number: u64, log_index: u64) -> Log {
        let event = ITransferToken::Transfer {
            from,
            to: FOREIGN_BRIDGE,
            value: U256::from(value),
        };
        rpc_log(TOKEN, event.encode_log_data(), block_number, log_index)
    }

    fn foreign_poller(
        asserter: &Asserter,
        start_block: u64,
        depth: u64,
    ) -> LogPoller<impl Provider> {
        let provider = ProviderBuilder::new().connect_mocked_client(asserter.clone());
        LogPoller::foreign_deposits(provider, TOKEN, FOREIGN_BRIDGE, start_block, depth)
    }

    #[test]
    fn test_decode_deposit_log() {
        let sender = Address::repeat_byte(0x01);
        let event = decode_deposit_log(&deposit_log(sender, 500, 42, 3)).unwrap();

        assert_eq!(event.name, TRANSFER_EVENT_NAME);
        assert_eq!(event.block_number, 42);
        assert_eq!(event.log_index, 3);
        assert_eq!(
            event.args,
            EventArgs::Transfer {
                from: sender,
                to: FOREIGN_BRIDGE,
                value: U256::from(500u64),
            }
        );
    }

    #[test]
    fn test_decode_home_bridge_logs() {
        let transfer_hash = B256::repeat_byte(0xAA);
        let confirmation = IHomeBridge::Confirmation {
            transferHash: transfer_hash,
            transactionHash: B256::repeat_byte(0x01),
            amount: U256::from(10u64),
            recipient: Address::repeat_byte(0x02),
            validator: Address::repeat_byte(0x03),
        };
        let completed = IHomeBridge::TransferCompleted {
            transferHash: transfer_hash,
            transactionHash: B256::repeat_byte(0x01),
            amount: U256::from(10u64),
            recipient: Address::repeat_byte(0x02),
            coinTransferSuccessful: true,
        };

        let event =
            decode_home_bridge_log(&rpc_log(HOME_BRIDGE, confirmation.encode_log_data(), 9, 0))
                .unwrap();
        assert_eq!(event.name, CONFIRMATION_EVENT_NAME);
        assert_eq!(
            event.args,
            EventArgs::TransferHash(Bytes::copy_from_slice(transfer_hash.as_slice()))
        );

        let event =
            decode_home_bridge_log(&rpc_log(HOME_BRIDGE, completed.encode_log_data(), 9, 1))
                .unwrap();
        assert_eq!(event.name, COMPLETION_EVENT_NAME);
    }

    #[test]
    fn test_decode_rejects_foreign_logs() {
        let log = deposit_log(Address::repeat_byte(0x01), 1, 5, 0);
        assert!(decode_home_bridge_log(&log).is_err());

        let mut pending = log;
        pending.block_number = None;
        assert!(decode_deposit_log(&pending).is_err());
    }

    #[tokio::test]
    async fn test_poll_stops_at_reorg_depth() {
        let asserter = Asserter::new();
        let mut poller = foreign_poller(&asserter, 0, 10);

        asserter.push_success(&U64::from(100));
        asserter.push_success(&vec![
            deposit_log(Address::repeat_byte(0x02), 7, 60, 0),
            deposit_log(Address::repeat_byte(0x01), 5, 50, 1),
        ]);

        let batch = poller.fetch_new_events().await.unwrap();
        assert_eq!(batch.synced_until, Some(90));
        assert!(batch.caught_up);
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.events[0].block_number, 50);
        assert_eq!(batch.events[1].block_number, 60);
        assert_eq!(poller.next_block(), 91);
    }

    #[tokio::test]
    async fn test_poll_before_reorg_depth_reads_nothing() {
        let asserter = Asserter::new();
        let mut poller = foreign_poller(&asserter, 0, 10);

        asserter.push_success(&U64::from(4));

        let batch = poller.fetch_new_events().await.unwrap();
        assert!(batch.events.is_empty());
        assert!(batch.caught_up);
        assert_eq!(batch.synced_until, None);
        assert_eq!(poller.next_block(), 0);
    }

    #[tokio::test]
    async fn test_removed_and_undecodable_logs_are_skipped() {
        let asserter = Asserter::new();
        let mut poller = foreign_poller(&asserter, 0, 1);

        let mut removed = deposit_log(Address::repeat_byte(0x01), 5, 3, 0);
        removed.removed = true;
        let garbage = rpc_log(TOKEN, LogData::new_unchecked(vec![], Bytes::new()), 3, 1);
        let valid = deposit_log(Address::repeat_byte(0x02), 6, 4, 0);

        asserter.push_success(&U64::from(10));
        asserter.push_success(&vec![removed, garbage, valid]);

        let batch = poller.fetch_new_events().await.unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].block_number, 4);
    }

    #[tokio::test]
    async fn test_failed_chunk_keeps_earlier_progress() {
        let asserter = Asserter::new();
        let mut poller = foreign_poller(&asserter, 0, 1).with_max_block_range(50);

        asserter.push_success(&U64::from(101));
        asserter.push_success(&vec![deposit_log(Address::repeat_byte(0x01), 5, 10, 0)]);
        asserter.push_failure_msg("invalid block range");

        let batch = poller.fetch_new_events().await.unwrap();
        assert!(!batch.caught_up);
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.synced_until, Some(49));
        assert_eq!(poller.next_block(), 50);
    }

    #[tokio::test]
    async fn test_failed_first_chunk_consumes_nothing() {
        let asserter = Asserter::new();
        let mut poller = foreign_poller(&asserter, 20, 1);

        asserter.push_success(&U64::from(30));
        asserter.push_failure_msg("invalid block range");

        assert!(poller.fetch_new_events().await.is_err());
        assert_eq!(poller.next_block(), 20);
    }

    #[tokio::test]
    async fn test_backlog_is_read_in_chunks() {
        let asserter = Asserter::new();
        let mut poller = foreign_poller(&asserter, 0, 1).with_max_block_range(50);

        asserter.push_success(&U64::from(101));
        asserter.push_success(&vec![deposit_log(Address::repeat_byte(0x01), 5, 49, 0)]);
        asserter.push_success(&Vec::<Log>::new());
        asserter.push_success(&vec![deposit_log(Address::repeat_byte(0x02), 6, 100, 0)]);

        let batch = poller.fetch_new_events().await.unwrap();
        assert!(batch.caught_up);
        assert_eq!(batch.synced_until, Some(100));
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.events[0].block_number, 49);
        assert_eq!(batch.events[1].block_number, 100);
        assert_eq!(poller.next_block(), 101);
    }

    #[tokio::test]
    async fn test_long_backlog_advances_across_polls() {
        let asserter = Asserter::new();
        let mut poller = foreign_poller(&asserter, 0, 1)
            .with_max_block_range(10)
            .with_max_chunks_per_poll(2);

        // Safe head 49: five chunks, two per poll.
        for (poll, next_block) in [(0, 20), (1, 40), (2, 50)] {
            asserter.push_success(&U64::from(50));
            let chunks = if poll == 2 { 1 } else { 2 };
            for _ in 0..chunks {
                asserter.push_success(&Vec::<Log>::new());
            }

            let batch = poller.fetch_new_events().await.unwrap();
            assert_eq!(poller.next_block(), next_block);
            assert_eq!(batch.synced_until, Some(next_block - 1));
            assert_eq!(batch.caught_up, next_block == 50);
        }
    }
}
