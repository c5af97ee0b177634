//! In-memory bookkeeping of transfers through their lifecycle.
//!
//! The ledger records which transfer hashes have been seen at each stage and
//! derives the confirmation work from plain set differences:
//!
//! ```text
//! confirmable = transfers - confirmations - completions - scheduled
//! ```
//!
//! Applying the same event twice is a no-op, so the ledger can be rebuilt by
//! replaying both chains from any earlier block. A hash that reached all three
//! stages is retired and dropped from every set.

use std::collections::{HashMap, HashSet};

use crate::{
    error::LedgerError,
    event::{ChainEvent, EventArgs, EventKind, TransferEvent, TransferHash, compute_transfer_hash},
};

/// Outcome of a successful [`TransferLedger::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedEvent {
    pub kind: EventKind,
    pub transfer_hash: TransferHash,
    /// The event completed the lifecycle and the transfer was retired.
    pub retired: bool,
}

/// Sizes of the lifecycle sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub transfers: usize,
    pub confirmations: usize,
    pub completions: usize,
    pub scheduled: usize,
    /// Transfers retired since the ledger was created.
    pub retired_total: u64,
}

/// Lifecycle state of every transfer the relay knows about.
///
/// Owned by a single driver loop; not meant for concurrent mutation.
#[derive(Debug, Default)]
pub struct TransferLedger {
    transfer_events: HashMap<TransferHash, TransferEvent>,

    transfer_hashes: HashSet<TransferHash>,
    confirmation_hashes: HashSet<TransferHash>,
    completion_hashes: HashSet<TransferHash>,

    scheduled_hashes: HashSet<TransferHash>,

    retired_total: u64,
}

impl TransferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a decoded event.
    ///
    /// The event is validated before anything is written, so an error leaves
    /// the ledger exactly as it was.
    pub fn apply(&mut self, event: &ChainEvent) -> Result<AppliedEvent, LedgerError> {
        let kind = event
            .kind()
            .ok_or_else(|| LedgerError::UnknownEventKind(event.name.clone()))?;

        let transfer_hash = match kind {
            EventKind::Deposit => {
                let transfer = deposit_payload(event)?;
                let transfer_hash = transfer.transfer_hash;
                self.transfer_hashes.insert(transfer_hash);
                self.transfer_events.insert(transfer_hash, transfer);
                transfer_hash
            }
            EventKind::Confirmation => {
                let transfer_hash = embedded_transfer_hash(event)?;
                self.confirmation_hashes.insert(transfer_hash);
                transfer_hash
            }
            EventKind::Completion => {
                let transfer_hash = embedded_transfer_hash(event)?;
                self.completion_hashes.insert(transfer_hash);
                transfer_hash
            }
        };

        let retired = self.retire_if_complete(&transfer_hash);

        Ok(AppliedEvent {
            kind,
            transfer_hash,
            retired,
        })
    }

    /// Claims every transfer that still needs a confirmation.
    ///
    /// Returned transfers are marked as scheduled and will not be handed out
    /// again until the process restarts. The batch is sorted by transfer hash.
    pub fn pull_confirmable(&mut self) -> Vec<TransferEvent> {
        let mut confirmable: Vec<TransferHash> = self
            .transfer_hashes
            .iter()
            .filter(|hash| {
                !self.confirmation_hashes.contains(*hash)
                    && !self.completion_hashes.contains(*hash)
                    && !self.scheduled_hashes.contains(*hash)
            })
            .copied()
            .collect();
        confirmable.sort_unstable();

        self.scheduled_hashes.extend(confirmable.iter().copied());

        let batch = confirmable
            .iter()
            .filter_map(|hash| self.transfer_events.get(hash).cloned())
            .collect();

        self.retire_completed();
        batch
    }

    /// Retires every transfer that has been seen at all three stages.
    ///
    /// Returns the number of retired transfers.
    pub fn retire_completed(&mut self) -> usize {
        let all_stages_seen: Vec<TransferHash> = self
            .transfer_hashes
            .iter()
            .filter(|hash| {
                self.confirmation_hashes.contains(*hash) && self.completion_hashes.contains(*hash)
            })
            .copied()
            .collect();

        for hash in &all_stages_seen {
            self.retire(hash);
        }
        all_stages_seen.len()
    }

    fn retire_if_complete(&mut self, hash: &TransferHash) -> bool {
        let complete = self.transfer_hashes.contains(hash)
            && self.confirmation_hashes.contains(hash)
            && self.completion_hashes.contains(hash);
        if complete {
            self.retire(hash);
        }
        complete
    }

    fn retire(&mut self, hash: &TransferHash) {
        self.transfer_hashes.remove(hash);
        self.confirmation_hashes.remove(hash);
        self.completion_hashes.remove(hash);
        self.scheduled_hashes.remove(hash);
        self.transfer_events.remove(hash);
        self.retired_total += 1;
    }

    pub fn has_transfer(&self, hash: &TransferHash) -> bool {
        self.transfer_hashes.contains(hash)
    }

    pub fn is_confirmed(&self, hash: &TransferHash) -> bool {
        self.confirmation_hashes.contains(hash)
    }

    pub fn is_completed(&self, hash: &TransferHash) -> bool {
        self.completion_hashes.contains(hash)
    }

    pub fn is_scheduled(&self, hash: &TransferHash) -> bool {
        self.scheduled_hashes.contains(hash)
    }

    /// Stored deposit payload, present until the transfer is retired.
    pub fn transfer(&self, hash: &TransferHash) -> Option<&TransferEvent> {
        self.transfer_events.get(hash)
    }

    /// Transfers handed out for confirmation and not yet observed as confirmed.
    pub fn in_flight(&self) -> usize {
        self.scheduled_hashes
            .iter()
            .filter(|hash| !self.confirmation_hashes.contains(*hash))
            .count()
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            transfers: self.transfer_hashes.len(),
            confirmations: self.confirmation_hashes.len(),
            completions: self.completion_hashes.len(),
            scheduled: self.scheduled_hashes.len(),
            retired_total: self.retired_total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transfer_hashes.is_empty()
            && self.confirmation_hashes.is_empty()
            && self.completion_hashes.is_empty()
            && self.scheduled_hashes.is_empty()
            && self.transfer_events.is_empty()
    }
}

fn malformed(event: &ChainEvent, reason: impl Into<String>) -> LedgerError {
    LedgerError::MalformedEvent {
        name: event.name.clone(),
        block_number: event.block_number,
        reason: reason.into(),
    }
}

fn deposit_payload(event: &ChainEvent) -> Result<TransferEvent, LedgerError> {
    let EventArgs::Transfer { from, to, value } = &event.args else {
        return Err(malformed(event, "missing transfer arguments"));
    };

    Ok(TransferEvent {
        transfer_hash: compute_transfer_hash(*from, *to, *value, event.block_number),
        sender: *from,
        recipient: *to,
        amount: *value,
        block_number: event.block_number,
        transaction_index: event.transaction_index,
        transaction_hash: event.transaction_hash,
        log_index: event.log_index,
    })
}

fn embedded_transfer_hash(event: &ChainEvent) -> Result<TransferHash, LedgerError> {
    let EventArgs::TransferHash(raw) = &event.args else {
        return Err(malformed(event, "missing transferHash argument"));
    };

    TransferHash::try_from(&raw[..]).map_err(|_| {
        malformed(
            event,
            format!("transferHash must be 32 bytes, got {}", raw.len()),
        )
    })
}
