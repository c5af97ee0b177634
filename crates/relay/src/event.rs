//! Decoded chain events and the transfer identity derived from them.

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use bridge_relay_contracts::{COMPLETION_EVENT_NAME, CONFIRMATION_EVENT_NAME, TRANSFER_EVENT_NAME};

/// Identity of a transfer across its whole lifecycle.
pub type TransferHash = B256;

/// The three event kinds the relay understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Tokens sent to the foreign bridge.
    Deposit,
    /// A validator confirmed the transfer on the home bridge.
    Confirmation,
    /// The home bridge paid out the transfer.
    Completion,
}

impl EventKind {
    /// Resolves an on-chain event name, `None` if the relay does not handle it.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            TRANSFER_EVENT_NAME => Some(Self::Deposit),
            CONFIRMATION_EVENT_NAME => Some(Self::Confirmation),
            COMPLETION_EVENT_NAME => Some(Self::Completion),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Deposit => TRANSFER_EVENT_NAME,
            Self::Confirmation => CONFIRMATION_EVENT_NAME,
            Self::Completion => COMPLETION_EVENT_NAME,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Arguments carried by a decoded log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventArgs {
    /// `Transfer(from, to, value)` of the bridged token.
    Transfer { from: Address, to: Address, value: U256 },
    /// The `transferHash` argument shared by `Confirmation` and `TransferCompleted`.
    ///
    /// Kept as raw bytes; the ledger rejects anything that is not 32 bytes long.
    TransferHash(Bytes),
}

/// A decoded log record as handed to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    pub name: String,
    pub block_number: u64,
    pub transaction_index: u64,
    pub log_index: u64,
    pub transaction_hash: B256,
    pub args: EventArgs,
}

impl ChainEvent {
    /// A deposit at `block_number`, positioned at the start of the block.
    pub fn deposit(from: Address, to: Address, value: U256, block_number: u64) -> Self {
        Self {
            name: TRANSFER_EVENT_NAME.to_string(),
            block_number,
            transaction_index: 0,
            log_index: 0,
            transaction_hash: B256::ZERO,
            args: EventArgs::Transfer { from, to, value },
        }
    }

    pub fn confirmation(transfer_hash: TransferHash, block_number: u64) -> Self {
        Self::with_transfer_hash(CONFIRMATION_EVENT_NAME, transfer_hash, block_number)
    }

    pub fn completion(transfer_hash: TransferHash, block_number: u64) -> Self {
        Self::with_transfer_hash(COMPLETION_EVENT_NAME, transfer_hash, block_number)
    }

    fn with_transfer_hash(name: &str, transfer_hash: TransferHash, block_number: u64) -> Self {
        Self {
            name: name.to_string(),
            block_number,
            transaction_index: 0,
            log_index: 0,
            transaction_hash: B256::ZERO,
            args: EventArgs::TransferHash(Bytes::copy_from_slice(transfer_hash.as_slice())),
        }
    }

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_name(&self.name)
    }
}

/// Full payload of an observed deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub transfer_hash: TransferHash,
    pub sender: Address,
    /// The foreign bridge that received the tokens.
    pub recipient: Address,
    pub amount: U256,
    pub block_number: u64,
    pub transaction_index: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
}

impl TransferEvent {
    /// Home-chain beneficiary of the transfer.
    pub const fn beneficiary(&self) -> Address {
        self.sender
    }
}

/// Computes the transfer hash of a deposit.
///
/// `keccak256(abi.encodePacked(sender, recipient, amount, blockNumber))` with
/// `amount` and `blockNumber` as `uint256`, so the home bridge can derive the
/// same identity on-chain.
pub fn compute_transfer_hash(
    sender: Address,
    recipient: Address,
    amount: U256,
    block_number: u64,
) -> TransferHash {
    let mut buf = Vec::with_capacity(20 + 20 + 32 + 32);
    buf.extend_from_slice(sender.as_slice());
    buf.extend_from_slice(recipient.as_slice());
    buf.extend_from_slice(&amount.to_be_bytes::<32>());
    buf.extend_from_slice(&U256::from(block_number).to_be_bytes::<32>());
    keccak256(&buf)
}
