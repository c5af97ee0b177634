//! Validator relay for a two-chain token bridge.
//!
//! The relay watches token deposits into the foreign bridge, confirms each
//! one on the home bridge with the validator key, and forgets transfers once
//! the home bridge reports them completed.

pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod ledger;
pub mod metrics;
pub mod retry;
pub mod source;
pub mod submitter;
pub mod validation;

#[cfg(test)]
mod tests;

pub use config::RelayConfig;
pub use driver::{DriverConfig, RelayDriver, TickReport};
pub use error::{ConfigError, LedgerError, RpcTimeout, ValidationError};
pub use event::{ChainEvent, TransferEvent, TransferHash, compute_transfer_hash};
pub use ledger::TransferLedger;
pub use source::{EventBatch, EventSource, LogPoller};
pub use submitter::{ConfirmationSubmitter, HomeBridgeSubmitter};
pub use validation::{ChainReader, RpcChainReader, validate_deployment};
