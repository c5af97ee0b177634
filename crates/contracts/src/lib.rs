//! Solidity bindings for the contracts the bridge relay talks to.
//!
//! Only the parts of each interface the relay depends on are declared: the
//! events it decodes, the transaction it submits and the views it probes
//! during validation.

pub mod bridge;

pub use alloy_sol_types::sol;

pub use bridge::{
    foreign_token::{ITransferToken, TransferTokenEvent},
    home_bridge::{HomeBridgeEvent, IHomeBridge},
    validator_proxy::IValidatorProxy,
};

/// Event name of a deposit, as emitted by the bridged token.
pub const TRANSFER_EVENT_NAME: &str = "Transfer";

/// Event name of a validator confirmation on the home bridge.
pub const CONFIRMATION_EVENT_NAME: &str = "Confirmation";

/// Event name of a completed transfer on the home bridge.
pub const COMPLETION_EVENT_NAME: &str = "TransferCompleted";
