//! Submission of `confirmTransfer` transactions to the home bridge.

use alloy::{
    network::{EthereumWallet, ReceiptResponse as _},
    primitives::{Address, B256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    sol_types::SolCall,
};
use async_trait::async_trait;
use bridge_relay_contracts::IHomeBridge;
use eyre::{Result, WrapErr, bail};
use tracing::{debug, info};

use crate::event::TransferEvent;

/// Sends confirmations for transfers.
///
/// Implementations report the outcome to the caller only. They never touch
/// the ledger; a confirmation counts once its event is observed on-chain.
#[async_trait]
pub trait ConfirmationSubmitter: Send + Sync {
    /// Submit a confirmation and wait for its receipt.
    ///
    /// Returns the hash of the mined transaction.
    async fn submit_confirmation(&self, transfer: &TransferEvent) -> Result<B256>;
}

/// Signs confirmations with the validator key and broadcasts them to the
/// home chain.
pub struct HomeBridgeSubmitter {
    provider: DynProvider,
    home_bridge: Address,
    validator: Address,
}

impl HomeBridgeSubmitter {
    pub async fn new(
        rpc_url: &str,
        signer: PrivateKeySigner,
        home_bridge: Address,
    ) -> Result<Self> {
        let validator = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect(rpc_url)
            .await
            .wrap_err_with(|| format!("failed to connect to home chain at {rpc_url}"))?
            .erased();

        Ok(Self {
            provider,
            home_bridge,
            validator,
        })
    }

    /// Address the confirmations are sent from.
    pub const fn validator(&self) -> Address {
        self.validator
    }
}

/// Build the `confirmTransfer` call for a transfer.
pub fn confirm_transfer_call(transfer: &TransferEvent) -> IHomeBridge::confirmTransferCall {
    IHomeBridge::confirmTransferCall {
        transferHash: transfer.transfer_hash,
        transactionHash: transfer.transaction_hash,
        amount: transfer.amount,
        recipient: transfer.beneficiary(),
    }
}

#[async_trait]
impl ConfirmationSubmitter for HomeBridgeSubmitter {
    async fn submit_confirmation(&self, transfer: &TransferEvent) -> Result<B256> {
        let call = confirm_transfer_call(transfer);

        debug!(
            transfer_hash = %transfer.transfer_hash,
            validator = %self.validator,
            recipient = %call.recipient,
            amount = %call.amount,
            "Sending confirmation"
        );

        let tx = TransactionRequest::default()
            .from(self.validator)
            .to(self.home_bridge)
            .input(call.abi_encode().into());

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .wrap_err("failed to send confirmation transaction")?;
        let receipt = pending
            .get_receipt()
            .await
            .wrap_err("failed to fetch confirmation receipt")?;

        if !receipt.status() {
            bail!(
                "confirmation transaction {} reverted",
                receipt.transaction_hash
            );
        }

        info!(
            transfer_hash = %transfer.transfer_hash,
            tx_hash = %receipt.transaction_hash,
            block_number = ?receipt.block_number,
            "Confirmation mined"
        );

        Ok(receipt.transaction_hash)
    }
}
