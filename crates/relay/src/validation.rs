//! Pre-flight checks of the contracts the relay is configured against.
//!
//! Every check is a read against chain state. They run before the relay
//! starts; a failure means confirmations could never be accepted on-chain.

use std::time::Duration;

use alloy::{
    primitives::{Address, Bytes},
    providers::Provider,
    rpc::{json_rpc::ErrorPayload, types::TransactionRequest},
    sol_types::{SolCall, SolType, sol_data},
};
use async_trait::async_trait;
use bridge_relay_contracts::{IHomeBridge, ITransferToken, IValidatorProxy};
use tracing::{debug, info};

use crate::{
    config::RelayConfig, error::ValidationError, retry::rpc_call, source::DEFAULT_RPC_TIMEOUT,
};

/// Result of a read-only contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success(Bytes),
    /// The node executed the call and it failed.
    Reverted(String),
}

/// Read access to chain state.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Deployed bytecode at `address`, empty if there is none.
    async fn code_at(&self, address: Address) -> eyre::Result<Bytes>;

    /// Execute a view call against the latest block.
    ///
    /// Transport failures are errors; execution failures are
    /// [`CallOutcome::Reverted`].
    async fn call(&self, to: Address, input: Bytes) -> eyre::Result<CallOutcome>;
}

/// [`ChainReader`] backed by an alloy provider.
#[derive(Debug, Clone)]
pub struct RpcChainReader<P> {
    provider: P,
    rpc_timeout: Duration,
}

impl<P> RpcChainReader<P> {
    pub const fn new(provider: P) -> Self {
        Self {
            provider,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    /// Deadline for each RPC round-trip.
    pub const fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }
}

/// Whether an error response reports a failed execution rather than a node
/// problem such as a rate limit.
pub fn is_execution_revert(payload: &ErrorPayload) -> bool {
    // Geth and most clients answer reverts with code 3 when revert data is
    // attached, and with -32000 "execution reverted" otherwise.
    payload.code == 3 || payload.message.to_ascii_lowercase().contains("revert")
}

#[async_trait]
impl<P: Provider> ChainReader for RpcChainReader<P> {
    async fn code_at(&self, address: Address) -> eyre::Result<Bytes> {
        rpc_call("get_code_at", self.rpc_timeout, || async {
            Ok(self.provider.get_code_at(address).await?)
        })
        .await
    }

    async fn call(&self, to: Address, input: Bytes) -> eyre::Result<CallOutcome> {
        let tx = TransactionRequest::default().to(to).input(input.into());

        rpc_call("call", self.rpc_timeout, || async {
            match self.provider.call(tx.clone()).await {
                Ok(output) => Ok(CallOutcome::Success(output)),
                Err(err) => {
                    let revert = err.as_error_resp().filter(|payload| is_execution_revert(payload));
                    if let Some(payload) = revert {
                        return Ok(CallOutcome::Reverted(payload.message.to_string()));
                    }
                    Err(err.into())
                }
            }
        })
        .await
    }
}

/// A view call that must succeed and decode for an interface to match.
#[derive(Debug, Clone)]
pub struct ViewProbe {
    pub function: &'static str,
    pub calldata: Bytes,
    decodes: fn(&[u8]) -> bool,
}

impl ViewProbe {
    pub fn new<C: SolCall>(call: C) -> Self {
        Self {
            function: C::SIGNATURE,
            calldata: call.abi_encode().into(),
            decodes: returns_decode::<C>,
        }
    }

    /// Whether `output` has the shape of the function's return value.
    pub fn matches(&self, output: &[u8]) -> bool {
        (self.decodes)(output)
    }
}

fn returns_decode<C: SolCall>(output: &[u8]) -> bool {
    C::abi_decode_returns(output).is_ok()
}

/// A contract the relay depends on and the views used to recognize it.
#[derive(Debug, Clone)]
pub struct ContractInterface {
    pub name: &'static str,
    pub address: Address,
    pub probes: Vec<ViewProbe>,
}

impl ContractInterface {
    pub fn token(address: Address) -> Self {
        Self {
            name: "token contract",
            address,
            probes: vec![
                ViewProbe::new(ITransferToken::totalSupplyCall {}),
                ViewProbe::new(ITransferToken::balanceOfCall {
                    owner: Address::ZERO,
                }),
            ],
        }
    }

    pub fn home_bridge(address: Address) -> Self {
        Self {
            name: "home bridge contract",
            address,
            probes: vec![ViewProbe::new(IHomeBridge::validatorProxyCall {})],
        }
    }

    /// The foreign bridge only receives tokens; deployed code is all the relay needs.
    pub fn foreign_bridge(address: Address) -> Self {
        Self {
            name: "foreign bridge contract",
            address,
            probes: Vec::new(),
        }
    }

    pub fn validator_proxy(address: Address) -> Self {
        Self {
            name: "validator proxy contract",
            address,
            probes: vec![ViewProbe::new(IValidatorProxy::isValidatorCall {
                validator: Address::ZERO,
            })],
        }
    }
}

/// Check that `interface.address` holds a contract answering every probe.
pub async fn validate_contract<R>(
    reader: &R,
    interface: &ContractInterface,
) -> Result<(), ValidationError>
where
    R: ChainReader + ?Sized,
{
    let code = reader
        .code_at(interface.address)
        .await
        .map_err(ValidationError::Rpc)?;
    if code.is_empty() {
        return Err(ValidationError::ContractNotDeployed {
            name: interface.name,
            address: interface.address,
        });
    }

    for probe in &interface.probes {
        let outcome = reader
            .call(interface.address, probe.calldata.clone())
            .await
            .map_err(ValidationError::Rpc)?;

        let reason = match outcome {
            CallOutcome::Success(output) if probe.matches(&output) => {
                debug!(
                    contract = interface.name,
                    address = %interface.address,
                    function = probe.function,
                    "Probe matched"
                );
                continue;
            }
            CallOutcome::Success(output) => {
                format!("returned {} bytes of unexpected data", output.len())
            }
            CallOutcome::Reverted(message) => format!("call reverted: {message}"),
        };

        return Err(ValidationError::AbiMismatch {
            name: interface.name,
            address: interface.address,
            function: probe.function,
            reason,
        });
    }

    Ok(())
}

/// Check that `validator` may confirm transfers on `home_bridge`.
///
/// A misconfigured validator proxy is reported separately from a proxy that
/// works but does not list the validator.
pub async fn validate_confirmation_permissions<R>(
    reader: &R,
    home_bridge: Address,
    validator: Address,
) -> Result<(), ValidationError>
where
    R: ChainReader + ?Sized,
{
    let proxy = validator_proxy_address(reader, home_bridge).await?;

    let code = reader.code_at(proxy).await.map_err(ValidationError::Rpc)?;
    if code.is_empty() {
        return Err(ValidationError::ValidatorProxyNotDeployed {
            bridge: home_bridge,
            proxy,
        });
    }

    let call = IValidatorProxy::isValidatorCall { validator };
    let outcome = reader
        .call(proxy, call.abi_encode().into())
        .await
        .map_err(ValidationError::Rpc)?;

    let is_validator = match outcome {
        CallOutcome::Success(output) => {
            <sol_data::Bool as SolType>::abi_decode(&output).map_err(|err| {
                ValidationError::ValidatorProxyIncompatible {
                    bridge: home_bridge,
                    proxy,
                    reason: format!("isValidator returned malformed data: {err}"),
                }
            })?
        }
        CallOutcome::Reverted(message) => {
            return Err(ValidationError::ValidatorProxyIncompatible {
                bridge: home_bridge,
                proxy,
                reason: format!("isValidator reverted: {message}"),
            });
        }
    };

    if !is_validator {
        return Err(ValidationError::ValidatorNotAuthorized { validator, proxy });
    }

    Ok(())
}

async fn validator_proxy_address<R>(
    reader: &R,
    home_bridge: Address,
) -> Result<Address, ValidationError>
where
    R: ChainReader + ?Sized,
{
    let probe = ViewProbe::new(IHomeBridge::validatorProxyCall {});
    let mismatch = |reason: String| ValidationError::AbiMismatch {
        name: "home bridge contract",
        address: home_bridge,
        function: probe.function,
        reason,
    };

    match reader
        .call(home_bridge, probe.calldata.clone())
        .await
        .map_err(ValidationError::Rpc)?
    {
        CallOutcome::Success(output) => <sol_data::Address as SolType>::abi_decode(&output)
            .map_err(|err| mismatch(format!("returned malformed data: {err}"))),
        CallOutcome::Reverted(message) => Err(mismatch(format!("call reverted: {message}"))),
    }
}

/// Run every pre-flight check for a configured relay.
///
/// Token and foreign bridge are checked on the foreign chain; the home bridge,
/// its validator proxy and the validator's permission on the home chain.
pub async fn validate_deployment<H, F>(
    home: &H,
    foreign: &F,
    config: &RelayConfig,
) -> Result<(), ValidationError>
where
    H: ChainReader + ?Sized,
    F: ChainReader + ?Sized,
{
    validate_contract(
        foreign,
        &ContractInterface::token(config.token_contract_address),
    )
    .await?;
    validate_contract(
        foreign,
        &ContractInterface::foreign_bridge(config.foreign_bridge_contract_address),
    )
    .await?;
    validate_contract(
        home,
        &ContractInterface::home_bridge(config.home_bridge_contract_address),
    )
    .await?;

    let validator = config.validator_address();
    validate_confirmation_permissions(home, config.home_bridge_contract_address, validator)
        .await?;

    info!(
        %validator,
        home_bridge = %config.home_bridge_contract_address,
        foreign_bridge = %config.foreign_bridge_contract_address,
        token = %config.token_contract_address,
        "Deployment validated"
    );
    Ok(())
}
