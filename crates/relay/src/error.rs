use alloy_primitives::Address;

/// Rejection of a single event by the transfer ledger.
///
/// A rejected event leaves the ledger untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("unknown event kind `{0}`")]
    UnknownEventKind(String),
    #[error("malformed `{name}` event at block {block_number}: {reason}")]
    MalformedEvent {
        name: String,
        block_number: u64,
        reason: String,
    },
}

/// Failure of a pre-flight deployment check.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("no contract deployed for {name} at {address}")]
    ContractNotDeployed { name: &'static str, address: Address },
    #[error("{name} at {address} does not implement `{function}`: {reason}")]
    AbiMismatch {
        name: &'static str,
        address: Address,
        function: &'static str,
        reason: String,
    },
    #[error("validator proxy {proxy} configured in home bridge {bridge} has no deployed code")]
    ValidatorProxyNotDeployed { bridge: Address, proxy: Address },
    #[error("validator proxy {proxy} configured in home bridge {bridge} is incompatible: {reason}")]
    ValidatorProxyIncompatible {
        bridge: Address,
        proxy: Address,
        reason: String,
    },
    #[error("{validator} is not authorized to confirm transfers by validator proxy {proxy}")]
    ValidatorNotAuthorized { validator: Address, proxy: Address },
    #[error("failed to read chain state: {0:#}")]
    Rpc(eyre::Report),
}

impl ValidationError {
    /// The home bridge points at a validator proxy the relay cannot use.
    pub const fn is_misconfiguration(&self) -> bool {
        matches!(
            self,
            Self::ValidatorProxyNotDeployed { .. } | Self::ValidatorProxyIncompatible { .. }
        )
    }

    /// The validator proxy works but does not list the relay's key.
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::ValidatorNotAuthorized { .. })
    }
}

/// Invalid relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config entry {key}: {reason}")]
    InvalidEntry { key: &'static str, reason: String },
}

/// A single RPC round-trip exceeded its deadline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} timed out after {timeout:?}")]
pub struct RpcTimeout {
    pub operation: &'static str,
    pub timeout: std::time::Duration,
}
