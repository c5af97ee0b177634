//! Relay configuration loaded from a TOML file.

use std::{path::Path, str::FromStr, time::Duration};

use alloy::signers::local::PrivateKeySigner;
use alloy_primitives::Address;
use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_POLL_INTERVAL_SECS: f64 = 5.0;
const DEFAULT_HOME_CHAIN_MAX_REORG_DEPTH: u64 = 1;
const DEFAULT_FOREIGN_CHAIN_MAX_REORG_DEPTH: u64 = 10;
const DEFAULT_MAX_CONCURRENT_SUBMISSIONS: usize = 4;
const DEFAULT_RPC_TIMEOUT_SECS: f64 = 30.0;
const DEFAULT_MAX_BLOCK_RANGE: u64 = 5_000;

/// Config file as written by the operator, before validation.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRelayConfig {
    home_rpc_url: String,
    foreign_rpc_url: String,
    #[serde(default = "default_poll_interval")]
    transfer_event_poll_interval: f64,
    #[serde(default = "default_home_chain_max_reorg_depth")]
    home_chain_max_reorg_depth: u64,
    #[serde(default = "default_foreign_chain_max_reorg_depth")]
    foreign_chain_max_reorg_depth: u64,
    validator_private_key: String,
    token_contract_address: String,
    home_bridge_contract_address: String,
    foreign_bridge_contract_address: String,
    #[serde(default)]
    foreign_chain_event_fetch_start_block_number: u64,
    #[serde(default)]
    home_chain_event_fetch_start_block_number: u64,
    #[serde(default = "default_max_concurrent_submissions")]
    max_concurrent_submissions: usize,
    #[serde(default = "default_rpc_timeout")]
    rpc_timeout: f64,
    #[serde(default = "default_max_block_range")]
    max_block_range: u64,
}

const fn default_poll_interval() -> f64 {
    DEFAULT_POLL_INTERVAL_SECS
}

const fn default_home_chain_max_reorg_depth() -> u64 {
    DEFAULT_HOME_CHAIN_MAX_REORG_DEPTH
}

const fn default_foreign_chain_max_reorg_depth() -> u64 {
    DEFAULT_FOREIGN_CHAIN_MAX_REORG_DEPTH
}

const fn default_max_concurrent_submissions() -> usize {
    DEFAULT_MAX_CONCURRENT_SUBMISSIONS
}

const fn default_rpc_timeout() -> f64 {
    DEFAULT_RPC_TIMEOUT_SECS
}

const fn default_max_block_range() -> u64 {
    DEFAULT_MAX_BLOCK_RANGE
}

/// Validated relay configuration.
#[derive(Clone)]
pub struct RelayConfig {
    pub home_rpc_url: String,
    pub foreign_rpc_url: String,
    pub transfer_event_poll_interval: Duration,
    /// Blocks the home head must be ahead of an event before it is trusted.
    pub home_chain_max_reorg_depth: u64,
    /// Blocks the foreign head must be ahead of an event before it is trusted.
    pub foreign_chain_max_reorg_depth: u64,
    pub validator_private_key: PrivateKeySigner,
    pub token_contract_address: Address,
    pub home_bridge_contract_address: Address,
    pub foreign_bridge_contract_address: Address,
    pub foreign_chain_event_fetch_start_block_number: u64,
    pub home_chain_event_fetch_start_block_number: u64,
    pub max_concurrent_submissions: usize,
    pub rpc_timeout: Duration,
    /// Widest block range requested in a single `eth_getLogs` call.
    pub max_block_range: u64,
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("home_rpc_url", &self.home_rpc_url)
            .field("foreign_rpc_url", &self.foreign_rpc_url)
            .field("transfer_event_poll_interval", &self.transfer_event_poll_interval)
            .field("home_chain_max_reorg_depth", &self.home_chain_max_reorg_depth)
            .field("foreign_chain_max_reorg_depth", &self.foreign_chain_max_reorg_depth)
            .field("validator_address", &self.validator_address())
            .field("token_contract_address", &self.token_contract_address)
            .field("home_bridge_contract_address", &self.home_bridge_contract_address)
            .field("foreign_bridge_contract_address", &self.foreign_bridge_contract_address)
            .field(
                "foreign_chain_event_fetch_start_block_number",
                &self.foreign_chain_event_fetch_start_block_number,
            )
            .field(
                "home_chain_event_fetch_start_block_number",
                &self.home_chain_event_fetch_start_block_number,
            )
            .field("max_concurrent_submissions", &self.max_concurrent_submissions)
            .field("rpc_timeout", &self.rpc_timeout)
            .field("max_block_range", &self.max_block_range)
            .finish_non_exhaustive()
    }
}

impl RelayConfig {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        contents.parse()
    }

    /// Address derived from the validator key.
    pub fn validator_address(&self) -> Address {
        self.validator_private_key.address()
    }
}

impl FromStr for RelayConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: RawRelayConfig = toml::from_str(s)?;
        raw.try_into()
    }
}

impl TryFrom<RawRelayConfig> for RelayConfig {
    type Error = ConfigError;

    fn try_from(raw: RawRelayConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            home_rpc_url: validate_rpc_url("home_rpc_url", raw.home_rpc_url)?,
            foreign_rpc_url: validate_rpc_url("foreign_rpc_url", raw.foreign_rpc_url)?,
            transfer_event_poll_interval: validate_positive_seconds(
                "transfer_event_poll_interval",
                raw.transfer_event_poll_interval,
            )?,
            home_chain_max_reorg_depth: validate_positive(
                "home_chain_max_reorg_depth",
                raw.home_chain_max_reorg_depth,
            )?,
            foreign_chain_max_reorg_depth: validate_positive(
                "foreign_chain_max_reorg_depth",
                raw.foreign_chain_max_reorg_depth,
            )?,
            validator_private_key: validate_private_key(&raw.validator_private_key)?,
            token_contract_address: validate_address(
                "token_contract_address",
                &raw.token_contract_address,
            )?,
            home_bridge_contract_address: validate_address(
                "home_bridge_contract_address",
                &raw.home_bridge_contract_address,
            )?,
            foreign_bridge_contract_address: validate_address(
                "foreign_bridge_contract_address",
                &raw.foreign_bridge_contract_address,
            )?,
            foreign_chain_event_fetch_start_block_number: raw
                .foreign_chain_event_fetch_start_block_number,
            home_chain_event_fetch_start_block_number: raw
                .home_chain_event_fetch_start_block_number,
            max_concurrent_submissions: validate_positive(
                "max_concurrent_submissions",
                raw.max_concurrent_submissions as u64,
            )? as usize,
            rpc_timeout: validate_positive_seconds("rpc_timeout", raw.rpc_timeout)?,
            max_block_range: validate_positive("max_block_range", raw.max_block_range)?,
        })
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidEntry {
        key,
        reason: reason.into(),
    }
}

fn validate_rpc_url(key: &'static str, url: String) -> Result<String, ConfigError> {
    const SCHEMES: [&str; 4] = ["http://", "https://", "ws://", "wss://"];
    if SCHEMES.iter().any(|scheme| url.starts_with(scheme) && url.len() > scheme.len()) {
        Ok(url)
    } else {
        Err(invalid(key, format!("{url} is not a valid RPC url")))
    }
}

fn validate_positive_seconds(key: &'static str, seconds: f64) -> Result<Duration, ConfigError> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(invalid(key, format!("{seconds} must be positive")));
    }
    Duration::try_from_secs_f64(seconds).map_err(|err| invalid(key, err.to_string()))
}

fn validate_positive(key: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(invalid(key, "must be positive"));
    }
    Ok(value)
}

fn validate_private_key(key: &str) -> Result<PrivateKeySigner, ConfigError> {
    // Never echo the key itself in the error.
    key.parse::<PrivateKeySigner>().map_err(|_| {
        invalid(
            "validator_private_key",
            "must be a 32 byte hex string in the secp256k1 scalar range",
        )
    })
}

fn validate_address(key: &'static str, address: &str) -> Result<Address, ConfigError> {
    Address::parse_checksummed(address, None)
        .map_err(|err| invalid(key, format!("{address} is not a checksummed address: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALIDATOR_KEY: &str =
        "0x0fe15822e1e481af027ae3b23a2a053401c76881e66cdb26dc0265d97c766c33";

    fn minimal_config() -> String {
        format!(
            r#"
home_rpc_url = "http://localhost:8545"
foreign_rpc_url = "ws://localhost:8546"
validator_private_key = "{VALIDATOR_KEY}"
token_contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
home_bridge_contract_address = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"
foreign_bridge_contract_address = "0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0"
"#
        )
    }

    #[test]
    fn test_defaults_applied() {
        let config: RelayConfig = minimal_config().parse().unwrap();

        assert_eq!(config.transfer_event_poll_interval, Duration::from_secs(5));
        assert_eq!(config.home_chain_max_reorg_depth, 1);
        assert_eq!(config.foreign_chain_max_reorg_depth, 10);
        assert_eq!(config.foreign_chain_event_fetch_start_block_number, 0);
        assert_eq!(config.max_concurrent_submissions, 4);
        assert_eq!(config.rpc_timeout, Duration::from_secs(30));
        assert_eq!(config.max_block_range, 5_000);
        assert_eq!(
            config.validator_address(),
            "0x6d705788A2B4B7439e7311700065Bdf0881Fc0Bc".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn test_float_and_integer_poll_interval() {
        let config: RelayConfig =
            format!("{}transfer_event_poll_interval = 0.5\n", minimal_config())
                .parse()
                .unwrap();
        assert_eq!(config.transfer_event_poll_interval, Duration::from_millis(500));

        let config: RelayConfig = format!("{}transfer_event_poll_interval = 2\n", minimal_config())
            .parse()
            .unwrap();
        assert_eq!(config.transfer_event_poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_non_positive_poll_interval_rejected() {
        let err = format!("{}transfer_event_poll_interval = 0\n", minimal_config())
            .parse::<RelayConfig>()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEntry {
                key: "transfer_event_poll_interval",
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = format!("{}gas_price = 1\n", minimal_config())
            .parse::<RelayConfig>()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_required_key_rejected() {
        let config = minimal_config().replace("home_rpc_url = \"http://localhost:8545\"\n", "");
        assert!(matches!(
            config.parse::<RelayConfig>(),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let config = minimal_config().replace(
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
            "0x5fbdb2315678afecb367f032d93F642f64180aa3",
        );
        assert!(matches!(
            config.parse::<RelayConfig>(),
            Err(ConfigError::InvalidEntry {
                key: "token_contract_address",
                ..
            })
        ));
    }

    #[test]
    fn test_out_of_range_key_rejected() {
        let config = minimal_config().replace(
            VALIDATOR_KEY,
            "0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        );
        let err = config.parse::<RelayConfig>().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEntry {
                key: "validator_private_key",
                ..
            }
        ));
        assert!(!err.to_string().contains("ffffffff"));
    }

    #[test]
    fn test_bad_rpc_url_rejected() {
        let config = minimal_config().replace("http://localhost:8545", "localhost:8545");
        assert!(matches!(
            config.parse::<RelayConfig>(),
            Err(ConfigError::InvalidEntry {
                key: "home_rpc_url",
                ..
            })
        ));
    }

    #[test]
    fn test_debug_hides_private_key() {
        let config: RelayConfig = minimal_config().parse().unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("0fe15822e1e481af"));
        assert!(debug.contains("validator_address"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(minimal_config().as_bytes()).unwrap();

        let config = RelayConfig::load(file.path()).unwrap();
        assert_eq!(config.home_rpc_url, "http://localhost:8545");
        assert_eq!(config.foreign_rpc_url, "ws://localhost:8546");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            RelayConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
