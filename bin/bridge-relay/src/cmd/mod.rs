pub(crate) mod run;
pub(crate) mod validate;

use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use bridge_relay::RelayConfig;
use eyre::{Result, WrapErr};

/// Read-only providers for both chains.
pub(crate) struct ChainProviders {
    pub(crate) home: DynProvider,
    pub(crate) foreign: DynProvider,
}

impl ChainProviders {
    pub(crate) async fn connect(config: &RelayConfig) -> Result<Self> {
        let home = ProviderBuilder::new()
            .connect(&config.home_rpc_url)
            .await
            .wrap_err_with(|| {
                format!("failed to connect to home chain at {}", config.home_rpc_url)
            })?
            .erased();
        let foreign = ProviderBuilder::new()
            .connect(&config.foreign_rpc_url)
            .await
            .wrap_err_with(|| {
                format!("failed to connect to foreign chain at {}", config.foreign_rpc_url)
            })?
            .erased();

        Ok(Self { home, foreign })
    }
}
