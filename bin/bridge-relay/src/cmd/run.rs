use bridge_relay::{
    DriverConfig, HomeBridgeSubmitter, LogPoller, RelayConfig, RelayDriver, RpcChainReader,
    validate_deployment,
};
use clap::Parser;
use eyre::{Result, WrapErr};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::ChainProviders;

#[derive(Parser, Debug)]
pub(crate) struct RunArgs {
    /// Path to relay config file
    #[arg(short, long)]
    config: PathBuf,
}

impl RunArgs {
    pub(crate) async fn run(self) -> Result<()> {
        let config = RelayConfig::load(&self.config)
            .wrap_err_with(|| format!("failed to load config from {}", self.config.display()))?;
        info!(?config, "Loaded relay config");

        let providers = ChainProviders::connect(&config).await?;
        validate_deployment(
            &RpcChainReader::new(providers.home.clone()).with_rpc_timeout(config.rpc_timeout),
            &RpcChainReader::new(providers.foreign.clone()).with_rpc_timeout(config.rpc_timeout),
            &config,
        )
        .await?;

        let home = LogPoller::home_bridge_events(
            providers.home,
            config.home_bridge_contract_address,
            config.home_chain_event_fetch_start_block_number,
            config.home_chain_max_reorg_depth,
        )
        .with_max_block_range(config.max_block_range)
        .with_rpc_timeout(config.rpc_timeout);
        let foreign = LogPoller::foreign_deposits(
            providers.foreign,
            config.token_contract_address,
            config.foreign_bridge_contract_address,
            config.foreign_chain_event_fetch_start_block_number,
            config.foreign_chain_max_reorg_depth,
        )
        .with_max_block_range(config.max_block_range)
        .with_rpc_timeout(config.rpc_timeout);
        let submitter = HomeBridgeSubmitter::new(
            &config.home_rpc_url,
            config.validator_private_key.clone(),
            config.home_bridge_contract_address,
        )
        .await?;
        info!(
            validator = %submitter.validator(),
            home_bridge = %config.home_bridge_contract_address,
            "Submitting confirmations"
        );

        let cancel = CancellationToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Received Ctrl-C"),
                    Err(err) => error!(error = %err, "Failed to listen for Ctrl-C"),
                }
                cancel.cancel();
            }
        });

        let mut driver = RelayDriver::new(home, foreign, submitter, DriverConfig::from(&config));
        driver.run(cancel).await;

        let stats = driver.ledger().stats();
        info!(
            transfers = stats.transfers,
            scheduled = stats.scheduled,
            retired = stats.retired_total,
            "Relay stopped"
        );
        Ok(())
    }
}
