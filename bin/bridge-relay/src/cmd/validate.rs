use bridge_relay::{RelayConfig, RpcChainReader, validate_deployment};
use clap::Parser;
use eyre::{Result, WrapErr};
use std::path::PathBuf;

use super::ChainProviders;

#[derive(Parser, Debug)]
pub(crate) struct ValidateArgs {
    /// Path to relay config file
    #[arg(short, long)]
    config: PathBuf,
}

impl ValidateArgs {
    pub(crate) async fn run(self) -> Result<()> {
        let config = RelayConfig::load(&self.config)
            .wrap_err_with(|| format!("failed to load config from {}", self.config.display()))?;
        let providers = ChainProviders::connect(&config).await?;

        println!("Bridge Deployment");
        println!("=================");
        println!("  Validator:       {}", config.validator_address());
        println!("  Token:           {}", config.token_contract_address);
        println!("  Foreign bridge:  {}", config.foreign_bridge_contract_address);
        println!("  Home bridge:     {}", config.home_bridge_contract_address);
        println!();

        let result = validate_deployment(
            &RpcChainReader::new(providers.home).with_rpc_timeout(config.rpc_timeout),
            &RpcChainReader::new(providers.foreign).with_rpc_timeout(config.rpc_timeout),
            &config,
        )
        .await;

        match result {
            Ok(()) => {
                println!("OK: the validator may confirm transfers on the home bridge");
                Ok(())
            }
            Err(err) => {
                if err.is_permission_denied() {
                    println!(
                        "FAILED: the validator key is not registered with the validator proxy"
                    );
                } else if err.is_misconfiguration() {
                    println!("FAILED: the home bridge points at an unusable validator proxy");
                } else {
                    println!("FAILED: deployment check did not pass");
                }
                Err(err.into())
            }
        }
    }
}
