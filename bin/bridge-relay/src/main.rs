use clap::Parser;
use opts::{RelayCli, RelaySubcommand};

mod cmd;
mod opts;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = RelayCli::parse();

    match args.cmd {
        RelaySubcommand::Run(cmd) => cmd.run().await,
        RelaySubcommand::Validate(cmd) => cmd.run().await,
    }
}
