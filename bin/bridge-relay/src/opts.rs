use crate::cmd::{run::RunArgs, validate::ValidateArgs};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "bridge-relay")]
#[command(
    version,
    about = "Validator relay confirming foreign deposits on the home bridge",
    long_about = None
)]
pub(crate) struct RelayCli {
    #[command(subcommand)]
    pub(crate) cmd: RelaySubcommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum RelaySubcommand {
    /// Validate the deployment, then relay transfers until Ctrl-C
    Run(RunArgs),

    /// Check the configured contracts and validator permissions
    Validate(ValidateArgs),
}
