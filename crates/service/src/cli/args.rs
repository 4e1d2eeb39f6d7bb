pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "medvault")]
#[command(about = "Wallet-authenticated metadata service for encrypted health records")]
pub struct Args {
    /// Path to a TOML config file; flags and env vars override its values
    #[arg(long = "config", global = true, env = "MEDVAULT_CONFIG")]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
