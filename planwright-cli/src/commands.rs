use std::path::PathBuf;

use clap::Subcommand;

use crate::args::*;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a plan document and report structural errors.
    Validate {
        path: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Show execution order and concurrency groups without running anything.
    Plan {
        path: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Run a plan, executing each step's `action.command` through `sh -c`.
    Execute {
        path: PathBuf,
        #[command(flatten)]
        run: RunArgs,
        #[command(flatten)]
        keys: KeyArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Render the visualization graph of a saved execution record.
    Graph {
        record: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Vault envelope helpers.
    #[command(subcommand)]
    Vault(VaultCommand),
}

#[derive(Debug, Subcommand)]
pub enum VaultCommand {
    /// Seal a value into a `$VAULT;1.0;<key-id>` envelope.
    Encrypt {
        #[arg(long)]
        key_id: String,
        /// Plaintext; read from stdin when omitted.
        #[arg(long)]
        value: Option<String>,
        #[command(flatten)]
        keys: KeyArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
}
