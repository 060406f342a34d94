use std::path::PathBuf;

use clap::Args;
use planwright_exec::RunOptions;

use crate::output::OutputFormat;

#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// Where vault passwords come from. Sources are tried in the order
/// directory, helper script, environment.
#[derive(Debug, Args, Clone)]
pub struct KeyArgs {
    /// Directory holding one password file per key id.
    #[arg(long, env = "PLANWRIGHT_KEY_DIR")]
    pub key_dir: Option<PathBuf>,
    /// Helper invoked as `<script> --vault-id <key-id>`.
    #[arg(long, env = "PLANWRIGHT_VAULT_SCRIPT")]
    pub vault_script: Option<PathBuf>,
    #[arg(long, env = "PLANWRIGHT_KEY_ENV_PREFIX", default_value = "PLANWRIGHT_VAULT_KEY_")]
    pub key_env_prefix: String,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Skip every step upstream of this one.
    #[arg(long, value_name = "STEP")]
    pub start_from: Option<String>,
    /// Skip every step downstream of this one.
    #[arg(long, value_name = "STEP")]
    pub end_at: Option<String>,
    #[arg(long, value_name = "STEP", value_delimiter = ',')]
    pub only: Vec<String>,
    #[arg(long, value_name = "STEP", value_delimiter = ',')]
    pub skip: Vec<String>,
    /// Upper bound on steps in flight, applied on top of the plan strategy.
    #[arg(long, env = "PLANWRIGHT_MAX_PARALLEL")]
    pub max_parallel: Option<usize>,
    /// Seconds a cancelled step may take to stop.
    #[arg(long, default_value_t = 5)]
    pub cancel_grace: u64,
    /// Stream run events to stdout as JSON lines.
    #[arg(long)]
    pub events: bool,
    /// Print run counters (steps, attempts, decryptions) to stderr as JSON.
    #[arg(long)]
    pub metrics: bool,
    /// Write the final execution record as JSON.
    #[arg(long, value_name = "PATH")]
    pub record: Option<PathBuf>,
}

impl RunArgs {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            start_from: self.start_from.clone(),
            end_at: self.end_at.clone(),
            only: self.only.clone(),
            skip: self.skip.clone(),
        }
    }
}
