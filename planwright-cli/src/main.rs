use clap::Parser;
use tracing_subscriber::EnvFilter;

mod args;
mod cmd;
mod commands;
mod exit_codes;
mod keys;
mod output;
mod runner;

pub use args::*;
use commands::{Command, VaultCommand};

#[derive(Debug, Parser)]
#[command(name = "planwright", version, about = "Planwright plan executor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {e}");
            std::process::exit(exit_codes::RUNTIME_ERROR);
        }
    };

    let exit_code = rt.block_on(run_command(cli.command));
    std::process::exit(exit_code);
}

/// `PLANWRIGHT_LOG` wins over `RUST_LOG`; logs go to stderr so stdout stays
/// machine-readable.
fn init_tracing() {
    let filter = std::env::var("PLANWRIGHT_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_command(command: Command) -> i32 {
    match command {
        Command::Validate { path, output } => cmd::validate::validate_cmd(&path, output),
        Command::Plan { path, output } => cmd::plan::plan_cmd(&path, output),
        Command::Execute {
            path,
            run,
            keys,
            output,
        } => cmd::execute::execute_cmd(&path, run, keys, output).await,
        Command::Graph { record, output } => cmd::graph::graph_cmd(&record, output),
        Command::Vault(VaultCommand::Encrypt {
            key_id,
            value,
            keys,
            output,
        }) => cmd::vault::encrypt_cmd(&key_id, value, keys, output).await,
    }
}
