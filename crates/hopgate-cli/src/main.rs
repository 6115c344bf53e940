use clap::{Parser, Subcommand};
use hopgate_core::SelectionMode;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::query::QueryArgs;

#[derive(Parser, Debug)]
#[command(name = "hopgate", version, about = "Authenticated multi-hop SQL relay")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one hop (gatekeeper, trusted node or router) from a config file.
    Serve {
        /// Hop configuration file (YAML).
        #[arg(long, short, env = "HOPGATE_CONFIG")]
        config: PathBuf,

        /// Override the router's selection mode: random, directhit, customized or loadbalance.
        #[arg(long)]
        mode: Option<SelectionMode>,
    },

    /// Send queries to a hop and print the JSON results.
    Query(QueryArgs),

    /// Validate a hop configuration file and print a summary.
    Check {
        /// Hop configuration file (YAML).
        #[arg(long, short, env = "HOPGATE_CONFIG")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Serve { config, mode } => commands::serve::run_serve(&config, mode).await?,
        Command::Query(args) => commands::query::run_query(args).await?,
        Command::Check { config } => commands::check::run_check(&config)?,
    }

    Ok(())
}
