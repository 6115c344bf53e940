//! `hopgate query` - operator client for the first hop.
//!
//! With `--execute` a single query is sent. Otherwise queries are read from
//! stdin one line at a time until `exit` or end of input.

use anyhow::{Context, Result};
use clap::Args;
use hopgate_core::{ClientTlsConfig, NextHopConfig, SecretConfig};
use hopgate_proxy::{Framing, RelayClient, RelayResponse};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const PROMPT: &str = "Enter SQL query (or type 'exit' to quit): ";

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Address of the first hop, `host:port`.
    #[arg(long, short, default_value = "127.0.0.1:5000")]
    pub address: String,

    /// Trust anchor for the hop's certificate. Enables TLS.
    #[arg(long)]
    pub ca_file: Option<PathBuf>,

    /// Name to verify the hop's certificate against. Defaults to the address host.
    #[arg(long)]
    pub server_name: Option<String>,

    /// Client certificate for mutual TLS.
    #[arg(long, requires = "key_file")]
    pub cert_file: Option<PathBuf>,

    /// Client private key for mutual TLS.
    #[arg(long, requires = "cert_file")]
    pub key_file: Option<PathBuf>,

    /// Pre-shared token.
    #[arg(long, conflicts_with = "token_env")]
    pub token: Option<String>,

    /// Environment variable holding the pre-shared token.
    #[arg(long)]
    pub token_env: Option<String>,

    /// Run this query and exit instead of prompting.
    #[arg(long, short)]
    pub execute: Option<String>,

    /// Per-frame I/O timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout_seconds: u64,

    /// Largest response accepted, in bytes.
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    pub max_frame_bytes: u32,
}

impl QueryArgs {
    fn next_hop(&self) -> NextHopConfig {
        let auth = (self.token.is_some() || self.token_env.is_some()).then(|| SecretConfig {
            token: self.token.clone(),
            token_env: self.token_env.clone(),
        });
        NextHopConfig {
            address: self.address.clone(),
            tls: ClientTlsConfig {
                enabled: self.ca_file.is_some(),
                ca_file: self.ca_file.clone(),
                server_name: self.server_name.clone(),
                cert_file: self.cert_file.clone(),
                key_file: self.key_file.clone(),
            },
            auth,
        }
    }

    fn framing(&self) -> Framing {
        Framing::new(self.max_frame_bytes, Duration::from_secs(self.timeout_seconds))
    }
}

pub async fn run_query(args: QueryArgs) -> Result<()> {
    let client = RelayClient::from_config(&args.next_hop(), args.framing())
        .context("failed to set up connection to the first hop")?;

    if let Some(query) = &args.execute {
        print_response(&client.query(query).await)?;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}", PROMPT);
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let query = line.trim();
        if is_exit(query) {
            break;
        }
        if query.is_empty() {
            continue;
        }
        print_response(&client.query(query).await)?;
    }
    Ok(())
}

fn is_exit(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit")
}

fn print_response(response: &RelayResponse) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}
