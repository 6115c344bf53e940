//! # hopgate-proxy
//!
//! Multi-hop query relay for hopgate.
//!
//! Every hop runs the same [`RelayServer`]. What differs is the downstream:
//! - gatekeeper and trusted node forward each query to the next hop
//! - the router picks a MySQL backend and executes the query there
//!
//! ## Architecture
//!
//! ```text
//! Client
//!    │  token + query
//!    ▼
//! ┌──────────────┐
//! │  Gatekeeper  │  ← checks token, forwards
//! └──────┬───────┘
//!        │  TLS, token + query
//!        ▼
//! ┌──────────────┐
//! │ Trusted node │  ← checks token, forwards
//! └──────┬───────┘
//!        │  TLS, query
//!        ▼
//! ┌──────────────┐
//! │    Router    │  ← selection policy, query executor
//! └──────┬───────┘
//!        ▼
//!  primary / replicas
//! ```
//!
//! The JSON response travels back along the same connections.
//!
//! ## Usage
//!
//! ```no_run
//! use hopgate_core::RelayConfig;
//! use hopgate_proxy::RelayServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RelayConfig::load("router.yaml")?;
//!     let server = RelayServer::from_config(&config, None)?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod client;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod frame;
pub mod handler;
pub mod probe;
pub mod selection;
pub mod server;

pub use channel::{BoxedStream, ChannelAcceptor, ChannelConnector};
pub use client::RelayClient;
pub use dispatch::{Dispatch, Forwarder, RequestState, Router};
pub use envelope::{RelayResponse, Row};
pub use error::RelayError;
pub use executor::{MySqlExecutor, QueryExecutor};
pub use frame::Framing;
pub use handler::ConnectionHandler;
pub use probe::{LatencyProbe, PingProbe, ProbeError};
pub use selection::{SelectionError, SelectionPolicy, is_read_only};
pub use server::RelayServer;
