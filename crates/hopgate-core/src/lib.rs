//! # hopgate-core
//!
//! Shared types for the hopgate query relay:
//!
//! - [`config`]: per-hop YAML configuration (listener, TLS, auth, downstream)
//! - [`BackendPool`]: the static registry of database backends with one primary
//! - [`SelectionMode`]: the four backend selection strategies
//! - [`AuthToken`]: the pre-shared secret checked at authenticating hops
//!
//! Everything here is immutable once loaded and is shared read-only by the
//! relay crate.

pub mod auth;
pub mod config;
pub mod mode;
pub mod pool;

pub use auth::AuthToken;
pub use config::{
    BackendDescriptor, ClientTlsConfig, ConfigError, DownstreamConfig, ListenConfig,
    NextHopConfig, ProbeConfig, RelayConfig, RouterConfig, SecretConfig, ServerTlsConfig,
};
pub use mode::{SelectionMode, UnknownModeError};
pub use pool::BackendPool;
