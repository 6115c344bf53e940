//! Listener and server-side TLS configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a hop's inbound listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Port to listen on. Zero lets the OS pick one.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Maximum number of connections handled at the same time.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Timeout in seconds for each frame read or write.
    #[serde(default = "default_io_timeout")]
    pub io_timeout_seconds: u64,

    /// Timeout in seconds for dispatching one query downstream.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Largest frame accepted or sent, in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: u32,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            max_connections: default_max_connections(),
            io_timeout_seconds: default_io_timeout(),
            request_timeout_seconds: default_request_timeout(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl ListenConfig {
    /// `addr:port` string to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// TLS configuration for the listening side of a hop.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerTlsConfig {
    /// Whether TLS is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Path to the PEM certificate chain.
    #[serde(default)]
    pub cert_file: Option<PathBuf>,

    /// Path to the PEM private key.
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// CA bundle used to verify client certificates. Enables mutual TLS.
    #[serde(default)]
    pub client_ca_file: Option<PathBuf>,
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    5000
}

fn default_max_connections() -> u32 {
    64
}

fn default_io_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    60
}

pub(crate) fn default_max_frame_bytes() -> u32 {
    16 * 1024 * 1024
}
