//! Where a hop sends the queries it receives.
//!
//! A hop either forwards to another hop (`kind: forward`) or is the router
//! that picks a database backend itself (`kind: router`).

use super::{BackendDescriptor, ConfigError, SecretConfig};
use crate::mode::SelectionMode;
use crate::pool::BackendPool;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Downstream target of a hop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DownstreamConfig {
    /// Relay the query to the next hop.
    Forward(NextHopConfig),
    /// Select a backend and execute the query.
    Router(RouterConfig),
}

/// Outbound connection to the next hop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextHopConfig {
    /// `host:port` of the next hop.
    pub address: String,

    /// TLS settings for the outbound connection.
    #[serde(default)]
    pub tls: ClientTlsConfig,

    /// Token to present to the next hop, if it requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<SecretConfig>,
}

impl NextHopConfig {
    /// Host part of `address`, used as the default TLS server name.
    pub fn host(&self) -> &str {
        self.address
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or(&self.address)
    }

    /// Name to verify the next hop's certificate against.
    pub fn server_name(&self) -> String {
        self.tls
            .server_name
            .clone()
            .unwrap_or_else(|| self.host().to_string())
    }
}

/// TLS configuration for the connecting side of a hop.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientTlsConfig {
    /// Whether TLS is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// CA bundle (or the peer's self-signed certificate) to trust.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// Name expected in the peer certificate. Defaults to the address host.
    #[serde(default)]
    pub server_name: Option<String>,

    /// Client certificate chain for mutual TLS.
    #[serde(default)]
    pub cert_file: Option<PathBuf>,

    /// Client private key for mutual TLS.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

/// Router hop configuration: backend pool plus selection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Backend selection strategy.
    #[serde(default)]
    pub mode: SelectionMode,

    /// Timeout in seconds for opening a backend connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Latency probe settings for the `customized` mode.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Database backends. Exactly one must be `primary: true`.
    #[serde(default)]
    pub backends: Vec<BackendDescriptor>,
}

impl RouterConfig {
    /// Build the validated backend pool.
    pub fn pool(&self) -> Result<BackendPool, ConfigError> {
        BackendPool::new(self.backends.clone())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

/// Latency probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Per-probe timeout in seconds.
    #[serde(default = "default_probe_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_probe_timeout(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_probe_timeout() -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_yaml() {
        let yaml = r#"
kind: forward
address: proxy.internal:5000
tls:
  enabled: true
  ca_file: proxy.crt
"#;
        let config: DownstreamConfig = serde_yaml::from_str(yaml).unwrap();
        let DownstreamConfig::Forward(next) = config else {
            panic!("expected forward downstream");
        };
        assert_eq!(next.host(), "proxy.internal");
        assert_eq!(next.server_name(), "proxy.internal");
        assert!(next.tls.enabled);
        assert!(next.auth.is_none());
    }

    #[test]
    fn test_server_name_override() {
        let next = NextHopConfig {
            address: "10.0.0.9:5000".to_string(),
            tls: ClientTlsConfig {
                enabled: true,
                server_name: Some("tn.internal".to_string()),
                ..Default::default()
            },
            auth: None,
        };
        assert_eq!(next.server_name(), "tn.internal");
    }

    #[test]
    fn test_router_yaml() {
        let yaml = r#"
kind: router
mode: loadbalance
backends:
  - { name: manager, host: db0, primary: true }
  - { name: worker1, host: db1 }
  - { name: worker2, host: db2 }
"#;
        let config: DownstreamConfig = serde_yaml::from_str(yaml).unwrap();
        let DownstreamConfig::Router(router) = config else {
            panic!("expected router downstream");
        };
        assert_eq!(router.mode, SelectionMode::LoadBalance);
        assert_eq!(router.connect_timeout(), Duration::from_secs(10));
        assert_eq!(router.probe.timeout(), Duration::from_secs(1));

        let pool = router.pool().unwrap();
        assert_eq!(pool.primary().name, "manager");
        assert_eq!(pool.replicas().len(), 2);
    }

    #[test]
    fn test_router_rejects_unknown_mode() {
        let yaml = "kind: router\nmode: roundrobin\nbackends: []\n";
        assert!(serde_yaml::from_str::<DownstreamConfig>(yaml).is_err());
    }
}
