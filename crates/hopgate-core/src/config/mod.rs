//! Configuration types for a hopgate hop.
//!
//! Each hop process (gatekeeper, trusted node, router) is described by one
//! YAML file. The shape is the same for every hop; only the `downstream`
//! section differs between forwarding hops and the router.
//!
//! ```yaml
//! name: trusted-node
//! listen:
//!   listen_port: 5000
//! tls:
//!   enabled: true
//!   cert_file: tn.crt
//!   key_file: tn.key
//! auth:
//!   token_env: HOPGATE_TOKEN
//! downstream:
//!   kind: forward
//!   address: proxy.internal:5000
//!   tls: { enabled: true, ca_file: proxy.crt }
//! ```
//!
//! Relative file paths are resolved against the directory holding the
//! configuration file when it is loaded with [`RelayConfig::load`].

pub mod backend;
pub mod downstream;
pub mod listen;

use crate::auth::AuthToken;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use backend::BackendDescriptor;
pub use downstream::{ClientTlsConfig, DownstreamConfig, NextHopConfig, ProbeConfig, RouterConfig};
pub use listen::{ListenConfig, ServerTlsConfig};

/// Complete configuration of one hop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Name used in log lines.
    #[serde(default = "default_name")]
    pub name: String,

    /// Inbound listener settings.
    #[serde(default)]
    pub listen: ListenConfig,

    /// Inbound TLS settings.
    #[serde(default)]
    pub tls: ServerTlsConfig,

    /// Token callers must present before their query. No token, no check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<SecretConfig>,

    /// Where received queries go.
    pub downstream: DownstreamConfig,
}

/// A shared secret, given inline or through an environment variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretConfig {
    /// Secret value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable containing the secret. Takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

impl SecretConfig {
    /// Resolve the secret into an [`AuthToken`].
    pub fn resolve(&self) -> Result<AuthToken, ConfigError> {
        if let Some(env_var) = &self.token_env {
            return match std::env::var(env_var) {
                Ok(value) if !value.is_empty() => Ok(AuthToken::new(value)),
                _ => Err(ConfigError::MissingSecret(env_var.clone())),
            };
        }
        match &self.token {
            Some(token) if !token.is_empty() => Ok(AuthToken::new(token.clone())),
            _ => Err(ConfigError::Invalid(
                "auth section needs a non-empty token or token_env".to_string(),
            )),
        }
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("environment variable '{0}' is not set")]
    MissingSecret(String),

    #[error("Configuration error: {0}")]
    Invalid(String),
}

fn default_name() -> String {
    "hopgate".to_string()
}

impl RelayConfig {
    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration from a YAML file without resolving paths.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Load a configuration file, resolve relative certificate paths against
    /// its directory and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = Self::from_file(path)?;

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        config.resolve_paths(&base_dir);
        config.validate()?;
        Ok(config)
    }

    /// Make every relative file path absolute with respect to `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |p: &mut Option<PathBuf>| {
            if let Some(path) = p
                && path.is_relative()
            {
                *path = base_dir.join(&*path);
            }
        };

        resolve(&mut self.tls.cert_file);
        resolve(&mut self.tls.key_file);
        resolve(&mut self.tls.client_ca_file);

        if let DownstreamConfig::Forward(next) = &mut self.downstream {
            resolve(&mut next.tls.ca_file);
            resolve(&mut next.tls.cert_file);
            resolve(&mut next.tls.key_file);
        }
    }

    /// Check the configuration for errors that would only show up at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "listen.max_connections must be at least 1".to_string(),
            ));
        }
        if self.listen.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid(
                "listen.max_frame_bytes must be at least 1".to_string(),
            ));
        }
        if self.listen.io_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "listen.io_timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.listen.request_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "listen.request_timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.tls.enabled && (self.tls.cert_file.is_none() || self.tls.key_file.is_none()) {
            return Err(ConfigError::Invalid(
                "tls.enabled requires tls.cert_file and tls.key_file".to_string(),
            ));
        }
        if let Some(auth) = &self.auth {
            auth.resolve()?;
        }

        match &self.downstream {
            DownstreamConfig::Forward(next) => {
                if next.address.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "downstream.address must not be empty".to_string(),
                    ));
                }
                if next.tls.cert_file.is_some() != next.tls.key_file.is_some() {
                    return Err(ConfigError::Invalid(
                        "downstream.tls.cert_file and key_file must be set together".to_string(),
                    ));
                }
                if let Some(auth) = &next.auth {
                    auth.resolve()?;
                }
            }
            DownstreamConfig::Router(router) => {
                if router.connect_timeout_seconds == 0 {
                    return Err(ConfigError::Invalid(
                        "downstream.connect_timeout_seconds must be at least 1".to_string(),
                    ));
                }
                router.pool()?;
            }
        }
        Ok(())
    }

    /// Token inbound callers must present, if this hop requires one.
    pub fn inbound_token(&self) -> Result<Option<AuthToken>, ConfigError> {
        self.auth.as_ref().map(SecretConfig::resolve).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ROUTER_YAML: &str = r#"
name: proxy
listen:
  listen_port: 6000
downstream:
  kind: router
  mode: customized
  backends:
    - { name: worker1, host: db1 }
    - { name: manager, host: db0, primary: true }
"#;

    #[test]
    fn test_router_config_parses_and_validates() {
        let config = RelayConfig::from_yaml(ROUTER_YAML).unwrap();
        assert_eq!(config.name, "proxy");
        assert_eq!(config.listen.listen_port, 6000);
        assert!(config.auth.is_none());
        assert!(!config.tls.enabled);
        config.validate().unwrap();
        assert!(config.inbound_token().unwrap().is_none());
    }

    #[test]
    fn test_inline_token_resolves() {
        let yaml = format!("{}auth:\n  token: pre_shared_key\n", ROUTER_YAML);
        let config = RelayConfig::from_yaml(&yaml).unwrap();
        let token = config.inbound_token().unwrap().unwrap();
        assert!(token.matches(b"pre_shared_key"));
    }

    #[test]
    fn test_missing_token_env_is_an_error() {
        let yaml = format!(
            "{}auth:\n  token_env: HOPGATE_TEST_TOKEN_THAT_IS_NOT_SET\n",
            ROUTER_YAML
        );
        let config = RelayConfig::from_yaml(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSecret(var)) if var == "HOPGATE_TEST_TOKEN_THAT_IS_NOT_SET"
        ));
    }

    #[test]
    fn test_tls_requires_cert_and_key() {
        let yaml = format!("{}tls:\n  enabled: true\n", ROUTER_YAML);
        let config = RelayConfig::from_yaml(&yaml).unwrap();
        assert!(config.validate().unwrap_err().to_string().contains("tls.cert_file"));
    }

    #[test]
    fn test_zero_timeouts_fail_validation() {
        let mut config = RelayConfig::from_yaml(ROUTER_YAML).unwrap();
        config.listen.io_timeout_seconds = 0;
        assert!(config.validate().unwrap_err().to_string().contains("io_timeout_seconds"));

        let mut config = RelayConfig::from_yaml(ROUTER_YAML).unwrap();
        config.listen.request_timeout_seconds = 0;
        assert!(config.validate().unwrap_err().to_string().contains("request_timeout_seconds"));

        let mut config = RelayConfig::from_yaml(ROUTER_YAML).unwrap();
        if let DownstreamConfig::Router(router) = &mut config.downstream {
            router.connect_timeout_seconds = 0;
        }
        assert!(config.validate().unwrap_err().to_string().contains("connect_timeout_seconds"));
    }

    #[test]
    fn test_router_without_primary_fails_validation() {
        let yaml = r#"
downstream:
  kind: router
  backends:
    - { name: worker1, host: db1 }
"#;
        let config = RelayConfig::from_yaml(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tn.yaml");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
name: trusted-node
tls:
  enabled: true
  cert_file: tn.crt
  key_file: /etc/hopgate/tn.key
downstream:
  kind: forward
  address: proxy.internal:5000
  tls:
    enabled: true
    ca_file: proxy.crt
"#
        )
        .unwrap();

        let config = RelayConfig::load(&path).unwrap();
        assert_eq!(config.tls.cert_file, Some(dir.path().join("tn.crt")));
        assert_eq!(config.tls.key_file, Some(PathBuf::from("/etc/hopgate/tn.key")));
        let DownstreamConfig::Forward(next) = &config.downstream else {
            panic!("expected forward downstream");
        };
        assert_eq!(next.tls.ca_file, Some(dir.path().join("proxy.crt")));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            RelayConfig::load("/definitely/not/here.yaml"),
            Err(ConfigError::Io(_))
        ));
    }
}
