//! Database backend descriptors.
//!
//! A backend is described by its network address, the credentials the router
//! uses to log in, and the database to select. Two ways of supplying the
//! password are supported, in order of precedence:
//! 1. `password_env` - name of an environment variable holding the password
//! 2. `password` - the password inline

use serde::{Deserialize, Serialize};

/// One database server the router may send queries to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    /// Unique logical name (e.g. "worker1").
    pub name: String,

    /// Hostname or IP address of the server. Latency probes target this.
    pub host: String,

    /// Port of the database server.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for the backend connection.
    #[serde(default = "default_username")]
    pub username: String,

    /// Password for the backend connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable containing the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Database (schema) to select after connecting.
    #[serde(default = "default_database")]
    pub database: String,

    /// Whether this backend is the write-capable primary.
    #[serde(default)]
    pub primary: bool,
}

impl Default for BackendDescriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: default_host(),
            port: default_port(),
            username: default_username(),
            password: None,
            password_env: None,
            database: default_database(),
            primary: false,
        }
    }
}

impl BackendDescriptor {
    /// `host:port` of the database server.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Address handed to latency probes.
    pub fn probe_address(&self) -> &str {
        &self.host
    }

    /// Get the password, checking password_env first.
    pub fn resolved_password(&self) -> Option<String> {
        if let Some(env_var) = &self.password_env
            && let Ok(password) = std::env::var(env_var)
        {
            return Some(password);
        }
        self.password.clone()
    }
}

// Default value functions
fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_username() -> String {
    "root".to_string()
}

fn default_database() -> String {
    "sakila".to_string()
}
