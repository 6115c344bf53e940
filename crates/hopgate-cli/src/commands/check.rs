//! `hopgate check` - validate a hop configuration without starting it.
//!
//! Loads the file, builds the hop (which also reads TLS material and resolves
//! secrets) and prints what the hop would do. Secrets are never printed.

use anyhow::{Context, Result};
use hopgate_core::{DownstreamConfig, RelayConfig};
use hopgate_proxy::RelayServer;
use std::path::Path;

pub fn run_check(config_path: &Path) -> Result<()> {
    let config = RelayConfig::load(config_path)
        .with_context(|| format!("invalid config {}", config_path.display()))?;
    RelayServer::from_config(&config, None)
        .with_context(|| format!("config {} cannot be served", config_path.display()))?;

    for line in summary(&config) {
        println!("{}", line);
    }
    println!("OK");
    Ok(())
}

fn summary(config: &RelayConfig) -> Vec<String> {
    let mut lines = vec![
        format!("hop:        {}", config.name),
        format!("listen:     {}", config.listen.bind_address()),
        format!("tls:        {}", on_off(config.tls.enabled)),
        format!("auth:       {}", on_off(config.auth.is_some())),
    ];

    match &config.downstream {
        DownstreamConfig::Forward(next) => {
            lines.push(format!("forward to: {}", next.address));
            lines.push(format!("  tls:      {}", on_off(next.tls.enabled)));
            lines.push(format!("  token:    {}", on_off(next.auth.is_some())));
        }
        DownstreamConfig::Router(router) => {
            lines.push(format!("router:     mode {}", router.mode));
            if let Ok(pool) = router.pool() {
                for backend in pool.iter() {
                    let role = if backend.primary { "primary" } else { "replica" };
                    lines.push(format!("  {}:  {} ({})", role, backend.name, backend.address()));
                }
            }
        }
    }
    lines
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_router_summary_lists_pool() {
        let config = RelayConfig::from_yaml(
            r#"
name: proxy
downstream:
  kind: router
  mode: loadbalance
  backends:
    - { name: manager, host: 10.0.0.1, primary: true }
    - { name: worker1, host: 10.0.0.2 }
    - { name: worker2, host: 10.0.0.3, port: 3307 }
"#,
        )
        .unwrap();

        let lines = summary(&config);
        assert!(lines.contains(&"router:     mode loadbalance".to_string()));
        assert!(lines.contains(&"  primary:  manager (10.0.0.1:3306)".to_string()));
        assert!(lines.contains(&"  replica:  worker2 (10.0.0.3:3307)".to_string()));
        let pool_lines: Vec<&String> = lines.iter().filter(|l| l.starts_with("  ")).collect();
        assert_eq!(pool_lines.len(), 3);
        assert!(pool_lines[0].contains("manager"));
    }

    #[test]
    fn test_check_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "downstream:\n  kind: router\n  backends:\n    - {{ name: worker1, host: db1 }}"
        )
        .unwrap();

        let err = run_check(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("no backend is marked primary"));
    }

    #[test]
    fn test_check_accepts_forwarding_hop() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "name: gatekeeper\nauth:\n  token: pre_shared_key\ndownstream:\n  kind: forward\n  address: 127.0.0.1:5001"
        )
        .unwrap();

        run_check(file.path()).unwrap();
    }
}
