//! Secure channel between hops.
//!
//! Both ends hand out a boxed byte stream so the relay code does not care
//! whether TLS is in use. Certificates and keys are read from PEM files; a
//! `client_ca_file` on the listening side turns on client certificate
//! verification (mutual TLS).

use crate::error::RelayError;
use hopgate_core::{ClientTlsConfig, NextHopConfig, ServerTlsConfig};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// A bidirectional byte stream between two hops.
pub trait RelayStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> RelayStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type BoxedStream = Box<dyn RelayStream>;

/// Listening side of the channel.
#[derive(Clone)]
pub enum ChannelAcceptor {
    Plain,
    Tls(TlsAcceptor),
}

impl ChannelAcceptor {
    pub fn from_config(tls: &ServerTlsConfig) -> Result<Self, RelayError> {
        if !tls.enabled {
            return Ok(ChannelAcceptor::Plain);
        }

        let cert_file = tls
            .cert_file
            .as_deref()
            .ok_or_else(|| RelayError::Tls("missing tls cert_file".to_string()))?;
        let key_file = tls
            .key_file
            .as_deref()
            .ok_or_else(|| RelayError::Tls("missing tls key_file".to_string()))?;
        let cert_chain = load_certs(cert_file)?;
        let key = load_private_key(key_file)?;

        let builder = ServerConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()
            .map_err(tls_error)?;

        let config = match &tls.client_ca_file {
            Some(ca_file) => {
                let roots = Arc::new(load_roots(ca_file)?);
                let verifier = WebPkiClientVerifier::builder_with_provider(roots, provider())
                    .build()
                    .map_err(tls_error)?;
                builder
                    .with_client_cert_verifier(verifier)
                    .with_single_cert(cert_chain, key)
            }
            None => builder.with_no_client_auth().with_single_cert(cert_chain, key),
        }
        .map_err(tls_error)?;

        Ok(ChannelAcceptor::Tls(TlsAcceptor::from(Arc::new(config))))
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, ChannelAcceptor::Tls(_))
    }

    /// Wrap an accepted socket, running the TLS handshake if enabled.
    pub async fn accept(&self, socket: TcpStream, handshake_timeout: Duration) -> Result<BoxedStream, RelayError> {
        match self {
            ChannelAcceptor::Plain => Ok(Box::new(socket)),
            ChannelAcceptor::Tls(acceptor) => {
                let stream = timeout(handshake_timeout, acceptor.accept(socket))
                    .await
                    .map_err(|_| RelayError::Timeout(handshake_timeout))?
                    .map_err(|e| RelayError::Tls(format!("handshake failed: {}", e)))?;
                Ok(Box::new(stream))
            }
        }
    }
}

/// Connecting side of the channel.
#[derive(Clone)]
pub enum ChannelConnector {
    Plain,
    Tls {
        connector: TlsConnector,
        server_name: ServerName<'static>,
    },
}

impl ChannelConnector {
    pub fn from_config(next: &NextHopConfig) -> Result<Self, RelayError> {
        if !next.tls.enabled {
            return Ok(ChannelConnector::Plain);
        }

        let config = client_config(&next.tls)?;
        let server_name = ServerName::try_from(next.server_name())
            .map_err(|e| RelayError::Tls(format!("invalid server name: {}", e)))?;

        Ok(ChannelConnector::Tls {
            connector: TlsConnector::from(Arc::new(config)),
            server_name,
        })
    }

    /// Open a connection to `address` (`host:port`).
    pub async fn connect(&self, address: &str, connect_timeout: Duration) -> Result<BoxedStream, RelayError> {
        let socket = timeout(connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| RelayError::Timeout(connect_timeout))?
            .map_err(|e| RelayError::transport(format!("failed to connect to {}", address), e))?;
        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        match self {
            ChannelConnector::Plain => Ok(Box::new(socket)),
            ChannelConnector::Tls {
                connector,
                server_name,
            } => {
                let stream = timeout(connect_timeout, connector.connect(server_name.clone(), socket))
                    .await
                    .map_err(|_| RelayError::Timeout(connect_timeout))?
                    .map_err(|e| RelayError::Tls(format!("handshake with {} failed: {}", address, e)))?;
                Ok(Box::new(stream))
            }
        }
    }
}

fn client_config(tls: &ClientTlsConfig) -> Result<ClientConfig, RelayError> {
    let ca_file = tls
        .ca_file
        .as_deref()
        .ok_or_else(|| RelayError::Tls("missing tls ca_file for the next hop".to_string()))?;
    let roots = load_roots(ca_file)?;

    let builder = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(tls_error)?
        .with_root_certificates(roots);

    match (&tls.cert_file, &tls.key_file) {
        (Some(cert_file), Some(key_file)) => builder
            .with_client_auth_cert(load_certs(cert_file)?, load_private_key(key_file)?)
            .map_err(tls_error),
        (None, None) => Ok(builder.with_no_client_auth()),
        _ => Err(RelayError::Tls(
            "client cert_file and key_file must be set together".to_string(),
        )),
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn tls_error(e: impl std::fmt::Display) -> RelayError {
    RelayError::Tls(e.to_string())
}

fn open(path: &Path) -> Result<BufReader<File>, RelayError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| RelayError::Tls(format!("failed to open {}: {}", path.display(), e)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, RelayError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RelayError::Tls(format!("failed to read certificates from {}: {}", path.display(), e)))?;
    if certs.is_empty() {
        return Err(RelayError::Tls(format!("no certificates found in {}", path.display())));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, RelayError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| RelayError::Tls(format!("failed to read private key from {}: {}", path.display(), e)))?
        .ok_or_else(|| RelayError::Tls(format!("no private key found in {}", path.display())))
}

fn load_roots(path: &Path) -> Result<RootCertStore, RelayError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert).map_err(tls_error)?;
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_plain_when_tls_disabled() {
        let acceptor = ChannelAcceptor::from_config(&ServerTlsConfig::default()).unwrap();
        assert!(!acceptor.is_tls());

        let next = NextHopConfig {
            address: "127.0.0.1:5000".to_string(),
            tls: ClientTlsConfig::default(),
            auth: None,
        };
        assert!(matches!(
            ChannelConnector::from_config(&next).unwrap(),
            ChannelConnector::Plain
        ));
    }

    #[test]
    fn test_missing_cert_file_is_tls_error() {
        let tls = ServerTlsConfig {
            enabled: true,
            cert_file: Some(PathBuf::from("/nonexistent/hopgate.crt")),
            key_file: Some(PathBuf::from("/nonexistent/hopgate.key")),
            client_ca_file: None,
        };
        let err = ChannelAcceptor::from_config(&tls).err().unwrap();
        assert!(err.to_string().contains("failed to open /nonexistent/hopgate.crt"));
    }

    #[test]
    fn test_client_requires_ca_file() {
        let next = NextHopConfig {
            address: "proxy.internal:5000".to_string(),
            tls: ClientTlsConfig {
                enabled: true,
                ..Default::default()
            },
            auth: None,
        };
        let err = ChannelConnector::from_config(&next).err().unwrap();
        assert!(matches!(err, RelayError::Tls(_)));
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = ChannelConnector::Plain
            .connect(&address, Duration::from_secs(2))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().starts_with(&format!("failed to connect to {}", address)));
    }
}
