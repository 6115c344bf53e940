//! Relay server: the accept loop shared by every hop.
//!
//! Listens on the configured address, optionally terminates TLS, and hands
//! each connection to a [`ConnectionHandler`] on its own task. At most
//! `max_connections` connections are served at the same time; further
//! callers wait in the listen backlog.

use crate::channel::ChannelAcceptor;
use crate::client::RelayClient;
use crate::dispatch::{Dispatch, Forwarder, Router};
use crate::error::RelayError;
use crate::executor::MySqlExecutor;
use crate::frame::Framing;
use crate::handler::ConnectionHandler;
use crate::probe::PingProbe;
use crate::selection::SelectionPolicy;
use hopgate_core::{DownstreamConfig, ListenConfig, RelayConfig, SelectionMode};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::Instrument;

/// Pause after a failed `accept` so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// One hop of the relay chain.
pub struct RelayServer {
    name: String,
    listen: ListenConfig,
    acceptor: ChannelAcceptor,
    handler: Arc<ConnectionHandler>,
}

impl RelayServer {
    pub fn new(
        name: impl Into<String>,
        listen: ListenConfig,
        acceptor: ChannelAcceptor,
        handler: ConnectionHandler,
    ) -> Self {
        Self {
            name: name.into(),
            listen,
            acceptor,
            handler: Arc::new(handler),
        }
    }

    /// Build a hop from its configuration.
    ///
    /// `mode_override` replaces the router's configured selection mode and is
    /// ignored by forwarding hops.
    pub fn from_config(config: &RelayConfig, mode_override: Option<SelectionMode>) -> Result<Self, RelayError> {
        let framing = Framing::from_listen(&config.listen);
        let acceptor = ChannelAcceptor::from_config(&config.tls)?;
        let token = config.inbound_token()?;

        let dispatcher: Arc<dyn Dispatch> = match &config.downstream {
            DownstreamConfig::Forward(next) => {
                let client = RelayClient::from_config(next, framing)?;
                tracing::debug!(next_hop = %client.address(), "Configured forwarding hop");
                Arc::new(Forwarder::new(client))
            }
            DownstreamConfig::Router(router) => {
                let mode = mode_override.unwrap_or(router.mode);
                let pool = router.pool()?;
                tracing::debug!(mode = %mode, backends = pool.len(), "Configured router hop");
                let policy = SelectionPolicy::new(mode, Arc::new(PingProbe::new(router.probe.timeout())));
                let executor = Arc::new(MySqlExecutor::new(router.connect_timeout()));
                Arc::new(Router::new(pool, policy, executor))
            }
        };

        let handler = ConnectionHandler::new(token, dispatcher, framing, config.listen.request_timeout());
        Ok(Self::new(config.name.clone(), config.listen.clone(), acceptor, handler))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener, RelayError> {
        let address = self.listen.bind_address();
        TcpListener::bind(&address)
            .await
            .map_err(|e| RelayError::BindFailed { address, source: e })
    }

    /// Bind and serve until the process is stopped.
    pub async fn run(&self) -> Result<(), RelayError> {
        let listener = self.bind().await?;
        self.serve_until(listener, std::future::pending()).await
    }

    /// Serve connections from `listener` until `shutdown` completes.
    ///
    /// Connections already being handled keep running on their own tasks.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()>,
    {
        let local = listener
            .local_addr()
            .map_err(|e| RelayError::transport("failed to read listen address", e))?;
        tracing::info!(
            hop = %self.name,
            address = %local,
            tls = self.acceptor.is_tls(),
            auth = self.handler.requires_auth(),
            "Relay server listening"
        );

        let limit = Arc::new(Semaphore::new(self.listen.max_connections.max(1) as usize));
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = limit.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (socket, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
            }

            let acceptor = self.acceptor.clone();
            let handler = self.handler.clone();
            let handshake_timeout = self.listen.io_timeout();
            let span = tracing::info_span!("connection", id = %uuid::Uuid::new_v4(), peer = %peer);

            tokio::spawn(
                async move {
                    let _permit = permit;
                    tracing::debug!("New connection");
                    match acceptor.accept(socket, handshake_timeout).await {
                        Ok(stream) => handler.handle(stream).await,
                        Err(e) => tracing::warn!(error = %e, "Connection setup failed"),
                    }
                }
                .instrument(span),
            );
        }

        tracing::info!(hop = %self.name, "Relay server stopped accepting connections");
        Ok(())
    }
}
