//! Outbound side of a relay hop.

use crate::channel::{BoxedStream, ChannelConnector};
use crate::envelope::RelayResponse;
use crate::error::RelayError;
use crate::frame::Framing;
use hopgate_core::{AuthToken, NextHopConfig};
use tokio::io::AsyncWriteExt;

/// Sends one query per connection to a fixed next hop.
#[derive(Clone)]
pub struct RelayClient {
    address: String,
    connector: ChannelConnector,
    token: Option<AuthToken>,
    framing: Framing,
}

impl RelayClient {
    pub fn new(
        address: impl Into<String>,
        connector: ChannelConnector,
        token: Option<AuthToken>,
        framing: Framing,
    ) -> Self {
        Self {
            address: address.into(),
            connector,
            token,
            framing,
        }
    }

    /// Build a client for the `downstream` section of a forwarding hop.
    pub fn from_config(next: &NextHopConfig, framing: Framing) -> Result<Self, RelayError> {
        let connector = ChannelConnector::from_config(next)?;
        let token = next.auth.as_ref().map(|auth| auth.resolve()).transpose()?;
        Ok(Self::new(next.address.clone(), connector, token, framing))
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send `query` and return the next hop's response.
    ///
    /// The connection is closed before returning, on success and on error.
    pub async fn send(&self, query: &str) -> Result<RelayResponse, RelayError> {
        let mut stream = self
            .connector
            .connect(&self.address, self.framing.io_timeout)
            .await?;

        let result = self.exchange(&mut stream, query).await;

        if let Err(e) = stream.shutdown().await {
            tracing::debug!(address = %self.address, error = %e, "Failed to shut down connection cleanly");
        }
        result
    }

    /// Like [`RelayClient::send`], but local failures become an error envelope.
    pub async fn query(&self, query: &str) -> RelayResponse {
        match self.send(query).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(address = %self.address, error = %e, "Relay request failed");
                e.into_response()
            }
        }
    }

    async fn exchange(&self, stream: &mut BoxedStream, query: &str) -> Result<RelayResponse, RelayError> {
        if let Some(token) = &self.token {
            self.framing.write(stream, token.as_bytes()).await?;
        }
        self.framing.write(stream, query.as_bytes()).await?;

        let payload = self.framing.read(stream).await?;
        RelayResponse::from_bytes(&payload)
    }
}
