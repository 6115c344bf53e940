//! Per-connection request pipeline.
//!
//! One connection carries exactly one request:
//! 1. token frame, if this hop requires authentication
//! 2. query frame
//! 3. response frame written back by the hop
//!
//! Whatever happens in between, the caller gets a JSON envelope (unless the
//! connection itself is gone) and the connection is closed afterwards.

use crate::channel::BoxedStream;
use crate::dispatch::{Dispatch, RequestState};
use crate::envelope::RelayResponse;
use crate::error::RelayError;
use crate::frame::Framing;
use hopgate_core::AuthToken;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{Instant, timeout};

/// How long to keep reading after the response has been sent, so the peer
/// receives it before the socket is torn down.
const LINGER: Duration = Duration::from_millis(500);

/// Processes single-request connections for one hop.
pub struct ConnectionHandler {
    token: Option<AuthToken>,
    dispatcher: Arc<dyn Dispatch>,
    framing: Framing,
    request_timeout: Duration,
}

impl ConnectionHandler {
    pub fn new(
        token: Option<AuthToken>,
        dispatcher: Arc<dyn Dispatch>,
        framing: Framing,
        request_timeout: Duration,
    ) -> Self {
        Self {
            token,
            dispatcher,
            framing,
            request_timeout,
        }
    }

    pub fn requires_auth(&self) -> bool {
        self.token.is_some()
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Serve one connection to completion. Never returns an error: failures
    /// are answered with an error envelope and logged.
    pub async fn handle(&self, mut stream: BoxedStream) {
        let start = Instant::now();
        let mut state = RequestState::Received;

        let response = match self.process(&mut stream, &mut state).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(failed_at = ?state, error = %e, "Request failed");
                state = RequestState::Failed;
                e.into_response()
            }
        };

        let payload = match response.to_bytes() {
            Ok(bytes) if bytes.len() <= self.framing.max_frame_bytes as usize => bytes,
            Ok(bytes) => {
                tracing::warn!(bytes = bytes.len(), "Response exceeds frame limit");
                state = RequestState::Failed;
                error_payload(format!(
                    "response of {} bytes exceeds the {} byte limit",
                    bytes.len(),
                    self.framing.max_frame_bytes
                ))
            }
            Err(e) => {
                state = RequestState::Failed;
                error_payload(e.to_string())
            }
        };

        match self.framing.write(&mut stream, &payload).await {
            Ok(()) => {
                if state != RequestState::Failed {
                    state = RequestState::Delivered;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send response");
                state = RequestState::Failed;
            }
        }

        self.close(&mut stream).await;

        tracing::info!(
            state = ?state,
            error_envelope = response.is_error() || state == RequestState::Failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Connection closed"
        );
    }

    async fn process(
        &self,
        stream: &mut BoxedStream,
        state: &mut RequestState,
    ) -> Result<RelayResponse, RelayError> {
        if let Some(token) = &self.token {
            let presented = self.framing.read(stream).await?;
            if !token.matches(&presented) {
                tracing::warn!("Invalid authentication token, closing connection");
                return Err(RelayError::AuthenticationFailed);
            }
            *state = RequestState::AuthChecked;
            tracing::debug!("Token verified");
        }

        let query = self.framing.read_text(stream).await?;
        tracing::debug!(query = %query, "Query received");

        let response = timeout(self.request_timeout, self.dispatcher.dispatch(&query))
            .await
            .map_err(|_| RelayError::Timeout(self.request_timeout))??;
        *state = RequestState::Executed;
        Ok(response)
    }

    /// Shut down our side, then drain whatever the peer still sends for a
    /// short while so unread input does not turn the close into a reset.
    async fn close(&self, stream: &mut BoxedStream) {
        if let Err(e) = timeout(LINGER, stream.shutdown()).await.unwrap_or(Ok(())) {
            tracing::debug!(error = %e, "Failed to shut down connection cleanly");
        }

        let budget = self.framing.max_frame_bytes as usize + 4;
        let mut drained = 0usize;
        let mut buf = [0u8; 4096];
        let deadline = Instant::now() + LINGER;
        while drained <= budget {
            match tokio::time::timeout_at(deadline, stream.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => drained += n,
                _ => break,
            }
        }
    }
}

fn error_payload(message: String) -> Vec<u8> {
    RelayResponse::error(message).to_bytes().unwrap_or_default()
}
