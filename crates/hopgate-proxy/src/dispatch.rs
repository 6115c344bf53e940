//! What a hop does with a query once it has been received.
//!
//! Forwarding hops hand it to a [`RelayClient`] for the next hop; the router
//! hop picks a backend with its [`SelectionPolicy`] and runs the query through
//! a [`QueryExecutor`].

use crate::client::RelayClient;
use crate::envelope::RelayResponse;
use crate::error::RelayError;
use crate::executor::QueryExecutor;
use crate::selection::SelectionPolicy;
use async_trait::async_trait;
use hopgate_core::BackendPool;
use std::sync::Arc;

/// Progress of one request through a hop.
///
/// `Received -> [AuthChecked] -> [BackendSelected] -> Executed -> Delivered`,
/// with `Failed` reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    AuthChecked,
    BackendSelected,
    Executed,
    Delivered,
    Failed,
}

/// Handles a query on behalf of a relay server.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, query: &str) -> Result<RelayResponse, RelayError>;
}

/// Relays queries to the next hop.
pub struct Forwarder {
    client: RelayClient,
}

impl Forwarder {
    pub fn new(client: RelayClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Dispatch for Forwarder {
    async fn dispatch(&self, query: &str) -> Result<RelayResponse, RelayError> {
        tracing::debug!(next_hop = %self.client.address(), "Forwarding query to next hop");
        // Error envelopes from further down the chain pass through unchanged.
        self.client.send(query).await
    }
}

/// Chooses a backend and executes queries on it.
pub struct Router {
    pool: Arc<BackendPool>,
    policy: SelectionPolicy,
    executor: Arc<dyn QueryExecutor>,
}

impl Router {
    pub fn new(pool: BackendPool, policy: SelectionPolicy, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            pool: Arc::new(pool),
            policy,
            executor,
        }
    }

    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }
}

#[async_trait]
impl Dispatch for Router {
    async fn dispatch(&self, query: &str) -> Result<RelayResponse, RelayError> {
        let backend = self.policy.select(query, &self.pool).await?;
        tracing::info!(
            backend = %backend.name,
            mode = %self.policy.mode(),
            state = ?RequestState::BackendSelected,
            "Forwarding query to backend"
        );

        let rows = self
            .executor
            .execute(backend, query)
            .await
            .inspect_err(|e| {
                tracing::warn!(backend = %backend.name, error = %e, "Error while executing query on backend");
            })?;

        tracing::debug!(
            backend = %backend.name,
            rows = rows.len(),
            state = ?RequestState::Executed,
            "Query executed"
        );
        Ok(RelayResponse::Rows(rows))
    }
}
