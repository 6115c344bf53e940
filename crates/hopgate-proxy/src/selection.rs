//! Backend selection policy.
//!
//! Given a query and the backend pool, pick the backend that executes it:
//!
//! | Mode          | Choice                                                     |
//! |---------------|------------------------------------------------------------|
//! | `random`      | uniformly random replica, never the primary                |
//! | `directhit`   | always the primary                                         |
//! | `customized`  | replica with the lowest probed latency, random if none answer |
//! | `loadbalance` | `SELECT ...` to a random replica, everything else to the primary |
//!
//! Every call is independent. No counters or probe results are kept between
//! calls.

use crate::probe::LatencyProbe;
use hopgate_core::{BackendDescriptor, BackendPool, SelectionMode, UnknownModeError};
use rand::seq::IndexedRandom;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while choosing a backend.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error(transparent)]
    UnknownMode(#[from] UnknownModeError),

    #[error("no backend available for selection mode '{0}'")]
    NoBackendAvailable(SelectionMode),
}

/// Picks a backend for each query according to one [`SelectionMode`].
#[derive(Clone)]
pub struct SelectionPolicy {
    mode: SelectionMode,
    probe: Arc<dyn LatencyProbe>,
}

impl SelectionPolicy {
    pub fn new(mode: SelectionMode, probe: Arc<dyn LatencyProbe>) -> Self {
        Self { mode, probe }
    }

    /// Build a policy from a mode name such as `"loadbalance"`.
    pub fn from_mode_name(name: &str, probe: Arc<dyn LatencyProbe>) -> Result<Self, SelectionError> {
        Ok(Self::new(name.parse()?, probe))
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Choose the backend that should execute `query`.
    pub async fn select<'p>(
        &self,
        query: &str,
        pool: &'p BackendPool,
    ) -> Result<&'p BackendDescriptor, SelectionError> {
        match self.mode {
            SelectionMode::Random => random_replica(pool, self.mode),
            SelectionMode::DirectHit => Ok(pool.primary()),
            SelectionMode::Customized => self.lowest_latency_replica(pool).await,
            SelectionMode::LoadBalance => {
                if is_read_only(query) {
                    random_replica(pool, self.mode)
                } else {
                    Ok(pool.primary())
                }
            }
        }
    }

    /// Probe every replica in turn and keep the fastest one that answered.
    async fn lowest_latency_replica<'p>(
        &self,
        pool: &'p BackendPool,
    ) -> Result<&'p BackendDescriptor, SelectionError> {
        let replicas = pool.replicas();
        if replicas.is_empty() {
            return Err(SelectionError::NoBackendAvailable(self.mode));
        }

        let mut fastest: Option<(&'p BackendDescriptor, Duration)> = None;
        for backend in replicas {
            match self.probe.probe(backend.probe_address()).await {
                Ok(latency) => {
                    tracing::debug!(
                        backend = %backend.name,
                        latency_ms = latency.as_secs_f64() * 1000.0,
                        "Latency probe answered"
                    );
                    if fastest.is_none_or(|(_, best)| latency < best) {
                        fastest = Some((backend, latency));
                    }
                }
                Err(e) => {
                    tracing::warn!(backend = %backend.name, error = %e, "Latency probe failed, skipping backend");
                }
            }
        }

        match fastest {
            Some((backend, _)) => Ok(backend),
            None => {
                tracing::warn!("All latency probes failed, falling back to a random replica");
                random_replica(pool, self.mode)
            }
        }
    }
}

/// Whether the query is routed as a read: its trimmed text starts with
/// `select`, ignoring case. Nothing else about the query is inspected.
pub fn is_read_only(query: &str) -> bool {
    query
        .trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
}

fn random_replica(
    pool: &BackendPool,
    mode: SelectionMode,
) -> Result<&BackendDescriptor, SelectionError> {
    pool.replicas()
        .choose(&mut rand::rng())
        .copied()
        .ok_or(SelectionError::NoBackendAvailable(mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Probe with canned answers per address; unknown addresses fail.
    #[derive(Default)]
    struct ScriptedProbe {
        latencies: HashMap<String, u64>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProbe {
        fn with(latencies: &[(&str, u64)]) -> Arc<Self> {
            Arc::new(Self {
                latencies: latencies
                    .iter()
                    .map(|(addr, ms)| (addr.to_string(), *ms))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LatencyProbe for ScriptedProbe {
        async fn probe(&self, address: &str) -> Result<Duration, ProbeError> {
            self.calls.lock().unwrap().push(address.to_string());
            self.latencies
                .get(address)
                .map(|ms| Duration::from_millis(*ms))
                .ok_or_else(|| ProbeError::Failed("exit status: 1".to_string()))
        }
    }

    fn backend(name: &str, primary: bool) -> BackendDescriptor {
        BackendDescriptor {
            name: name.to_string(),
            host: format!("{}.internal", name),
            primary,
            ..Default::default()
        }
    }

    fn pool() -> BackendPool {
        BackendPool::new(vec![
            backend("worker1", false),
            backend("worker2", false),
            backend("worker3", false),
            backend("manager", true),
        ])
        .unwrap()
    }

    fn primary_only() -> BackendPool {
        BackendPool::new(vec![backend("manager", true)]).unwrap()
    }

    fn policy(mode: SelectionMode) -> SelectionPolicy {
        SelectionPolicy::new(mode, ScriptedProbe::with(&[]))
    }

    #[tokio::test]
    async fn test_random_never_picks_primary_and_is_uniform() {
        let pool = pool();
        let policy = policy(SelectionMode::Random);
        let mut counts: HashMap<String, usize> = HashMap::new();

        let rounds = 3000;
        for _ in 0..rounds {
            let chosen = policy.select("SELECT 1", &pool).await.unwrap();
            *counts.entry(chosen.name.clone()).or_default() += 1;
        }

        assert!(!counts.contains_key("manager"));
        assert_eq!(counts.len(), 3);
        for (name, count) in counts {
            let share = count as f64 / rounds as f64;
            assert!((0.25..0.42).contains(&share), "{} chosen {:.3} of the time", name, share);
        }
    }

    #[tokio::test]
    async fn test_directhit_always_primary() {
        let pool = pool();
        let policy = policy(SelectionMode::DirectHit);
        for query in ["SELECT * FROM film", "INSERT INTO film VALUES (1)", "", "not sql at all"] {
            assert_eq!(policy.select(query, &pool).await.unwrap().name, "manager");
        }
    }

    #[tokio::test]
    async fn test_loadbalance_splits_reads_and_writes() {
        let pool = pool();
        let policy = policy(SelectionMode::LoadBalance);

        for query in ["SELECT * FROM film", "select * from film", "  select 1", "\n\tSeLeCt 1  "] {
            let chosen = policy.select(query, &pool).await.unwrap();
            assert!(!chosen.primary, "{:?} went to the primary", query);
        }

        for query in ["INSERT INTO film (title) VALUES ('x')", "UPDATE film SET title = 'y'", "", "sel"] {
            assert_eq!(policy.select(query, &pool).await.unwrap().name, "manager");
        }
    }

    #[test]
    fn test_read_only_classification_is_textual() {
        assert!(is_read_only("SELECT 1; DELETE FROM film"));
        assert!(is_read_only("selection_is_not_a_keyword"));
        assert!(!is_read_only("-- select\nDELETE FROM film"));
        assert!(!is_read_only("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(!is_read_only("sélect"));
    }

    #[tokio::test]
    async fn test_customized_picks_lowest_latency() {
        let pool = pool();
        let probe = ScriptedProbe::with(&[
            ("worker1.internal", 9),
            ("worker2.internal", 2),
            ("worker3.internal", 5),
        ]);
        let policy = SelectionPolicy::new(SelectionMode::Customized, probe.clone());

        assert_eq!(policy.select("SELECT 1", &pool).await.unwrap().name, "worker2");
        assert_eq!(
            *probe.calls.lock().unwrap(),
            vec!["worker1.internal", "worker2.internal", "worker3.internal"]
        );
    }

    #[tokio::test]
    async fn test_customized_reprobes_every_call() {
        let pool = pool();
        let probe = ScriptedProbe::with(&[("worker1.internal", 1)]);
        let policy = SelectionPolicy::new(SelectionMode::Customized, probe.clone());

        policy.select("SELECT 1", &pool).await.unwrap();
        policy.select("SELECT 1", &pool).await.unwrap();
        assert_eq!(probe.calls.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_customized_single_success_wins() {
        let pool = pool();
        let probe = ScriptedProbe::with(&[("worker3.internal", 250)]);
        let policy = SelectionPolicy::new(SelectionMode::Customized, probe);

        for _ in 0..10 {
            assert_eq!(policy.select("SELECT 1", &pool).await.unwrap().name, "worker3");
        }
    }

    #[tokio::test]
    async fn test_customized_falls_back_to_random_replica() {
        let pool = pool();
        let policy = policy(SelectionMode::Customized);

        for _ in 0..20 {
            let chosen = policy.select("SELECT 1", &pool).await.unwrap();
            assert!(!chosen.primary);
        }
    }

    #[tokio::test]
    async fn test_never_probes_primary() {
        let pool = pool();
        let probe = ScriptedProbe::with(&[("manager.internal", 0)]);
        let policy = SelectionPolicy::new(SelectionMode::Customized, probe.clone());

        policy.select("SELECT 1", &pool).await.unwrap();
        assert!(!probe.calls.lock().unwrap().iter().any(|a| a == "manager.internal"));
    }

    #[tokio::test]
    async fn test_empty_replica_set() {
        let pool = primary_only();

        for mode in [SelectionMode::Random, SelectionMode::Customized] {
            let err = policy(mode).select("SELECT 1", &pool).await.unwrap_err();
            assert!(matches!(err, SelectionError::NoBackendAvailable(m) if m == mode));
        }

        let lb = policy(SelectionMode::LoadBalance);
        assert!(matches!(
            lb.select("SELECT 1", &pool).await,
            Err(SelectionError::NoBackendAvailable(SelectionMode::LoadBalance))
        ));
        assert_eq!(lb.select("DELETE FROM film", &pool).await.unwrap().name, "manager");
        assert_eq!(
            policy(SelectionMode::DirectHit).select("SELECT 1", &pool).await.unwrap().name,
            "manager"
        );
    }

    #[test]
    fn test_unknown_mode_name() {
        let result = SelectionPolicy::from_mode_name("fastest", ScriptedProbe::with(&[]));
        let Err(SelectionError::UnknownMode(err)) = result else {
            panic!("expected an unknown mode error");
        };
        assert_eq!(err.0, "fastest");

        let policy = SelectionPolicy::from_mode_name("LoadBalance", ScriptedProbe::with(&[])).unwrap();
        assert_eq!(policy.mode(), SelectionMode::LoadBalance);
    }
}
