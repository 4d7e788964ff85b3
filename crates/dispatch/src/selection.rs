//! Worker selection.
//!
//! Candidates are filtered by capability, package, availability, heartbeat
//! freshness, and affinity; the strategy then picks one. Ties break
//! deterministically by worker name so tests are reproducible.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use meridian_core::WorkerName;
use meridian_gateway::{WorkerRecord, WorkerStatus};
use rand::RngExt;
use serde::{Deserialize, Serialize};

/// Worker selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// First eligible worker by name.
    #[default]
    Default,
    /// Fewest in-flight tasks.
    LeastInflight,
    /// Lowest observed latency EWMA.
    LeastLatency,
    /// Uniformly random among eligible workers.
    Random,
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "least_inflight" => Ok(Self::LeastInflight),
            "least_latency" => Ok(Self::LeastLatency),
            "random" => Ok(Self::Random),
            other => Err(format!("unknown dispatch strategy: {other}")),
        }
    }
}

/// What a dispatch needs from a worker.
#[derive(Debug, Clone)]
pub struct SelectionRequirements {
    /// Node type the worker must be able to execute.
    pub node_type: String,
    /// Required package, `name:version`.
    pub package: String,
    /// Optional affinity: the worker's queue must match.
    pub affinity: Option<String>,
    /// Heartbeats older than this exclude the worker.
    pub max_heartbeat_age: chrono::Duration,
}

fn eligible(record: &WorkerRecord, req: &SelectionRequirements, now: DateTime<Utc>) -> bool {
    record.status == WorkerStatus::Online
        && record.heartbeat_fresh(now, req.max_heartbeat_age)
        && record.capabilities.iter().any(|c| c == &req.node_type)
        && record.packages.iter().any(|p| p == &req.package)
        && req.affinity.as_ref().is_none_or(|queue| &record.queue == queue)
}

/// Pick a worker from `records` for the given requirements.
#[must_use]
pub fn select_worker(
    records: &[WorkerRecord],
    req: &SelectionRequirements,
    strategy: SelectionStrategy,
    now: DateTime<Utc>,
) -> Option<WorkerName> {
    let mut candidates: Vec<&WorkerRecord> =
        records.iter().filter(|r| eligible(r, req, now)).collect();
    if candidates.is_empty() {
        return None;
    }
    // Deterministic tie-breaking.
    candidates.sort_by(|a, b| a.worker_name.cmp(&b.worker_name));

    let chosen = match strategy {
        SelectionStrategy::Default => candidates[0],
        SelectionStrategy::LeastInflight => candidates
            .iter()
            .min_by_key(|r| r.in_flight_tasks)
            .expect("non-empty"),
        SelectionStrategy::LeastLatency => candidates
            .iter()
            .min_by(|a, b| {
                a.observed_latency_ms_ewma
                    .total_cmp(&b.observed_latency_ms_ewma)
            })
            .expect("non-empty"),
        SelectionStrategy::Random => {
            let idx = rand::rng().random_range(0..candidates.len());
            candidates[idx]
        }
    };
    Some(chosen.worker_name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::SessionId;
    use pretty_assertions::assert_eq;

    fn record(name: &str, in_flight: u32, latency: f64) -> WorkerRecord {
        WorkerRecord {
            worker_name: WorkerName::new(name).unwrap(),
            registered_at: Utc::now(),
            last_heartbeat_at: Utc::now(),
            capabilities: vec!["example.pkg.source".into()],
            packages: vec!["example.pkg:1.0.0".into()],
            queue: "default".into(),
            in_flight_tasks: in_flight,
            observed_latency_ms_ewma: latency,
            status: WorkerStatus::Online,
            session_id: Some(SessionId::v4()),
        }
    }

    fn req() -> SelectionRequirements {
        SelectionRequirements {
            node_type: "example.pkg.source".into(),
            package: "example.pkg:1.0.0".into(),
            affinity: None,
            max_heartbeat_age: chrono::Duration::seconds(90),
        }
    }

    #[test]
    fn default_picks_first_by_name() {
        let records = vec![record("w2", 0, 0.0), record("w1", 5, 0.0)];
        let chosen = select_worker(&records, &req(), SelectionStrategy::Default, Utc::now());
        assert_eq!(chosen.unwrap().as_str(), "w1");
    }

    #[test]
    fn least_inflight_prefers_idle_worker() {
        let records = vec![record("w1", 5, 0.0), record("w2", 1, 0.0)];
        let chosen = select_worker(&records, &req(), SelectionStrategy::LeastInflight, Utc::now());
        assert_eq!(chosen.unwrap().as_str(), "w2");
    }

    #[test]
    fn least_inflight_tie_breaks_by_name() {
        let records = vec![record("w2", 3, 0.0), record("w1", 3, 0.0)];
        let chosen = select_worker(&records, &req(), SelectionStrategy::LeastInflight, Utc::now());
        assert_eq!(chosen.unwrap().as_str(), "w1");
    }

    #[test]
    fn least_latency_prefers_fast_worker() {
        let records = vec![record("w1", 0, 250.0), record("w2", 0, 40.0)];
        let chosen = select_worker(&records, &req(), SelectionStrategy::LeastLatency, Utc::now());
        assert_eq!(chosen.unwrap().as_str(), "w2");
    }

    #[test]
    fn random_picks_an_eligible_worker() {
        let records = vec![record("w1", 0, 0.0), record("w2", 0, 0.0)];
        for _ in 0..20 {
            let chosen =
                select_worker(&records, &req(), SelectionStrategy::Random, Utc::now()).unwrap();
            assert!(["w1", "w2"].contains(&chosen.as_str()));
        }
    }

    #[test]
    fn filters_missing_capability() {
        let mut r = record("w1", 0, 0.0);
        r.capabilities = vec!["other.type".into()];
        assert!(select_worker(&[r], &req(), SelectionStrategy::Default, Utc::now()).is_none());
    }

    #[test]
    fn filters_missing_package() {
        let mut r = record("w1", 0, 0.0);
        r.packages = vec!["example.pkg:2.0.0".into()];
        assert!(select_worker(&[r], &req(), SelectionStrategy::Default, Utc::now()).is_none());
    }

    #[test]
    fn filters_offline_and_draining() {
        let mut offline = record("w1", 0, 0.0);
        offline.status = WorkerStatus::Offline;
        let mut draining = record("w2", 0, 0.0);
        draining.status = WorkerStatus::Draining;
        assert!(
            select_worker(&[offline, draining], &req(), SelectionStrategy::Default, Utc::now())
                .is_none()
        );
    }

    #[test]
    fn heartbeat_staleness_boundary() {
        let now = Utc::now();
        let mut r = record("w1", 0, 0.0);
        r.last_heartbeat_at = now - chrono::Duration::seconds(90);
        // Exactly at the threshold: eligible.
        assert!(select_worker(&[r.clone()], &req(), SelectionStrategy::Default, now).is_some());
        // A nanosecond past: excluded.
        assert!(
            select_worker(
                &[r],
                &req(),
                SelectionStrategy::Default,
                now + chrono::Duration::nanoseconds(1)
            )
            .is_none()
        );
    }

    #[test]
    fn affinity_matches_queue() {
        let mut gpu = record("w1", 0, 0.0);
        gpu.queue = "gpu".into();
        let cpu = record("w2", 0, 0.0);

        let mut wanted = req();
        wanted.affinity = Some("gpu".into());
        let chosen =
            select_worker(&[gpu, cpu], &wanted, SelectionStrategy::Default, Utc::now()).unwrap();
        assert_eq!(chosen.as_str(), "w1");
    }

    #[test]
    fn strategy_parses_from_config_strings() {
        assert_eq!(
            "least_inflight".parse::<SelectionStrategy>().unwrap(),
            SelectionStrategy::LeastInflight
        );
        assert_eq!(
            "default".parse::<SelectionStrategy>().unwrap(),
            SelectionStrategy::Default
        );
        assert!("fastest".parse::<SelectionStrategy>().is_err());
    }
}
