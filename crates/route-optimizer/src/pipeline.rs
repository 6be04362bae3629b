//! Control-plane tick: stats -> cost matrix -> route matrix -> snapshots

use chrono::{DateTime, Utc};
use relay_stats::{RelayStatsUpdate, StatsDatabase};
use route_matrix::{CostMatrix, MatrixCodec, MatrixStore, Relay, RouteMatrix};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::future::Future;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::{loader, OptimizerConfig, Result};

/// Result of one optimization pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub built_at: DateTime<Utc>,
    pub relays: usize,
    pub reachable_pairs: usize,
    pub routes: usize,
    pub route_matrix_bytes: usize,
    pub elapsed_ms: u64,
}

/// Holds stats history and the currently served snapshots
pub struct ControlPlane {
    config: OptimizerConfig,
    stats: StatsDatabase,
    cost_matrix: MatrixStore<CostMatrix>,
    route_matrix: MatrixStore<RouteMatrix>,
}

impl ControlPlane {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            stats: StatsDatabase::new(),
            cost_matrix: MatrixStore::default(),
            route_matrix: MatrixStore::default(),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn stats(&self) -> &StatsDatabase {
        &self.stats
    }

    pub fn cost_matrix(&self) -> &MatrixStore<CostMatrix> {
        &self.cost_matrix
    }

    pub fn route_matrix(&self) -> &MatrixStore<RouteMatrix> {
        &self.route_matrix
    }

    /// Feed relay updates into the stats history. Returns pings stored.
    pub fn ingest(&self, updates: &[RelayStatsUpdate]) -> usize {
        updates.iter().map(|u| self.stats.process_stats(u)).sum()
    }

    /// Build and publish fresh snapshots for the given relay registry.
    ///
    /// Stats of relays no longer in the registry are dropped first.
    pub fn tick(&self, relays: Vec<Relay>) -> Result<TickSummary> {
        let start = Instant::now();

        let current: HashSet<u64> = relays.iter().map(|r| r.id).collect();
        for id in self.stats.relay_ids() {
            if !current.contains(&id) {
                debug!(relay_id = id, "relay left registry");
                self.stats.remove_relay(id);
            }
        }

        let cost = self
            .stats
            .get_cost_matrix(relays, self.config.max_jitter, self.config.max_packet_loss);
        let matrix = match self.config.segments {
            Some(segments) => cost.optimize_with_segments(self.config.threshold_rtt, segments),
            None => cost.optimize(self.config.threshold_rtt),
        };

        let relays = cost.num_relays();
        let reachable_pairs = cost.reachable_pairs();
        let routes = matrix.total_routes();

        self.cost_matrix.publish(cost)?;
        self.route_matrix.publish(matrix)?;

        let published = self.route_matrix.snapshot();
        let summary = TickSummary {
            built_at: published.built_at,
            relays,
            reachable_pairs,
            routes,
            route_matrix_bytes: published.bytes.len(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            relays = summary.relays,
            reachable = summary.reachable_pairs,
            routes = summary.routes,
            elapsed_ms = summary.elapsed_ms,
            "tick complete"
        );
        Ok(summary)
    }
}

/// Where a pass reads its inputs and writes its outputs
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub relays: PathBuf,
    pub stats: PathBuf,
    pub output: PathBuf,
    pub cost_output: Option<PathBuf>,
    pub summary: Option<PathBuf>,
}

/// Load inputs, run one tick and write the served snapshots
pub fn run_once(plane: &ControlPlane, paths: &OutputPaths) -> Result<TickSummary> {
    let relays = loader::load_relays(&paths.relays)?;
    let updates = loader::load_stats(&paths.stats)?;
    plane.ingest(&updates);

    let summary = plane.tick(relays)?;

    std::fs::write(&paths.output, plane.route_matrix().bytes())?;
    info!("Wrote route matrix to {:?}", paths.output);

    if let Some(path) = &paths.cost_output {
        std::fs::write(path, plane.cost_matrix().bytes())?;
        info!("Wrote cost matrix to {:?}", path);
    }

    if let Some(path) = &paths.summary {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &summary)?;
    }

    Ok(summary)
}

/// Re-run `run_once` every `every` until `shutdown` resolves. A failed pass is
/// logged and the previous snapshots keep being served.
pub async fn watch<F>(plane: Arc<ControlPlane>, paths: OutputPaths, every: Duration, shutdown: F) -> usize
where
    F: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(every);
    let mut passes = 0;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(passes, "shutting down");
                return passes;
            }
            _ = interval.tick() => {
                let plane = plane.clone();
                let paths = paths.clone();
                match tokio::task::spawn_blocking(move || run_once(&plane, &paths)).await {
                    Ok(Ok(_)) => passes += 1,
                    Ok(Err(e)) => error!(error = %e, "optimization pass failed"),
                    Err(e) => error!(error = %e, "optimization task panicked"),
                }
            }
        }
    }
}

/// Decode a written snapshot, e.g. to verify an output file
pub fn read_route_matrix(path: impl AsRef<std::path::Path>) -> Result<RouteMatrix> {
    let bytes = std::fs::read(path)?;
    Ok(RouteMatrix::decode(bytes.into())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_stats::RelayStatsPing;

    fn relays(ids: &[u64]) -> Vec<Relay> {
        ids.iter()
            .map(|id| Relay::new(*id, format!("r{id}"), format!("10.0.0.{id}:40000").parse().unwrap()))
            .collect()
    }

    fn update(relay_id: u64, pings: &[(u64, f32)]) -> RelayStatsUpdate {
        RelayStatsUpdate {
            relay_id,
            pings: pings
                .iter()
                .map(|&(relay_id, rtt)| RelayStatsPing {
                    relay_id,
                    rtt,
                    jitter: 0.0,
                    packet_loss: 0.0,
                })
                .collect(),
        }
    }

    /// 1 <-> 2 is slow, both are close to 3
    fn triangle() -> Vec<RelayStatsUpdate> {
        vec![
            update(1, &[(2, 100.0), (3, 20.0)]),
            update(2, &[(1, 100.0), (3, 20.0)]),
            update(3, &[(1, 20.0), (2, 20.0)]),
        ]
    }

    #[test]
    fn test_tick_publishes_snapshots() {
        let plane = ControlPlane::new(OptimizerConfig::default());
        assert_eq!(plane.ingest(&triangle()), 6);

        let summary = plane.tick(relays(&[1, 2, 3])).unwrap();
        assert_eq!(summary.relays, 3);
        assert_eq!(summary.reachable_pairs, 3);

        let matrix = plane.route_matrix().load();
        let entry = matrix.entry(1, 0).unwrap();
        assert_eq!(entry.direct_cost, 100);
        assert_eq!(entry.route_cost[0], 40);
        assert_eq!(entry.relays(0), &[2, 3, 1]);
        assert_eq!(summary.route_matrix_bytes, plane.route_matrix().bytes().len());
    }

    #[test]
    fn test_tick_drops_departed_relays() {
        let plane = ControlPlane::new(OptimizerConfig {
            segments: Some(2),
            ..OptimizerConfig::default()
        });
        plane.ingest(&triangle());

        let summary = plane.tick(relays(&[1, 2])).unwrap();
        assert_eq!(summary.relays, 2);
        assert_eq!(plane.stats().relay_ids(), vec![1, 2]);
        assert!(plane.stats().get_entry(1, 3).is_none());
        assert_eq!(plane.cost_matrix().load().cost(0, 1), 100);
    }
}
