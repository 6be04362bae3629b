//! Concurrent relay-to-relay stats history
//!
//! The outer map is keyed by the reporting relay and guarded by a `RwLock`;
//! each reporter's peer map sits behind its own `Mutex`, so updates from
//! different relays only contend on the brief outer lookup.

use parking_lot::{Mutex, RwLock};
use route_matrix::{CostMatrix, Relay, RouteStats, UNREACHABLE};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::entry::StatsEntryRelay;
use crate::RelayStatsUpdate;

type PeerMap = HashMap<u64, StatsEntryRelay>;

#[derive(Default)]
pub struct StatsDatabase {
    entries: RwLock<HashMap<u64, Arc<Mutex<PeerMap>>>>,
}

impl StatsDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn peers(&self, relay_id: u64) -> Option<Arc<Mutex<PeerMap>>> {
        self.entries.read().get(&relay_id).cloned()
    }

    fn peers_or_insert(&self, relay_id: u64) -> Arc<Mutex<PeerMap>> {
        if let Some(peers) = self.peers(relay_id) {
            return peers;
        }
        self.entries.write().entry(relay_id).or_default().clone()
    }

    /// Record every ping in an update. Returns the number of pings stored.
    pub fn process_stats(&self, update: &RelayStatsUpdate) -> usize {
        let peers = self.peers_or_insert(update.relay_id);
        let mut peers = peers.lock();
        let mut stored = 0;

        for ping in &update.pings {
            if let Err(e) = ping.validate(update.relay_id) {
                warn!(relay_id = update.relay_id, error = %e, "dropping ping");
                continue;
            }
            peers
                .entry(ping.relay_id)
                .or_default()
                .add_sample(ping.rtt, ping.jitter, ping.packet_loss);
            stored += 1;
        }

        debug!(relay_id = update.relay_id, stored, "processed relay stats");
        stored
    }

    /// Directional aggregate as reported by `source`
    pub fn get_entry(&self, source: u64, dest: u64) -> Option<RouteStats> {
        let peers = self.peers(source)?;
        let peers = peers.lock();
        peers.get(&dest).and_then(StatsEntryRelay::stats)
    }

    /// Worst of both directions; `None` unless both relays report each other
    pub fn get_sample(&self, a: u64, b: u64) -> Option<RouteStats> {
        let ab = self.get_entry(a, b)?;
        let ba = self.get_entry(b, a)?;
        Some(combine(ab, ba))
    }

    /// Build the cost matrix for a relay snapshot.
    ///
    /// A pair costs `floor(rtt + jitter)`; it is unreachable without a sample
    /// or when jitter or packet loss exceeds its ceiling.
    pub fn get_cost_matrix(&self, relays: Vec<Relay>, max_jitter: f32, max_packet_loss: f32) -> CostMatrix {
        let snapshot = self.snapshot();
        let mut matrix = CostMatrix::unreachable(relays);
        let ids: Vec<u64> = matrix.relays().iter().map(|r| r.id).collect();

        for i in 1..ids.len() {
            for j in 0..i {
                let sample = match (snapshot.get(&(ids[i], ids[j])), snapshot.get(&(ids[j], ids[i]))) {
                    (Some(ab), Some(ba)) => Some(combine(*ab, *ba)),
                    _ => None,
                };
                matrix.set_cost(i, j, sample_cost(sample, max_jitter, max_packet_loss));
            }
        }

        info!(
            relays = ids.len(),
            reachable = matrix.reachable_pairs(),
            "built cost matrix"
        );
        matrix
    }

    /// Drop every history to or from a relay
    pub fn remove_relay(&self, relay_id: u64) {
        let peers: Vec<_> = {
            let mut entries = self.entries.write();
            entries.remove(&relay_id);
            entries.values().cloned().collect()
        };
        for p in peers {
            p.lock().remove(&relay_id);
        }
        debug!(relay_id, "removed relay stats");
    }

    /// Ids of every relay that has reported stats
    pub fn relay_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.entries.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of reporting relays
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy every directional aggregate, locking one reporter at a time
    fn snapshot(&self) -> HashMap<(u64, u64), RouteStats> {
        let reporters: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(id, peers)| (*id, peers.clone()))
            .collect();

        let mut out = HashMap::new();
        for (source, peers) in reporters {
            for (dest, entry) in peers.lock().iter() {
                if let Some(stats) = entry.stats() {
                    out.insert((source, *dest), stats);
                }
            }
        }
        out
    }
}

fn combine(a: RouteStats, b: RouteStats) -> RouteStats {
    RouteStats::new(a.rtt.max(b.rtt), a.jitter.max(b.jitter), a.packet_loss.max(b.packet_loss))
}

/// Cost of a sample as the optimizer sees it
pub fn sample_cost(sample: Option<RouteStats>, max_jitter: f32, max_packet_loss: f32) -> i32 {
    match sample {
        Some(s) if s.jitter <= max_jitter && s.packet_loss <= max_packet_loss => (s.rtt + s.jitter).floor() as i32,
        _ => UNREACHABLE,
    }
}
