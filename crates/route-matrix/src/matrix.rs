//! Optimized route matrix and its query layer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tracing::debug;

use crate::manager::{route_hash, RouteManager};
use crate::relay::{haversine_km, Relay};
use crate::tri::{tri_index, tri_len};
use crate::{MatrixError, Result, MAX_RELAYS_PER_ROUTE, MAX_ROUTES_PER_PAIR, UNREACHABLE};

/// Per-pair result of one optimization pass.
///
/// For the canonical pair `(i, j)` with `i > j`, stored routes run from
/// relay `i` to relay `j`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteMatrixEntry {
    pub direct_cost: i32,
    pub num_routes: usize,
    pub route_cost: [i32; MAX_ROUTES_PER_PAIR],
    pub route_hash: [u32; MAX_ROUTES_PER_PAIR],
    pub route_num_relays: [usize; MAX_ROUTES_PER_PAIR],
    pub route_relays: [[u64; MAX_RELAYS_PER_ROUTE]; MAX_ROUTES_PER_PAIR],
}

impl Default for RouteMatrixEntry {
    fn default() -> Self {
        Self::from_manager(UNREACHABLE, &RouteManager::new())
    }
}

impl RouteMatrixEntry {
    pub fn from_manager(direct_cost: i32, manager: &RouteManager) -> Self {
        Self {
            direct_cost,
            num_routes: manager.num_routes,
            route_cost: manager.route_cost,
            route_hash: manager.route_hash,
            route_num_relays: manager.route_num_relays,
            route_relays: manager.route_relays,
        }
    }

    pub fn relays(&self, route: usize) -> &[u64] {
        &self.route_relays[route][..self.route_num_relays[route]]
    }
}

/// Measured quality of a path
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteStats {
    pub rtt: f32,
    pub jitter: f32,
    pub packet_loss: f32,
}

impl RouteStats {
    pub fn new(rtt: f32, jitter: f32, packet_loss: f32) -> Self {
        Self {
            rtt,
            jitter,
            packet_loss,
        }
    }
}

/// Candidate accelerated route for one session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Route {
    pub num_relays: usize,
    pub relays: [u64; MAX_RELAYS_PER_ROUTE],
    pub stats: RouteStats,
    pub hash: u32,
}

impl Route {
    /// `relays` must hold between 1 and `MAX_RELAYS_PER_ROUTE` ids
    pub fn new(relays: &[u64], stats: RouteStats) -> Self {
        let num_relays = relays.len().min(MAX_RELAYS_PER_ROUTE);
        let mut buf = [0u64; MAX_RELAYS_PER_ROUTE];
        buf[..num_relays].copy_from_slice(&relays[..num_relays]);
        Self {
            num_relays,
            relays: buf,
            stats,
            hash: route_hash(&buf[..num_relays]),
        }
    }

    pub fn relays(&self) -> &[u64] {
        &self.relays[..self.num_relays]
    }

    /// Relay closest to the server
    pub fn dest_relay(&self) -> Option<u64> {
        self.relays().last().copied()
    }
}

/// Client-side measurement to a nearby relay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NearRelayStats {
    pub relay_id: u64,
    pub rtt: f32,
    pub jitter: f32,
    pub packet_loss: f32,
}

/// Result of a nearest-relay query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearRelay {
    pub id: u64,
    pub address: SocketAddr,
    pub distance_km: f64,
}

/// Queryable result of one optimization pass
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteMatrix {
    pub relays: Vec<Relay>,
    pub datacenter_relays: BTreeMap<u64, Vec<u64>>,
    pub entries: Vec<RouteMatrixEntry>,
}

impl RouteMatrix {
    pub fn new(relays: Vec<Relay>, entries: Vec<RouteMatrixEntry>) -> Result<Self> {
        let expected = tri_len(relays.len());
        if entries.len() != expected {
            return Err(MatrixError::LengthMismatch {
                relays: relays.len(),
                expected,
                actual: entries.len(),
            });
        }
        let datacenter_relays = group_by_datacenter(&relays);
        Ok(Self {
            relays,
            datacenter_relays,
            entries,
        })
    }

    pub fn num_relays(&self) -> usize {
        self.relays.len()
    }

    pub fn relay_index(&self, id: u64) -> Option<usize> {
        self.relays.iter().position(|r| r.id == id)
    }

    /// Entry for the unordered pair `(i, j)`. `None` on the diagonal or out of range.
    pub fn entry(&self, i: usize, j: usize) -> Option<&RouteMatrixEntry> {
        let n = self.num_relays();
        if i == j || i >= n || j >= n {
            return None;
        }
        self.entries.get(tri_index(i, j))
    }

    pub fn total_routes(&self) -> usize {
        self.entries.iter().map(|e| e.num_routes).sum()
    }

    /// Relays nearest to a client position, closest first.
    ///
    /// Coordinates are truncated to whole degrees so near-equal relays keep a
    /// stable order from one slice to the next.
    pub fn near_relays(&self, latitude: f32, longitude: f32, max: usize) -> Result<Vec<NearRelay>> {
        if self.relays.is_empty() {
            return Err(MatrixError::NoNearRelays);
        }

        let lat = (latitude as f64).trunc();
        let lon = (longitude as f64).trunc();

        let mut near: Vec<NearRelay> = self
            .relays
            .iter()
            .map(|r| NearRelay {
                id: r.id,
                address: r.address,
                distance_km: haversine_km(lat, lon, (r.latitude as f64).trunc(), (r.longitude as f64).trunc()),
            })
            .collect();

        near.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        near.truncate(max);
        Ok(near)
    }

    /// Relay ids hosted in a datacenter
    pub fn datacenter_relay_ids(&self, datacenter_id: u64) -> Vec<u64> {
        self.relays
            .iter()
            .filter(|r| r.datacenter_id == datacenter_id)
            .map(|r| r.id)
            .collect()
    }

    /// Every stored route from any near relay to any destination relay,
    /// sorted ascending by RTT.
    pub fn routes_between(&self, near: &[NearRelayStats], dest_relays: &[u64]) -> Vec<Route> {
        let mut routes = Vec::new();

        for source in near {
            let Some(a) = self.relay_index(source.relay_id) else {
                debug!(relay_id = source.relay_id, "near relay not in matrix");
                continue;
            };

            for dest in dest_relays {
                let Some(b) = self.relay_index(*dest) else {
                    debug!(relay_id = *dest, "destination relay not in matrix");
                    continue;
                };

                if a == b {
                    routes.push(Route::new(
                        &[source.relay_id],
                        RouteStats::new(source.rtt, source.jitter, source.packet_loss),
                    ));
                    continue;
                }

                let Some(entry) = self.entry(a, b) else {
                    continue;
                };
                for k in 0..entry.num_routes {
                    let stats = RouteStats::new(
                        source.rtt + entry.route_cost[k] as f32,
                        source.jitter,
                        source.packet_loss,
                    );
                    let stored = entry.relays(k);
                    if a > b {
                        routes.push(Route::new(stored, stats));
                    } else {
                        let mut reversed = [0u64; MAX_RELAYS_PER_ROUTE];
                        for (slot, relay) in reversed.iter_mut().zip(stored.iter().rev()) {
                            *slot = *relay;
                        }
                        routes.push(Route::new(&reversed[..stored.len()], stats));
                    }
                }
            }
        }

        routes.sort_by(|x, y| x.stats.rtt.total_cmp(&y.stats.rtt));
        routes
    }
}

pub(crate) fn group_by_datacenter(relays: &[Relay]) -> BTreeMap<u64, Vec<u64>> {
    let mut table: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for relay in relays {
        table.entry(relay.datacenter_id).or_default().push(relay.id);
    }
    table
}
