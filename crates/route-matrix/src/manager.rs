//! Bounded, sorted top-K route list for one relay pair
//!
//! Scratch object used by the optimizer. Storage is inline so the hot path
//! never allocates.

use crate::{MAX_RELAYS_PER_ROUTE, MAX_ROUTES_PER_PAIR};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a over the little-endian relay ids, in route order
pub fn route_hash(relays: &[u64]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for relay in relays {
        for byte in relay.to_le_bytes() {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

/// Up to `MAX_ROUTES_PER_PAIR` routes, ascending by cost
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteManager {
    pub num_routes: usize,
    pub route_cost: [i32; MAX_ROUTES_PER_PAIR],
    pub route_hash: [u32; MAX_ROUTES_PER_PAIR],
    pub route_num_relays: [usize; MAX_ROUTES_PER_PAIR],
    pub route_relays: [[u64; MAX_RELAYS_PER_ROUTE]; MAX_ROUTES_PER_PAIR],
}

impl Default for RouteManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteManager {
    pub const fn new() -> Self {
        Self {
            num_routes: 0,
            route_cost: [0; MAX_ROUTES_PER_PAIR],
            route_hash: [0; MAX_ROUTES_PER_PAIR],
            route_num_relays: [0; MAX_ROUTES_PER_PAIR],
            route_relays: [[0; MAX_RELAYS_PER_ROUTE]; MAX_ROUTES_PER_PAIR],
        }
    }

    /// Offer a candidate route. Invalid, looping, duplicate or inferior
    /// candidates are dropped without error.
    pub fn add_route(&mut self, cost: i32, relays: &[u64]) {
        if cost < 0 || relays.len() < 2 || relays.len() > MAX_RELAYS_PER_ROUTE {
            return;
        }

        let mut seen = [0u64; MAX_RELAYS_PER_ROUTE];
        for (n, relay) in relays.iter().enumerate() {
            if seen[..n].contains(relay) {
                return;
            }
            seen[n] = *relay;
        }

        let hash = route_hash(relays);
        if self.route_hash[..self.num_routes].contains(&hash) {
            return;
        }

        if self.num_routes == MAX_ROUTES_PER_PAIR {
            if cost >= self.route_cost[MAX_ROUTES_PER_PAIR - 1] {
                return;
            }
            // evict the current worst
            self.num_routes -= 1;
        }

        let n = self.num_routes;
        let pos = self.route_cost[..n].iter().position(|c| *c > cost).unwrap_or(n);

        let mut k = n;
        while k > pos {
            self.route_cost[k] = self.route_cost[k - 1];
            self.route_hash[k] = self.route_hash[k - 1];
            self.route_num_relays[k] = self.route_num_relays[k - 1];
            self.route_relays[k] = self.route_relays[k - 1];
            k -= 1;
        }

        self.route_cost[pos] = cost;
        self.route_hash[pos] = hash;
        self.route_num_relays[pos] = relays.len();
        self.route_relays[pos] = [0; MAX_RELAYS_PER_ROUTE];
        self.route_relays[pos][..relays.len()].copy_from_slice(relays);
        self.num_routes += 1;
    }

    pub fn relays(&self, route: usize) -> &[u64] {
        &self.route_relays[route][..self.route_num_relays[route]]
    }

    pub fn is_empty(&self) -> bool {
        self.num_routes == 0
    }
}
