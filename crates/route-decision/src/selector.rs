//! Route selector pipeline
//!
//! Each selector takes a candidate list sorted ascending by RTT and returns a
//! (usually smaller) list, also sorted. Selectors never mutate their input.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::Route;

pub type SelectorFunc = Box<dyn Fn(&[Route]) -> Vec<Route> + Send + Sync>;

/// Current session load on a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelayLoad {
    pub sessions: u32,
    /// `0` means no limit
    pub max_sessions: u32,
}

impl RelayLoad {
    pub fn ratio(&self) -> f32 {
        if self.max_sessions == 0 {
            return 0.0;
        }
        self.sessions as f32 / self.max_sessions as f32
    }
}

/// Every route tied at the best RTT
pub fn select_best_rtt() -> SelectorFunc {
    Box::new(|routes: &[Route]| {
        let Some(best) = routes.first().map(|r| r.stats.rtt) else {
            return Vec::new();
        };
        routes.iter().take_while(|r| r.stats.rtt == best).copied().collect()
    })
}

/// Routes within `epsilon` ms of the best
pub fn select_acceptable_routes_from_best_rtt(epsilon: f32) -> SelectorFunc {
    Box::new(move |routes: &[Route]| {
        let Some(best) = routes.first().map(|r| r.stats.rtt) else {
            return Vec::new();
        };
        routes.iter().take_while(|r| r.stats.rtt <= best + epsilon).copied().collect()
    })
}

/// Keep exactly the session's previous route if it is still a candidate
pub fn select_contains_route_hash(prev_hash: u32) -> SelectorFunc {
    Box::new(move |routes: &[Route]| match routes.iter().find(|r| r.hash == prev_hash) {
        Some(route) => vec![*route],
        None => routes.to_vec(),
    })
}

pub fn select_random_route(seed: u64) -> SelectorFunc {
    Box::new(move |routes: &[Route]| {
        if routes.is_empty() {
            return Vec::new();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        vec![routes[rng.gen_range(0..routes.len())]]
    })
}

/// All routes ending at one randomly chosen destination relay
pub fn select_routes_by_random_dest_relay(seed: u64) -> SelectorFunc {
    Box::new(move |routes: &[Route]| {
        let mut dests: Vec<u64> = Vec::new();
        for dest in routes.iter().filter_map(Route::dest_relay) {
            if !dests.contains(&dest) {
                dests.push(dest);
            }
        }
        if dests.is_empty() {
            return Vec::new();
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let chosen = dests[rng.gen_range(0..dests.len())];
        routes.iter().filter(|r| r.dest_relay() == Some(chosen)).copied().collect()
    })
}

/// Drop routes through any relay at or above `threshold` load. Relays with no
/// reported load count as idle.
pub fn select_unencumbered_routes(threshold: f32, loads: HashMap<u64, RelayLoad>) -> SelectorFunc {
    Box::new(move |routes: &[Route]| {
        routes
            .iter()
            .filter(|r| {
                r.relays()
                    .iter()
                    .all(|id| loads.get(id).map_or(true, |load| load.max_sessions == 0 || load.ratio() < threshold))
            })
            .copied()
            .collect()
    })
}

/// Run `selectors` in order and take the first survivor
pub fn select_route(routes: &[Route], selectors: &[SelectorFunc]) -> Option<Route> {
    let mut current = routes.to_vec();
    for (stage, selector) in selectors.iter().enumerate() {
        current = selector(&current);
        if current.is_empty() {
            debug!(stage, candidates = routes.len(), "no route survived selection");
            return None;
        }
    }
    current.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Stats;

    fn route(relays: &[u64], rtt: f32) -> Route {
        Route::new(relays, Stats::new(rtt, 0.0, 0.0))
    }

    fn routes() -> Vec<Route> {
        vec![
            route(&[1, 2], 20.0),
            route(&[3, 2], 20.0),
            route(&[1, 4, 5], 23.0),
            route(&[3, 5], 30.0),
        ]
    }

    fn rtts(routes: &[Route]) -> Vec<f32> {
        routes.iter().map(|r| r.stats.rtt).collect()
    }

    #[test]
    fn test_best_rtt_keeps_ties() {
        let out = select_best_rtt()(&routes());
        assert_eq!(rtts(&out), vec![20.0, 20.0]);
        assert!(select_best_rtt()(&[]).is_empty());
    }

    #[test]
    fn test_acceptable_routes() {
        assert_eq!(rtts(&select_acceptable_routes_from_best_rtt(3.0)(&routes())), vec![20.0, 20.0, 23.0]);
        assert_eq!(select_acceptable_routes_from_best_rtt(100.0)(&routes()).len(), 4);
    }

    #[test]
    fn test_contains_route_hash() {
        let input = routes();
        let prev = input[2].hash;
        assert_eq!(select_contains_route_hash(prev)(&input), vec![input[2]]);
        assert_eq!(select_contains_route_hash(0xdead_beef)(&input), input);
    }

    #[test]
    fn test_random_is_seeded() {
        let input = routes();
        let a = select_random_route(42)(&input);
        let b = select_random_route(42)(&input);
        assert_eq!(a.len(), 1);
        assert_eq!(a, b);
        assert!(input.contains(&a[0]));
    }

    #[test]
    fn test_random_dest_relay() {
        let input = routes();
        let out = select_routes_by_random_dest_relay(7)(&input);
        assert!(!out.is_empty());
        let dest = out[0].dest_relay();
        assert!(out.iter().all(|r| r.dest_relay() == dest));
        let expected = input.iter().filter(|r| r.dest_relay() == dest).count();
        assert_eq!(out.len(), expected);
        assert_eq!(out, select_routes_by_random_dest_relay(7)(&input));
    }

    #[test]
    fn test_unencumbered() {
        let loads = HashMap::from([
            (1, RelayLoad { sessions: 90, max_sessions: 100 }),
            (4, RelayLoad { sessions: 10, max_sessions: 100 }),
            (5, RelayLoad { sessions: 5000, max_sessions: 0 }),
        ]);
        let out = select_unencumbered_routes(0.8, loads)(&routes());
        assert_eq!(out, vec![routes()[1], routes()[3]]);
    }

    #[test]
    fn test_select_route() {
        let selectors = vec![select_best_rtt(), select_contains_route_hash(routes()[1].hash)];
        assert_eq!(select_route(&routes(), &selectors), Some(routes()[1]));

        let selectors = vec![select_unencumbered_routes(0.5, HashMap::from([(2, RelayLoad { sessions: 1, max_sessions: 1 })])), select_best_rtt()];
        assert_eq!(select_route(&routes(), &selectors), Some(routes()[2]));

        assert_eq!(select_route(&[], &[select_best_rtt()]), None);
        assert_eq!(select_route(&routes(), &[]), Some(routes()[0]));
    }
}
