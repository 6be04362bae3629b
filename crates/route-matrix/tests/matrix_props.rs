//! Property tests for the optimizer, route manager and binary formats

use fuzz_harness::prelude::*;
use route_matrix::{route_hash, CostMatrix, MatrixCodec, Relay, RouteManager, RouteMatrix, MAX_RELAYS_PER_ROUTE, MAX_ROUTES_PER_PAIR};
use std::collections::HashSet;

fn relays(n: usize) -> Vec<Relay> {
    (0..n)
        .map(|i| {
            Relay::new(1000 + i as u64, format!("relay-{i}"), format!("10.2.{}.{}:40000", i / 200, i % 200 + 1).parse().unwrap())
                .with_location(i as f32 - 40.0, 2.5 * i as f32 - 100.0)
                .with_datacenter(i as u64 % 3, format!("dc-{}", i % 3))
        })
        .collect()
}

fn cost_matrix(n: usize, costs: Vec<i32>) -> CostMatrix {
    CostMatrix::new(relays(n), costs).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_routes_are_bounded_sorted_and_loop_free((n, costs) in cost_grid(14), threshold in threshold_ms()) {
        let matrix = cost_matrix(n, costs).optimize(threshold);
        for entry in &matrix.entries {
            prop_assert!(entry.num_routes <= MAX_ROUTES_PER_PAIR);
            prop_assert!(entry.route_cost[..entry.num_routes].windows(2).all(|w| w[0] <= w[1]));

            let mut hashes = HashSet::new();
            for k in 0..entry.num_routes {
                let relays = entry.relays(k);
                prop_assert!(relays.len() >= 2 && relays.len() <= MAX_RELAYS_PER_ROUTE);
                let unique: HashSet<_> = relays.iter().collect();
                prop_assert_eq!(unique.len(), relays.len());
                prop_assert_eq!(entry.route_hash[k], route_hash(relays));
                prop_assert!(hashes.insert(entry.route_hash[k]));
            }
        }
    }

    #[test]
    fn prop_route_endpoints_match_pair((n, costs) in cost_grid(10)) {
        let matrix = cost_matrix(n, costs).optimize(5);
        for i in 0..n {
            for j in 0..i {
                let entry = matrix.entry(i, j).unwrap();
                for k in 0..entry.num_routes {
                    let relays = entry.relays(k);
                    prop_assert_eq!(relays[0], matrix.relays[i].id);
                    prop_assert_eq!(*relays.last().unwrap(), matrix.relays[j].id);
                }
            }
        }
    }

    #[test]
    fn prop_partitioning_is_deterministic((n, costs) in cost_grid(16), segments in 2usize..10) {
        let cost = cost_matrix(n, costs);
        prop_assert_eq!(cost.optimize_with_segments(5, segments), cost.optimize_with_segments(5, 1));
    }

    #[test]
    fn prop_direct_route_kept_when_reachable((n, costs) in dense_cost_grid(8)) {
        let cost = cost_matrix(n, costs);
        let matrix = cost.optimize(5);
        for i in 0..n {
            for j in 0..i {
                let entry = matrix.entry(i, j).unwrap();
                prop_assert_eq!(entry.direct_cost, cost.cost(i, j));
                prop_assert!(entry.num_routes >= 1);
                prop_assert!(entry.route_cost[0] <= entry.direct_cost);
            }
        }
    }

    #[test]
    fn prop_manager_never_stores_invalid(paths in proptest::collection::vec((raw_relay_path(), -5i32..300), 0..40)) {
        let mut manager = RouteManager::new();
        for (relays, cost) in &paths {
            manager.add_route(*cost, relays);
        }
        prop_assert!(manager.num_routes <= MAX_ROUTES_PER_PAIR);
        for k in 0..manager.num_routes {
            prop_assert!(manager.route_cost[k] >= 0);
            let relays = manager.relays(k);
            let unique: HashSet<_> = relays.iter().collect();
            prop_assert_eq!(unique.len(), relays.len());
        }
        prop_assert!(manager.route_cost[..manager.num_routes].windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn prop_route_matrix_round_trip((n, costs) in cost_grid(9)) {
        let matrix = cost_matrix(n, costs).optimize(5);
        let decoded = RouteMatrix::decode(matrix.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, matrix);
    }

    #[test]
    fn prop_cost_matrix_round_trip((n, costs) in cost_grid(9)) {
        let cost = cost_matrix(n, costs);
        prop_assert_eq!(CostMatrix::decode(cost.encode().unwrap()).unwrap(), cost);
    }

    #[test]
    fn prop_near_relays_sorted(lat in latitude_deg(), lon in longitude_deg(), max in 1usize..8) {
        let matrix = CostMatrix::unreachable(relays(12)).optimize(5);
        let near = matrix.near_relays(lat, lon, max).unwrap();
        prop_assert_eq!(near.len(), max);
        prop_assert!(near.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
    }
}

#[test]
fn test_small_relay_counts_round_trip() {
    for n in 0..3 {
        let mut cost = CostMatrix::unreachable(relays(n));
        if n == 2 {
            cost.set_cost(1, 0, 17);
        }
        let matrix = cost.optimize(5);
        assert_eq!(RouteMatrix::decode(matrix.encode().unwrap()).unwrap(), matrix);
        assert_eq!(CostMatrix::decode(cost.encode().unwrap()).unwrap(), cost);
    }
}
