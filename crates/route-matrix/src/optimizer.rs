//! Row-parallel route optimizer
//!
//! Two phases over the triangular pair space, each run in parallel over
//! disjoint row ranges:
//!
//! 1. Indirection discovery: for every pair, the single-intermediate relays
//!    that beat the direct cost by at least the threshold (or any working
//!    intermediate when the pair has no direct cost).
//! 2. Deep expansion: compose each phase-1 intermediate with the best
//!    intermediates of its own legs into 3- and 4-hop candidates, then keep the
//!    best few per pair in a `RouteManager`.
//!
//! Phase 2 reads phase-1 results of other rows, so the phases are separated by
//! a join. Every worker writes only its own rows, so results do not depend on
//! the partitioning.

use rayon::prelude::*;
use std::ops::Range;
use std::time::Instant;
use tracing::{debug, info};

use crate::cost::CostMatrix;
use crate::manager::RouteManager;
use crate::matrix::{group_by_datacenter, RouteMatrix, RouteMatrixEntry};
use crate::tri::{row_start, tri_index, tri_len};

/// Phase-1 candidates retained per pair
pub const MAX_INDIRECTS: usize = 8;

/// Single-intermediate candidate for a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Indirect {
    cost: i32,
    via: usize,
}

/// Segment count used by `optimize`: roughly one per five relays
pub fn default_segments(num_relays: usize) -> usize {
    num_relays.min((num_relays / 5).max(1))
}

impl CostMatrix {
    /// Compute the route matrix for this snapshot
    pub fn optimize(&self, threshold_rtt: i32) -> RouteMatrix {
        self.optimize_with_segments(threshold_rtt, default_segments(self.num_relays()))
    }

    /// Compute the route matrix with an explicit row partitioning
    pub fn optimize_with_segments(&self, threshold_rtt: i32, segments: usize) -> RouteMatrix {
        let start = Instant::now();
        let n = self.num_relays();
        let ranges = row_ranges(n, segments);

        let mut indirects: Vec<Vec<Indirect>> = vec![Vec::new(); tri_len(n)];
        split_rows(&mut indirects, &ranges)
            .into_par_iter()
            .for_each(|(rows, slots)| {
                let base = row_start(rows.start);
                for i in rows {
                    for j in 0..i {
                        slots[row_start(i) + j - base] = self.find_indirects(i, j, threshold_rtt);
                    }
                }
            });

        let phase1_ms = start.elapsed().as_millis();

        let mut entries = vec![RouteMatrixEntry::default(); tri_len(n)];
        split_rows(&mut entries, &ranges)
            .into_par_iter()
            .for_each(|(rows, slots)| {
                let base = row_start(rows.start);
                for i in rows {
                    for j in 0..i {
                        slots[row_start(i) + j - base] = self.build_entry(i, j, &indirects);
                    }
                }
            });

        let relays = self.relays().to_vec();
        let matrix = RouteMatrix {
            datacenter_relays: group_by_datacenter(&relays),
            relays,
            entries,
        };

        debug!(phase1_ms = phase1_ms as u64, segments = ranges.len(), "optimize phases complete");
        info!(
            relays = n,
            segments = ranges.len(),
            routes = matrix.total_routes(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "route matrix optimized"
        );

        matrix
    }

    fn find_indirects(&self, i: usize, j: usize, threshold_rtt: i32) -> Vec<Indirect> {
        let direct = self.cost(i, j);
        let mut found = Vec::new();

        for k in 0..self.num_relays() {
            if k == i || k == j {
                continue;
            }
            let (ik, kj) = (self.cost(i, k), self.cost(k, j));
            if ik < 0 || kj < 0 {
                continue;
            }
            let cost = ik.saturating_add(kj);
            if direct < 0 || cost <= direct.saturating_sub(threshold_rtt) {
                found.push(Indirect { cost, via: k });
            }
        }

        found.sort_by_key(|c| (c.cost, c.via));
        found.truncate(MAX_INDIRECTS);
        found
    }

    fn build_entry(&self, i: usize, j: usize, indirects: &[Vec<Indirect>]) -> RouteMatrixEntry {
        let relays = self.relays();
        let id = |k: usize| relays[k].id;
        let best_via = |a: usize, b: usize| indirects[tri_index(a, b)].first().map(|c| c.via);

        let direct = self.cost(i, j);
        let mut manager = RouteManager::new();
        if direct >= 0 {
            manager.add_route(direct, &[id(i), id(j)]);
        }

        for candidate in &indirects[tri_index(i, j)] {
            let y = candidate.via;
            manager.add_route(candidate.cost, &[id(i), id(y), id(j)]);

            let x = best_via(i, y);
            let z = best_via(y, j);

            if let Some(x) = x {
                let cost = self.path_cost(&[i, x, y, j]);
                manager.add_route(cost, &[id(i), id(x), id(y), id(j)]);
            }
            if let Some(z) = z {
                let cost = self.path_cost(&[i, y, z, j]);
                manager.add_route(cost, &[id(i), id(y), id(z), id(j)]);
            }
            if let (Some(x), Some(z)) = (x, z) {
                let cost = self.path_cost(&[i, x, y, z, j]);
                manager.add_route(cost, &[id(i), id(x), id(y), id(z), id(j)]);
            }
        }

        RouteMatrixEntry::from_manager(direct, &manager)
    }

    /// Sum of segment costs, `-1` if any segment is unreachable
    fn path_cost(&self, path: &[usize]) -> i32 {
        let mut total = 0i32;
        for leg in path.windows(2) {
            let cost = self.cost(leg[0], leg[1]);
            if cost < 0 {
                return -1;
            }
            total = total.saturating_add(cost);
        }
        total
    }
}

/// Split rows `0..n` into at most `segments` contiguous ranges
fn row_ranges(n: usize, segments: usize) -> Vec<Range<usize>> {
    if n == 0 {
        return Vec::new();
    }
    let segments = segments.clamp(1, n);
    let per_segment = n.div_ceil(segments);
    (0..n)
        .step_by(per_segment)
        .map(|start| start..(start + per_segment).min(n))
        .collect()
}

/// Hand out each row range's slots as its own mutable slice
fn split_rows<'a, T>(slots: &'a mut [T], ranges: &[Range<usize>]) -> Vec<(Range<usize>, &'a mut [T])> {
    let mut out = Vec::with_capacity(ranges.len());
    let mut rest = slots;
    let mut offset = 0;
    for rows in ranges {
        let end = row_start(rows.end);
        let (head, tail) = rest.split_at_mut(end - offset);
        out.push((rows.clone(), head));
        rest = tail;
        offset = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::Relay;
    use crate::UNREACHABLE;

    fn relays(n: usize) -> Vec<Relay> {
        (0..n)
            .map(|i| Relay::new(100 + i as u64, format!("r{i}"), format!("10.0.0.{}:40000", i + 1).parse().unwrap()))
            .collect()
    }

    #[test]
    fn test_default_segments() {
        assert_eq!(default_segments(0), 0);
        assert_eq!(default_segments(1), 1);
        assert_eq!(default_segments(4), 1);
        assert_eq!(default_segments(10), 2);
        assert_eq!(default_segments(100), 20);
    }

    #[test]
    fn test_row_ranges_cover_all_rows() {
        for n in 1..40 {
            for segments in 1..12 {
                let ranges = row_ranges(n, segments);
                assert!(ranges.len() <= segments);
                assert_eq!(ranges.first().unwrap().start, 0);
                assert_eq!(ranges.last().unwrap().end, n);
                for pair in ranges.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start);
                }
            }
        }
        assert!(row_ranges(0, 3).is_empty());
    }

    #[test]
    fn test_indirect_beats_direct_by_threshold() {
        // 0 -- 1 direct 100, via 2 costs 20 + 20
        let mut cost = CostMatrix::unreachable(relays(3));
        cost.set_cost(0, 1, 100);
        cost.set_cost(0, 2, 20);
        cost.set_cost(1, 2, 20);

        let matrix = cost.optimize(5);
        let entry = matrix.entry(1, 0).unwrap();
        assert_eq!(entry.direct_cost, 100);
        assert_eq!(entry.num_routes, 2);
        assert_eq!(entry.route_cost[0], 40);
        assert_eq!(entry.relays(0), &[101, 102, 100]);
        assert_eq!(entry.relays(1), &[101, 100]);
    }

    #[test]
    fn test_marginal_gain_suppressed() {
        let mut cost = CostMatrix::unreachable(relays(3));
        cost.set_cost(0, 1, 42);
        cost.set_cost(0, 2, 20);
        cost.set_cost(1, 2, 20);

        let matrix = cost.optimize(5);
        let entry = matrix.entry(1, 0).unwrap();
        assert_eq!(entry.num_routes, 1);
        assert_eq!(entry.relays(0), &[101, 100]);
    }

    #[test]
    fn test_unreachable_pair_uses_any_indirection() {
        let mut cost = CostMatrix::unreachable(relays(3));
        cost.set_cost(0, 2, 70);
        cost.set_cost(1, 2, 90);

        let matrix = cost.optimize(5);
        let entry = matrix.entry(0, 1).unwrap();
        assert_eq!(entry.direct_cost, UNREACHABLE);
        assert_eq!(entry.num_routes, 1);
        assert_eq!(entry.route_cost[0], 160);
    }

    #[test]
    fn test_deep_expansion_builds_four_hops() {
        // chain 4 - 3 - 2 - 1 - 0 is cheap, 4 - 2 - 0 is the phase-1 shortcut
        let n = 5;
        let mut cost = CostMatrix::unreachable(relays(n));
        for i in 0..n {
            for j in 0..i {
                cost.set_cost(i, j, 1000);
            }
        }
        for i in 0..n - 1 {
            cost.set_cost(i, i + 1, 10);
        }
        cost.set_cost(4, 2, 100);
        cost.set_cost(2, 0, 100);

        let matrix = cost.optimize(5);
        let entry = matrix.entry(4, 0).unwrap();
        assert_eq!(entry.direct_cost, 1000);
        assert_eq!(entry.route_cost[0], 40);
        assert_eq!(entry.relays(0), &[104, 103, 102, 101, 100]);
        assert!(entry.route_cost[..entry.num_routes].windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(entry.route_cost[entry.num_routes - 1], 1000);
    }

    #[test]
    fn test_segments_do_not_change_output() {
        let n = 13;
        let mut cost = CostMatrix::unreachable(relays(n));
        for i in 0..n {
            for j in 0..i {
                if (i * 7 + j * 3) % 5 != 0 {
                    cost.set_cost(i, j, ((i * 31 + j * 17) % 90 + 5) as i32);
                }
            }
        }
        let reference = cost.optimize_with_segments(5, 1);
        for segments in 2..=n {
            assert_eq!(cost.optimize_with_segments(5, segments), reference);
        }
    }

    #[test]
    fn test_tiny_matrices() {
        assert_eq!(CostMatrix::unreachable(relays(0)).optimize(5).entries.len(), 0);
        assert_eq!(CostMatrix::unreachable(relays(1)).optimize(5).entries.len(), 0);
        let matrix = CostMatrix::unreachable(relays(2)).optimize(5);
        assert_eq!(matrix.entries.len(), 1);
        assert_eq!(matrix.entries[0].num_routes, 0);
    }

    #[test]
    fn test_path_cost_sums_legs() {
        let mut cost = CostMatrix::unreachable(relays(3));
        cost.set_cost(0, 1, 10);
        cost.set_cost(1, 2, 15);

        assert_eq!(cost.path_cost(&[0, 1, 2]), 25);
        // repeated relays are not filtered here
        assert_eq!(cost.path_cost(&[0, 1, 0]), 20);
        assert_eq!(cost.path_cost(&[0, 2]), UNREACHABLE);
        assert_eq!(cost.path_cost(&[2, 1, 0, 2]), UNREACHABLE);
    }
}
