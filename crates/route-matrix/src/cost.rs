//! Direct relay-to-relay costs for one topology snapshot

use serde::{Deserialize, Serialize};

use crate::relay::Relay;
use crate::tri::{tri_index, tri_len};
use crate::{MatrixError, Result, UNREACHABLE};

/// Triangular array of pairwise direct costs plus relay metadata
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CostMatrix {
    relays: Vec<Relay>,
    costs: Vec<i32>,
}

impl CostMatrix {
    /// Build from relays and a triangular cost array (`-1` = unreachable)
    pub fn new(relays: Vec<Relay>, costs: Vec<i32>) -> Result<Self> {
        let expected = tri_len(relays.len());
        if costs.len() != expected {
            return Err(MatrixError::LengthMismatch {
                relays: relays.len(),
                expected,
                actual: costs.len(),
            });
        }
        Ok(Self { relays, costs })
    }

    /// All pairs unreachable
    pub fn unreachable(relays: Vec<Relay>) -> Self {
        let costs = vec![UNREACHABLE; tri_len(relays.len())];
        Self { relays, costs }
    }

    pub fn relays(&self) -> &[Relay] {
        &self.relays
    }

    pub fn costs(&self) -> &[i32] {
        &self.costs
    }

    pub fn num_relays(&self) -> usize {
        self.relays.len()
    }

    /// Direct cost between relay indices, `-1` if unreachable or `i == j`
    #[inline]
    pub fn cost(&self, i: usize, j: usize) -> i32 {
        if i == j {
            return UNREACHABLE;
        }
        self.costs[tri_index(i, j)]
    }

    #[inline]
    pub fn is_reachable(&self, i: usize, j: usize) -> bool {
        self.cost(i, j) >= 0
    }

    /// Set the symmetric cost of a pair; negative values mark it unreachable
    pub fn set_cost(&mut self, i: usize, j: usize, cost: i32) {
        debug_assert_ne!(i, j);
        self.costs[tri_index(i, j)] = if cost < 0 { UNREACHABLE } else { cost };
    }

    pub fn relay_index(&self, id: u64) -> Option<usize> {
        self.relays.iter().position(|r| r.id == id)
    }

    /// Number of reachable pairs
    pub fn reachable_pairs(&self) -> usize {
        self.costs.iter().filter(|c| **c >= 0).count()
    }
}
