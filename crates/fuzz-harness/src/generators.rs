//! Strategies for relay routing property tests
//!
//! Costs are whole milliseconds with `-1` as the unreachable sentinel. Link
//! stats are `(rtt_ms, jitter_ms, packet_loss_pct)` tuples.

use proptest::collection::{hash_set, vec};
use proptest::prelude::*;

/// Unreachable pair sentinel
pub const UNREACHABLE: i32 = -1;

// ============================================================================
// Cost Generators
// ============================================================================

/// Reachable pair cost (1-500ms)
pub fn cost_ms() -> impl Strategy<Value = i32> {
    1i32..=500
}

/// Pair cost, unreachable roughly one time in five
pub fn pair_cost() -> impl Strategy<Value = i32> {
    prop_oneof![
        1 => Just(UNREACHABLE),
        4 => cost_ms(),
    ]
}

/// Relay count plus a triangular cost array of matching length
pub fn cost_grid(max_relays: usize) -> impl Strategy<Value = (usize, Vec<i32>)> {
    (0..=max_relays).prop_flat_map(|n| (Just(n), vec(pair_cost(), n * n.saturating_sub(1) / 2)))
}

/// Fully connected grid (every pair reachable)
pub fn dense_cost_grid(max_relays: usize) -> impl Strategy<Value = (usize, Vec<i32>)> {
    (2..=max_relays.max(2)).prop_flat_map(|n| (Just(n), vec(cost_ms(), n * (n - 1) / 2)))
}

/// Improvement threshold (0-20ms)
pub fn threshold_ms() -> impl Strategy<Value = i32> {
    0i32..=20
}

// ============================================================================
// Link Stat Generators
// ============================================================================

/// RTT in ms (0-500)
pub fn rtt_ms() -> impl Strategy<Value = f32> {
    0.0f32..500.0
}

/// Jitter in ms (0-50)
pub fn jitter_ms() -> impl Strategy<Value = f32> {
    0.0f32..50.0
}

/// Packet loss percentage, including total loss
pub fn packet_loss_pct() -> impl Strategy<Value = f32> {
    prop_oneof![
        8 => 0.0f32..5.0,
        1 => 5.0f32..=100.0,
        1 => Just(100.0f32),
    ]
}

/// `(rtt, jitter, packet_loss)` for one path
pub fn link_stats() -> impl Strategy<Value = (f32, f32, f32)> {
    (rtt_ms(), jitter_ms(), packet_loss_pct())
}

/// A run of ping samples for one relay pair
pub fn ping_samples(max: usize) -> impl Strategy<Value = Vec<(f32, f32, f32)>> {
    vec(link_stats(), 1..=max.max(1))
}

// ============================================================================
// Relay / Route Generators
// ============================================================================

/// Relay id from a small pool so collisions and loops actually happen
pub fn relay_id() -> impl Strategy<Value = u64> {
    1u64..=16
}

/// Raw relay sequence, possibly looping or over-long
pub fn raw_relay_path() -> impl Strategy<Value = Vec<u64>> {
    vec(relay_id(), 0..=7)
}

/// Loop-free relay sequence of 1-5 relays
pub fn relay_path() -> impl Strategy<Value = Vec<u64>> {
    hash_set(relay_id(), 1..=5).prop_map(|set| {
        let mut path: Vec<u64> = set.into_iter().collect();
        path.sort_unstable();
        path
    })
}

/// Candidate routes as `(relays, rtt)`, ascending by RTT
pub fn route_list(max: usize) -> impl Strategy<Value = Vec<(Vec<u64>, f32)>> {
    vec((relay_path(), rtt_ms()), 0..=max).prop_map(|mut routes| {
        routes.sort_by(|a, b| a.1.total_cmp(&b.1));
        routes
    })
}

/// Latitude (-90 to 90 deg)
pub fn latitude_deg() -> impl Strategy<Value = f32> {
    -90.0f32..=90.0
}

/// Longitude (-180 to 180 deg)
pub fn longitude_deg() -> impl Strategy<Value = f32> {
    -180.0f32..=180.0
}
