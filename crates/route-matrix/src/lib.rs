//! Route Matrix
//!
//! Turns pairwise relay latency measurements into a bounded set of candidate
//! multi-hop routes between every pair of relays:
//!
//! - Triangular storage for symmetric pairwise values
//! - `CostMatrix`: direct relay-to-relay costs for one topology snapshot
//! - `RouteManager`: fixed-capacity, sorted top-K routes for one pair
//! - Row-parallel optimizer producing a `RouteMatrix`
//! - Versioned little-endian binary codecs and an atomically swapped snapshot store

use thiserror::Error;

pub mod codec;
pub mod cost;
pub mod manager;
pub mod matrix;
pub mod optimizer;
pub mod relay;
pub mod store;
pub mod tri;

pub use codec::MatrixCodec;
pub use cost::CostMatrix;
pub use manager::{route_hash, RouteManager};
pub use matrix::{NearRelay, NearRelayStats, Route, RouteMatrix, RouteMatrixEntry, RouteStats};
pub use relay::{haversine_km, Relay};
pub use store::{MatrixStore, Snapshot};
pub use tri::{tri_index, tri_len};

/// Maximum number of routes kept per relay pair
pub const MAX_ROUTES_PER_PAIR: usize = 8;

/// Maximum number of relays in a single route (endpoints included)
pub const MAX_RELAYS_PER_ROUTE: usize = 5;

/// Largest relay count whose pair count still fits the `u32` length prefixes
pub const MAX_RELAYS: usize = 92_682;

/// Cost sentinel for an unreachable relay pair
pub const UNREACHABLE: i32 = -1;

/// Default minimum improvement (ms) an indirect route needs over a direct one
pub const DEFAULT_THRESHOLD_RTT: i32 = 5;

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("Cost array length {actual} does not match {relays} relays (expected {expected})")]
    LengthMismatch {
        relays: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Unsupported {kind} version {version}")]
    UnsupportedVersion { kind: &'static str, version: u32 },
    #[error("Truncated {kind}: needed {needed} more bytes at offset {offset}")]
    Truncated {
        kind: &'static str,
        needed: usize,
        offset: usize,
    },
    #[error("Invalid relay address: {0}")]
    InvalidAddress(String),
    #[error("Invalid UTF-8 string in {0}")]
    InvalidString(&'static str),
    #[error("Invalid route entry: {0}")]
    InvalidEntry(String),
    #[error("{relays} relays exceeds the limit of {max}")]
    TooManyRelays { relays: usize, max: usize },
    #[error("No near relays")]
    NoNearRelays,
}

pub type Result<T> = std::result::Result<T, MatrixError>;
