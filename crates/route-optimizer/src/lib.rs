//! Relay Route Optimizer
//!
//! Drives the routing core from relay registry and ping dumps:
//!
//! 1. Load the relay registry and relay stats updates (JSON)
//! 2. Feed the updates into a `StatsDatabase`
//! 3. Build the `CostMatrix` and optimize it into a `RouteMatrix`
//! 4. Publish both snapshots and write their binary form
//!
//! # Cost model
//!
//! ```text
//! cost(a, b) = floor(max_rtt(a, b) + max_jitter(a, b))
//! ```
//!
//! A pair is unreachable (`-1`) without samples in both directions or when
//! jitter or packet loss is over its ceiling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod loader;
pub mod pipeline;

pub use pipeline::{run_once, watch, ControlPlane, OutputPaths, TickSummary};

/// Default jitter ceiling in ms
pub const DEFAULT_MAX_JITTER: f32 = 10.0;

/// Default packet loss ceiling in percent
pub const DEFAULT_MAX_PACKET_LOSS: f32 = 1.0;

#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Matrix error: {0}")]
    Matrix(#[from] route_matrix::MatrixError),
    #[error("No valid relays found")]
    NoRelays,
}

pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Optimizer tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Minimum improvement (ms) an indirect route needs over direct
    pub threshold_rtt: i32,
    /// Jitter ceiling (ms) for a usable pair
    pub max_jitter: f32,
    /// Packet loss ceiling (percent) for a usable pair
    pub max_packet_loss: f32,
    /// Row segments for the parallel optimizer; derived from relay count when unset
    pub segments: Option<usize>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            threshold_rtt: route_matrix::DEFAULT_THRESHOLD_RTT,
            max_jitter: DEFAULT_MAX_JITTER,
            max_packet_loss: DEFAULT_MAX_PACKET_LOSS,
            segments: None,
        }
    }
}
