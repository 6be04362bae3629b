//! Relay Stats
//!
//! Keeps a rolling history of relay-to-relay ping measurements and turns it
//! into the `CostMatrix` the optimizer consumes:
//!
//! - `StatsEntryRelay`: fixed ring buffers of RTT, jitter and packet loss
//! - `StatsDatabase`: concurrent per-relay histories, fed by relay updates
//! - Worst-case (max) aggregation, both directions required for a usable pair

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod database;
pub mod entry;

pub use database::{sample_cost, StatsDatabase};
pub use entry::StatsEntryRelay;

/// Samples retained per directional relay pair
pub const HISTORY_SIZE: usize = 300;

/// Ring-buffer value that never wins an aggregate
pub const INVALID_SAMPLE: f32 = -1.0;

/// Packet loss (percent) above which RTT and jitter are not recorded
pub const TOTAL_LOSS_PERCENT: f32 = 99.0;

/// One measurement from the reporting relay to a peer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelayStatsPing {
    pub relay_id: u64,
    pub rtt: f32,
    pub jitter: f32,
    pub packet_loss: f32,
}

impl RelayStatsPing {
    /// Reject measurements that cannot be stored for `source`
    pub fn validate(&self, source: u64) -> Result<()> {
        if self.relay_id == source {
            return Err(StatsError::SelfPing(source));
        }
        if !(self.rtt.is_finite() && self.jitter.is_finite() && self.packet_loss.is_finite()) {
            return Err(StatsError::NonFinite {
                reporter: source,
                peer: self.relay_id,
            });
        }
        if self.rtt < 0.0 || self.jitter < 0.0 || !(0.0..=100.0).contains(&self.packet_loss) {
            return Err(StatsError::OutOfRange {
                reporter: source,
                peer: self.relay_id,
            });
        }
        Ok(())
    }
}

/// Batch of pings reported by one relay
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RelayStatsUpdate {
    pub relay_id: u64,
    pub pings: Vec<RelayStatsPing>,
}

#[derive(Error, Debug, PartialEq)]
pub enum StatsError {
    #[error("Relay {0} reported a ping to itself")]
    SelfPing(u64),
    #[error("Non-finite measurement from relay {reporter} to {peer}")]
    NonFinite { reporter: u64, peer: u64 },
    #[error("Out-of-range measurement from relay {reporter} to {peer}")]
    OutOfRange { reporter: u64, peer: u64 },
}

pub type Result<T> = std::result::Result<T, StatsError>;
