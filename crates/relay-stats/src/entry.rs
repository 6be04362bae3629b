//! Ring-buffer history for one directional relay pair

use route_matrix::RouteStats;

use crate::{HISTORY_SIZE, INVALID_SAMPLE, TOTAL_LOSS_PERCENT};

/// Last `HISTORY_SIZE` samples plus their worst-case aggregate
#[derive(Debug, Clone)]
pub struct StatsEntryRelay {
    rtt_history: [f32; HISTORY_SIZE],
    jitter_history: [f32; HISTORY_SIZE],
    packet_loss_history: [f32; HISTORY_SIZE],
    index: usize,
    pub rtt: f32,
    pub jitter: f32,
    pub packet_loss: f32,
}

impl Default for StatsEntryRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsEntryRelay {
    pub fn new() -> Self {
        Self {
            rtt_history: [INVALID_SAMPLE; HISTORY_SIZE],
            jitter_history: [INVALID_SAMPLE; HISTORY_SIZE],
            packet_loss_history: [INVALID_SAMPLE; HISTORY_SIZE],
            index: 0,
            rtt: INVALID_SAMPLE,
            jitter: INVALID_SAMPLE,
            packet_loss: INVALID_SAMPLE,
        }
    }

    /// Record one sample at the current slot and refresh the aggregate
    pub fn add_sample(&mut self, rtt: f32, jitter: f32, packet_loss: f32) {
        let i = self.index;
        if packet_loss > TOTAL_LOSS_PERCENT {
            self.rtt_history[i] = INVALID_SAMPLE;
            self.jitter_history[i] = INVALID_SAMPLE;
        } else {
            self.rtt_history[i] = rtt;
            self.jitter_history[i] = jitter;
        }
        self.packet_loss_history[i] = packet_loss;
        self.index = (i + 1) % HISTORY_SIZE;

        self.rtt = worst(&self.rtt_history);
        self.jitter = worst(&self.jitter_history);
        self.packet_loss = worst(&self.packet_loss_history);
    }

    /// True once at least one RTT value in the window is valid
    pub fn has_sample(&self) -> bool {
        self.rtt >= 0.0
    }

    pub fn stats(&self) -> Option<RouteStats> {
        self.has_sample()
            .then(|| RouteStats::new(self.rtt, self.jitter.max(0.0), self.packet_loss.max(0.0)))
    }

    /// Slot the next sample will be written to
    pub fn index(&self) -> usize {
        self.index
    }
}

fn worst(history: &[f32; HISTORY_SIZE]) -> f32 {
    history
        .iter()
        .copied()
        .filter(|v| *v >= 0.0)
        .fold(INVALID_SAMPLE, f32::max)
}
