//! Buyer-level decision configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::decision::{
    decide_downgrade_rtt, decide_fallback_to_direct, decide_force_direct, decide_force_next, decide_multipath,
    decide_no_route, decide_upgrade_rtt, decide_veto, DecisionFunc,
};
use crate::selector::{
    select_acceptable_routes_from_best_rtt, select_contains_route_hash, select_random_route,
    select_unencumbered_routes, RelayLoad, SelectorFunc,
};

/// Route shader mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteMode {
    #[default]
    Default,
    ForceDirect,
    ForceNext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub mode: RouteMode,
    /// Minimum predicted RTT win (ms) to leave direct
    pub rtt_threshold: f32,
    /// Predicted RTT loss (ms) tolerated before returning to direct
    pub rtt_hysteresis: f32,
    /// Observed RTT loss (ms) that forces direct
    pub rtt_veto: f32,
    pub packet_loss_safety: bool,
    pub yolo: bool,
    pub max_commit_slices: u8,
    pub enable_multipath: bool,
    pub multipath_rtt_threshold: f32,
    pub multipath_jitter_threshold: f32,
    pub multipath_packet_loss_threshold: f32,
    pub acceptable_rtt_epsilon: f32,
    /// Session load ratio at which a relay stops taking new routes
    pub load_threshold: f32,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            mode: RouteMode::Default,
            rtt_threshold: 5.0,
            rtt_hysteresis: 5.0,
            rtt_veto: 20.0,
            packet_loss_safety: true,
            yolo: false,
            max_commit_slices: 3,
            enable_multipath: false,
            multipath_rtt_threshold: 25.0,
            multipath_jitter_threshold: 50.0,
            multipath_packet_loss_threshold: 1.0,
            acceptable_rtt_epsilon: 5.0,
            load_threshold: 0.8,
        }
    }
}

impl DecisionConfig {
    /// Decision pipeline for one slice. Overriding checks run last so nothing
    /// after them can move the session back onto next.
    pub fn decision_funcs(&self, has_route: bool, fallback_requested: bool) -> Vec<DecisionFunc> {
        let mut funcs = Vec::new();

        match self.mode {
            RouteMode::ForceDirect => funcs.push(decide_force_direct()),
            RouteMode::ForceNext => funcs.push(decide_force_next()),
            RouteMode::Default => {
                if self.enable_multipath {
                    funcs.push(decide_multipath(
                        self.multipath_rtt_threshold,
                        self.multipath_jitter_threshold,
                        self.multipath_packet_loss_threshold,
                    ));
                }
                funcs.push(decide_upgrade_rtt(self.rtt_threshold));
                funcs.push(decide_downgrade_rtt(self.rtt_hysteresis, self.yolo));
                funcs.push(decide_veto(self.rtt_veto, self.packet_loss_safety, self.yolo));
            }
        }

        funcs.push(decide_no_route(has_route));
        funcs.push(decide_fallback_to_direct(fallback_requested));
        funcs
    }

    /// Selector chain: load filter, acceptable set, stickiness, random tie-break
    pub fn selectors(&self, prev_hash: Option<u32>, seed: u64, loads: HashMap<u64, RelayLoad>) -> Vec<SelectorFunc> {
        let mut selectors = vec![
            select_unencumbered_routes(self.load_threshold, loads),
            select_acceptable_routes_from_best_rtt(self.acceptable_rtt_epsilon),
        ];
        if let Some(hash) = prev_hash {
            selectors.push(select_contains_route_hash(hash));
        }
        selectors.push(select_random_route(seed));
        selectors
    }
}
