//! Session-owned decision state and the commit gate
//!
//! A session newly moved onto an accelerated route is on trial: it must
//! survive `max_slices` consecutive slices without its last observed route
//! doing worse than direct before the route is committed (and billable).
//! A bad slice during the trial sends the session back to direct.
//!
//! Multipath is sticky: once entered it is restored on every later slice that
//! has a route, even after a slice that had to drop to direct.

use tracing::debug;

use crate::decision::{decide, DecisionFunc};
use crate::{Decision, Reason, Stats};

/// Per-session route state, mutated once per slice by the session's own loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionRouteState {
    pub decision: Decision,
    pub commit_pending: bool,
    pub observed_slice_counter: u8,
    pub committed: bool,
    /// Multipath reason held for the rest of the session, empty until entered
    pub multipath: Reason,
}

impl SessionRouteState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the commit gate to this slice's pipeline output
    pub fn decide_committed(
        &mut self,
        decision: Decision,
        max_slices: u8,
        yolo: bool,
        last_next: &Stats,
        direct: &Stats,
    ) -> Decision {
        let out = self.gate(decision, max_slices, yolo, last_next, direct);
        self.decision = out;
        out
    }

    fn gate(&mut self, decision: Decision, max_slices: u8, yolo: bool, last_next: &Stats, direct: &Stats) -> Decision {
        if !decision.on_network_next {
            self.reset();
            return decision;
        }

        if decision.is_multipath() {
            if self.multipath.is_empty() {
                self.multipath = decision.reason;
            }
            self.commit_pending = false;
            self.observed_slice_counter = 0;
            self.committed = true;
            return decision;
        }

        if self.committed {
            return decision;
        }

        if !self.commit_pending {
            self.commit_pending = true;
            self.observed_slice_counter = 0;
            if max_slices == 0 {
                self.commit();
            }
            return decision;
        }

        if last_next.rtt > direct.rtt || last_next.packet_loss > direct.packet_loss {
            debug!(
                slices = self.observed_slice_counter,
                last_rtt = last_next.rtt,
                direct_rtt = direct.rtt,
                "route vetoed during commit trial"
            );
            self.reset();
            return Decision::new(false, Reason::VETO_COMMIT | Reason::yolo(yolo));
        }

        self.observed_slice_counter = self.observed_slice_counter.saturating_add(1);
        if self.observed_slice_counter >= max_slices {
            self.commit();
        }
        decision
    }

    pub fn is_multipath(&self) -> bool {
        !self.multipath.is_empty()
    }

    fn commit(&mut self) {
        self.commit_pending = false;
        self.observed_slice_counter = 0;
        self.committed = true;
    }

    fn reset(&mut self) {
        self.commit_pending = false;
        self.observed_slice_counter = 0;
        self.committed = false;
    }

    /// Run the decision pipeline against the previous decision, then the
    /// commit gate. A multipath session starts from its multipath decision
    /// so the no-route and fallback checks can still override it.
    pub fn decide_slice(
        &mut self,
        predicted_next: &Stats,
        last_next: &Stats,
        direct: &Stats,
        funcs: &[DecisionFunc],
        max_slices: u8,
        yolo: bool,
    ) -> Decision {
        let prev = if self.is_multipath() {
            Decision::new(true, self.multipath)
        } else {
            self.decision
        };
        let decision = decide(prev, predicted_next, last_next, direct, funcs);
        self.decide_committed(decision, max_slices, yolo, last_next, direct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{decide_upgrade_rtt, decide_veto};
    use crate::DecisionConfig;

    const NEXT: Decision = Decision::new(true, Reason::RTT_REDUCTION);

    fn stats(rtt: f32, packet_loss: f32) -> Stats {
        Stats::new(rtt, 0.0, packet_loss)
    }

    #[test]
    fn test_commits_after_max_slices() {
        let mut state = SessionRouteState::new();
        let (good, direct) = (stats(30.0, 0.0), stats(50.0, 0.0));

        // first slice on next opens the trial
        assert_eq!(state.decide_committed(NEXT, 3, false, &good, &direct), NEXT);
        assert!(state.commit_pending);
        assert_eq!(state.observed_slice_counter, 0);

        for expected in 1..3u8 {
            state.decide_committed(NEXT, 3, false, &good, &direct);
            assert!(state.commit_pending);
            assert!(!state.committed);
            assert_eq!(state.observed_slice_counter, expected);
        }

        assert_eq!(state.decide_committed(NEXT, 3, false, &good, &direct), NEXT);
        assert!(state.committed);
        assert!(!state.commit_pending);
        assert_eq!(state.observed_slice_counter, 0);
    }

    #[test]
    fn test_veto_during_trial() {
        let mut state = SessionRouteState::new();
        let direct = stats(50.0, 0.0);
        state.decide_committed(NEXT, 3, false, &stats(30.0, 0.0), &direct);
        state.decide_committed(NEXT, 3, false, &stats(30.0, 0.0), &direct);

        let d = state.decide_committed(NEXT, 3, true, &stats(30.0, 5.0), &direct);
        assert_eq!(d, Decision::new(false, Reason::VETO_COMMIT | Reason::VETO_YOLO));
        assert_eq!(state, SessionRouteState { decision: d, ..SessionRouteState::default() });
    }

    #[test]
    fn test_committed_route_not_gated() {
        let mut state = SessionRouteState::new();
        let direct = stats(50.0, 0.0);
        state.decide_committed(NEXT, 0, false, &stats(30.0, 0.0), &direct);
        assert!(state.committed);

        // no trial veto once committed
        assert_eq!(state.decide_committed(NEXT, 0, false, &stats(90.0, 0.0), &direct), NEXT);
        assert!(state.committed);
    }

    #[test]
    fn test_direct_resets_state() {
        let mut state = SessionRouteState {
            decision: NEXT,
            commit_pending: false,
            observed_slice_counter: 0,
            committed: true,
            multipath: Reason::NONE,
        };
        let d = Decision::new(false, Reason::VETO_RTT);
        assert_eq!(state.decide_committed(d, 3, false, &stats(0.0, 0.0), &stats(0.0, 0.0)), d);
        assert!(!state.committed);
        assert_eq!(state.decision, d);
    }

    #[test]
    fn test_multipath_commits_immediately() {
        let mut state = SessionRouteState::new();
        let d = Decision::new(true, Reason::JITTER_MULTIPATH);
        // worse than direct, but multipath is never trialed
        assert_eq!(state.decide_committed(d, 3, false, &stats(80.0, 3.0), &stats(50.0, 0.0)), d);
        assert!(state.committed);
        assert!(!state.commit_pending);
    }

    #[test]
    fn test_decide_slice() {
        let funcs = vec![decide_upgrade_rtt(5.0), decide_veto(20.0, true, false)];
        let mut state = SessionRouteState::new();
        let direct = stats(50.0, 0.0);

        // upgrade opens the trial
        let d = state.decide_slice(&stats(30.0, 0.0), &stats(30.0, 0.0), &direct, &funcs, 2, false);
        assert_eq!(d, NEXT);
        assert!(state.commit_pending);

        state.decide_slice(&stats(30.0, 0.0), &stats(31.0, 0.0), &direct, &funcs, 2, false);
        let d = state.decide_slice(&stats(30.0, 0.0), &stats(32.0, 0.0), &direct, &funcs, 2, false);
        assert_eq!(d, NEXT);
        assert!(state.committed);
        assert_eq!(state.decision, NEXT);
    }

    #[test]
    fn test_multipath_survives_no_route_slice() {
        let config = DecisionConfig {
            enable_multipath: true,
            ..DecisionConfig::default()
        };
        let mut state = SessionRouteState::new();
        let predicted = Stats::new(40.0, 0.0, 0.0);
        let direct = Stats::new(50.0, 80.0, 0.0);
        let multipath = Decision::new(true, Reason::JITTER_MULTIPATH);

        let d = state.decide_slice(&predicted, &predicted, &direct, &config.decision_funcs(true, false), 3, false);
        assert_eq!(d, multipath);
        assert!(state.is_multipath());

        // route table momentarily empty
        let d = state.decide_slice(&predicted, &predicted, &direct, &config.decision_funcs(false, false), 3, false);
        assert_eq!(d, Decision::new(false, Reason::VETO_NO_ROUTE));
        assert!(!state.committed);
        assert!(state.is_multipath());

        // direct is clean again, multipath still holds
        let clean = Stats::new(50.0, 0.0, 0.0);
        let d = state.decide_slice(&predicted, &predicted, &clean, &config.decision_funcs(true, false), 3, false);
        assert_eq!(d, multipath);
        assert!(state.committed);
    }

    #[test]
    fn test_fallback_overrides_sticky_multipath() {
        let config = DecisionConfig {
            enable_multipath: true,
            ..DecisionConfig::default()
        };
        let mut state = SessionRouteState::new();
        let predicted = Stats::new(40.0, 0.0, 0.0);
        let direct = Stats::new(50.0, 0.0, 5.0);

        let d = state.decide_slice(&predicted, &predicted, &direct, &config.decision_funcs(true, false), 3, false);
        assert_eq!(d, Decision::new(true, Reason::PACKET_LOSS_MULTIPATH));

        let d = state.decide_slice(&predicted, &predicted, &direct, &config.decision_funcs(true, true), 3, false);
        assert_eq!(d, Decision::new(false, Reason::FALLBACK_TO_DIRECT));

        let d = state.decide_slice(&predicted, &predicted, &direct, &config.decision_funcs(true, false), 3, false);
        assert_eq!(d, Decision::new(true, Reason::PACKET_LOSS_MULTIPATH));
    }
}
