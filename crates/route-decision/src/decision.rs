//! Composable decision functions
//!
//! Every function receives the decision so far plus predicted next-route
//! stats, the last observed next-route stats and the direct-path stats, and
//! returns either a new decision or the input unchanged. Returning the input
//! is "no change": the previous reason is carried forward untouched.

use crate::{Decision, Reason, Stats};

/// `(prev, predicted_next, last_next, direct) -> Decision`
pub type DecisionFunc = Box<dyn Fn(Decision, &Stats, &Stats, &Stats) -> Decision + Send + Sync>;

/// Run `funcs` in order, each seeing the previous one's output
pub fn decide(prev: Decision, predicted_next: &Stats, last_next: &Stats, direct: &Stats, funcs: &[DecisionFunc]) -> Decision {
    funcs
        .iter()
        .fold(prev, |decision, f| f(decision, predicted_next, last_next, direct))
}

/// Direct -> next once the predicted route beats direct by `threshold` ms
pub fn decide_upgrade_rtt(threshold: f32) -> DecisionFunc {
    Box::new(move |prev: Decision, predicted: &Stats, _last: &Stats, direct: &Stats| {
        if !prev.on_network_next && direct.rtt - predicted.rtt >= threshold {
            return Decision::new(true, Reason::RTT_REDUCTION);
        }
        prev
    })
}

/// Next -> direct once the predicted route is worse than direct by more
/// than `hysteresis` ms
pub fn decide_downgrade_rtt(hysteresis: f32, yolo: bool) -> DecisionFunc {
    Box::new(move |prev: Decision, predicted: &Stats, _last: &Stats, direct: &Stats| {
        if prev.on_network_next && !prev.is_multipath() && predicted.rtt - direct.rtt > hysteresis {
            return Decision::new(false, Reason::RTT_HYSTERESIS | Reason::yolo(yolo));
        }
        prev
    })
}

/// Safety backstop on the last observed next-route stats
pub fn decide_veto(rtt_veto: f32, packet_loss_safety: bool, yolo: bool) -> DecisionFunc {
    Box::new(move |prev: Decision, _predicted: &Stats, last: &Stats, direct: &Stats| {
        if !prev.on_network_next || prev.is_multipath() {
            return prev;
        }
        if last.rtt - direct.rtt > rtt_veto {
            return Decision::new(false, Reason::VETO_RTT | Reason::yolo(yolo));
        }
        if packet_loss_safety && last.packet_loss > direct.packet_loss {
            return Decision::new(false, Reason::VETO_PACKET_LOSS | Reason::yolo(yolo));
        }
        prev
    })
}

/// Enter multipath on a large RTT win or a poor direct path. Once set it
/// holds for the rest of the session.
pub fn decide_multipath(rtt_threshold: f32, jitter_threshold: f32, packet_loss_threshold: f32) -> DecisionFunc {
    Box::new(move |prev: Decision, predicted: &Stats, _last: &Stats, direct: &Stats| {
        if prev.is_multipath() {
            return prev;
        }

        let mut reason = Reason::NONE;
        if direct.rtt - predicted.rtt >= rtt_threshold {
            reason |= Reason::RTT_REDUCTION_MULTIPATH;
        }
        if direct.jitter > jitter_threshold {
            reason |= Reason::JITTER_MULTIPATH;
        }
        if direct.packet_loss > packet_loss_threshold {
            reason |= Reason::PACKET_LOSS_MULTIPATH;
        }

        if reason.is_empty() {
            prev
        } else {
            Decision::new(true, reason)
        }
    })
}

pub fn decide_force_direct() -> DecisionFunc {
    Box::new(|_prev: Decision, _predicted: &Stats, _last: &Stats, _direct: &Stats| Decision::new(false, Reason::FORCE_DIRECT))
}

pub fn decide_force_next() -> DecisionFunc {
    Box::new(|_prev: Decision, _predicted: &Stats, _last: &Stats, _direct: &Stats| Decision::new(true, Reason::FORCE_NEXT))
}

/// Leave next when the session has no usable route; flag direct sessions
pub fn decide_no_route(has_route: bool) -> DecisionFunc {
    Box::new(move |prev: Decision, _predicted: &Stats, _last: &Stats, _direct: &Stats| {
        if has_route {
            prev
        } else if prev.on_network_next {
            Decision::new(false, Reason::VETO_NO_ROUTE)
        } else {
            Decision::new(false, prev.reason | Reason::NO_NEXT_ROUTE)
        }
    })
}

/// Session asked to fall back to direct (client or server side failure)
pub fn decide_fallback_to_direct(requested: bool) -> DecisionFunc {
    Box::new(move |prev: Decision, _predicted: &Stats, _last: &Stats, _direct: &Stats| {
        if requested {
            Decision::new(false, Reason::FALLBACK_TO_DIRECT)
        } else {
            prev
        }
    })
}
