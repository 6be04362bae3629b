//! Route Decision
//!
//! Per-session route choice, evaluated once per slice:
//!
//! - Selector pipeline narrowing the candidate routes of a session to one
//! - Composable decision functions (upgrade, downgrade, veto, multipath)
//! - `SessionRouteState`: the "try before you buy" commit gate
//! - `DecisionConfig`: buyer-level knobs that build both pipelines

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

pub mod config;
pub mod decision;
pub mod selector;
pub mod session;

pub use config::{DecisionConfig, RouteMode};
pub use decision::{decide, DecisionFunc};
pub use route_matrix::{Route, RouteStats as Stats};
pub use selector::{select_route, RelayLoad, SelectorFunc};
pub use session::SessionRouteState;

/// Bit-set explaining a decision.
///
/// Bit positions are consumed by billing and telemetry exporters and never
/// change meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reason(pub u64);

impl Reason {
    pub const NONE: Reason = Reason(0);
    pub const FORCE_DIRECT: Reason = Reason(1 << 0);
    pub const FORCE_NEXT: Reason = Reason(1 << 1);
    pub const NO_NEXT_ROUTE: Reason = Reason(1 << 2);
    pub const RTT_REDUCTION: Reason = Reason(1 << 3);
    pub const PACKET_LOSS_MULTIPATH: Reason = Reason(1 << 4);
    pub const JITTER_MULTIPATH: Reason = Reason(1 << 5);
    pub const VETO_RTT: Reason = Reason(1 << 6);
    pub const RTT_REDUCTION_MULTIPATH: Reason = Reason(1 << 7);
    pub const VETO_PACKET_LOSS: Reason = Reason(1 << 8);
    pub const FALLBACK_TO_DIRECT: Reason = Reason(1 << 9);
    pub const VETO_YOLO: Reason = Reason(1 << 10);
    pub const VETO_NO_ROUTE: Reason = Reason(1 << 11);
    pub const VETO_COMMIT: Reason = Reason(1 << 12);
    pub const RTT_HYSTERESIS: Reason = Reason(1 << 13);

    /// Any of these bits marks a multipath session
    pub const MULTIPATH: Reason =
        Reason(Self::PACKET_LOSS_MULTIPATH.0 | Self::JITTER_MULTIPATH.0 | Self::RTT_REDUCTION_MULTIPATH.0);

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: Reason) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Reason) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// `VETO_YOLO` when `yolo` is set, otherwise nothing
    pub const fn yolo(yolo: bool) -> Reason {
        if yolo {
            Self::VETO_YOLO
        } else {
            Self::NONE
        }
    }
}

impl BitOr for Reason {
    type Output = Reason;

    fn bitor(self, rhs: Reason) -> Reason {
        Reason(self.0 | rhs.0)
    }
}

impl BitOrAssign for Reason {
    fn bitor_assign(&mut self, rhs: Reason) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Outcome of one slice for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Decision {
    pub on_network_next: bool,
    pub reason: Reason,
}

impl Decision {
    pub const DIRECT: Decision = Decision::new(false, Reason::NONE);

    pub const fn new(on_network_next: bool, reason: Reason) -> Self {
        Self {
            on_network_next,
            reason,
        }
    }

    pub const fn is_multipath(&self) -> bool {
        self.reason.intersects(Reason::MULTIPATH)
    }
}
