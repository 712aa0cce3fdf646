//! Per-foot contact constraint state machine for bipedal walking control.
//!
//! Each foot runs a [`FootControlModule`] that decides, once per control
//! tick, which constraint the whole-body controller should apply to it
//! (flat support, hold, toe pivot, swing, waypoint motion, foothold
//! exploration or edge touchdown) and produces the matching spatial
//! commands.
//!
//! # Architecture
//!
//! ```text
//! FootTickInput ──► FootControlModule ──► state ──► feedback / acceleration / CoP
//!                        │
//!                        ├── PartialFootholdDetector
//!                        └── SingularityAndCollapseAvoidance ──► CoM height
//! ```
//!
//! [`FeetManager`] ticks both feet and owns the [`ToeOffArbiter`] that
//! decides when the trailing foot pivots onto its toes.

pub mod avoidance;
pub mod contact;
pub mod feet;
pub mod filters;
pub mod foothold;
pub mod geometry;
pub mod machine;
pub mod states;
pub mod toe_off;
pub mod trajectory;

pub use avoidance::SingularityAndCollapseAvoidance;
pub use contact::ContactState;
pub use feet::FeetManager;
pub use foothold::PartialFootholdDetector;
pub use machine::{FootControlModule, FootDiagnostic};
pub use toe_off::{ToeOffArbiter, ToeOffDecision, ToeOffSignals};

pub mod prelude {
    pub use clankers_core::prelude::*;

    pub use crate::feet::FeetManager;
    pub use crate::geometry::{ConvexPolygon2, LineSegment2};
    pub use crate::machine::{validate_footstep, validate_waypoints, FootControlModule, FootDiagnostic};
    pub use crate::states::{FootControlState, FootSignals};
    pub use crate::toe_off::{ToeOffArbiter, ToeOffDecision, ToeOffSignals, TrailingFoot};
}
