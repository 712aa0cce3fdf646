//! Contact constraint states.
//!
//! Every [`ConstraintType`] has one state object implementing
//! [`FootControlState`]. The machine owns them all in a [`FootStates`]
//! registry and only ever dispatches to the active one.

mod exploration;
mod hold;
mod on_toes;
mod support;
mod swing;
mod touchdown;
mod waypoints;

pub use exploration::FootholdExplorationState;
pub use hold::HoldPositionState;
pub use on_toes::OnToesState;
pub use support::FullSupportState;
pub use swing::SwingState;
pub use touchdown::TouchdownState;
pub use waypoints::MoveViaWaypointsState;

use clankers_core::config::FootControlConfig;
use clankers_core::traits::ToeOffCalculator;
use clankers_core::types::{
    CenterOfPressureCommand, ConstraintType, FootTickInput, RobotSide, SpatialAccelerationCommand,
    SpatialFeedbackCommand,
};
use nalgebra::{Isometry3, Point2, UnitQuaternion, Vector3};

use crate::avoidance::SingularityAndCollapseAvoidance;
use crate::contact::ContactState;
use crate::foothold::PartialFootholdDetector;

// ---------------------------------------------------------------------------
// Live signals
// ---------------------------------------------------------------------------

/// Mutable per-foot signals shared between the machine and its states.
///
/// Configuration never changes after construction; everything that does
/// lives here.
#[derive(Debug, Clone)]
pub struct FootSignals {
    /// Foot load is below the hold threshold.
    pub request_hold_position: bool,
    /// Desired CoP lies outside the support polygon shrunk by the edge epsilon.
    pub is_cop_on_edge: bool,
    pub jacobian_determinant: Option<f64>,
    pub jacobian_determinant_in_range: bool,
    /// Suggested knee-bending bias, zero while the leg is well conditioned.
    pub nullspace_multiplier: f64,
    pub exploration_requested: bool,
    pub reset_polygon_requested: bool,
    /// Toe-off pivots about a single point instead of the toe line.
    pub use_toe_point_contact: bool,
    /// CMP the toe geometry is computed for, sole frame.
    pub toe_off_desired_cmp: Option<Point2<f64>>,
    /// Normal pushed with the next contact pattern.
    pub contact_normal: Vector3<f64>,
}

impl FootSignals {
    #[must_use]
    pub fn new(config: &FootControlConfig) -> Self {
        Self {
            request_hold_position: false,
            is_cop_on_edge: false,
            jacobian_determinant: None,
            jacobian_determinant_in_range: true,
            nullspace_multiplier: 0.0,
            exploration_requested: false,
            reset_polygon_requested: false,
            use_toe_point_contact: config.on_toes.use_point_contact,
            toe_off_desired_cmp: None,
            contact_normal: Vector3::z(),
        }
    }

    /// Clear the values recomputed every tick.
    pub fn reset_transient(&mut self) {
        self.nullspace_multiplier = 0.0;
        self.jacobian_determinant_in_range = true;
    }
}

// ---------------------------------------------------------------------------
// StateContext
// ---------------------------------------------------------------------------

/// Everything a state may read or touch during one lifecycle call.
pub struct StateContext<'a> {
    pub side: RobotSide,
    pub config: &'a FootControlConfig,
    pub input: &'a FootTickInput,
    pub signals: &'a mut FootSignals,
    pub contact: &'a mut ContactState,
    pub foothold: &'a mut PartialFootholdDetector,
    pub avoidance: &'a mut SingularityAndCollapseAvoidance,
    pub toe_calculator: &'a mut dyn ToeOffCalculator,
    /// Seconds since the active state was entered.
    pub time_in_state: f64,
    pub dt: f64,
}

impl StateContext<'_> {
    #[must_use]
    pub fn sole_pose(&self) -> &Isometry3<f64> {
        &self.input.sole_pose
    }

    /// Sole-frame offset of the ankle.
    #[must_use]
    pub fn ankle_offset(&self) -> Vector3<f64> {
        Vector3::new(0.0, 0.0, self.config.foot.ankle_height)
    }
}

// ---------------------------------------------------------------------------
// FootControlState
// ---------------------------------------------------------------------------

/// Lifecycle shared by every constraint state.
///
/// `on_enter` runs once on activation, `on_tick` every tick while active
/// (including the activation tick), `on_exit` once on deactivation and must
/// leave no stale targets behind.
pub trait FootControlState: Send {
    fn constraint_type(&self) -> ConstraintType;

    fn on_enter(&mut self, ctx: &mut StateContext<'_>);

    fn on_tick(&mut self, ctx: &mut StateContext<'_>);

    fn on_exit(&mut self, ctx: &mut StateContext<'_>);

    /// Task-space feedback target, if this state tracks one.
    fn feedback_command(&self) -> Option<&SpatialFeedbackCommand>;

    /// Inverse-dynamics constraint, if this state imposes one.
    fn acceleration_command(&self) -> Option<&SpatialAccelerationCommand>;

    fn cop_command(&self) -> Option<&CenterOfPressureCommand> {
        None
    }
}

// ---------------------------------------------------------------------------
// FootStates
// ---------------------------------------------------------------------------

/// One state per [`ConstraintType`], with typed access for the control
/// surface and dynamic access for the lifecycle.
pub struct FootStates {
    pub full: FullSupportState,
    pub hold: HoldPositionState,
    pub on_toes: OnToesState,
    pub swing: SwingState,
    pub waypoints: MoveViaWaypointsState,
    pub exploration: FootholdExplorationState,
    pub toes_touchdown: TouchdownState,
    pub heel_touchdown: TouchdownState,
}

impl FootStates {
    #[must_use]
    pub fn new(side: RobotSide, config: &FootControlConfig) -> Self {
        Self {
            full: FullSupportState::new(side),
            hold: HoldPositionState::new(side, config),
            on_toes: OnToesState::new(side, config),
            swing: SwingState::new(side, config),
            waypoints: MoveViaWaypointsState::new(side, config),
            exploration: FootholdExplorationState::new(side, config),
            toes_touchdown: TouchdownState::new(side, ConstraintType::ToesTouchdown, config),
            heel_touchdown: TouchdownState::new(side, ConstraintType::HeelTouchdown, config),
        }
    }

    #[must_use]
    pub fn get(&self, constraint: ConstraintType) -> &dyn FootControlState {
        match constraint {
            ConstraintType::Full => &self.full,
            ConstraintType::HoldPosition => &self.hold,
            ConstraintType::Toes => &self.on_toes,
            ConstraintType::Swing => &self.swing,
            ConstraintType::MoveViaWaypoints => &self.waypoints,
            ConstraintType::ExplorePolygon => &self.exploration,
            ConstraintType::ToesTouchdown => &self.toes_touchdown,
            ConstraintType::HeelTouchdown => &self.heel_touchdown,
        }
    }

    pub fn get_mut(&mut self, constraint: ConstraintType) -> &mut dyn FootControlState {
        match constraint {
            ConstraintType::Full => &mut self.full,
            ConstraintType::HoldPosition => &mut self.hold,
            ConstraintType::Toes => &mut self.on_toes,
            ConstraintType::Swing => &mut self.swing,
            ConstraintType::MoveViaWaypoints => &mut self.waypoints,
            ConstraintType::ExplorePolygon => &mut self.exploration,
            ConstraintType::ToesTouchdown => &mut self.toes_touchdown,
            ConstraintType::HeelTouchdown => &mut self.heel_touchdown,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Pitch of `orientation` about the y axis of its own heading frame.
pub(crate) fn pitch_in_heading_frame(orientation: &UnitQuaternion<f64>) -> f64 {
    orientation.euler_angles().1
}

/// Heading-only rotation of `orientation`.
pub(crate) fn heading(orientation: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_axis_angle(&Vector3::z_axis(), orientation.euler_angles().2)
}

/// Zero-acceleration hard constraint on every direction.
pub(crate) fn rigid_constraint(side: RobotSide) -> SpatialAccelerationCommand {
    SpatialAccelerationCommand::zero(side)
}
