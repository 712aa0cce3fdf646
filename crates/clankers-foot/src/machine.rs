//! Per-foot constraint state machine.
//!
//! [`FootControlModule`] owns one foot's states, contact state and helpers.
//! Requests from the control surface are queued and resolved exactly once per
//! tick, so a state never switches the regime mid-tick.

use clankers_core::config::FootControlConfig;
use clankers_core::error::{FootControlError, FootstepError};
use clankers_core::time::{ControlClock, StateTimer};
use clankers_core::traits::{ForwardmostToeCalculator, ToeOffCalculator};
use clankers_core::types::{
    CenterOfPressureCommand, ComHeightData, ConstraintType, FootTickInput, FootWaypoint, Footstep, RobotSide,
    SpatialAccelerationCommand, SpatialFeedbackCommand, TrajectoryType,
};
use nalgebra::{Point2, Vector2, Vector3};

use crate::avoidance::SingularityAndCollapseAvoidance;
use crate::contact::ContactState;
use crate::foothold::PartialFootholdDetector;
use crate::geometry::ConvexPolygon2;
use crate::states::{FootControlState, FootSignals, FootStates, StateContext, SwingState};

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Contract violations that are tolerated but worth reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FootDiagnostic {
    /// HOLD_POSITION was requested from outside. It is managed internally,
    /// so the request went through the FULL/HOLD_POSITION duality instead.
    HoldPositionRequestedExternally { resolved: ConstraintType },
    /// A queued request was replaced before it could be resolved.
    PendingRequestReplaced {
        dropped: ConstraintType,
        requested: ConstraintType,
    },
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn is_finite_pose(footstep: &Footstep) -> bool {
    footstep.pose.translation.vector.iter().all(|v| v.is_finite())
        && footstep.pose.rotation.coords.iter().all(|v| v.is_finite())
}

/// Check timed waypoints: non-empty, finite, strictly increasing times.
pub fn validate_waypoints(waypoints: &[FootWaypoint]) -> Result<(), FootstepError> {
    if waypoints.is_empty() {
        return Err(FootstepError::EmptyWaypoints);
    }
    let mut previous = f64::NEG_INFINITY;
    for (index, waypoint) in waypoints.iter().enumerate() {
        if !waypoint.is_finite() {
            return Err(FootstepError::NonFiniteWaypoint { index });
        }
        if waypoint.time <= previous {
            return Err(FootstepError::NonIncreasingWaypointTime { index });
        }
        previous = waypoint.time;
    }
    Ok(())
}

/// Check a footstep and its swing duration before it reaches a trajectory.
pub fn validate_footstep(footstep: &Footstep, swing_duration: f64) -> Result<(), FootstepError> {
    if !(swing_duration > 0.0 && swing_duration.is_finite()) {
        return Err(FootstepError::NonPositiveDuration(swing_duration));
    }
    if !is_finite_pose(footstep) {
        return Err(FootstepError::NonFinitePose);
    }
    let predicted = footstep.predicted_contact_points.len();
    if predicted != 0 && predicted < 3 {
        return Err(FootstepError::TooFewContactPoints(predicted));
    }
    match footstep.trajectory_type {
        TrajectoryType::Custom if footstep.custom_position_waypoints.len() != 2 => Err(
            FootstepError::WrongCustomWaypointCount(footstep.custom_position_waypoints.len()),
        ),
        TrajectoryType::Waypoints => validate_waypoints(&footstep.swing_waypoints),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// FootControlModule
// ---------------------------------------------------------------------------

/// A new foothold begins when an unloaded foot comes down, directly or
/// through an edge touchdown.
const fn is_touchdown(previous: ConstraintType, next: ConstraintType) -> bool {
    next.is_loaded() && (!previous.is_loaded() || (previous.is_edge_touchdown() && next.is_flat_support()))
}

/// One foot's hybrid constraint automaton.
pub struct FootControlModule {
    side: RobotSide,
    config: FootControlConfig,
    states: FootStates,
    current: ConstraintType,
    pending: Option<ConstraintType>,
    needs_enter: bool,
    signals: FootSignals,
    contact: ContactState,
    foothold: PartialFootholdDetector,
    avoidance: SingularityAndCollapseAvoidance,
    toe_calculator: Box<dyn ToeOffCalculator>,
    clock: ControlClock,
    timer: StateTimer,
    input: FootTickInput,
    last_diagnostic: Option<FootDiagnostic>,
    transition_count: u64,
}

impl FootControlModule {
    /// Build with the default forward-most toe calculator.
    pub fn new(side: RobotSide, config: FootControlConfig) -> Result<Self, FootControlError> {
        let calculator = ForwardmostToeCalculator::new(&config.foot.contact_points());
        Self::with_toe_calculator(side, config, Box::new(calculator))
    }

    pub fn with_toe_calculator(
        side: RobotSide,
        config: FootControlConfig,
        toe_calculator: Box<dyn ToeOffCalculator>,
    ) -> Result<Self, FootControlError> {
        config.validate()?;
        let dt = config.dt();
        let mut contact = ContactState::new(
            &config.foot.contact_points(),
            config.transitions.coefficient_of_friction,
        );
        contact.apply(
            ConstraintType::Full,
            Vector3::z(),
            config.transitions.coefficient_of_friction,
        );
        tracing::debug!(side = %side, calculator = toe_calculator.name(), "foot control module created");
        Ok(Self {
            side,
            states: FootStates::new(side, &config),
            current: ConstraintType::Full,
            pending: None,
            needs_enter: true,
            signals: FootSignals::new(&config),
            contact,
            foothold: PartialFootholdDetector::new(side, config.foothold, dt),
            avoidance: SingularityAndCollapseAvoidance::new(side, config.leg, dt),
            toe_calculator,
            clock: ControlClock::new(dt),
            timer: StateTimer::default(),
            input: FootTickInput::default(),
            last_diagnostic: None,
            transition_count: 0,
            config,
        })
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Run one control tick.
    pub fn tick(&mut self, input: &FootTickInput) {
        self.input.clone_from(input);
        self.signals.reset_transient();
        self.avoidance.update(&input.leg);
        self.update_conditioning();

        if self.current.is_flat_support() && self.signals.reset_polygon_requested {
            self.signals.reset_polygon_requested = false;
            self.reset_polygon_now();
        }

        if self.needs_enter {
            self.needs_enter = false;
            self.timer.restart(self.clock.now());
            self.with_state(self.current, |state, ctx| state.on_enter(ctx));
        }

        if let Some(next) = self.resolve_transition() {
            self.transition(next);
        }
        self.with_state(self.current, |state, ctx| state.on_tick(ctx));
        self.clock.advance();
    }

    fn update_conditioning(&mut self) {
        let transitions = &self.config.transitions;
        self.signals.request_hold_position =
            self.input.load_fraction < transitions.foot_load_threshold_to_hold_position;

        self.signals.is_cop_on_edge = self.input.desired_cop.is_some_and(|cop| {
            let polygon = self.contact.support_polygon();
            !polygon.is_empty() && !polygon.is_point_inside(&cop, transitions.cop_on_edge_epsilon)
        });

        self.signals.jacobian_determinant = self.input.jacobian_determinant;
        if let Some(determinant) = self.input.jacobian_determinant {
            let magnitude = determinant.abs();
            let minimum = transitions.min_jacobian_determinant;
            self.signals.jacobian_determinant_in_range = magnitude >= minimum;
            if minimum > 0.0 && magnitude < minimum {
                self.signals.nullspace_multiplier =
                    transitions.max_nullspace_multiplier * (1.0 - magnitude / minimum);
            }
        }
    }

    /// Pick at most one transition, highest priority first.
    fn resolve_transition(&mut self) -> Option<ConstraintType> {
        if let Some(requested) = self.pending.take() {
            return (requested != self.current).then_some(requested);
        }
        if self.current.is_flat_support() && self.signals.exploration_requested {
            self.signals.exploration_requested = false;
            return (self.current != ConstraintType::ExplorePolygon).then_some(ConstraintType::ExplorePolygon);
        }
        let wants_hold = self.signals.request_hold_position || self.signals.is_cop_on_edge;
        match self.current {
            ConstraintType::Full if wants_hold => Some(ConstraintType::HoldPosition),
            ConstraintType::HoldPosition if !wants_hold => Some(ConstraintType::Full),
            ConstraintType::ExplorePolygon if self.states.exploration.is_done_exploring() => {
                Some(ConstraintType::Full)
            }
            _ => None,
        }
    }

    fn transition(&mut self, next: ConstraintType) {
        let previous = self.current;
        self.with_state(previous, |state, ctx| state.on_exit(ctx));
        if is_touchdown(previous, next) {
            self.contact.reset_cropping();
            self.foothold.reset();
        }
        self.contact.apply(
            next,
            self.signals.contact_normal,
            self.config.transitions.coefficient_of_friction,
        );
        self.current = next;
        self.timer.restart(self.clock.now());
        self.transition_count += 1;
        self.with_state(next, |state, ctx| state.on_enter(ctx));
        tracing::debug!(side = %self.side, from = %previous, to = %next, "foot constraint transition");
    }

    fn with_state<R>(
        &mut self,
        constraint: ConstraintType,
        f: impl FnOnce(&mut dyn FootControlState, &mut StateContext<'_>) -> R,
    ) -> R {
        let time_in_state = self.timer.elapsed(self.clock.now());
        let mut ctx = StateContext {
            side: self.side,
            config: &self.config,
            input: &self.input,
            signals: &mut self.signals,
            contact: &mut self.contact,
            foothold: &mut self.foothold,
            avoidance: &mut self.avoidance,
            toe_calculator: self.toe_calculator.as_mut(),
            time_in_state,
            dt: self.config.dt(),
        };
        f(self.states.get_mut(constraint), &mut ctx)
    }

    fn reset_polygon_now(&mut self) {
        self.contact.reset_cropping();
        self.foothold.reset();
        self.contact.apply(
            self.current,
            self.signals.contact_normal,
            self.config.transitions.coefficient_of_friction,
        );
        tracing::debug!(side = %self.side, "foot polygon reset");
    }

    // -----------------------------------------------------------------------
    // Control surface
    // -----------------------------------------------------------------------

    /// Queue a transition for the next tick. A later request in the same
    /// tick replaces an earlier one.
    pub fn request_state(&mut self, constraint: ConstraintType) {
        if let Some(dropped) = self.pending.replace(constraint) {
            if dropped != constraint {
                self.last_diagnostic = Some(FootDiagnostic::PendingRequestReplaced {
                    dropped,
                    requested: constraint,
                });
            }
        }
    }

    /// Footstep for the next swing.
    pub fn set_footstep(&mut self, footstep: Footstep, swing_duration: f64) -> Result<(), FootstepError> {
        validate_footstep(&footstep, swing_duration)?;
        self.states.swing.set_footstep(footstep, swing_duration);
        Ok(())
    }

    /// Retarget the running swing, landing `remaining_time` seconds from now.
    /// Outside swing this only replaces the stored footstep.
    pub fn replan_trajectory(
        &mut self,
        footstep: Footstep,
        remaining_time: f64,
        continuous: bool,
    ) -> Result<(), FootstepError> {
        validate_footstep(&footstep, remaining_time)?;
        if self.current == ConstraintType::Swing {
            self.states.swing.replan(footstep, remaining_time, continuous);
        } else {
            self.states.swing.set_footstep(footstep, remaining_time);
        }
        Ok(())
    }

    /// Speed up the running swing. Returns the remaining swing time, or
    /// `None` outside swing.
    pub fn request_swing_speed_up(&mut self, factor: f64) -> Option<f64> {
        (self.current == ConstraintType::Swing).then(|| self.states.swing.request_speed_up(factor))
    }

    /// Stance height used to cap the next swing apex.
    pub fn set_swing_stance_height(&mut self, height: Option<f64>) {
        self.states.swing.set_stance_height(height);
    }

    /// Set the contact regime with an optional support normal (world +Z by
    /// default). FULL and HOLD_POSITION resolve by foot load.
    pub fn set_contact_state(&mut self, constraint: ConstraintType, normal: Option<Vector3<f64>>) {
        let resolved = match constraint {
            ConstraintType::Full | ConstraintType::HoldPosition => {
                if self.signals.request_hold_position {
                    ConstraintType::HoldPosition
                } else {
                    ConstraintType::Full
                }
            }
            other => other,
        };
        if constraint == ConstraintType::HoldPosition {
            tracing::warn!(
                side = %self.side,
                resolved = %resolved,
                "HOLD_POSITION is managed internally, request resolved by foot load"
            );
            self.last_diagnostic = Some(FootDiagnostic::HoldPositionRequestedExternally { resolved });
        }

        self.signals.contact_normal = normal.unwrap_or_else(Vector3::z);
        if resolved == self.current {
            self.contact.apply(
                resolved,
                self.signals.contact_normal,
                self.config.transitions.coefficient_of_friction,
            );
        } else {
            self.request_state(resolved);
        }
    }

    /// Start probing the foothold once the foot is in flat support.
    pub fn initialize_foot_exploration(&mut self) {
        self.signals.exploration_requested = true;
    }

    /// Restore the full foot polygon once the foot is in flat support.
    pub fn reset_foot_polygon(&mut self) {
        self.signals.reset_polygon_requested = true;
    }

    /// Move the foot through timed waypoints.
    pub fn handle_foot_trajectory(&mut self, waypoints: Vec<FootWaypoint>) -> Result<(), FootstepError> {
        validate_waypoints(&waypoints)?;
        self.states.waypoints.set_waypoints(waypoints);
        self.request_state(ConstraintType::MoveViaWaypoints);
        Ok(())
    }

    pub fn request_stop_trajectory(&mut self) {
        if self.current == ConstraintType::MoveViaWaypoints {
            self.states.waypoints.request_stop();
        }
    }

    /// CMP the toe geometry is computed for, sole frame.
    pub fn set_toe_off_desired_cmp(&mut self, cmp: Option<Point2<f64>>) {
        self.signals.toe_off_desired_cmp = cmp;
    }

    pub fn set_exit_cmp(&mut self, exit_cmp: Point2<f64>) {
        self.toe_calculator.set_exit_cmp(exit_cmp);
    }

    /// Pivot on a single toe point instead of the toe line.
    pub fn set_use_toe_point_contact(&mut self, use_point: bool) {
        self.signals.use_toe_point_contact = use_point;
    }

    // -----------------------------------------------------------------------
    // Height correction
    // -----------------------------------------------------------------------

    pub fn correct_com_height_for_support_singularity_and_collapse(
        &mut self,
        com_xy_velocity: &Vector2<f64>,
        z_current: f64,
        data: &mut ComHeightData,
    ) {
        self.avoidance.correct_com_height_for_support_singularity_and_collapse(
            com_xy_velocity,
            z_current,
            data,
            self.input.load_fraction,
            self.current,
        );
    }

    pub fn correct_com_height_for_unreachable_footstep(&mut self, data: &mut ComHeightData) {
        self.avoidance
            .correct_com_height_for_unreachable_footstep(data, self.current);
    }

    pub fn reset_height_correction(&mut self) {
        self.avoidance.reset();
    }

    pub fn set_collapse_avoidance_enabled(&mut self, enabled: bool) {
        self.avoidance.set_collapse_avoidance_enabled(enabled);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    #[must_use]
    pub const fn side(&self) -> RobotSide {
        self.side
    }

    #[must_use]
    pub const fn current_constraint_type(&self) -> ConstraintType {
        self.current
    }

    #[must_use]
    pub const fn pending_request(&self) -> Option<ConstraintType> {
        self.pending
    }

    #[must_use]
    pub const fn is_in_flat_support_state(&self) -> bool {
        self.current.is_flat_support()
    }

    #[must_use]
    pub const fn is_in_edge_touchdown_state(&self) -> bool {
        self.current.is_edge_touchdown()
    }

    #[must_use]
    pub fn is_done_exploring(&self) -> bool {
        self.states.exploration.is_done_exploring()
    }

    #[must_use]
    pub const fn is_rotating(&self) -> bool {
        self.foothold.is_rotating()
    }

    /// Nominal first-contact pitch for an edge touchdown regime.
    #[must_use]
    pub fn touchdown_initial_angle(&self, kind: ConstraintType) -> Option<f64> {
        match kind {
            ConstraintType::ToesTouchdown => Some(self.states.toes_touchdown.touchdown_initial_angle()),
            ConstraintType::HeelTouchdown => Some(self.states.heel_touchdown.touchdown_initial_angle()),
            _ => None,
        }
    }

    #[must_use]
    pub fn time_in_current_state(&self) -> f64 {
        self.timer.elapsed(self.clock.now())
    }

    #[must_use]
    pub const fn transition_count(&self) -> u64 {
        self.transition_count
    }

    #[must_use]
    pub const fn clock(&self) -> &ControlClock {
        &self.clock
    }

    #[must_use]
    pub const fn last_diagnostic(&self) -> Option<FootDiagnostic> {
        self.last_diagnostic
    }

    pub fn take_diagnostic(&mut self) -> Option<FootDiagnostic> {
        self.last_diagnostic.take()
    }

    #[must_use]
    pub const fn signals(&self) -> &FootSignals {
        &self.signals
    }

    #[must_use]
    pub const fn contact_state(&self) -> &ContactState {
        &self.contact
    }

    /// Current support polygon, sole frame.
    #[must_use]
    pub fn support_polygon(&self) -> ConvexPolygon2 {
        self.contact.support_polygon()
    }

    #[must_use]
    pub const fn foothold_detector(&self) -> &PartialFootholdDetector {
        &self.foothold
    }

    #[must_use]
    pub const fn avoidance(&self) -> &SingularityAndCollapseAvoidance {
        &self.avoidance
    }

    #[must_use]
    pub const fn swing_state(&self) -> &SwingState {
        &self.states.swing
    }

    #[must_use]
    pub const fn states(&self) -> &FootStates {
        &self.states
    }

    #[must_use]
    pub const fn config(&self) -> &FootControlConfig {
        &self.config
    }

    /// Input of the last tick.
    #[must_use]
    pub const fn last_input(&self) -> &FootTickInput {
        &self.input
    }

    #[must_use]
    pub fn toe_calculator(&self) -> &dyn ToeOffCalculator {
        self.toe_calculator.as_ref()
    }

    pub fn toe_calculator_mut(&mut self) -> &mut dyn ToeOffCalculator {
        self.toe_calculator.as_mut()
    }

    // -----------------------------------------------------------------------
    // Outputs
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn feedback_command(&self) -> Option<&SpatialFeedbackCommand> {
        self.states.get(self.current).feedback_command()
    }

    #[must_use]
    pub fn acceleration_command(&self) -> Option<&SpatialAccelerationCommand> {
        self.states.get(self.current).acceleration_command()
    }

    #[must_use]
    pub fn cop_command(&self) -> Option<&CenterOfPressureCommand> {
        self.states.get(self.current).cop_command()
    }
}

impl std::fmt::Debug for FootControlModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FootControlModule")
            .field("side", &self.side)
            .field("current", &self.current)
            .field("pending", &self.pending)
            .field("toe_calculator", &self.toe_calculator.name())
            .finish_non_exhaustive()
    }
}
