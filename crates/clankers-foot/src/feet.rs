//! Both feet plus the toe-off arbiter, ticked together.

use clankers_core::config::FootControlConfig;
use clankers_core::error::{FootControlError, FootstepError};
use clankers_core::types::{
    CenterOfPressureCommand, ComHeightData, ConstraintType, FootTickInput, Footstep, RobotSide,
    SpatialAccelerationCommand, SpatialFeedbackCommand,
};
use nalgebra::{Point2, Vector2, Vector3};

use crate::geometry::{sole_to_world_xy, world_xy_to_sole};
use crate::machine::FootControlModule;
use crate::toe_off::{ToeOffArbiter, ToeOffDecision, ToeOffSignals, TrailingFoot};

/// Owns both [`FootControlModule`]s and the shared [`ToeOffArbiter`].
#[derive(Debug)]
pub struct FeetManager {
    feet: [FootControlModule; 2],
    toe_off: ToeOffArbiter,
}

impl FeetManager {
    pub fn new(config: &FootControlConfig) -> Result<Self, FootControlError> {
        let left = FootControlModule::new(RobotSide::Left, config.clone())?;
        let right = FootControlModule::new(RobotSide::Right, config.clone())?;
        Ok(Self::from_modules(left, right, config))
    }

    /// Assemble from prebuilt modules, e.g. with custom toe calculators.
    #[must_use]
    pub fn from_modules(left: FootControlModule, right: FootControlModule, config: &FootControlConfig) -> Self {
        let toe_off = ToeOffArbiter::new(
            config.toe_off,
            &config.foot.contact_points(),
            config.foot.foot_length(),
        );
        Self {
            feet: [left, right],
            toe_off,
        }
    }

    /// Tick the left foot, then the right.
    pub fn tick(&mut self, left: &FootTickInput, right: &FootTickInput) {
        self.feet[RobotSide::Left.index()].tick(left);
        self.feet[RobotSide::Right.index()].tick(right);
    }

    #[must_use]
    pub fn foot(&self, side: RobotSide) -> &FootControlModule {
        &self.feet[side.index()]
    }

    pub fn foot_mut(&mut self, side: RobotSide) -> &mut FootControlModule {
        &mut self.feet[side.index()]
    }

    #[must_use]
    pub const fn toe_off(&self) -> &ToeOffArbiter {
        &self.toe_off
    }

    /// Both feet are in flat support.
    #[must_use]
    pub fn is_in_double_support(&self) -> bool {
        self.feet.iter().all(FootControlModule::is_in_flat_support_state)
    }

    // -----------------------------------------------------------------------
    // Swing and contact
    // -----------------------------------------------------------------------

    /// Swing `side` to `footstep` over `swing_duration` seconds, starting on
    /// the next tick. The apex is capped relative to the other foot.
    pub fn request_swing(
        &mut self,
        side: RobotSide,
        footstep: Footstep,
        swing_duration: f64,
    ) -> Result<(), FootstepError> {
        let stance_height = self.feet[side.opposite().index()]
            .last_input()
            .sole_pose
            .translation
            .vector
            .z;
        let foot = &mut self.feet[side.index()];
        foot.set_footstep(footstep, swing_duration)?;
        foot.set_swing_stance_height(Some(stance_height));
        foot.request_state(ConstraintType::Swing);
        Ok(())
    }

    pub fn replan_swing(
        &mut self,
        side: RobotSide,
        footstep: Footstep,
        remaining_time: f64,
        continuous: bool,
    ) -> Result<(), FootstepError> {
        self.feet[side.index()].replan_trajectory(footstep, remaining_time, continuous)
    }

    pub fn request_swing_speed_up(&mut self, side: RobotSide, factor: f64) -> Option<f64> {
        self.feet[side.index()].request_swing_speed_up(factor)
    }

    /// Put `side` flat on the ground, FULL or HOLD_POSITION by load.
    pub fn set_flat_foot_contact_state(&mut self, side: RobotSide, normal: Option<Vector3<f64>>) {
        self.feet[side.index()].set_contact_state(ConstraintType::Full, normal);
    }

    /// Land `side` on an edge, `kind` being toe or heel touchdown.
    pub fn request_touchdown(&mut self, side: RobotSide, kind: ConstraintType) {
        if kind.is_edge_touchdown() {
            self.feet[side.index()].set_contact_state(kind, None);
        }
    }

    // -----------------------------------------------------------------------
    // Toe-off
    // -----------------------------------------------------------------------

    /// Evaluate toe-off for `trailing_side`. With `next_footstep` the
    /// leading polygon is predicted from it (single support), otherwise it
    /// is the opposite foot's current contact (double support).
    pub fn update_toe_off(
        &mut self,
        trailing_side: RobotSide,
        next_footstep: Option<&Footstep>,
        signals: &ToeOffSignals,
    ) -> ToeOffDecision {
        let [left, right] = &mut self.feet;
        let (trailing, leading) = match trailing_side {
            RobotSide::Left => (left, &*right),
            RobotSide::Right => (right, &*left),
        };

        let input = trailing.last_input();
        let trailing_pose = input.sole_pose;
        let trailing_foot = TrailingFoot {
            side: trailing_side,
            sole_pose: &trailing_pose,
            ankle_pitch: input.leg.ankle_pitch,
            ankle_pitch_lower_limit: input.leg.ankle_pitch_lower_limit,
        };
        let decision = match next_footstep {
            Some(footstep) => {
                self.toe_off
                    .update_single_support(&trailing_foot, footstep, signals, trailing.toe_calculator_mut())
            }
            None => {
                let leading_pose = leading.last_input().sole_pose;
                let contact = leading.contact_state();
                let points: Vec<Point2<f64>> = contact
                    .points()
                    .iter()
                    .zip(contact.in_contact())
                    .filter_map(|(p, &c)| c.then(|| sole_to_world_xy(&leading_pose, p)))
                    .collect();
                self.toe_off.update_double_support(
                    &trailing_foot,
                    &leading_pose,
                    &points,
                    signals,
                    trailing.toe_calculator_mut(),
                )
            }
        };

        trailing.set_toe_off_desired_cmp(
            signals
                .exit_cmp
                .map(|_| world_xy_to_sole(&trailing_pose, &signals.desired_ecmp)),
        );
        decision
    }

    /// Pivot `trailing_side` onto its toes using the last decision's
    /// contact kind.
    pub fn request_toe_off(&mut self, trailing_side: RobotSide) {
        let decision = self.toe_off.decision();
        let foot = &mut self.feet[trailing_side.index()];
        foot.set_use_toe_point_contact(decision.use_point && !decision.use_line);
        foot.request_state(ConstraintType::Toes);
    }

    /// Evaluate toe-off and request it when allowed. Returns whether a
    /// toe-off was requested.
    pub fn do_toe_off_if_possible(
        &mut self,
        trailing_side: RobotSide,
        next_footstep: Option<&Footstep>,
        signals: &ToeOffSignals,
    ) -> bool {
        let foot = &self.feet[trailing_side.index()];
        if !foot.is_in_flat_support_state() {
            return false;
        }
        let decision = self.update_toe_off(trailing_side, next_footstep, signals);
        if decision.is_toe_off() {
            self.request_toe_off(trailing_side);
            tracing::info!(side = %trailing_side, line = decision.use_line, "toe-off requested");
        }
        decision.is_toe_off()
    }

    // -----------------------------------------------------------------------
    // CoM height
    // -----------------------------------------------------------------------

    /// Run every foot's height corrections on one CoM height sample.
    pub fn correct_com_height(&mut self, com_xy_velocity: &Vector2<f64>, z_current: f64, data: &mut ComHeightData) {
        for foot in &mut self.feet {
            foot.correct_com_height_for_support_singularity_and_collapse(com_xy_velocity, z_current, data);
        }
        for foot in &mut self.feet {
            foot.correct_com_height_for_unreachable_footstep(data);
        }
    }

    /// Drop height corrections and toe-off state on both feet.
    pub fn reset(&mut self) {
        for foot in &mut self.feet {
            foot.reset_height_correction();
        }
        self.toe_off.reset();
    }

    // -----------------------------------------------------------------------
    // Outputs
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn feedback_command(&self, side: RobotSide) -> Option<&SpatialFeedbackCommand> {
        self.feet[side.index()].feedback_command()
    }

    #[must_use]
    pub fn acceleration_command(&self, side: RobotSide) -> Option<&SpatialAccelerationCommand> {
        self.feet[side.index()].acceleration_command()
    }

    #[must_use]
    pub fn cop_command(&self, side: RobotSide) -> Option<&CenterOfPressureCommand> {
        self.feet[side.index()].cop_command()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Isometry3;

    fn standing(x: f64, y: f64) -> FootTickInput {
        FootTickInput {
            sole_pose: Isometry3::translation(x, y, 0.0),
            measured_cop: Some(Point2::new(0.04, 0.0)),
            desired_cop: Some(Point2::new(0.04, 0.0)),
            load_fraction: 0.5,
            ..FootTickInput::default()
        }
    }

    #[test]
    fn swing_request_applies_on_next_tick() {
        let mut feet = FeetManager::new(&FootControlConfig::default()).unwrap();
        feet.tick(&standing(0.0, 0.1), &standing(0.0, -0.1));
        assert!(feet.is_in_double_support());

        let step = Footstep::new(RobotSide::Left, Isometry3::translation(0.3, 0.1, 0.0));
        feet.request_swing(RobotSide::Left, step, 0.6).unwrap();
        feet.tick(&standing(0.0, 0.1), &standing(0.0, -0.1));
        assert_eq!(feet.foot(RobotSide::Left).current_constraint_type(), ConstraintType::Swing);
        assert_eq!(feet.foot(RobotSide::Right).current_constraint_type(), ConstraintType::Full);
        assert!(feet.feedback_command(RobotSide::Left).is_some());
        assert!(feet.feedback_command(RobotSide::Right).is_none());
    }

    #[test]
    fn invalid_swing_is_rejected_without_transition() {
        let mut feet = FeetManager::new(&FootControlConfig::default()).unwrap();
        let step = Footstep::new(RobotSide::Left, Isometry3::translation(0.3, 0.1, 0.0));
        assert!(feet.request_swing(RobotSide::Left, step, -1.0).is_err());
        feet.tick(&standing(0.0, 0.1), &standing(0.0, -0.1));
        assert_eq!(feet.foot(RobotSide::Left).current_constraint_type(), ConstraintType::Full);
    }

    #[test]
    fn toe_off_is_not_requested_with_far_capture_point() {
        let mut feet = FeetManager::new(&FootControlConfig::default()).unwrap();
        feet.tick(&standing(0.0, 0.1), &standing(0.5, -0.1));
        let far = Point2::new(-1.0, 0.0);
        let signals = ToeOffSignals {
            exit_cmp: None,
            desired_ecmp: far,
            desired_cop: far,
            desired_icp: far,
            current_icp: far,
        };
        for _ in 0..10 {
            assert!(!feet.do_toe_off_if_possible(RobotSide::Left, None, &signals));
        }
        feet.tick(&standing(0.0, 0.1), &standing(0.5, -0.1));
        assert_eq!(feet.foot(RobotSide::Left).current_constraint_type(), ConstraintType::Full);
    }

    #[test]
    fn exit_cmp_is_handed_to_trailing_foot_in_sole_frame() {
        let mut feet = FeetManager::new(&FootControlConfig::default()).unwrap();
        feet.tick(&standing(0.2, 0.1), &standing(0.5, -0.1));
        let signals = ToeOffSignals {
            exit_cmp: Some(Point2::new(0.3, 0.1)),
            desired_ecmp: Point2::new(0.3, 0.1),
            desired_cop: Point2::new(0.3, 0.1),
            desired_icp: Point2::new(0.4, 0.0),
            current_icp: Point2::new(0.4, 0.0),
        };
        feet.update_toe_off(RobotSide::Left, None, &signals);
        let cmp = feet.foot(RobotSide::Left).signals().toe_off_desired_cmp.unwrap();
        assert!((cmp - Point2::new(0.1, 0.0)).norm() < 1e-12);
        assert!(feet.foot(RobotSide::Right).signals().toe_off_desired_cmp.is_none());

        let no_exit = ToeOffSignals { exit_cmp: None, ..signals };
        feet.update_toe_off(RobotSide::Left, None, &no_exit);
        assert!(feet.foot(RobotSide::Left).signals().toe_off_desired_cmp.is_none());
    }

    #[test]
    fn request_toe_off_enters_toes_state() {
        let mut feet = FeetManager::new(&FootControlConfig::default()).unwrap();
        feet.tick(&standing(0.0, 0.1), &standing(0.5, -0.1));
        feet.request_toe_off(RobotSide::Left);
        feet.tick(&standing(0.0, 0.1), &standing(0.5, -0.1));
        assert_eq!(feet.foot(RobotSide::Left).current_constraint_type(), ConstraintType::Toes);
        assert!(feet.acceleration_command(RobotSide::Left).is_some());
    }

    #[test]
    fn touchdown_request_ignores_non_edge_states() {
        let mut feet = FeetManager::new(&FootControlConfig::default()).unwrap();
        feet.request_touchdown(RobotSide::Right, ConstraintType::Swing);
        assert!(feet.foot(RobotSide::Right).pending_request().is_none());
        feet.request_touchdown(RobotSide::Right, ConstraintType::HeelTouchdown);
        assert_eq!(
            feet.foot(RobotSide::Right).pending_request(),
            Some(ConstraintType::HeelTouchdown)
        );
    }
}
