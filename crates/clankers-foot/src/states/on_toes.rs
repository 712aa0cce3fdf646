use clankers_core::config::FootControlConfig;
use clankers_core::types::{
    ConstraintType, RobotSide, SelectionMatrix6, SpatialAccelerationCommand, SpatialFeedbackCommand,
};
use nalgebra::{Isometry3, Point2, Translation3, UnitQuaternion, Vector3};

use super::{heading, pitch_in_heading_frame, FootControlState, StateContext};

/// Trailing foot pivoting on its toes during push-off.
///
/// Only the pitch about the toe is tracked. It follows the measured pitch
/// up to the configured maximum and is blocked there with zero rate. The
/// vertical direction at the toe is locked by a hard constraint.
#[derive(Debug, Clone)]
pub struct OnToesState {
    feedback: SpatialFeedbackCommand,
    acceleration: SpatialAccelerationCommand,
    maximum_toe_off_angle: f64,
    start_orientation: UnitQuaternion<f64>,
    toe_point: Point2<f64>,
    current_pitch: f64,
    desired_pitch: f64,
    desired_pitch_rate: f64,
    is_blocked: bool,
}

impl OnToesState {
    #[must_use]
    pub fn new(side: RobotSide, config: &FootControlConfig) -> Self {
        let mut feedback = SpatialFeedbackCommand::new(side, config.gains.toe_off, config.gains.support_weight);
        feedback.invalidate();
        Self {
            feedback,
            acceleration: SpatialAccelerationCommand::zero(side)
                .with_selection(SelectionMatrix6::world_linear_z_only()),
            maximum_toe_off_angle: config.on_toes.maximum_toe_off_angle,
            start_orientation: UnitQuaternion::identity(),
            toe_point: Point2::origin(),
            current_pitch: f64::NAN,
            desired_pitch: f64::NAN,
            desired_pitch_rate: f64::NAN,
            is_blocked: false,
        }
    }

    /// Pivot point of the last tick, sole frame.
    #[must_use]
    pub const fn toe_point(&self) -> Point2<f64> {
        self.toe_point
    }

    #[must_use]
    pub const fn current_pitch(&self) -> f64 {
        self.current_pitch
    }

    #[must_use]
    pub const fn desired_pitch(&self) -> f64 {
        self.desired_pitch
    }

    #[must_use]
    pub const fn desired_pitch_rate(&self) -> f64 {
        self.desired_pitch_rate
    }

    /// The pitch reached the maximum toe-off angle this tick.
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        self.is_blocked
    }

    fn update_toe_contact(&mut self, ctx: &mut StateContext<'_>) {
        let desired_cmp = ctx.signals.toe_off_desired_cmp;
        if ctx.signals.use_toe_point_contact {
            ctx.toe_calculator.compute_toe_off_contact_point(desired_cmp);
            self.toe_point = ctx.toe_calculator.toe_off_contact_point();
            ctx.contact.move_points_to_point(self.toe_point);
        } else {
            ctx.toe_calculator.compute_toe_off_contact_line(desired_cmp);
            let line = ctx.toe_calculator.toe_off_contact_line();
            self.toe_point = line.midpoint();
            ctx.contact.move_points_to_line(&line);
        }
    }
}

impl FootControlState for OnToesState {
    fn constraint_type(&self) -> ConstraintType {
        ConstraintType::Toes
    }

    fn on_enter(&mut self, ctx: &mut StateContext<'_>) {
        self.start_orientation = ctx.input.sole_pose.rotation;
        self.feedback.gains = ctx.config.gains.toe_off;
        self.feedback.weight = ctx.config.gains.support_weight;
        self.feedback.selection = SelectionMatrix6::all().with_linear(2, false);
        self.is_blocked = false;
    }

    fn on_tick(&mut self, ctx: &mut StateContext<'_>) {
        self.update_toe_contact(ctx);

        let sole = &ctx.input.sole_pose;
        let yaw_frame = heading(&sole.rotation);
        self.current_pitch = pitch_in_heading_frame(&sole.rotation);
        let current_rate = yaw_frame.inverse_transform_vector(&ctx.input.angular_velocity).y;

        self.is_blocked = self.current_pitch > self.maximum_toe_off_angle;
        if self.is_blocked {
            self.desired_pitch = self.maximum_toe_off_angle;
            self.desired_pitch_rate = 0.0;
        } else {
            self.desired_pitch = self.current_pitch;
            self.desired_pitch_rate = current_rate;
        }

        let (roll, _, yaw) = self.start_orientation.euler_angles();
        let orientation = UnitQuaternion::from_euler_angles(roll, self.desired_pitch, yaw);
        let toe_offset = Vector3::new(self.toe_point.x, self.toe_point.y, 0.0);
        let toe_in_world = sole.translation.vector + sole.rotation * toe_offset;

        self.feedback.desired_pose = Isometry3::from_parts(Translation3::from(toe_in_world), orientation);
        self.feedback.desired_linear_velocity = Vector3::zeros();
        self.feedback.desired_angular_velocity = yaw_frame * Vector3::new(0.0, self.desired_pitch_rate, 0.0);
        self.feedback.feed_forward_linear_acceleration = Vector3::zeros();
        self.feedback.feed_forward_angular_acceleration = Vector3::zeros();
        self.feedback.control_point_offset = toe_offset;

        self.acceleration = SpatialAccelerationCommand::zero(ctx.side)
            .with_selection(SelectionMatrix6::world_linear_z_only());
        self.acceleration.control_point_offset = toe_offset;
    }

    fn on_exit(&mut self, ctx: &mut StateContext<'_>) {
        ctx.toe_calculator.clear();
        self.feedback.invalidate();
        self.current_pitch = f64::NAN;
        self.desired_pitch = f64::NAN;
        self.desired_pitch_rate = f64::NAN;
        self.is_blocked = false;
    }

    fn feedback_command(&self) -> Option<&SpatialFeedbackCommand> {
        Some(&self.feedback)
    }

    fn acceleration_command(&self) -> Option<&SpatialAccelerationCommand> {
        Some(&self.acceleration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::test_support::Harness;
    use approx::assert_relative_eq;

    fn pitched(pitch: f64, rate: f64) -> Harness {
        let mut harness = Harness::new();
        harness.input.sole_pose = Isometry3::from_parts(
            Translation3::new(0.0, 0.0, 0.02),
            UnitQuaternion::from_euler_angles(0.0, pitch, 0.0),
        );
        harness.input.angular_velocity = Vector3::new(0.0, rate, 0.0);
        harness
    }

    #[test]
    fn follows_measured_pitch_below_maximum() {
        let mut harness = pitched(0.2, 1.5);
        let mut state = OnToesState::new(RobotSide::Left, &harness.config);
        harness.run(&mut state, 0.0);

        assert!(!state.is_blocked());
        assert_relative_eq!(state.desired_pitch(), 0.2, epsilon = 1e-9);
        assert_relative_eq!(state.desired_pitch_rate(), 1.5, epsilon = 1e-9);
    }

    #[test]
    fn pitch_beyond_maximum_forces_zero_rate() {
        let mut harness = pitched(0.6, 2.0);
        let mut state = OnToesState::new(RobotSide::Left, &harness.config);
        harness.run(&mut state, 0.0);

        assert!(state.is_blocked());
        assert_relative_eq!(state.desired_pitch(), harness.config.on_toes.maximum_toe_off_angle);
        assert_eq!(state.desired_pitch_rate(), 0.0);
        assert_eq!(state.feedback_command().unwrap().desired_angular_velocity, Vector3::zeros());
    }

    #[test]
    fn line_contact_moves_points_to_toe_line() {
        let mut harness = pitched(0.1, 0.0);
        let mut state = OnToesState::new(RobotSide::Left, &harness.config);
        harness.run(&mut state, 0.0);

        assert!(harness.contact.points().iter().all(|p| (p.x - 0.16).abs() < 1e-12));
        assert_relative_eq!(state.toe_point().x, 0.16);
        let feedback = state.feedback_command().unwrap();
        assert!(!feedback.selection.linear[2]);
        assert_relative_eq!(feedback.control_point_offset.x, 0.16);
        let accel = state.acceleration_command().unwrap();
        assert_eq!(accel.selection, SelectionMatrix6::world_linear_z_only());
    }

    #[test]
    fn point_contact_collapses_points() {
        let mut harness = pitched(0.1, 0.0);
        harness.signals.use_toe_point_contact = true;
        harness.signals.toe_off_desired_cmp = Some(Point2::new(0.3, 0.02));
        let mut state = OnToesState::new(RobotSide::Left, &harness.config);
        harness.run(&mut state, 0.0);

        let point = state.toe_point();
        assert_relative_eq!(point.x, 0.16);
        assert_relative_eq!(point.y, 0.02, epsilon = 1e-12);
        assert!(harness.contact.points().iter().all(|p| *p == point));
    }

    #[test]
    fn exit_clears_pitch_signals() {
        let mut harness = pitched(0.1, 0.0);
        let mut state = OnToesState::new(RobotSide::Left, &harness.config);
        harness.run(&mut state, 0.0);
        state.on_exit(&mut harness.ctx());
        assert!(state.desired_pitch().is_nan());
        assert!(state.desired_pitch_rate().is_nan());
    }
}
