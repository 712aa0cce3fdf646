use clankers_core::config::{FootControlConfig, SwingStateConfig};
use clankers_core::types::{
    ConstraintType, Footstep, RobotSide, SelectionMatrix6, SpatialAccelerationCommand, SpatialFeedbackCommand,
};
use nalgebra::{Isometry3, Point3, Translation3, Vector3};

use super::{FootControlState, StateContext};
use crate::trajectory::{PoseSample, SwingPlanContext, SwingTrajectory};

#[derive(Debug, Clone)]
struct PendingReplan {
    footstep: Footstep,
    remaining_time: f64,
    continuous: bool,
}

/// Unloaded foot following a swing trajectory to the next footstep.
///
/// Trajectory time starts at zero on entry and advances by `dt` times the
/// speed-up factor each tick, so a speed-up shortens the rest of the swing
/// without a jump in the desired pose.
#[derive(Debug, Clone)]
pub struct SwingState {
    feedback: SpatialFeedbackCommand,
    config: SwingStateConfig,
    control_offset: Vector3<f64>,
    footstep: Option<Footstep>,
    swing_duration: f64,
    stance_height: Option<f64>,
    trajectory: Option<SwingTrajectory>,
    pending_replan: Option<PendingReplan>,
    desired: PoseSample,
    swing_time: f64,
    last_time_in_state: f64,
    speed_up_factor: f64,
    max_speed_up_factor: f64,
}

impl SwingState {
    #[must_use]
    pub fn new(side: RobotSide, config: &FootControlConfig) -> Self {
        let mut feedback = SpatialFeedbackCommand::new(side, config.gains.swing, config.gains.swing_weight);
        feedback.invalidate();
        let control_offset = if config.swing.control_toe {
            config.foot.toe_control_offset()
        } else {
            Vector3::zeros()
        };
        Self {
            feedback,
            config: config.swing,
            control_offset,
            footstep: None,
            swing_duration: f64::NAN,
            stance_height: None,
            trajectory: None,
            pending_replan: None,
            desired: PoseSample::at_rest(Isometry3::identity()),
            swing_time: 0.0,
            last_time_in_state: 0.0,
            speed_up_factor: 1.0,
            max_speed_up_factor: 1.0,
        }
    }

    /// Footstep and duration for the next swing. Takes effect on entry.
    pub fn set_footstep(&mut self, footstep: Footstep, swing_duration: f64) {
        self.footstep = Some(footstep);
        self.swing_duration = swing_duration;
    }

    /// Sole height of the stance foot, used to cap the apex. Defaults to the
    /// liftoff height.
    pub fn set_stance_height(&mut self, height: Option<f64>) {
        self.stance_height = height;
    }

    /// Replan toward `footstep` on the next tick, landing `remaining_time`
    /// seconds from now.
    pub fn replan(&mut self, footstep: Footstep, remaining_time: f64, continuous: bool) {
        self.footstep = Some(footstep.clone());
        self.pending_replan = Some(PendingReplan {
            footstep,
            remaining_time,
            continuous,
        });
    }

    /// Ask to finish the swing `factor` times faster. Requests at or below
    /// the configured threshold, or below the current factor, are ignored.
    /// Returns the remaining swing time at the resulting factor.
    pub fn request_speed_up(&mut self, factor: f64) -> f64 {
        if self.config.allow_speed_up
            && factor > self.config.speed_up_factor_threshold
            && factor > self.speed_up_factor
        {
            let accepted = factor.clamp(self.speed_up_factor, self.max_speed_up_factor);
            if accepted > self.speed_up_factor {
                tracing::debug!(
                    side = %self.feedback.side,
                    requested = factor,
                    accepted,
                    "swing speed-up"
                );
            }
            self.speed_up_factor = accepted;
        }
        self.remaining_time()
    }

    /// Real time left until the planned touchdown, zero in the tail.
    #[must_use]
    pub fn remaining_time(&self) -> f64 {
        self.trajectory.as_ref().map_or(0.0, |trajectory| {
            ((trajectory.end_time() - self.swing_time) / self.speed_up_factor).max(0.0)
        })
    }

    #[must_use]
    pub const fn footstep(&self) -> Option<&Footstep> {
        self.footstep.as_ref()
    }

    #[must_use]
    pub const fn swing_duration(&self) -> f64 {
        self.swing_duration
    }

    #[must_use]
    pub const fn speed_up_factor(&self) -> f64 {
        self.speed_up_factor
    }

    #[must_use]
    pub const fn max_speed_up_factor(&self) -> f64 {
        self.max_speed_up_factor
    }

    /// Trajectory time since liftoff, dilated by the speed-up factor.
    #[must_use]
    pub const fn swing_time(&self) -> f64 {
        self.swing_time
    }

    #[must_use]
    pub const fn trajectory(&self) -> Option<&SwingTrajectory> {
        self.trajectory.as_ref()
    }

    /// Desired control-point sample of the last tick, after corrections.
    #[must_use]
    pub const fn desired(&self) -> &PoseSample {
        &self.desired
    }

    #[must_use]
    pub fn is_in_touchdown_tail(&self) -> bool {
        self.trajectory
            .as_ref()
            .is_some_and(|trajectory| trajectory.is_in_touchdown_tail(self.swing_time))
    }

    #[must_use]
    pub const fn control_offset(&self) -> &Vector3<f64> {
        &self.control_offset
    }

    /// Desired sole origin implied by the control-point target.
    #[must_use]
    pub fn desired_sole_position(&self) -> Point3<f64> {
        self.desired.position() - self.desired.pose.rotation * self.control_offset
    }

    fn plan_context(&self, fallback_height: f64) -> SwingPlanContext<'_> {
        SwingPlanContext {
            config: &self.config,
            control_offset: self.control_offset,
            stance_height: self.stance_height.unwrap_or(fallback_height),
        }
    }

    /// Measured pose and twist of the control point.
    fn measured_control_point(&self, ctx: &StateContext<'_>) -> PoseSample {
        let sole = &ctx.input.sole_pose;
        let lever = sole.rotation * self.control_offset;
        let mut sample = PoseSample::at_rest(Isometry3::from_parts(
            Translation3::from(sole.translation.vector + lever),
            sole.rotation,
        ));
        sample.linear_velocity = ctx.input.linear_velocity + ctx.input.angular_velocity.cross(&lever);
        sample.angular_velocity = ctx.input.angular_velocity;
        sample
    }

    /// Limit the desired ankle motion near full leg extension and shift the
    /// control point by the same amount.
    fn apply_leg_reach_limit(&mut self, ctx: &mut StateContext<'_>) {
        let rotation = self.desired.pose.rotation;
        let ankle_from_control = rotation * (ctx.ankle_offset() - self.control_offset);
        let mut ankle = self.desired.position() + ankle_from_control;
        let original = ankle;
        let mut velocity = self.desired.linear_velocity;
        let mut acceleration = self.desired.linear_acceleration;
        ctx.avoidance
            .correct_swing_foot_trajectory(&mut ankle, &mut velocity, &mut acceleration);
        self.desired.pose.translation.vector += ankle - original;
        self.desired.linear_velocity = velocity;
        self.desired.linear_acceleration = acceleration;
    }
}

impl FootControlState for SwingState {
    fn constraint_type(&self) -> ConstraintType {
        ConstraintType::Swing
    }

    fn on_enter(&mut self, ctx: &mut StateContext<'_>) {
        self.swing_time = 0.0;
        self.last_time_in_state = 0.0;
        self.speed_up_factor = 1.0;
        self.pending_replan = None;
        self.max_speed_up_factor = if self.swing_duration.is_finite() {
            (self.swing_duration / self.config.min_swing_time_for_disturbance_recovery).max(1.0)
        } else {
            1.0
        };
        ctx.avoidance.reset_swing_parameters();
        ctx.avoidance.set_check_velocity(true);

        let start = self.measured_control_point(ctx);
        self.trajectory = self.footstep.as_ref().map(|footstep| {
            let context = self.plan_context(start.position().z);
            SwingTrajectory::plan(0.0, &start, footstep, self.swing_duration, &context)
        });
        if self.trajectory.is_none() {
            tracing::warn!(side = %ctx.side, "swing entered without a footstep, holding liftoff pose");
        }
        self.desired = PoseSample::at_rest(start.pose);
        self.feedback.gains = ctx.config.gains.swing;
        self.feedback.weight = ctx.config.gains.swing_weight;
        self.feedback.selection = SelectionMatrix6::all();
        self.feedback.control_point_offset = self.control_offset;
    }

    fn on_tick(&mut self, ctx: &mut StateContext<'_>) {
        self.swing_time += (ctx.time_in_state - self.last_time_in_state).max(0.0) * self.speed_up_factor;
        self.last_time_in_state = ctx.time_in_state;

        if let Some(pending) = self.pending_replan.take() {
            let fallback = ctx.input.sole_pose.translation.vector.z;
            let end_time = self.swing_time + pending.remaining_time * self.speed_up_factor;
            let context = SwingPlanContext {
                config: &self.config,
                control_offset: self.control_offset,
                stance_height: self.stance_height.unwrap_or(fallback),
            };
            match self.trajectory.as_mut() {
                Some(trajectory) => {
                    trajectory.replan(self.swing_time, &pending.footstep, end_time, &context, pending.continuous);
                }
                None => {
                    let start = self.desired;
                    self.trajectory = Some(SwingTrajectory::plan(
                        self.swing_time,
                        &start,
                        &pending.footstep,
                        end_time,
                        &context,
                    ));
                }
            }
        }

        if let Some(trajectory) = &self.trajectory {
            self.desired = trajectory.sample(self.swing_time);
            self.desired.scale_rates(self.speed_up_factor);
        }
        self.apply_leg_reach_limit(ctx);

        let desired = self.desired;
        self.feedback.desired_pose = desired.pose;
        self.feedback.desired_linear_velocity = desired.linear_velocity;
        self.feedback.desired_angular_velocity = desired.angular_velocity;
        self.feedback.feed_forward_linear_acceleration = desired.linear_acceleration;
        self.feedback.feed_forward_angular_acceleration = desired.angular_acceleration;
    }

    fn on_exit(&mut self, ctx: &mut StateContext<'_>) {
        self.feedback.invalidate();
        self.pending_replan = None;
        self.speed_up_factor = 1.0;
        self.stance_height = None;
        ctx.avoidance.set_check_velocity(false);
    }

    fn feedback_command(&self) -> Option<&SpatialFeedbackCommand> {
        Some(&self.feedback)
    }

    fn acceleration_command(&self) -> Option<&SpatialAccelerationCommand> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::test_support::Harness;
    use approx::assert_relative_eq;

    fn harness() -> Harness {
        let mut config = FootControlConfig::default();
        config.leg.use_swing_singularity_avoidance = false;
        Harness::with_config(config)
    }

    fn footstep(x: f64) -> Footstep {
        Footstep::new(RobotSide::Left, Isometry3::translation(x, 0.1, 0.0))
    }

    #[test]
    fn reaches_footstep_at_swing_duration() {
        let mut harness = harness();
        harness.input.sole_pose = Isometry3::translation(0.0, 0.1, 0.0);
        let mut state = SwingState::new(RobotSide::Left, &harness.config);
        state.set_footstep(footstep(0.3), 0.6);
        harness.run(&mut state, 0.6);

        let feedback = state.feedback_command().unwrap();
        assert_relative_eq!(feedback.desired_position().x, 0.3, epsilon = 1e-9);
        assert_relative_eq!(feedback.desired_position().z, 0.0, epsilon = 1e-9);
        assert!(state.acceleration_command().is_none());
    }

    #[test]
    fn lifts_above_ground_mid_swing() {
        let mut harness = harness();
        let mut state = SwingState::new(RobotSide::Left, &harness.config);
        state.set_footstep(footstep(0.3), 0.6);
        harness.run(&mut state, 0.3);
        assert!(state.desired().position().z > 0.05);
    }

    #[test]
    fn speed_up_is_clamped_to_minimum_swing_time() {
        let mut harness = harness();
        let mut state = SwingState::new(RobotSide::Left, &harness.config);
        state.set_footstep(footstep(0.3), 0.6);
        harness.run(&mut state, 0.2);

        // 0.6 s swing with a 0.3 s floor caps the factor at 2.
        let remaining = state.request_speed_up(5.0);
        assert_relative_eq!(state.speed_up_factor(), 2.0);
        assert_relative_eq!(remaining, 0.2, epsilon = 1e-9);
    }

    #[test]
    fn small_or_slower_speed_up_is_ignored() {
        let mut harness = harness();
        let mut state = SwingState::new(RobotSide::Left, &harness.config);
        state.set_footstep(footstep(0.3), 0.6);
        harness.run(&mut state, 0.2);

        state.request_speed_up(1.05);
        assert_relative_eq!(state.speed_up_factor(), 1.0);
        state.request_speed_up(1.5);
        state.request_speed_up(1.3);
        assert_relative_eq!(state.speed_up_factor(), 1.5);
    }

    #[test]
    fn speed_up_lands_early() {
        let mut harness = harness();
        let mut state = SwingState::new(RobotSide::Left, &harness.config);
        state.set_footstep(footstep(0.3), 0.6);
        harness.time_in_state = 0.0;
        state.on_enter(&mut harness.ctx());
        state.on_tick(&mut harness.ctx());
        state.request_speed_up(2.0);
        let dt = harness.config.dt();
        for k in 1..=75 {
            harness.time_in_state = f64::from(k) * dt;
            state.on_tick(&mut harness.ctx());
        }
        assert_relative_eq!(state.swing_time(), 0.6, epsilon = 1e-9);
        assert_relative_eq!(state.desired().position().x, 0.3, epsilon = 1e-9);
    }

    #[test]
    fn replan_applies_on_next_tick_without_jump() {
        let mut harness = harness();
        let mut state = SwingState::new(RobotSide::Left, &harness.config);
        state.set_footstep(footstep(0.3), 0.6);
        harness.run(&mut state, 0.2);
        let before = state.desired().position();

        state.replan(footstep(0.4), 0.4, true);
        let dt = harness.config.dt();
        harness.time_in_state += dt;
        state.on_tick(&mut harness.ctx());
        assert!((state.desired().position() - before).norm() < 0.02);

        harness.time_in_state += 0.4;
        state.on_tick(&mut harness.ctx());
        assert_relative_eq!(state.desired().position().x, 0.4, epsilon = 1e-9);
    }

    #[test]
    fn missing_footstep_holds_liftoff() {
        let mut harness = harness();
        harness.input.sole_pose = Isometry3::translation(0.1, 0.2, 0.0);
        let mut state = SwingState::new(RobotSide::Left, &harness.config);
        harness.run(&mut state, 0.1);
        assert!(state.trajectory().is_none());
        assert_relative_eq!(state.desired().position().x, 0.1);
        assert_relative_eq!(state.desired().position().y, 0.2);
    }

    #[test]
    fn toe_control_point_offsets_target() {
        let mut config = FootControlConfig::default();
        config.leg.use_swing_singularity_avoidance = false;
        config.swing.control_toe = true;
        let mut harness = Harness::with_config(config);
        let mut state = SwingState::new(RobotSide::Left, &harness.config);
        state.set_footstep(footstep(0.3), 0.6);
        harness.run(&mut state, 0.6);

        let feedback = state.feedback_command().unwrap();
        assert_relative_eq!(feedback.desired_position().x, 0.46, epsilon = 1e-9);
        assert_relative_eq!(state.desired_sole_position().x, 0.3, epsilon = 1e-9);
    }

    #[test]
    fn exit_invalidates_feedback() {
        let mut harness = harness();
        let mut state = SwingState::new(RobotSide::Left, &harness.config);
        state.set_footstep(footstep(0.3), 0.6);
        harness.run(&mut state, 0.1);
        state.on_exit(&mut harness.ctx());
        assert!(state.feedback_command().unwrap().desired_linear_velocity.x.is_nan());
    }
}
