use clankers_core::config::FootControlConfig;
use clankers_core::types::{
    ConstraintType, FootWaypoint, RobotSide, SpatialAccelerationCommand, SpatialFeedbackCommand,
};
use nalgebra::Isometry3;

use super::{FootControlState, StateContext};
use crate::trajectory::{PoseSample, PoseTrajectory};

/// Unloaded foot moved through externally supplied timed waypoints. Once
/// the last waypoint is reached the final pose is held.
#[derive(Debug, Clone)]
pub struct MoveViaWaypointsState {
    feedback: SpatialFeedbackCommand,
    waypoints: Vec<FootWaypoint>,
    trajectory: Option<PoseTrajectory>,
    desired: PoseSample,
    stopped: bool,
    time_in_trajectory: f64,
}

impl MoveViaWaypointsState {
    #[must_use]
    pub fn new(side: RobotSide, config: &FootControlConfig) -> Self {
        let mut feedback = SpatialFeedbackCommand::new(side, config.gains.swing, config.gains.swing_weight);
        feedback.invalidate();
        Self {
            feedback,
            waypoints: Vec::new(),
            trajectory: None,
            desired: PoseSample::at_rest(Isometry3::identity()),
            stopped: false,
            time_in_trajectory: 0.0,
        }
    }

    /// Waypoints for the next activation, times relative to entry.
    pub fn set_waypoints(&mut self, waypoints: Vec<FootWaypoint>) {
        self.waypoints = waypoints;
    }

    /// Freeze the current desired pose until the state is left.
    pub fn request_stop(&mut self) {
        if !self.stopped {
            tracing::debug!(side = %self.feedback.side, "foot trajectory stopped");
        }
        self.stopped = true;
    }

    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// The last waypoint time has passed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        !self
            .trajectory
            .as_ref()
            .is_some_and(|trajectory| self.time_in_trajectory < trajectory.end_time())
    }

    #[must_use]
    pub const fn desired(&self) -> &PoseSample {
        &self.desired
    }
}

impl FootControlState for MoveViaWaypointsState {
    fn constraint_type(&self) -> ConstraintType {
        ConstraintType::MoveViaWaypoints
    }

    fn on_enter(&mut self, ctx: &mut StateContext<'_>) {
        self.stopped = false;
        self.time_in_trajectory = 0.0;
        ctx.avoidance.reset_swing_parameters();

        let mut start = PoseSample::at_rest(ctx.input.sole_pose);
        start.linear_velocity = ctx.input.linear_velocity;
        start.angular_velocity = ctx.input.angular_velocity;
        self.desired = PoseSample::at_rest(start.pose);
        self.trajectory = (!self.waypoints.is_empty())
            .then(|| PoseTrajectory::through_waypoints(0.0, &start, &self.waypoints));

        self.feedback.gains = ctx.config.gains.swing;
        self.feedback.weight = ctx.config.gains.swing_weight;
    }

    fn on_tick(&mut self, ctx: &mut StateContext<'_>) {
        self.time_in_trajectory = ctx.time_in_state;
        if self.stopped {
            self.desired = PoseSample::at_rest(self.desired.pose);
        } else if let Some(trajectory) = &self.trajectory {
            self.desired = trajectory.sample(self.time_in_trajectory);

            let mut ankle = self.desired.position() + self.desired.pose.rotation * ctx.ankle_offset();
            let original = ankle;
            ctx.avoidance.correct_swing_foot_trajectory(
                &mut ankle,
                &mut self.desired.linear_velocity,
                &mut self.desired.linear_acceleration,
            );
            self.desired.pose.translation.vector += ankle - original;
        }

        let desired = self.desired;
        self.feedback.desired_pose = desired.pose;
        self.feedback.desired_linear_velocity = desired.linear_velocity;
        self.feedback.desired_angular_velocity = desired.angular_velocity;
        self.feedback.feed_forward_linear_acceleration = desired.linear_acceleration;
        self.feedback.feed_forward_angular_acceleration = desired.angular_acceleration;
    }

    fn on_exit(&mut self, _ctx: &mut StateContext<'_>) {
        self.feedback.invalidate();
        self.waypoints.clear();
        self.trajectory = None;
        self.stopped = false;
    }

    fn feedback_command(&self) -> Option<&SpatialFeedbackCommand> {
        Some(&self.feedback)
    }

    fn acceleration_command(&self) -> Option<&SpatialAccelerationCommand> {
        None
    }
}
