use clankers_core::config::FootControlConfig;
use clankers_core::types::{
    ConstraintType, RobotSide, SelectionMatrix6, SpatialAccelerationCommand, SpatialFeedbackCommand,
};
use nalgebra::{Isometry3, Point2, UnitQuaternion, Vector2, Vector3};

use super::{FootControlState, StateContext};
use crate::foothold::FootholdMeasurement;
use crate::geometry::ConvexPolygon2;

/// Barely loaded or edge-loaded foot: track the pose frozen on entry while
/// the vertical direction stays rigidly constrained.
#[derive(Debug, Clone)]
pub struct HoldPositionState {
    feedback: SpatialFeedbackCommand,
    acceleration: SpatialAccelerationCommand,
    held_pose: Isometry3<f64>,
    cop_on_edge_epsilon: f64,
    is_correcting: bool,
}

impl HoldPositionState {
    #[must_use]
    pub fn new(side: RobotSide, config: &FootControlConfig) -> Self {
        let mut feedback = SpatialFeedbackCommand::new(side, config.gains.hold, config.gains.support_weight);
        feedback.invalidate();
        Self {
            feedback,
            acceleration: SpatialAccelerationCommand::zero(side)
                .with_selection(SelectionMatrix6::world_linear_z_only()),
            held_pose: Isometry3::identity(),
            cop_on_edge_epsilon: config.transitions.cop_on_edge_epsilon,
            is_correcting: false,
        }
    }

    /// Pose frozen when the state was entered.
    #[must_use]
    pub const fn held_pose(&self) -> &Isometry3<f64> {
        &self.held_pose
    }

    /// The last tick removed part of the desired rotation.
    #[must_use]
    pub const fn is_correcting(&self) -> bool {
        self.is_correcting
    }
}

impl FootControlState for HoldPositionState {
    fn constraint_type(&self) -> ConstraintType {
        ConstraintType::HoldPosition
    }

    fn on_enter(&mut self, ctx: &mut StateContext<'_>) {
        self.held_pose = ctx.input.sole_pose;
        self.feedback.gains = ctx.config.gains.hold;
        self.feedback.weight = ctx.config.gains.support_weight;
        self.feedback.set_hold(self.held_pose);
    }

    fn on_tick(&mut self, ctx: &mut StateContext<'_>) {
        let input = ctx.input;
        let mut polygon = ctx.contact.support_polygon();
        if let (Some(measured_cop), Some(desired_cop)) = (input.measured_cop, input.desired_cop) {
            let measurement = FootholdMeasurement {
                sole_pose: &input.sole_pose,
                angular_velocity: &input.angular_velocity,
                measured_cop,
                desired_cop,
            };
            if ctx.foothold.update(&measurement, ctx.contact) > 0 {
                polygon = ctx.contact.support_polygon();
            }
        }

        let current = input.sole_pose.rotation;
        let (orientation, corrected) = match input.measured_cop {
            Some(cop) => smart_hold_orientation(
                &current,
                &self.held_pose.rotation,
                &polygon,
                &cop,
                self.cop_on_edge_epsilon,
            ),
            None => (self.held_pose.rotation, false),
        };
        self.is_correcting = corrected;

        let mut desired = self.held_pose;
        desired.rotation = orientation;
        self.feedback.set_hold(desired);
        self.acceleration = SpatialAccelerationCommand::zero(ctx.side)
            .with_selection(SelectionMatrix6::world_linear_z_only());
    }

    fn on_exit(&mut self, _ctx: &mut StateContext<'_>) {
        self.feedback.invalidate();
        self.is_correcting = false;
    }

    fn feedback_command(&self) -> Option<&SpatialFeedbackCommand> {
        Some(&self.feedback)
    }

    fn acceleration_command(&self) -> Option<&SpatialAccelerationCommand> {
        Some(&self.acceleration)
    }
}

/// Drop the part of the desired rotation that would tip the foot further
/// over the edge it is resting on.
///
/// Only active when `measured_cop` (sole frame) lies outside `polygon` shrunk
/// by `epsilon`. A rotation about the closest edge is kept when it lowers the
/// polygon centroid toward the ground and removed otherwise. Returns the
/// desired orientation and whether a component was removed.
#[must_use]
pub fn smart_hold_orientation(
    current: &UnitQuaternion<f64>,
    desired: &UnitQuaternion<f64>,
    polygon: &ConvexPolygon2,
    measured_cop: &Point2<f64>,
    epsilon: f64,
) -> (UnitQuaternion<f64>, bool) {
    if polygon.is_empty() || polygon.is_point_inside(measured_cop, epsilon) {
        return (*desired, false);
    }
    let Some(edge) = polygon.closest_edge(measured_cop) else {
        return (*desired, false);
    };
    let Some(direction) = (edge.second - edge.first).try_normalize(f64::EPSILON) else {
        return (*desired, false);
    };

    let mut error = (current.inverse() * desired).scaled_axis();
    let about_edge = Vector2::new(error.x, error.y).dot(&direction);
    let to_centroid = polygon.centroid() - edge.closest_point(measured_cop);
    // Vertical motion of the centroid side under a rotation about the edge.
    let centroid_lift = about_edge * direction.perp(&to_centroid);
    if centroid_lift < 0.0 {
        return (*desired, false);
    }
    error -= Vector3::new(direction.x, direction.y, 0.0) * about_edge;
    (current * UnitQuaternion::from_scaled_axis(error), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::test_support::Harness;
    use approx::assert_relative_eq;

    fn foot() -> ConvexPolygon2 {
        ConvexPolygon2::from_points(&[
            Point2::new(0.16, 0.055),
            Point2::new(0.16, -0.055),
            Point2::new(-0.08, 0.055),
            Point2::new(-0.08, -0.055),
        ])
    }

    #[test]
    fn cop_inside_keeps_desired() {
        let desired = UnitQuaternion::from_euler_angles(0.0, 0.1, 0.0);
        let (out, corrected) = smart_hold_orientation(
            &UnitQuaternion::identity(),
            &desired,
            &foot(),
            &Point2::new(0.0, 0.0),
            5e-3,
        );
        assert!(!corrected);
        assert_relative_eq!(out.angle_to(&desired), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn rotation_toward_flat_ground_is_kept() {
        // On the toe edge; pitching toes up lowers the heel side.
        let desired = UnitQuaternion::from_euler_angles(0.0, -0.1, 0.0);
        let (out, corrected) = smart_hold_orientation(
            &UnitQuaternion::identity(),
            &desired,
            &foot(),
            &Point2::new(0.16, 0.0),
            5e-3,
        );
        assert!(!corrected);
        assert_relative_eq!(out.angle_to(&desired), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn rotation_away_from_ground_is_subtracted() {
        let desired = UnitQuaternion::from_euler_angles(0.05, 0.1, 0.0);
        let (out, corrected) = smart_hold_orientation(
            &UnitQuaternion::identity(),
            &desired,
            &foot(),
            &Point2::new(0.16, 0.0),
            5e-3,
        );
        assert!(corrected);
        let remaining = out.scaled_axis();
        assert_relative_eq!(remaining.y, 0.0, epsilon = 1e-12);
        assert!(remaining.x.abs() > 0.04);
    }

    #[test]
    fn heel_edge_mirrors_toe_edge() {
        let toes_down = UnitQuaternion::from_euler_angles(0.0, 0.1, 0.0);
        let (_, corrected) = smart_hold_orientation(
            &UnitQuaternion::identity(),
            &toes_down,
            &foot(),
            &Point2::new(-0.08, 0.0),
            5e-3,
        );
        assert!(!corrected);

        let toes_up = UnitQuaternion::from_euler_angles(0.0, -0.1, 0.0);
        let (_, corrected) = smart_hold_orientation(
            &UnitQuaternion::identity(),
            &toes_up,
            &foot(),
            &Point2::new(-0.08, 0.0),
            5e-3,
        );
        assert!(corrected);
    }

    #[test]
    fn freezes_entry_pose() {
        let mut harness = Harness::new();
        harness.input.sole_pose = Isometry3::translation(0.3, 0.1, 0.0);
        let mut state = HoldPositionState::new(RobotSide::Left, &harness.config);
        harness.time_in_state = 0.0;
        state.on_enter(&mut harness.ctx());
        harness.input.sole_pose = Isometry3::translation(0.35, 0.1, 0.02);
        state.on_tick(&mut harness.ctx());

        let feedback = state.feedback_command().unwrap();
        assert_relative_eq!(feedback.desired_position().x, 0.3);
        assert_relative_eq!(feedback.desired_position().z, 0.0);
        assert_eq!(feedback.desired_linear_velocity, Vector3::zeros());
        let accel = state.acceleration_command().unwrap();
        assert_eq!(accel.selection, SelectionMatrix6::world_linear_z_only());
    }

    #[test]
    fn exit_invalidates_targets() {
        let mut harness = Harness::new();
        let mut state = HoldPositionState::new(RobotSide::Left, &harness.config);
        harness.run(&mut state, 0.02);
        state.on_exit(&mut harness.ctx());
        assert!(state.feedback_command().unwrap().desired_position().x.is_nan());
    }
}
