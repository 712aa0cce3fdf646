use clankers_core::config::FootControlConfig;
use clankers_core::types::{
    ConstraintType, RobotSide, SelectionMatrix6, SpatialAccelerationCommand, SpatialFeedbackCommand,
};
use nalgebra::{Isometry3, Point2, Translation3, UnitQuaternion, Vector2, Vector3};

use super::{heading, pitch_in_heading_frame, FootControlState, StateContext};
use crate::geometry::extreme_point_indices;
use crate::trajectory::HermiteSegment;

/// Foot landing on its toe or heel edge and rolling down to flat.
///
/// The initial pitch rate is chosen so the ankle moves along the rotation
/// tangent at the touchdown speed, then a cubic ramps pitch and rate to zero.
#[derive(Debug, Clone)]
pub struct TouchdownState {
    kind: ConstraintType,
    feedback: SpatialFeedbackCommand,
    acceleration: SpatialAccelerationCommand,
    touchdown_angle: f64,
    duration: f64,
    forward_offset: f64,
    backward_offset: f64,
    ankle_height: f64,
    touchdown_velocity: Vector3<f64>,
    edge_midpoint: Point2<f64>,
    edge_in_world: Vector3<f64>,
    heading: UnitQuaternion<f64>,
    pitch_curve: Option<HermiteSegment>,
    initial_pitch: f64,
    initial_pitch_rate: f64,
    elapsed: f64,
}

impl TouchdownState {
    /// `kind` is [`ConstraintType::ToesTouchdown`] or
    /// [`ConstraintType::HeelTouchdown`].
    #[must_use]
    pub fn new(side: RobotSide, kind: ConstraintType, config: &FootControlConfig) -> Self {
        let mut feedback = SpatialFeedbackCommand::new(side, config.gains.touchdown, config.gains.support_weight);
        feedback.invalidate();
        feedback.selection = SelectionMatrix6::all()
            .with_linear(0, false)
            .with_linear(1, false)
            .with_linear(2, false);
        let touchdown_angle = if kind == ConstraintType::HeelTouchdown {
            config.touchdown.heel_touchdown_angle
        } else {
            config.touchdown.toes_touchdown_angle
        };
        Self {
            kind,
            feedback,
            acceleration: SpatialAccelerationCommand::zero(side).with_selection(SelectionMatrix6::linear_only()),
            touchdown_angle,
            duration: config.touchdown.duration,
            forward_offset: config.foot.forward_offset(),
            backward_offset: config.foot.backward_offset(),
            ankle_height: config.foot.ankle_height,
            touchdown_velocity: config.swing.touchdown_velocity(),
            edge_midpoint: Point2::origin(),
            edge_in_world: Vector3::zeros(),
            heading: UnitQuaternion::identity(),
            pitch_curve: None,
            initial_pitch: f64::NAN,
            initial_pitch_rate: f64::NAN,
            elapsed: 0.0,
        }
    }

    /// Nominal pitch at first contact for this edge.
    #[must_use]
    pub const fn touchdown_initial_angle(&self) -> f64 {
        self.touchdown_angle
    }

    /// Pitch measured on entry.
    #[must_use]
    pub const fn initial_pitch(&self) -> f64 {
        self.initial_pitch
    }

    #[must_use]
    pub const fn initial_pitch_rate(&self) -> f64 {
        self.initial_pitch_rate
    }

    /// The foot has rolled down to flat.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.pitch_curve.is_some() && self.elapsed >= self.duration
    }

    /// Contact edge midpoint, sole frame.
    #[must_use]
    pub const fn edge_midpoint(&self) -> Point2<f64> {
        self.edge_midpoint
    }

    /// Pitch rate giving a tangential first contact at `pitch`: the ankle,
    /// rotating about the edge, moves at the touchdown velocity.
    #[must_use]
    pub fn matching_pitch_rate(&self, pitch: f64) -> f64 {
        let edge_to_ankle = if self.kind == ConstraintType::HeelTouchdown {
            Vector3::new(self.backward_offset, 0.0, self.ankle_height)
        } else {
            Vector3::new(-self.forward_offset, 0.0, self.ankle_height)
        };
        let lever = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), pitch) * edge_to_ankle;
        let length_squared = lever.norm_squared();
        if length_squared < f64::EPSILON {
            return 0.0;
        }
        self.touchdown_velocity.dot(&Vector3::y().cross(&lever)) / length_squared
    }
}

impl FootControlState for TouchdownState {
    fn constraint_type(&self) -> ConstraintType {
        self.kind
    }

    fn on_enter(&mut self, ctx: &mut StateContext<'_>) {
        let direction = if self.kind == ConstraintType::HeelTouchdown {
            -Vector2::x()
        } else {
            Vector2::x()
        };
        let nominal = ctx.contact.nominal_points();
        let edge = extreme_point_indices(nominal, &direction, 2);
        self.edge_midpoint = match edge.as_slice() {
            [a, b] => nalgebra::center(&nominal[*a], &nominal[*b]),
            [a] => nominal[*a],
            _ => Point2::origin(),
        };

        let sole = &ctx.input.sole_pose;
        self.heading = heading(&sole.rotation);
        self.initial_pitch = pitch_in_heading_frame(&sole.rotation);
        self.initial_pitch_rate = self.matching_pitch_rate(self.initial_pitch);
        let offset = Vector3::new(self.edge_midpoint.x, self.edge_midpoint.y, 0.0);
        self.edge_in_world = sole.translation.vector + sole.rotation * offset;
        self.pitch_curve = Some(HermiteSegment::new(
            0.0,
            self.duration,
            Vector3::new(self.initial_pitch, 0.0, 0.0),
            Vector3::new(self.initial_pitch_rate, 0.0, 0.0),
            Vector3::zeros(),
            Vector3::zeros(),
        ));
        self.elapsed = 0.0;

        self.feedback.gains = ctx.config.gains.touchdown;
        self.feedback.control_point_offset = offset;
        self.acceleration.control_point_offset = offset;
        tracing::debug!(
            side = %ctx.side,
            kind = %self.kind,
            pitch = self.initial_pitch,
            pitch_rate = self.initial_pitch_rate,
            "edge touchdown"
        );
    }

    fn on_tick(&mut self, ctx: &mut StateContext<'_>) {
        self.elapsed = ctx.time_in_state;
        let Some(curve) = &self.pitch_curve else {
            return;
        };
        let (pitch, rate, acceleration) = curve.sample(self.elapsed);
        let orientation = self.heading * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), pitch.x);

        self.feedback.desired_pose = Isometry3::from_parts(Translation3::from(self.edge_in_world), orientation);
        self.feedback.desired_linear_velocity = Vector3::zeros();
        self.feedback.desired_angular_velocity = self.heading * Vector3::new(0.0, rate.x, 0.0);
        self.feedback.feed_forward_linear_acceleration = Vector3::zeros();
        self.feedback.feed_forward_angular_acceleration = self.heading * Vector3::new(0.0, acceleration.x, 0.0);
    }

    fn on_exit(&mut self, _ctx: &mut StateContext<'_>) {
        self.feedback.invalidate();
        self.pitch_curve = None;
        self.initial_pitch = f64::NAN;
        self.initial_pitch_rate = f64::NAN;
    }

    fn feedback_command(&self) -> Option<&SpatialFeedbackCommand> {
        Some(&self.feedback)
    }

    fn acceleration_command(&self) -> Option<&SpatialAccelerationCommand> {
        Some(&self.acceleration)
    }
}
