//! Swing and waypoint trajectories.
//!
//! Positions are piecewise cubic Hermite curves in world frame. Orientations
//! are Hermite curves on the rotation vector relative to each segment's start
//! orientation, which keeps the start angular velocity as a boundary
//! condition. Angular rates are first-order in the segment rotation.

use clankers_core::config::SwingStateConfig;
use clankers_core::types::{FootWaypoint, Footstep, TrajectoryType};
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};

/// Height change above which a default swing is shaped for clearance (m).
const STEP_ON_OR_OFF_HEIGHT: f64 = 0.05;

/// Horizontal waypoint placement for clearance swings.
const OBSTACLE_CLEARANCE_PROPORTIONS: [f64; 2] = [0.05, 0.95];

/// Swing-time fractions at which the two generated waypoints are reached.
const WAYPOINT_TIME_FRACTIONS: [f64; 2] = [1.0 / 3.0, 2.0 / 3.0];

// ---------------------------------------------------------------------------
// Samples and knots
// ---------------------------------------------------------------------------

/// Desired pose and derivatives at one instant, world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    pub pose: Isometry3<f64>,
    pub linear_velocity: Vector3<f64>,
    pub angular_velocity: Vector3<f64>,
    pub linear_acceleration: Vector3<f64>,
    pub angular_acceleration: Vector3<f64>,
}

impl PoseSample {
    #[must_use]
    pub fn at_rest(pose: Isometry3<f64>) -> Self {
        Self {
            pose,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            linear_acceleration: Vector3::zeros(),
            angular_acceleration: Vector3::zeros(),
        }
    }

    #[must_use]
    pub fn position(&self) -> Point3<f64> {
        Point3::from(self.pose.translation.vector)
    }

    /// Time dilation: velocities scale by `factor`, accelerations by its square.
    pub fn scale_rates(&mut self, factor: f64) {
        self.linear_velocity *= factor;
        self.angular_velocity *= factor;
        self.linear_acceleration *= factor * factor;
        self.angular_acceleration *= factor * factor;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionKnot {
    pub time: f64,
    pub position: Point3<f64>,
    pub velocity: Vector3<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationKnot {
    pub time: f64,
    pub orientation: UnitQuaternion<f64>,
    pub angular_velocity: Vector3<f64>,
}

// ---------------------------------------------------------------------------
// HermiteSegment
// ---------------------------------------------------------------------------

/// Cubic Hermite curve between two timed knots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HermiteSegment {
    t0: f64,
    t1: f64,
    p0: Vector3<f64>,
    v0: Vector3<f64>,
    p1: Vector3<f64>,
    v1: Vector3<f64>,
}

impl HermiteSegment {
    #[must_use]
    pub const fn new(
        t0: f64,
        t1: f64,
        p0: Vector3<f64>,
        v0: Vector3<f64>,
        p1: Vector3<f64>,
        v1: Vector3<f64>,
    ) -> Self {
        Self { t0, t1, p0, v0, p1, v1 }
    }

    #[must_use]
    pub const fn start_time(&self) -> f64 {
        self.t0
    }

    #[must_use]
    pub const fn end_time(&self) -> f64 {
        self.t1
    }

    /// Value, first and second time derivative. Time is clamped to the
    /// segment; outside it the derivatives are zero.
    #[must_use]
    pub fn sample(&self, t: f64) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
        let h = self.t1 - self.t0;
        if h <= 1e-9 || t >= self.t1 {
            return (self.p1, Vector3::zeros(), Vector3::zeros());
        }
        if t <= self.t0 {
            return (self.p0, Vector3::zeros(), Vector3::zeros());
        }
        let s = (t - self.t0) / h;
        let s2 = s * s;
        let s3 = s2 * s;
        let (m0, m1) = (self.v0 * h, self.v1 * h);

        let position = self.p0 * (2.0 * s3 - 3.0 * s2 + 1.0)
            + m0 * (s3 - 2.0 * s2 + s)
            + self.p1 * (-2.0 * s3 + 3.0 * s2)
            + m1 * (s3 - s2);
        let velocity = (self.p0 * (6.0 * s2 - 6.0 * s)
            + m0 * (3.0 * s2 - 4.0 * s + 1.0)
            + self.p1 * (-6.0 * s2 + 6.0 * s)
            + m1 * (3.0 * s2 - 2.0 * s))
            / h;
        let acceleration = (self.p0 * (12.0 * s - 6.0)
            + m0 * (6.0 * s - 4.0)
            + self.p1 * (-12.0 * s + 6.0)
            + m1 * (6.0 * s - 2.0))
            / (h * h);
        (position, velocity, acceleration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OrientationSegment {
    base: UnitQuaternion<f64>,
    rotation: HermiteSegment,
}

impl OrientationSegment {
    fn between(start: &OrientationKnot, end: &OrientationKnot) -> Self {
        let base = start.orientation;
        let delta = (base.inverse() * end.orientation).scaled_axis();
        Self {
            base,
            rotation: HermiteSegment::new(
                start.time,
                end.time,
                Vector3::zeros(),
                base.inverse_transform_vector(&start.angular_velocity),
                delta,
                base.inverse_transform_vector(&end.angular_velocity),
            ),
        }
    }

    fn sample(&self, t: f64) -> (UnitQuaternion<f64>, Vector3<f64>, Vector3<f64>) {
        let (r, rd, rdd) = self.rotation.sample(t);
        (
            self.base * UnitQuaternion::from_scaled_axis(r),
            self.base * rd,
            self.base * rdd,
        )
    }
}

// ---------------------------------------------------------------------------
// PoseTrajectory
// ---------------------------------------------------------------------------

/// Multi-waypoint pose curve. Holds the end pose at rest once finished.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseTrajectory {
    position: Vec<HermiteSegment>,
    orientation: Vec<OrientationSegment>,
}

impl PoseTrajectory {
    /// Knots must be sorted by time. A single knot gives a constant curve.
    #[must_use]
    pub fn new(position_knots: &[PositionKnot], orientation_knots: &[OrientationKnot]) -> Self {
        let position = match position_knots {
            [only] => vec![HermiteSegment::new(
                only.time,
                only.time,
                only.position.coords,
                only.velocity,
                only.position.coords,
                only.velocity,
            )],
            _ => position_knots
                .windows(2)
                .map(|pair| {
                    HermiteSegment::new(
                        pair[0].time,
                        pair[1].time,
                        pair[0].position.coords,
                        pair[0].velocity,
                        pair[1].position.coords,
                        pair[1].velocity,
                    )
                })
                .collect(),
        };
        let orientation = match orientation_knots {
            [only] => vec![OrientationSegment::between(only, only)],
            _ => orientation_knots
                .windows(2)
                .map(|pair| OrientationSegment::between(&pair[0], &pair[1]))
                .collect(),
        };
        Self {
            position,
            orientation,
        }
    }

    /// Build from timed waypoints, starting at `start` at time `start_time`.
    /// Waypoint times are relative to `start_time`.
    #[must_use]
    pub fn through_waypoints(start_time: f64, start: &PoseSample, waypoints: &[FootWaypoint]) -> Self {
        let mut positions = vec![PositionKnot {
            time: start_time,
            position: start.position(),
            velocity: start.linear_velocity,
        }];
        let mut orientations = vec![OrientationKnot {
            time: start_time,
            orientation: start.pose.rotation,
            angular_velocity: start.angular_velocity,
        }];
        for waypoint in waypoints.iter().filter(|w| w.time > 0.0) {
            positions.push(PositionKnot {
                time: start_time + waypoint.time,
                position: waypoint.position,
                velocity: waypoint.linear_velocity,
            });
            orientations.push(OrientationKnot {
                time: start_time + waypoint.time,
                orientation: waypoint.orientation,
                angular_velocity: waypoint.angular_velocity,
            });
        }
        Self::new(&positions, &orientations)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    #[must_use]
    pub fn end_time(&self) -> f64 {
        let position_end = self.position.last().map_or(0.0, HermiteSegment::end_time);
        let orientation_end = self.orientation.last().map_or(0.0, |s| s.rotation.end_time());
        position_end.max(orientation_end)
    }

    #[must_use]
    pub fn sample(&self, t: f64) -> PoseSample {
        let (position, linear_velocity, linear_acceleration) = find_segment(&self.position, t, |s| s)
            .map_or((Vector3::zeros(), Vector3::zeros(), Vector3::zeros()), |s| s.sample(t));
        let (orientation, angular_velocity, angular_acceleration) =
            find_segment(&self.orientation, t, |s| &s.rotation).map_or(
                (UnitQuaternion::identity(), Vector3::zeros(), Vector3::zeros()),
                |s| s.sample(t),
            );
        PoseSample {
            pose: Isometry3::from_parts(Translation3::from(position), orientation),
            linear_velocity,
            angular_velocity,
            linear_acceleration,
            angular_acceleration,
        }
    }
}

fn find_segment<S>(segments: &[S], t: f64, curve: impl Fn(&S) -> &HermiteSegment) -> Option<&S> {
    segments
        .iter()
        .find(|s| t < curve(s).end_time())
        .or_else(|| segments.last())
}

// ---------------------------------------------------------------------------
// SwingTrajectory
// ---------------------------------------------------------------------------

/// Swing curve from liftoff to the footstep, followed by a touchdown tail
/// that keeps moving at the touchdown velocity until contact is detected.
#[derive(Debug, Clone, PartialEq)]
pub struct SwingTrajectory {
    curve: PoseTrajectory,
    liftoff_time: f64,
    liftoff: PoseSample,
    final_pose: Isometry3<f64>,
    end_time: f64,
    touchdown_velocity: Vector3<f64>,
    touchdown_acceleration: Vector3<f64>,
    blend: Option<HermiteSegment>,
}

/// Inputs shared by planning and replanning.
#[derive(Debug, Clone, Copy)]
pub struct SwingPlanContext<'a> {
    pub config: &'a SwingStateConfig,
    /// Controlled point relative to the sole frame.
    pub control_offset: Vector3<f64>,
    /// Sole height of the stance foot, world frame.
    pub stance_height: f64,
}

impl SwingTrajectory {
    /// Plan from `start` at `start_time` to `footstep`, landing at `end_time`.
    #[must_use]
    pub fn plan(
        start_time: f64,
        start: &PoseSample,
        footstep: &Footstep,
        end_time: f64,
        context: &SwingPlanContext<'_>,
    ) -> Self {
        let config = context.config;
        let mut final_pose = footstep.pose;
        final_pose.translation.vector += footstep.pose.rotation * context.control_offset;
        final_pose.translation.vector.z += config.touchdown_height_offset;
        let touchdown_velocity = config.touchdown_velocity();

        let start_position = start.position();
        let end_position = Point3::from(final_pose.translation.vector);
        let mut positions = vec![PositionKnot {
            time: start_time,
            position: start_position,
            velocity: start.linear_velocity,
        }];
        let mut orientations = vec![OrientationKnot {
            time: start_time,
            orientation: start.pose.rotation,
            angular_velocity: start.angular_velocity,
        }];

        if footstep.trajectory_type == TrajectoryType::Waypoints {
            for waypoint in &footstep.swing_waypoints {
                if waypoint.time <= start_time || waypoint.time >= end_time {
                    continue;
                }
                positions.push(PositionKnot {
                    time: waypoint.time,
                    position: waypoint.position,
                    velocity: waypoint.linear_velocity,
                });
                orientations.push(OrientationKnot {
                    time: waypoint.time,
                    orientation: waypoint.orientation,
                    angular_velocity: waypoint.angular_velocity,
                });
            }
        } else {
            let mids = intermediate_waypoints(&start_position, &end_position, footstep, context);
            let times = WAYPOINT_TIME_FRACTIONS.map(|f| start_time + f * (end_time - start_time));
            let (p0, p1, p2, p3) = (start_position, mids[0], mids[1], end_position);
            let horizontal = |v: Vector3<f64>| Vector3::new(v.x, v.y, 0.0);
            positions.push(PositionKnot {
                time: times[0],
                position: p1,
                velocity: horizontal((p2 - p0) / (times[1] - start_time)),
            });
            positions.push(PositionKnot {
                time: times[1],
                position: p2,
                velocity: horizontal((p3 - p1) / (end_time - times[0])),
            });
        }

        positions.push(PositionKnot {
            time: end_time,
            position: end_position,
            velocity: touchdown_velocity,
        });
        orientations.push(OrientationKnot {
            time: end_time,
            orientation: final_pose.rotation,
            angular_velocity: Vector3::zeros(),
        });

        Self {
            curve: PoseTrajectory::new(&positions, &orientations),
            liftoff_time: start_time,
            liftoff: *start,
            final_pose,
            end_time,
            touchdown_velocity,
            touchdown_acceleration: config.touchdown_acceleration(),
            blend: None,
        }
    }

    /// Replan toward `footstep`, landing at `end_time`, without a position
    /// jump at `now`.
    ///
    /// A continuous replan keeps the liftoff-based shape and fades the offset
    /// to the old curve out over the remaining time. Otherwise the curve is
    /// rebuilt from the current desired sample.
    pub fn replan(
        &mut self,
        now: f64,
        footstep: &Footstep,
        end_time: f64,
        context: &SwingPlanContext<'_>,
        continuous: bool,
    ) {
        let current = self.sample(now);
        if !continuous {
            *self = Self::plan(now, &current, footstep, end_time, context);
            return;
        }

        let mut replanned = Self::plan(self.liftoff_time, &self.liftoff, footstep, end_time, context);
        let fresh = replanned.curve.sample(now);
        let gain = context.config.replan_velocity_correction_gain;
        replanned.blend = Some(HermiteSegment::new(
            now,
            end_time,
            current.position() - fresh.position(),
            (current.linear_velocity - fresh.linear_velocity) * gain,
            Vector3::zeros(),
            Vector3::zeros(),
        ));
        let reoriented = PoseTrajectory::new(
            &[],
            &[
                OrientationKnot {
                    time: now,
                    orientation: current.pose.rotation,
                    angular_velocity: current.angular_velocity,
                },
                OrientationKnot {
                    time: end_time,
                    orientation: replanned.final_pose.rotation,
                    angular_velocity: Vector3::zeros(),
                },
            ],
        );
        replanned.curve.orientation = reoriented.orientation;
        *self = replanned;
    }

    #[must_use]
    pub fn sample(&self, t: f64) -> PoseSample {
        if t >= self.end_time {
            let dt = t - self.end_time;
            let mut pose = self.final_pose;
            pose.translation.vector +=
                self.touchdown_velocity * dt + self.touchdown_acceleration * (0.5 * dt * dt);
            return PoseSample {
                pose,
                linear_velocity: self.touchdown_velocity + self.touchdown_acceleration * dt,
                angular_velocity: Vector3::zeros(),
                linear_acceleration: self.touchdown_acceleration,
                angular_acceleration: Vector3::zeros(),
            };
        }

        let mut sample = self.curve.sample(t);
        if let Some(blend) = &self.blend {
            if t >= blend.start_time() {
                let (offset, velocity, acceleration) = blend.sample(t);
                sample.pose.translation.vector += offset;
                sample.linear_velocity += velocity;
                sample.linear_acceleration += acceleration;
            }
        }
        sample
    }

    /// Touchdown pose of the controlled point, world frame.
    #[must_use]
    pub const fn final_pose(&self) -> &Isometry3<f64> {
        &self.final_pose
    }

    #[must_use]
    pub const fn end_time(&self) -> f64 {
        self.end_time
    }

    #[must_use]
    pub fn is_in_touchdown_tail(&self, t: f64) -> bool {
        t >= self.end_time
    }
}

fn intermediate_waypoints(
    start: &Point3<f64>,
    end: &Point3<f64>,
    footstep: &Footstep,
    context: &SwingPlanContext<'_>,
) -> [Point3<f64>; 2] {
    if footstep.trajectory_type == TrajectoryType::Custom {
        if let [first, second] = footstep.custom_position_waypoints.as_slice() {
            return [*first, *second];
        }
    }

    let config = context.config;
    let requested = if footstep.swing_height > 0.0 {
        footstep.swing_height
    } else {
        config.default_swing_height
    };
    let mut height = requested.min(config.max_swing_height);
    let clearance = footstep.trajectory_type == TrajectoryType::ObstacleClearance
        || (end.z - start.z).abs() > STEP_ON_OR_OFF_HEIGHT;
    let proportions = if clearance {
        height += config.obstacle_clearance_margin;
        OBSTACLE_CLEARANCE_PROPORTIONS
    } else {
        config.waypoint_proportions
    };

    let floor = start.z.max(end.z);
    let apex = (floor + height)
        .min(context.stance_height + config.max_swing_height + config.obstacle_clearance_margin)
        .max(floor);
    proportions.map(|p| {
        let xy = start.coords.xy() + (end.coords.xy() - start.coords.xy()) * p;
        Point3::new(xy.x, xy.y, apex)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use clankers_core::types::RobotSide;

    fn config() -> SwingStateConfig {
        SwingStateConfig::default()
    }

    fn context(config: &SwingStateConfig) -> SwingPlanContext<'_> {
        SwingPlanContext {
            config,
            control_offset: Vector3::zeros(),
            stance_height: 0.0,
        }
    }

    fn footstep(x: f64, z: f64) -> Footstep {
        Footstep::new(RobotSide::Left, Isometry3::translation(x, 0.1, z))
    }

    fn liftoff() -> PoseSample {
        PoseSample::at_rest(Isometry3::translation(0.0, 0.1, 0.0))
    }

    #[test]
    fn hermite_matches_boundary_conditions() {
        let seg = HermiteSegment::new(
            1.0,
            3.0,
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(2.0, 1.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
        );
        let (p, v, _) = seg.sample(1.0 + 1e-12);
        assert_relative_eq!(p, Vector3::zeros(), epsilon = 1e-9);
        assert_relative_eq!(v, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-9);
        let (p, v, _) = seg.sample(3.0 - 1e-12);
        assert_relative_eq!(p, Vector3::new(2.0, 1.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(v, Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn hermite_acceleration_is_derivative_of_velocity() {
        let seg = HermiteSegment::new(
            0.0,
            1.0,
            Vector3::zeros(),
            Vector3::new(0.3, 0.0, 0.2),
            Vector3::new(1.0, 0.5, 0.0),
            Vector3::zeros(),
        );
        let h = 1e-6;
        let (_, v_minus, _) = seg.sample(0.4 - h);
        let (_, v_plus, _) = seg.sample(0.4 + h);
        let (_, _, a) = seg.sample(0.4);
        assert_relative_eq!((v_plus - v_minus) / (2.0 * h), a, epsilon = 1e-5);
    }

    #[test]
    fn swing_starts_at_liftoff_and_lands_on_footstep() {
        let config = config();
        let traj = SwingTrajectory::plan(0.0, &liftoff(), &footstep(0.4, 0.0), 0.8, &context(&config));
        assert_relative_eq!(traj.sample(0.0).position(), Point3::new(0.0, 0.1, 0.0), epsilon = 1e-9);
        let end = traj.sample(0.8);
        assert_relative_eq!(end.position(), Point3::new(0.4, 0.1, 0.0), epsilon = 1e-9);
        assert_relative_eq!(end.linear_velocity, config.touchdown_velocity(), epsilon = 1e-9);
    }

    #[test]
    fn apex_reaches_swing_height() {
        let config = config();
        let traj = SwingTrajectory::plan(0.0, &liftoff(), &footstep(0.4, 0.0), 0.9, &context(&config));
        let mid = traj.sample(0.45);
        assert_relative_eq!(mid.position().z, config.default_swing_height, epsilon = 1e-9);
        assert!(mid.position().x > 0.0 && mid.position().x < 0.4);
    }

    #[test]
    fn requested_swing_height_is_capped() {
        let config = config();
        let step = footstep(0.4, 0.0).with_swing_height(5.0);
        let traj = SwingTrajectory::plan(0.0, &liftoff(), &step, 0.9, &context(&config));
        assert_relative_eq!(traj.sample(0.45).position().z, config.max_swing_height, epsilon = 1e-9);
    }

    #[test]
    fn step_up_uses_clearance_shape() {
        let config = config();
        let traj = SwingTrajectory::plan(0.0, &liftoff(), &footstep(0.4, 0.2), 0.9, &context(&config));
        let first_waypoint = traj.sample(0.3);
        assert!(first_waypoint.position().z > 0.2);
        assert!(first_waypoint.position().x < 0.1);
    }

    #[test]
    fn custom_waypoints_are_visited() {
        let config = config();
        let step = footstep(0.4, 0.0).with_custom_waypoints(vec![
            Point3::new(0.1, 0.2, 0.15),
            Point3::new(0.3, 0.2, 0.15),
        ]);
        let traj = SwingTrajectory::plan(0.0, &liftoff(), &step, 0.9, &context(&config));
        assert_relative_eq!(traj.sample(0.3).position(), Point3::new(0.1, 0.2, 0.15), epsilon = 1e-9);
        assert_relative_eq!(traj.sample(0.6).position(), Point3::new(0.3, 0.2, 0.15), epsilon = 1e-9);
    }

    #[test]
    fn timed_waypoints_set_position_and_orientation() {
        let config = config();
        let yaw = UnitQuaternion::from_euler_angles(0.0, 0.0, 0.3);
        let step = footstep(0.4, 0.0).with_swing_waypoints(vec![FootWaypoint::at_rest(
            0.4,
            Point3::new(0.2, 0.1, 0.12),
            yaw,
        )]);
        let traj = SwingTrajectory::plan(0.0, &liftoff(), &step, 0.8, &context(&config));
        let sample = traj.sample(0.4);
        assert_relative_eq!(sample.position(), Point3::new(0.2, 0.1, 0.12), epsilon = 1e-9);
        assert_relative_eq!(sample.pose.rotation.angle_to(&yaw), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn touchdown_tail_keeps_moving() {
        let config = config();
        let traj = SwingTrajectory::plan(0.0, &liftoff(), &footstep(0.4, 0.0), 0.8, &context(&config));
        let tail = traj.sample(0.9);
        let v = config.touchdown_velocity();
        let a = config.touchdown_acceleration();
        let expected = Point3::new(0.4, 0.1, 0.0) + v * 0.1 + a * 0.005;
        assert_relative_eq!(tail.position(), expected, epsilon = 1e-12);
        assert_relative_eq!(tail.linear_velocity, v + a * 0.1, epsilon = 1e-12);
        assert!(traj.is_in_touchdown_tail(0.9));
    }

    #[test]
    fn replan_with_same_footstep_keeps_endpoint() {
        let config = config();
        let ctx = context(&config);
        let step = footstep(0.4, 0.0);
        for continuous in [false, true] {
            let mut traj = SwingTrajectory::plan(0.0, &liftoff(), &step, 0.8, &ctx);
            traj.replan(0.0, &step, 0.8, &ctx, continuous);
            let end = traj.sample(0.8);
            assert_relative_eq!(end.position(), Point3::new(0.4, 0.1, 0.0), epsilon = 1e-9);
            assert_relative_eq!(end.pose.rotation.angle(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn replan_mid_swing_has_no_position_jump() {
        let config = config();
        let ctx = context(&config);
        for continuous in [false, true] {
            let mut traj = SwingTrajectory::plan(0.0, &liftoff(), &footstep(0.4, 0.0), 0.8, &ctx);
            let before = traj.sample(0.3);
            traj.replan(0.3, &footstep(0.6, 0.0), 0.8, &ctx, continuous);
            let after = traj.sample(0.3);
            assert_relative_eq!(before.position(), after.position(), epsilon = 1e-9);
            assert_relative_eq!(traj.sample(0.8).position(), Point3::new(0.6, 0.1, 0.0), epsilon = 1e-9);
        }
    }

    #[test]
    fn toe_control_offsets_the_target() {
        let config = config();
        let ctx = SwingPlanContext {
            config: &config,
            control_offset: Vector3::new(0.16, 0.0, 0.0),
            stance_height: 0.0,
        };
        let traj = SwingTrajectory::plan(0.0, &liftoff(), &footstep(0.4, 0.0), 0.8, &ctx);
        assert_relative_eq!(traj.final_pose().translation.vector.x, 0.56, epsilon = 1e-12);
    }

    #[test]
    fn pose_trajectory_holds_final_pose() {
        let waypoints = vec![
            FootWaypoint::at_rest(0.5, Point3::new(0.0, 0.0, 0.2), UnitQuaternion::identity()),
            FootWaypoint::at_rest(1.0, Point3::new(0.1, 0.0, 0.2), UnitQuaternion::identity()),
        ];
        let traj = PoseTrajectory::through_waypoints(2.0, &liftoff(), &waypoints);
        assert_relative_eq!(traj.end_time(), 3.0);
        let held = traj.sample(5.0);
        assert_relative_eq!(held.position(), Point3::new(0.1, 0.0, 0.2), epsilon = 1e-12);
        assert_relative_eq!(held.linear_velocity, Vector3::zeros());
    }

    #[test]
    fn time_dilation_scales_rates() {
        let mut sample = PoseSample::at_rest(Isometry3::identity());
        sample.linear_velocity = Vector3::new(1.0, 0.0, 0.0);
        sample.angular_acceleration = Vector3::new(0.0, 2.0, 0.0);
        sample.scale_rates(1.5);
        assert_relative_eq!(sample.linear_velocity.x, 1.5);
        assert_relative_eq!(sample.angular_acceleration.y, 4.5);
    }
}
