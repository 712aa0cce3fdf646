//! Shared vocabulary for the foot controller.
//!
//! Sides, constraint tags, footsteps, per-tick measurement snapshots and the
//! command structs handed to the whole-body solver.

use std::fmt;

use nalgebra::{Isometry3, Point2, Point3, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RobotSide
// ---------------------------------------------------------------------------

/// Which leg a quantity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotSide {
    Left,
    Right,
}

impl RobotSide {
    /// Both sides, left first. This is also the tick order of the feet.
    pub const BOTH: [Self; 2] = [Self::Left, Self::Right];

    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// `+1` for left, `-1` for right. Mirrors lateral offsets.
    #[must_use]
    pub const fn sign(self) -> f64 {
        match self {
            Self::Left => 1.0,
            Self::Right => -1.0,
        }
    }

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for RobotSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// ConstraintType
// ---------------------------------------------------------------------------

/// Physical constraint regime of one foot. Exactly one is active per foot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintType {
    Full,
    HoldPosition,
    Toes,
    Swing,
    MoveViaWaypoints,
    ExplorePolygon,
    ToesTouchdown,
    HeelTouchdown,
}

impl ConstraintType {
    pub const ALL: [Self; 8] = [
        Self::Full,
        Self::HoldPosition,
        Self::Toes,
        Self::Swing,
        Self::MoveViaWaypoints,
        Self::ExplorePolygon,
        Self::ToesTouchdown,
        Self::HeelTouchdown,
    ];

    /// True when the foot carries load in this regime.
    #[must_use]
    pub const fn is_loaded(self) -> bool {
        !matches!(self, Self::Swing | Self::MoveViaWaypoints)
    }

    /// Flat-footed support regimes. Exploration and polygon resets are
    /// serviced only from these.
    #[must_use]
    pub const fn is_flat_support(self) -> bool {
        matches!(self, Self::Full | Self::HoldPosition | Self::ExplorePolygon)
    }

    #[must_use]
    pub const fn is_edge_touchdown(self) -> bool {
        matches!(self, Self::ToesTouchdown | Self::HeelTouchdown)
    }

    /// Position in [`ConstraintType::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Full => "FULL",
            Self::HoldPosition => "HOLD_POSITION",
            Self::Toes => "TOES",
            Self::Swing => "SWING",
            Self::MoveViaWaypoints => "MOVE_VIA_WAYPOINTS",
            Self::ExplorePolygon => "EXPLORE_POLYGON",
            Self::ToesTouchdown => "TOES_TOUCHDOWN",
            Self::HeelTouchdown => "HEEL_TOUCHDOWN",
        }
    }
}

impl fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Footstep
// ---------------------------------------------------------------------------

/// How the swing trajectory for a footstep is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryType {
    /// Two generated waypoints at the swing height.
    #[default]
    Default,
    /// Generated waypoints raised to clear the higher of start and end.
    ObstacleClearance,
    /// Two caller-provided position waypoints.
    Custom,
    /// Fully specified timed waypoints.
    Waypoints,
}

/// A timed SE(3) waypoint, world frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootWaypoint {
    /// Time from the start of the motion, in seconds.
    pub time: f64,
    pub position: Point3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub linear_velocity: Vector3<f64>,
    pub angular_velocity: Vector3<f64>,
}

impl FootWaypoint {
    /// Waypoint at rest.
    #[must_use]
    pub fn at_rest(time: f64, position: Point3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            time,
            position,
            orientation,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
        }
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.time.is_finite()
            && self.position.iter().all(|v| v.is_finite())
            && self.orientation.coords.iter().all(|v| v.is_finite())
            && self.linear_velocity.iter().all(|v| v.is_finite())
            && self.angular_velocity.iter().all(|v| v.is_finite())
    }
}

/// Target foothold for one swing. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footstep {
    pub side: RobotSide,
    /// Sole pose at touchdown, world frame.
    pub pose: Isometry3<f64>,
    /// Apex height above the higher of liftoff and touchdown (m). Non-positive
    /// means "use the configured default".
    pub swing_height: f64,
    pub trajectory_type: TrajectoryType,
    /// Used with [`TrajectoryType::Custom`].
    pub custom_position_waypoints: Vec<Point3<f64>>,
    /// Used with [`TrajectoryType::Waypoints`].
    pub swing_waypoints: Vec<FootWaypoint>,
    /// Expected contact points at the landing site, sole frame. Empty means
    /// the full default foot.
    pub predicted_contact_points: Vec<Point2<f64>>,
}

impl Footstep {
    #[must_use]
    pub fn new(side: RobotSide, pose: Isometry3<f64>) -> Self {
        Self {
            side,
            pose,
            swing_height: 0.0,
            trajectory_type: TrajectoryType::Default,
            custom_position_waypoints: Vec::new(),
            swing_waypoints: Vec::new(),
            predicted_contact_points: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_swing_height(mut self, swing_height: f64) -> Self {
        self.swing_height = swing_height;
        self
    }

    #[must_use]
    pub fn with_custom_waypoints(mut self, waypoints: Vec<Point3<f64>>) -> Self {
        self.trajectory_type = TrajectoryType::Custom;
        self.custom_position_waypoints = waypoints;
        self
    }

    #[must_use]
    pub fn with_swing_waypoints(mut self, waypoints: Vec<FootWaypoint>) -> Self {
        self.trajectory_type = TrajectoryType::Waypoints;
        self.swing_waypoints = waypoints;
        self
    }

    #[must_use]
    pub fn with_predicted_contact_points(mut self, points: Vec<Point2<f64>>) -> Self {
        self.predicted_contact_points = points;
        self
    }

    #[must_use]
    pub fn position(&self) -> Point3<f64> {
        Point3::from(self.pose.translation.vector)
    }

    #[must_use]
    pub const fn orientation(&self) -> &UnitQuaternion<f64> {
        &self.pose.rotation
    }
}

// ---------------------------------------------------------------------------
// Gains and selection
// ---------------------------------------------------------------------------

/// Diagonal SE(3) PD gains. Derivative gains follow from a damping ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Se3Gains {
    pub position_kp: [f64; 3],
    pub position_zeta: f64,
    pub orientation_kp: [f64; 3],
    pub orientation_zeta: f64,
}

impl Se3Gains {
    #[must_use]
    pub const fn uniform(position_kp: f64, orientation_kp: f64, zeta: f64) -> Self {
        Self {
            position_kp: [position_kp; 3],
            position_zeta: zeta,
            orientation_kp: [orientation_kp; 3],
            orientation_zeta: zeta,
        }
    }

    #[must_use]
    pub fn position_kd(&self) -> Vector3<f64> {
        Vector3::from(self.position_kp).map(|kp| 2.0 * self.position_zeta * kp.max(0.0).sqrt())
    }

    #[must_use]
    pub fn orientation_kd(&self) -> Vector3<f64> {
        Vector3::from(self.orientation_kp)
            .map(|kp| 2.0 * self.orientation_zeta * kp.max(0.0).sqrt())
    }
}

/// Which of the six spatial directions a command constrains.
///
/// Angular axes are expressed in the sole frame, linear axes in the frame the
/// command names in [`SelectionMatrix6::linear_in_world`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionMatrix6 {
    pub angular: [bool; 3],
    pub linear: [bool; 3],
    pub linear_in_world: bool,
}

impl SelectionMatrix6 {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            angular: [true; 3],
            linear: [true; 3],
            linear_in_world: false,
        }
    }

    #[must_use]
    pub const fn none() -> Self {
        Self {
            angular: [false; 3],
            linear: [false; 3],
            linear_in_world: false,
        }
    }

    #[must_use]
    pub const fn linear_only() -> Self {
        Self {
            angular: [false; 3],
            linear: [true; 3],
            linear_in_world: false,
        }
    }

    /// Only vertical translation, world frame.
    #[must_use]
    pub const fn world_linear_z_only() -> Self {
        Self {
            angular: [false; 3],
            linear: [false, false, true],
            linear_in_world: true,
        }
    }

    #[must_use]
    pub const fn with_angular(mut self, axis: usize, selected: bool) -> Self {
        self.angular[axis] = selected;
        self
    }

    #[must_use]
    pub const fn with_linear(mut self, axis: usize, selected: bool) -> Self {
        self.linear[axis] = selected;
        self
    }

    #[must_use]
    pub fn selected_count(&self) -> usize {
        self.angular
            .iter()
            .chain(self.linear.iter())
            .filter(|&&s| s)
            .count()
    }
}

impl Default for SelectionMatrix6 {
    fn default() -> Self {
        Self::all()
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Target pose/velocity/acceleration with gains, tracked by the feedback
/// controller. All vectors are world frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialFeedbackCommand {
    pub side: RobotSide,
    pub desired_pose: Isometry3<f64>,
    pub desired_linear_velocity: Vector3<f64>,
    pub desired_angular_velocity: Vector3<f64>,
    pub feed_forward_linear_acceleration: Vector3<f64>,
    pub feed_forward_angular_acceleration: Vector3<f64>,
    /// Controlled point relative to the sole frame.
    pub control_point_offset: Vector3<f64>,
    pub gains: Se3Gains,
    pub weight: f64,
    pub selection: SelectionMatrix6,
}

impl SpatialFeedbackCommand {
    #[must_use]
    pub fn new(side: RobotSide, gains: Se3Gains, weight: f64) -> Self {
        Self {
            side,
            desired_pose: Isometry3::identity(),
            desired_linear_velocity: Vector3::zeros(),
            desired_angular_velocity: Vector3::zeros(),
            feed_forward_linear_acceleration: Vector3::zeros(),
            feed_forward_angular_acceleration: Vector3::zeros(),
            control_point_offset: Vector3::zeros(),
            gains,
            weight,
            selection: SelectionMatrix6::all(),
        }
    }

    #[must_use]
    pub fn desired_position(&self) -> Point3<f64> {
        Point3::from(self.desired_pose.translation.vector)
    }

    /// Hold `pose` with zero velocity and acceleration.
    pub fn set_hold(&mut self, pose: Isometry3<f64>) {
        self.desired_pose = pose;
        self.desired_linear_velocity = Vector3::zeros();
        self.desired_angular_velocity = Vector3::zeros();
        self.feed_forward_linear_acceleration = Vector3::zeros();
        self.feed_forward_angular_acceleration = Vector3::zeros();
    }

    /// Mark every target invalid so stale values cannot be consumed.
    pub fn invalidate(&mut self) {
        self.desired_pose.translation.vector.fill(f64::NAN);
        self.desired_linear_velocity.fill(f64::NAN);
        self.desired_angular_velocity.fill(f64::NAN);
        self.feed_forward_linear_acceleration.fill(f64::NAN);
        self.feed_forward_angular_acceleration.fill(f64::NAN);
    }
}

/// Spatial-acceleration constraint for the inverse-dynamics solver.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialAccelerationCommand {
    pub side: RobotSide,
    pub linear_acceleration: Vector3<f64>,
    pub angular_acceleration: Vector3<f64>,
    pub control_point_offset: Vector3<f64>,
    pub selection: SelectionMatrix6,
    /// `None` is a hard constraint.
    pub weight: Option<f64>,
}

impl SpatialAccelerationCommand {
    /// Hard zero-acceleration constraint on every direction.
    #[must_use]
    pub fn zero(side: RobotSide) -> Self {
        Self {
            side,
            linear_acceleration: Vector3::zeros(),
            angular_acceleration: Vector3::zeros(),
            control_point_offset: Vector3::zeros(),
            selection: SelectionMatrix6::all(),
            weight: None,
        }
    }

    #[must_use]
    pub const fn with_selection(mut self, selection: SelectionMatrix6) -> Self {
        self.selection = selection;
        self
    }

    #[must_use]
    pub fn is_zero_acceleration(&self) -> bool {
        self.linear_acceleration == Vector3::zeros() && self.angular_acceleration == Vector3::zeros()
    }
}

/// Desired center of pressure for one foot, sole frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CenterOfPressureCommand {
    pub side: RobotSide,
    pub desired_cop: Point2<f64>,
    pub weight: Vector2<f64>,
}

// ---------------------------------------------------------------------------
// Per-tick measurements
// ---------------------------------------------------------------------------

/// Leg kinematics snapshot used by singularity avoidance and toe-off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegKinematics {
    /// Hip pitch joint position, world frame.
    pub hip_pitch_position: Point3<f64>,
    /// Ankle position, world frame.
    pub ankle_position: Point3<f64>,
    /// Pelvis linear velocity, world frame.
    pub pelvis_linear_velocity: Vector3<f64>,
    /// Pelvis heading (rad), defines the pelvis z-up frame.
    pub pelvis_yaw: f64,
    pub ankle_pitch: f64,
    pub ankle_pitch_lower_limit: f64,
}

impl Default for LegKinematics {
    fn default() -> Self {
        Self {
            hip_pitch_position: Point3::new(0.0, 0.0, 0.85),
            ankle_position: Point3::new(0.0, 0.0, 0.08),
            pelvis_linear_velocity: Vector3::zeros(),
            pelvis_yaw: 0.0,
            ankle_pitch: 0.0,
            ankle_pitch_lower_limit: -0.8,
        }
    }
}

impl LegKinematics {
    /// Hip-to-ankle distance. Non-negative by construction.
    #[must_use]
    pub fn leg_length(&self) -> f64 {
        (self.hip_pitch_position - self.ankle_position).norm()
    }
}

/// Everything one foot consumes from the whole-body controller in one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FootTickInput {
    /// Measured sole pose, world frame.
    pub sole_pose: Isometry3<f64>,
    /// Measured sole linear velocity, world frame.
    pub linear_velocity: Vector3<f64>,
    /// Measured foot angular velocity, world frame.
    pub angular_velocity: Vector3<f64>,
    /// Measured CoP, sole frame. `None` when unloaded.
    pub measured_cop: Option<Point2<f64>>,
    /// CoP requested by the balance controller, sole frame.
    pub desired_cop: Option<Point2<f64>>,
    /// Vertical load as a fraction of the total body weight.
    pub load_fraction: f64,
    pub leg: LegKinematics,
    pub jacobian_determinant: Option<f64>,
}

impl Default for FootTickInput {
    fn default() -> Self {
        Self {
            sole_pose: Isometry3::identity(),
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            measured_cop: None,
            desired_cop: None,
            load_fraction: 1.0,
            leg: LegKinematics::default(),
            jacobian_determinant: None,
        }
    }
}

impl FootTickInput {
    #[must_use]
    pub fn sole_position(&self) -> Point3<f64> {
        Point3::from(self.sole_pose.translation.vector)
    }

    /// Angular velocity expressed in the sole frame.
    #[must_use]
    pub fn angular_velocity_in_sole(&self) -> Vector3<f64> {
        self.sole_pose.rotation.inverse_transform_vector(&self.angular_velocity)
    }
}

/// Centre-of-mass height trajectory sample corrected in place.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ComHeightData {
    pub height: f64,
    pub velocity: f64,
    pub acceleration: f64,
}

impl ComHeightData {
    #[must_use]
    pub const fn new(height: f64, velocity: f64, acceleration: f64) -> Self {
        Self {
            height,
            velocity,
            acceleration,
        }
    }
}

// ---------------------------------------------------------------------------
// Toe contact geometry
// ---------------------------------------------------------------------------

/// Two-point toe contact edge, sole frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToeContactLine {
    pub first: Point2<f64>,
    pub second: Point2<f64>,
}

impl ToeContactLine {
    #[must_use]
    pub fn midpoint(&self) -> Point2<f64> {
        nalgebra::center(&self.first, &self.second)
    }
}
