//! Leg singularity and knee-collapse avoidance.
//!
//! Leg extension is measured along the virtual leg, the ankle-to-hip axis.
//! Swing targets are capped before the leg straightens. Support-leg CoM
//! height targets are bounded between a collapse floor and a singularity
//! ceiling, with hysteresis and a filtered fade-out so corrections never
//! snap off.

use std::f64::consts::PI;

use clankers_core::config::LegConfig;
use clankers_core::types::{ComHeightData, ConstraintType, LegKinematics, RobotSide};
use nalgebra::{Point3, UnitQuaternion, Vector2, Vector3};

use crate::filters::AlphaFilter;

/// Clamped linear ramp: 0 at `start`, 1 at `end`. Works for decreasing
/// ramps too. Degenerate or NaN input yields 0.
#[must_use]
pub fn blend_factor(value: f64, start: f64, end: f64) -> f64 {
    let span = end - start;
    if span.abs() < f64::EPSILON {
        return 0.0;
    }
    let alpha = (value - start) / span;
    if alpha.is_nan() {
        0.0
    } else {
        alpha.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// VirtualLegFrame
// ---------------------------------------------------------------------------

/// Frame whose z axis points from the ankle to the hip pitch joint.
///
/// Points are expressed relative to the hip, so the ankle sits at
/// `z = -leg_length` whatever way the knee bends.
#[derive(Debug, Clone, Copy)]
pub struct VirtualLegFrame {
    rotation: UnitQuaternion<f64>,
    hip: Point3<f64>,
}

impl VirtualLegFrame {
    #[must_use]
    pub fn from_leg(leg: &LegKinematics) -> Self {
        let axis = leg.hip_pitch_position - leg.ankle_position;
        let rotation = if axis.norm() < 1e-9 {
            UnitQuaternion::identity()
        } else {
            UnitQuaternion::rotation_between(&Vector3::z(), &axis)
                .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI))
        };
        Self {
            rotation,
            hip: leg.hip_pitch_position,
        }
    }

    #[must_use]
    pub fn point_to_leg(&self, p: &Point3<f64>) -> Vector3<f64> {
        self.rotation.inverse_transform_vector(&(p - self.hip))
    }

    #[must_use]
    pub fn point_to_world(&self, local: &Vector3<f64>) -> Point3<f64> {
        self.hip + self.rotation * local
    }

    #[must_use]
    pub fn vector_to_leg(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse_transform_vector(v)
    }

    #[must_use]
    pub fn vector_to_world(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * local
    }

    /// Unit ankle-to-hip axis, world frame.
    #[must_use]
    pub fn axis(&self) -> Vector3<f64> {
        self.rotation * Vector3::z()
    }
}

impl Default for VirtualLegFrame {
    fn default() -> Self {
        Self::from_leg(&LegKinematics::default())
    }
}

// ---------------------------------------------------------------------------
// Height correction filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct HeightFilters {
    height: AlphaFilter,
    velocity: AlphaFilter,
    acceleration: AlphaFilter,
}

impl HeightFilters {
    fn new(alpha: f64) -> Self {
        Self {
            height: AlphaFilter::new(alpha),
            velocity: AlphaFilter::new(alpha),
            acceleration: AlphaFilter::new(alpha),
        }
    }

    fn prime(&mut self, data: &ComHeightData) {
        self.reset();
        self.height.update(data.height);
        self.velocity.update(data.velocity);
        self.acceleration.update(data.acceleration);
    }

    /// Fade toward the uncorrected target. True once close enough to stop.
    fn fade_out(&mut self, data: &mut ComHeightData, epsilon: f64) -> bool {
        let target = data.height;
        self.height.update(target);
        self.velocity.set(data.velocity);
        self.acceleration.set(data.acceleration);
        data.height = self.height.value();
        data.velocity = self.velocity.value();
        data.acceleration = self.acceleration.value();
        (target - self.height.value()).abs() <= epsilon
    }

    fn reset(&mut self) {
        self.height.reset();
        self.velocity.reset();
        self.acceleration.reset();
    }
}

/// CoM height sample re-expressed along the virtual leg.
struct EquivalentHipMotion {
    translation: Vector3<f64>,
    velocity: Vector3<f64>,
    acceleration: Vector3<f64>,
    /// COM xy velocity in the pelvis z-up frame.
    com_forward_velocity: f64,
}

// ---------------------------------------------------------------------------
// SingularityAndCollapseAvoidance
// ---------------------------------------------------------------------------

/// Per-leg extension limiter.
#[derive(Debug, Clone)]
pub struct SingularityAndCollapseAvoidance {
    side: RobotSide,
    config: LegConfig,
    dt: f64,
    collapse_avoidance_enabled: bool,

    frame: VirtualLegFrame,
    pelvis_linear_velocity: Vector3<f64>,
    pelvis_yaw: UnitQuaternion<f64>,

    current_leg_length: f64,
    desired_leg_length: f64,
    corrected_desired_leg_length: f64,

    check_velocity_for_swing: bool,
    alpha_swing: f64,
    alpha_support: f64,
    alpha_collapse: f64,

    is_swing_used: bool,
    is_support_used: bool,
    is_collapse_used: bool,
    is_unreachable_footstep_compensated: bool,
    smooth_exit_support: bool,
    smooth_exit_collapse: bool,
    time_remaining_to_disable_collapse: f64,

    unachieved_swing_translation: Vector3<f64>,
    unachieved_swing_velocity: Vector3<f64>,
    unachieved_swing_acceleration: Vector3<f64>,

    support_filters: HeightFilters,
    collapse_filters: HeightFilters,
    unreachable_translation: AlphaFilter,
    unreachable_velocity: AlphaFilter,
    unreachable_acceleration: AlphaFilter,
}

impl SingularityAndCollapseAvoidance {
    #[must_use]
    pub fn new(side: RobotSide, config: LegConfig, dt: f64) -> Self {
        let frame = VirtualLegFrame::default();
        Self {
            side,
            collapse_avoidance_enabled: config.use_collapse_avoidance,
            dt,
            current_leg_length: LegKinematics::default().leg_length(),
            desired_leg_length: f64::NAN,
            corrected_desired_leg_length: f64::NAN,
            frame,
            pelvis_linear_velocity: Vector3::zeros(),
            pelvis_yaw: UnitQuaternion::identity(),
            check_velocity_for_swing: false,
            alpha_swing: 0.0,
            alpha_support: 0.0,
            alpha_collapse: 0.0,
            is_swing_used: false,
            is_support_used: false,
            is_collapse_used: false,
            is_unreachable_footstep_compensated: false,
            smooth_exit_support: false,
            smooth_exit_collapse: false,
            time_remaining_to_disable_collapse: 0.0,
            unachieved_swing_translation: Vector3::zeros(),
            unachieved_swing_velocity: Vector3::zeros(),
            unachieved_swing_acceleration: Vector3::zeros(),
            support_filters: HeightFilters::new(config.correction_alpha),
            collapse_filters: HeightFilters::new(config.correction_alpha),
            unreachable_translation: AlphaFilter::new(config.unreachable_footstep_alpha),
            unreachable_velocity: AlphaFilter::new(config.unreachable_footstep_alpha),
            unreachable_acceleration: AlphaFilter::new(config.unreachable_footstep_alpha),
            config,
        }
    }

    /// Refresh the virtual leg from this tick's kinematics. Returns the
    /// current leg length.
    pub fn update(&mut self, leg: &LegKinematics) -> f64 {
        self.frame = VirtualLegFrame::from_leg(leg);
        self.pelvis_linear_velocity = leg.pelvis_linear_velocity;
        self.pelvis_yaw = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), leg.pelvis_yaw);
        self.current_leg_length = -self.frame.point_to_leg(&leg.ankle_position).z;
        self.current_leg_length
    }

    /// Clear the swing correction and its shortfall.
    pub fn reset_swing_parameters(&mut self) {
        self.alpha_swing = 0.0;
        self.is_swing_used = false;
        self.unachieved_swing_translation = Vector3::zeros();
        self.unachieved_swing_velocity = Vector3::zeros();
        self.unachieved_swing_acceleration = Vector3::zeros();
    }

    /// Drop every correction immediately.
    pub fn reset(&mut self) {
        self.reset_swing_parameters();
        self.alpha_support = 0.0;
        self.alpha_collapse = 0.0;
        self.is_support_used = false;
        self.is_collapse_used = false;
        self.is_unreachable_footstep_compensated = false;
        self.smooth_exit_support = false;
        self.smooth_exit_collapse = false;
        self.time_remaining_to_disable_collapse = 0.0;
        self.support_filters.reset();
        self.collapse_filters.reset();
        self.unreachable_translation.reset();
        self.unreachable_velocity.reset();
        self.unreachable_acceleration.reset();
    }

    /// While set, swing correction waits until the desired foot velocity
    /// stops shortening the leg. Cleared by the first correction.
    pub fn set_check_velocity(&mut self, check: bool) {
        self.check_velocity_for_swing = check;
    }

    pub fn set_collapse_avoidance_enabled(&mut self, enabled: bool) {
        if self.collapse_avoidance_enabled && !enabled {
            self.alpha_collapse = 0.0;
            self.is_collapse_used = false;
            self.smooth_exit_collapse = false;
        }
        self.collapse_avoidance_enabled = enabled;
    }

    /// Cap the desired swing ankle motion near full extension. All values
    /// are world frame and corrected in place.
    pub fn correct_swing_foot_trajectory(
        &mut self,
        position: &mut Point3<f64>,
        velocity: &mut Vector3<f64>,
        acceleration: &mut Vector3<f64>,
    ) {
        let was_used = self.is_swing_used;
        self.reset_swing_parameters();
        if !self.config.use_swing_singularity_avoidance {
            return;
        }

        let max_length = self.config.maximum_leg_length;
        let mut desired = self.frame.point_to_leg(position);
        self.desired_leg_length = -desired.z;
        self.corrected_desired_leg_length = self.desired_leg_length;
        let desired_percent = self.desired_leg_length / max_length;
        if !(desired_percent >= self.config.percent_to_enable_singularity_avoidance) {
            return;
        }

        let mut desired_velocity = self.frame.vector_to_leg(velocity);
        if self.check_velocity_for_swing && desired_velocity.z > 0.0 {
            return;
        }
        if !was_used {
            tracing::debug!(side = %self.side, desired_percent, "swing singularity avoidance engaged");
        }
        self.check_velocity_for_swing = false;
        self.is_swing_used = true;
        self.alpha_swing = blend_factor(
            desired_percent,
            self.config.percent_to_enable_singularity_avoidance,
            self.config.max_percent_in_swing,
        );
        let alpha = self.alpha_swing;

        let corrected_z = -self
            .desired_leg_length
            .min(self.config.max_percent_in_swing * max_length);
        let unachieved_translation = Vector3::new(0.0, 0.0, desired.z - corrected_z);
        desired.z = corrected_z;
        self.corrected_desired_leg_length = corrected_z.abs();

        let pelvis_velocity = self.frame.vector_to_leg(&self.pelvis_linear_velocity);
        let corrected_vz = (1.0 - alpha) * desired_velocity.z + alpha * pelvis_velocity.z;
        let unachieved_velocity = Vector3::new(0.0, 0.0, desired_velocity.z - corrected_vz);
        desired_velocity.z = corrected_vz;

        let mut desired_acceleration = self.frame.vector_to_leg(acceleration);
        let unachieved_acceleration = Vector3::new(0.0, 0.0, alpha * desired_acceleration.z);
        desired_acceleration.z *= 1.0 - alpha;

        *position = self.frame.point_to_world(&desired);
        *velocity = self.frame.vector_to_world(&desired_velocity);
        *acceleration = self.frame.vector_to_world(&desired_acceleration);
        self.unachieved_swing_translation = self.frame.vector_to_world(&unachieved_translation);
        self.unachieved_swing_velocity = self.frame.vector_to_world(&unachieved_velocity);
        self.unachieved_swing_acceleration = self.frame.vector_to_world(&unachieved_acceleration);
    }

    /// Bound the support leg between collapse and full extension by
    /// correcting the CoM height sample in place.
    pub fn correct_com_height_for_support_singularity_and_collapse(
        &mut self,
        com_xy_velocity: &Vector2<f64>,
        z_current: f64,
        data: &mut ComHeightData,
        foot_load: f64,
        constraint: ConstraintType,
    ) {
        self.correct_com_height_for_support_singularity(com_xy_velocity, z_current, data, constraint);
        if !self.is_support_used {
            self.correct_com_height_for_collapse(com_xy_velocity, z_current, data, foot_load, constraint);
        }
    }

    fn equivalent_hip_motion(&self, com_xy_velocity: &Vector2<f64>, z_current: f64, data: &ComHeightData) -> EquivalentHipMotion {
        let com_in_pelvis = self
            .pelvis_yaw
            .inverse_transform_vector(&Vector3::new(com_xy_velocity.x, com_xy_velocity.y, 0.0));
        let hip_velocity_in_pelvis = Vector3::new(com_in_pelvis.x, 0.0, data.velocity);
        EquivalentHipMotion {
            translation: self
                .frame
                .vector_to_leg(&Vector3::new(0.0, 0.0, data.height - z_current)),
            velocity: self
                .frame
                .vector_to_leg(&(self.pelvis_yaw * hip_velocity_in_pelvis)),
            acceleration: self
                .frame
                .vector_to_leg(&Vector3::new(0.0, 0.0, data.acceleration)),
            com_forward_velocity: com_in_pelvis.x,
        }
    }

    /// Scale a leg-frame hip velocity so its pelvis-forward part matches the
    /// CoM, then return its world z.
    fn hip_velocity_z(&self, hip_velocity: &Vector3<f64>, com_forward_velocity: f64) -> f64 {
        let mut in_pelvis = self
            .pelvis_yaw
            .inverse_transform_vector(&self.frame.vector_to_world(hip_velocity));
        if com_forward_velocity.abs() > 1e-3 && in_pelvis.x.abs() > 1e-3 {
            in_pelvis *= com_forward_velocity / in_pelvis.x;
        }
        (self.pelvis_yaw * in_pelvis).z
    }

    fn correct_com_height_for_support_singularity(
        &mut self,
        com_xy_velocity: &Vector2<f64>,
        z_current: f64,
        data: &mut ComHeightData,
        constraint: ConstraintType,
    ) {
        if !self.config.use_support_singularity_avoidance {
            self.alpha_support = 0.0;
            self.is_support_used = false;
            self.smooth_exit_support = false;
            return;
        }

        let mut hip = self.equivalent_hip_motion(com_xy_velocity, z_current, data);
        self.desired_leg_length = hip.translation.z + self.current_leg_length;
        self.corrected_desired_leg_length = self.desired_leg_length;
        let desired_percent = self.desired_leg_length / self.config.maximum_leg_length;

        if !matches!(constraint, ConstraintType::Full | ConstraintType::HoldPosition) {
            self.alpha_support = 0.0;
            self.smooth_exit_support = self.is_support_used;
            if !self.is_support_used {
                return;
            }
        }

        if (self.is_support_used || self.smooth_exit_support)
            && desired_percent < self.config.percent_to_disable_singularity_avoidance
            && !self.smooth_exit_support
        {
            self.alpha_support = 0.0;
            self.smooth_exit_support = true;
        }

        if desired_percent < self.config.percent_to_enable_singularity_avoidance {
            if !self.is_support_used && !self.smooth_exit_support {
                return;
            }
        } else if !self.is_support_used {
            tracing::debug!(side = %self.side, desired_percent, "support singularity avoidance engaged");
            self.is_support_used = true;
            self.smooth_exit_support = false;
            self.support_filters.prime(data);
        }

        if self.smooth_exit_support {
            if self.support_filters.fade_out(data, self.config.smooth_exit_epsilon) {
                self.alpha_support = 0.0;
                self.is_support_used = false;
                self.smooth_exit_support = false;
            }
            return;
        }

        self.alpha_support = blend_factor(
            desired_percent,
            self.config.percent_to_enable_singularity_avoidance,
            self.config.max_percent_in_support,
        );
        let alpha = self.alpha_support;

        let desired_or_max = self
            .desired_leg_length
            .min(self.config.max_percent_in_support * self.config.maximum_leg_length);
        hip.translation.z = desired_or_max - self.current_leg_length;
        self.corrected_desired_leg_length = desired_or_max;
        let corrected_height = z_current + self.frame.vector_to_world(&hip.translation).z;
        data.height = self.support_filters.height.update(corrected_height);

        if hip.velocity.z > 0.0 {
            hip.velocity.z *= 1.0 - alpha;
            let vz = self.hip_velocity_z(&hip.velocity, hip.com_forward_velocity);
            data.velocity = self.support_filters.velocity.update(vz);
        }
        if hip.acceleration.z > 0.0 {
            hip.acceleration.z *= 1.0 - alpha;
            let az = self.frame.vector_to_world(&hip.acceleration).z;
            data.acceleration = self.support_filters.acceleration.update(az);
        }
    }

    fn correct_com_height_for_collapse(
        &mut self,
        com_xy_velocity: &Vector2<f64>,
        z_current: f64,
        data: &mut ComHeightData,
        foot_load: f64,
        constraint: ConstraintType,
    ) {
        if !self.collapse_avoidance_enabled {
            self.alpha_collapse = 0.0;
            self.is_collapse_used = false;
            self.smooth_exit_collapse = false;
            return;
        }

        let mut hip = self.equivalent_hip_motion(com_xy_velocity, z_current, data);
        self.desired_leg_length = hip.translation.z + self.current_leg_length;
        self.corrected_desired_leg_length = self.desired_leg_length;
        let desired_percent = self.desired_leg_length / self.config.maximum_leg_length;

        if !matches!(constraint, ConstraintType::Full | ConstraintType::HoldPosition) {
            self.alpha_collapse = 0.0;
            self.smooth_exit_collapse = self.is_collapse_used;
            self.time_remaining_to_disable_collapse = 0.0;
            if !self.is_collapse_used {
                return;
            }
        }

        if !self.is_collapse_used && !self.smooth_exit_collapse {
            if foot_load < self.config.load_to_enable_collapse_avoidance {
                return;
            }
        } else if foot_load < self.config.load_to_disable_collapse_avoidance {
            self.time_remaining_to_disable_collapse =
                (self.time_remaining_to_disable_collapse - self.dt).max(0.0);
            if self.time_remaining_to_disable_collapse <= 0.0 && !self.smooth_exit_collapse {
                self.alpha_collapse = 0.0;
                self.smooth_exit_collapse = true;
            }
        } else {
            self.time_remaining_to_disable_collapse = self.config.collapse_disable_delay;
            self.smooth_exit_collapse = false;
        }

        if desired_percent > self.config.percent_to_enable_collapse_avoidance {
            self.alpha_collapse = 0.0;
            self.smooth_exit_collapse = self.is_collapse_used;
            self.time_remaining_to_disable_collapse = 0.0;
            if !self.is_collapse_used {
                return;
            }
        } else if !self.is_collapse_used {
            tracing::debug!(side = %self.side, desired_percent, "collapse avoidance engaged");
            self.is_collapse_used = true;
            self.smooth_exit_collapse = false;
            self.time_remaining_to_disable_collapse = self.config.collapse_disable_delay;
            self.collapse_filters.prime(data);
        }

        if self.smooth_exit_collapse {
            if self.collapse_filters.fade_out(data, self.config.smooth_exit_epsilon) {
                self.alpha_collapse = 0.0;
                self.is_collapse_used = false;
                self.smooth_exit_collapse = false;
            }
            return;
        }

        self.alpha_collapse = blend_factor(
            desired_percent,
            self.config.percent_to_enable_collapse_avoidance,
            self.config.min_percent_with_collapse_avoidance,
        );
        let alpha = self.alpha_collapse;

        let desired_or_min = self
            .desired_leg_length
            .max(self.config.min_percent_with_collapse_avoidance * self.config.maximum_leg_length);
        hip.translation.z = desired_or_min - self.current_leg_length;
        self.corrected_desired_leg_length = desired_or_min;
        let corrected_height = z_current + self.frame.vector_to_world(&hip.translation).z;
        data.height = self.collapse_filters.height.update(corrected_height);

        if hip.velocity.z < 0.0 {
            hip.velocity.z *= 1.0 - alpha;
            let vz = self.hip_velocity_z(&hip.velocity, hip.com_forward_velocity);
            data.velocity = self.collapse_filters.velocity.update(vz);
        } else {
            self.collapse_filters.velocity.reset();
            self.collapse_filters.velocity.update(data.velocity);
        }
        if hip.acceleration.z < 0.0 {
            hip.acceleration.z *= 1.0 - alpha;
            let az = self.frame.vector_to_world(&hip.acceleration).z;
            data.acceleration = self.collapse_filters.acceleration.update(az);
        } else {
            self.collapse_filters.acceleration.reset();
            self.collapse_filters.acceleration.update(data.acceleration);
        }
    }

    /// Shift the CoM target by the part of the swing the leg could not
    /// reach. Only active while swinging.
    pub fn correct_com_height_for_unreachable_footstep(&mut self, data: &mut ComHeightData, constraint: ConstraintType) {
        self.is_unreachable_footstep_compensated = false;
        if !self.config.use_unreachable_footstep_correction {
            return;
        }
        if constraint != ConstraintType::Swing {
            self.unreachable_translation.set(0.0);
            self.unreachable_velocity.set(0.0);
            self.unreachable_acceleration.set(0.0);
            return;
        }

        if self.unachieved_swing_translation.z < 0.0 {
            self.is_unreachable_footstep_compensated = true;
            data.height += self
                .unreachable_translation
                .update(self.unachieved_swing_translation.z);
        } else {
            self.unreachable_translation.set(0.0);
        }
        if self.unachieved_swing_velocity.z < 0.0 {
            data.velocity += self.unreachable_velocity.update(self.unachieved_swing_velocity.z);
        } else {
            self.unreachable_velocity.set(0.0);
        }
        if self.unachieved_swing_acceleration.z < 0.0 {
            data.acceleration += self
                .unreachable_acceleration
                .update(self.unachieved_swing_acceleration.z);
        } else {
            self.unreachable_acceleration.set(0.0);
        }
    }

    #[must_use]
    pub const fn frame(&self) -> &VirtualLegFrame {
        &self.frame
    }

    #[must_use]
    pub const fn current_leg_length(&self) -> f64 {
        self.current_leg_length
    }

    #[must_use]
    pub fn current_percent_of_leg_length(&self) -> f64 {
        self.current_leg_length / self.config.maximum_leg_length
    }

    #[must_use]
    pub const fn desired_leg_length(&self) -> f64 {
        self.desired_leg_length
    }

    #[must_use]
    pub const fn corrected_desired_leg_length(&self) -> f64 {
        self.corrected_desired_leg_length
    }

    #[must_use]
    pub const fn alpha_swing_singularity_avoidance(&self) -> f64 {
        self.alpha_swing
    }

    #[must_use]
    pub const fn alpha_support_singularity_avoidance(&self) -> f64 {
        self.alpha_support
    }

    #[must_use]
    pub const fn alpha_collapse_avoidance(&self) -> f64 {
        self.alpha_collapse
    }

    #[must_use]
    pub const fn is_swing_singularity_avoidance_used(&self) -> bool {
        self.is_swing_used
    }

    #[must_use]
    pub const fn is_support_singularity_avoidance_used(&self) -> bool {
        self.is_support_used
    }

    #[must_use]
    pub const fn is_collapse_avoidance_used(&self) -> bool {
        self.is_collapse_used
    }

    #[must_use]
    pub const fn is_collapse_avoidance_enabled(&self) -> bool {
        self.collapse_avoidance_enabled
    }

    #[must_use]
    pub const fn is_unreachable_footstep_compensated(&self) -> bool {
        self.is_unreachable_footstep_compensated
    }

    /// World frame; negative z when the swing foot was held above its target.
    #[must_use]
    pub const fn unachieved_swing_translation(&self) -> &Vector3<f64> {
        &self.unachieved_swing_translation
    }

    #[must_use]
    pub const fn unachieved_swing_velocity(&self) -> &Vector3<f64> {
        &self.unachieved_swing_velocity
    }

    #[must_use]
    pub const fn unachieved_swing_acceleration(&self) -> &Vector3<f64> {
        &self.unachieved_swing_acceleration
    }
}
