//! Partial-foothold detection.
//!
//! A foot standing on a ledge pivots about the edge it still touches. The
//! detector estimates that line of rotation from the filtered foot angular
//! velocity and the filtered CoP, checks it against the CoP tracking error,
//! and once confirmed takes the contact points beyond the line out of
//! contact.
//!
//! Rotation sign convention: with the line directed along the filtered
//! angular velocity, points on its right move down. The unsupported part of
//! the foot is therefore on the right, and so is the desired CoP the
//! controller failed to reach.

use clankers_core::config::FootholdConfig;
use clankers_core::types::RobotSide;
use nalgebra::{Isometry3, Point2, Vector2, Vector3};

use crate::contact::ContactState;
use crate::filters::{AlphaFilter, FilteredVelocity, MajorityVoteFilter};
use crate::geometry::{Line2, LineIntersection, LineSegment2};

/// One tick of measurements for the detector.
#[derive(Debug, Clone, Copy)]
pub struct FootholdMeasurement<'a> {
    pub sole_pose: &'a Isometry3<f64>,
    /// Foot angular velocity, world frame.
    pub angular_velocity: &'a Vector3<f64>,
    /// Sole frame.
    pub measured_cop: Point2<f64>,
    /// Sole frame.
    pub desired_cop: Point2<f64>,
}

#[derive(Debug, Clone)]
pub struct PartialFootholdDetector {
    side: RobotSide,
    config: FootholdConfig,

    angular_velocity_filtered: AlphaFilter<Vector2<f64>>,
    cor_position_filtered: AlphaFilter<Vector2<f64>>,
    cor_velocity_filtered: FilteredVelocity<Vector2<f64>>,
    lor_angular_velocity_filtered: FilteredVelocity<f64>,
    cop_error_filtered: AlphaFilter<Vector2<f64>>,
    has_been_initialized: bool,

    angle_of_lor: f64,
    cor_transversal_velocity: f64,
    angular_velocity_around_lor: f64,
    cop_error_perpendicular: f64,
    is_lor_stable: bool,
    is_cor_stable: bool,
    is_angular_velocity_past_threshold: bool,
    is_rotating: bool,

    line_of_rotation: Option<Line2>,
    line_segment_in_world: LineSegment2,

    verification: MajorityVoteFilter,
    is_verified: bool,
    shrink_count: u32,
}

impl PartialFootholdDetector {
    #[must_use]
    pub fn new(side: RobotSide, config: FootholdConfig, dt: f64) -> Self {
        Self {
            side,
            angular_velocity_filtered: AlphaFilter::new(config.angular_velocity_alpha),
            cor_position_filtered: AlphaFilter::new(config.cor_position_alpha),
            cor_velocity_filtered: FilteredVelocity::new(config.cor_velocity_alpha, dt),
            lor_angular_velocity_filtered: FilteredVelocity::new(config.lor_angular_velocity_alpha, dt),
            cop_error_filtered: AlphaFilter::new(config.cop_error_alpha),
            has_been_initialized: false,
            angle_of_lor: 0.0,
            cor_transversal_velocity: f64::NAN,
            angular_velocity_around_lor: f64::NAN,
            cop_error_perpendicular: f64::NAN,
            is_lor_stable: false,
            is_cor_stable: false,
            is_angular_velocity_past_threshold: false,
            is_rotating: false,
            line_of_rotation: None,
            line_segment_in_world: LineSegment2::invalid(),
            verification: MajorityVoteFilter::new(config.verification_window),
            is_verified: false,
            shrink_count: 0,
            config,
        }
    }

    /// Update the rotation estimate against the current support polygon.
    pub fn compute(&mut self, measurement: &FootholdMeasurement<'_>, contact: &ContactState) {
        let omega_sole = measurement
            .sole_pose
            .rotation
            .inverse_transform_vector(measurement.angular_velocity);
        let omega = self
            .angular_velocity_filtered
            .update(Vector2::new(omega_sole.x, omega_sole.y));

        self.angle_of_lor = omega.y.atan2(omega.x);
        self.lor_angular_velocity_filtered
            .update_for_angle(self.angle_of_lor);

        let cop_error = self
            .cop_error_filtered
            .update(measurement.desired_cop - measurement.measured_cop);
        self.cop_error_perpendicular = cop_error.perp(&omega);

        let cor = self
            .cor_position_filtered
            .update(measurement.measured_cop.coords);
        let cor_velocity = self.cor_velocity_filtered.update(cor);
        self.cor_transversal_velocity = cor_velocity.perp(&omega);

        if !self.has_been_initialized {
            self.has_been_initialized = true;
            return;
        }

        self.is_lor_stable = self.lor_angular_velocity_filtered.value().abs()
            < self.config.stable_lor_angular_velocity_threshold;
        self.is_cor_stable =
            self.cor_transversal_velocity.abs() < self.config.stable_cor_linear_velocity_threshold;
        self.angular_velocity_around_lor = omega.norm();
        self.is_angular_velocity_past_threshold =
            self.angular_velocity_around_lor > self.config.angular_velocity_around_lor_threshold;
        self.is_rotating =
            self.is_lor_stable && self.is_cor_stable && self.is_angular_velocity_past_threshold;

        self.line_of_rotation = None;
        self.line_segment_in_world = LineSegment2::invalid();
        if !self.is_rotating {
            return;
        }

        let Some(line) = Line2::new(Point2::from(cor), omega) else {
            return;
        };
        let Some(line_in_world) = line.to_world_xy(measurement.sole_pose) else {
            return;
        };
        let polygon_in_world = contact.support_polygon().to_world_xy(measurement.sole_pose);
        if let LineIntersection::Pair(a, b) = polygon_in_world.intersection_with_line(&line_in_world) {
            self.line_of_rotation = Some(line);
            self.line_segment_in_world = LineSegment2::new(a, b);
        }
    }

    /// Check the current line of rotation against the CoP error.
    fn verify(&self, desired_cop: &Point2<f64>) -> bool {
        let Some(line) = self.line_of_rotation else {
            return false;
        };
        let cop_error = self.cop_error_filtered.value();
        let omega_norm = self.angular_velocity_filtered.value().norm();
        if omega_norm.is_nan() || omega_norm <= 0.0 {
            return false;
        }
        let perpendicular = self.cop_error_perpendicular / omega_norm;
        if perpendicular.is_nan() || perpendicular <= self.config.min_cop_error_perpendicular {
            return false;
        }
        // perpendicular > 0 here, so the error norm is positive.
        let angle = (perpendicular / cop_error.norm()).clamp(-1.0, 1.0).acos();
        angle <= self.config.cop_error_cone_angle && line.side(desired_cop) < 0.0
    }

    /// Run one tick and crop the contact state when a rotation is confirmed.
    /// Returns the number of contact points removed this tick.
    pub fn update(&mut self, measurement: &FootholdMeasurement<'_>, contact: &mut ContactState) -> usize {
        if !self.config.use_partial_foothold {
            return 0;
        }
        self.compute(measurement, contact);
        let raw = self.verify(&measurement.desired_cop);
        self.is_verified = self.verification.update(raw);
        if !self.is_verified || self.shrink_count >= self.config.max_shrink_count {
            return 0;
        }
        let Some(line) = self.line_of_rotation else {
            return 0;
        };

        let to_remove: Vec<usize> = contact
            .points()
            .iter()
            .enumerate()
            .filter(|&(i, p)| contact.in_contact()[i] && line.side(p) < 0.0)
            .map(|(i, _)| i)
            .collect();
        if to_remove.is_empty() {
            return 0;
        }
        let remaining = contact.number_in_contact() - to_remove.len();
        if remaining < self.config.min_contact_points_after_shrink {
            tracing::debug!(
                side = %self.side,
                remaining,
                "foothold shrink rejected, too few points would remain"
            );
            return 0;
        }

        let removed = contact.crop(&to_remove);
        self.shrink_count += 1;
        self.verification.reset();
        self.is_verified = false;
        tracing::info!(
            side = %self.side,
            removed,
            shrink_count = self.shrink_count,
            "foothold shrunk about line of rotation"
        );
        removed
    }

    /// Forget the estimate and the shrink count. Cropping on the contact
    /// state is reset separately by its owner.
    pub fn reset(&mut self) {
        self.angular_velocity_filtered.reset();
        self.cor_position_filtered.reset();
        self.cor_velocity_filtered.reset();
        self.lor_angular_velocity_filtered.reset();
        self.cop_error_filtered.reset();
        self.has_been_initialized = false;
        self.angle_of_lor = 0.0;
        self.cor_transversal_velocity = f64::NAN;
        self.angular_velocity_around_lor = f64::NAN;
        self.cop_error_perpendicular = f64::NAN;
        self.is_lor_stable = false;
        self.is_cor_stable = false;
        self.is_angular_velocity_past_threshold = false;
        self.is_rotating = false;
        self.line_of_rotation = None;
        self.line_segment_in_world = LineSegment2::invalid();
        self.verification.reset();
        self.is_verified = false;
        self.shrink_count = 0;
    }

    #[must_use]
    pub const fn is_rotating(&self) -> bool {
        self.is_rotating
    }

    #[must_use]
    pub const fn is_rotation_verified(&self) -> bool {
        self.is_verified
    }

    #[must_use]
    pub const fn has_been_initialized(&self) -> bool {
        self.has_been_initialized
    }

    /// Line of rotation in the sole frame, if valid this tick.
    #[must_use]
    pub const fn line_of_rotation(&self) -> Option<Line2> {
        self.line_of_rotation
    }

    /// Chord of the support polygon along the line of rotation, world
    /// ground plane. NaN when invalid.
    #[must_use]
    pub const fn line_segment_in_world(&self) -> LineSegment2 {
        self.line_segment_in_world
    }

    /// Filtered center of rotation, sole frame.
    #[must_use]
    pub fn center_of_rotation(&self) -> Point2<f64> {
        Point2::from(self.cor_position_filtered.value())
    }

    #[must_use]
    pub const fn angle_of_lor(&self) -> f64 {
        self.angle_of_lor
    }

    #[must_use]
    pub const fn cor_transversal_velocity(&self) -> f64 {
        self.cor_transversal_velocity
    }

    #[must_use]
    pub const fn angular_velocity_around_lor(&self) -> f64 {
        self.angular_velocity_around_lor
    }

    #[must_use]
    pub const fn shrink_count(&self) -> u32 {
        self.shrink_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use clankers_core::types::ConstraintType;

    fn rectangle() -> Vec<Point2<f64>> {
        vec![
            Point2::new(0.16, 0.05),
            Point2::new(0.16, -0.05),
            Point2::new(-0.08, -0.05),
            Point2::new(-0.08, 0.05),
        ]
    }

    fn full_contact() -> ContactState {
        let mut contact = ContactState::new(&rectangle(), 0.8);
        contact.apply(ConstraintType::HoldPosition, Vector3::z(), 0.8);
        contact
    }

    fn detector() -> PartialFootholdDetector {
        PartialFootholdDetector::new(RobotSide::Left, FootholdConfig::default(), 0.004)
    }

    #[test]
    fn not_rotating_before_primed_compute() {
        let mut detector = detector();
        let contact = full_contact();
        assert!(!detector.is_rotating());
        let pose = Isometry3::identity();
        let omega = Vector3::new(0.0, 3.0, 0.0);
        detector.compute(
            &FootholdMeasurement {
                sole_pose: &pose,
                angular_velocity: &omega,
                measured_cop: Point2::new(0.1, 0.0),
                desired_cop: Point2::new(0.14, 0.0),
            },
            &contact,
        );
        assert!(detector.has_been_initialized());
        assert!(!detector.is_rotating());
        assert!(detector.line_of_rotation().is_none());
    }

    #[test]
    fn steady_pivot_about_ledge_crops_front_points() {
        let mut detector = detector();
        let mut contact = full_contact();
        let pose = Isometry3::identity();
        let omega = Vector3::new(0.0, 2.0, 0.0);
        let measurement = FootholdMeasurement {
            sole_pose: &pose,
            angular_velocity: &omega,
            measured_cop: Point2::new(0.1, 0.0),
            desired_cop: Point2::new(0.14, 0.0),
        };

        assert_eq!(detector.update(&measurement, &mut contact), 0);
        assert_eq!(detector.update(&measurement, &mut contact), 0);
        assert!(detector.is_rotating());
        let segment = detector.line_segment_in_world();
        assert!(segment.is_valid());
        assert_relative_eq!(segment.first.x, 0.1, epsilon = 1e-12);

        assert_eq!(detector.update(&measurement, &mut contact), 2);
        assert!(contact.is_cropped(0));
        assert!(contact.is_cropped(1));
        assert_eq!(contact.number_in_contact(), 2);
        assert_eq!(detector.shrink_count(), 1);
    }

    #[test]
    fn desired_cop_on_supported_side_is_not_verified() {
        let mut detector = detector();
        let mut contact = full_contact();
        let pose = Isometry3::identity();
        let omega = Vector3::new(0.0, 2.0, 0.0);
        let measurement = FootholdMeasurement {
            sole_pose: &pose,
            angular_velocity: &omega,
            measured_cop: Point2::new(0.1, 0.0),
            desired_cop: Point2::new(0.0, 0.0),
        };
        for _ in 0..10 {
            assert_eq!(detector.update(&measurement, &mut contact), 0);
        }
        assert!(detector.is_rotating());
        assert!(!detector.is_rotation_verified());
    }

    #[test]
    fn line_missing_the_polygon_is_invalid() {
        let mut detector = detector();
        let mut contact = full_contact();
        let pose = Isometry3::identity();
        let omega = Vector3::new(0.0, 2.0, 0.0);
        let measurement = FootholdMeasurement {
            sole_pose: &pose,
            angular_velocity: &omega,
            measured_cop: Point2::new(0.5, 0.0),
            desired_cop: Point2::new(0.6, 0.0),
        };
        for _ in 0..5 {
            detector.update(&measurement, &mut contact);
        }
        assert!(detector.is_rotating());
        assert!(detector.line_of_rotation().is_none());
        assert!(!detector.line_segment_in_world().is_valid());
        assert_eq!(contact.number_cropped(), 0);
    }

    #[test]
    fn slow_rotation_is_noise() {
        let mut detector = detector();
        let mut contact = full_contact();
        let pose = Isometry3::identity();
        let omega = Vector3::new(0.0, 0.2, 0.0);
        let measurement = FootholdMeasurement {
            sole_pose: &pose,
            angular_velocity: &omega,
            measured_cop: Point2::new(0.1, 0.0),
            desired_cop: Point2::new(0.14, 0.0),
        };
        for _ in 0..10 {
            detector.update(&measurement, &mut contact);
        }
        assert!(!detector.is_rotating());
    }

    #[test]
    fn reset_clears_estimate() {
        let mut detector = detector();
        let mut contact = full_contact();
        let pose = Isometry3::identity();
        let omega = Vector3::new(0.0, 2.0, 0.0);
        let measurement = FootholdMeasurement {
            sole_pose: &pose,
            angular_velocity: &omega,
            measured_cop: Point2::new(0.1, 0.0),
            desired_cop: Point2::new(0.14, 0.0),
        };
        for _ in 0..3 {
            detector.update(&measurement, &mut contact);
        }
        detector.reset();
        assert!(!detector.is_rotating());
        assert!(!detector.has_been_initialized());
        assert_eq!(detector.shrink_count(), 0);
        assert!(detector.center_of_rotation().x.is_nan());
    }

    #[test]
    fn disabled_detector_never_crops() {
        let config = FootholdConfig {
            use_partial_foothold: false,
            ..FootholdConfig::default()
        };
        let mut detector = PartialFootholdDetector::new(RobotSide::Right, config, 0.004);
        let mut contact = full_contact();
        let pose = Isometry3::identity();
        let omega = Vector3::new(0.0, 2.0, 0.0);
        let measurement = FootholdMeasurement {
            sole_pose: &pose,
            angular_velocity: &omega,
            measured_cop: Point2::new(0.1, 0.0),
            desired_cop: Point2::new(0.14, 0.0),
        };
        for _ in 0..10 {
            assert_eq!(detector.update(&measurement, &mut contact), 0);
        }
        assert!(!detector.has_been_initialized());
    }
}
