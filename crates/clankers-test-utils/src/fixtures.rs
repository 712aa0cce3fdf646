//! Foot geometry, configuration and tick-input builders.

use clankers_core::config::FootControlConfig;
use clankers_core::types::{FootTickInput, Footstep, RobotSide};
use nalgebra::{Isometry3, Point2, Point3, Translation3, UnitQuaternion, Vector3};

/// Lateral distance of each sole from the pelvis centre line.
pub const HALF_STANCE_WIDTH: f64 = 0.1;

/// Rectangular foot, sole frame: `forward` ahead of the ankle, `backward`
/// behind it, `half_width` to either side.
pub fn rectangle_foot(forward: f64, backward: f64, half_width: f64) -> Vec<Point2<f64>> {
    vec![
        Point2::new(forward, half_width),
        Point2::new(forward, -half_width),
        Point2::new(-backward, -half_width),
        Point2::new(-backward, half_width),
    ]
}

/// Default configuration with avoidance disabled during swing, so swing
/// trajectories reach their footsteps exactly.
pub fn test_config() -> FootControlConfig {
    let mut config = FootControlConfig::default();
    config.leg.use_swing_singularity_avoidance = false;
    config
}

/// Sole pose for `side` at `x` along the walking direction.
pub fn sole_at(side: RobotSide, x: f64) -> Isometry3<f64> {
    Isometry3::translation(x, side.sign() * HALF_STANCE_WIDTH, 0.0)
}

/// Footstep for `side` at `x`, flat on the ground.
pub fn footstep_at(side: RobotSide, x: f64) -> Footstep {
    Footstep::new(side, sole_at(side, x))
}

/// Builder for [`FootTickInput`].
#[derive(Debug, Clone)]
pub struct TickInputBuilder {
    input: FootTickInput,
}

impl TickInputBuilder {
    /// Flat foot carrying `load_fraction` of the weight, CoP at `cop`.
    pub fn standing(side: RobotSide, x: f64, load_fraction: f64, cop: Point2<f64>) -> Self {
        Self {
            input: FootTickInput {
                sole_pose: sole_at(side, x),
                measured_cop: Some(cop),
                desired_cop: Some(cop),
                load_fraction,
                ..FootTickInput::default()
            },
        }
    }

    /// Unloaded foot at `pose`.
    pub fn airborne(pose: Isometry3<f64>) -> Self {
        Self {
            input: FootTickInput {
                sole_pose: pose,
                measured_cop: None,
                desired_cop: None,
                load_fraction: 0.0,
                ..FootTickInput::default()
            },
        }
    }

    #[must_use]
    pub fn pitched(mut self, pitch: f64) -> Self {
        let translation = self.input.sole_pose.translation;
        let (roll, _, yaw) = self.input.sole_pose.rotation.euler_angles();
        self.input.sole_pose = Isometry3::from_parts(
            Translation3::from(translation.vector),
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        );
        self
    }

    #[must_use]
    pub fn raised(mut self, z: f64) -> Self {
        self.input.sole_pose.translation.vector.z = z;
        self
    }

    #[must_use]
    pub fn with_angular_velocity(mut self, angular_velocity: Vector3<f64>) -> Self {
        self.input.angular_velocity = angular_velocity;
        self
    }

    #[must_use]
    pub fn with_linear_velocity(mut self, linear_velocity: Vector3<f64>) -> Self {
        self.input.linear_velocity = linear_velocity;
        self
    }

    #[must_use]
    pub fn with_jacobian_determinant(mut self, determinant: f64) -> Self {
        self.input.jacobian_determinant = Some(determinant);
        self
    }

    /// Ankle pitch and its lower joint limit.
    #[must_use]
    pub fn with_ankle_pitch(mut self, pitch: f64, lower_limit: f64) -> Self {
        self.input.leg.ankle_pitch = pitch;
        self.input.leg.ankle_pitch_lower_limit = lower_limit;
        self
    }

    /// Hip and ankle positions, world frame.
    #[must_use]
    pub fn with_leg(mut self, hip: Point3<f64>, ankle: Point3<f64>) -> Self {
        self.input.leg.hip_pitch_position = hip;
        self.input.leg.ankle_position = ankle;
        self
    }

    pub fn build(self) -> FootTickInput {
        self.input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_is_counter_clockwise_from_front_left() {
        let points = rectangle_foot(0.16, 0.08, 0.05);
        assert_eq!(points[0], Point2::new(0.16, 0.05));
        assert_eq!(points[2], Point2::new(-0.08, -0.05));
    }

    #[test]
    fn soles_are_placed_by_side() {
        assert!(sole_at(RobotSide::Left, 0.0).translation.vector.y > 0.0);
        assert!(sole_at(RobotSide::Right, 0.0).translation.vector.y < 0.0);
    }

    #[test]
    fn builder_keeps_position_when_pitched() {
        let input = TickInputBuilder::standing(RobotSide::Left, 0.2, 0.5, Point2::origin())
            .raised(0.03)
            .pitched(0.3)
            .build();
        let (_, pitch, _) = input.sole_pose.rotation.euler_angles();
        assert!((pitch - 0.3).abs() < 1e-12);
        assert!((input.sole_pose.translation.vector.x - 0.2).abs() < 1e-12);
        assert!((input.sole_pose.translation.vector.z - 0.03).abs() < 1e-12);
    }

    #[test]
    fn airborne_input_has_no_cop() {
        let input = TickInputBuilder::airborne(Isometry3::identity()).build();
        assert!(input.measured_cop.is_none());
        assert!(input.load_fraction.abs() < f64::EPSILON);
    }
}
