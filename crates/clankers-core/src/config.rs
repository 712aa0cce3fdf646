use nalgebra::{Point2, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Se3Gains;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_control_dt() -> f64 {
    0.004
}
const fn default_true() -> bool {
    true
}
fn default_contact_points() -> Vec<[f64; 2]> {
    vec![[0.16, 0.055], [0.16, -0.055], [-0.08, -0.055], [-0.08, 0.055]]
}
const fn default_ankle_height() -> f64 {
    0.08
}
const fn default_toe_control_offset() -> [f64; 3] {
    [0.16, 0.0, 0.0]
}
const fn default_swing_gains() -> Se3Gains {
    Se3Gains::uniform(150.0, 200.0, 0.7)
}
const fn default_hold_gains() -> Se3Gains {
    Se3Gains {
        position_kp: [100.0, 100.0, 0.0],
        position_zeta: 0.7,
        orientation_kp: [100.0, 100.0, 100.0],
        orientation_zeta: 0.7,
    }
}
const fn default_toe_off_gains() -> Se3Gains {
    Se3Gains {
        position_kp: [200.0, 200.0, 0.0],
        position_zeta: 0.4,
        orientation_kp: [200.0, 200.0, 200.0],
        orientation_zeta: 0.4,
    }
}
const fn default_touchdown_gains() -> Se3Gains {
    Se3Gains {
        position_kp: [0.0; 3],
        position_zeta: 0.7,
        orientation_kp: [300.0, 0.0, 300.0],
        orientation_zeta: 0.7,
    }
}
const fn default_swing_weight() -> f64 {
    20.0
}
const fn default_support_weight() -> f64 {
    50.0
}
const fn default_load_threshold() -> f64 {
    0.2
}
const fn default_cop_on_edge_epsilon() -> f64 {
    5e-3
}
const fn default_friction() -> f64 {
    0.8
}
const fn default_min_jacobian_determinant() -> f64 {
    0.03
}
const fn default_max_nullspace_multiplier() -> f64 {
    3.0
}
const fn default_swing_height() -> f64 {
    0.10
}
const fn default_max_swing_height() -> f64 {
    0.30
}
const fn default_min_swing_time() -> f64 {
    0.3
}
const fn default_speed_up_threshold() -> f64 {
    1.1
}
const fn default_touchdown_velocity() -> [f64; 3] {
    [0.0, 0.0, -0.3]
}
const fn default_touchdown_acceleration() -> [f64; 3] {
    [0.0, 0.0, -1.0]
}
const fn default_waypoint_proportions() -> [f64; 2] {
    [0.15, 0.85]
}
const fn default_obstacle_clearance() -> f64 {
    0.05
}
const fn default_replan_velocity_gain() -> f64 {
    0.5
}
const fn default_max_toe_off_angle() -> f64 {
    0.45
}
const fn default_toes_touchdown_angle() -> f64 {
    0.2
}
const fn default_heel_touchdown_angle() -> f64 {
    -0.2
}
const fn default_touchdown_duration() -> f64 {
    0.1
}
const fn default_recover_time() -> f64 {
    0.5
}
const fn default_time_to_go_to_corner() -> f64 {
    0.25
}
const fn default_time_to_stay_at_corner() -> f64 {
    0.25
}
const fn default_corner_scale() -> f64 {
    0.9
}
const fn default_spiral_period() -> f64 {
    2.0
}
const fn default_spiral_turns() -> f64 {
    3.0
}
const fn default_cop_command_weight() -> f64 {
    10.0
}
const fn default_foothold_alpha() -> f64 {
    0.9
}
const fn default_stable_lor_angular_velocity() -> f64 {
    2.0
}
const fn default_stable_cor_linear_velocity() -> f64 {
    0.01
}
const fn default_angular_velocity_around_lor() -> f64 {
    0.5
}
const fn default_min_cop_error_perpendicular() -> f64 {
    0.01
}
const fn default_cop_error_cone_angle() -> f64 {
    std::f64::consts::FRAC_PI_6
}
const fn default_max_shrink_count() -> u32 {
    3
}
const fn default_min_contact_points_after_shrink() -> usize {
    2
}
const fn default_verification_window() -> u32 {
    3
}
const fn default_maximum_leg_length() -> f64 {
    0.9
}
const fn default_percent_enable() -> f64 {
    0.87
}
const fn default_percent_disable() -> f64 {
    0.85
}
const fn default_max_percent_in_swing() -> f64 {
    0.97
}
const fn default_max_percent_in_support() -> f64 {
    0.98
}
const fn default_percent_collapse() -> f64 {
    0.83
}
const fn default_min_percent_collapse() -> f64 {
    0.76
}
const fn default_load_enable_collapse() -> f64 {
    0.62
}
const fn default_load_disable_collapse() -> f64 {
    0.59
}
const fn default_collapse_disable_delay() -> f64 {
    0.5
}
const fn default_correction_alpha() -> f64 {
    0.98
}
const fn default_unreachable_alpha() -> f64 {
    0.25
}
const fn default_smooth_exit_epsilon() -> f64 {
    5e-3
}
const fn default_icp_percent_ds() -> f64 {
    0.3
}
const fn default_ecmp_proximity() -> f64 {
    0.04
}
const fn default_cop_proximity() -> f64 {
    0.08
}
const fn default_ankle_trigger() -> f64 {
    -1.0
}
const fn default_ankle_margin() -> f64 {
    0.02
}
const fn default_forward_stepping_threshold() -> f64 {
    -0.05
}
const fn default_step_down_too_far() -> f64 {
    -0.10
}
const fn default_min_side_step_angle() -> f64 {
    std::f64::consts::FRAC_PI_4
}
const fn default_min_step_height() -> f64 {
    0.10
}
const fn default_min_step_length() -> f64 {
    0.40
}
const fn default_in_place_width() -> f64 {
    0.25
}
const fn default_extra_com_height_with_toes() -> f64 {
    0.08
}
const fn default_large_glitch_window() -> u32 {
    10
}
const fn default_small_glitch_window() -> u32 {
    2
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn check_positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be > 0, got {value}")))
    }
}

fn check_non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be >= 0, got {value}")))
    }
}

fn check_alpha(field: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be in [0, 1], got {value}")))
    }
}

fn check_ordered(field: &str, low: f64, high: f64) -> Result<(), ConfigError> {
    if low < high {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("expected {low} < {high}")))
    }
}

fn check_window(field: &str, value: u32) -> Result<(), ConfigError> {
    if value >= 1 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "window must be >= 1"))
    }
}

// ---------------------------------------------------------------------------
// FootControlConfig
// ---------------------------------------------------------------------------

/// Complete per-foot controller configuration.
///
/// Bound once at construction. Values that change at runtime live in the
/// controller's live signals instead.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FootControlConfig {
    #[serde(default)]
    pub control: ControlLoopConfig,
    #[serde(default)]
    pub foot: FootGeometryConfig,
    #[serde(default)]
    pub gains: FootGainsConfig,
    #[serde(default)]
    pub transitions: TransitionConfig,
    #[serde(default)]
    pub swing: SwingStateConfig,
    #[serde(default)]
    pub on_toes: OnToesConfig,
    #[serde(default)]
    pub touchdown: TouchdownConfig,
    #[serde(default)]
    pub exploration: ExplorationConfig,
    #[serde(default)]
    pub foothold: FootholdConfig,
    #[serde(default)]
    pub leg: LegConfig,
    #[serde(default)]
    pub toe_off: ToeOffConfig,
}

impl FootControlConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control.control_dt <= 0.0 || !self.control.control_dt.is_finite() {
            return Err(ConfigError::InvalidControlDt(self.control.control_dt));
        }
        self.foot.validate()?;
        self.transitions.validate()?;
        self.swing.validate()?;
        self.on_toes.validate()?;
        self.touchdown.validate()?;
        self.exploration.validate()?;
        self.foothold.validate()?;
        self.leg.validate()?;
        self.toe_off.validate()?;
        for (name, gains) in [
            ("gains.swing", &self.gains.swing),
            ("gains.hold", &self.gains.hold),
            ("gains.toe_off", &self.gains.toe_off),
            ("gains.touchdown", &self.gains.touchdown),
        ] {
            if gains
                .position_kp
                .iter()
                .chain(gains.orientation_kp.iter())
                .any(|kp| *kp < 0.0)
            {
                return Err(ConfigError::invalid(name, "gains must be non-negative"));
            }
        }
        Ok(())
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Control period in seconds.
    #[must_use]
    pub const fn dt(&self) -> f64 {
        self.control.control_dt
    }
}

// ---------------------------------------------------------------------------
// ControlLoopConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlLoopConfig {
    /// Fixed control period in seconds (default: 0.004 = 250 Hz).
    #[serde(default = "default_control_dt")]
    pub control_dt: f64,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            control_dt: default_control_dt(),
        }
    }
}

// ---------------------------------------------------------------------------
// FootGeometryConfig
// ---------------------------------------------------------------------------

/// Nominal foot contact geometry, sole frame (x forward, y left).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootGeometryConfig {
    /// Ordered contact points `[x, y]`.
    #[serde(default = "default_contact_points")]
    pub contact_points: Vec<[f64; 2]>,
    /// Sole-to-ankle height (m).
    #[serde(default = "default_ankle_height")]
    pub ankle_height: f64,
    /// Toe control frame relative to the sole frame.
    #[serde(default = "default_toe_control_offset")]
    pub toe_control_offset: [f64; 3],
}

impl Default for FootGeometryConfig {
    fn default() -> Self {
        Self {
            contact_points: default_contact_points(),
            ankle_height: default_ankle_height(),
            toe_control_offset: default_toe_control_offset(),
        }
    }
}

impl FootGeometryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.contact_points.len() < 3 {
            return Err(ConfigError::TooFewContactPoints(self.contact_points.len()));
        }
        if self.contact_points.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ConfigError::invalid("foot.contact_points", "must be finite"));
        }
        check_ordered("foot.contact_points", -self.backward_offset(), self.forward_offset())?;
        check_non_negative("foot.ankle_height", self.ankle_height)
    }

    #[must_use]
    pub fn contact_points(&self) -> Vec<Point2<f64>> {
        self.contact_points
            .iter()
            .map(|[x, y]| Point2::new(*x, *y))
            .collect()
    }

    /// Distance from the sole origin to the front edge.
    #[must_use]
    pub fn forward_offset(&self) -> f64 {
        self.contact_points
            .iter()
            .map(|p| p[0])
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Distance from the sole origin to the rear edge (positive).
    #[must_use]
    pub fn backward_offset(&self) -> f64 {
        -self
            .contact_points
            .iter()
            .map(|p| p[0])
            .fold(f64::INFINITY, f64::min)
    }

    #[must_use]
    pub fn foot_length(&self) -> f64 {
        self.forward_offset() + self.backward_offset()
    }

    #[must_use]
    pub fn toe_control_offset(&self) -> Vector3<f64> {
        Vector3::from(self.toe_control_offset)
    }
}

// ---------------------------------------------------------------------------
// FootGainsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FootGainsConfig {
    #[serde(default = "default_swing_gains")]
    pub swing: Se3Gains,
    /// Hold gains. Vertical position is left free.
    #[serde(default = "default_hold_gains")]
    pub hold: Se3Gains,
    #[serde(default = "default_toe_off_gains")]
    pub toe_off: Se3Gains,
    #[serde(default = "default_touchdown_gains")]
    pub touchdown: Se3Gains,
    /// Feedback weight while the foot is unloaded.
    #[serde(default = "default_swing_weight")]
    pub swing_weight: f64,
    /// Feedback weight while the foot carries load.
    #[serde(default = "default_support_weight")]
    pub support_weight: f64,
}

impl Default for FootGainsConfig {
    fn default() -> Self {
        Self {
            swing: default_swing_gains(),
            hold: default_hold_gains(),
            toe_off: default_toe_off_gains(),
            touchdown: default_touchdown_gains(),
            swing_weight: default_swing_weight(),
            support_weight: default_support_weight(),
        }
    }
}

// ---------------------------------------------------------------------------
// TransitionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionConfig {
    /// Load fraction below which a support foot is "barely loaded" (default: 0.2).
    #[serde(default = "default_load_threshold")]
    pub foot_load_threshold_to_hold_position: f64,
    /// Shrink applied to the support polygon for the CoP-on-edge test (m).
    #[serde(default = "default_cop_on_edge_epsilon")]
    pub cop_on_edge_epsilon: f64,
    #[serde(default = "default_friction")]
    pub coefficient_of_friction: f64,
    /// Below this |det J| the leg is reported as badly conditioned.
    #[serde(default = "default_min_jacobian_determinant")]
    pub min_jacobian_determinant: f64,
    #[serde(default = "default_max_nullspace_multiplier")]
    pub max_nullspace_multiplier: f64,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            foot_load_threshold_to_hold_position: default_load_threshold(),
            cop_on_edge_epsilon: default_cop_on_edge_epsilon(),
            coefficient_of_friction: default_friction(),
            min_jacobian_determinant: default_min_jacobian_determinant(),
            max_nullspace_multiplier: default_max_nullspace_multiplier(),
        }
    }
}

impl TransitionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_alpha(
            "transitions.foot_load_threshold_to_hold_position",
            self.foot_load_threshold_to_hold_position,
        )?;
        check_non_negative("transitions.cop_on_edge_epsilon", self.cop_on_edge_epsilon)?;
        check_positive("transitions.coefficient_of_friction", self.coefficient_of_friction)?;
        check_non_negative("transitions.min_jacobian_determinant", self.min_jacobian_determinant)?;
        check_non_negative("transitions.max_nullspace_multiplier", self.max_nullspace_multiplier)
    }
}

// ---------------------------------------------------------------------------
// SwingStateConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingStateConfig {
    /// Apex height used when a footstep does not set one (m).
    #[serde(default = "default_swing_height")]
    pub default_swing_height: f64,
    /// Upper bound on the apex height (m).
    #[serde(default = "default_max_swing_height")]
    pub max_swing_height: f64,
    /// Shortest swing a speed-up may produce (s). Bounds the speed-up factor.
    #[serde(default = "default_min_swing_time")]
    pub min_swing_time_for_disturbance_recovery: f64,
    #[serde(default = "default_true")]
    pub allow_speed_up: bool,
    /// Speed-up requests at or below this factor are ignored.
    #[serde(default = "default_speed_up_threshold")]
    pub speed_up_factor_threshold: f64,
    /// Added to the footstep height at touchdown (m).
    #[serde(default)]
    pub touchdown_height_offset: f64,
    /// Sole velocity at the end of swing, world frame.
    #[serde(default = "default_touchdown_velocity")]
    pub touchdown_velocity: [f64; 3],
    /// Constant acceleration of the touchdown tail, world frame.
    #[serde(default = "default_touchdown_acceleration")]
    pub touchdown_acceleration: [f64; 3],
    /// Fractions of the horizontal path at which the two waypoints sit.
    #[serde(default = "default_waypoint_proportions")]
    pub waypoint_proportions: [f64; 2],
    /// Extra apex height for obstacle-clearance swings (m).
    #[serde(default = "default_obstacle_clearance")]
    pub obstacle_clearance_margin: f64,
    /// Track the toe frame instead of the sole frame.
    #[serde(default)]
    pub control_toe: bool,
    /// Fraction of the velocity mismatch carried by a continuous replan.
    #[serde(default = "default_replan_velocity_gain")]
    pub replan_velocity_correction_gain: f64,
}

impl Default for SwingStateConfig {
    fn default() -> Self {
        Self {
            default_swing_height: default_swing_height(),
            max_swing_height: default_max_swing_height(),
            min_swing_time_for_disturbance_recovery: default_min_swing_time(),
            allow_speed_up: true,
            speed_up_factor_threshold: default_speed_up_threshold(),
            touchdown_height_offset: 0.0,
            touchdown_velocity: default_touchdown_velocity(),
            touchdown_acceleration: default_touchdown_acceleration(),
            waypoint_proportions: default_waypoint_proportions(),
            obstacle_clearance_margin: default_obstacle_clearance(),
            control_toe: false,
            replan_velocity_correction_gain: default_replan_velocity_gain(),
        }
    }
}

impl SwingStateConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_positive("swing.default_swing_height", self.default_swing_height)?;
        check_ordered(
            "swing.max_swing_height",
            self.default_swing_height - f64::EPSILON,
            self.max_swing_height,
        )?;
        check_positive(
            "swing.min_swing_time_for_disturbance_recovery",
            self.min_swing_time_for_disturbance_recovery,
        )?;
        if self.speed_up_factor_threshold < 1.0 {
            return Err(ConfigError::invalid(
                "swing.speed_up_factor_threshold",
                "must be >= 1",
            ));
        }
        let [first, second] = self.waypoint_proportions;
        if !(0.0 < first && first < second && second < 1.0) {
            return Err(ConfigError::invalid(
                "swing.waypoint_proportions",
                "expected 0 < first < second < 1",
            ));
        }
        check_alpha(
            "swing.replan_velocity_correction_gain",
            self.replan_velocity_correction_gain,
        )
    }

    #[must_use]
    pub fn touchdown_velocity(&self) -> Vector3<f64> {
        Vector3::from(self.touchdown_velocity)
    }

    #[must_use]
    pub fn touchdown_acceleration(&self) -> Vector3<f64> {
        Vector3::from(self.touchdown_acceleration)
    }
}

// ---------------------------------------------------------------------------
// OnToesConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OnToesConfig {
    /// Pitch beyond which the toe-off ramp is blocked (rad).
    #[serde(default = "default_max_toe_off_angle")]
    pub maximum_toe_off_angle: f64,
    /// Start with point contact instead of a toe line.
    #[serde(default)]
    pub use_point_contact: bool,
}

impl Default for OnToesConfig {
    fn default() -> Self {
        Self {
            maximum_toe_off_angle: default_max_toe_off_angle(),
            use_point_contact: false,
        }
    }
}

impl OnToesConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_positive("on_toes.maximum_toe_off_angle", self.maximum_toe_off_angle)
    }
}

// ---------------------------------------------------------------------------
// TouchdownConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchdownConfig {
    /// Pitch at first contact on the toes (rad, toes down is positive).
    #[serde(default = "default_toes_touchdown_angle")]
    pub toes_touchdown_angle: f64,
    /// Pitch at first contact on the heel (rad).
    #[serde(default = "default_heel_touchdown_angle")]
    pub heel_touchdown_angle: f64,
    /// Time to rotate down to flat (s).
    #[serde(default = "default_touchdown_duration")]
    pub duration: f64,
}

impl Default for TouchdownConfig {
    fn default() -> Self {
        Self {
            toes_touchdown_angle: default_toes_touchdown_angle(),
            heel_touchdown_angle: default_heel_touchdown_angle(),
            duration: default_touchdown_duration(),
        }
    }
}

impl TouchdownConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_positive("touchdown.duration", self.duration)
    }
}

// ---------------------------------------------------------------------------
// ExplorationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExplorationConfig {
    /// Settle delay before the CoP excursion starts (s).
    #[serde(default = "default_recover_time")]
    pub recover_time: f64,
    #[serde(default = "default_time_to_go_to_corner")]
    pub time_to_go_to_corner: f64,
    #[serde(default = "default_time_to_stay_at_corner")]
    pub time_to_stay_at_corner: f64,
    /// Corner targets sit this fraction of the way from centroid to vertex.
    #[serde(default = "default_corner_scale")]
    pub corner_scale: f64,
    /// Spiral out instead of visiting corners.
    #[serde(default)]
    pub use_spiral: bool,
    #[serde(default = "default_spiral_period")]
    pub spiral_period: f64,
    #[serde(default = "default_spiral_turns")]
    pub spiral_turns: f64,
    #[serde(default = "default_cop_command_weight")]
    pub cop_command_weight: f64,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            recover_time: default_recover_time(),
            time_to_go_to_corner: default_time_to_go_to_corner(),
            time_to_stay_at_corner: default_time_to_stay_at_corner(),
            corner_scale: default_corner_scale(),
            use_spiral: false,
            spiral_period: default_spiral_period(),
            spiral_turns: default_spiral_turns(),
            cop_command_weight: default_cop_command_weight(),
        }
    }
}

impl ExplorationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("exploration.recover_time", self.recover_time)?;
        check_non_negative("exploration.time_to_go_to_corner", self.time_to_go_to_corner)?;
        check_non_negative("exploration.time_to_stay_at_corner", self.time_to_stay_at_corner)?;
        check_positive(
            "exploration.time_per_corner",
            self.time_to_go_to_corner + self.time_to_stay_at_corner,
        )?;
        check_alpha("exploration.corner_scale", self.corner_scale)?;
        check_positive("exploration.spiral_period", self.spiral_period)?;
        check_non_negative("exploration.cop_command_weight", self.cop_command_weight)
    }

    /// Time spent per polygon corner.
    #[must_use]
    pub fn time_per_corner(&self) -> f64 {
        self.time_to_go_to_corner + self.time_to_stay_at_corner
    }
}

// ---------------------------------------------------------------------------
// FootholdConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FootholdConfig {
    #[serde(default = "default_true")]
    pub use_partial_foothold: bool,
    #[serde(default = "default_foothold_alpha")]
    pub angular_velocity_alpha: f64,
    #[serde(default = "default_foothold_alpha")]
    pub cor_position_alpha: f64,
    #[serde(default = "default_foothold_alpha")]
    pub cor_velocity_alpha: f64,
    #[serde(default = "default_foothold_alpha")]
    pub lor_angular_velocity_alpha: f64,
    #[serde(default = "default_foothold_alpha")]
    pub cop_error_alpha: f64,
    /// Max yaw rate of the line of rotation for it to count as stable (rad/s).
    #[serde(default = "default_stable_lor_angular_velocity")]
    pub stable_lor_angular_velocity_threshold: f64,
    /// Max CoR velocity across the line of rotation (m/s).
    #[serde(default = "default_stable_cor_linear_velocity")]
    pub stable_cor_linear_velocity_threshold: f64,
    /// Min foot angular rate about the line of rotation (rad/s).
    #[serde(default = "default_angular_velocity_around_lor")]
    pub angular_velocity_around_lor_threshold: f64,
    /// Min CoP error perpendicular to the line for verification (m).
    #[serde(default = "default_min_cop_error_perpendicular")]
    pub min_cop_error_perpendicular: f64,
    /// Max angle between the CoP error and the line normal (rad).
    #[serde(default = "default_cop_error_cone_angle")]
    pub cop_error_cone_angle: f64,
    #[serde(default = "default_max_shrink_count")]
    pub max_shrink_count: u32,
    #[serde(default = "default_min_contact_points_after_shrink")]
    pub min_contact_points_after_shrink: usize,
    /// Consecutive verified ticks required before cropping.
    #[serde(default = "default_verification_window")]
    pub verification_window: u32,
}

impl Default for FootholdConfig {
    fn default() -> Self {
        Self {
            use_partial_foothold: true,
            angular_velocity_alpha: default_foothold_alpha(),
            cor_position_alpha: default_foothold_alpha(),
            cor_velocity_alpha: default_foothold_alpha(),
            lor_angular_velocity_alpha: default_foothold_alpha(),
            cop_error_alpha: default_foothold_alpha(),
            stable_lor_angular_velocity_threshold: default_stable_lor_angular_velocity(),
            stable_cor_linear_velocity_threshold: default_stable_cor_linear_velocity(),
            angular_velocity_around_lor_threshold: default_angular_velocity_around_lor(),
            min_cop_error_perpendicular: default_min_cop_error_perpendicular(),
            cop_error_cone_angle: default_cop_error_cone_angle(),
            max_shrink_count: default_max_shrink_count(),
            min_contact_points_after_shrink: default_min_contact_points_after_shrink(),
            verification_window: default_verification_window(),
        }
    }
}

impl FootholdConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_alpha("foothold.angular_velocity_alpha", self.angular_velocity_alpha)?;
        check_alpha("foothold.cor_position_alpha", self.cor_position_alpha)?;
        check_alpha("foothold.cor_velocity_alpha", self.cor_velocity_alpha)?;
        check_alpha("foothold.lor_angular_velocity_alpha", self.lor_angular_velocity_alpha)?;
        check_alpha("foothold.cop_error_alpha", self.cop_error_alpha)?;
        check_non_negative(
            "foothold.stable_lor_angular_velocity_threshold",
            self.stable_lor_angular_velocity_threshold,
        )?;
        check_non_negative(
            "foothold.stable_cor_linear_velocity_threshold",
            self.stable_cor_linear_velocity_threshold,
        )?;
        check_non_negative(
            "foothold.angular_velocity_around_lor_threshold",
            self.angular_velocity_around_lor_threshold,
        )?;
        check_positive("foothold.cop_error_cone_angle", self.cop_error_cone_angle)?;
        if self.min_contact_points_after_shrink < 2 {
            return Err(ConfigError::invalid(
                "foothold.min_contact_points_after_shrink",
                "must be >= 2",
            ));
        }
        check_window("foothold.verification_window", self.verification_window)
    }
}

// ---------------------------------------------------------------------------
// LegConfig
// ---------------------------------------------------------------------------

/// Leg-length thresholds, all as fractions of [`LegConfig::maximum_leg_length`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegConfig {
    /// Hip-pitch to ankle distance at full extension (m).
    #[serde(default = "default_maximum_leg_length")]
    pub maximum_leg_length: f64,
    #[serde(default = "default_percent_enable")]
    pub percent_to_enable_singularity_avoidance: f64,
    #[serde(default = "default_percent_disable")]
    pub percent_to_disable_singularity_avoidance: f64,
    #[serde(default = "default_max_percent_in_swing")]
    pub max_percent_in_swing: f64,
    #[serde(default = "default_max_percent_in_support")]
    pub max_percent_in_support: f64,
    #[serde(default = "default_percent_collapse")]
    pub percent_to_enable_collapse_avoidance: f64,
    #[serde(default = "default_min_percent_collapse")]
    pub min_percent_with_collapse_avoidance: f64,
    /// Load fraction above which collapse avoidance may engage.
    #[serde(default = "default_load_enable_collapse")]
    pub load_to_enable_collapse_avoidance: f64,
    #[serde(default = "default_load_disable_collapse")]
    pub load_to_disable_collapse_avoidance: f64,
    /// Collapse avoidance stays on this long after the load drops (s).
    #[serde(default = "default_collapse_disable_delay")]
    pub collapse_disable_delay: f64,
    #[serde(default = "default_correction_alpha")]
    pub correction_alpha: f64,
    #[serde(default = "default_unreachable_alpha")]
    pub unreachable_footstep_alpha: f64,
    /// Filtered and raw height must agree within this before a correction ends (m).
    #[serde(default = "default_smooth_exit_epsilon")]
    pub smooth_exit_epsilon: f64,
    #[serde(default = "default_true")]
    pub use_swing_singularity_avoidance: bool,
    #[serde(default = "default_true")]
    pub use_support_singularity_avoidance: bool,
    #[serde(default = "default_true")]
    pub use_unreachable_footstep_correction: bool,
    #[serde(default)]
    pub use_collapse_avoidance: bool,
}

impl Default for LegConfig {
    fn default() -> Self {
        Self {
            maximum_leg_length: default_maximum_leg_length(),
            percent_to_enable_singularity_avoidance: default_percent_enable(),
            percent_to_disable_singularity_avoidance: default_percent_disable(),
            max_percent_in_swing: default_max_percent_in_swing(),
            max_percent_in_support: default_max_percent_in_support(),
            percent_to_enable_collapse_avoidance: default_percent_collapse(),
            min_percent_with_collapse_avoidance: default_min_percent_collapse(),
            load_to_enable_collapse_avoidance: default_load_enable_collapse(),
            load_to_disable_collapse_avoidance: default_load_disable_collapse(),
            collapse_disable_delay: default_collapse_disable_delay(),
            correction_alpha: default_correction_alpha(),
            unreachable_footstep_alpha: default_unreachable_alpha(),
            smooth_exit_epsilon: default_smooth_exit_epsilon(),
            use_swing_singularity_avoidance: true,
            use_support_singularity_avoidance: true,
            use_unreachable_footstep_correction: true,
            use_collapse_avoidance: false,
        }
    }
}

impl LegConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_positive("leg.maximum_leg_length", self.maximum_leg_length)?;
        check_ordered(
            "leg.percent_to_disable_singularity_avoidance",
            self.percent_to_disable_singularity_avoidance - f64::EPSILON,
            self.percent_to_enable_singularity_avoidance,
        )?;
        check_ordered(
            "leg.max_percent_in_swing",
            self.percent_to_enable_singularity_avoidance,
            self.max_percent_in_swing,
        )?;
        check_ordered(
            "leg.max_percent_in_support",
            self.percent_to_enable_singularity_avoidance,
            self.max_percent_in_support,
        )?;
        check_ordered(
            "leg.min_percent_with_collapse_avoidance",
            self.min_percent_with_collapse_avoidance,
            self.percent_to_enable_collapse_avoidance,
        )?;
        check_ordered(
            "leg.load_to_disable_collapse_avoidance",
            self.load_to_disable_collapse_avoidance - f64::EPSILON,
            self.load_to_enable_collapse_avoidance,
        )?;
        check_non_negative("leg.collapse_disable_delay", self.collapse_disable_delay)?;
        check_alpha("leg.correction_alpha", self.correction_alpha)?;
        check_alpha("leg.unreachable_footstep_alpha", self.unreachable_footstep_alpha)?;
        check_non_negative("leg.smooth_exit_epsilon", self.smooth_exit_epsilon)
    }
}

// ---------------------------------------------------------------------------
// ToeOffConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToeOffConfig {
    #[serde(default = "default_true")]
    pub do_toe_off_if_possible: bool,
    #[serde(default)]
    pub do_toe_off_if_possible_in_single_support: bool,
    #[serde(default = "default_true")]
    pub check_ecmp_location: bool,
    #[serde(default)]
    pub check_cop_location: bool,
    /// ICP proximity as a fraction of stance length in double support.
    /// Zero or less means the ICP must be strictly inside the leading polygon.
    #[serde(default = "default_icp_percent_ds")]
    pub icp_percent_of_stance_for_ds: f64,
    #[serde(default)]
    pub icp_percent_of_stance_for_ss: f64,
    #[serde(default = "default_ecmp_proximity")]
    pub ecmp_proximity_for_toe_off: f64,
    #[serde(default = "default_cop_proximity")]
    pub cop_proximity_for_toe_off: f64,
    #[serde(default = "default_ankle_trigger")]
    pub ankle_lower_limit_to_trigger_toe_off: f64,
    /// Margin above the joint lower limit counted as "at the limit" (rad).
    #[serde(default = "default_ankle_margin")]
    pub ankle_limit_margin: f64,
    #[serde(default)]
    pub do_toe_off_when_hitting_ankle_limit: bool,
    #[serde(default = "default_true")]
    pub use_toe_line_contact_in_transfer: bool,
    #[serde(default)]
    pub use_toe_line_contact_in_swing: bool,
    /// Keep recomputing the toe geometry once toe-off has started.
    #[serde(default)]
    pub update_contact_during_toe_off: bool,
    #[serde(default = "default_forward_stepping_threshold")]
    pub forward_stepping_threshold: f64,
    #[serde(default = "default_step_down_too_far")]
    pub step_down_too_far: f64,
    #[serde(default = "default_min_side_step_angle")]
    pub minimum_angle_for_side_stepping: f64,
    #[serde(default)]
    pub do_toe_off_for_side_steps: bool,
    #[serde(default = "default_true")]
    pub enable_toe_off_for_step_down: bool,
    #[serde(default = "default_min_step_height")]
    pub min_step_height_for_toe_off: f64,
    #[serde(default = "default_min_step_length")]
    pub min_step_length_for_toe_off: f64,
    /// Lateral foot spacing of an in-place stance (m). Lateral offsets below
    /// it do not count as side-stepping.
    #[serde(default = "default_in_place_width")]
    pub in_place_width: f64,
    #[serde(default = "default_extra_com_height_with_toes")]
    pub extra_com_max_height_with_toes: f64,
    #[serde(default = "default_large_glitch_window")]
    pub large_glitch_window: u32,
    #[serde(default = "default_small_glitch_window")]
    pub small_glitch_window: u32,
}

impl Default for ToeOffConfig {
    fn default() -> Self {
        Self {
            do_toe_off_if_possible: true,
            do_toe_off_if_possible_in_single_support: false,
            check_ecmp_location: true,
            check_cop_location: false,
            icp_percent_of_stance_for_ds: default_icp_percent_ds(),
            icp_percent_of_stance_for_ss: 0.0,
            ecmp_proximity_for_toe_off: default_ecmp_proximity(),
            cop_proximity_for_toe_off: default_cop_proximity(),
            ankle_lower_limit_to_trigger_toe_off: default_ankle_trigger(),
            ankle_limit_margin: default_ankle_margin(),
            do_toe_off_when_hitting_ankle_limit: false,
            use_toe_line_contact_in_transfer: true,
            use_toe_line_contact_in_swing: false,
            update_contact_during_toe_off: false,
            forward_stepping_threshold: default_forward_stepping_threshold(),
            step_down_too_far: default_step_down_too_far(),
            minimum_angle_for_side_stepping: default_min_side_step_angle(),
            do_toe_off_for_side_steps: false,
            enable_toe_off_for_step_down: true,
            min_step_height_for_toe_off: default_min_step_height(),
            min_step_length_for_toe_off: default_min_step_length(),
            in_place_width: default_in_place_width(),
            extra_com_max_height_with_toes: default_extra_com_height_with_toes(),
            large_glitch_window: default_large_glitch_window(),
            small_glitch_window: default_small_glitch_window(),
        }
    }
}

impl ToeOffConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("toe_off.ecmp_proximity_for_toe_off", self.ecmp_proximity_for_toe_off)?;
        check_non_negative("toe_off.cop_proximity_for_toe_off", self.cop_proximity_for_toe_off)?;
        check_non_negative("toe_off.ankle_limit_margin", self.ankle_limit_margin)?;
        check_non_negative("toe_off.in_place_width", self.in_place_width)?;
        check_window("toe_off.large_glitch_window", self.large_glitch_window)?;
        check_window("toe_off.small_glitch_window", self.small_glitch_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_config_is_valid() {
        FootControlConfig::default().validate().unwrap();
    }

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = FootControlConfig::default();
        assert_relative_eq!(config.transitions.foot_load_threshold_to_hold_position, 0.2);
        assert_relative_eq!(config.transitions.coefficient_of_friction, 0.8);
        assert_relative_eq!(config.leg.percent_to_enable_singularity_avoidance, 0.87);
        assert_relative_eq!(config.leg.max_percent_in_swing, 0.97);
        assert_relative_eq!(config.foothold.stable_lor_angular_velocity_threshold, 2.0);
        assert_relative_eq!(config.toe_off.extra_com_max_height_with_toes, 0.08);
        assert!(!config.leg.use_collapse_avoidance);
    }

    #[test]
    fn foot_geometry_offsets() {
        let foot = FootGeometryConfig::default();
        assert_relative_eq!(foot.forward_offset(), 0.16);
        assert_relative_eq!(foot.backward_offset(), 0.08);
        assert_relative_eq!(foot.foot_length(), 0.24);
        assert_eq!(foot.contact_points().len(), 4);
    }

    #[test]
    fn rejects_non_positive_dt() {
        let mut config = FootControlConfig::default();
        config.control.control_dt = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidControlDt(_))
        ));
    }

    #[test]
    fn rejects_too_few_contact_points() {
        let mut config = FootControlConfig::default();
        config.foot.contact_points.truncate(2);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooFewContactPoints(2))
        ));
    }

    #[test]
    fn rejects_inverted_leg_thresholds() {
        let mut config = FootControlConfig::default();
        config.leg.max_percent_in_swing = 0.8;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rejects_alpha_out_of_range() {
        let mut config = FootControlConfig::default();
        config.foothold.cop_error_alpha = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("foothold.cop_error_alpha"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = FootControlConfig::from_toml_str(
            r"
            [control]
            control_dt = 0.002

            [leg]
            maximum_leg_length = 0.95
            use_collapse_avoidance = true

            [exploration]
            time_to_go_to_corner = 0.3
            ",
        )
        .unwrap();
        assert_relative_eq!(config.dt(), 0.002);
        assert_relative_eq!(config.leg.maximum_leg_length, 0.95);
        assert!(config.leg.use_collapse_avoidance);
        assert_relative_eq!(config.exploration.time_to_go_to_corner, 0.3);
        assert_relative_eq!(config.exploration.time_to_stay_at_corner, 0.25);
        assert_eq!(config.foot, FootGeometryConfig::default());
    }

    #[test]
    fn toml_errors_surface_as_config_errors() {
        let err = FootControlConfig::from_toml_str("[leg]\nmaximum_leg_length = \"far\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn from_file_missing_path_is_io_error() {
        let err = FootControlConfig::from_file("/nonexistent/foot.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
