//! Toe-off arbitration.
//!
//! Decides when the trailing foot should pivot onto its toes, and whether it
//! does so on the toe line or a single toe point. Gates are evaluated in the
//! world ground plane and glitch-filtered so a single noisy tick cannot
//! start or cancel a toe-off.

use clankers_core::config::ToeOffConfig;
use clankers_core::traits::ToeOffCalculator;
use clankers_core::types::{Footstep, RobotSide};
use nalgebra::{Isometry3, Point2, Point3};

use crate::filters::GlitchFilter;
use crate::geometry::{sole_to_world_xy, world_xy_to_sole, ConvexPolygon2, LineSegment2};

/// Result of one arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToeOffDecision {
    /// Pivot about the toe line.
    pub use_line: bool,
    /// Pivot about a single toe point.
    pub use_point: bool,
    /// Toe geometry should keep being recomputed from the CMP.
    pub keep_recomputing: bool,
}

impl ToeOffDecision {
    #[must_use]
    pub const fn is_toe_off(&self) -> bool {
        self.use_line || self.use_point
    }
}

/// Balance signals for one evaluation, world ground plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToeOffSignals {
    pub exit_cmp: Option<Point2<f64>>,
    pub desired_ecmp: Point2<f64>,
    pub desired_cop: Point2<f64>,
    pub desired_icp: Point2<f64>,
    pub current_icp: Point2<f64>,
}

/// Snapshot of the foot that would pivot.
#[derive(Debug, Clone, Copy)]
pub struct TrailingFoot<'a> {
    pub side: RobotSide,
    pub sole_pose: &'a Isometry3<f64>,
    pub ankle_pitch: f64,
    pub ankle_pitch_lower_limit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToeContact {
    Line,
    Point,
}

#[derive(Debug, Clone)]
pub struct ToeOffArbiter {
    config: ToeOffConfig,
    default_foot_points: Vec<Point2<f64>>,
    foot_length: f64,

    leading_polygon: ConvexPolygon2,
    on_toes_polygon: ConvexPolygon2,
    toe_line: LineSegment2,
    toe_point: Point2<f64>,

    desired_icp_ok: GlitchFilter,
    current_icp_ok: GlitchFilter,
    desired_ecmp_ok: GlitchFilter,
    desired_cop_ok: GlitchFilter,
    ankle_at_limit: GlitchFilter,

    need_toe_off_for_ankle_limit: bool,
    required_icp_proximity: f64,
    step_height: f64,

    compute_line: bool,
    compute_point: bool,
    do_line: bool,
    do_point: bool,
}

impl ToeOffArbiter {
    /// `default_foot_points` is the nominal foot polygon, sole frame.
    #[must_use]
    pub fn new(config: ToeOffConfig, default_foot_points: &[Point2<f64>], foot_length: f64) -> Self {
        let small = config.small_glitch_window;
        let large = config.large_glitch_window;
        Self {
            config,
            default_foot_points: default_foot_points.to_vec(),
            foot_length,
            leading_polygon: ConvexPolygon2::default(),
            on_toes_polygon: ConvexPolygon2::default(),
            toe_line: LineSegment2::invalid(),
            toe_point: Point2::new(f64::NAN, f64::NAN),
            desired_icp_ok: GlitchFilter::new(small),
            current_icp_ok: GlitchFilter::new(small),
            desired_ecmp_ok: GlitchFilter::new(small),
            desired_cop_ok: GlitchFilter::new(small),
            ankle_at_limit: GlitchFilter::new(large),
            need_toe_off_for_ankle_limit: false,
            required_icp_proximity: 0.0,
            step_height: 0.0,
            compute_line: true,
            compute_point: true,
            do_line: false,
            do_point: false,
        }
    }

    pub fn reset(&mut self) {
        self.desired_icp_ok.reset();
        self.current_icp_ok.reset();
        self.desired_ecmp_ok.reset();
        self.desired_cop_ok.reset();
        self.ankle_at_limit.reset();
        self.need_toe_off_for_ankle_limit = false;
        self.compute_line = true;
        self.compute_point = true;
        self.do_line = false;
        self.do_point = false;
    }

    fn disable(&mut self) -> ToeOffDecision {
        self.desired_icp_ok.reset();
        self.current_icp_ok.reset();
        self.desired_ecmp_ok.reset();
        self.desired_cop_ok.reset();
        self.need_toe_off_for_ankle_limit = false;
        self.compute_line = false;
        self.compute_point = false;
        self.do_line = false;
        self.do_point = false;
        self.decision()
    }

    /// Evaluate during single support. The leading polygon is predicted from
    /// the upcoming footstep.
    pub fn update_single_support(
        &mut self,
        trailing: &TrailingFoot<'_>,
        next_footstep: &Footstep,
        signals: &ToeOffSignals,
        calculator: &mut dyn ToeOffCalculator,
    ) -> ToeOffDecision {
        if !self.config.do_toe_off_if_possible_in_single_support {
            return self.disable();
        }
        let predicted = if next_footstep.predicted_contact_points.is_empty() {
            &self.default_foot_points
        } else {
            &next_footstep.predicted_contact_points
        };
        let world: Vec<Point2<f64>> = predicted
            .iter()
            .map(|p| sole_to_world_xy(&next_footstep.pose, p))
            .collect();
        self.leading_polygon = ConvexPolygon2::from_points(&world);

        let contact = if self.config.use_toe_line_contact_in_swing {
            ToeContact::Line
        } else {
            ToeContact::Point
        };
        self.evaluate(
            trailing,
            &next_footstep.pose,
            contact,
            self.config.icp_percent_of_stance_for_ss,
            signals,
            calculator,
        )
    }

    /// Evaluate during double support. `leading_contact_points` are the
    /// leading foot's in-contact points in the world ground plane; empty
    /// falls back to the nominal foot at `leading_sole_pose`.
    pub fn update_double_support(
        &mut self,
        trailing: &TrailingFoot<'_>,
        leading_sole_pose: &Isometry3<f64>,
        leading_contact_points: &[Point2<f64>],
        signals: &ToeOffSignals,
        calculator: &mut dyn ToeOffCalculator,
    ) -> ToeOffDecision {
        if !self.config.do_toe_off_if_possible {
            self.ankle_at_limit.reset();
            return self.disable();
        }
        self.leading_polygon = if leading_contact_points.is_empty() {
            let world: Vec<Point2<f64>> = self
                .default_foot_points
                .iter()
                .map(|p| sole_to_world_xy(leading_sole_pose, p))
                .collect();
            ConvexPolygon2::from_points(&world)
        } else {
            ConvexPolygon2::from_points(leading_contact_points)
        };

        let contact = if self.config.use_toe_line_contact_in_transfer {
            ToeContact::Line
        } else {
            ToeContact::Point
        };
        self.evaluate(
            trailing,
            leading_sole_pose,
            contact,
            self.config.icp_percent_of_stance_for_ds,
            signals,
            calculator,
        )
    }

    fn evaluate(
        &mut self,
        trailing: &TrailingFoot<'_>,
        leading_sole_pose: &Isometry3<f64>,
        contact: ToeContact,
        percent_proximity: f64,
        signals: &ToeOffSignals,
        calculator: &mut dyn ToeOffCalculator,
    ) -> ToeOffDecision {
        match contact {
            ToeContact::Line => self.compute_point = false,
            ToeContact::Point => self.compute_line = false,
        }

        self.update_toe_geometry(trailing, contact, signals, calculator);
        self.check_icp_locations(trailing, leading_sole_pose, percent_proximity, signals);
        self.check_cop_location(&signals.desired_cop);
        self.check_ecmp_location(&signals.desired_ecmp);

        if self.evaluate_conditions(trailing, contact) {
            let ready = self.is_front_foot_well_positioned(trailing.side, trailing.sole_pose, leading_sole_pose);
            let (compute, active) = if ready {
                (self.config.update_contact_during_toe_off, true)
            } else {
                (true, false)
            };
            self.set_contact_flags(contact, compute, active);
        }

        let decision = self.decision();
        if decision.is_toe_off() {
            tracing::debug!(
                side = %trailing.side,
                line = decision.use_line,
                ankle_limit = self.need_toe_off_for_ankle_limit,
                "toe-off conditions met"
            );
        }
        decision
    }

    fn set_contact_flags(&mut self, contact: ToeContact, compute: bool, active: bool) {
        match contact {
            ToeContact::Line => {
                self.compute_line = compute;
                self.do_line = active;
            }
            ToeContact::Point => {
                self.compute_point = compute;
                self.do_point = active;
            }
        }
    }

    fn update_toe_geometry(
        &mut self,
        trailing: &TrailingFoot<'_>,
        contact: ToeContact,
        signals: &ToeOffSignals,
        calculator: &mut dyn ToeOffCalculator,
    ) {
        let pose = trailing.sole_pose;
        let desired_cmp = match signals.exit_cmp {
            Some(exit) => {
                calculator.set_exit_cmp(world_xy_to_sole(pose, &exit));
                Some(world_xy_to_sole(pose, &signals.desired_ecmp))
            }
            None => {
                calculator.clear();
                None
            }
        };

        let mut vertices: Vec<Point2<f64>> = self.leading_polygon.vertices().to_vec();
        match contact {
            ToeContact::Line => {
                calculator.compute_toe_off_contact_line(desired_cmp);
                let line = calculator.toe_off_contact_line();
                self.toe_line = LineSegment2::new(
                    sole_to_world_xy(pose, &line.first),
                    sole_to_world_xy(pose, &line.second),
                );
                self.toe_point = self.toe_line.midpoint();
                vertices.push(self.toe_line.first);
                vertices.push(self.toe_line.second);
            }
            ToeContact::Point => {
                calculator.compute_toe_off_contact_point(desired_cmp);
                self.toe_point = sole_to_world_xy(pose, &calculator.toe_off_contact_point());
                vertices.push(self.toe_point);
            }
        }
        self.on_toes_polygon = ConvexPolygon2::from_points(&vertices);
    }

    fn check_icp_locations(
        &mut self,
        trailing: &TrailingFoot<'_>,
        leading_sole_pose: &Isometry3<f64>,
        percent_proximity: f64,
        signals: &ToeOffSignals,
    ) {
        let (desired_ok, current_ok) = if percent_proximity > 0.0 {
            let leading = world_xy_to_sole(trailing.sole_pose, &position_xy(leading_sole_pose));
            let toe = world_xy_to_sole(trailing.sole_pose, &self.toe_point);
            self.required_icp_proximity = percent_proximity * (leading - toe).norm();
            let ok = |icp: &Point2<f64>| {
                self.on_toes_polygon.is_point_inside(icp, 0.0)
                    && self.leading_polygon.distance(icp) < self.required_icp_proximity
            };
            (ok(&signals.desired_icp), ok(&signals.current_icp))
        } else {
            self.required_icp_proximity = 0.0;
            (
                self.leading_polygon.is_point_inside(&signals.desired_icp, 0.0),
                self.leading_polygon.is_point_inside(&signals.current_icp, 0.0),
            )
        };
        self.desired_icp_ok.update(desired_ok);
        self.current_icp_ok.update(current_ok);
    }

    fn check_ecmp_location(&mut self, desired_ecmp: &Point2<f64>) {
        if self.config.check_ecmp_location {
            let ok = self.on_toes_polygon.distance(desired_ecmp) <= self.config.ecmp_proximity_for_toe_off;
            self.desired_ecmp_ok.update(ok);
        } else {
            self.desired_ecmp_ok.set(true);
        }
    }

    fn check_cop_location(&mut self, desired_cop: &Point2<f64>) {
        if self.config.check_cop_location {
            let ok = self.on_toes_polygon.distance(desired_cop) <= self.config.cop_proximity_for_toe_off;
            self.desired_cop_ok.update(ok);
        } else {
            self.desired_cop_ok.set(true);
        }
    }

    fn check_ankle_limit(&mut self, trailing: &TrailingFoot<'_>) -> bool {
        let lower_limit = (trailing.ankle_pitch_lower_limit + self.config.ankle_limit_margin)
            .max(self.config.ankle_lower_limit_to_trigger_toe_off);
        let at_limit = self.ankle_at_limit.update(trailing.ankle_pitch < lower_limit);
        self.config.do_toe_off_when_hitting_ankle_limit
            && self.desired_icp_ok.value()
            && self.current_icp_ok.value()
            && at_limit
    }

    /// Returns true when the front-foot placement check should decide.
    fn evaluate_conditions(&mut self, trailing: &TrailingFoot<'_>, contact: ToeContact) -> bool {
        if !self.desired_icp_ok.value() || !self.current_icp_ok.value() {
            self.set_contact_flags(contact, true, false);
            return false;
        }

        self.need_toe_off_for_ankle_limit = self.check_ankle_limit(trailing);
        if self.need_toe_off_for_ankle_limit {
            self.set_contact_flags(contact, self.config.update_contact_during_toe_off, true);
            return false;
        }

        // A point contact ignores the CoP gate.
        let cop_ok = contact == ToeContact::Point || self.desired_cop_ok.value();
        if !self.desired_ecmp_ok.value() || !cop_ok {
            self.set_contact_flags(contact, true, false);
            return false;
        }
        true
    }

    /// Geometric precheck on where the front foot lands relative to the
    /// trailing sole.
    #[must_use]
    pub fn is_front_foot_well_positioned(
        &mut self,
        trailing_side: RobotSide,
        trailing_sole_pose: &Isometry3<f64>,
        front_sole_pose: &Isometry3<f64>,
    ) -> bool {
        let front_world = Point3::from(front_sole_pose.translation.vector);
        let front = trailing_sole_pose.inverse_transform_point(&front_world);
        self.step_height = front_sole_pose.translation.vector.z - trailing_sole_pose.translation.vector.z;

        let mut lateral = front.y;
        if lateral.abs() > self.config.in_place_width {
            lateral += trailing_side.sign() * self.config.in_place_width;
        } else {
            lateral = 0.0;
        }
        let leading = Point2::new(front.x, lateral);

        if self.is_stepping_up() {
            return true;
        }
        if leading.x <= self.config.forward_stepping_threshold {
            return false;
        }
        if self.config.enable_toe_off_for_step_down {
            if self.step_height < -self.config.min_step_height_for_toe_off {
                return true;
            }
        } else if self.step_height < self.config.step_down_too_far {
            return false;
        }
        let side_stepping = leading.y.atan2(leading.x).abs() > self.config.minimum_angle_for_side_stepping;
        if side_stepping && !self.config.do_toe_off_for_side_steps {
            return false;
        }
        leading.coords.norm() > self.config.min_step_length_for_toe_off && leading.x > self.foot_length
    }

    /// Placement check for an upcoming transfer. Without a footstep the
    /// front foot is the opposite foot where it stands.
    pub fn can_do_toe_off(
        &mut self,
        next_footstep: Option<&Footstep>,
        transfer_to_side: RobotSide,
        trailing_sole_pose: &Isometry3<f64>,
        opposite_sole_pose: &Isometry3<f64>,
    ) -> bool {
        let front = next_footstep.map_or(opposite_sole_pose, |step| &step.pose);
        self.is_front_foot_well_positioned(transfer_to_side.opposite(), trailing_sole_pose, front)
    }

    pub fn can_do_single_support_toe_off(
        &mut self,
        next_footstep: Option<&Footstep>,
        transfer_to_side: RobotSide,
        trailing_sole_pose: &Isometry3<f64>,
        opposite_sole_pose: &Isometry3<f64>,
    ) -> bool {
        self.config.do_toe_off_if_possible_in_single_support
            && self.can_do_toe_off(next_footstep, transfer_to_side, trailing_sole_pose, opposite_sole_pose)
    }

    pub fn can_do_double_support_toe_off(
        &mut self,
        next_footstep: Option<&Footstep>,
        transfer_to_side: RobotSide,
        trailing_sole_pose: &Isometry3<f64>,
        opposite_sole_pose: &Isometry3<f64>,
    ) -> bool {
        self.config.do_toe_off_if_possible
            && self.can_do_toe_off(next_footstep, transfer_to_side, trailing_sole_pose, opposite_sole_pose)
    }

    #[must_use]
    pub const fn decision(&self) -> ToeOffDecision {
        ToeOffDecision {
            use_line: self.do_line,
            use_point: self.do_point,
            keep_recomputing: if self.do_point {
                self.compute_point
            } else {
                self.compute_line
            },
        }
    }

    #[must_use]
    pub const fn should_compute_toe_line_contact(&self) -> bool {
        self.compute_line
    }

    #[must_use]
    pub const fn should_compute_toe_point_contact(&self) -> bool {
        self.compute_point
    }

    #[must_use]
    pub fn is_stepping_up(&self) -> bool {
        self.step_height > self.config.min_step_height_for_toe_off
    }

    #[must_use]
    pub const fn step_height(&self) -> f64 {
        self.step_height
    }

    #[must_use]
    pub const fn extra_com_max_height_with_toes(&self) -> f64 {
        self.config.extra_com_max_height_with_toes
    }

    #[must_use]
    pub const fn required_icp_proximity(&self) -> f64 {
        self.required_icp_proximity
    }

    #[must_use]
    pub const fn need_toe_off_for_ankle_limit(&self) -> bool {
        self.need_toe_off_for_ankle_limit
    }

    #[must_use]
    pub const fn leading_polygon(&self) -> &ConvexPolygon2 {
        &self.leading_polygon
    }

    #[must_use]
    pub const fn on_toes_polygon(&self) -> &ConvexPolygon2 {
        &self.on_toes_polygon
    }

    /// World ground plane. Invalid until a line contact was evaluated.
    #[must_use]
    pub const fn toe_line(&self) -> LineSegment2 {
        self.toe_line
    }
}

fn position_xy(pose: &Isometry3<f64>) -> Point2<f64> {
    Point2::new(pose.translation.vector.x, pose.translation.vector.y)
}
