use std::f64::consts::TAU;

use clankers_core::config::{ExplorationConfig, FootControlConfig};
use clankers_core::types::{
    CenterOfPressureCommand, ConstraintType, RobotSide, SpatialAccelerationCommand, SpatialFeedbackCommand,
};
use nalgebra::{Point2, Vector2};

use super::{rigid_constraint, FootControlState, StateContext};

/// Tolerance on the exploration end time against accumulated tick error.
const DONE_TIME_TOLERANCE: f64 = 1e-9;

/// Flat foot probing its own foothold by walking the CoP around the support
/// polygon after a settle delay.
#[derive(Debug, Clone)]
pub struct FootholdExplorationState {
    config: ExplorationConfig,
    acceleration: SpatialAccelerationCommand,
    cop_command: Option<CenterOfPressureCommand>,
    side: RobotSide,
    centroid: Point2<f64>,
    targets: Vec<Point2<f64>>,
    spiral_radius: f64,
    current_corner: Option<usize>,
    is_done: bool,
}

impl FootholdExplorationState {
    #[must_use]
    pub fn new(side: RobotSide, config: &FootControlConfig) -> Self {
        Self {
            config: config.exploration,
            acceleration: rigid_constraint(side),
            cop_command: None,
            side,
            centroid: Point2::origin(),
            targets: Vec::new(),
            spiral_radius: 0.0,
            current_corner: None,
            is_done: false,
        }
    }

    #[must_use]
    pub const fn is_done_exploring(&self) -> bool {
        self.is_done
    }

    /// Corner being visited, `None` while settling or once done.
    #[must_use]
    pub const fn current_corner(&self) -> Option<usize> {
        self.current_corner
    }

    /// Time from entry until exploration completes.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn total_duration(&self) -> f64 {
        let excursion = if self.config.use_spiral {
            self.config.spiral_period
        } else {
            self.config.time_per_corner() * self.targets.len() as f64
        };
        self.config.recover_time + excursion
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn corner_target(&mut self, elapsed: f64) -> Point2<f64> {
        let per_corner = self.config.time_per_corner();
        let index = (elapsed / per_corner).floor() as usize;
        let Some(&to) = self.targets.get(index) else {
            self.current_corner = None;
            return self.centroid;
        };
        self.current_corner = Some(index);
        let from = index
            .checked_sub(1)
            .and_then(|previous| self.targets.get(previous))
            .copied()
            .unwrap_or(self.centroid);
        let phase = elapsed - index as f64 * per_corner;
        if phase >= self.config.time_to_go_to_corner {
            return to;
        }
        let ratio = phase / self.config.time_to_go_to_corner;
        from + (to - from) * ratio
    }

    fn spiral_target(&self, elapsed: f64) -> Point2<f64> {
        let progress = (elapsed / self.config.spiral_period).clamp(0.0, 1.0);
        let angle = TAU * self.config.spiral_turns * progress;
        self.centroid + Vector2::new(angle.cos(), angle.sin()) * (progress * self.spiral_radius)
    }
}

impl FootControlState for FootholdExplorationState {
    fn constraint_type(&self) -> ConstraintType {
        ConstraintType::ExplorePolygon
    }

    fn on_enter(&mut self, ctx: &mut StateContext<'_>) {
        let polygon = ctx.contact.support_polygon();
        self.centroid = polygon.centroid();
        let scale = self.config.corner_scale;
        self.targets = polygon
            .vertices()
            .iter()
            .map(|v| self.centroid + (v - self.centroid) * scale)
            .collect();
        self.spiral_radius = (-polygon.signed_distance(&self.centroid)).max(0.0) * scale;
        self.current_corner = None;
        self.is_done = false;
        tracing::info!(
            side = %ctx.side,
            corners = self.targets.len(),
            spiral = self.config.use_spiral,
            "foothold exploration started"
        );
    }

    fn on_tick(&mut self, ctx: &mut StateContext<'_>) {
        let elapsed = ctx.time_in_state - self.config.recover_time;
        let target = if elapsed < 0.0 {
            self.centroid
        } else if self.config.use_spiral {
            self.spiral_target(elapsed)
        } else {
            self.corner_target(elapsed)
        };

        let was_done = self.is_done;
        self.is_done = ctx.time_in_state >= self.total_duration() - DONE_TIME_TOLERANCE;
        if self.is_done && !was_done {
            tracing::info!(side = %ctx.side, "foothold exploration done");
        }

        let weight = self.config.cop_command_weight;
        self.cop_command = Some(CenterOfPressureCommand {
            side: self.side,
            desired_cop: target,
            weight: Vector2::new(weight, weight),
        });
        self.acceleration = rigid_constraint(ctx.side);
    }

    fn on_exit(&mut self, _ctx: &mut StateContext<'_>) {
        self.cop_command = None;
        self.current_corner = None;
    }

    fn feedback_command(&self) -> Option<&SpatialFeedbackCommand> {
        None
    }

    fn acceleration_command(&self) -> Option<&SpatialAccelerationCommand> {
        Some(&self.acceleration)
    }

    fn cop_command(&self) -> Option<&CenterOfPressureCommand> {
        self.cop_command.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::test_support::Harness;
    use approx::assert_relative_eq;

    fn tick_until_done(harness: &mut Harness, state: &mut FootholdExplorationState) -> f64 {
        harness.time_in_state = 0.0;
        state.on_enter(&mut harness.ctx());
        let dt = harness.config.dt();
        for k in 0..2000_u32 {
            harness.time_in_state = f64::from(k) * dt;
            state.on_tick(&mut harness.ctx());
            if state.is_done_exploring() {
                return harness.time_in_state;
            }
        }
        f64::INFINITY
    }

    #[test]
    fn four_corners_finish_after_recover_plus_two_seconds() {
        let mut harness = Harness::new();
        let mut state = FootholdExplorationState::new(RobotSide::Left, &harness.config);
        let done_at = tick_until_done(&mut harness, &mut state);

        let expected = harness.config.exploration.recover_time + 4.0 * 0.5;
        let dt = harness.config.dt();
        assert!(done_at >= expected - dt, "done too early at {done_at}");
        assert!(done_at <= expected + dt, "done too late at {done_at}");
    }

    #[test]
    fn visits_each_scaled_corner() {
        let mut harness = Harness::new();
        let mut state = FootholdExplorationState::new(RobotSide::Left, &harness.config);
        let recover = harness.config.exploration.recover_time;
        harness.run(&mut state, recover + 0.4);

        assert_eq!(state.current_corner(), Some(0));
        let target = state.cop_command().unwrap().desired_cop;
        let centroid = Point2::new(0.04, 0.0);
        let offset = target - centroid;
        // Staying at a corner scaled 0.9 from the centroid.
        assert_relative_eq!(offset.x.abs(), 0.9 * 0.12, epsilon = 1e-9);
        assert_relative_eq!(offset.y.abs(), 0.9 * 0.055, epsilon = 1e-9);
    }

    #[test]
    fn settles_at_centroid_first() {
        let mut harness = Harness::new();
        let mut state = FootholdExplorationState::new(RobotSide::Left, &harness.config);
        harness.run(&mut state, 0.1);
        assert_eq!(state.current_corner(), None);
        assert_relative_eq!(state.cop_command().unwrap().desired_cop, Point2::new(0.04, 0.0), epsilon = 1e-12);
        assert!(state.feedback_command().is_none());
        assert!(state.acceleration_command().unwrap().is_zero_acceleration());
    }

    #[test]
    fn spiral_finishes_after_one_period() {
        let mut config = FootControlConfig::default();
        config.exploration.use_spiral = true;
        let mut harness = Harness::with_config(config);
        let mut state = FootholdExplorationState::new(RobotSide::Left, &harness.config);
        let done_at = tick_until_done(&mut harness, &mut state);

        let expected = harness.config.exploration.recover_time + harness.config.exploration.spiral_period;
        assert!((done_at - expected).abs() <= harness.config.dt());
    }

    #[test]
    fn spiral_stays_inside_polygon() {
        let mut config = FootControlConfig::default();
        config.exploration.use_spiral = true;
        let mut harness = Harness::with_config(config);
        let polygon = harness.contact.support_polygon();
        let mut state = FootholdExplorationState::new(RobotSide::Left, &harness.config);
        harness.time_in_state = 0.0;
        state.on_enter(&mut harness.ctx());
        let dt = harness.config.dt();
        for k in 0..700_u32 {
            harness.time_in_state = f64::from(k) * dt;
            state.on_tick(&mut harness.ctx());
            let cop = state.cop_command().unwrap().desired_cop;
            assert!(polygon.is_point_inside(&cop, 0.0));
        }
    }

    #[test]
    fn exit_drops_cop_command() {
        let mut harness = Harness::new();
        let mut state = FootholdExplorationState::new(RobotSide::Left, &harness.config);
        harness.run(&mut state, 0.1);
        state.on_exit(&mut harness.ctx());
        assert!(state.cop_command().is_none());
    }
}
