use clankers_core::types::{ConstraintType, RobotSide, SpatialAccelerationCommand, SpatialFeedbackCommand};

use super::{rigid_constraint, FootControlState, StateContext};

/// Flat, fully loaded foot: a hard zero-acceleration constraint on every
/// direction, no feedback target.
#[derive(Debug, Clone)]
pub struct FullSupportState {
    acceleration: SpatialAccelerationCommand,
}

impl FullSupportState {
    #[must_use]
    pub fn new(side: RobotSide) -> Self {
        Self {
            acceleration: rigid_constraint(side),
        }
    }
}

impl FootControlState for FullSupportState {
    fn constraint_type(&self) -> ConstraintType {
        ConstraintType::Full
    }

    fn on_enter(&mut self, ctx: &mut StateContext<'_>) {
        ctx.avoidance.reset_swing_parameters();
    }

    fn on_tick(&mut self, ctx: &mut StateContext<'_>) {
        self.acceleration = rigid_constraint(ctx.side);
    }

    fn on_exit(&mut self, _ctx: &mut StateContext<'_>) {}

    fn feedback_command(&self) -> Option<&SpatialFeedbackCommand> {
        None
    }

    fn acceleration_command(&self) -> Option<&SpatialAccelerationCommand> {
        Some(&self.acceleration)
    }
}
