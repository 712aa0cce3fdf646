//! clankers-core: shared types, configuration, time and errors for the
//! clankers foot controller.

pub mod config;
pub mod error;
pub mod time;
pub mod traits;
pub mod types;

pub mod prelude {
    pub use crate::config::FootControlConfig;
    pub use crate::error::{ConfigError, FootControlError, FootstepError};
    pub use crate::time::{ControlClock, ControlTime, StateTimer};
    pub use crate::traits::{ForwardmostToeCalculator, ToeOffCalculator};
    pub use crate::types::{
        CenterOfPressureCommand, ComHeightData, ConstraintType, FootTickInput, FootWaypoint,
        Footstep, LegKinematics, RobotSide, Se3Gains, SelectionMatrix6,
        SpatialAccelerationCommand, SpatialFeedbackCommand, ToeContactLine, TrajectoryType,
    };
}
