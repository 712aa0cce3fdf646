use thiserror::Error;

/// Top-level error type for the foot controller.
#[derive(Debug, Error)]
pub enum FootControlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Footstep error: {0}")]
    Footstep(#[from] FootstepError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid control_dt: {0} (must be > 0)")]
    InvalidControlDt(f64),

    #[error("Foot needs at least 3 contact points, got {0}")]
    TooFewContactPoints(usize),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Incompatible configuration: {0}")]
    Incompatible(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_owned(),
            message: message.into(),
        }
    }
}

/// Rejected footstep or waypoint input.
///
/// Copy + static messages for cheap propagation on the control thread.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FootstepError {
    #[error("Swing duration must be positive, got {0}")]
    NonPositiveDuration(f64),

    #[error("Footstep pose is not finite")]
    NonFinitePose,

    #[error("Predicted foothold needs at least 3 contact points, got {0}")]
    TooFewContactPoints(usize),

    #[error("Custom trajectory needs exactly 2 position waypoints, got {0}")]
    WrongCustomWaypointCount(usize),

    #[error("Waypoint trajectory is empty")]
    EmptyWaypoints,

    #[error("Waypoint times must be strictly increasing (index {index})")]
    NonIncreasingWaypointTime { index: usize },

    #[error("Waypoint {index} is not finite")]
    NonFiniteWaypoint { index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foot_error_from_config_error() {
        let err = ConfigError::InvalidControlDt(-1.0);
        let foot_err: FootControlError = err.into();
        assert!(matches!(foot_err, FootControlError::Config(_)));
        assert!(foot_err.to_string().contains("-1"));
    }

    #[test]
    fn foot_error_from_footstep_error() {
        let foot_err: FootControlError = FootstepError::NonFinitePose.into();
        assert!(matches!(foot_err, FootControlError::Footstep(_)));
    }

    #[test]
    fn config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::Io(_)));
    }

    #[test]
    fn footstep_error_is_copy() {
        let err = FootstepError::EmptyWaypoints;
        let err2 = err;
        assert_eq!(err, err2);
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            ConfigError::InvalidControlDt(0.0).to_string(),
            "Invalid control_dt: 0 (must be > 0)"
        );
        assert_eq!(
            ConfigError::invalid("leg.maximum_leg_length", "must be positive").to_string(),
            "Invalid value for leg.maximum_leg_length: must be positive"
        );
        assert_eq!(
            ConfigError::TooFewContactPoints(2).to_string(),
            "Foot needs at least 3 contact points, got 2"
        );
        assert_eq!(
            FootstepError::NonPositiveDuration(0.0).to_string(),
            "Swing duration must be positive, got 0"
        );
        assert_eq!(
            FootstepError::NonIncreasingWaypointTime { index: 2 }.to_string(),
            "Waypoint times must be strictly increasing (index 2)"
        );
    }
}
