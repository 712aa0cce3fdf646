//! Shared test fixtures and utilities for the clankers foot controller.
//!
//! Provides foot geometry and tick-input builders, plus mock toe-off
//! calculators that record how they are driven.

pub mod fixtures;
pub mod mocks;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use fixtures::{footstep_at, rectangle_foot, sole_at, test_config, TickInputBuilder, HALF_STANCE_WIDTH};
pub use mocks::{FixedToeCalculator, RecordingToeCalculator, ToeCall, ToeCallLog};
