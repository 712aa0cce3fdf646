//! Mock implementations of core traits for testing.
//!
//! Provides toe-off calculators with fixed geometry and a recorder that
//! reports every call it receives, so tests can check how the foot module
//! drives its calculator after handing ownership away.

use std::sync::{Arc, Mutex, PoisonError};

use clankers_core::traits::ToeOffCalculator;
use clankers_core::types::ToeContactLine;
use nalgebra::Point2;

// ---------------------------------------------------------------------------
// FixedToeCalculator
// ---------------------------------------------------------------------------

/// A toe calculator that always reports the same point and line.
#[derive(Debug, Clone, Copy)]
pub struct FixedToeCalculator {
    point: Point2<f64>,
    line: ToeContactLine,
}

impl FixedToeCalculator {
    pub const fn new(point: Point2<f64>, line: ToeContactLine) -> Self {
        Self { point, line }
    }

    /// Line through `(x, ±half_width)` with the point at its middle.
    pub fn at_front_edge(x: f64, half_width: f64) -> Self {
        Self {
            point: Point2::new(x, 0.0),
            line: ToeContactLine {
                first: Point2::new(x, half_width),
                second: Point2::new(x, -half_width),
            },
        }
    }
}

impl ToeOffCalculator for FixedToeCalculator {
    fn clear(&mut self) {}

    fn set_exit_cmp(&mut self, _exit_cmp: Point2<f64>) {}

    fn compute_toe_off_contact_point(&mut self, _desired_cmp: Option<Point2<f64>>) {}

    fn compute_toe_off_contact_line(&mut self, _desired_cmp: Option<Point2<f64>>) {}

    fn toe_off_contact_point(&self) -> Point2<f64> {
        self.point
    }

    fn toe_off_contact_line(&self) -> ToeContactLine {
        self.line
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "FixedToeCalculator"
    }
}

// ---------------------------------------------------------------------------
// RecordingToeCalculator
// ---------------------------------------------------------------------------

/// One call received by a [`RecordingToeCalculator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToeCall {
    Clear,
    SetExitCmp(Point2<f64>),
    ComputePoint(Option<Point2<f64>>),
    ComputeLine(Option<Point2<f64>>),
}

/// Shared view of the calls a [`RecordingToeCalculator`] received.
#[derive(Debug, Clone, Default)]
pub struct ToeCallLog(Arc<Mutex<Vec<ToeCall>>>);

impl ToeCallLog {
    fn push(&self, call: ToeCall) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }

    /// Snapshot of all calls so far, oldest first.
    pub fn calls(&self) -> Vec<ToeCall> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self, matches: impl Fn(&ToeCall) -> bool) -> usize {
        self.calls().iter().filter(|c| matches(c)).count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Wraps [`FixedToeCalculator`] and logs every call.
#[derive(Debug, Clone)]
pub struct RecordingToeCalculator {
    inner: FixedToeCalculator,
    log: ToeCallLog,
}

impl RecordingToeCalculator {
    /// Returns the calculator and a handle to its call log.
    pub fn new(inner: FixedToeCalculator) -> (Self, ToeCallLog) {
        let log = ToeCallLog::default();
        (
            Self {
                inner,
                log: log.clone(),
            },
            log,
        )
    }
}

impl ToeOffCalculator for RecordingToeCalculator {
    fn clear(&mut self) {
        self.log.push(ToeCall::Clear);
    }

    fn set_exit_cmp(&mut self, exit_cmp: Point2<f64>) {
        self.log.push(ToeCall::SetExitCmp(exit_cmp));
    }

    fn compute_toe_off_contact_point(&mut self, desired_cmp: Option<Point2<f64>>) {
        self.log.push(ToeCall::ComputePoint(desired_cmp));
    }

    fn compute_toe_off_contact_line(&mut self, desired_cmp: Option<Point2<f64>>) {
        self.log.push(ToeCall::ComputeLine(desired_cmp));
    }

    fn toe_off_contact_point(&self) -> Point2<f64> {
        self.inner.toe_off_contact_point()
    }

    fn toe_off_contact_line(&self) -> ToeContactLine {
        self.inner.toe_off_contact_line()
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "RecordingToeCalculator"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_calculator_ignores_cmp() {
        let mut calc = FixedToeCalculator::at_front_edge(0.16, 0.05);
        calc.set_exit_cmp(Point2::new(1.0, 1.0));
        calc.compute_toe_off_contact_point(Some(Point2::new(2.0, 2.0)));
        assert_eq!(calc.toe_off_contact_point(), Point2::new(0.16, 0.0));
        assert_eq!(calc.toe_off_contact_line().first, Point2::new(0.16, 0.05));
    }

    #[test]
    fn recorder_logs_calls_in_order() {
        let (mut calc, log) = RecordingToeCalculator::new(FixedToeCalculator::at_front_edge(0.16, 0.05));
        calc.set_exit_cmp(Point2::new(0.2, 0.0));
        calc.compute_toe_off_contact_line(None);
        calc.clear();

        assert_eq!(
            log.calls(),
            vec![
                ToeCall::SetExitCmp(Point2::new(0.2, 0.0)),
                ToeCall::ComputeLine(None),
                ToeCall::Clear,
            ]
        );
        assert_eq!(log.count(|c| matches!(c, ToeCall::Clear)), 1);
        log.clear();
        assert!(log.calls().is_empty());
    }

    #[test]
    fn recorder_log_survives_boxing() {
        let (calc, log) = RecordingToeCalculator::new(FixedToeCalculator::at_front_edge(0.16, 0.05));
        let mut boxed: Box<dyn ToeOffCalculator> = Box::new(calc);
        boxed.compute_toe_off_contact_point(None);
        assert_eq!(log.calls(), vec![ToeCall::ComputePoint(None)]);
        assert_eq!(boxed.name(), "RecordingToeCalculator");
    }
}
