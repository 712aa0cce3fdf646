use nalgebra::Point2;

use crate::types::ToeContactLine;

// ---------------------------------------------------------------------------
// ToeOffCalculator
// ---------------------------------------------------------------------------

/// Computes where a trailing foot pivots during toe-off.
///
/// Implementations own their own foot geometry. All points are sole frame.
/// Callers ask for a recompute, then read the result back, so the geometry
/// stays stable between recomputes.
pub trait ToeOffCalculator: Send + 'static {
    /// Forget the exit CMP and any computed geometry.
    fn clear(&mut self);

    /// Exit CMP the push-off is planned to pass through.
    fn set_exit_cmp(&mut self, exit_cmp: Point2<f64>);

    /// Recompute the single toe contact point.
    fn compute_toe_off_contact_point(&mut self, desired_cmp: Option<Point2<f64>>);

    /// Recompute the toe contact line.
    fn compute_toe_off_contact_line(&mut self, desired_cmp: Option<Point2<f64>>);

    fn toe_off_contact_point(&self) -> Point2<f64>;

    fn toe_off_contact_line(&self) -> ToeContactLine;

    /// Human-readable name for this calculator.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

// ---------------------------------------------------------------------------
// ForwardmostToeCalculator
// ---------------------------------------------------------------------------

/// Uses the two foremost foot corners as the toe line. The toe point is the
/// projection of the requested CMP onto that line, or its midpoint.
#[derive(Debug, Clone)]
pub struct ForwardmostToeCalculator {
    line: ToeContactLine,
    point: Point2<f64>,
    exit_cmp: Option<Point2<f64>>,
}

impl ForwardmostToeCalculator {
    /// Build from the nominal foot contact points. Needs at least two points.
    #[must_use]
    pub fn new(foot_points: &[Point2<f64>]) -> Self {
        let mut sorted: Vec<Point2<f64>> = foot_points.to_vec();
        sorted.sort_by(|a, b| b.x.total_cmp(&a.x));
        let (mut first, mut second) = match sorted.as_slice() {
            [a, b, ..] => (*a, *b),
            [a] => (*a, *a),
            [] => (Point2::origin(), Point2::origin()),
        };
        if first.y < second.y {
            std::mem::swap(&mut first, &mut second);
        }
        let line = ToeContactLine { first, second };
        Self {
            point: line.midpoint(),
            line,
            exit_cmp: None,
        }
    }

    fn project_on_line(&self, target: Point2<f64>) -> Point2<f64> {
        let direction = self.line.second - self.line.first;
        let length_squared = direction.norm_squared();
        if length_squared < 1e-12 {
            return self.line.first;
        }
        let t = ((target - self.line.first).dot(&direction) / length_squared).clamp(0.0, 1.0);
        self.line.first + direction * t
    }
}

impl ToeOffCalculator for ForwardmostToeCalculator {
    fn clear(&mut self) {
        self.exit_cmp = None;
        self.point = self.line.midpoint();
    }

    fn set_exit_cmp(&mut self, exit_cmp: Point2<f64>) {
        self.exit_cmp = Some(exit_cmp);
    }

    fn compute_toe_off_contact_point(&mut self, desired_cmp: Option<Point2<f64>>) {
        self.point = match desired_cmp.or(self.exit_cmp) {
            Some(target) => self.project_on_line(target),
            None => self.line.midpoint(),
        };
    }

    fn compute_toe_off_contact_line(&mut self, _desired_cmp: Option<Point2<f64>>) {}

    fn toe_off_contact_point(&self) -> Point2<f64> {
        self.point
    }

    fn toe_off_contact_line(&self) -> ToeContactLine {
        self.line
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ForwardmostToeCalculator"
    }
}
