//! Planar geometry in the sole plane: convex polygons, lines and segments.
//!
//! Polygons are stored counter-clockwise with collinear and duplicate
//! vertices removed. Fewer than three distinct points give a degenerate
//! polygon (point or segment); distance queries still work on those.

use nalgebra::{Isometry3, Point2, Point3, Vector2, Vector3};

const GEOMETRY_EPSILON: f64 = 1e-10;

// ---------------------------------------------------------------------------
// Line2
// ---------------------------------------------------------------------------

/// Infinite directed line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line2 {
    point: Point2<f64>,
    direction: Vector2<f64>,
}

impl Line2 {
    /// Returns `None` when `direction` is (near) zero or not finite.
    #[must_use]
    pub fn new(point: Point2<f64>, direction: Vector2<f64>) -> Option<Self> {
        let norm = direction.norm();
        if !(norm > GEOMETRY_EPSILON) || !point.coords.iter().all(|v| v.is_finite()) {
            return None;
        }
        Some(Self {
            point,
            direction: direction / norm,
        })
    }

    #[must_use]
    pub fn through(first: Point2<f64>, second: Point2<f64>) -> Option<Self> {
        Self::new(first, second - first)
    }

    #[must_use]
    pub const fn point(&self) -> Point2<f64> {
        self.point
    }

    /// Unit direction.
    #[must_use]
    pub const fn direction(&self) -> Vector2<f64> {
        self.direction
    }

    /// Signed distance: positive on the left of the direction.
    #[must_use]
    pub fn side(&self, p: &Point2<f64>) -> f64 {
        self.direction.perp(&(p - self.point))
    }

    #[must_use]
    pub fn is_point_on_left(&self, p: &Point2<f64>) -> bool {
        self.side(p) > 0.0
    }

    /// Unit normal pointing to the right of the direction.
    #[must_use]
    pub fn right_normal(&self) -> Vector2<f64> {
        Vector2::new(self.direction.y, -self.direction.x)
    }

    /// Map a sole-frame line into the world and project it onto the ground
    /// plane. `None` if the line becomes vertical.
    #[must_use]
    pub fn to_world_xy(&self, sole_to_world: &Isometry3<f64>) -> Option<Self> {
        let point = sole_to_world * Point3::new(self.point.x, self.point.y, 0.0);
        let direction = sole_to_world
            .rotation
            .transform_vector(&Vector3::new(self.direction.x, self.direction.y, 0.0));
        Self::new(point.xy(), direction.xy())
    }
}

// ---------------------------------------------------------------------------
// LineSegment2
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment2 {
    pub first: Point2<f64>,
    pub second: Point2<f64>,
}

impl LineSegment2 {
    #[must_use]
    pub const fn new(first: Point2<f64>, second: Point2<f64>) -> Self {
        Self { first, second }
    }

    /// Segment with both endpoints NaN.
    #[must_use]
    pub fn invalid() -> Self {
        let nan = Point2::new(f64::NAN, f64::NAN);
        Self::new(nan, nan)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.first.coords.iter().chain(self.second.coords.iter()).all(|v| v.is_finite())
    }

    #[must_use]
    pub fn midpoint(&self) -> Point2<f64> {
        nalgebra::center(&self.first, &self.second)
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        (self.second - self.first).norm()
    }

    #[must_use]
    pub fn closest_point(&self, p: &Point2<f64>) -> Point2<f64> {
        let d = self.second - self.first;
        let length_squared = d.norm_squared();
        if length_squared < GEOMETRY_EPSILON * GEOMETRY_EPSILON {
            return self.first;
        }
        let t = ((p - self.first).dot(&d) / length_squared).clamp(0.0, 1.0);
        self.first + d * t
    }

    #[must_use]
    pub fn distance(&self, p: &Point2<f64>) -> f64 {
        (p - self.closest_point(p)).norm()
    }
}

// ---------------------------------------------------------------------------
// ConvexPolygon2
// ---------------------------------------------------------------------------

/// Result of intersecting a line with a polygon boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineIntersection {
    None,
    /// The line only grazes a vertex.
    Single(Point2<f64>),
    /// Entry and exit points, ordered along the line direction.
    Pair(Point2<f64>, Point2<f64>),
}

impl LineIntersection {
    #[must_use]
    pub const fn count(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Single(_) => 1,
            Self::Pair(..) => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConvexPolygon2 {
    vertices: Vec<Point2<f64>>,
}

impl ConvexPolygon2 {
    /// Convex hull of `points` (monotone chain).
    #[must_use]
    pub fn from_points(points: &[Point2<f64>]) -> Self {
        let mut sorted: Vec<Point2<f64>> = points
            .iter()
            .copied()
            .filter(|p| p.coords.iter().all(|v| v.is_finite()))
            .collect();
        sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
        sorted.dedup_by(|a, b| (*a - *b).norm() < GEOMETRY_EPSILON);
        if sorted.len() < 3 {
            return Self { vertices: sorted };
        }

        let turn = |o: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>| (a - o).perp(&(b - o));
        let mut hull: Vec<Point2<f64>> = Vec::with_capacity(2 * sorted.len());
        for p in &sorted {
            while hull.len() >= 2 && turn(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= GEOMETRY_EPSILON {
                hull.pop();
            }
            hull.push(*p);
        }
        let lower_len = hull.len() + 1;
        for p in sorted.iter().rev().skip(1) {
            while hull.len() >= lower_len
                && turn(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= GEOMETRY_EPSILON
            {
                hull.pop();
            }
            hull.push(*p);
        }
        hull.pop();
        Self { vertices: hull }
    }

    #[must_use]
    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// True for a polygon with non-zero area.
    #[must_use]
    pub fn has_area(&self) -> bool {
        self.vertices.len() >= 3
    }

    /// Edges as `(start, end)` pairs, counter-clockwise.
    pub fn edges(&self) -> impl Iterator<Item = LineSegment2> + '_ {
        let n = self.vertices.len();
        let count = if n >= 3 { n } else { n.saturating_sub(1) };
        (0..count).map(move |i| LineSegment2::new(self.vertices[i], self.vertices[(i + 1) % n]))
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        if !self.has_area() {
            return 0.0;
        }
        0.5 * self
            .edges()
            .map(|e| e.first.coords.perp(&e.second.coords))
            .sum::<f64>()
    }

    /// Area centroid, or the vertex average for degenerate polygons.
    #[must_use]
    pub fn centroid(&self) -> Point2<f64> {
        if self.vertices.is_empty() {
            return Point2::new(f64::NAN, f64::NAN);
        }
        let area = self.area();
        if area.abs() < GEOMETRY_EPSILON {
            #[allow(clippy::cast_precision_loss)]
            let n = self.vertices.len() as f64;
            let sum = self.vertices.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords);
            return Point2::from(sum / n);
        }
        let mut c = Vector2::zeros();
        for e in self.edges() {
            let cross = e.first.coords.perp(&e.second.coords);
            c += (e.first.coords + e.second.coords) * cross;
        }
        Point2::from(c / (6.0 * area))
    }

    /// Negative inside (minus the distance to the nearest edge), positive
    /// outside (distance to the boundary).
    #[must_use]
    pub fn signed_distance(&self, p: &Point2<f64>) -> f64 {
        match self.vertices.len() {
            0 => f64::INFINITY,
            1 => (p - self.vertices[0]).norm(),
            2 => LineSegment2::new(self.vertices[0], self.vertices[1]).distance(p),
            _ => {
                let mut inside = true;
                let mut min_inside = f64::INFINITY;
                let mut min_outside = f64::INFINITY;
                for e in self.edges() {
                    let d = e.second - e.first;
                    let side = d.perp(&(p - e.first)) / d.norm();
                    if side < 0.0 {
                        inside = false;
                    }
                    min_inside = min_inside.min(side);
                    min_outside = min_outside.min(e.distance(p));
                }
                if inside {
                    -min_inside
                } else {
                    min_outside
                }
            }
        }
    }

    /// Distance to the polygon, zero inside.
    #[must_use]
    pub fn distance(&self, p: &Point2<f64>) -> f64 {
        self.signed_distance(p).max(0.0)
    }

    /// True if `p` lies inside the polygon shrunk by `margin`. A negative
    /// margin grows the polygon instead.
    #[must_use]
    pub fn is_point_inside(&self, p: &Point2<f64>, margin: f64) -> bool {
        if !self.has_area() {
            return margin <= 0.0 && self.signed_distance(p) <= -margin;
        }
        self.signed_distance(p) <= -margin
    }

    /// Edge nearest to `p`.
    #[must_use]
    pub fn closest_edge(&self, p: &Point2<f64>) -> Option<LineSegment2> {
        self.edges()
            .min_by(|a, b| a.distance(p).total_cmp(&b.distance(p)))
    }

    /// Where the infinite `line` crosses the boundary.
    #[must_use]
    pub fn intersection_with_line(&self, line: &Line2) -> LineIntersection {
        let mut hits: Vec<Point2<f64>> = Vec::with_capacity(4);
        for e in self.edges() {
            let side_a = line.side(&e.first);
            let side_b = line.side(&e.second);
            if side_a.abs() <= GEOMETRY_EPSILON && side_b.abs() <= GEOMETRY_EPSILON {
                hits.push(e.first);
                hits.push(e.second);
            } else if side_a.abs() <= GEOMETRY_EPSILON {
                hits.push(e.first);
            } else if side_b.abs() <= GEOMETRY_EPSILON {
                hits.push(e.second);
            } else if side_a.signum() != side_b.signum() {
                let t = side_a / (side_a - side_b);
                hits.push(e.first + (e.second - e.first) * t);
            }
        }
        if hits.is_empty() {
            return LineIntersection::None;
        }
        let along = |p: &Point2<f64>| (p - line.point()).dot(&line.direction());
        let first = hits.iter().copied().min_by(|a, b| along(a).total_cmp(&along(b)));
        let last = hits.iter().copied().max_by(|a, b| along(a).total_cmp(&along(b)));
        match (first, last) {
            (Some(a), Some(b)) if (b - a).norm() > GEOMETRY_EPSILON.sqrt() => LineIntersection::Pair(a, b),
            (Some(a), _) => LineIntersection::Single(a),
            _ => LineIntersection::None,
        }
    }

    /// Part of the polygon on the left of `line` (or right when
    /// `keep_left` is false).
    #[must_use]
    pub fn clipped_by_line(&self, line: &Line2, keep_left: bool) -> Self {
        let sign = if keep_left { 1.0 } else { -1.0 };
        let n = self.vertices.len();
        let mut out = Vec::with_capacity(n + 2);
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            let side_a = sign * line.side(&a);
            let side_b = sign * line.side(&b);
            if side_a >= 0.0 {
                out.push(a);
            }
            if (side_a > 0.0 && side_b < 0.0) || (side_a < 0.0 && side_b > 0.0) {
                let t = side_a / (side_a - side_b);
                out.push(a + (b - a) * t);
            }
        }
        Self::from_points(&out)
    }

    /// Map sole-frame vertices into the world ground plane.
    #[must_use]
    pub fn to_world_xy(&self, sole_to_world: &Isometry3<f64>) -> Self {
        let points: Vec<Point2<f64>> = self
            .vertices
            .iter()
            .map(|p| sole_to_world_xy(sole_to_world, p))
            .collect();
        Self::from_points(&points)
    }
}

/// Sole-frame point on the sole plane, projected onto the world ground plane.
#[must_use]
pub fn sole_to_world_xy(sole_to_world: &Isometry3<f64>, p: &Point2<f64>) -> Point2<f64> {
    (sole_to_world * Point3::new(p.x, p.y, 0.0)).xy()
}

/// World ground-plane point lifted to the sole height and expressed in the
/// sole frame.
#[must_use]
pub fn world_xy_to_sole(sole_to_world: &Isometry3<f64>, p: &Point2<f64>) -> Point2<f64> {
    let lifted = Point3::new(p.x, p.y, sole_to_world.translation.vector.z);
    sole_to_world.inverse_transform_point(&lifted).xy()
}

/// Indices of the `count` points furthest along `direction`, most extreme
/// first. Ties keep input order.
#[must_use]
pub fn extreme_point_indices(points: &[Point2<f64>], direction: &Vector2<f64>, count: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..points.len()).collect();
    indices.sort_by(|&a, &b| {
        points[b]
            .coords
            .dot(direction)
            .total_cmp(&points[a].coords.dot(direction))
    });
    indices.truncate(count);
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    fn square() -> ConvexPolygon2 {
        ConvexPolygon2::from_points(&[
            Point2::new(1.0, 1.0),
            Point2::new(-1.0, -1.0),
            Point2::new(1.0, -1.0),
            Point2::new(-1.0, 1.0),
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
        ])
    }

    #[test]
    fn hull_drops_interior_and_collinear_points() {
        let poly = square();
        assert_eq!(poly.len(), 4);
        assert_relative_eq!(poly.area(), 4.0, epsilon = 1e-12);
        assert_relative_eq!(poly.centroid(), Point2::origin(), epsilon = 1e-12);
    }

    #[test]
    fn degenerate_polygons() {
        let seg = ConvexPolygon2::from_points(&[Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)]);
        assert!(!seg.has_area());
        assert_relative_eq!(seg.centroid(), Point2::new(0.5, 0.0));
        assert_relative_eq!(seg.distance(&Point2::new(0.5, 2.0)), 2.0);
        assert!(ConvexPolygon2::from_points(&[]).is_empty());
    }

    #[test]
    fn inside_with_margin() {
        let poly = square();
        assert!(poly.is_point_inside(&Point2::new(0.99, 0.0), 0.0));
        assert!(!poly.is_point_inside(&Point2::new(0.999, 0.0), 0.005));
        assert!(poly.is_point_inside(&Point2::new(1.004, 0.0), -0.005));
        assert_relative_eq!(poly.signed_distance(&Point2::new(0.5, 0.0)), -0.5);
        assert_relative_eq!(poly.distance(&Point2::new(3.0, 0.0)), 2.0);
    }

    #[test]
    fn line_intersections() {
        let poly = square();
        let through = Line2::new(Point2::new(0.0, 0.5), Vector2::x()).unwrap();
        match poly.intersection_with_line(&through) {
            LineIntersection::Pair(a, b) => {
                assert_relative_eq!(a, Point2::new(-1.0, 0.5), epsilon = 1e-12);
                assert_relative_eq!(b, Point2::new(1.0, 0.5), epsilon = 1e-12);
            }
            other => panic!("expected two points, got {other:?}"),
        }

        let corner = Line2::new(Point2::new(1.0, 1.0), Vector2::new(1.0, -1.0)).unwrap();
        assert_eq!(poly.intersection_with_line(&corner).count(), 1);

        let miss = Line2::new(Point2::new(0.0, 3.0), Vector2::x()).unwrap();
        assert_eq!(poly.intersection_with_line(&miss), LineIntersection::None);
    }

    #[test]
    fn degenerate_line_is_rejected() {
        assert!(Line2::new(Point2::origin(), Vector2::zeros()).is_none());
        assert!(Line2::through(Point2::new(1.0, 1.0), Point2::new(1.0, 1.0)).is_none());
    }

    #[test]
    fn line_side_convention() {
        let line = Line2::new(Point2::origin(), Vector2::x()).unwrap();
        assert!(line.is_point_on_left(&Point2::new(0.0, 1.0)));
        assert!(line.side(&Point2::new(0.0, -1.0)) < 0.0);
        assert_relative_eq!(line.right_normal(), Vector2::new(0.0, -1.0));
    }

    #[test]
    fn clip_keeps_requested_half() {
        let poly = square();
        let line = Line2::new(Point2::new(0.5, 0.0), Vector2::y()).unwrap();
        let left = poly.clipped_by_line(&line, true);
        assert_relative_eq!(left.area(), 3.0, epsilon = 1e-12);
        let right = poly.clipped_by_line(&line, false);
        assert_relative_eq!(right.area(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn closest_edge_of_square() {
        let poly = square();
        let edge = poly.closest_edge(&Point2::new(0.9, 0.1)).unwrap();
        assert_relative_eq!(edge.first.x, 1.0);
        assert_relative_eq!(edge.second.x, 1.0);
    }

    #[test]
    fn world_projection_applies_yaw_and_offset() {
        let pose = Isometry3::from_parts(
            Translation3::new(2.0, 0.0, 0.3),
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
        );
        let world = square().to_world_xy(&pose);
        assert_relative_eq!(world.centroid(), Point2::new(2.0, 0.0), epsilon = 1e-12);
        let line = Line2::new(Point2::origin(), Vector2::x()).unwrap().to_world_xy(&pose).unwrap();
        assert_relative_eq!(line.direction(), Vector2::y(), epsilon = 1e-12);
    }

    #[test]
    fn sole_and_world_points_round_trip() {
        let pose = Isometry3::from_parts(
            Translation3::new(1.0, -0.5, 0.2),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.7),
        );
        let sole = Point2::new(0.12, -0.03);
        let world = sole_to_world_xy(&pose, &sole);
        assert_relative_eq!(world_xy_to_sole(&pose, &world), sole, epsilon = 1e-12);
    }

    #[test]
    fn extreme_points() {
        let points = [
            Point2::new(0.16, 0.05),
            Point2::new(0.16, -0.05),
            Point2::new(-0.08, -0.05),
            Point2::new(-0.08, 0.05),
        ];
        let front = extreme_point_indices(&points, &Vector2::x(), 2);
        assert_eq!(front, vec![0, 1]);
        let back = extreme_point_indices(&points, &-Vector2::x(), 2);
        assert_eq!(back, vec![2, 3]);
    }

    #[test]
    fn segment_helpers() {
        let seg = LineSegment2::new(Point2::new(0.0, 0.0), Point2::new(2.0, 0.0));
        assert_relative_eq!(seg.length(), 2.0);
        assert_relative_eq!(seg.midpoint(), Point2::new(1.0, 0.0));
        assert_relative_eq!(seg.distance(&Point2::new(3.0, 0.0)), 1.0);
        assert!(seg.is_valid());
        assert!(!LineSegment2::invalid().is_valid());
    }
}
