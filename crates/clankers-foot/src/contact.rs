//! Per-foot contact state: ordered contact points, in-contact flags,
//! friction and support normal.
//!
//! The in-contact pattern always follows a fixed table per
//! [`ConstraintType`]. Points removed by the foothold detector stay out of
//! contact until [`ContactState::reset_cropping`].

use clankers_core::types::{ConstraintType, ToeContactLine};
use nalgebra::{Point2, Vector2, Vector3};

use crate::geometry::{extreme_point_indices, ConvexPolygon2};

#[derive(Debug, Clone)]
pub struct ContactState {
    nominal: Vec<Point2<f64>>,
    points: Vec<Point2<f64>>,
    in_contact: Vec<bool>,
    cropped: Vec<bool>,
    toe_indices: [usize; 2],
    heel_indices: [usize; 2],
    coefficient_of_friction: f64,
    normal: Vector3<f64>,
}

impl ContactState {
    /// All points start in contact with a world-up normal.
    #[must_use]
    pub fn new(points: &[Point2<f64>], coefficient_of_friction: f64) -> Self {
        let pair = |direction: Vector2<f64>| {
            let indices = extreme_point_indices(points, &direction, 2);
            [
                indices.first().copied().unwrap_or(0),
                indices.get(1).copied().unwrap_or(0),
            ]
        };
        Self {
            nominal: points.to_vec(),
            points: points.to_vec(),
            in_contact: vec![true; points.len()],
            cropped: vec![false; points.len()],
            toe_indices: pair(Vector2::x()),
            heel_indices: pair(-Vector2::x()),
            coefficient_of_friction,
            normal: Vector3::z(),
        }
    }

    /// Table entry for point `index` in regime `constraint`, ignoring cropping.
    #[must_use]
    pub fn pattern_for(&self, constraint: ConstraintType, index: usize) -> bool {
        match constraint {
            ConstraintType::Swing | ConstraintType::MoveViaWaypoints => false,
            ConstraintType::Full
            | ConstraintType::HoldPosition
            | ConstraintType::Toes
            | ConstraintType::ExplorePolygon => true,
            ConstraintType::ToesTouchdown => self.toe_indices.contains(&index),
            ConstraintType::HeelTouchdown => self.heel_indices.contains(&index),
        }
    }

    /// Push the pattern for `constraint`, plus friction and normal.
    pub fn apply(&mut self, constraint: ConstraintType, normal: Vector3<f64>, coefficient_of_friction: f64) {
        for i in 0..self.in_contact.len() {
            self.in_contact[i] = self.pattern_for(constraint, i) && !self.cropped[i];
        }
        if constraint != ConstraintType::Toes {
            self.points.copy_from_slice(&self.nominal);
        }
        let norm = normal.norm();
        self.normal = if norm > 1e-9 { normal / norm } else { Vector3::z() };
        self.coefficient_of_friction = coefficient_of_friction;
    }

    /// True when the in-contact flags equal the table for `constraint`
    /// masked by cropping.
    #[must_use]
    pub fn matches_table(&self, constraint: ConstraintType) -> bool {
        (0..self.in_contact.len())
            .all(|i| self.in_contact[i] == (self.pattern_for(constraint, i) && !self.cropped[i]))
    }

    /// Take the given points out of contact for good. Returns how many were
    /// newly removed.
    pub fn crop(&mut self, indices: &[usize]) -> usize {
        let mut removed = 0;
        for &i in indices {
            if i < self.cropped.len() && !self.cropped[i] {
                self.cropped[i] = true;
                self.in_contact[i] = false;
                removed += 1;
            }
        }
        removed
    }

    /// Forget cropping. The next [`ContactState::apply`] restores the points.
    pub fn reset_cropping(&mut self) {
        self.cropped.fill(false);
    }

    /// Slide every point onto the nearer end of the toe line.
    pub fn move_points_to_line(&mut self, line: &ToeContactLine) {
        for p in &mut self.points {
            *p = if (p.y - line.first.y).abs() <= (p.y - line.second.y).abs() {
                line.first
            } else {
                line.second
            };
        }
    }

    /// Collapse every point onto the toe point.
    pub fn move_points_to_point(&mut self, point: Point2<f64>) {
        self.points.fill(point);
    }

    /// Convex hull of the in-contact points, sole frame.
    #[must_use]
    pub fn support_polygon(&self) -> ConvexPolygon2 {
        let active: Vec<Point2<f64>> = self
            .points
            .iter()
            .zip(&self.in_contact)
            .filter_map(|(p, &c)| c.then_some(*p))
            .collect();
        ConvexPolygon2::from_points(&active)
    }

    /// Hull of the points that survived cropping, at nominal positions.
    #[must_use]
    pub fn uncropped_polygon(&self) -> ConvexPolygon2 {
        let kept: Vec<Point2<f64>> = self
            .nominal
            .iter()
            .zip(&self.cropped)
            .filter_map(|(p, &c)| (!c).then_some(*p))
            .collect();
        ConvexPolygon2::from_points(&kept)
    }

    #[must_use]
    pub fn nominal_points(&self) -> &[Point2<f64>] {
        &self.nominal
    }

    #[must_use]
    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    #[must_use]
    pub fn in_contact(&self) -> &[bool] {
        &self.in_contact
    }

    #[must_use]
    pub fn number_in_contact(&self) -> usize {
        self.in_contact.iter().filter(|&&c| c).count()
    }

    #[must_use]
    pub fn is_cropped(&self, index: usize) -> bool {
        self.cropped.get(index).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn number_cropped(&self) -> usize {
        self.cropped.iter().filter(|&&c| c).count()
    }

    #[must_use]
    pub fn number_uncropped(&self) -> usize {
        self.cropped.len() - self.number_cropped()
    }

    #[must_use]
    pub const fn coefficient_of_friction(&self) -> f64 {
        self.coefficient_of_friction
    }

    #[must_use]
    pub const fn normal(&self) -> &Vector3<f64> {
        &self.normal
    }
}
