//! Temporal filters shared by the foothold detector, the leg-length
//! corrections and the toe-off gates.
//!
//! Every filter is updated at most once per tick and has an explicit
//! `reset`. The first update after construction or reset primes the filter
//! with the raw input instead of blending against stale state.

use std::f64::consts::{PI, TAU};
use std::ops::{Add, Mul, Sub};

use nalgebra::{Vector2, Vector3};

/// Values an [`AlphaFilter`] or [`FilteredVelocity`] can carry.
pub trait FilterSignal:
    Copy + Add<Output = Self> + Sub<Output = Self> + Mul<f64, Output = Self>
{
    fn zero() -> Self;
    fn nan() -> Self;
}

impl FilterSignal for f64 {
    fn zero() -> Self {
        0.0
    }
    fn nan() -> Self {
        f64::NAN
    }
}

impl FilterSignal for Vector2<f64> {
    fn zero() -> Self {
        Vector2::zeros()
    }
    fn nan() -> Self {
        Vector2::repeat(f64::NAN)
    }
}

impl FilterSignal for Vector3<f64> {
    fn zero() -> Self {
        Vector3::zeros()
    }
    fn nan() -> Self {
        Vector3::repeat(f64::NAN)
    }
}

/// Wrap `a - b` into `[-pi, pi)`.
#[must_use]
pub fn angle_difference(a: f64, b: f64) -> f64 {
    (a - b + PI).rem_euclid(TAU) - PI
}

// ---------------------------------------------------------------------------
// AlphaFilter
// ---------------------------------------------------------------------------

/// First-order exponential filter: `y = alpha * y + (1 - alpha) * x`.
///
/// `alpha = 0` passes the input through, `alpha = 1` freezes the output.
#[derive(Debug, Clone)]
pub struct AlphaFilter<T: FilterSignal = f64> {
    alpha: f64,
    value: T,
    initialized: bool,
}

impl<T: FilterSignal> AlphaFilter<T> {
    #[must_use]
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            value: T::nan(),
            initialized: false,
        }
    }

    pub fn update(&mut self, input: T) -> T {
        self.value = if self.initialized {
            self.value * self.alpha + input * (1.0 - self.alpha)
        } else {
            self.initialized = true;
            input
        };
        self.value
    }

    #[must_use]
    pub const fn value(&self) -> T {
        self.value
    }

    /// Force the output, counting as initialized.
    pub fn set(&mut self, value: T) {
        self.value = value;
        self.initialized = true;
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.alpha = alpha.clamp(0.0, 1.0);
    }

    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Drop the state. The output reads NaN until the next update.
    pub fn reset(&mut self) {
        self.value = T::nan();
        self.initialized = false;
    }
}

// ---------------------------------------------------------------------------
// FilteredVelocity
// ---------------------------------------------------------------------------

/// Alpha-filtered finite difference of a signal.
///
/// Reads zero after the priming update.
#[derive(Debug, Clone)]
pub struct FilteredVelocity<T: FilterSignal = f64> {
    alpha: f64,
    dt: f64,
    previous: T,
    value: T,
    initialized: bool,
}

impl<T: FilterSignal> FilteredVelocity<T> {
    #[must_use]
    pub fn new(alpha: f64, dt: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            dt,
            previous: T::nan(),
            value: T::nan(),
            initialized: false,
        }
    }

    pub fn update(&mut self, input: T) -> T {
        self.update_with_difference(input, |current, previous| current - previous)
    }

    fn update_with_difference(&mut self, input: T, difference: impl Fn(T, T) -> T) -> T {
        if !self.initialized {
            self.initialized = true;
            self.previous = input;
            self.value = T::zero();
            return self.value;
        }
        let raw_rate = difference(input, self.previous) * (1.0 / self.dt);
        self.value = self.value * self.alpha + raw_rate * (1.0 - self.alpha);
        self.previous = input;
        self.value
    }

    #[must_use]
    pub const fn value(&self) -> T {
        self.value
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn reset(&mut self) {
        self.previous = T::nan();
        self.value = T::nan();
        self.initialized = false;
    }
}

impl FilteredVelocity<f64> {
    /// Rate of an angle, unwrapping jumps across `+-pi`.
    pub fn update_for_angle(&mut self, angle: f64) -> f64 {
        self.update_with_difference(angle, angle_difference)
    }
}

// ---------------------------------------------------------------------------
// GlitchFilter
// ---------------------------------------------------------------------------

/// Boolean that only flips after the raw input has disagreed with it for
/// `window` consecutive updates.
#[derive(Debug, Clone)]
pub struct GlitchFilter {
    window: u32,
    counter: u32,
    value: bool,
}

impl GlitchFilter {
    #[must_use]
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            counter: 0,
            value: false,
        }
    }

    pub fn update(&mut self, raw: bool) -> bool {
        if raw == self.value {
            self.counter = 0;
        } else {
            self.counter += 1;
            if self.counter >= self.window {
                self.value = raw;
                self.counter = 0;
            }
        }
        self.value
    }

    /// Force the output and clear the pending count.
    pub fn set(&mut self, value: bool) {
        self.value = value;
        self.counter = 0;
    }

    #[must_use]
    pub const fn value(&self) -> bool {
        self.value
    }

    #[must_use]
    pub const fn window(&self) -> u32 {
        self.window
    }

    pub fn set_window(&mut self, window: u32) {
        self.window = window.max(1);
    }

    pub fn reset(&mut self) {
        self.set(false);
    }
}

// ---------------------------------------------------------------------------
// MajorityVoteFilter
// ---------------------------------------------------------------------------

/// True while more than half of the last `window` samples were true.
///
/// The sample buffer is allocated once at construction.
#[derive(Debug, Clone)]
pub struct MajorityVoteFilter {
    samples: Vec<bool>,
    next: usize,
    filled: usize,
    value: bool,
}

impl MajorityVoteFilter {
    #[must_use]
    pub fn new(window: u32) -> Self {
        Self {
            samples: vec![false; window.max(1) as usize],
            next: 0,
            filled: 0,
            value: false,
        }
    }

    pub fn update(&mut self, raw: bool) -> bool {
        let window = self.samples.len();
        self.samples[self.next] = raw;
        self.next = (self.next + 1) % window;
        self.filled = (self.filled + 1).min(window);
        let votes = self.samples.iter().filter(|&&s| s).count();
        self.value = 2 * votes > window;
        self.value
    }

    #[must_use]
    pub const fn value(&self) -> bool {
        self.value
    }

    /// True once a full window of samples has been seen.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.filled == self.samples.len()
    }

    pub fn reset(&mut self) {
        self.samples.fill(false);
        self.next = 0;
        self.filled = 0;
        self.value = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn alpha_filter_primes_then_blends() {
        let mut filter = AlphaFilter::<f64>::new(0.75);
        assert!(filter.value().is_nan());
        assert_relative_eq!(filter.update(4.0), 4.0);
        assert_relative_eq!(filter.update(0.0), 3.0);
        assert_relative_eq!(filter.update(0.0), 2.25);
        filter.reset();
        assert!(!filter.is_initialized());
        assert_relative_eq!(filter.update(-1.0), -1.0);
    }

    #[test]
    fn alpha_filter_extremes() {
        let mut pass = AlphaFilter::<f64>::new(0.0);
        pass.update(1.0);
        assert_relative_eq!(pass.update(5.0), 5.0);

        let mut frozen = AlphaFilter::<f64>::new(1.0);
        frozen.update(1.0);
        assert_relative_eq!(frozen.update(5.0), 1.0);
    }

    #[test]
    fn alpha_filter_clamps_alpha() {
        let filter = AlphaFilter::<f64>::new(1.5);
        assert_relative_eq!(filter.alpha(), 1.0);
    }

    #[test]
    fn vector_alpha_filter() {
        let mut filter = AlphaFilter::<Vector2<f64>>::new(0.5);
        filter.update(Vector2::new(2.0, 0.0));
        let out = filter.update(Vector2::new(0.0, 2.0));
        assert_relative_eq!(out, Vector2::new(1.0, 1.0));
    }

    #[test]
    fn filtered_velocity_reads_zero_after_priming() {
        let mut vel = FilteredVelocity::<f64>::new(0.0, 0.01);
        assert_relative_eq!(vel.update(1.0), 0.0);
        assert_relative_eq!(vel.update(1.02), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn filtered_velocity_unwraps_angles() {
        let mut vel = FilteredVelocity::<f64>::new(0.0, 0.1);
        vel.update_for_angle(PI - 0.05);
        let rate = vel.update_for_angle(-PI + 0.05);
        assert_relative_eq!(rate, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn angle_difference_wraps() {
        assert_relative_eq!(angle_difference(0.1, -0.1), 0.2, epsilon = 1e-12);
        assert_relative_eq!(angle_difference(-PI + 0.1, PI - 0.1), 0.2, epsilon = 1e-12);
        assert_relative_eq!(angle_difference(PI - 0.1, -PI + 0.1), -0.2, epsilon = 1e-12);
    }

    #[test]
    fn glitch_filter_needs_consecutive_samples() {
        let mut filter = GlitchFilter::new(3);
        assert!(!filter.update(true));
        assert!(!filter.update(true));
        assert!(!filter.update(false));
        assert!(!filter.update(true));
        assert!(!filter.update(true));
        assert!(filter.update(true));
        assert!(filter.update(false));
        filter.reset();
        assert!(!filter.value());
    }

    #[test]
    fn glitch_filter_window_one_follows_input() {
        let mut filter = GlitchFilter::new(1);
        assert!(filter.update(true));
        assert!(!filter.update(false));
    }

    #[test]
    fn majority_vote() {
        let mut filter = MajorityVoteFilter::new(3);
        assert!(!filter.update(true));
        assert!(filter.update(true));
        assert!(!filter.is_full());
        assert!(filter.update(false));
        assert!(filter.is_full());
        assert!(!filter.update(false));
        filter.reset();
        assert!(!filter.value());
        assert!(!filter.is_full());
    }
}
