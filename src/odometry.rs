//! Odometry samples: the motion input of every path-integration cycle.
//!
//! The engine only needs two things from a sample: its magnitude at a given
//! proximity threshold, and its planar translation (to project it onto the
//! direction of a transition). [`Odometry`] captures exactly that, and
//! [`Motion`] is the planar increment used by the stock transition type.
//!
//! # Units
//! Translations are in metres, rotations in radians. A rotation counts as arc
//! length on a unit circle when it contributes to [`Odometry::dist`].

use core::ops::{Add, AddAssign, Neg};

/// Contract for an odometry sample.
pub trait Odometry {
    /// Magnitude of the sample, normalised by `prox_thr`. Never negative.
    fn dist(&self, prox_thr: f64) -> f64;

    /// Planar translation `[x, y]` of the sample.
    fn translation(&self) -> [f64; 2];
}

/// Planar motion increment `(dx, dy, dtheta)`.
///
/// Samples are expressed in a common odometry frame, so increments compose
/// by addition.
///
/// ```
/// use expmap_core::odometry::{Motion, Odometry};
///
/// let step = Motion::new(0.3, 0.4, 0.0);
/// assert!((step.dist(1.0) - 0.5).abs() < 1e-12);
/// assert!((step.dist(0.5) - 1.0).abs() < 1e-12);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Motion {
    /// Translation along x in metres.
    pub dx: f64,
    /// Translation along y in metres.
    pub dy: f64,
    /// Heading change in radians.
    pub dtheta: f64,
}

impl Motion {
    /// Create a new motion increment.
    #[inline]
    pub const fn new(dx: f64, dy: f64, dtheta: f64) -> Self {
        Self { dx, dy, dtheta }
    }

    /// The zero increment.
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Pure translation.
    #[inline]
    pub const fn translation_only(dx: f64, dy: f64) -> Self {
        Self::new(dx, dy, 0.0)
    }

    /// Euclidean length of the translational part.
    #[inline]
    pub fn translation_norm(&self) -> f64 {
        self.dx.hypot(self.dy)
    }

    /// Squared magnitude including rotation.
    #[inline]
    pub fn norm_squared(&self) -> f64 {
        self.dx * self.dx + self.dy * self.dy + self.dtheta * self.dtheta
    }

    /// `true` when every component is exactly zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0 && self.dtheta == 0.0
    }
}

impl Odometry for Motion {
    #[inline]
    fn dist(&self, prox_thr: f64) -> f64 {
        self.norm_squared().sqrt() / prox_thr
    }

    #[inline]
    fn translation(&self) -> [f64; 2] {
        [self.dx, self.dy]
    }
}

impl Add for Motion {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.dx + rhs.dx, self.dy + rhs.dy, self.dtheta + rhs.dtheta)
    }
}

impl AddAssign for Motion {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Neg for Motion {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.dx, -self.dy, -self.dtheta)
    }
}
