//! Transitions: the arcs of the experience map.
//!
//! A transition is created from an existing cell (its `src`) when a new
//! cell is spawned next to it; the graph arc runs from the new cell back to
//! `src`. While the new cell is still virtual the transition accumulates the
//! odometry travelled since leaving `src`.
//!
//! # Transition factor
//!
//! Seen from one endpoint (a [`Directed`] view), the transition points from
//! the opposite endpoint toward that one. The factor of an odometry sample is
//! the length of the sample's translation projected onto that direction,
//! normalised by the proximity threshold and clamped to `[0, 1]`. It never
//! exceeds `odom.dist(prox_thr)`.

use crate::graph::NodeId;
use crate::odometry::{Motion, Odometry};

/// Contract the engine needs from a transition.
pub trait Transition {
    /// Odometry sample type this transition integrates.
    type Sample: Odometry;

    /// Create a transition anchored at `src`.
    fn from_source(src: NodeId) -> Self;

    /// Node this transition was created from.
    fn src(&self) -> NodeId;

    /// Geometric length of the transition at `prox_thr`.
    fn dist(&self, prox_thr: f64) -> f64;

    /// Accumulate an odometry sample.
    fn integrate(&mut self, odom: &Self::Sample);

    /// Transition factor of `odom` seen from endpoint `from`. In `[0, 1]`.
    fn transition_factor(&self, from: NodeId, odom: &Self::Sample, prox_thr: f64) -> f64;

    /// View this transition from endpoint `from`.
    fn directed(&self, from: NodeId) -> Directed<'_, Self>
    where
        Self: Sized,
    {
        Directed {
            transition: self,
            from,
        }
    }
}

/// A transition seen from one of its endpoints.
#[derive(Debug)]
pub struct Directed<'a, T> {
    transition: &'a T,
    from: NodeId,
}

impl<T: Transition> Directed<'_, T> {
    /// Transition factor of `odom` from this endpoint.
    #[inline]
    pub fn transition_factor(&self, odom: &T::Sample, prox_thr: f64) -> f64 {
        self.transition.transition_factor(self.from, odom, prox_thr)
    }

    /// Endpoint this view is anchored at.
    #[inline]
    pub fn from(&self) -> NodeId {
        self.from
    }
}

/// Stock transition: accumulated planar [`Motion`] from `src`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OdometryTransition {
    src: NodeId,
    displacement: Motion,
}

impl OdometryTransition {
    /// Create a transition with a known displacement.
    pub fn with_displacement(src: NodeId, displacement: Motion) -> Self {
        Self { src, displacement }
    }

    /// Accumulated displacement from `src` toward the other endpoint.
    #[inline]
    pub fn displacement(&self) -> Motion {
        self.displacement
    }

    fn direction_toward(&self, node: NodeId) -> Motion {
        if node == self.src {
            -self.displacement
        } else {
            self.displacement
        }
    }
}

impl Transition for OdometryTransition {
    type Sample = Motion;

    fn from_source(src: NodeId) -> Self {
        Self::with_displacement(src, Motion::zero())
    }

    fn src(&self) -> NodeId {
        self.src
    }

    fn dist(&self, prox_thr: f64) -> f64 {
        self.displacement.dist(prox_thr)
    }

    fn integrate(&mut self, odom: &Motion) {
        self.displacement += *odom;
    }

    fn transition_factor(&self, from: NodeId, odom: &Motion, prox_thr: f64) -> f64 {
        let dir = self.direction_toward(from);
        let len = dir.translation_norm();
        if len <= f64::EPSILON {
            return 0.0;
        }
        let [ox, oy] = odom.translation();
        let projected = (ox * dir.dx + oy * dir.dy) / len;
        let factor = (projected / prox_thr).clamp(0.0, 1.0);
        if factor.is_nan() {
            0.0
        } else {
            factor
        }
    }
}
