//! Experience cells: the nodes of the topological map.
//!
//! A cell carries two distances:
//! - `dist_h`: remaining distance to a known (anchored) location along the
//!   best path found so far. `0` means the cell is itself the anchor.
//! - `dist_o`: odometric distance accumulated since the anchor was fixed.
//!
//! Cells are ranked by `d2() = dist_h² + dist_o²`; the minimum is the
//! current best estimate of where the robot is.

use core::fmt;

use crate::graph::NodeId;

/// Stable, monotonically assigned cell identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellId(pub u64);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Free-form debug/audit information attached to a cell.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellInfo {
    /// Human-readable name.
    pub name: String,
    /// Role markers set by the last cycle (`V ` for virtual, `C ` for current).
    pub annotation: String,
}

/// A node of the experience map.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    id: CellId,
    node: NodeId,
    /// Distance to home. Never negative.
    pub dist_h: f64,
    /// Odometric distance since the last anchor. Never negative.
    pub dist_o: f64,
    feature_prob: f64,
    last_feature_prob: f64,
    /// Outflow consumed by [`crate::inflow::inflow`]; `[0, 1]` when set.
    pub outflow: f64,
    /// Debug/audit information.
    pub info: CellInfo,
}

impl Cell {
    /// Create a home cell (`dist_h = dist_o = 0`) not yet bound to a node.
    pub fn new(id: CellId) -> Self {
        Self {
            id,
            node: NodeId::INVALID,
            dist_h: 0.0,
            dist_o: 0.0,
            feature_prob: 0.0,
            last_feature_prob: 0.0,
            outflow: 0.0,
            info: CellInfo::default(),
        }
    }

    /// Builder: set the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.info.name = name.into();
        self
    }

    /// Builder: set both distances.
    pub fn with_dist(mut self, dist_h: f64, dist_o: f64) -> Self {
        self.dist_h = dist_h;
        self.dist_o = dist_o;
        self
    }

    /// Stable id.
    #[inline]
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Graph node this cell is bound to, [`NodeId::INVALID`] until inserted.
    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub(crate) fn set_node(&mut self, node: NodeId) {
        self.node = node;
    }

    /// Squared combined distance, the ranking key.
    #[inline]
    pub fn d2(&self) -> f64 {
        self.dist_h * self.dist_h + self.dist_o * self.dist_o
    }

    /// Combined distance.
    #[inline]
    pub fn d(&self) -> f64 {
        self.d2().sqrt()
    }

    /// `true` when the cell is an anchor (`dist_h <= 0`).
    #[inline]
    pub fn is_anchored(&self) -> bool {
        self.dist_h <= 0.0
    }

    /// Feature confidence observed this cycle.
    #[inline]
    pub fn feature_prob(&self) -> f64 {
        self.feature_prob
    }

    /// Feature confidence of the previous cycle.
    #[inline]
    pub fn last_feature_prob(&self) -> f64 {
        self.last_feature_prob
    }

    /// Record classifier evidence for this cycle, clamped to `[0, 1]`.
    pub fn set_feature_prob(&mut self, p: f64) {
        self.feature_prob = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
    }

    /// Roll this cycle's feature confidence into the previous slot.
    pub fn reset_feature(&mut self) {
        self.last_feature_prob = self.feature_prob;
        self.feature_prob = 0.0;
    }
}
