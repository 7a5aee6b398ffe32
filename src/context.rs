//! Session context: the per-robot state the path-integration cycle carries
//! from one odometry sample to the next.
//!
//! [`Context`] is a plain state holder: the active cell set, the current and
//! last active cells, the virtual cell and its transition, and the last
//! minimum distance. All algorithmic logic lives in
//! [`crate::path_integration`]. Serialisation of updates is the job of
//! [`crate::session::Session`], which owns the context behind its mutex.

use crate::error::{Error, Result};
use crate::graph::{ArcId, NodeId};

/// Tunable parameters, read-only to the engine.
///
/// ```
/// use expmap_core::context::Params;
///
/// let params = Params { min_age: 3, ..Params::default() };
/// assert_eq!(params.prox_thr, 1.0);
/// assert!(params.validate().is_ok());
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Params {
    /// Proximity threshold: the distance (in odometry units) that counts as
    /// one unit of transition length.
    pub prox_thr: f64,
    /// Cells whose id is within `min_age` of the virtual cell's id are too
    /// young for the feature-probability discount.
    pub min_age: u32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            prox_thr: 1.0,
            min_age: 0,
        }
    }
}

impl Params {
    /// Check that every parameter is in range.
    pub fn validate(&self) -> Result<()> {
        if !self.prox_thr.is_finite() || self.prox_thr <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "prox_thr",
                reason: "must be finite and positive",
            });
        }
        Ok(())
    }
}

/// Engine state carried across cycles.
#[derive(Clone, Debug)]
pub struct Context {
    params: Params,
    pub(crate) active_cells: Vec<NodeId>,
    pub(crate) current_active_cell: Option<NodeId>,
    pub(crate) last_active_cell: Option<NodeId>,
    pub(crate) virtual_cell: Option<NodeId>,
    pub(crate) virtual_transition: Option<ArcId>,
    pub(crate) last_dist_min: f64,
}

impl Context {
    /// Create an empty context. The active set is filled by
    /// [`crate::path_integration::init`].
    pub fn new(params: Params) -> Self {
        Self {
            params,
            active_cells: Vec::new(),
            current_active_cell: None,
            last_active_cell: None,
            virtual_cell: None,
            virtual_transition: None,
            last_dist_min: 0.0,
        }
    }

    /// Parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Active cell set, ranked by the last cycle.
    pub fn active_cells(&self) -> &[NodeId] {
        &self.active_cells
    }

    /// Current best estimate of where the robot is.
    pub fn current_active_cell(&self) -> Option<NodeId> {
        self.current_active_cell
    }

    /// Current active cell as of the last virtual-cell reset.
    pub fn last_active_cell(&self) -> Option<NodeId> {
        self.last_active_cell
    }

    /// The tentative cell under construction, if any.
    pub fn virtual_cell(&self) -> Option<NodeId> {
        self.virtual_cell
    }

    /// Arc from the virtual cell back to the cell it was spawned from.
    pub fn virtual_transition(&self) -> Option<ArcId> {
        self.virtual_transition
    }

    /// `d2()` of the current active cell recorded by the last cycle.
    pub fn last_dist_min(&self) -> f64 {
        self.last_dist_min
    }

    /// `true` if `node` is in the active set.
    pub fn is_active(&self, node: NodeId) -> bool {
        self.active_cells.contains(&node)
    }

    /// Check the entry preconditions of a cycle.
    pub fn check_ready(&self) -> Result<NodeId> {
        if self.active_cells.is_empty() {
            return Err(Error::EmptyActiveSet);
        }
        let current = self.current_active_cell.ok_or(Error::NoCurrentCell)?;
        if !self.is_active(current) {
            return Err(Error::CurrentNotActive(current));
        }
        Ok(current)
    }

    /// Add an existing map cell to the active set. Returns `false` if it was
    /// already active.
    pub fn activate(&mut self, node: NodeId) -> bool {
        if self.is_active(node) {
            return false;
        }
        self.active_cells.push(node);
        true
    }

    /// Designate `node` as the current active cell. It must be active.
    ///
    /// The next cycle rejects the designation with
    /// [`Error::CurrentNotMinimum`] unless `node` also has the smallest
    /// combined distance.
    pub fn set_current_active_cell(&mut self, node: NodeId) -> Result<()> {
        if !self.is_active(node) {
            return Err(Error::CurrentNotActive(node));
        }
        self.current_active_cell = Some(node);
        Ok(())
    }

    pub(crate) fn remove_active(&mut self, node: NodeId) -> bool {
        match self.active_cells.iter().position(|n| *n == node) {
            Some(i) => {
                self.active_cells.remove(i);
                true
            }
            None => false,
        }
    }
}
