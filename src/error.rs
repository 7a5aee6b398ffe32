//! Error types for expmap-core.
//!
//! Only caller-reachable precondition failures are reported through
//! [`Error`]. Numeric-bound violations inside a path-integration cycle mean
//! the map state is already corrupt and panic instead.

use crate::cell::CellId;
use crate::graph::{ArcId, NodeId};

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Precondition failures surfaced by the engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A tunable parameter is outside its admissible range.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },

    /// The active cell set is empty.
    #[error("active cell set is empty")]
    EmptyActiveSet,

    /// No current active cell is designated.
    #[error("no current active cell")]
    NoCurrentCell,

    /// The current active cell is not a member of the active cell set.
    #[error("current active cell {0:?} is not in the active set")]
    CurrentNotActive(NodeId),

    /// After ranking, the current active cell is not the minimum-distance cell.
    #[error("current active cell {current:?} is not the minimum-distance cell {minimum:?}")]
    CurrentNotMinimum {
        /// Designated current active cell.
        current: NodeId,
        /// Cell that ranked first.
        minimum: NodeId,
    },

    /// A transition was inserted toward a cell that has no graph node.
    #[error("transition target {0:?} has no node in the graph")]
    DanglingTransitionTarget(NodeId),

    /// A node handle does not resolve to a registered cell.
    #[error("no cell registered for node {0:?}")]
    UnknownCell(NodeId),

    /// A cell id does not resolve to a registered cell.
    #[error("no cell with id {0}")]
    UnknownCellId(CellId),

    /// An arc handle does not resolve to a registered transition.
    #[error("no transition registered for arc {0:?}")]
    UnknownTransition(ArcId),

    /// The cell is the current, virtual or last active cell and cannot be
    /// removed while tracking depends on it.
    #[error("cell {0} is in use by the tracking context")]
    CellInUse(CellId),
}
