//! Map snapshot: a serialisable, read-only view of a session.
//!
//! Visualization and persistence hosts must not traverse the live graph
//! without the session lock. [`MapSnapshot`] is taken under the lock and can
//! be handed to any serde format afterwards. It flattens graph handles into
//! stable [`CellId`]s; no handle survives into the snapshot.
//!
//! Records are sorted (cells by id, transitions by endpoints) so two
//! snapshots of the same state serialise identically.
//!
//! Requires the `serde` feature.

use crate::cell::CellId;
use crate::context::Params;
use crate::graph::TopologyGraph;
use crate::session::SessionState;
use crate::transition::Transition;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Serialisable view of the map and the tracking state.
///
/// ```rust,ignore
/// let snapshot = session.snapshot();
/// let json = serde_json::to_string(&snapshot).unwrap();
/// ```
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct MapSnapshot {
    /// Format version; always [`SNAPSHOT_VERSION`] for new snapshots.
    pub version: u16,
    /// Parameters of the session.
    pub params: Params,
    /// All cells, ordered by id.
    pub cells: Vec<CellRecord>,
    /// All transitions, ordered by `(from, to)`.
    pub transitions: Vec<TransitionRecord>,
    /// Active cell ids, in ranked order.
    pub active: Vec<CellId>,
    /// Current active cell.
    pub current: Option<CellId>,
    /// Virtual cell.
    pub virtual_cell: Option<CellId>,
}

/// One cell.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct CellRecord {
    /// Stable id.
    pub id: CellId,
    /// Human-readable name.
    pub name: String,
    /// Role markers from the last cycle.
    pub annotation: String,
    /// Distance to home.
    pub dist_h: f64,
    /// Odometric distance since the last anchor.
    pub dist_o: f64,
    /// Feature confidence of the last cycle.
    pub last_feature_prob: f64,
}

/// One transition, arc direction `from → to`.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct TransitionRecord {
    /// Tail cell (the cell spawned later).
    pub from: CellId,
    /// Head cell (the cell the transition was created from).
    pub to: CellId,
    /// Transition length at the session's proximity threshold.
    pub dist: f64,
    /// `true` for the virtual transition.
    pub is_virtual: bool,
}

impl MapSnapshot {
    /// Build a snapshot from locked session state.
    pub fn from_state<T, G>(state: &SessionState<T, G>) -> Self
    where
        T: Transition,
        G: TopologyGraph,
    {
        let map = &state.map;
        let ctx = &state.context;
        let prox_thr = ctx.params().prox_thr;
        let id_of = |n| map.cell(n).map(|c| c.id());

        let mut cells: Vec<CellRecord> = map
            .cells()
            .map(|c| CellRecord {
                id: c.id(),
                name: c.info.name.clone(),
                annotation: c.info.annotation.clone(),
                dist_h: c.dist_h,
                dist_o: c.dist_o,
                last_feature_prob: c.last_feature_prob(),
            })
            .collect();
        cells.sort_by_key(|c| c.id);

        let mut transitions: Vec<TransitionRecord> = map
            .transitions()
            .filter_map(|(arc, t)| {
                let from = id_of(map.graph().source(arc)?)?;
                let to = id_of(map.graph().target(arc)?)?;
                Some(TransitionRecord {
                    from,
                    to,
                    dist: t.dist(prox_thr),
                    is_virtual: ctx.virtual_transition() == Some(arc),
                })
            })
            .collect();
        transitions.sort_by_key(|t| (t.from, t.to));

        Self {
            version: SNAPSHOT_VERSION,
            params: *ctx.params(),
            cells,
            transitions,
            active: ctx.active_cells().iter().filter_map(|&n| id_of(n)).collect(),
            current: ctx.current_active_cell().and_then(id_of),
            virtual_cell: ctx.virtual_cell().and_then(id_of),
        }
    }

    /// Number of cells in the snapshot.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Look up a cell record by id.
    pub fn find_cell(&self, id: CellId) -> Option<&CellRecord> {
        self.cells.iter().find(|c| c.id == id)
    }
}

impl<T: Transition, G: TopologyGraph> crate::session::Session<T, G> {
    /// Take a [`MapSnapshot`] under the session lock.
    pub fn snapshot(&self) -> MapSnapshot {
        self.read(MapSnapshot::from_state)
    }
}
