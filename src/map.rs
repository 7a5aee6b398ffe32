//! The experience map: graph store plus the cell and transition registries.
//!
//! Structural mutation goes through exactly three operations:
//! [`ExperienceMap::insert_cell`], [`ExperienceMap::insert_transition`] and
//! [`ExperienceMap::remove_cell`]. Arcs are never moved; they disappear only
//! together with one of their endpoints.

use crate::cell::{Cell, CellId};
use crate::error::{Error, Result};
use crate::graph::{ArcId, ArenaGraph, NodeId, TopologyGraph};
use crate::registry::Registry;
use crate::transition::{OdometryTransition, Transition};

/// Graph store + registries, generic over the graph backend and the
/// transition type.
#[derive(Clone, Debug)]
pub struct ExperienceMap<T = OdometryTransition, G = ArenaGraph> {
    graph: G,
    cells: Registry<NodeId, Cell>,
    transitions: Registry<ArcId, T>,
    next_id: u64,
}

impl<T: Transition> ExperienceMap<T, ArenaGraph> {
    /// Create an empty map on an [`ArenaGraph`].
    pub fn new() -> Self {
        Self::with_graph(ArenaGraph::new())
    }
}

impl<T: Transition> Default for ExperienceMap<T, ArenaGraph> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transition, G: TopologyGraph> ExperienceMap<T, G> {
    /// Create an empty map on the given graph backend.
    pub fn with_graph(graph: G) -> Self {
        Self {
            graph,
            cells: Registry::new(),
            transitions: Registry::new(),
            next_id: 0,
        }
    }

    /// Allocate the next cell id. Ids are never reused.
    pub fn allocate_id(&mut self) -> CellId {
        let id = CellId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create a fresh cell with the next id. The cell is not inserted yet.
    pub fn new_cell(&mut self) -> Cell {
        Cell::new(self.allocate_id())
    }

    /// Allocate a node for `cell`, bind them both ways and take ownership of
    /// the cell. Returns the node handle.
    pub fn insert_cell(&mut self, mut cell: Cell) -> NodeId {
        let node = self.graph.add_node();
        cell.set_node(node);
        self.cells.set(node, cell);
        node
    }

    /// Add an arc from `new_cell` to the transition's `src` and bind it to
    /// `transition`.
    ///
    /// Fails if either endpoint has no node.
    pub fn insert_transition(&mut self, new_cell: NodeId, transition: T) -> Result<ArcId> {
        let target = transition.src();
        if !self.graph.contains_node(target) {
            return Err(Error::DanglingTransitionTarget(target));
        }
        let arc = self
            .graph
            .add_arc(new_cell, target)
            .ok_or(Error::UnknownCell(new_cell))?;
        self.transitions.set(arc, transition);
        Ok(arc)
    }

    /// Erase `node` together with its incident arcs and their transitions.
    ///
    /// A no-op for [`NodeId::INVALID`] or an already-erased node. Returns the
    /// removed cell.
    pub fn remove_cell(&mut self, node: NodeId) -> Option<Cell> {
        if !node.is_valid() {
            return None;
        }
        for arc in self.graph.erase(node) {
            self.transitions.remove(arc);
        }
        self.cells.remove(node)
    }

    // ── Read accessors ─────────────────────────────────────────────────────

    /// The underlying graph.
    pub fn graph(&self) -> &G {
        &self.graph
    }

    /// Cell bound to `node`.
    pub fn cell(&self, node: NodeId) -> Option<&Cell> {
        self.cells.get(node)
    }

    /// Mutable cell bound to `node`.
    pub fn cell_mut(&mut self, node: NodeId) -> Option<&mut Cell> {
        self.cells.get_mut(node)
    }

    /// Cell bound to `node`, or [`Error::UnknownCell`].
    pub fn try_cell(&self, node: NodeId) -> Result<&Cell> {
        self.cells.get(node).ok_or(Error::UnknownCell(node))
    }

    /// Node of the cell with id `id`. Linear in the number of cells.
    pub fn find_cell(&self, id: CellId) -> Option<NodeId> {
        self.cells
            .iter()
            .find(|(_, c)| c.id() == id)
            .map(|(node, _)| node)
    }

    /// Transition bound to `arc`.
    pub fn transition(&self, arc: ArcId) -> Option<&T> {
        self.transitions.get(arc)
    }

    /// Mutable transition bound to `arc`.
    pub fn transition_mut(&mut self, arc: ArcId) -> Option<&mut T> {
        self.transitions.get_mut(arc)
    }

    /// Number of cells in the map.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of transitions in the map.
    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// Iterate over all cells in unspecified order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().map(|(_, c)| c)
    }

    /// Iterate over all `(arc, transition)` pairs in unspecified order.
    pub fn transitions(&self) -> impl Iterator<Item = (ArcId, &T)> {
        self.transitions.iter()
    }

    /// Outgoing arcs of `node` paired with the opposite endpoint.
    pub fn out_neighbours(&self, node: NodeId) -> Vec<(ArcId, NodeId)> {
        self.neighbours(node, self.graph.out_arcs(node))
    }

    /// Incoming arcs of `node` paired with the opposite endpoint.
    pub fn in_neighbours(&self, node: NodeId) -> Vec<(ArcId, NodeId)> {
        self.neighbours(node, self.graph.in_arcs(node))
    }

    /// All incident arcs of `node` paired with the opposite endpoint.
    pub fn incident_neighbours(&self, node: NodeId) -> Vec<(ArcId, NodeId)> {
        self.neighbours(node, self.graph.incident_arcs(node))
    }

    fn neighbours(&self, node: NodeId, arcs: Vec<ArcId>) -> Vec<(ArcId, NodeId)> {
        arcs.into_iter()
            .filter_map(|arc| self.graph.opposite(node, arc).map(|o| (arc, o)))
            .collect()
    }
}
