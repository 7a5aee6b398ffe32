//! Graph store: the directed multigraph underneath the experience map.
//!
//! Cells live on nodes, transitions on arcs. The engine only talks to the
//! graph through [`TopologyGraph`], so a test double or a different backing
//! store can be swapped in; [`ArenaGraph`] is the stock implementation.
//!
//! # Handles
//!
//! [`NodeId`] and [`ArcId`] are `(index, generation)` pairs into slot arenas.
//! Erasing a node frees its slot and bumps the generation, so every handle
//! that still points at the old occupant becomes stale and all queries treat
//! it as absent. Slots are recycled through a free list.
//!
//! # Invariants
//! - Erasing a node erases every arc incident to it (in either direction).
//! - Arcs are only ever added, or removed together with an endpoint.
//! - `NodeId::INVALID` / `ArcId::INVALID` never resolve.

/// Handle to a node in a [`TopologyGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Sentinel handle that never resolves to a node.
    pub const INVALID: NodeId = NodeId {
        index: u32::MAX,
        generation: u32::MAX,
    };

    /// Slot index of this handle.
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    /// `true` unless this is [`NodeId::INVALID`].
    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

/// Handle to an arc in a [`TopologyGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArcId {
    index: u32,
    generation: u32,
}

impl ArcId {
    /// Sentinel handle that never resolves to an arc.
    pub const INVALID: ArcId = ArcId {
        index: u32::MAX,
        generation: u32::MAX,
    };

    /// Slot index of this handle.
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    /// `true` unless this is [`ArcId::INVALID`].
    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

/// Capability interface of the graph store.
///
/// Query methods return empty results or `None` for stale handles rather
/// than panicking.
pub trait TopologyGraph {
    /// Allocate a new, unconnected node.
    fn add_node(&mut self) -> NodeId;

    /// Add a directed arc `from → to`. Returns `None` if either endpoint is
    /// not a live node.
    fn add_arc(&mut self, from: NodeId, to: NodeId) -> Option<ArcId>;

    /// Erase `node` and every arc incident to it. Returns the erased arcs, or
    /// an empty vector if `node` was not live.
    fn erase(&mut self, node: NodeId) -> Vec<ArcId>;

    /// `true` if `node` is live.
    fn contains_node(&self, node: NodeId) -> bool;

    /// `true` if `arc` is live.
    fn contains_arc(&self, arc: ArcId) -> bool;

    /// Tail of `arc`.
    fn source(&self, arc: ArcId) -> Option<NodeId>;

    /// Head of `arc`.
    fn target(&self, arc: ArcId) -> Option<NodeId>;

    /// Arcs leaving `node`.
    fn out_arcs(&self, node: NodeId) -> Vec<ArcId>;

    /// Arcs entering `node`.
    fn in_arcs(&self, node: NodeId) -> Vec<ArcId>;

    /// Number of live nodes.
    fn node_count(&self) -> usize;

    /// Number of live arcs.
    fn arc_count(&self) -> usize;

    /// All arcs touching `node`: outgoing first, then incoming.
    fn incident_arcs(&self, node: NodeId) -> Vec<ArcId> {
        let mut arcs = self.out_arcs(node);
        arcs.extend(self.in_arcs(node));
        arcs
    }

    /// The endpoint of `arc` that is not `node`.
    ///
    /// Returns `None` if `arc` is stale or does not touch `node`. For a
    /// self-loop the opposite of `node` is `node`.
    fn opposite(&self, node: NodeId, arc: ArcId) -> Option<NodeId> {
        let (s, t) = (self.source(arc)?, self.target(arc)?);
        if s == node {
            Some(t)
        } else if t == node {
            Some(s)
        } else {
            None
        }
    }
}

// ─── ArenaGraph ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
struct NodeEntry {
    out_arcs: Vec<ArcId>,
    in_arcs: Vec<ArcId>,
}

#[derive(Clone, Copy, Debug)]
struct ArcEntry {
    source: NodeId,
    target: NodeId,
}

#[derive(Clone, Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot arena with generation counters and a free list.
#[derive(Clone, Debug)]
struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }
}

impl<T> Arena<T> {
    fn insert(&mut self, value: T) -> (u32, u32) {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return (index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        (index, 0)
    }

    fn get(&self, index: u32, generation: u32) -> Option<&T> {
        self.slots
            .get(index as usize)
            .filter(|s| s.generation == generation)
            .and_then(|s| s.value.as_ref())
    }

    fn get_mut(&mut self, index: u32, generation: u32) -> Option<&mut T> {
        self.slots
            .get_mut(index as usize)
            .filter(|s| s.generation == generation)
            .and_then(|s| s.value.as_mut())
    }

    fn remove(&mut self, index: u32, generation: u32) -> Option<T> {
        let slot = self.slots.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.live -= 1;
        Some(value)
    }
}

/// In-memory arena-backed [`TopologyGraph`].
///
/// ```
/// use expmap_core::graph::{ArenaGraph, TopologyGraph};
///
/// let mut g = ArenaGraph::new();
/// let a = g.add_node();
/// let b = g.add_node();
/// let ab = g.add_arc(a, b).unwrap();
/// assert_eq!(g.opposite(a, ab), Some(b));
///
/// assert_eq!(g.erase(b), vec![ab]);
/// assert!(!g.contains_arc(ab));
/// assert!(g.out_arcs(a).is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct ArenaGraph {
    nodes: Arena<NodeEntry>,
    arcs: Arena<ArcEntry>,
}

impl ArenaGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, id: NodeId) -> Option<&NodeEntry> {
        self.nodes.get(id.index, id.generation)
    }

    fn arc(&self, id: ArcId) -> Option<&ArcEntry> {
        self.arcs.get(id.index, id.generation)
    }
}

impl TopologyGraph for ArenaGraph {
    fn add_node(&mut self) -> NodeId {
        let (index, generation) = self.nodes.insert(NodeEntry::default());
        NodeId { index, generation }
    }

    fn add_arc(&mut self, from: NodeId, to: NodeId) -> Option<ArcId> {
        if !self.contains_node(from) || !self.contains_node(to) {
            return None;
        }
        let (index, generation) = self.arcs.insert(ArcEntry {
            source: from,
            target: to,
        });
        let id = ArcId { index, generation };
        self.nodes
            .get_mut(from.index, from.generation)?
            .out_arcs
            .push(id);
        self.nodes.get_mut(to.index, to.generation)?.in_arcs.push(id);
        Some(id)
    }

    fn erase(&mut self, node: NodeId) -> Vec<ArcId> {
        let Some(entry) = self.nodes.remove(node.index, node.generation) else {
            return Vec::new();
        };

        let mut erased = Vec::with_capacity(entry.out_arcs.len() + entry.in_arcs.len());
        for arc in entry.out_arcs.into_iter().chain(entry.in_arcs) {
            let Some(a) = self.arcs.remove(arc.index, arc.generation) else {
                // self-loops appear in both lists
                continue;
            };
            let other = if a.source == node { a.target } else { a.source };
            if let Some(o) = self.nodes.get_mut(other.index, other.generation) {
                o.out_arcs.retain(|x| *x != arc);
                o.in_arcs.retain(|x| *x != arc);
            }
            erased.push(arc);
        }
        erased
    }

    fn contains_node(&self, node: NodeId) -> bool {
        self.node(node).is_some()
    }

    fn contains_arc(&self, arc: ArcId) -> bool {
        self.arc(arc).is_some()
    }

    fn source(&self, arc: ArcId) -> Option<NodeId> {
        self.arc(arc).map(|a| a.source)
    }

    fn target(&self, arc: ArcId) -> Option<NodeId> {
        self.arc(arc).map(|a| a.target)
    }

    fn out_arcs(&self, node: NodeId) -> Vec<ArcId> {
        self.node(node).map_or_else(Vec::new, |n| n.out_arcs.clone())
    }

    fn in_arcs(&self, node: NodeId) -> Vec<ArcId> {
        self.node(node).map_or_else(Vec::new, |n| n.in_arcs.clone())
    }

    fn node_count(&self) -> usize {
        self.nodes.live
    }

    fn arc_count(&self) -> usize {
        self.arcs.live
    }
}
