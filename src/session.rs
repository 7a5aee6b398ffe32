//! Session: the single owner of the experience map and its context.
//!
//! One [`Session`] exists per robot run. It holds the map and context behind
//! one coarse [`parking_lot::Mutex`]: a path-integration cycle holds the lock
//! from ranking to the last distance update, and every reader (visualization,
//! persistence) takes the same lock, so nobody observes a half-applied cycle.
//! A second caller blocks; samples are neither queued nor batched.

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::cell::{Cell, CellId};
use crate::context::{Context, Params};
use crate::error::{Error, Result};
use crate::graph::{ArenaGraph, TopologyGraph};
use crate::map::ExperienceMap;
use crate::path_integration::{self, CycleReport};
use crate::transition::{OdometryTransition, Transition};

/// Everything the lock protects.
#[derive(Debug)]
pub struct SessionState<T = OdometryTransition, G = ArenaGraph> {
    /// Graph store and registries.
    pub map: ExperienceMap<T, G>,
    /// Active set, virtual cell, parameters.
    pub context: Context,
}

impl<T: Transition, G: TopologyGraph> SessionState<T, G> {
    /// Id of the current active cell.
    pub fn current_cell(&self) -> Option<CellId> {
        self.context
            .current_active_cell()
            .and_then(|n| self.map.cell(n))
            .map(|c| c.id())
    }

    /// Id of the virtual cell, if one exists.
    pub fn virtual_cell(&self) -> Option<CellId> {
        self.context
            .virtual_cell()
            .and_then(|n| self.map.cell(n))
            .map(|c| c.id())
    }
}

/// Mutex-guarded experience-mapping session.
///
/// ```
/// use expmap_core::{Motion, Params, Session};
///
/// let session: Session = Session::new(Params::default()).unwrap();
/// for _ in 0..4 {
///     session.path_integration(&Motion::translation_only(0.5, 0.0)).unwrap();
/// }
/// assert!(session.read(|s| s.map.cell_count()) >= 3);
/// ```
#[derive(Debug)]
pub struct Session<T = OdometryTransition, G = ArenaGraph> {
    state: Mutex<SessionState<T, G>>,
}

impl<T: Transition> Session<T, ArenaGraph> {
    /// Start a session on an in-memory graph, seeded with one home cell.
    pub fn new(params: Params) -> Result<Self> {
        Self::with_graph(params, ArenaGraph::new())
    }
}

impl<T: Transition, G: TopologyGraph> Session<T, G> {
    /// Start a session on the given (empty) graph backend.
    pub fn with_graph(params: Params, graph: G) -> Result<Self> {
        params.validate()?;
        let mut map = ExperienceMap::with_graph(graph);
        let mut context = Context::new(params);
        path_integration::init(&mut map, &mut context);
        Ok(Self {
            state: Mutex::new(SessionState { map, context }),
        })
    }

    /// Run one path-integration cycle. Holds the lock for the whole cycle.
    pub fn path_integration(&self, odom: &T::Sample) -> Result<CycleReport> {
        let mut guard = self.state.lock();
        let SessionState { map, context } = &mut *guard;
        path_integration::path_integration(map, context, odom)
    }

    /// Record classifier evidence for cell `id` for the coming cycle.
    pub fn set_feature_prob(&self, id: CellId, p: f64) -> Result<()> {
        let mut guard = self.state.lock();
        let node = guard.map.find_cell(id).ok_or(Error::UnknownCellId(id))?;
        guard
            .map
            .cell_mut(node)
            .ok_or(Error::UnknownCellId(id))?
            .set_feature_prob(p);
        Ok(())
    }

    /// Run `f` against a consistent view of the state.
    pub fn read<R>(&self, f: impl FnOnce(&SessionState<T, G>) -> R) -> R {
        f(&self.state.lock())
    }

    /// Take the lock directly, for hosts that need several operations to be
    /// atomic together.
    ///
    /// Structural edits made through the guard must leave the context
    /// consistent: never erase the current, virtual or last active cell with
    /// [`ExperienceMap::remove_cell`], and drop removed cells from the active
    /// set. [`Session::remove_cell`] does both checks.
    pub fn lock(&self) -> MutexGuard<'_, SessionState<T, G>> {
        self.state.lock()
    }

    /// Erase cell `id` from the map and the active set.
    ///
    /// Fails with [`Error::CellInUse`] for the current active cell, the
    /// virtual cell, and the last active cell the virtual transition hangs
    /// off.
    pub fn remove_cell(&self, id: CellId) -> Result<Cell> {
        let mut guard = self.state.lock();
        let SessionState { map, context } = &mut *guard;
        let node = map.find_cell(id).ok_or(Error::UnknownCellId(id))?;
        let pinned = [
            context.current_active_cell(),
            context.virtual_cell(),
            context.last_active_cell(),
        ];
        if pinned.contains(&Some(node)) {
            return Err(Error::CellInUse(id));
        }
        context.remove_active(node);
        let cell = map.remove_cell(node).ok_or(Error::UnknownCellId(id))?;
        debug!(cell = %id, "cell removed");
        Ok(cell)
    }

    /// Id of the current active cell.
    pub fn current_cell(&self) -> Option<CellId> {
        self.read(|s| s.current_cell())
    }

    /// Parameters of this session.
    pub fn params(&self) -> Params {
        self.read(|s| *s.context.params())
    }

    /// Consume the session and return its state.
    pub fn into_inner(self) -> SessionState<T, G> {
        self.state.into_inner()
    }
}
