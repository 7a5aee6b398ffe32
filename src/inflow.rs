//! Inflow: the neighbour-weighted evidence flowing into a cell.
//!
//! Inflow is the strongest `factor × outflow` over every arc touching the
//! cell, in either direction, minus a caller-supplied offset. It is an
//! auxiliary quantity: the path-integration cycle does not consume it. It is
//! the building block of an energy-diffusion formulation in which each cell
//! loses energy proportional to the motion and regains it from corroborating
//! neighbours.
//!
//! # Invariants
//! - Any neighbour reached through a non-zero factor has `outflow ∈ [0, 1]`;
//!   a violation panics.

use tracing::debug;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::graph::{NodeId, TopologyGraph};
use crate::map::ExperienceMap;
use crate::transition::Transition;

/// Inflow into `node` for `odom`, minus `offset`.
pub fn inflow<T, G>(
    map: &ExperienceMap<T, G>,
    ctx: &Context,
    node: NodeId,
    offset: f64,
    odom: &T::Sample,
) -> Result<f64>
where
    T: Transition,
    G: TopologyGraph,
{
    map.try_cell(node)?;
    let prox_thr = ctx.params().prox_thr;

    let mut inflow: f64 = 0.0;
    for (arc, opposite) in map.incident_neighbours(node) {
        let opp = map.try_cell(opposite)?;
        let factor = map
            .transition(arc)
            .ok_or(Error::UnknownTransition(arc))?
            .directed(node)
            .transition_factor(odom, prox_thr);
        assert!(
            factor == 0.0 || (0.0..=1.0).contains(&opp.outflow),
            "outflow {} out of bounds [0,1] (factor={})",
            opp.outflow,
            factor
        );
        inflow = inflow.max(factor * opp.outflow);
    }
    debug!(inflow, "inflow");

    Ok(inflow - offset)
}
