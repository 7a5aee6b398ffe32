//! Path integration: the per-sample update cycle of the experience map.
//!
//! One call to [`path_integration`] consumes one odometry sample and runs,
//! strictly in order:
//!
//! 1. **Ranking**: sort the active set by `d2()`; the current active cell
//!    must come first.
//! 2. **Virtual-cell decision**: commit or discard the tentative cell and
//!    spawn a new one when one of the reset triggers fires.
//! 3. Record `last_dist_min`.
//! 4. **Odometry integration** into the virtual transition.
//! 5. **Feature discount**: shrink `dist_o` of old-enough cells that carry
//!    stronger or newly-risen feature evidence than their neighbours.
//! 6. **Relaxation**: single-step snap to a shorter path through an
//!    anchored neighbour.
//! 7. **Distance increase**: consume `dist_h` by the best corroborating
//!    transition factor and accumulate the residual motion in `dist_o`.
//!
//! The cycle then elects the minimum-distance active cell as the current
//! active cell for the next sample.
//!
//! # Virtual cell lifecycle
//!
//! ```text
//!   absent ──reset──▶ tracking ──reset──▶ committed (stays in map)  ─┐
//!                        ▲        └─────▶ discarded (erased)        ─┤
//!                        └───────────── new virtual cell ◀───────────┘
//! ```
//!
//! Reset triggers (any one):
//! - no virtual cell exists;
//! - the current cell changed since the last reset and is anchored;
//! - the current cell is not the virtual cell, is anchored, and its `d2()`
//!   dropped below `last_dist_min`;
//! - the virtual cell itself is anchored.
//!
//! # Failure semantics
//! Entry preconditions are returned as [`Error`]. Out-of-range transition
//! factors, a negative radicand or a NaN distance mean the map is corrupt and
//! panic.

use tracing::{debug, info, trace};

use crate::cell::CellId;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::graph::{ArcId, NodeId, TopologyGraph};
use crate::map::ExperienceMap;
use crate::odometry::Odometry;
use crate::transition::Transition;

/// Numerical slack added under the square root of the distance-increase step.
pub const RADICAND_EPSILON: f64 = 1e-6;

/// What happened to the virtual cell during a cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum VirtualCellEvent {
    /// First virtual cell of the session.
    Created {
        /// The new virtual cell.
        cell: CellId,
    },
    /// The virtual cell was the current cell and became permanent map state.
    Committed {
        /// The committed cell.
        cell: CellId,
        /// Length of its transition at commit time.
        action_dist: f64,
        /// The replacement virtual cell.
        next: CellId,
    },
    /// The robot relocalized elsewhere; the virtual cell was erased.
    Discarded {
        /// The erased cell.
        cell: CellId,
        /// Current active cell at reset time.
        relocalized_to: CellId,
        /// The replacement virtual cell.
        next: CellId,
    },
}

/// Summary of one path-integration cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    /// Virtual-cell reset, if one happened.
    pub virtual_event: Option<VirtualCellEvent>,
    /// Current active cell after the cycle.
    pub current: CellId,
    /// Virtual cell after the cycle.
    pub virtual_cell: CellId,
    /// Number of cells in the active set after the cycle.
    pub active_cells: usize,
    /// Number of cells whose `dist_o` was discounted by feature evidence.
    pub discounted: usize,
    /// Number of cells snapped to a shorter path during relaxation.
    pub relaxed: usize,
}

/// Seed an empty context with one home cell and make it current.
///
/// Returns the seed's node.
pub fn init<T, G>(map: &mut ExperienceMap<T, G>, ctx: &mut Context) -> NodeId
where
    T: Transition,
    G: TopologyGraph,
{
    let seed = map.new_cell().with_name("seed");
    let node = map.insert_cell(seed);
    ctx.active_cells.push(node);
    ctx.current_active_cell = Some(node);
    info!("experience map initialised with seed cell");
    node
}

/// Run one path-integration cycle for `odom`.
///
/// The caller must serialise calls (see [`crate::session::Session`]).
pub fn path_integration<T, G>(
    map: &mut ExperienceMap<T, G>,
    ctx: &mut Context,
    odom: &T::Sample,
) -> Result<CycleReport>
where
    T: Transition,
    G: TopologyGraph,
{
    let current = ctx.check_ready()?;
    let prox_thr = ctx.params().prox_thr;

    // step 1: ranking
    rank(map, ctx, current)?;

    // step 2: virtual-cell lifecycle
    let virtual_event = if needs_reset(map, ctx, current)? {
        Some(reset_virtual_cell(map, ctx, current)?)
    } else {
        None
    };

    // step 3
    ctx.last_dist_min = map.try_cell(current)?.d2();

    let (virtual_cell, virtual_transition) = match (ctx.virtual_cell, ctx.virtual_transition) {
        (Some(c), Some(t)) => (c, t),
        _ => unreachable!("virtual cell is created by the reset step"),
    };

    // step 4: odometry integration
    map.transition_mut(virtual_transition)
        .ok_or(Error::UnknownTransition(virtual_transition))?
        .integrate(odom);
    annotate(map, ctx, current, virtual_cell);

    let active = ctx.active_cells.clone();
    let virtual_id = map.try_cell(virtual_cell)?.id();

    // step 5: feature-probability discount
    let mut discounted = 0;
    for &node in &active {
        if discount_by_features(map, node, virtual_id, ctx.params().min_age, odom, prox_thr)? {
            discounted += 1;
        }
    }

    // step 6: minimum-distance relaxation
    let mut relaxed = 0;
    for &node in &active {
        if relax(map, node, virtual_transition, prox_thr)? {
            relaxed += 1;
        }
    }

    // step 7: distance increase
    let odom_dist = odom.dist(prox_thr);
    for &node in &active {
        increase_distance(map, node, odom, odom_dist, prox_thr)?;
    }

    let current = elect_current(map, ctx)?;
    trace_ranking(map, ctx);

    Ok(CycleReport {
        virtual_event,
        current: map.try_cell(current)?.id(),
        virtual_cell: virtual_id,
        active_cells: ctx.active_cells.len(),
        discounted,
        relaxed,
    })
}

// ─── Step 1: ranking ────────────────────────────────────────────────────────

/// Sort the active set by ascending `d2()`, `current` first among ties.
fn rank<T, G>(map: &ExperienceMap<T, G>, ctx: &mut Context, current: NodeId) -> Result<()>
where
    T: Transition,
    G: TopologyGraph,
{
    let mut keyed = ctx
        .active_cells
        .iter()
        .map(|&n| map.try_cell(n).map(|c| (c.d2(), n != current, n)))
        .collect::<Result<Vec<_>>>()?;
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    debug_assert!(keyed.windows(2).all(|w| w[0].0 <= w[1].0));

    ctx.active_cells = keyed.iter().map(|k| k.2).collect();
    match ctx.active_cells.first() {
        Some(&first) if first == current => Ok(()),
        Some(&first) => Err(Error::CurrentNotMinimum {
            current,
            minimum: first,
        }),
        None => Err(Error::EmptyActiveSet),
    }
}

// ─── Step 2: virtual-cell lifecycle ─────────────────────────────────────────

fn needs_reset<T, G>(map: &ExperienceMap<T, G>, ctx: &Context, current: NodeId) -> Result<bool>
where
    T: Transition,
    G: TopologyGraph,
{
    let Some(virtual_cell) = ctx.virtual_cell else {
        return Ok(true);
    };
    let cur = map.try_cell(current)?;
    let virt = map.try_cell(virtual_cell)?;

    let changed = ctx.last_active_cell != Some(current);
    Ok((changed && cur.is_anchored())
        || (current != virtual_cell && cur.d2() < ctx.last_dist_min && cur.is_anchored())
        || virt.is_anchored())
}

fn reset_virtual_cell<T, G>(
    map: &mut ExperienceMap<T, G>,
    ctx: &mut Context,
    current: NodeId,
) -> Result<VirtualCellEvent>
where
    T: Transition,
    G: TopologyGraph,
{
    let prox_thr = ctx.params().prox_thr;
    let current_id = map.try_cell(current)?.id();
    let old = match ctx.virtual_cell {
        Some(v) => Some((v, map.try_cell(v)?.clone())),
        None => None,
    };

    info!(
        changed = ctx.last_active_cell != Some(current),
        dist_h = old.as_ref().map_or(0.0, |(_, c)| c.dist_h),
        dist_o = old.as_ref().map_or(0.0, |(_, c)| c.dist_o),
        "resetting virtual cell"
    );

    enum Outcome {
        Created,
        Committed(CellId, f64),
        Discarded(CellId),
    }

    let outcome = match old {
        Some((node, cell)) if node == current => {
            let action_dist = ctx
                .virtual_transition
                .and_then(|arc| map.transition(arc))
                .map_or(0.0, |t| t.dist(prox_thr));
            info!(cell = %cell.id(), action_dist, "virtual cell is inserted to map");
            Outcome::Committed(cell.id(), action_dist)
        }
        Some((node, cell)) => {
            let from = ctx
                .last_active_cell
                .and_then(|n| map.cell(n))
                .map(|c| c.id().to_string())
                .unwrap_or_else(|| "-".into());
            info!("relocalized {} -> {}", from, current_id);
            ctx.remove_active(node);
            map.remove_cell(node);
            Outcome::Discarded(cell.id())
        }
        None => Outcome::Created,
    };

    let dist_o = map.try_cell(current)?.dist_o;
    let fresh = map.new_cell().with_dist(1.0, dist_o);
    let next = fresh.id();
    let node = map.insert_cell(fresh);
    let arc = map.insert_transition(node, T::from_source(current))?;

    ctx.virtual_cell = Some(node);
    ctx.virtual_transition = Some(arc);
    ctx.last_active_cell = Some(current);
    ctx.active_cells.push(node);
    debug!(cell = %next, from = %current_id, "spawned virtual cell");

    Ok(match outcome {
        Outcome::Created => VirtualCellEvent::Created { cell: next },
        Outcome::Committed(cell, action_dist) => VirtualCellEvent::Committed {
            cell,
            action_dist,
            next,
        },
        Outcome::Discarded(cell) => VirtualCellEvent::Discarded {
            cell,
            relocalized_to: current_id,
            next,
        },
    })
}

/// Refresh the `V ` / `C ` role markers on the active set.
fn annotate<T, G>(map: &mut ExperienceMap<T, G>, ctx: &Context, current: NodeId, virtual_cell: NodeId)
where
    T: Transition,
    G: TopologyGraph,
{
    for &node in &ctx.active_cells {
        if let Some(cell) = map.cell_mut(node) {
            cell.info.annotation.clear();
            if node == virtual_cell {
                cell.info.annotation.push_str("V ");
            }
            if node == current {
                cell.info.annotation.push_str("C ");
            }
        }
    }
}

// ─── Step 5: feature discount ───────────────────────────────────────────────

fn checked_factor<T: Transition>(
    transition: &T,
    from: NodeId,
    odom: &T::Sample,
    prox_thr: f64,
) -> f64 {
    let factor = transition.directed(from).transition_factor(odom, prox_thr);
    assert!(
        (0.0..=1.0).contains(&factor),
        "transition factor {factor} out of bounds [0,1]"
    );
    factor
}

/// Returns `true` when `dist_o` was actually reduced.
fn discount_by_features<T, G>(
    map: &mut ExperienceMap<T, G>,
    node: NodeId,
    virtual_id: CellId,
    min_age: u32,
    odom: &T::Sample,
    prox_thr: f64,
) -> Result<bool>
where
    T: Transition,
    G: TopologyGraph,
{
    let cell = map.try_cell(node)?;
    // too young: id >= virtual_id - min_age
    if cell.id().0.saturating_add(u64::from(min_age)) >= virtual_id.0 {
        return Ok(false);
    }

    let ft_prob = cell.feature_prob();
    let prob_change = ft_prob - cell.last_feature_prob();
    let mut ft_prob_max: f64 = 0.0;
    let mut ft_prob_ch_max: f64 = 0.0;

    for (arc, opposite) in map.incident_neighbours(node) {
        let opp = map.try_cell(opposite)?;
        let transition = map.transition(arc).ok_or(Error::UnknownTransition(arc))?;
        let factor = checked_factor(transition, node, odom, prox_thr);
        let opp_change = opp.feature_prob() - opp.last_feature_prob();

        ft_prob_max = ft_prob_max.max(opp.feature_prob());
        ft_prob_ch_max = ft_prob_ch_max.max(factor * (prob_change - opp_change) / 2.0);
    }

    let ft_prob_excess = (ft_prob - ft_prob_max).max(0.0) * odom.dist(prox_thr);
    let discount = ft_prob_excess + ft_prob_ch_max;
    if discount == 0.0 {
        return Ok(false);
    }

    let id = cell.id();
    let cell = map.cell_mut(node).ok_or(Error::UnknownCell(node))?;
    debug!(
        cell = %id,
        discount,
        ft_prob_excess,
        ft_prob,
        ft_prob_max,
        prob_change,
        ft_prob_ch_max,
        "discounting dist_o by feature probability"
    );
    cell.dist_o *= (1.0 - discount).max(0.0);
    Ok(true)
}

// ─── Step 6: relaxation ─────────────────────────────────────────────────────

/// Returns `true` when the cell snapped to a shorter path.
fn relax<T, G>(
    map: &mut ExperienceMap<T, G>,
    node: NodeId,
    virtual_transition: ArcId,
    prox_thr: f64,
) -> Result<bool>
where
    T: Transition,
    G: TopologyGraph,
{
    let mut snapped = false;
    for (arc, opposite) in map.out_neighbours(node) {
        if arc == virtual_transition {
            continue;
        }
        let opp = map.try_cell(opposite)?;
        if !opp.is_anchored() {
            continue;
        }
        let opp_dist_o = opp.dist_o;
        let t_dist = map
            .transition(arc)
            .ok_or(Error::UnknownTransition(arc))?
            .dist(prox_thr);

        let cell = map.cell_mut(node).ok_or(Error::UnknownCell(node))?;
        if t_dist * t_dist + opp_dist_o * opp_dist_o < cell.d2() {
            debug!(
                cell = %cell.id(),
                "setting dist from {}/{} to {}/{}",
                cell.dist_h,
                cell.dist_o,
                t_dist,
                opp_dist_o
            );
            cell.dist_h = t_dist;
            cell.dist_o = opp_dist_o;
            snapped = true;
        }
    }
    Ok(snapped)
}

// ─── Step 7: distance increase ──────────────────────────────────────────────

fn increase_distance<T, G>(
    map: &mut ExperienceMap<T, G>,
    node: NodeId,
    odom: &T::Sample,
    odom_dist: f64,
    prox_thr: f64,
) -> Result<()>
where
    T: Transition,
    G: TopologyGraph,
{
    let mut dh_max: f64 = 0.0;
    for arc in map.graph().out_arcs(node) {
        let transition = map.transition(arc).ok_or(Error::UnknownTransition(arc))?;
        dh_max = dh_max.max(checked_factor(transition, node, odom, prox_thr));
    }

    let cell = map.cell_mut(node).ok_or(Error::UnknownCell(node))?;
    let delta = cell.dist_h.min(dh_max);
    let radicand = odom_dist * odom_dist - delta * delta + RADICAND_EPSILON;
    assert!(radicand >= 0.0, "negative radicand {radicand} (delta={delta}, odom={odom_dist})");

    cell.dist_h -= delta;
    cell.dist_o += radicand.sqrt();
    assert!(
        !cell.dist_h.is_nan() && !cell.dist_o.is_nan(),
        "cell {} distance is NaN",
        cell.id()
    );
    debug!(
        cell = %cell.id(),
        dist_h = cell.dist_h,
        dist_o = cell.dist_o,
        delta,
        odom_dist,
        "changing dist"
    );

    cell.reset_feature();
    Ok(())
}

// ─── Current-cell election ──────────────────────────────────────────────────

/// Make the minimum-`d2()` active cell current (ties keep the incumbent) and
/// leave the active set ranked.
fn elect_current<T, G>(map: &ExperienceMap<T, G>, ctx: &mut Context) -> Result<NodeId>
where
    T: Transition,
    G: TopologyGraph,
{
    let incumbent = ctx.current_active_cell.ok_or(Error::NoCurrentCell)?;
    let mut best = (map.try_cell(incumbent)?.d2(), incumbent);
    for &node in &ctx.active_cells {
        let d2 = map.try_cell(node)?.d2();
        if d2 < best.0 {
            best = (d2, node);
        }
    }
    if best.1 != incumbent {
        debug!(
            from = %map.try_cell(incumbent)?.id(),
            to = %map.try_cell(best.1)?.id(),
            "current active cell changed"
        );
    }
    ctx.current_active_cell = Some(best.1);
    rank(map, ctx, best.1)?;
    Ok(best.1)
}

fn trace_ranking<T, G>(map: &ExperienceMap<T, G>, ctx: &Context)
where
    T: Transition,
    G: TopologyGraph,
{
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }
    let list: Vec<(f64, bool, CellId)> = ctx
        .active_cells
        .iter()
        .take(4)
        .filter_map(|&n| map.cell(n))
        .map(|c| (c.d(), c.is_anchored(), c.id()))
        .collect();
    trace!(?list, "distlist");
}

// ─── Tests ──────────────────────────────────────────────────────────────────
