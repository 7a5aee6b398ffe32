//! Integration tests for the path-integration cycle, driven through the
//! public [`Session`] API.
//!
//! Run with: `cargo test`

use approx::assert_relative_eq;
use expmap_core::path_integration::RADICAND_EPSILON;
use expmap_core::transition::Directed;
use expmap_core::{
    ArcId, Cell, CellId, Error, Motion, NodeId, OdometryTransition, Params, Session,
    SessionState, TopologyGraph, Transition, VirtualCellEvent,
};

// ─── helpers ─────────────────────────────────────────────────────────────────

fn session() -> Session {
    Session::new(Params::default()).unwrap()
}

fn forward(d: f64) -> Motion {
    Motion::translation_only(d, 0.0)
}

fn node_of(state: &SessionState, id: CellId) -> NodeId {
    state.map.find_cell(id).unwrap()
}

fn cell(state: &SessionState, id: CellId) -> &Cell {
    state.map.cell(node_of(state, id)).unwrap()
}

/// Every invariant that must hold between two cycles.
fn assert_consistent(state: &SessionState) {
    let ctx = &state.context;
    let active = ctx.active_cells();
    assert!(!active.is_empty());

    for &n in active {
        let c = state.map.cell(n).unwrap();
        assert!(c.dist_h >= 0.0, "cell {} dist_h {}", c.id(), c.dist_h);
        assert!(c.dist_o >= 0.0, "cell {} dist_o {}", c.id(), c.dist_o);
    }

    let d2: Vec<f64> = active.iter().map(|&n| state.map.cell(n).unwrap().d2()).collect();
    assert!(d2.windows(2).all(|w| w[0] <= w[1]), "active set not ranked: {d2:?}");
    assert_eq!(Some(active[0]), ctx.current_active_cell());

    let virtuals = active.iter().filter(|&&n| Some(n) == ctx.virtual_cell()).count();
    match ctx.virtual_cell() {
        Some(v) => {
            assert_eq!(virtuals, 1);
            let arc = ctx.virtual_transition().unwrap();
            assert_eq!(state.map.graph().source(arc), Some(v));
            assert_eq!(state.map.graph().target(arc), ctx.last_active_cell());
        }
        None => {
            assert_eq!(virtuals, 0);
            assert!(ctx.virtual_transition().is_none());
        }
    }
}

/// Seed with a virtual cell, plus an anchored cell `a` one transition away
/// that has become the current active cell.
fn relocalized_session() -> (Session, CellId, CellId, CellId, ArcId) {
    let s = session();
    s.path_integration(&Motion::zero()).unwrap();
    let (seed, v, a, a_arc) = {
        let mut guard = s.lock();
        let st = &mut *guard;
        let seed = st.context.current_active_cell().unwrap();
        let v = st.context.virtual_cell().unwrap();

        let a = st.map.new_cell().with_name("a");
        let a_id = a.id();
        let a = st.map.insert_cell(a);
        let a_arc = st
            .map
            .insert_transition(a, OdometryTransition::with_displacement(seed, forward(2.0)))
            .unwrap();

        st.map.cell_mut(seed).unwrap().dist_o = 3.0;
        st.map.cell_mut(v).unwrap().dist_o = 3.0;
        st.context.activate(a);
        st.context.set_current_active_cell(a).unwrap();

        let seed_id = st.map.cell(seed).unwrap().id();
        let v_id = st.map.cell(v).unwrap().id();
        (seed_id, v_id, a_id, a_arc)
    };
    (s, seed, v, a, a_arc)
}

// ─── first sample spawns the virtual cell ───────────────────────────────────

#[test]
fn test_first_sample_spawns_virtual_cell() {
    let s = session();
    let report = s.path_integration(&forward(0.5)).unwrap();

    let v = match report.virtual_event {
        Some(VirtualCellEvent::Created { cell }) => cell,
        other => panic!("expected a created virtual cell, got {other:?}"),
    };
    assert_eq!(report.virtual_cell, v);
    assert_eq!(report.active_cells, 2);

    s.read(|st| {
        assert_eq!(st.virtual_cell(), Some(v));
        let vc = cell(st, v);
        // created at dist_h = 1, consumed by a full 0.5 of corroborating motion
        assert_relative_eq!(vc.dist_h, 0.5);
        assert_relative_eq!(vc.dist_o, (0.25 - 0.25 + RADICAND_EPSILON).sqrt());

        // the seed has no outgoing transition: nothing corroborates it
        let seed = cell(st, CellId(0));
        assert_eq!(seed.dist_h, 0.0);
        assert_relative_eq!(seed.dist_o, (0.25 + RADICAND_EPSILON).sqrt());
        assert_consistent(st);
    });
}

// ─── no reset while the current cell is unchanged ───────────────────────────

#[test]
fn test_virtual_cell_persists_across_cycles() {
    let s = session();
    s.path_integration(&forward(0.1)).unwrap();
    let (v, arc) = s.read(|st| (st.context.virtual_cell(), st.context.virtual_transition()));

    for _ in 0..3 {
        let report = s.path_integration(&forward(0.1)).unwrap();
        assert!(report.virtual_event.is_none());
    }

    s.read(|st| {
        assert_eq!(st.context.virtual_cell(), v);
        assert_eq!(st.context.virtual_transition(), arc);
        let disp = st.map.transition(arc.unwrap()).unwrap().displacement();
        assert_relative_eq!(disp.dx, 0.4, epsilon = 1e-12);
        assert_consistent(st);
    });
}

// ─── relaxation through an anchored neighbour ───────────────────────────────

#[test]
fn test_relaxation_snaps_to_anchored_neighbour() {
    let s = session();
    s.path_integration(&Motion::zero()).unwrap();
    let b_id = {
        let mut guard = s.lock();
        let st = &mut *guard;
        let seed = st.context.current_active_cell().unwrap();
        let b = st.map.new_cell().with_dist(5.0, 5.0);
        let b_id = b.id();
        let b = st.map.insert_cell(b);
        st.map
            .insert_transition(b, OdometryTransition::with_displacement(seed, forward(0.8)))
            .unwrap();
        st.map.cell_mut(seed).unwrap().dist_o = 0.0;
        st.context.activate(b);
        b_id
    };

    let report = s.path_integration(&Motion::zero()).unwrap();
    assert!(report.virtual_event.is_none());
    assert_eq!(report.relaxed, 1);

    s.read(|st| {
        let b = cell(st, b_id);
        // snapped to (0.8, 0.0), then the zero sample adds only epsilon
        assert_relative_eq!(b.dist_h, 0.8, epsilon = 1e-12);
        assert_relative_eq!(b.dist_o, RADICAND_EPSILON.sqrt(), epsilon = 1e-12);
        assert_consistent(st);
    });
}

// ─── relocalization discards exactly the virtual cell ───────────────────────

#[test]
fn test_relocalization_discards_only_the_virtual_cell() {
    let (s, seed, v, a, a_arc) = relocalized_session();
    let active_before: Vec<CellId> = s.read(|st| {
        st.context
            .active_cells()
            .iter()
            .map(|&n| st.map.cell(n).unwrap().id())
            .collect()
    });
    let cells_before = s.read(|st| st.map.cell_count());

    let report = s.path_integration(&Motion::zero()).unwrap();
    let next = match report.virtual_event {
        Some(VirtualCellEvent::Discarded {
            cell,
            relocalized_to,
            next,
        }) => {
            assert_eq!(cell, v);
            assert_eq!(relocalized_to, a);
            next
        }
        other => panic!("expected a discard, got {other:?}"),
    };

    s.read(|st| {
        assert!(st.map.find_cell(v).is_none());
        assert_eq!(st.map.cell_count(), cells_before);

        let mut active_after: Vec<CellId> = st
            .context
            .active_cells()
            .iter()
            .map(|&n| st.map.cell(n).unwrap().id())
            .filter(|&id| id != next)
            .collect();
        let mut expected: Vec<CellId> = active_before.into_iter().filter(|&id| id != v).collect();
        active_after.sort();
        expected.sort();
        assert_eq!(active_after, expected);

        // a → seed survives untouched
        let seed_node = node_of(st, seed);
        let a_node = node_of(st, a);
        assert!(st.map.graph().contains_arc(a_arc));
        assert_eq!(st.map.graph().source(a_arc), Some(a_node));
        assert_eq!(st.map.graph().target(a_arc), Some(seed_node));
        assert_eq!(st.map.graph().in_arcs(seed_node), vec![a_arc]);
        assert_relative_eq!(st.map.transition(a_arc).unwrap().displacement().dx, 2.0);

        // the replacement hangs off the cell we relocalized to
        let next_node = node_of(st, next);
        assert_eq!(st.map.out_neighbours(next_node)[0].1, a_node);
        assert_eq!(st.context.last_active_cell(), Some(a_node));
        assert_consistent(st);
    });
}

// ─── other reset triggers ────────────────────────────────────────────────────

/// Two short forward steps: the seed stays current and the virtual cell is
/// still far from anchored.
fn two_short_steps() -> Session {
    let s = session();
    s.path_integration(&forward(0.1)).unwrap();
    s.path_integration(&forward(0.1)).unwrap();
    s
}

fn expect_discard(report_event: Option<VirtualCellEvent>, old: CellId, current: CellId) -> CellId {
    match report_event {
        Some(VirtualCellEvent::Discarded {
            cell,
            relocalized_to,
            next,
        }) => {
            assert_eq!(cell, old);
            assert_eq!(relocalized_to, current);
            next
        }
        other => panic!("expected a discard, got {other:?}"),
    }
}

#[test]
fn test_last_dist_min_records_current_before_increase() {
    let s = two_short_steps();
    s.read(|st| {
        assert_eq!(st.current_cell(), Some(CellId(0)));
        // seed d2 after the first step: 0.1² + epsilon
        assert_relative_eq!(st.context.last_dist_min(), 0.01 + RADICAND_EPSILON, epsilon = 1e-12);
    });
}

#[test]
fn test_reset_when_unchanged_current_improves_on_last_minimum() {
    let s = two_short_steps();
    let (seed, old_virtual, old_node) = {
        let mut guard = s.lock();
        let st = &mut *guard;
        let seed = st.context.current_active_cell().unwrap();
        let v = st.context.virtual_cell().unwrap();
        // anchored seed drops below the recorded minimum without changing
        st.map.cell_mut(seed).unwrap().dist_o = 0.0;
        (st.map.cell(seed).unwrap().id(), st.map.cell(v).unwrap().id(), v)
    };

    let report = s.path_integration(&Motion::zero()).unwrap();
    let next = expect_discard(report.virtual_event, old_virtual, seed);

    s.read(|st| {
        assert!(st.map.find_cell(old_virtual).is_none());
        assert!(!st.map.graph().contains_node(old_node));
        assert!(!st.context.is_active(old_node));
        assert_eq!(st.virtual_cell(), Some(next));
        assert_eq!(st.context.last_dist_min(), 0.0);
        assert_consistent(st);
    });
}

#[test]
fn test_reset_when_virtual_cell_anchors_itself() {
    let s = two_short_steps();
    let (seed, old_virtual, old_node) = {
        let mut guard = s.lock();
        let st = &mut *guard;
        let seed = st.context.current_active_cell().unwrap();
        let v = st.context.virtual_cell().unwrap();
        let vc = st.map.cell_mut(v).unwrap();
        vc.dist_h = 0.0;
        vc.dist_o = 5.0;
        (st.map.cell(seed).unwrap().id(), st.map.cell(v).unwrap().id(), v)
    };

    let report = s.path_integration(&Motion::zero()).unwrap();
    let next = expect_discard(report.virtual_event, old_virtual, seed);

    s.read(|st| {
        assert!(st.map.find_cell(old_virtual).is_none());
        assert!(!st.map.graph().contains_node(old_node));
        assert!(!st.context.is_active(old_node));
        assert_eq!(st.virtual_cell(), Some(next));
        assert_consistent(st);
    });
}

// ─── commit vs discard ───────────────────────────────────────────────────────

#[test]
fn test_straight_line_commits_and_keeps_cells() {
    let s = session();
    let mut committed = Vec::new();
    for _ in 0..9 {
        let report = s.path_integration(&forward(0.5)).unwrap();
        if let Some(VirtualCellEvent::Committed { cell, action_dist, next }) = report.virtual_event {
            assert_relative_eq!(action_dist, 1.0, epsilon = 1e-9);
            assert_eq!(report.current, next);
            committed.push(cell);
        }
        s.read(assert_consistent);
    }

    assert_eq!(committed, vec![CellId(1), CellId(2), CellId(3), CellId(4)]);
    s.read(|st| {
        for id in &committed {
            let node = node_of(st, *id);
            assert!(st.map.graph().contains_node(node));
            assert!(st.context.is_active(node));
        }
        assert_eq!(st.map.cell_count(), 6);
        assert_eq!(st.map.transition_count(), 5);

        // each committed cell points back at its predecessor
        for (i, id) in committed.iter().enumerate() {
            let out = st.map.out_neighbours(node_of(st, *id));
            assert_eq!(out.len(), 1);
            assert_eq!(st.map.cell(out[0].1).unwrap().id(), CellId(i as u64));
        }
    });
}

// ─── zero motion ─────────────────────────────────────────────────────────────

#[test]
fn test_zero_motion_only_adds_epsilon() {
    let s = session();
    for _ in 0..5 {
        s.path_integration(&forward(0.5)).unwrap();
    }
    let before: Vec<(CellId, f64, f64)> = s.read(|st| {
        st.map.cells().map(|c| (c.id(), c.dist_h, c.dist_o)).collect()
    });

    let report = s.path_integration(&Motion::zero()).unwrap();
    assert!(report.virtual_event.is_none());

    s.read(|st| {
        for (id, dist_h, dist_o) in before {
            let c = cell(st, id);
            assert!(c.dist_h >= dist_h, "cell {id} dist_h dropped");
            assert_relative_eq!(c.dist_o, dist_o, epsilon = 1.001e-3);
        }
        assert_consistent(st);
    });
}

// ─── long random walk ────────────────────────────────────────────────────────

/// Deterministic generator so the walk is reproducible without a rand
/// dependency.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[test]
fn test_random_walk_keeps_invariants() {
    for seed in [1, 7, 42] {
        let mut rng = Lcg(seed);
        let s = session();
        let mut commits = 0;

        for _ in 0..200 {
            let heading = rng.next() * std::f64::consts::TAU;
            let step = rng.next() * 0.6;
            let odom = Motion::new(
                step * heading.cos(),
                step * heading.sin(),
                (rng.next() - 0.5) * 0.2,
            );

            if rng.next() < 0.3 {
                let mut ids: Vec<CellId> = s.read(|st| st.map.cells().map(|c| c.id()).collect());
                ids.sort();
                let id = ids[(rng.next() * ids.len() as f64) as usize];
                s.set_feature_prob(id, rng.next()).unwrap();
            }

            let report = s.path_integration(&odom).unwrap();
            if matches!(report.virtual_event, Some(VirtualCellEvent::Committed { .. })) {
                commits += 1;
            }
            s.read(|st| {
                assert_consistent(st);
                // every factor the cycle could have used is in range
                for (arc, t) in st.map.transitions() {
                    for end in [st.map.graph().source(arc), st.map.graph().target(arc)] {
                        let view: Directed<'_, OdometryTransition> = t.directed(end.unwrap());
                        let f = view.transition_factor(&odom, 1.0);
                        assert!((0.0..=1.0).contains(&f), "factor {f}");
                    }
                }
            });
        }
        assert!(commits > 0, "seed {seed}: walk never committed a cell");
    }
}

// ─── failure modes ───────────────────────────────────────────────────────────

#[test]
fn test_current_must_be_the_minimum() {
    let s = session();
    s.path_integration(&forward(0.2)).unwrap();
    let (seed, v) = {
        let mut guard = s.lock();
        let v = guard.context.virtual_cell().unwrap();
        guard.context.set_current_active_cell(v).unwrap();
        (guard.context.active_cells()[0], v)
    };

    let err = s.path_integration(&forward(0.2)).unwrap_err();
    assert_eq!(err, Error::CurrentNotMinimum { current: v, minimum: seed });
}

#[test]
fn test_inactive_cell_cannot_become_current() {
    let s = session();
    let mut guard = s.lock();
    let st = &mut *guard;
    let stray = st.map.new_cell();
    let stray = st.map.insert_cell(stray);
    assert_eq!(
        st.context.set_current_active_cell(stray),
        Err(Error::CurrentNotActive(stray))
    );
}

/// A transition that reports a factor above one.
struct Overconfident(NodeId);

impl Transition for Overconfident {
    type Sample = Motion;

    fn from_source(src: NodeId) -> Self {
        Self(src)
    }

    fn src(&self) -> NodeId {
        self.0
    }

    fn dist(&self, _prox_thr: f64) -> f64 {
        0.0
    }

    fn integrate(&mut self, _odom: &Motion) {}

    fn transition_factor(&self, _from: NodeId, _odom: &Motion, _prox_thr: f64) -> f64 {
        1.5
    }
}

#[test]
#[should_panic(expected = "out of bounds")]
fn test_out_of_range_factor_is_fatal() {
    let s: Session<Overconfident> = Session::new(Params::default()).unwrap();
    let _ = s.path_integration(&forward(0.5));
}
