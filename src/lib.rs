//! # expmap-core
//!
//! Topological experience mapping: odometry-driven path integration over a
//! graph of place cells.
//!
//! ---
//!
//! ## The map is a graph, not a grid.
//!
//! Each **cell** is a place the robot has been. Each **transition** is the
//! odometry accumulated between two cells. There are no coordinates; every
//! cell instead carries two distances:
//!
//! - `dist_h`, how far the robot is from that cell measured along anchored
//!   map structure;
//! - `dist_o`, how much raw odometry has accumulated since the cell was
//!   last anchored.
//!
//! The cell with the smallest `dist_h² + dist_o²` is where the robot believes
//! it is.
//!
//! Exploration happens through one tentative **virtual cell**, attached to
//! the current cell by a transition that absorbs every odometry sample. Once
//! the robot has travelled far enough for the virtual cell to win the
//! ranking, it becomes a permanent cell and a new virtual cell takes its
//! place. If the robot relocalizes onto a known cell instead, the virtual
//! cell is discarded.
//!
//! ## The cycle
//!
//! ```text
//! odometry sample
//!   → rank active cells
//!   → commit / discard / spawn virtual cell
//!   → integrate into virtual transition
//!   → feature discount → relaxation → distance increase
//!   → elect current cell
//! ```
//!
//! ## Module overview
//!
//! | Module | Key types | What it does |
//! |--------|-----------|--------------|
//! | [`odometry`] | [`Motion`], [`Odometry`] | Planar motion increments and their normalised length |
//! | [`graph`] | [`TopologyGraph`], [`ArenaGraph`] | Directed graph with stable, generation-checked handles |
//! | [`registry`] | [`registry::Registry`] | Handle → entity association |
//! | [`cell`] | [`Cell`], [`CellId`] | Place cell: distances, feature evidence, labels |
//! | [`transition`] | [`Transition`], [`OdometryTransition`] | Accumulated odometry between two cells |
//! | [`map`] | [`ExperienceMap`] | Graph plus cell and transition registries |
//! | [`context`] | [`Context`], [`Params`] | Active set, virtual cell, tuning |
//! | [`path_integration`] | [`CycleReport`] | The per-sample update cycle |
//! | [`inflow`] | [`inflow::inflow`] | Neighbour-weighted evidence into a cell |
//! | [`session`] | [`Session`] | Mutex-guarded owner of map and context |
//! | `snapshot` | `snapshot::MapSnapshot` | Serialisable map view (requires `serde` feature) |
//! | [`error`] | [`Error`] | Recoverable failures |
//!
//! ## Quick start
//!
//! ```
//! use expmap_core::{Motion, Params, Session};
//!
//! let session: Session = Session::new(Params::default())?;
//! for _ in 0..9 {
//!     session.path_integration(&Motion::translation_only(0.5, 0.0))?;
//! }
//! assert_eq!(session.read(|s| s.map.cell_count()), 6);
//! # Ok::<(), expmap_core::Error>(())
//! ```
//!
//! ## Features
//!
//! - `serde`: derives `Serialize`/`Deserialize` on value types and enables
//!   the `snapshot` module.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cell;
pub mod context;
pub mod error;
pub mod graph;
pub mod inflow;
pub mod map;
pub mod odometry;
pub mod path_integration;
pub mod registry;
pub mod session;
pub mod transition;

#[cfg(feature = "serde")]
#[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
pub mod snapshot;

pub use cell::{Cell, CellId, CellInfo};
pub use context::{Context, Params};
pub use error::{Error, Result};
pub use graph::{ArcId, ArenaGraph, NodeId, TopologyGraph};
pub use map::ExperienceMap;
pub use odometry::{Motion, Odometry};
pub use path_integration::{CycleReport, VirtualCellEvent};
pub use session::{Session, SessionState};
pub use transition::{OdometryTransition, Transition};
