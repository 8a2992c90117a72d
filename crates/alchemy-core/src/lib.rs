//! # alchemy-core: Distribution Network Topology Model
//!
//! Typed, hierarchical graph model of an electrical distribution network: an MV
//! backbone network owning substations, voltage levels and buses, with LV feeders
//! attached as sub-topologies.
//!
//! ## Design
//!
//! Every entity lives in a single arena, [`Topology`], and is addressed by an
//! [`EntityId`] handle. Containment is explicit: each container owns named
//! [`Slot`]s of children in insertion order, and every child knows its parent.
//! Cross references (line endpoints, a bus's voltage level, a usage point's
//! location) are handles too, so the graph has no shared ownership.
//!
//! ## Quick Start
//!
//! ```rust
//! use alchemy_core::*;
//!
//! let mut topo = Topology::new("MV1", "MV network", "scada");
//! let root = topo.root();
//! let ss = topo.add_substation(root, ElementInfo::new("SS1", "Substation 1")).unwrap();
//! let vl = topo
//!     .add_voltage_level(root, ElementInfo::new("VL20", "VL20"), 20.0, NetworkType::Mv)
//!     .unwrap();
//! let b1 = topo.add_bus(ss, ElementInfo::new("B1", "B1"), vl).unwrap();
//! let b2 = topo.add_bus(ss, ElementInfo::new("B2", "B2"), vl).unwrap();
//! topo.add_line(ss, ElementInfo::new("L1", "L1"), b1, b2, LineParams::default())
//!     .unwrap();
//!
//! assert_eq!(topo.bus(root, "B2"), Some(b2));
//! let self_loop = topo.add_line(ss, ElementInfo::new("L2", "L2"), b1, b1, LineParams::default());
//! assert!(self_loop.is_err());
//! ```
//!
//! ## Modules
//!
//! - [`kernel`] - arena, handles, slots, prefix inheritance
//! - [`model`] - per-kind entity payloads
//! - [`network`] - typed builders and lookups
//! - [`connectivity`] - per-network bus/branch graph (islands, statistics, DOT)
//! - [`sanitize`] - external id rendering
//! - [`diagnostics`] - issue collection for importers

pub mod connectivity;
pub mod diagnostics;
pub mod error;
pub mod kernel;
pub mod model;
pub mod network;
pub mod sanitize;

pub use connectivity::{
    connectivity_graph, cross_network_branches, export_dot, find_islands, graph_stats,
    ConnectivityGraph, GraphStats, IslandAnalysis,
};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::TopologyError;
pub use kernel::{ElementInfo, Entity, EntityId, Slot, Topology};
pub use model::*;
pub use sanitize::Sanitizer;
