//! # alchemy-io: Plugins Around the Topology Model
//!
//! Importers that build an [`alchemy_core::Topology`] from external sources, exporters
//! that write one document per network, and notifiers that post-process each exported
//! artifact. Plugins are looked up by name through the [`PluginRegistry`].
//!
//! ## Quick Start: Import Feeders and Export JSON
//!
//! ```rust,no_run
//! use alchemy_io::{Exporter, Params, PluginRegistry};
//! use alchemy_io::importers::import_dir;
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let result = import_dir(Path::new("data/network"), true)?;
//!     println!("{}", result.diagnostics.summary());
//!
//!     let registry = PluginRegistry::builtin();
//!     let exporter = registry.exporter("JsonExporter").expect("built in");
//!     let params = Params::new().with("output_file", "out/topology.json");
//!     let outcome = exporter.export_topology(&result.topology, &params)?;
//!     for artifact in outcome.artifacts {
//!         println!("{} -> {}", artifact.network_id, artifact.path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`params`] - string parameter maps and their validation
//! - [`plugin`] - importer, exporter and notifier traits
//! - [`importers`] - CSV workbook importer and the LV feeder resolver
//! - [`exporters`] - flat JSON and Cytoscape.js documents
//! - [`notifiers`] - HTTP API (feature `http`) and JSON pointer rewrite
//! - [`registry`] - built-in plugins by name

pub mod artifact;
pub mod exporters;
pub mod importers;
pub mod notifiers;
pub mod params;
pub mod plugin;
pub mod registry;

pub use artifact::artifact_path;
pub use params::{parse_flag, ParamError, ParamSpec, Params};
pub use plugin::{
    Artifact, ExportOutcome, Exporter, Importer, NetworkView, Notifier, NotifyOutcome, Payload,
};
pub use registry::PluginRegistry;
