//! Topology exporters.
//!
//! Every exporter writes one document per network: the root network first, then each
//! LV sub-topology in creation order. File names come from [`artifact_path`].

pub mod cytoscape;
pub mod json;
pub mod metadata;

pub use cytoscape::{CytoscapeJsExporter, CytoscapeJsExporterConfig};
pub use json::{network_document, JsonExporter, JsonExporterConfig};
pub use metadata::ExportMetadata;

use crate::artifact::artifact_path;
use crate::plugin::Artifact;
use alchemy_core::{EntityId, Topology};
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::info;

/// Render each network with `render` and write it next to `requested`.
pub(crate) fn write_per_network<F>(
    topology: &Topology,
    requested: &Path,
    mut render: F,
) -> Result<Vec<Artifact>>
where
    F: FnMut(EntityId) -> Result<Value>,
{
    let mut artifacts = Vec::new();
    for network in topology.networks() {
        let network_id = topology.get(network).id().to_string();
        let path = artifact_path(requested, &network_id);
        let document = render(network)?;
        let text = serde_json::to_string_pretty(&document)?;
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        info!(network = network_id.as_str(), path = %path.display(), "network exported");
        artifacts.push(Artifact { network_id, path });
    }
    Ok(artifacts)
}
