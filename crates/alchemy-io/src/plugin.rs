//! Capability interfaces for the three pipeline stages.
//!
//! Importers produce a [`Topology`], exporters read one and write one artifact per
//! network, notifiers consume those artifacts. Implementations validate their own
//! parameters through a typed config built from [`Params`].

use crate::params::{ParamSpec, Params};
use alchemy_core::{EntityId, MeterData, Slot, Topology, TopologyError};
use anyhow::Result;
use serde_json::Value;
use std::borrow::Cow;
use std::path::PathBuf;

pub trait Importer {
    fn name(&self) -> &'static str;

    fn required_parameters(&self) -> &'static [ParamSpec];

    fn import_topology(&self, params: &Params) -> Result<Topology>;
}

/// A file written for one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub network_id: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ExportOutcome {
    pub ok: bool,
    /// One entry per network, root first
    pub artifacts: Vec<Artifact>,
}

impl ExportOutcome {
    pub fn success(artifacts: Vec<Artifact>) -> Self {
        Self {
            ok: true,
            artifacts,
        }
    }

    pub fn failure() -> Self {
        Self::default()
    }
}

pub trait Exporter {
    fn name(&self) -> &'static str;

    fn required_parameters(&self) -> &'static [ParamSpec];

    fn export_topology(&self, topology: &Topology, params: &Params) -> Result<ExportOutcome>;
}

/// Data threaded through the notifier chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    /// JSON when the text parses, otherwise the text itself.
    pub fn parse(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Text(text),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Payload::Json(value) => Cow::Owned(value.to_string()),
            Payload::Text(text) => Cow::Borrowed(text),
        }
    }
}

/// Post-processing step run on each exported artifact.
///
/// Notifiers are chained: each receives the payload produced by the previous one
/// (the artifact contents for the first) and returns its own. A failed outcome stops
/// the chain for that artifact.
pub trait Notifier {
    fn name(&self) -> &'static str;

    fn required_parameters(&self) -> &'static [ParamSpec];

    fn notify(
        &self,
        view: NetworkView<'_>,
        payload: Payload,
        params: &Params,
    ) -> Result<NotifyOutcome>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotifyOutcome {
    pub ok: bool,
    pub payload: Payload,
}

impl NotifyOutcome {
    pub fn success(payload: Payload) -> Self {
        Self { ok: true, payload }
    }

    pub fn failure(payload: Payload) -> Self {
        Self { ok: false, payload }
    }
}

/// Network handed to a notifier. Reads are unrestricted; writes are limited to
/// scalar attributes so the topology shape cannot change after import.
pub struct NetworkView<'a> {
    topology: &'a mut Topology,
    network: EntityId,
}

impl<'a> NetworkView<'a> {
    pub fn new(topology: &'a mut Topology, network: EntityId) -> Self {
        Self { topology, network }
    }

    pub fn network(&self) -> EntityId {
        self.network
    }

    pub fn topology(&self) -> &Topology {
        self.topology
    }

    pub fn id(&self) -> &str {
        self.topology.get(self.network).id()
    }

    pub fn name(&self) -> &str {
        self.topology.get(self.network).name()
    }

    pub fn set_switch_open(&mut self, switch_id: &str, open: bool) -> Result<(), TopologyError> {
        let switch = self
            .topology
            .collect(self.network, Slot::Switches)
            .into_iter()
            .find(|s| self.topology.get(*s).id() == switch_id)
            .ok_or_else(|| TopologyError::NotFound {
                kind: "switch",
                id: switch_id.to_string(),
            })?;
        self.topology.set_switch_open(switch, open)
    }

    pub fn set_meter_reading(
        &mut self,
        meter_id: &str,
        reading: MeterData,
    ) -> Result<(), TopologyError> {
        let topology = &*self.topology;
        let meter = [Slot::Loads, Slot::Generators, Slot::UsagePoints]
            .into_iter()
            .flat_map(|slot| topology.collect_on_buses(self.network, slot))
            .flat_map(|owner| topology.elements(owner, Slot::Meters).to_vec())
            .find(|m| topology.get(*m).id() == meter_id)
            .ok_or_else(|| TopologyError::NotFound {
                kind: "meter",
                id: meter_id.to_string(),
            })?;
        self.topology.set_meter_reading(meter, reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alchemy_core::{ElementInfo, EntityKind, LoadParams, NetworkType};

    #[test]
    fn test_payload_parse() {
        assert_eq!(
            Payload::parse("{\"a\":1}".into()),
            Payload::Json(serde_json::json!({"a": 1}))
        );
        assert_eq!(
            Payload::parse("not json".into()),
            Payload::Text("not json".into())
        );
        assert_eq!(Payload::Text("x".into()).to_text(), "x");
    }

    #[test]
    fn test_view_scalar_updates() {
        let mut topo = Topology::new("MV1", "MV", "sys");
        let root = topo.root();
        let vl = topo
            .add_voltage_level(root, ElementInfo::new("VL20", "VL20"), 20.0, NetworkType::Mv)
            .unwrap();
        let b1 = topo.add_bus(root, ElementInfo::new("B1", "B1"), vl).unwrap();
        let b2 = topo.add_bus(root, ElementInfo::new("B2", "B2"), vl).unwrap();
        let sw = topo
            .add_switch(root, ElementInfo::new("S1", "S1"), b1, b2, false)
            .unwrap();
        let load = topo
            .add_load(b1, ElementInfo::new("LD1", "LD1"), LoadParams::default())
            .unwrap();
        let meter = topo
            .add_meter(load, ElementInfo::new("M1", "M1"), MeterData::default())
            .unwrap();

        let mut view = NetworkView::new(&mut topo, root);
        assert_eq!(view.id(), "MV1");
        view.set_switch_open("S1", true).unwrap();
        view.set_meter_reading(
            "M1",
            MeterData {
                p: Some(1.5),
                q: None,
            },
        )
        .unwrap();
        assert!(view.set_switch_open("S9", true).is_err());

        assert!(matches!(topo.get(sw).kind(), EntityKind::Switch(s) if s.open));
        assert!(matches!(topo.get(meter).kind(), EntityKind::Meter(m) if m.p == Some(1.5)));
    }
}
