//! Cytoscape.js element export for browser visualisation.
//!
//! Buses and equipment become nodes; lines become edges between their buses.
//! Attached equipment (loads, generators, transformers, switches, ...) is linked to
//! its bus by a synthetic `{TYPE}_LINE` edge. Substations are compound parents of
//! the nodes they contain.
//!
//! Coordinates are projected as `x = lon * 100000`, `y = -lat * 100000`. A node
//! without coordinates takes the position of its bus or substation.

use super::{write_per_network, ExportMetadata};
use crate::params::{ParamSpec, Params};
use crate::plugin::{ExportOutcome, Exporter};
use alchemy_core::{EntityId, EntityKind, Location, Slot, Topology};
use anyhow::Result;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;

const DEFAULT_SYSTEM: &str = "default_system";
const SCALE: f64 = 100_000.0;

const PARAMETERS: &[ParamSpec] = &[
    ParamSpec::required("output_file", "Requested output file; one file per network"),
    ParamSpec::optional("system", DEFAULT_SYSTEM, "System name prepended to element ids"),
    ParamSpec::optional(
        "include_metadata",
        "false",
        "Wrap elements in a document with counts and layout bounds",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CytoscapeJsExporterConfig {
    pub output_file: PathBuf,
    pub system: String,
    pub include_metadata: bool,
}

impl CytoscapeJsExporterConfig {
    pub fn from_params(params: &Params) -> Result<Self> {
        let params = params.resolve(PARAMETERS)?;
        Ok(Self {
            output_file: PathBuf::from(params.require("output_file")?),
            system: params.require("system")?.to_string(),
            include_metadata: params.flag("include_metadata")?,
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CytoscapeJsExporter;

impl Exporter for CytoscapeJsExporter {
    fn name(&self) -> &'static str {
        "CytoscapeJsExporter"
    }

    fn required_parameters(&self) -> &'static [ParamSpec] {
        PARAMETERS
    }

    fn export_topology(&self, topology: &Topology, params: &Params) -> Result<ExportOutcome> {
        let config = CytoscapeJsExporterConfig::from_params(params)?;
        let artifacts = write_per_network(topology, &config.output_file, |network| {
            Ok(network_elements(topology, network, &config))
        })?;
        Ok(ExportOutcome::success(artifacts))
    }
}

/// Cytoscape.js elements of one network, as a flat array or a metadata document.
pub fn network_elements(
    topology: &Topology,
    network: EntityId,
    config: &CytoscapeJsExporterConfig,
) -> Value {
    let mut graph = GraphWriter::new(topology, network, &config.system);
    for &substation in topology.elements(network, Slot::Substations) {
        graph.substation(substation);
        for &bus in topology.elements(substation, Slot::Buses) {
            graph.bus_with_attachments(bus, Some(substation));
        }
        for &tx in topology.elements(substation, Slot::TwoWindingsTransformers) {
            graph.transformer(tx, "2WINDINGSTRANSFORMER", substation);
        }
        for &tx in topology.elements(substation, Slot::ThreeWindingsTransformers) {
            graph.transformer(tx, "3WINDINGSTRANSFORMER", substation);
        }
        for &switch in topology.elements(substation, Slot::Switches) {
            graph.switch(switch, Some(substation));
        }
        for &line in topology.elements(substation, Slot::Lines) {
            graph.line(line);
        }
    }
    for &bus in topology.elements(network, Slot::Buses) {
        graph.bus_with_attachments(bus, None);
    }
    for &switch in topology.elements(network, Slot::Switches) {
        graph.switch(switch, None);
    }
    for &line in topology.elements(network, Slot::Lines) {
        graph.line(line);
    }

    if config.include_metadata {
        graph.document(&config.system)
    } else {
        let GraphWriter { nodes, edges, .. } = graph;
        Value::Array(nodes.into_iter().chain(edges).collect())
    }
}

struct GraphWriter<'a> {
    topology: &'a Topology,
    system: &'a str,
    network: EntityId,
    nodes: Vec<Value>,
    edges: Vec<Value>,
    /// Projected position of each emitted node, for inheritance and bounds
    positions: HashMap<EntityId, (f64, f64)>,
}

impl<'a> GraphWriter<'a> {
    fn new(topology: &'a Topology, network: EntityId, system: &'a str) -> Self {
        Self {
            topology,
            system,
            network,
            nodes: Vec::new(),
            edges: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn element_id(&self, element_type: &str, id: &str) -> String {
        if self.system.is_empty() || self.system == DEFAULT_SYSTEM {
            format!("{element_type}@{id}")
        } else {
            format!("{element_type}@{}_{id}", self.system)
        }
    }

    fn node_id(&self, handle: EntityId, element_type: &str) -> String {
        self.element_id(element_type, self.topology.get(handle).id())
    }

    fn data(&self, id: String, handle: EntityId, element_type: &str) -> Map<String, Value> {
        let entity = self.topology.get(handle);
        let mut data = Map::new();
        data.insert("id".into(), json!(id));
        data.insert("name".into(), json!(entity.name()));
        data.insert("type".into(), json!(element_type));
        data.insert("system".into(), json!(self.system));
        data.insert("network".into(), json!(self.topology.get(self.network).id()));
        data
    }

    /// Emit a node placed at its own location, else at `fallback`'s position.
    fn node(
        &mut self,
        handle: EntityId,
        element_type: &str,
        parent: Option<String>,
        fallback: Option<EntityId>,
        extra: Map<String, Value>,
    ) -> String {
        let id = self.node_id(handle, element_type);
        let mut data = self.data(id.clone(), handle, element_type);
        if let Some(parent) = parent {
            data.insert("parent".into(), json!(parent));
        }
        data.extend(extra);

        let position = self
            .topology
            .get(handle)
            .location()
            .map(project)
            .or_else(|| fallback.and_then(|f| self.positions.get(&f).copied()));
        let mut node = Map::new();
        match position {
            Some((x, y)) => {
                self.positions.insert(handle, (x, y));
                data.insert("lon".into(), json!(x / SCALE));
                data.insert("lat".into(), json!(-y / SCALE));
                data.insert("hasPosition".into(), json!(true));
                node.insert("data".into(), Value::Object(data));
                node.insert("position".into(), json!({"x": x, "y": y}));
            }
            None => {
                data.insert("hasPosition".into(), json!(false));
                node.insert("data".into(), Value::Object(data));
            }
        }
        node.insert("classes".into(), json!(element_type.to_lowercase()));
        self.nodes.push(Value::Object(node));
        id
    }

    fn edge(
        &mut self,
        id: String,
        handle: EntityId,
        element_type: &str,
        source: String,
        target: String,
        extra: Map<String, Value>,
    ) {
        let mut data = self.data(id, handle, element_type);
        data.insert("source".into(), json!(source));
        data.insert("target".into(), json!(target));
        data.extend(extra);
        self.edges.push(json!({
            "data": data,
            "classes": element_type.to_lowercase(),
        }));
    }

    /// `{TYPE}_LINE` edge from a bus to the equipment node attached to it.
    fn connection(&mut self, bus: EntityId, handle: EntityId, element_type: &str, target: String) {
        let edge_type = format!("{element_type}_LINE");
        let id = self.element_id(
            &edge_type,
            &format!("{}_{}", self.topology.get(bus).id(), self.topology.get(handle).id()),
        );
        let source = self.node_id(bus, "BUS");
        self.edge(id, handle, &edge_type, source, target, Map::new());
    }

    fn substation(&mut self, handle: EntityId) {
        self.node(handle, "SUBSTATION", None, None, Map::new());
    }

    fn parent_id(&self, substation: Option<EntityId>) -> Option<String> {
        substation.map(|s| self.node_id(s, "SUBSTATION"))
    }

    fn nominal_voltage(&self, bus: EntityId) -> Option<f64> {
        let vl = self.topology.bus_voltage_level(bus)?;
        match self.topology.get(vl).kind() {
            EntityKind::VoltageLevel(data) => Some(data.nominal_v),
            _ => None,
        }
    }

    fn bus_with_attachments(&mut self, bus: EntityId, substation: Option<EntityId>) {
        let topology = self.topology;
        let parent = self.parent_id(substation);
        let mut extra = Map::new();
        extra.insert("nominalVoltage".into(), json!(self.nominal_voltage(bus)));
        self.node(bus, "BUS", parent.clone(), substation, extra);

        for &load in topology.elements(bus, Slot::Loads) {
            let mut extra = Map::new();
            if let EntityKind::Load(params) = topology.get(load).kind() {
                extra.insert("ratedPower".into(), json!(params.p));
            }
            self.attachment(bus, load, "LOAD", parent.clone(), extra);
        }
        for &generator in topology.elements(bus, Slot::Generators) {
            let max_p = match topology.get(generator).kind() {
                EntityKind::MvGenerator(params) => params.max_p,
                EntityKind::Generator(data) => data.params.max_p,
                _ => None,
            };
            let mut extra = Map::new();
            extra.insert("maxPower".into(), json!(max_p));
            self.attachment(bus, generator, "GENERATOR", parent.clone(), extra);
        }
        for &dl in topology.elements(bus, Slot::DanglingLines) {
            self.attachment(bus, dl, "DANGLINGLINE", parent.clone(), Map::new());
        }
        for &upl in topology.elements(bus, Slot::UsagePointLocations) {
            self.attachment(bus, upl, "USAGEPOINTLOCATION", parent.clone(), Map::new());
        }
    }

    fn attachment(
        &mut self,
        bus: EntityId,
        handle: EntityId,
        element_type: &str,
        parent: Option<String>,
        extra: Map<String, Value>,
    ) {
        let id = self.node(handle, element_type, parent, Some(bus), extra);
        self.connection(bus, handle, element_type, id);
    }

    fn transformer(&mut self, handle: EntityId, element_type: &str, substation: EntityId) {
        let (buses, rated) = match self.topology.get(handle).kind() {
            EntityKind::TwoWindingsTransformer(tx) => {
                (vec![tx.bus1, tx.bus2], json!(tx.params.nominal))
            }
            EntityKind::ThreeWindingsTransformer(tx) => {
                (tx.buses.to_vec(), json!(tx.params.rated_s))
            }
            _ => return,
        };
        let mut extra = Map::new();
        extra.insert("ratedApparentPower".into(), rated);
        let parent = self.parent_id(Some(substation));
        let id = self.node(handle, element_type, parent, buses.first().copied(), extra);
        for bus in buses {
            self.connection(bus, handle, "TRANSFORMER", id.clone());
        }
    }

    fn switch(&mut self, handle: EntityId, substation: Option<EntityId>) {
        let EntityKind::Switch(data) = self.topology.get(handle).kind() else {
            return;
        };
        let (bus1, bus2, open) = (data.bus1, data.bus2, data.open);
        let mut extra = Map::new();
        extra.insert("open".into(), json!(open));
        let parent = self.parent_id(substation);
        let id = self.node(handle, "SWITCH", parent, Some(bus1), extra);
        self.connection(bus1, handle, "SWITCH", id.clone());
        self.connection(bus2, handle, "SWITCH", id);
    }

    fn line(&mut self, handle: EntityId) {
        let EntityKind::Line(line) = self.topology.get(handle).kind() else {
            return;
        };
        let p = &line.params;
        let mut extra = Map::new();
        extra.insert("length".into(), json!(p.length));
        extra.insert("currentLimit".into(), json!(p.current_limit));
        extra.insert("r".into(), json!(p.r));
        extra.insert("x".into(), json!(p.x));
        extra.insert("nominalVoltage".into(), json!(self.nominal_voltage(line.bus1)));
        extra.insert("typeLine".into(), json!(format!("LINE_{}", line.line_type)));
        let id = self.node_id(handle, "LINE");
        let source = self.node_id(line.bus1, "BUS");
        let target = self.node_id(line.bus2, "BUS");
        self.edge(id, handle, "LINE", source, target, extra);
    }

    fn document(self, system: &str) -> Value {
        let network = self.topology.get(self.network);
        let metadata = ExportMetadata::now("CytoscapeJsExporter");
        let bounds = layout_bounds(self.positions.values().copied());
        json!({
            "format_version": "1.0",
            "generated_by": metadata.generator,
            "generated_at": metadata.creation_timestamp(),
            "metadata": {
                "name": network.id(),
                "description": network.name(),
                "nodeCount": self.nodes.len(),
                "edgeCount": self.edges.len(),
                "system": system,
                "positionedNodes": self.positions.len(),
                "hasLayout": !self.positions.is_empty(),
                "layoutBounds": bounds,
            },
            "elements": {
                "nodes": self.nodes,
                "edges": self.edges,
            },
        })
    }
}

fn project(location: Location) -> (f64, f64) {
    (location.longitude * SCALE, -location.latitude * SCALE)
}

fn layout_bounds(points: impl Iterator<Item = (f64, f64)>) -> Value {
    let mut bounds: Option<(f64, f64, f64, f64)> = None;
    for (x, y) in points {
        bounds = Some(match bounds {
            None => (x, x, y, y),
            Some((min_x, max_x, min_y, max_y)) => {
                (min_x.min(x), max_x.max(x), min_y.min(y), max_y.max(y))
            }
        });
    }
    match bounds {
        Some((min_x, max_x, min_y, max_y)) => json!({
            "minX": min_x,
            "maxX": max_x,
            "minY": min_y,
            "maxY": max_y,
            "width": max_x - min_x,
            "height": max_y - min_y,
        }),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alchemy_core::{ElementInfo, LineParams, LoadParams, NetworkType};

    fn config(system: &str, include_metadata: bool) -> CytoscapeJsExporterConfig {
        CytoscapeJsExporterConfig {
            output_file: PathBuf::from("unused.json"),
            system: system.into(),
            include_metadata,
        }
    }

    fn topology() -> Topology {
        let mut topo = Topology::new("MV1", "Backbone", "scada");
        let root = topo.root();
        let ss = topo
            .add_substation(
                root,
                ElementInfo::new("SS1", "Main").with_location(Some(Location::new(45.0, 7.0))),
            )
            .unwrap();
        let vl = topo
            .add_voltage_level(root, ElementInfo::new("VL20", "VL20"), 20.0, NetworkType::Mv)
            .unwrap();
        let b1 = topo.add_bus(ss, ElementInfo::new("B1", "B1"), vl).unwrap();
        let b2 = topo
            .add_bus(
                root,
                ElementInfo::new("B2", "B2").with_location(Some(Location::new(45.5, 7.5))),
                vl,
            )
            .unwrap();
        let b1b = topo.add_bus(ss, ElementInfo::new("B1b", "B1b"), vl).unwrap();
        let load = LoadParams {
            p: 100.0,
            ..LoadParams::default()
        };
        topo.add_load(b1, ElementInfo::new("LD1", "Load"), load).unwrap();
        topo.add_switch(ss, ElementInfo::new("S1", "Switch"), b1, b1b, true)
            .unwrap();
        topo.add_line(root, ElementInfo::new("L1", "Line"), b1, b2, LineParams::default())
            .unwrap();
        topo
    }

    fn find<'v>(elements: &'v [Value], id: &str) -> &'v Value {
        elements
            .iter()
            .find(|e| e["data"]["id"] == id)
            .unwrap_or_else(|| panic!("no element {id}"))
    }

    #[test]
    fn test_ids_and_parents() {
        let topo = topology();
        let out = network_elements(&topo, topo.root(), &config("scada", false));
        let elements = out.as_array().unwrap();

        let bus = find(elements, "BUS@scada_B1");
        assert_eq!(bus["data"]["parent"], "SUBSTATION@scada_SS1");
        assert_eq!(bus["data"]["nominalVoltage"], 20.0);
        assert_eq!(bus["classes"], "bus");

        let load = find(elements, "LOAD@scada_LD1");
        assert_eq!(load["data"]["ratedPower"], 100.0);
        let link = find(elements, "LOAD_LINE@scada_B1_LD1");
        assert_eq!(link["data"]["source"], "BUS@scada_B1");
        assert_eq!(link["data"]["target"], "LOAD@scada_LD1");

        let switch = find(elements, "SWITCH@scada_S1");
        assert_eq!(switch["data"]["open"], true);

        let line = find(elements, "LINE@scada_L1");
        assert_eq!(line["data"]["source"], "BUS@scada_B1");
        assert_eq!(line["data"]["target"], "BUS@scada_B2");
        assert_eq!(line["data"]["typeLine"], "LINE_MV");
    }

    #[test]
    fn test_default_system_is_not_prefixed() {
        let topo = topology();
        let out = network_elements(&topo, topo.root(), &config(DEFAULT_SYSTEM, false));
        let elements = out.as_array().unwrap();
        find(elements, "BUS@B1");
        find(elements, "LINE@L1");
    }

    #[test]
    fn test_positions_are_inherited() {
        let topo = topology();
        let out = network_elements(&topo, topo.root(), &config("", false));
        let elements = out.as_array().unwrap();

        let ss = find(elements, "SUBSTATION@SS1");
        assert_eq!(ss["position"]["x"], 700_000.0);
        assert_eq!(ss["position"]["y"], -4_500_000.0);
        assert_eq!(ss["data"]["hasPosition"], true);

        let load = find(elements, "LOAD@LD1");
        assert_eq!(load["position"], ss["position"]);
        assert_eq!(load["data"]["lat"], 45.0);
    }

    #[test]
    fn test_metadata_document() {
        let topo = topology();
        let out = network_elements(&topo, topo.root(), &config("scada", true));
        assert_eq!(out["format_version"], "1.0");
        let meta = &out["metadata"];
        assert_eq!(meta["name"], "MV1");
        assert_eq!(meta["nodeCount"], out["elements"]["nodes"].as_array().unwrap().len());
        assert_eq!(meta["edgeCount"], out["elements"]["edges"].as_array().unwrap().len());
        assert_eq!(meta["hasLayout"], true);
        assert_eq!(meta["layoutBounds"]["minX"], 700_000.0);
        assert_eq!(meta["layoutBounds"]["maxX"], 750_000.0);
        assert!(out["generated_by"].as_str().unwrap().contains("CytoscapeJsExporter"));
    }

    #[test]
    fn test_export_writes_files() {
        let topo = topology();
        let dir = tempfile::tempdir().unwrap();
        let params = Params::new().with(
            "output_file",
            dir.path().join("graph.json").to_string_lossy().into_owned(),
        );
        let outcome = CytoscapeJsExporter.export_topology(&topo, &params).unwrap();
        assert!(outcome.ok);
        assert_eq!(outcome.artifacts.len(), 1);
        assert!(dir.path().join("graph_MV1.json").exists());
    }
}
