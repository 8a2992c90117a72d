//! Flat JSON document export, one document per network.
//!
//! A document groups elements by kind (`substations`, `buses`, `lines`, ...). Every
//! element carries its sanitized external id, a `context` URI built from the
//! configured context, its original id as `mRID`, and GeoJSON geometry when the
//! source had coordinates. References to other elements (a load's bus, a switch's
//! endpoints) use the same external id scheme.

use super::write_per_network;
use crate::params::{ParamSpec, Params};
use crate::plugin::{ExportOutcome, Exporter};
use alchemy_core::{EntityId, EntityKind, Sanitizer, Slot, Topology};
use anyhow::Result;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::path::PathBuf;

const PARAMETERS: &[ParamSpec] = &[
    ParamSpec::required("output_file", "Requested output file; one file per network"),
    ParamSpec::optional("context", "", "Prefix of each element's context URI"),
    ParamSpec::optional("system", "", "System name prepended to external ids"),
    ParamSpec::optional(
        "transliterate",
        "false",
        "Replace Greek capitals that look like Latin ones in external ids",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonExporterConfig {
    pub output_file: PathBuf,
    pub context: String,
    pub system: String,
    pub transliterate: bool,
}

impl JsonExporterConfig {
    pub fn from_params(params: &Params) -> Result<Self> {
        let params = params.resolve(PARAMETERS)?;
        Ok(Self {
            output_file: PathBuf::from(params.require("output_file")?),
            context: params.get("context").unwrap_or_default().to_string(),
            system: params.get("system").unwrap_or_default().to_string(),
            transliterate: params.flag("transliterate")?,
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonExporter;

impl Exporter for JsonExporter {
    fn name(&self) -> &'static str {
        "JsonExporter"
    }

    fn required_parameters(&self) -> &'static [ParamSpec] {
        PARAMETERS
    }

    fn export_topology(&self, topology: &Topology, params: &Params) -> Result<ExportOutcome> {
        let config = JsonExporterConfig::from_params(params)?;
        let artifacts = write_per_network(topology, &config.output_file, |network| {
            Ok(network_document(topology, network, &config))
        })?;
        Ok(ExportOutcome::success(artifacts))
    }
}

/// The document for a single network. Sub-topologies are not descended into.
pub fn network_document(
    topology: &Topology,
    network: EntityId,
    config: &JsonExporterConfig,
) -> Value {
    let mut writer = DocumentWriter::new(topology, network, config);
    for &substation in topology.elements(network, Slot::Substations) {
        writer.substation(substation);
        for &bus in topology.elements(substation, Slot::Buses) {
            writer.bus_with_attachments(bus, Some(substation));
        }
        for &switch in topology.elements(substation, Slot::Switches) {
            writer.switch(switch, Some(substation));
        }
        for &tx in topology.elements(substation, Slot::TwoWindingsTransformers) {
            writer.two_windings_transformer(tx);
        }
        for &tx in topology.elements(substation, Slot::ThreeWindingsTransformers) {
            writer.three_windings_transformer(tx);
        }
        for &line in topology.elements(substation, Slot::Lines) {
            writer.line(line);
        }
    }
    for &bus in topology.elements(network, Slot::Buses) {
        writer.bus_with_attachments(bus, None);
    }
    for &switch in topology.elements(network, Slot::Switches) {
        writer.switch(switch, None);
    }
    for &line in topology.elements(network, Slot::Lines) {
        writer.line(line);
    }
    writer.finish()
}

/// Shape and type fields every element of a kind starts from.
fn template(element_type: &str) -> (&'static str, &'static str) {
    match element_type {
        "substation" => ("CT", "Substation"),
        "bus" => ("bus", "Bus"),
        "load" => ("pod", "Load"),
        "generator" => ("generator", "Generator"),
        "transformer" => ("transformer", "Transformer"),
        "line" => ("line", "Line"),
        "switch" => ("switch", "Switch"),
        "danglingLine" => ("danglingLine", "DanglingLine"),
        "usagePointLocation" => ("pod", "UsagePointLocation"),
        "usagePoint" => ("pod", "UsagePoint"),
        "meter" => ("meter", "Meter"),
        _ => ("", ""),
    }
}

#[derive(Default)]
struct Sections {
    substations: Vec<Value>,
    buses: Vec<Value>,
    loads: Vec<Value>,
    generators: Vec<Value>,
    transformers: Vec<Value>,
    lines: Vec<Value>,
    switches: Vec<Value>,
    dangling_lines: Vec<Value>,
    usage_point_locations: Vec<Value>,
    usage_points: Vec<Value>,
    meters: Vec<Value>,
}

struct DocumentWriter<'a> {
    topology: &'a Topology,
    sanitizer: Sanitizer,
    context: &'a str,
    system: &'a str,
    network: &'a str,
    sections: Sections,
}

impl<'a> DocumentWriter<'a> {
    fn new(topology: &'a Topology, network: EntityId, config: &'a JsonExporterConfig) -> Self {
        Self {
            topology,
            sanitizer: Sanitizer::new(config.system.as_str())
                .with_transliteration(config.transliterate),
            context: &config.context,
            system: &config.system,
            network: topology.get(network).id(),
            sections: Sections::default(),
        }
    }

    /// External id of `target`, rendered with the prefix of the referring element.
    fn reference(&self, from: EntityId, target: EntityId) -> String {
        self.sanitizer
            .external_id(self.topology.prefix(from), self.topology.get(target).id())
    }

    fn element(&self, handle: EntityId, element_type: &str) -> Map<String, Value> {
        let entity = self.topology.get(handle);
        let external_id = self.reference(handle, handle);
        let (shape, type_name) = template(element_type);
        let mut obj = Map::new();
        obj.insert("shape".into(), json!(shape));
        obj.insert("type".into(), json!(type_name));
        obj.insert(
            "context".into(),
            json!(format!("{}{}#{}", self.context, element_type, external_id)),
        );
        obj.insert("_id".into(), json!(external_id));
        obj.insert("mRID".into(), json!(entity.id()));
        obj.insert("name".into(), json!(entity.name()));
        obj.insert("system".into(), json!(self.system));
        obj.insert("network".into(), json!(self.network));
        if let Some(feeder_num) = entity.feeder_num() {
            obj.insert("feederNumber".into(), json!(feeder_num));
        }
        match (entity.shape(), entity.location()) {
            (Some(shape), _) if !shape.is_empty() => {
                let coordinates: Vec<[f64; 2]> = shape
                    .points()
                    .iter()
                    .map(|p| [p.longitude, p.latitude])
                    .collect();
                obj.insert(
                    "geometry".into(),
                    json!({"type": "LineString", "coordinates": coordinates}),
                );
            }
            (_, Some(point)) => {
                obj.insert(
                    "geometry".into(),
                    json!({"type": "Point", "coordinates": [point.longitude, point.latitude]}),
                );
            }
            _ => {}
        }
        obj
    }

    fn voltage_level(&self, bus: EntityId) -> Option<(String, f64, &'static str)> {
        let vl = self.topology.bus_voltage_level(bus)?;
        match self.topology.get(vl).kind() {
            EntityKind::VoltageLevel(data) => Some((
                self.topology.get(vl).id().to_string(),
                data.nominal_v * 1000.0,
                data.level_type.as_str(),
            )),
            _ => None,
        }
    }

    fn substation(&mut self, handle: EntityId) {
        let mut obj = self.element(handle, "substation");
        let levels: BTreeSet<String> = self
            .topology
            .elements(handle, Slot::Buses)
            .iter()
            .filter_map(|bus| self.voltage_level(*bus).map(|(id, _, _)| id))
            .collect();
        obj.insert("voltageLevels".into(), json!(levels));
        self.sections.substations.push(Value::Object(obj));
    }

    fn with_substation(
        &self,
        obj: &mut Map<String, Value>,
        from: EntityId,
        substation: Option<EntityId>,
    ) {
        if let Some(substation) = substation {
            obj.insert("substation".into(), json!(self.reference(from, substation)));
        }
    }

    fn bus_with_attachments(&mut self, bus: EntityId, substation: Option<EntityId>) {
        let topology = self.topology;
        let mut obj = self.element(bus, "bus");
        if let Some((vl, nominal, level_type)) = self.voltage_level(bus) {
            obj.insert("voltageLevel".into(), json!(vl));
            obj.insert("nominalVoltage".into(), json!(nominal));
            obj.insert("type".into(), json!(level_type));
        }
        self.with_substation(&mut obj, bus, substation);
        self.sections.buses.push(Value::Object(obj));

        for &load in topology.elements(bus, Slot::Loads) {
            self.load(load, bus, substation);
            self.meters(load);
        }
        for &upl in topology.elements(bus, Slot::UsagePointLocations) {
            self.usage_point_location(upl, bus, substation);
        }
        for &up in topology.elements(bus, Slot::UsagePoints) {
            self.usage_point(up, bus);
            self.meters(up);
        }
        for &generator in topology.elements(bus, Slot::Generators) {
            self.generator(generator, bus, substation);
            self.meters(generator);
        }
        for &dl in topology.elements(bus, Slot::DanglingLines) {
            self.dangling_line(dl, bus, substation);
        }
    }

    fn load(&mut self, handle: EntityId, bus: EntityId, substation: Option<EntityId>) {
        let mut obj = self.element(handle, "load");
        obj.insert("bus".into(), json!(self.reference(handle, bus)));
        if let EntityKind::Load(params) = self.topology.get(handle).kind() {
            obj.insert("ratedPower".into(), json!(params.p));
            obj.insert("referenceReactivePower".into(), json!(params.q));
        }
        self.with_substation(&mut obj, handle, substation);
        self.sections.loads.push(Value::Object(obj));
    }

    fn usage_point_location(
        &mut self,
        handle: EntityId,
        bus: EntityId,
        substation: Option<EntityId>,
    ) {
        let mut obj = self.element(handle, "usagePointLocation");
        obj.insert("bus".into(), json!(self.reference(handle, bus)));
        self.with_substation(&mut obj, handle, substation);
        self.sections.usage_point_locations.push(Value::Object(obj));
    }

    fn usage_point(&mut self, handle: EntityId, bus: EntityId) {
        let mut obj = self.element(handle, "usagePoint");
        obj.insert("bus".into(), json!(self.reference(handle, bus)));
        if let EntityKind::UsagePoint(data) = self.topology.get(handle).kind() {
            obj.insert(
                "usagePointLocation".into(),
                json!(self.reference(handle, data.usage_point_location)),
            );
            obj.insert("ratedPower".into(), json!(data.rated_power));
        }
        self.sections.usage_points.push(Value::Object(obj));
    }

    fn meters(&mut self, owner: EntityId) {
        for &meter in self.topology.elements(owner, Slot::Meters) {
            let mut obj = self.element(meter, "meter");
            obj.insert("usagePoint".into(), json!(self.reference(meter, owner)));
            if let EntityKind::Meter(reading) = self.topology.get(meter).kind() {
                obj.insert("installedPower".into(), json!(reading.p));
                obj.insert("referenceReactivePower".into(), json!(reading.q));
            }
            self.sections.meters.push(Value::Object(obj));
        }
    }

    fn generator(&mut self, handle: EntityId, bus: EntityId, substation: Option<EntityId>) {
        let mut obj = self.element(handle, "generator");
        obj.insert("bus".into(), json!(self.reference(handle, bus)));
        let params = match self.topology.get(handle).kind() {
            EntityKind::MvGenerator(params) => Some(params),
            EntityKind::Generator(data) => Some(&data.params),
            _ => None,
        };
        if let Some(params) = params {
            obj.insert("controllable".into(), json!(params.controllable));
            obj.insert("installedPower".into(), json!(params.max_p));
        }
        self.with_substation(&mut obj, handle, substation);
        self.sections.generators.push(Value::Object(obj));
    }

    fn dangling_line(&mut self, handle: EntityId, bus: EntityId, substation: Option<EntityId>) {
        let mut obj = self.element(handle, "danglingLine");
        obj.insert("bus".into(), json!(self.reference(handle, bus)));
        if let EntityKind::DanglingLine(data) = self.topology.get(handle).kind() {
            obj.insert("type".into(), json!(data.line_type));
            obj.insert("controllable".into(), json!(data.controllable));
        }
        self.with_substation(&mut obj, handle, substation);
        self.sections.dangling_lines.push(Value::Object(obj));
    }

    fn switch(&mut self, handle: EntityId, substation: Option<EntityId>) {
        let mut obj = self.element(handle, "switch");
        if let EntityKind::Switch(data) = self.topology.get(handle).kind() {
            obj.insert("bus1".into(), json!(self.reference(handle, data.bus1)));
            obj.insert("bus2".into(), json!(self.reference(handle, data.bus2)));
            obj.insert("open".into(), json!(data.open));
        }
        self.with_substation(&mut obj, handle, substation);
        self.sections.switches.push(Value::Object(obj));
    }

    fn two_windings_transformer(&mut self, handle: EntityId) {
        let mut obj = self.element(handle, "transformer");
        let parent = self.topology.parent(handle);
        self.with_substation(&mut obj, handle, parent);
        if let EntityKind::TwoWindingsTransformer(tx) = self.topology.get(handle).kind() {
            let p = &tx.params;
            obj.insert("bus1".into(), json!(self.reference(handle, tx.bus1)));
            obj.insert("bus2".into(), json!(self.reference(handle, tx.bus2)));
            obj.insert("r".into(), json!(p.r));
            obj.insert("x".into(), json!(p.x));
            obj.insert("g".into(), json!(p.g));
            obj.insert("b".into(), json!(p.b));
            obj.insert("ratedApparentPower".into(), json!(p.nominal));
            for (n, bus) in [(1, tx.bus1), (2, tx.bus2)] {
                if let Some((vl, nominal, _)) = self.voltage_level(bus) {
                    obj.insert(format!("ratedVoltage{n}"), json!(nominal));
                    obj.insert(format!("voltageLevel{n}"), json!(vl));
                }
            }

            let numbers = [
                ("i0_percent", p.i0_percent),
                ("pfe_kw", p.pfe_kw),
                ("shift_degree", p.shift_degree),
                ("tap_max", p.tap_max),
                ("tap_min", p.tap_min),
                ("tap_neutral", p.tap_neutral),
                ("tap_pos", p.tap_pos),
                ("tap_step_degree", p.tap_step_degree),
                ("tap_step_percent", p.tap_step_percent),
                ("vk_percent", p.vk_percent),
                ("vkr_percent", p.vkr_percent),
            ];
            let mut pandapower = Map::new();
            for (key, value) in numbers {
                if let Some(value) = value.filter(|v| !v.is_nan()) {
                    pandapower.insert(key.into(), json!(value));
                }
            }
            for (key, value) in [("std_type", &p.std_type), ("tap_side", &p.tap_side)] {
                if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                    pandapower.insert(key.into(), json!(value));
                }
            }
            if !pandapower.is_empty() {
                obj.insert("pandaPowerParameters".into(), Value::Object(pandapower));
            }
        }
        self.sections.transformers.push(Value::Object(obj));
    }

    fn three_windings_transformer(&mut self, handle: EntityId) {
        let mut obj = self.element(handle, "transformer");
        let parent = self.topology.parent(handle);
        self.with_substation(&mut obj, handle, parent);
        if let EntityKind::ThreeWindingsTransformer(tx) = self.topology.get(handle).kind() {
            let p = &tx.params;
            for (i, bus) in tx.buses.iter().enumerate() {
                let n = i + 1;
                obj.insert(format!("bus{n}"), json!(self.reference(handle, *bus)));
                obj.insert(format!("r{n}"), json!(p.r[i]));
                obj.insert(format!("x{n}"), json!(p.x[i]));
                obj.insert(format!("g{n}"), json!(p.g[i]));
                obj.insert(format!("b{n}"), json!(p.b[i]));
                obj.insert(format!("ratedApparentPower{n}"), json!(p.rated_s[i]));
                if let Some((vl, nominal, _)) = self.voltage_level(*bus) {
                    obj.insert(format!("ratedVoltage{n}"), json!(nominal));
                    obj.insert(format!("voltageLevel{n}"), json!(vl));
                }
            }
            obj.insert("ratedVoltageStarBus".into(), json!(p.rated_star * 1000.0));
        }
        self.sections.transformers.push(Value::Object(obj));
    }

    fn line(&mut self, handle: EntityId) {
        let mut obj = self.element(handle, "line");
        if let EntityKind::Line(line) = self.topology.get(handle).kind() {
            let p = &line.params;
            let vl = self.voltage_level(line.bus1).map(|(id, _, _)| id);
            obj.insert("bus1".into(), json!(self.reference(handle, line.bus1)));
            obj.insert("bus2".into(), json!(self.reference(handle, line.bus2)));
            obj.insert("voltageLevel1".into(), json!(vl));
            obj.insert("voltageLevel2".into(), json!(vl));
            obj.insert("length".into(), json!(p.length));
            obj.insert("shape".into(), json!(line.line_type));
            obj.insert("type".into(), json!(line.line_type));
            obj.insert("cable".into(), json!(p.cable));
            let limit = (p.current_limit > 0.0).then_some(p.current_limit);
            obj.insert("currentLimit".into(), json!(limit));
            obj.insert("r".into(), json!(p.r));
            obj.insert("x".into(), json!(p.x));
            obj.insert("g1".into(), json!(p.g1));
            obj.insert("b1".into(), json!(p.b1));
            obj.insert("g2".into(), json!(p.g2));
            obj.insert("b2".into(), json!(p.b2));
        }
        self.sections.lines.push(Value::Object(obj));
    }

    fn finish(self) -> Value {
        let s = self.sections;
        json!({
            "substations": s.substations,
            "buses": s.buses,
            "loads": s.loads,
            "generators": s.generators,
            "transformers": s.transformers,
            "lines": s.lines,
            "switches": s.switches,
            "danglingLines": s.dangling_lines,
            "usagePointLocations": s.usage_point_locations,
            "usagePoints": s.usage_points,
            "meters": s.meters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importers::import_dir;
    use alchemy_core::{ElementInfo, LineParams, LineShape, Location, NetworkType};
    use std::path::Path;

    fn config(system: &str) -> JsonExporterConfig {
        JsonExporterConfig {
            output_file: PathBuf::from("unused.json"),
            context: "urn:grid:".into(),
            system: system.into(),
            transliterate: false,
        }
    }

    fn small_topology() -> Topology {
        let mut topo = Topology::new("MV1", "MV", "scada");
        let root = topo.root();
        let ss = topo
            .add_substation(
                root,
                ElementInfo::new("SS 1", "Main").with_location(Some(Location::new(45.0, 7.0))),
            )
            .unwrap();
        let vl = topo
            .add_voltage_level(root, ElementInfo::new("VL20", "VL20"), 20.0, NetworkType::Mv)
            .unwrap();
        let b1 = topo.add_bus(ss, ElementInfo::new("B1", "B1"), vl).unwrap();
        let b2 = topo.add_bus(root, ElementInfo::new("B2", "B2"), vl).unwrap();
        let shape = LineShape(vec![Location::new(45.0, 7.0), Location::new(45.1, 7.1)]);
        topo.add_line(
            root,
            ElementInfo::new("L1", "Line").with_shape(Some(shape)),
            b1,
            b2,
            LineParams {
                r: 0.5,
                x: 0.25,
                current_limit: 0.0,
                ..LineParams::default()
            },
        )
        .unwrap();
        topo
    }

    #[test]
    fn test_element_base_fields() {
        let topo = small_topology();
        let doc = network_document(&topo, topo.root(), &config("sys"));
        let ss = &doc["substations"][0];
        assert_eq!(ss["_id"], "sys_SS%201");
        assert_eq!(ss["context"], "urn:grid:substation#sys_SS%201");
        assert_eq!(ss["mRID"], "SS 1");
        assert_eq!(ss["shape"], "CT");
        assert_eq!(ss["network"], "MV1");
        assert_eq!(ss["geometry"]["coordinates"], json!([7.0, 45.0]));
        assert_eq!(ss["voltageLevels"], json!(["VL20"]));
    }

    #[test]
    fn test_bus_and_line_fields() {
        let topo = small_topology();
        let doc = network_document(&topo, topo.root(), &config(""));
        let buses = doc["buses"].as_array().unwrap();
        assert_eq!(buses.len(), 2);
        assert_eq!(buses[0]["substation"], "SS%201");
        assert_eq!(buses[0]["nominalVoltage"], 20000.0);
        assert_eq!(buses[0]["type"], "MV");
        assert!(buses[1].get("substation").is_none());

        let line = &doc["lines"][0];
        assert_eq!(line["bus1"], "B1");
        assert_eq!(line["type"], "MV");
        assert_eq!(line["currentLimit"], Value::Null);
        assert_eq!(line["geometry"]["type"], "LineString");
        assert_eq!(
            line["geometry"]["coordinates"],
            json!([[7.0, 45.0], [7.1, 45.1]])
        );
    }

    #[test]
    fn test_document_keys() {
        let topo = small_topology();
        let doc = network_document(&topo, topo.root(), &config(""));
        let keys: Vec<&str> = doc.as_object().unwrap().keys().map(String::as_str).collect();
        for key in [
            "substations",
            "buses",
            "loads",
            "generators",
            "transformers",
            "lines",
            "switches",
            "danglingLines",
            "usagePointLocations",
            "usagePoints",
            "meters",
        ] {
            assert!(keys.contains(&key), "missing {key}");
        }
    }

    #[test]
    fn test_export_one_file_per_network() {
        let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../test_data/tabular/feeders");
        let topo = import_dir(&fixture, true).unwrap().topology;
        let dir = tempfile::tempdir().unwrap();
        let params = Params::new()
            .with("output_file", dir.path().join("topo.json").to_string_lossy().into_owned())
            .with("system", "scada");

        let outcome = JsonExporter.export_topology(&topo, &params).unwrap();
        assert!(outcome.ok);
        let ids: Vec<&str> = outcome.artifacts.iter().map(|a| a.network_id.as_str()).collect();
        assert_eq!(ids, vec!["MV1", "F1", "F2"]);
        assert_eq!(outcome.artifacts[1].path, dir.path().join("topo_F1.json"));

        let text = std::fs::read_to_string(&outcome.artifacts[1].path).unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        let feeder_bus = doc["buses"]
            .as_array()
            .unwrap()
            .iter()
            .find(|b| b["mRID"] == "F1")
            .unwrap();
        assert_eq!(feeder_bus["_id"], "scada_F1_F1");
        assert_eq!(feeder_bus["feederNumber"], "1");
        assert_eq!(feeder_bus["type"], "LV");
        let meters: Vec<&str> = doc["meters"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["mRID"].as_str().unwrap())
            .collect();
        assert_eq!(meters, vec!["M1", "M2"]);

        let root_doc: Value =
            serde_json::from_str(&std::fs::read_to_string(&outcome.artifacts[0].path).unwrap())
                .unwrap();
        let t1 = root_doc["transformers"]
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["mRID"] == "T1")
            .unwrap();
        assert_eq!(t1["ratedVoltage2"], 400.0);
        assert_eq!(t1["pandaPowerParameters"]["tap_side"], "hv");
        assert!(t1["pandaPowerParameters"].get("tap_step_degree").is_none());
    }

    #[test]
    fn test_missing_output_file() {
        let topo = small_topology();
        let err = JsonExporter
            .export_topology(&topo, &Params::new())
            .unwrap_err();
        assert!(err.to_string().contains("output_file"));
    }
}
