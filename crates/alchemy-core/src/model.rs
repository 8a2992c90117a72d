//! Entity catalogue: the per-kind payloads stored in the topology arena.
//!
//! Every entity shares the identity fields held by [`crate::Entity`]; what differs
//! between a bus and a transformer lives in an [`EntityKind`] variant. Cross references
//! (a line's endpoints, a bus's voltage level) are [`EntityId`] handles into the same
//! arena.

use crate::EntityId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Voltage class of a network, voltage level, line or dangling line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkType {
    /// Medium-voltage backbone
    #[serde(rename = "MV")]
    Mv,
    /// Low-voltage feeder
    #[serde(rename = "LV")]
    Lv,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Mv => "MV",
            NetworkType::Lv => "LV",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MV" => Ok(NetworkType::Mv),
            "LV" => Ok(NetworkType::Lv),
            other => Err(format!("unknown network type '{other}'")),
        }
    }
}

/// Geographic point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Ordered polyline describing the route of a line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineShape(pub Vec<Location>);

impl LineShape {
    pub fn points(&self) -> &[Location] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkData {
    pub system: String,
    pub network_type: NetworkType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoltageLevelData {
    /// Nominal voltage in kV
    pub nominal_v: f64,
    pub level_type: NetworkType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusData {
    pub voltage_level: EntityId,
}

/// Electrical parameters of a line. Missing values default to zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineParams {
    pub r: f64,
    pub x: f64,
    pub g1: f64,
    pub b1: f64,
    pub g2: f64,
    pub b2: f64,
    /// Thermal limit in amperes; zero or negative means unknown
    pub current_limit: f64,
    /// Length in meters
    pub length: f64,
    pub cable: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineData {
    pub bus1: EntityId,
    pub bus2: EntityId,
    pub line_type: NetworkType,
    pub params: LineParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchData {
    pub bus1: EntityId,
    pub bus2: EntityId,
    pub open: bool,
    pub retained: bool,
}

/// Two-winding transformer parameters, including the pandapower tap model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformerParams {
    pub r: f64,
    pub x: f64,
    pub g: f64,
    pub b: f64,
    /// Rated power in kVA
    pub nominal: f64,
    pub i0_percent: Option<f64>,
    pub pfe_kw: Option<f64>,
    pub shift_degree: Option<f64>,
    pub std_type: Option<String>,
    pub tap_max: Option<f64>,
    pub tap_min: Option<f64>,
    pub tap_neutral: Option<f64>,
    pub tap_pos: Option<f64>,
    pub tap_side: Option<String>,
    pub tap_step_degree: Option<f64>,
    pub tap_step_percent: Option<f64>,
    pub vk_percent: Option<f64>,
    pub vkr_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformerData {
    pub bus1: EntityId,
    pub bus2: EntityId,
    pub params: TransformerParams,
}

/// Per-winding values are indexed 0..3 for windings 1..3.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreeWindingsParams {
    pub r: [f64; 3],
    pub x: [f64; 3],
    pub g: [f64; 3],
    pub b: [f64; 3],
    pub rated_s: [f64; 3],
    pub rated_star: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreeWindingsData {
    pub buses: [EntityId; 3],
    pub params: ThreeWindingsParams,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadParams {
    pub p: f64,
    pub q: f64,
    pub load_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratorParams {
    pub min_p: Option<f64>,
    pub max_p: Option<f64>,
    pub target_p: Option<f64>,
    pub target_v: Option<f64>,
    pub target_q: Option<f64>,
    pub min_q: Option<f64>,
    pub max_q: Option<f64>,
    pub controllable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LvGeneratorData {
    pub usage_point_location: EntityId,
    pub params: GeneratorParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DanglingLineData {
    pub line_type: NetworkType,
    pub p: f64,
    pub q: f64,
    pub controllable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsagePointData {
    pub usage_point_location: EntityId,
    pub rated_power: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterData {
    pub p: Option<f64>,
    pub q: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShuntParams {
    pub max_section_count: u32,
    pub b_per_section: f64,
    pub g_per_section: f64,
}

/// Kind-specific payload of an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Network(NetworkData),
    Substation,
    VoltageLevel(VoltageLevelData),
    Bus(BusData),
    Line(LineData),
    Switch(SwitchData),
    TwoWindingsTransformer(TransformerData),
    ThreeWindingsTransformer(ThreeWindingsData),
    Load(LoadParams),
    MvGenerator(GeneratorParams),
    Generator(LvGeneratorData),
    DanglingLine(DanglingLineData),
    UsagePointLocation,
    UsagePoint(UsagePointData),
    Meter(MeterData),
    ShuntCompensator(ShuntParams),
}

impl EntityKind {
    /// Type name used in logs, errors and exported documents.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Network(_) => "Network",
            EntityKind::Substation => "Substation",
            EntityKind::VoltageLevel(_) => "VoltageLevel",
            EntityKind::Bus(_) => "Bus",
            EntityKind::Line(_) => "Line",
            EntityKind::Switch(_) => "Switch",
            EntityKind::TwoWindingsTransformer(_) => "TwoWindingsTransformer",
            EntityKind::ThreeWindingsTransformer(_) => "ThreeWindingsTransformer",
            EntityKind::Load(_) => "Load",
            EntityKind::MvGenerator(_) => "MvGenerator",
            EntityKind::Generator(_) => "Generator",
            EntityKind::DanglingLine(_) => "DanglingLine",
            EntityKind::UsagePointLocation => "UsagePointLocation",
            EntityKind::UsagePoint(_) => "UsagePoint",
            EntityKind::Meter(_) => "Meter",
            EntityKind::ShuntCompensator(_) => "ShuntCompensator",
        }
    }

    /// Buses an edge-like element connects, empty for everything else.
    pub fn terminals(&self) -> Vec<EntityId> {
        match self {
            EntityKind::Line(line) => vec![line.bus1, line.bus2],
            EntityKind::Switch(switch) => vec![switch.bus1, switch.bus2],
            EntityKind::TwoWindingsTransformer(tx) => vec![tx.bus1, tx.bus2],
            EntityKind::ThreeWindingsTransformer(tx) => tx.buses.to_vec(),
            _ => Vec::new(),
        }
    }
}
