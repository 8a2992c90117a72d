//! Typed builders and lookups for the distribution-network entity catalogue.
//!
//! These sit on top of the kernel primitives and enforce the structural rules:
//! lines and switches never loop onto one bus and never join two voltage levels,
//! ids are unique per slot, and the idempotent builders (voltage levels,
//! substations, sub-topologies, buses, dangling lines) return the existing element
//! when asked twice.

use crate::error::TopologyError;
use crate::kernel::{ElementInfo, Entity, EntityId, Slot, Topology};
use crate::model::{
    BusData, DanglingLineData, EntityKind, GeneratorParams, LineData, LineParams, LoadParams,
    LvGeneratorData, MeterData, NetworkData, NetworkType, ShuntParams, SwitchData,
    ThreeWindingsData, ThreeWindingsParams, TransformerData, TransformerParams, UsagePointData,
    VoltageLevelData,
};

type TopologyResult<T> = Result<T, TopologyError>;

impl Topology {
    fn ensure_kind(
        &self,
        id: EntityId,
        expected: &'static str,
        accept: fn(&EntityKind) -> bool,
    ) -> TopologyResult<()> {
        let entity = self.get(id);
        if accept(entity.kind()) {
            Ok(())
        } else {
            Err(TopologyError::WrongKind {
                id: entity.id().to_string(),
                expected,
                actual: entity.kind().label(),
            })
        }
    }

    fn insert_unique(
        &mut self,
        parent: EntityId,
        slot: Slot,
        entity: Entity,
    ) -> TopologyResult<EntityId> {
        if self.element(parent, slot, entity.id()).is_some() {
            return Err(TopologyError::DuplicateId {
                container: self.get(parent).id().to_string(),
                slot: slot.as_str(),
                id: entity.id().to_string(),
            });
        }
        Ok(self.add_element(parent, slot, entity))
    }

    // =========================================================================
    // Networks
    // =========================================================================

    /// Create (or return) the LV sub-network `id` under `network`.
    ///
    /// The child inherits the parent's `system` and uses its own id as prefix.
    pub fn add_sub_topology(
        &mut self,
        network: EntityId,
        id: &str,
        name: &str,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(network, "network", is_network)?;
        if let Some(existing) = self.sub_topology(network, id) {
            return Ok(existing);
        }
        let system = self.system(network).to_string();
        let entity = Entity::new(
            ElementInfo::new(id, name),
            EntityKind::Network(NetworkData {
                system,
                network_type: NetworkType::Lv,
            }),
        )
        .with_prefix(id);
        Ok(self.add_element(network, Slot::SubTopologies, entity))
    }

    pub fn sub_topology(&self, network: EntityId, id: &str) -> Option<EntityId> {
        self.element(network, Slot::SubTopologies, id)
    }

    pub fn sub_topologies(&self, network: EntityId) -> &[EntityId] {
        self.elements(network, Slot::SubTopologies)
    }

    /// Root network followed by every sub-topology, depth first in creation order.
    pub fn networks(&self) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(network) = stack.pop() {
            out.push(network);
            stack.extend(self.sub_topologies(network).iter().rev().copied());
        }
        out
    }

    /// The root network when its id matches, else the root's sub-topology with that id.
    pub fn find_network(&self, id: &str) -> Option<EntityId> {
        let root = self.root();
        if self.get(root).id() == id {
            Some(root)
        } else {
            self.sub_topology(root, id)
        }
    }

    /// Nearest enclosing network (the entity itself when it is one).
    pub fn network_of(&self, id: EntityId) -> EntityId {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|handle| is_network(self.get(*handle).kind()))
            .unwrap_or_else(|| self.root())
    }

    /// MV for the root network, LV for sub-topologies.
    pub fn network_type(&self, network: EntityId) -> NetworkType {
        match self.get(self.network_of(network)).kind() {
            EntityKind::Network(data) => data.network_type,
            _ => NetworkType::Mv,
        }
    }

    pub fn system(&self, id: EntityId) -> &str {
        match self.get(self.network_of(id)).kind() {
            EntityKind::Network(data) => &data.system,
            _ => "",
        }
    }

    // =========================================================================
    // Substations, voltage levels and buses
    // =========================================================================

    pub fn add_substation(
        &mut self,
        network: EntityId,
        info: ElementInfo,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(network, "network", is_network)?;
        if let Some(existing) = self.substation(network, &info.id) {
            return Ok(existing);
        }
        Ok(self.add_element(
            network,
            Slot::Substations,
            Entity::new(info, EntityKind::Substation),
        ))
    }

    pub fn substation(&self, network: EntityId, id: &str) -> Option<EntityId> {
        self.element(network, Slot::Substations, id)
    }

    pub fn add_voltage_level(
        &mut self,
        network: EntityId,
        info: ElementInfo,
        nominal_v: f64,
        level_type: NetworkType,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(network, "network", is_network)?;
        if let Some(existing) = self.voltage_level(network, &info.id) {
            return Ok(existing);
        }
        let kind = EntityKind::VoltageLevel(VoltageLevelData {
            nominal_v,
            level_type,
        });
        Ok(self.add_element(network, Slot::VoltageLevels, Entity::new(info, kind)))
    }

    pub fn voltage_level(&self, network: EntityId, id: &str) -> Option<EntityId> {
        self.element(network, Slot::VoltageLevels, id)
    }

    /// Create a bus in a substation or directly in a network.
    ///
    /// The bus takes the voltage level's resolved prefix and is indexed in the voltage
    /// level's `buses` slot. Asking twice for the same id in the same container returns
    /// the first bus.
    pub fn add_bus(
        &mut self,
        container: EntityId,
        info: ElementInfo,
        voltage_level: EntityId,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(container, "substation or network", is_bus_container)?;
        self.ensure_kind(voltage_level, "voltage level", |k| {
            matches!(k, EntityKind::VoltageLevel(_))
        })?;
        if let Some(existing) = self.element(container, Slot::Buses, &info.id) {
            return Ok(existing);
        }
        let prefix = self.prefix(voltage_level).to_string();
        let entity =
            Entity::new(info, EntityKind::Bus(BusData { voltage_level })).with_prefix(prefix);
        let bus = self.add_element(container, Slot::Buses, entity);
        self.link(voltage_level, Slot::Buses, bus);
        Ok(bus)
    }

    /// Find a bus by id: substations are searched first, then the network's own buses.
    pub fn bus(&self, network: EntityId, id: &str) -> Option<EntityId> {
        self.elements(network, Slot::Substations)
            .iter()
            .find_map(|ss| self.element(*ss, Slot::Buses, id))
            .or_else(|| self.element(network, Slot::Buses, id))
    }

    /// Every bus of a network: substation buses first, then network-level buses.
    pub fn buses(&self, network: EntityId) -> Vec<EntityId> {
        let mut out: Vec<EntityId> = self
            .elements(network, Slot::Substations)
            .iter()
            .flat_map(|ss| self.elements(*ss, Slot::Buses).iter().copied())
            .collect();
        out.extend_from_slice(self.elements(network, Slot::Buses));
        out
    }

    pub fn bus_voltage_level(&self, bus: EntityId) -> Option<EntityId> {
        match self.get(bus).kind() {
            EntityKind::Bus(data) => Some(data.voltage_level),
            _ => None,
        }
    }

    /// Substation owning `bus`, if the bus is not network-level.
    pub fn substation_of_bus(&self, bus: EntityId) -> Option<EntityId> {
        self.parent(bus)
            .filter(|parent| matches!(self.get(*parent).kind(), EntityKind::Substation))
    }

    // =========================================================================
    // Branches
    // =========================================================================

    fn check_endpoints(
        &self,
        kind: &'static str,
        id: &str,
        bus1: EntityId,
        bus2: EntityId,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(bus1, "bus", is_bus)?;
        self.ensure_kind(bus2, "bus", is_bus)?;
        if bus1 == bus2 {
            return Err(TopologyError::SelfLoop {
                kind,
                id: id.to_string(),
                bus: self.get(bus1).id().to_string(),
            });
        }
        let vl1 = self.bus_voltage_level(bus1);
        let vl2 = self.bus_voltage_level(bus2);
        match (vl1, vl2) {
            (Some(left), Some(right)) if left == right => Ok(left),
            (left, right) => Err(TopologyError::VoltageLevelMismatch {
                kind,
                id: id.to_string(),
                left: left.map(|v| self.get(v).id().to_string()).unwrap_or_default(),
                right: right.map(|v| self.get(v).id().to_string()).unwrap_or_default(),
            }),
        }
    }

    pub fn add_line(
        &mut self,
        container: EntityId,
        info: ElementInfo,
        bus1: EntityId,
        bus2: EntityId,
        params: LineParams,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(container, "substation or network", is_bus_container)?;
        let voltage_level = self.check_endpoints("line", &info.id, bus1, bus2)?;
        let line_type = match self.get(voltage_level).kind() {
            EntityKind::VoltageLevel(vl) => vl.level_type,
            _ => self.network_type(container),
        };
        let kind = EntityKind::Line(LineData {
            bus1,
            bus2,
            line_type,
            params,
        });
        self.insert_unique(container, Slot::Lines, Entity::new(info, kind))
    }

    pub fn add_switch(
        &mut self,
        container: EntityId,
        info: ElementInfo,
        bus1: EntityId,
        bus2: EntityId,
        open: bool,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(container, "substation or network", is_bus_container)?;
        self.check_endpoints("switch", &info.id, bus1, bus2)?;
        let kind = EntityKind::Switch(SwitchData {
            bus1,
            bus2,
            open,
            retained: false,
        });
        self.insert_unique(container, Slot::Switches, Entity::new(info, kind))
    }

    pub fn add_two_windings_transformer(
        &mut self,
        substation: EntityId,
        info: ElementInfo,
        bus1: EntityId,
        bus2: EntityId,
        params: TransformerParams,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(substation, "substation", is_substation)?;
        self.ensure_kind(bus1, "bus", is_bus)?;
        self.ensure_kind(bus2, "bus", is_bus)?;
        if bus1 == bus2 {
            return Err(TopologyError::SelfLoop {
                kind: "transformer",
                id: info.id,
                bus: self.get(bus1).id().to_string(),
            });
        }
        let kind = EntityKind::TwoWindingsTransformer(TransformerData { bus1, bus2, params });
        self.insert_unique(
            substation,
            Slot::TwoWindingsTransformers,
            Entity::new(info, kind),
        )
    }

    pub fn add_three_windings_transformer(
        &mut self,
        substation: EntityId,
        info: ElementInfo,
        buses: [EntityId; 3],
        params: ThreeWindingsParams,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(substation, "substation", is_substation)?;
        for bus in buses {
            self.ensure_kind(bus, "bus", is_bus)?;
        }
        let kind = EntityKind::ThreeWindingsTransformer(ThreeWindingsData { buses, params });
        self.insert_unique(
            substation,
            Slot::ThreeWindingsTransformers,
            Entity::new(info, kind),
        )
    }

    // =========================================================================
    // Bus attachments
    // =========================================================================

    pub fn add_load(
        &mut self,
        bus: EntityId,
        info: ElementInfo,
        params: LoadParams,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(bus, "bus", is_bus)?;
        self.insert_unique(bus, Slot::Loads, Entity::new(info, EntityKind::Load(params)))
    }

    pub fn add_mv_generator(
        &mut self,
        bus: EntityId,
        info: ElementInfo,
        params: GeneratorParams,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(bus, "bus", is_bus)?;
        self.insert_unique(
            bus,
            Slot::Generators,
            Entity::new(info, EntityKind::MvGenerator(params)),
        )
    }

    /// LV generator (DER) on `bus`, also indexed in its usage point location.
    pub fn add_generator(
        &mut self,
        bus: EntityId,
        info: ElementInfo,
        usage_point_location: EntityId,
        params: GeneratorParams,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(bus, "bus", is_bus)?;
        self.ensure_kind(usage_point_location, "usage point location", |k| {
            matches!(k, EntityKind::UsagePointLocation)
        })?;
        let kind = EntityKind::Generator(LvGeneratorData {
            usage_point_location,
            params,
        });
        let generator = self.insert_unique(bus, Slot::Generators, Entity::new(info, kind))?;
        self.link(usage_point_location, Slot::Generators, generator);
        Ok(generator)
    }

    /// Boundary marker on `bus`. The stored id is `{bus id}_{info.id}`; a second call
    /// with the same id returns the existing line.
    pub fn add_dangling_line(
        &mut self,
        bus: EntityId,
        mut info: ElementInfo,
        line_type: NetworkType,
        controllable: bool,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(bus, "bus", is_bus)?;
        info.id = format!("{}_{}", self.get(bus).id(), info.id);
        if let Some(existing) = self.element(bus, Slot::DanglingLines, &info.id) {
            return Ok(existing);
        }
        let kind = EntityKind::DanglingLine(DanglingLineData {
            line_type,
            p: 0.0,
            q: 0.0,
            controllable,
        });
        Ok(self.add_element(bus, Slot::DanglingLines, Entity::new(info, kind)))
    }

    pub fn add_usage_point_location(
        &mut self,
        bus: EntityId,
        info: ElementInfo,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(bus, "bus", is_bus)?;
        self.insert_unique(
            bus,
            Slot::UsagePointLocations,
            Entity::new(info, EntityKind::UsagePointLocation),
        )
    }

    /// Usage point on `bus`, also indexed in its usage point location.
    pub fn add_usage_point(
        &mut self,
        bus: EntityId,
        info: ElementInfo,
        usage_point_location: EntityId,
        rated_power: Option<f64>,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(bus, "bus", is_bus)?;
        self.ensure_kind(usage_point_location, "usage point location", |k| {
            matches!(k, EntityKind::UsagePointLocation)
        })?;
        let kind = EntityKind::UsagePoint(UsagePointData {
            usage_point_location,
            rated_power,
        });
        let usage_point = self.insert_unique(bus, Slot::UsagePoints, Entity::new(info, kind))?;
        self.link(usage_point_location, Slot::UsagePoints, usage_point);
        Ok(usage_point)
    }

    /// Meter on a usage point, load or generator.
    pub fn add_meter(
        &mut self,
        owner: EntityId,
        info: ElementInfo,
        reading: MeterData,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(owner, "usage point, load or generator", |k| {
            matches!(
                k,
                EntityKind::UsagePoint(_)
                    | EntityKind::Load(_)
                    | EntityKind::MvGenerator(_)
                    | EntityKind::Generator(_)
            )
        })?;
        self.insert_unique(owner, Slot::Meters, Entity::new(info, EntityKind::Meter(reading)))
    }

    pub fn add_shunt_compensator(
        &mut self,
        bus: EntityId,
        info: ElementInfo,
        params: ShuntParams,
    ) -> TopologyResult<EntityId> {
        self.ensure_kind(bus, "bus", is_bus)?;
        self.insert_unique(
            bus,
            Slot::ShuntCompensators,
            Entity::new(info, EntityKind::ShuntCompensator(params)),
        )
    }

    // =========================================================================
    // Network-wide lookups
    // =========================================================================

    fn find_on_buses(&self, network: EntityId, slot: Slot, id: &str) -> Option<EntityId> {
        self.buses(network)
            .into_iter()
            .find_map(|bus| self.element(bus, slot, id))
    }

    pub fn load(&self, network: EntityId, id: &str) -> Option<EntityId> {
        self.find_on_buses(network, Slot::Loads, id)
    }

    /// Any generator (MV or LV) attached to a bus of `network`.
    pub fn generator(&self, network: EntityId, id: &str) -> Option<EntityId> {
        self.find_on_buses(network, Slot::Generators, id)
    }

    pub fn usage_point_location(&self, network: EntityId, id: &str) -> Option<EntityId> {
        self.find_on_buses(network, Slot::UsagePointLocations, id)
    }

    pub fn usage_point(&self, network: EntityId, id: &str) -> Option<EntityId> {
        self.find_on_buses(network, Slot::UsagePoints, id)
    }

    /// Every element owned by `network` (substation contents included) in `slot`.
    pub fn collect(&self, network: EntityId, slot: Slot) -> Vec<EntityId> {
        let mut out: Vec<EntityId> = self
            .elements(network, Slot::Substations)
            .iter()
            .flat_map(|ss| self.elements(*ss, slot).iter().copied())
            .collect();
        out.extend_from_slice(self.elements(network, slot));
        out
    }

    /// Every element of `slot` attached to a bus of `network`.
    pub fn collect_on_buses(&self, network: EntityId, slot: Slot) -> Vec<EntityId> {
        self.buses(network)
            .into_iter()
            .flat_map(|bus| self.elements(bus, slot).iter().copied())
            .collect()
    }

    // =========================================================================
    // Scalar updates
    // =========================================================================

    pub fn set_switch_open(&mut self, switch: EntityId, open: bool) -> TopologyResult<()> {
        self.ensure_kind(switch, "switch", |k| matches!(k, EntityKind::Switch(_)))?;
        if let EntityKind::Switch(data) = self.get_mut(switch).kind_mut() {
            data.open = open;
        }
        Ok(())
    }

    pub fn set_meter_reading(&mut self, meter: EntityId, reading: MeterData) -> TopologyResult<()> {
        self.ensure_kind(meter, "meter", |k| matches!(k, EntityKind::Meter(_)))?;
        if let EntityKind::Meter(data) = self.get_mut(meter).kind_mut() {
            *data = reading;
        }
        Ok(())
    }
}

fn is_network(kind: &EntityKind) -> bool {
    matches!(kind, EntityKind::Network(_))
}

fn is_substation(kind: &EntityKind) -> bool {
    matches!(kind, EntityKind::Substation)
}

fn is_bus(kind: &EntityKind) -> bool {
    matches!(kind, EntityKind::Bus(_))
}

fn is_bus_container(kind: &EntityKind) -> bool {
    matches!(kind, EntityKind::Network(_) | EntityKind::Substation)
}
