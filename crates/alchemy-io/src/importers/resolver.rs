//! Cross-network resolution of LV feeder rows against the MV backbone.
//!
//! Feeders are discovered lazily: the first line segment naming a feeder mirrors the
//! MV substation and voltage level into a new LV sub-network, creates the feeder bus
//! and joins it to the MV bus with a pair of dangling lines. Protection switches whose
//! far end lives in another network never become cross-network edges; they end on a
//! fictitious local bus and the boundary is marked with dangling lines on both sides.

use super::{record_rejected, record_row_error};
use super::sheet::{Row, Sheet};
use alchemy_core::{
    Diagnostics, ElementInfo, EntityId, EntityKind, GeneratorParams, LineParams, MeterData,
    NetworkType, Topology,
};
use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};

pub struct FeederResolver<'a> {
    topology: &'a mut Topology,
    mv: EntityId,
    only_feeder: Option<&'a str>,
    diagnostics: &'a mut Diagnostics,
}

/// Where the far end of a protection switch was found.
enum Remote {
    Feeder(EntityId),
    Backbone(EntityId),
    Missing,
}

impl<'a> FeederResolver<'a> {
    pub fn new(
        topology: &'a mut Topology,
        only_feeder: Option<&'a str>,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        let mv = topology.root();
        Self {
            topology,
            mv,
            only_feeder,
            diagnostics,
        }
    }

    /// Run `handler` over every row of `sheet`; a failing row is recorded and skipped.
    pub fn apply(&mut self, sheet: &Sheet, handler: fn(&mut Self, &Row<'_>) -> Result<()>) {
        record_rejected(&mut *self.diagnostics, "resolution", sheet);
        for row in sheet.rows() {
            if let Err(err) = handler(self, &row) {
                record_row_error(&mut *self.diagnostics, "resolution", &row, &err);
            }
        }
    }

    fn skip_feeder(&self, feeder: &str) -> bool {
        self.only_feeder.is_some_and(|only| only != feeder)
    }

    fn feeder_num(row: &Row<'_>) -> Option<String> {
        row.id("FEEDER_NUM")
    }

    fn feeder_network(&mut self, row: &Row<'_>, feeder: &str) -> Option<EntityId> {
        let found = self.topology.sub_topology(self.mv, feeder);
        if found.is_none() {
            debug!(feeder, line = row.line(), "feeder has no line segments, row skipped");
            self.diagnostics.add_warning_with_entity(
                "reference",
                &format!("line {}: feeder not built from LINESEGMENTS", row.line()),
                feeder,
            );
        }
        found
    }

    /// Sub-network and feeder bus for `feeder`, building both on first use.
    fn ensure_feeder(
        &mut self,
        feeder: &str,
        feeder_num: Option<&str>,
    ) -> Result<(EntityId, EntityId)> {
        let topo = &mut *self.topology;
        let mv = self.mv;
        let mv_bus = topo
            .bus(mv, feeder)
            .ok_or_else(|| anyhow!("bus '{feeder}' not found in MV network"))?;
        let lv = topo.add_sub_topology(mv, feeder, feeder)?;

        let feeder_bus = match topo.bus(lv, feeder) {
            Some(bus) => bus,
            None => {
                let mv_substation = topo
                    .substation_of_bus(mv_bus)
                    .ok_or_else(|| anyhow!("substation not found for bus '{feeder}'"))?;
                let ss = topo.get(mv_substation);
                let ss_info = ElementInfo::new(ss.id(), ss.name()).with_location(ss.location());
                let substation = topo.add_substation(lv, ss_info)?;

                let mv_vl = topo
                    .bus_voltage_level(mv_bus)
                    .ok_or_else(|| anyhow!("bus '{feeder}' has no voltage level"))?;
                let (vl_id, vl_name, nominal_v) = {
                    let vl = topo.get(mv_vl);
                    let nominal = match vl.kind() {
                        EntityKind::VoltageLevel(data) => data.nominal_v,
                        _ => 0.0,
                    };
                    (vl.id().to_string(), vl.name().to_string(), nominal)
                };
                let voltage_level = topo.add_voltage_level(
                    lv,
                    ElementInfo::new(vl_id, vl_name),
                    nominal_v,
                    NetworkType::Lv,
                )?;
                let bus = topo.add_bus(
                    substation,
                    ElementInfo::new(feeder, feeder).with_feeder_num(feeder_num.map(String::from)),
                    voltage_level,
                )?;
                let (mv_id, mv_name) = {
                    let net = topo.get(mv);
                    (net.id().to_string(), net.name().to_string())
                };
                topo.add_dangling_line(
                    bus,
                    ElementInfo::new(mv_id, mv_name).with_feeder_num(feeder_num.map(String::from)),
                    NetworkType::Mv,
                    false,
                )?;
                debug!(feeder, "feeder sub-network created");
                bus
            }
        };

        let given_id = match feeder_num {
            Some(num) => format!("{}_{}", topo.get(mv_bus).id(), num),
            None => topo.get(mv_bus).id().to_string(),
        };
        let lv_name = topo.get(lv).name().to_string();
        topo.add_dangling_line(
            mv_bus,
            ElementInfo::new(given_id, lv_name).with_feeder_num(feeder_num.map(String::from)),
            NetworkType::Lv,
            false,
        )?;
        Ok((lv, feeder_bus))
    }

    /// Bus `id` of `network`, created there with `voltage_level` when absent.
    fn local_bus(
        &mut self,
        network: EntityId,
        id: &str,
        voltage_level: EntityId,
        feeder_num: Option<&str>,
    ) -> Result<EntityId> {
        if let Some(bus) = self.topology.bus(network, id) {
            return Ok(bus);
        }
        let info = ElementInfo::new(id, id).with_feeder_num(feeder_num.map(String::from));
        Ok(self.topology.add_bus(network, info, voltage_level)?)
    }

    fn voltage_level_of(&self, bus: EntityId) -> Result<EntityId> {
        self.topology
            .bus_voltage_level(bus)
            .ok_or_else(|| anyhow!("'{}' is not a bus", self.topology.get(bus).id()))
    }

    /// LINESEGMENTS row: feeder bootstrap, endpoint buses, then the line itself.
    pub fn line_segment(&mut self, row: &Row<'_>) -> Result<()> {
        let feeder = row.required_id("FEEDER")?;
        if self.skip_feeder(&feeder) {
            return Ok(());
        }
        let feeder_num = Self::feeder_num(row);
        let (lv, feeder_bus) = self.ensure_feeder(&feeder, feeder_num.as_deref())?;
        let voltage_level = self.voltage_level_of(feeder_bus)?;

        let node1 = row.required_id("NODE1")?;
        let node2 = row.required_id("NODE2")?;
        let bus1 = self.local_bus(lv, &node1, voltage_level, feeder_num.as_deref())?;
        let bus2 = self.local_bus(lv, &node2, voltage_level, feeder_num.as_deref())?;

        let id = row.required_id("ID")?;
        let info = ElementInfo::new(id.as_str(), row.text("NAME").unwrap_or(&id))
            .with_shape(row.shape_from("COORDS"))
            .with_feeder_num(feeder_num);
        let params = LineParams {
            r: row.number_or_zero("R"),
            x: row.number_or_zero("X"),
            g1: row.number_or_zero("G1"),
            b1: row.number_or_zero("B1"),
            g2: row.number_or_zero("G2"),
            b2: row.number_or_zero("B2"),
            current_limit: row.number_or_zero("CURRENTLIMIT"),
            length: row.number_or_zero("LENGTH"),
            cable: row.text("WIREINFO").map(String::from),
        };
        self.topology
            .add_line(lv, info, bus1, bus2, params)
            .with_context(|| format!("line segment '{id}' of feeder '{feeder}'"))?;
        Ok(())
    }

    /// Look for `node` outside feeder `lv`: other feeders first, then the backbone.
    fn find_remote(&self, lv: EntityId, node: &str) -> Remote {
        let in_feeder = self
            .topology
            .sub_topologies(self.mv)
            .iter()
            .filter(|net| **net != lv)
            .find_map(|net| self.topology.bus(*net, node));
        if let Some(bus) = in_feeder {
            return Remote::Feeder(bus);
        }
        match self.topology.bus(self.mv, node) {
            Some(bus) => Remote::Backbone(bus),
            None => Remote::Missing,
        }
    }

    /// PROTECTIONS row: a switch inside the feeder, with boundary handling when one
    /// endpoint is not local.
    pub fn protection(&mut self, row: &Row<'_>) -> Result<()> {
        let feeder = row.required_id("FEEDER")?;
        if self.skip_feeder(&feeder) {
            return Ok(());
        }
        let Some(lv) = self.feeder_network(row, &feeder) else {
            return Ok(());
        };
        let feeder_num = Self::feeder_num(row);
        let node1 = row.required_id("BUS1")?;
        let node2 = row.required_id("BUS2")?;
        let id = row.required_id("ID")?;
        let info = ElementInfo::new(id.as_str(), row.text("NAME").unwrap_or(&id))
            .with_location(row.location())
            .with_feeder_num(feeder_num.clone());
        let open = row.flag("NORMALLYOPEN").unwrap_or(false);

        let bus1 = self.topology.bus(lv, &node1);
        let bus2 = self.topology.bus(lv, &node2);
        let (bus1, bus2) = match (bus1, bus2) {
            (Some(b1), Some(b2)) => (b1, b2),
            (None, None) => {
                let feeder_bus = self
                    .topology
                    .bus(lv, &feeder)
                    .ok_or_else(|| anyhow!("feeder bus '{feeder}' missing"))?;
                let vl = self.voltage_level_of(feeder_bus)?;
                self.record_synthesized(&feeder, &node1);
                self.record_synthesized(&feeder, &node2);
                let b1 = self.local_bus(lv, &node1, vl, feeder_num.as_deref())?;
                let b2 = self.local_bus(lv, &node2, vl, feeder_num.as_deref())?;
                (b1, b2)
            }
            (Some(local), None) => {
                let far = self.boundary(lv, local, &node1, &node2, feeder_num.as_deref())?;
                (local, far)
            }
            (None, Some(local)) => {
                let far = self.boundary(lv, local, &node2, &node1, feeder_num.as_deref())?;
                (far, local)
            }
        };
        self.topology
            .add_switch(lv, info, bus1, bus2, open)
            .with_context(|| format!("protection '{id}' of feeder '{feeder}'"))?;
        Ok(())
    }

    /// Resolve the non-local end of a protection and return the bus the switch should
    /// use in its place inside `lv`.
    fn boundary(
        &mut self,
        lv: EntityId,
        local: EntityId,
        local_node: &str,
        remote_node: &str,
        feeder_num: Option<&str>,
    ) -> Result<EntityId> {
        let vl = self.voltage_level_of(local)?;
        let (remote, remote_type) = match self.find_remote(lv, remote_node) {
            Remote::Feeder(bus) => (bus, NetworkType::Lv),
            Remote::Backbone(bus) => (bus, NetworkType::Mv),
            Remote::Missing => {
                let feeder = self.topology.get(lv).id().to_string();
                self.record_synthesized(&feeder, remote_node);
                return self.local_bus(lv, remote_node, vl, feeder_num);
            }
        };

        let topo = &mut *self.topology;
        let remote_net = topo.network_of(remote);
        let (lv_id, lv_name) = {
            let net = topo.get(lv);
            (net.id().to_string(), net.name().to_string())
        };
        let (remote_net_id, remote_net_name) = {
            let net = topo.get(remote_net);
            (net.id().to_string(), net.name().to_string())
        };
        let local_name = topo.get(local).name().to_string();
        let remote_name = topo.get(remote).name().to_string();

        topo.add_dangling_line(
            remote,
            ElementInfo::new(format!("{lv_id}_{local_name}"), lv_name),
            NetworkType::Lv,
            false,
        )?;
        topo.add_dangling_line(
            local,
            ElementInfo::new(format!("{remote_net_id}_{remote_name}"), remote_net_name),
            remote_type,
            false,
        )?;

        let fictitious = format!("{local_node}_{remote_node}");
        warn!(
            feeder = lv_id.as_str(),
            remote_network = remote_net_id.as_str(),
            bus = fictitious.as_str(),
            "protection crosses network boundary, fictitious bus created"
        );
        self.diagnostics.add_warning_with_entity(
            "resolution",
            &format!("boundary to network '{remote_net_id}' via fictitious bus '{fictitious}'"),
            &lv_id,
        );
        self.local_bus(lv, &fictitious, vl, feeder_num)
    }

    fn record_synthesized(&mut self, feeder: &str, node: &str) {
        if let Some(lv) = self.topology.sub_topology(self.mv, feeder) {
            if self.topology.bus(lv, node).is_some() {
                return;
            }
        }
        warn!(feeder, bus = node, "bus not found in any network, created in feeder");
        self.diagnostics.add_warning_with_entity(
            "resolution",
            &format!("bus '{node}' synthesized"),
            feeder,
        );
    }

    /// USAGEPOINTLOCATIONS row: attaches to the feeder bus sharing its id.
    pub fn usage_point_location(&mut self, row: &Row<'_>) -> Result<()> {
        let feeder = row.required_id("FEEDER")?;
        if self.skip_feeder(&feeder) {
            return Ok(());
        }
        let Some(lv) = self.feeder_network(row, &feeder) else {
            return Ok(());
        };
        let id = row.required_id("ID")?;
        let bus = self
            .topology
            .bus(lv, &id)
            .ok_or_else(|| anyhow!("node '{id}' not found in LINESEGMENTS"))?;
        let info = ElementInfo::new(id.as_str(), row.text("NAME").unwrap_or(&id))
            .with_location(row.location())
            .with_feeder_num(Self::feeder_num(row));
        self.topology.add_usage_point_location(bus, info)?;
        Ok(())
    }

    fn location_and_bus(&self, lv: EntityId, row: &Row<'_>) -> Result<(EntityId, EntityId)> {
        let upl_id = row.required_id("USAGEPOINTLOCATION")?;
        let upl = self
            .topology
            .usage_point_location(lv, &upl_id)
            .ok_or_else(|| anyhow!("usage point location '{upl_id}' not found"))?;
        let bus = self
            .topology
            .parent(upl)
            .ok_or_else(|| anyhow!("usage point location '{upl_id}' has no bus"))?;
        Ok((upl, bus))
    }

    /// USAGEPOINTS row: owned by the bus of its location, indexed in the location.
    pub fn usage_point(&mut self, row: &Row<'_>) -> Result<()> {
        let feeder = row.required_id("FEEDER")?;
        if self.skip_feeder(&feeder) {
            return Ok(());
        }
        let Some(lv) = self.feeder_network(row, &feeder) else {
            return Ok(());
        };
        let (upl, bus) = self.location_and_bus(lv, row)?;
        let id = row.required_id("ID")?;
        let info = ElementInfo::new(id.as_str(), row.text("NAME").unwrap_or(&id))
            .with_feeder_num(Self::feeder_num(row));
        self.topology
            .add_usage_point(bus, info, upl, row.number("RATEDPOWER"))?;
        Ok(())
    }

    /// DERS row: LV generator owned by the bus of its location.
    pub fn der(&mut self, row: &Row<'_>) -> Result<()> {
        let feeder = row.required_id("FEEDER")?;
        if self.skip_feeder(&feeder) {
            return Ok(());
        }
        let Some(lv) = self.feeder_network(row, &feeder) else {
            return Ok(());
        };
        let (upl, bus) = self.location_and_bus(lv, row)?;
        let id = row.required_id("ID")?;
        let info = ElementInfo::new(id.as_str(), row.text("NAME").unwrap_or(&id))
            .with_location(row.location())
            .with_feeder_num(Self::feeder_num(row));
        self.topology
            .add_generator(bus, info, upl, generator_params(row))?;
        Ok(())
    }

    /// METERS row: usage point or DER inside a feeder, or MV load or generator when
    /// the row names no imported feeder.
    pub fn meter(&mut self, row: &Row<'_>) -> Result<()> {
        let feeder = row.id("FEEDER");
        if self.only_feeder.is_some() && feeder.as_deref() != self.only_feeder {
            return Ok(());
        }
        let id = row.required_id("ID")?;
        let target = row.required_id("USAGEPOINT")?;
        let reading = MeterData {
            p: row.number("P"),
            q: row.number("Q"),
        };
        let lv = feeder
            .as_deref()
            .and_then(|f| self.topology.sub_topology(self.mv, f));
        let (owner, feeder_num) = match lv {
            Some(lv) => {
                let owner = self
                    .topology
                    .usage_point(lv, &target)
                    .or_else(|| self.topology.generator(lv, &target))
                    .ok_or_else(|| {
                        anyhow!("meter '{id}': '{target}' not found in USAGEPOINTS nor DERS")
                    })?;
                (owner, Self::feeder_num(row))
            }
            None => {
                let owner = self
                    .topology
                    .load(self.mv, &target)
                    .or_else(|| self.topology.generator(self.mv, &target))
                    .ok_or_else(|| {
                        anyhow!("meter '{id}': '{target}' not found in LOADS nor GENERATORS")
                    })?;
                (owner, None)
            }
        };
        let info = ElementInfo::new(id.as_str(), row.text("NAME").unwrap_or(&id))
            .with_feeder_num(feeder_num);
        self.topology.add_meter(owner, info, reading)?;
        Ok(())
    }
}

pub(crate) fn generator_params(row: &Row<'_>) -> GeneratorParams {
    GeneratorParams {
        min_p: row.number("MINP"),
        max_p: row.number("MAXP"),
        target_p: row.number("TARGETP"),
        target_v: row.number("TARGETV"),
        target_q: row.number("TARGETQ"),
        min_q: row.number("MINQ"),
        max_q: row.number("MAXQ"),
        controllable: row.flag("CONTROLLABLE").unwrap_or(false),
    }
}
