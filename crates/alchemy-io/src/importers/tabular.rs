use super::resolver::{generator_params, FeederResolver};
use super::sheet::{normalize_id, Row, Sheet, Workbook};
use super::{record_rejected, record_row_error, ImportResult};
use crate::params::{ParamSpec, Params};
use crate::plugin::Importer;
use alchemy_core::{
    Diagnostics, ElementInfo, EntityId, LineParams, LoadParams, NetworkType, ThreeWindingsParams,
    Topology, TransformerParams,
};
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PARAMETERS: &[ParamSpec] = &[
    ParamSpec::required("input_dir", "Directory holding one <SHEET>.csv file per sheet"),
    ParamSpec::optional("process_lv", "false", "Also build the LV feeders"),
    ParamSpec::optional(
        "network_id",
        "",
        "MV network to import (default: first row with EXTERNAL = 0)",
    ),
    ParamSpec::optional("lv_network_id", "", "Only build this feeder (default: all)"),
    ParamSpec::optional("system", "", "Source system recorded on the root network"),
];

/// Settings for [`TabularImporter`], validated once from [`Params`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularImporterConfig {
    pub input_dir: PathBuf,
    pub process_lv: bool,
    pub network_id: Option<String>,
    pub lv_network_id: Option<String>,
    pub system: String,
}

impl TabularImporterConfig {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            process_lv: false,
            network_id: None,
            lv_network_id: None,
            system: String::new(),
        }
    }

    pub fn from_params(params: &Params) -> Result<Self> {
        let params = params.resolve(PARAMETERS)?;
        Ok(Self {
            input_dir: PathBuf::from(params.require("input_dir")?),
            process_lv: params.flag("process_lv")?,
            network_id: params.non_empty("network_id").map(normalize_id),
            lv_network_id: params.non_empty("lv_network_id").map(normalize_id),
            system: params.get("system").unwrap_or_default().to_string(),
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TabularImporter;

impl Importer for TabularImporter {
    fn name(&self) -> &'static str {
        "TabularImporter"
    }

    fn required_parameters(&self) -> &'static [ParamSpec] {
        PARAMETERS
    }

    fn import_topology(&self, params: &Params) -> Result<Topology> {
        let config = TabularImporterConfig::from_params(params)?;
        let result = import_workbook(&config)?;
        if !result.diagnostics.issues.is_empty() {
            warn!(
                warnings = result.diagnostics.warning_count(),
                errors = result.diagnostics.error_count(),
                "import finished with skipped rows"
            );
        }
        Ok(result.topology)
    }
}

/// Build a topology from the sheets under `config.input_dir`.
pub fn import_workbook(config: &TabularImporterConfig) -> Result<ImportResult> {
    info!(dir = %config.input_dir.display(), "starting tabular import");
    let book = Workbook::open(&config.input_dir)?;
    let mut diagnostics = Diagnostics::new();

    let networks = book.require("NETWORKS")?;
    let mut topology = select_network(&networks, config)?;
    let mut mv = MvBuilder {
        topology: &mut topology,
        network_filter: config.network_id.as_deref(),
        diagnostics: &mut diagnostics,
    };

    mv.apply(&book.sheet("SUBSTATIONS")?, MvBuilder::substation);
    mv.apply(&book.sheet("BUSES")?, MvBuilder::bus);
    mv.apply(&networks, MvBuilder::external_network);
    mv.apply(&book.sheet("TRANSFORMERS")?, MvBuilder::transformer);
    mv.apply(&book.sheet("TRI-TRANSFORMERS")?, MvBuilder::three_windings_transformer);
    mv.apply(&book.sheet("LOADS")?, MvBuilder::load);
    mv.apply(&book.sheet("GENERATORS")?, MvBuilder::generator);
    mv.apply(&book.sheet("SWITCHES")?, MvBuilder::switch);
    mv.apply(&book.sheet("LINES")?, MvBuilder::line);

    if config.process_lv {
        let mut lv = FeederResolver::new(
            &mut topology,
            config.lv_network_id.as_deref(),
            &mut diagnostics,
        );
        lv.apply(&book.sheet("LINESEGMENTS")?, FeederResolver::line_segment);
        lv.apply(&book.sheet("PROTECTIONS")?, FeederResolver::protection);
        lv.apply(
            &book.sheet("USAGEPOINTLOCATIONS")?,
            FeederResolver::usage_point_location,
        );
        lv.apply(&book.sheet("USAGEPOINTS")?, FeederResolver::usage_point);
        lv.apply(&book.sheet("DERS")?, FeederResolver::der);
        lv.apply(&book.sheet("METERS")?, FeederResolver::meter);
    }

    info!(
        network = topology.get(topology.root()).id(),
        feeders = topology.sub_topologies(topology.root()).len(),
        entities = topology.len(),
        "tabular import finished"
    );
    Ok(ImportResult {
        topology,
        diagnostics,
    })
}

/// Convenience wrapper used by tests and tools: import a directory with defaults.
pub fn import_dir(dir: &Path, process_lv: bool) -> Result<ImportResult> {
    let mut config = TabularImporterConfig::new(dir);
    config.process_lv = process_lv;
    import_workbook(&config)
}

fn select_network(sheet: &Sheet, config: &TabularImporterConfig) -> Result<Topology> {
    for row in sheet.rows() {
        let id = row.required_id("ID")?;
        let selected = match config.network_id.as_deref() {
            Some(wanted) => id == wanted,
            None => row.id("EXTERNAL").as_deref() == Some("0"),
        };
        if selected {
            let name = row.text("NAME").unwrap_or(&id);
            debug!(network = id.as_str(), "network selected");
            return Ok(Topology::new(id.as_str(), name, config.system.as_str()));
        }
    }
    Err(anyhow!("no network defined in {}", sheet.name()))
}

/// Row handlers for the MV sheets. Everything lands in the root network.
struct MvBuilder<'a> {
    topology: &'a mut Topology,
    network_filter: Option<&'a str>,
    diagnostics: &'a mut Diagnostics,
}

impl MvBuilder<'_> {
    fn apply(&mut self, sheet: &Sheet, handler: fn(&mut Self, &Row<'_>) -> Result<()>) {
        record_rejected(&mut *self.diagnostics, "import", sheet);
        for row in sheet.rows() {
            if let Err(err) = handler(self, &row) {
                record_row_error(&mut *self.diagnostics, "import", &row, &err);
            }
        }
    }

    fn root(&self) -> EntityId {
        self.topology.root()
    }

    fn find_bus(&self, row: &Row<'_>, column: &str) -> Result<EntityId> {
        let id = row.required_id(column)?;
        self.topology
            .bus(self.root(), &id)
            .ok_or_else(|| anyhow!("bus '{id}' not found in BUSES"))
    }

    fn info(row: &Row<'_>) -> Result<ElementInfo> {
        let id = row.required_id("ID")?;
        let name = row.text("NAME").unwrap_or(&id).to_string();
        Ok(ElementInfo::new(id, name).with_location(row.location()))
    }

    fn substation(&mut self, row: &Row<'_>) -> Result<()> {
        if let Some(wanted) = self.network_filter {
            if row.id("NETWORK").as_deref() != Some(wanted) {
                return Ok(());
            }
        }
        let root = self.root();
        self.topology.add_substation(root, Self::info(row)?)?;
        Ok(())
    }

    fn bus(&mut self, row: &Row<'_>) -> Result<()> {
        let root = self.root();
        let Some(substation) = row
            .id("SUBSTATION")
            .and_then(|id| self.topology.substation(root, &id))
        else {
            // substations of other networks are filtered out above
            debug!(line = row.line(), "bus outside the selected network skipped");
            return Ok(());
        };
        let u = row.required("U")?;
        let nominal_v: f64 = u
            .parse()
            .with_context(|| format!("invalid nominal voltage '{u}'"))?;
        let vl_id = format!("VL{}", normalize_id(u));
        let voltage_level = self.topology.add_voltage_level(
            root,
            ElementInfo::new(vl_id.as_str(), vl_id.as_str()),
            nominal_v,
            NetworkType::Mv,
        )?;
        self.topology
            .add_bus(substation, Self::info(row)?, voltage_level)?;
        Ok(())
    }

    /// EXTERNAL = 1 rows mark the buses where neighbouring networks connect.
    fn external_network(&mut self, row: &Row<'_>) -> Result<()> {
        if row.id("EXTERNAL").as_deref() != Some("1") {
            return Ok(());
        }
        let bus = self.find_bus(row, "BUS")?;
        let line_type = match row.text("TYPE") {
            Some(text) => text.parse::<NetworkType>().map_err(|err| anyhow!(err))?,
            None => NetworkType::Mv,
        };
        let info = Self::info(row)?;
        self.topology
            .add_dangling_line(bus, ElementInfo::new(info.id, info.name), line_type, true)?;
        Ok(())
    }

    fn transformer(&mut self, row: &Row<'_>) -> Result<()> {
        let bus1 = self.find_bus(row, "BUS1")?;
        let bus2 = self.find_bus(row, "BUS2")?;
        let substation = self.shared_substation(&[bus1, bus2])?;
        let params = TransformerParams {
            r: row.number_or_zero("R"),
            x: row.number_or_zero("X"),
            g: row.number_or_zero("G"),
            b: row.number_or_zero("B"),
            nominal: row.number_or_zero("NOMINALPOWER"),
            i0_percent: row.number("i0_percent"),
            pfe_kw: row.number("pfe_kw"),
            shift_degree: row.number("shift_degree"),
            std_type: row.text("std_type").map(String::from),
            tap_max: row.number("tap_max"),
            tap_min: row.number("tap_min"),
            tap_neutral: row.number("tap_neutral"),
            tap_pos: row.number("tap_pos"),
            tap_side: row.text("tap_side").map(String::from),
            tap_step_degree: row.number("tap_step_degree"),
            tap_step_percent: row.number("tap_step_percent"),
            vk_percent: row.number("vk_percent"),
            vkr_percent: row.number("vkr_percent"),
        };
        self.topology
            .add_two_windings_transformer(substation, Self::info(row)?, bus1, bus2, params)?;
        Ok(())
    }

    fn three_windings_transformer(&mut self, row: &Row<'_>) -> Result<()> {
        let buses = [
            self.find_bus(row, "BUS1")?,
            self.find_bus(row, "BUS2")?,
            self.find_bus(row, "BUS3")?,
        ];
        let substation = self.shared_substation(&buses)?;
        let per_winding = |prefix: &str| {
            [1, 2, 3].map(|n| row.number_or_zero(&format!("{prefix}{n}")))
        };
        let params = ThreeWindingsParams {
            r: per_winding("R"),
            x: per_winding("X"),
            g: per_winding("G"),
            b: per_winding("B"),
            rated_s: per_winding("RATEDS"),
            rated_star: row.number_or_zero("RATEDUSTAR"),
        };
        self.topology
            .add_three_windings_transformer(substation, Self::info(row)?, buses, params)?;
        Ok(())
    }

    /// Transformers live in a substation, so all their buses must share one.
    fn shared_substation(&self, buses: &[EntityId]) -> Result<EntityId> {
        let owners: Vec<Option<EntityId>> = buses
            .iter()
            .map(|bus| self.topology.substation_of_bus(*bus))
            .collect();
        match owners.first().copied().flatten() {
            Some(substation) if owners.iter().all(|other| *other == Some(substation)) => {
                Ok(substation)
            }
            _ => Err(anyhow!("transformer connecting buses in different substations")),
        }
    }

    fn load(&mut self, row: &Row<'_>) -> Result<()> {
        let bus = self.find_bus(row, "BUS")?;
        let params = LoadParams {
            p: row.number_or_zero("P"),
            q: row.number_or_zero("Q"),
            load_type: row.text("TYPE").map(String::from),
        };
        self.topology.add_load(bus, Self::info(row)?, params)?;
        Ok(())
    }

    fn generator(&mut self, row: &Row<'_>) -> Result<()> {
        let bus = self.find_bus(row, "BUS")?;
        self.topology
            .add_mv_generator(bus, Self::info(row)?, generator_params(row))?;
        Ok(())
    }

    fn switch(&mut self, row: &Row<'_>) -> Result<()> {
        let bus1 = self.find_bus(row, "BUS1")?;
        let bus2 = self.find_bus(row, "BUS2")?;
        let open = row.flag("OPEN").unwrap_or(false);
        let root = self.root();
        self.topology
            .add_switch(root, Self::info(row)?, bus1, bus2, open)?;
        Ok(())
    }

    fn line(&mut self, row: &Row<'_>) -> Result<()> {
        let bus1 = self.find_bus(row, "BUS1")?;
        let bus2 = self.find_bus(row, "BUS2")?;
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
        let info = Self::info(row)?.with_shape(row.shape_from("COORDS"));
        let root = self.root();
        self.topology.add_line(root, info, bus1, bus2, params)?;
        Ok(())
    }
}
