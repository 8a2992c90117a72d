use crate::cli::{ConvertArgs, InspectArgs};
use crate::config::resolve_params;
use alchemy_core::{export_dot, find_islands, graph_stats};
use alchemy_io::{Notifier, ParamSpec, PluginRegistry};
use alchemy_pipeline::Pipeline;
use anyhow::{anyhow, Context, Result};
use std::fs;
use tracing::info;

fn unknown(kind: &str, name: &str, available: &[&str]) -> anyhow::Error {
    anyhow!(
        "unknown {kind} '{name}' (available: {})",
        available.join(", ")
    )
}

/// Returns whether the pipeline succeeded.
pub fn convert(registry: &PluginRegistry, args: &ConvertArgs) -> Result<bool> {
    let importer = registry
        .importer(&args.input_format)
        .ok_or_else(|| unknown("importer", &args.input_format, &registry.importer_names()))?;
    let exporter = registry
        .exporter(&args.output_format)
        .ok_or_else(|| unknown("exporter", &args.output_format, &registry.exporter_names()))?;
    let notifiers = args
        .notifiers
        .iter()
        .map(|name| {
            registry
                .notifier(name)
                .ok_or_else(|| unknown("notifier", name, &registry.notifier_names()))
        })
        .collect::<Result<Vec<Box<dyn Notifier>>>>()?;
    let params = resolve_params(args.params.config.as_deref(), &args.params.params)?;

    info!(
        "converting {} -> {} with {} notifier(s)",
        importer.name(),
        exporter.name(),
        notifiers.len()
    );
    let mut pipeline = Pipeline::new();
    Ok(pipeline.process(importer.as_ref(), exporter.as_ref(), &notifiers, &params))
}

pub fn inspect(registry: &PluginRegistry, args: &InspectArgs) -> Result<()> {
    let importer = registry
        .importer(&args.input_format)
        .ok_or_else(|| unknown("importer", &args.input_format, &registry.importer_names()))?;
    let params = resolve_params(args.params.config.as_deref(), &args.params.params)?;
    let topology = importer.import_topology(&params)?;

    if let Some(dir) = &args.dot {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    for network in topology.networks() {
        let id = topology.get(network).id();
        let stats = graph_stats(&topology, network)?;
        let islands = find_islands(&topology, network)?;
        println!("Network {id} ({}):", topology.network_type(network));
        println!("  Buses         : {}", stats.node_count);
        println!("  Branches      : {}", stats.edge_count);
        println!("  Islands       : {}", islands.islands.len());
        println!(
            "  Degree [min/avg/max]: {}/{:.2}/{}",
            stats.min_degree, stats.avg_degree, stats.max_degree
        );
        if let Some(dir) = &args.dot {
            let path = dir.join(format!("{id}.dot"));
            fs::write(&path, export_dot(&topology, network)?)
                .with_context(|| format!("writing {}", path.display()))?;
            info!("wrote {}", path.display());
        }
    }
    Ok(())
}

fn describe(specs: &[ParamSpec]) {
    for spec in specs {
        match spec.default {
            None => println!("      {:<18} required  {}", spec.key, spec.description),
            Some(default) => println!(
                "      {:<18} = {:<8} {}",
                spec.key,
                format!("\"{default}\""),
                spec.description
            ),
        }
    }
}

pub fn plugins(registry: &PluginRegistry) {
    println!("Importers:");
    for name in registry.importer_names() {
        println!("  {name}");
        if let Some(importer) = registry.importer(name) {
            describe(importer.required_parameters());
        }
    }
    println!("Exporters:");
    for name in registry.exporter_names() {
        println!("  {name}");
        if let Some(exporter) = registry.exporter(name) {
            describe(exporter.required_parameters());
        }
    }
    println!("Notifiers:");
    for name in registry.notifier_names() {
        println!("  {name}");
        if let Some(notifier) = registry.notifier(name) {
            describe(notifier.required_parameters());
        }
    }
}
