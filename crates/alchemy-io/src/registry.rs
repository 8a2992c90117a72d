//! Name lookup for the built-in plugins.

use crate::exporters::{CytoscapeJsExporter, JsonExporter};
use crate::importers::TabularImporter;
#[cfg(feature = "http")]
use crate::notifiers::ApiNotifier;
use crate::notifiers::JsonPointerNotifier;
use crate::plugin::{Exporter, Importer, Notifier};

type Factory<T> = fn() -> Box<T>;

/// Explicit table of plugin factories, keyed by plugin name.
pub struct PluginRegistry {
    importers: Vec<(&'static str, Factory<dyn Importer>)>,
    exporters: Vec<(&'static str, Factory<dyn Exporter>)>,
    notifiers: Vec<(&'static str, Factory<dyn Notifier>)>,
}

impl PluginRegistry {
    /// Empty registry, for callers that bring their own plugins.
    pub fn new() -> Self {
        Self {
            importers: Vec::new(),
            exporters: Vec::new(),
            notifiers: Vec::new(),
        }
    }

    /// Every plugin shipped with this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register_importer("TabularImporter", || Box::new(TabularImporter));
        registry.register_exporter("JsonExporter", || Box::new(JsonExporter));
        registry.register_exporter("CytoscapeJsExporter", || Box::new(CytoscapeJsExporter));
        #[cfg(feature = "http")]
        registry.register_notifier("ApiNotifier", || Box::new(ApiNotifier));
        registry.register_notifier("JsonPointerNotifier", || Box::new(JsonPointerNotifier));
        registry
    }

    pub fn register_importer(&mut self, name: &'static str, factory: Factory<dyn Importer>) {
        self.importers.push((name, factory));
    }

    pub fn register_exporter(&mut self, name: &'static str, factory: Factory<dyn Exporter>) {
        self.exporters.push((name, factory));
    }

    pub fn register_notifier(&mut self, name: &'static str, factory: Factory<dyn Notifier>) {
        self.notifiers.push((name, factory));
    }

    pub fn importer(&self, name: &str) -> Option<Box<dyn Importer>> {
        lookup(&self.importers, name)
    }

    pub fn exporter(&self, name: &str) -> Option<Box<dyn Exporter>> {
        lookup(&self.exporters, name)
    }

    pub fn notifier(&self, name: &str) -> Option<Box<dyn Notifier>> {
        lookup(&self.notifiers, name)
    }

    pub fn importer_names(&self) -> Vec<&'static str> {
        self.importers.iter().map(|(name, _)| *name).collect()
    }

    pub fn exporter_names(&self) -> Vec<&'static str> {
        self.exporters.iter().map(|(name, _)| *name).collect()
    }

    pub fn notifier_names(&self) -> Vec<&'static str> {
        self.notifiers.iter().map(|(name, _)| *name).collect()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn lookup<T: ?Sized>(table: &[(&'static str, Factory<T>)], name: &str) -> Option<Box<T>> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, factory)| factory())
}
