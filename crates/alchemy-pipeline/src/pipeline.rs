//! Import → export → notify orchestration.
//!
//! A run walks `Idle → Importing → Exporting → Notifying → Done`. Any failure moves
//! it to `Failed` and stops all remaining work; artifacts already written stay on
//! disk. Every stage works on its own copy of the caller's parameters, checked
//! against the plugins' declared parameters before the stage starts. The whole
//! notifier chain is checked before its first notifier runs.

use crate::error::PipelineError;
use alchemy_core::Topology;
use alchemy_io::{
    Artifact, Exporter, Importer, NetworkView, Notifier, ParamError, Params, Payload,
};
use anyhow::anyhow;
use serde_json::Value;
use std::fs;
use tracing::{error, info};

/// Parameter holding the JSON array of per-notifier parameter objects.
pub const NOTIFIER_PARAMS: &str = "notifier_params";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Importing,
    Exporting,
    Notifying,
    Done,
    Failed,
}

#[derive(Debug)]
pub struct Pipeline {
    state: PipelineState,
    last_error: Option<PipelineError>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            last_error: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Failure of the most recent run, if it failed.
    pub fn last_error(&self) -> Option<&PipelineError> {
        self.last_error.as_ref()
    }

    /// Run one conversion. Returns `true` when every stage and every notifier
    /// succeeded; on `false` the cause is logged and kept in [`Pipeline::last_error`].
    pub fn process(
        &mut self,
        importer: &dyn Importer,
        exporter: &dyn Exporter,
        notifiers: &[Box<dyn Notifier>],
        params: &Params,
    ) -> bool {
        self.state = PipelineState::Idle;
        self.last_error = None;
        match self.run(importer, exporter, notifiers, params) {
            Ok(()) => {
                self.state = PipelineState::Done;
                info!("pipeline completed successfully");
                true
            }
            Err(err) => {
                error!("pipeline failed: {err}");
                self.state = PipelineState::Failed;
                self.last_error = Some(err);
                false
            }
        }
    }

    fn run(
        &mut self,
        importer: &dyn Importer,
        exporter: &dyn Exporter,
        notifiers: &[Box<dyn Notifier>],
        params: &Params,
    ) -> Result<(), PipelineError> {
        self.state = PipelineState::Importing;
        let import_params = params.resolve(importer.required_parameters())?;
        info!("running importer {}", importer.name());
        let mut topology = importer
            .import_topology(&import_params)
            .map_err(|source| PipelineError::ImportFailure {
                importer: importer.name(),
                source,
            })?;

        self.state = PipelineState::Exporting;
        let export_params = params.resolve(exporter.required_parameters())?;
        info!("running exporter {}", exporter.name());
        let outcome = exporter
            .export_topology(&topology, &export_params)
            .map_err(|source| PipelineError::ExportFailure {
                exporter: exporter.name(),
                source,
            })?;
        if !outcome.ok {
            return Err(PipelineError::ExportFailure {
                exporter: exporter.name(),
                source: anyhow!("exporter reported failure"),
            });
        }

        self.state = PipelineState::Notifying;
        let notify_params = chain_params(notifiers, params)?;
        for artifact in &outcome.artifacts {
            notify_artifact(&mut topology, artifact, notifiers, &notify_params)?;
        }
        Ok(())
    }
}

/// Validated parameters for every notifier of the chain, before any of them runs.
///
/// Notifier `i` sees `base` without `notifier_params`, overlaid by element `i` of that
/// array, with its declared defaults filled in.
fn chain_params(
    notifiers: &[Box<dyn Notifier>],
    base: &Params,
) -> Result<Vec<Params>, PipelineError> {
    let per_notifier = notifier_params(base)?;
    let mut shared = base.clone();
    shared.remove(NOTIFIER_PARAMS);
    notifiers
        .iter()
        .enumerate()
        .map(|(index, notifier)| {
            let merged = match per_notifier.get(index) {
                Some(own) => shared.merged(own),
                None => shared.clone(),
            };
            merged
                .resolve(notifier.required_parameters())
                .map_err(PipelineError::from)
        })
        .collect()
}

/// Read one artifact and thread its contents through the notifier chain.
fn notify_artifact(
    topology: &mut Topology,
    artifact: &Artifact,
    notifiers: &[Box<dyn Notifier>],
    notify_params: &[Params],
) -> Result<(), PipelineError> {
    info!(
        "processing exported file for network '{}': {}",
        artifact.network_id,
        artifact.path.display()
    );
    let text = fs::read_to_string(&artifact.path).map_err(|source| PipelineError::ArtifactRead {
        path: artifact.path.clone(),
        source,
    })?;
    let network = topology
        .find_network(&artifact.network_id)
        .ok_or_else(|| PipelineError::UnknownNetwork(artifact.network_id.clone()))?;

    let mut payload = Payload::parse(text.clone());
    for (notifier, params) in notifiers.iter().zip(notify_params) {
        info!("running notifier {}", notifier.name());
        let mut params = params.clone();
        params.insert("orig_path", artifact.path.to_string_lossy());
        params.insert("orig_data", text.as_str());

        let failure = |source: anyhow::Error| PipelineError::NotifierFailure {
            notifier: notifier.name(),
            network: artifact.network_id.clone(),
            source,
        };
        let view = NetworkView::new(topology, network);
        let outcome = notifier.notify(view, payload, &params).map_err(failure)?;
        if !outcome.ok {
            return Err(failure(anyhow!(
                "notifier reported failure: {}",
                outcome.payload.to_text()
            )));
        }
        payload = outcome.payload;
    }
    Ok(())
}

/// Per-notifier parameters from the `notifier_params` JSON array.
///
/// Element `i` belongs to notifier `i`. String values are taken verbatim; any other
/// JSON value is stored encoded. A missing parameter yields an empty list.
pub fn notifier_params(params: &Params) -> Result<Vec<Params>, ParamError> {
    let Some(raw) = params.non_empty(NOTIFIER_PARAMS) else {
        return Ok(Vec::new());
    };
    let invalid = |reason: String| ParamError::Invalid {
        key: NOTIFIER_PARAMS.to_string(),
        value: raw.to_string(),
        reason,
    };
    let value: Value = serde_json::from_str(raw).map_err(|err| invalid(err.to_string()))?;
    let Value::Array(entries) = value else {
        return Err(invalid("expected a JSON array".to_string()));
    };
    entries
        .into_iter()
        .map(|entry| match entry {
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(key, value)| match value {
                    Value::String(text) => (key, text),
                    other => (key, other.to_string()),
                })
                .collect::<Params>()),
            Value::Null => Ok(Params::new()),
            other => Err(invalid(format!("expected an object, found {other}"))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alchemy_io::{ExportOutcome, NotifyOutcome, ParamSpec};
    use anyhow::{bail, Result};
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::path::PathBuf;
    use std::rc::Rc;

    const NEEDS_SOURCE: &[ParamSpec] = &[ParamSpec::required("source", "where to read from")];
    const NEEDS_TARGET: &[ParamSpec] = &[ParamSpec::required("target", "where to write to")];
    const NEEDS_ENDPOINT: &[ParamSpec] = &[
        ParamSpec::required("endpoint", "where to send"),
        ParamSpec::optional("retries", "1", "attempts"),
    ];

    #[derive(Default)]
    struct StubImporter {
        fail: bool,
        required: &'static [ParamSpec],
    }

    impl Importer for StubImporter {
        fn name(&self) -> &'static str {
            "StubImporter"
        }

        fn required_parameters(&self) -> &'static [ParamSpec] {
            self.required
        }

        fn import_topology(&self, _params: &Params) -> Result<Topology> {
            if self.fail {
                bail!("source unreachable");
            }
            let mut topo = Topology::new("MV1", "Backbone", "sys");
            let root = topo.root();
            topo.add_sub_topology(root, "F1", "Feeder 1")?;
            Ok(topo)
        }
    }

    /// Writes `{"network": id}` for each listed network into `dir`.
    struct StubExporter {
        dir: PathBuf,
        networks: Vec<&'static str>,
        ok: bool,
        required: &'static [ParamSpec],
    }

    impl Exporter for StubExporter {
        fn name(&self) -> &'static str {
            "StubExporter"
        }

        fn required_parameters(&self) -> &'static [ParamSpec] {
            self.required
        }

        fn export_topology(
            &self,
            _topology: &Topology,
            _params: &Params,
        ) -> Result<ExportOutcome> {
            if !self.ok {
                return Ok(ExportOutcome::failure());
            }
            let mut artifacts = Vec::new();
            for id in &self.networks {
                let path = self.dir.join(format!("out_{id}.json"));
                fs::write(&path, json!({"network": id}).to_string())?;
                artifacts.push(Artifact {
                    network_id: id.to_string(),
                    path,
                });
            }
            Ok(ExportOutcome::success(artifacts))
        }
    }

    #[derive(Default)]
    struct Record {
        calls: Cell<usize>,
        params: RefCell<Vec<Params>>,
        networks: RefCell<Vec<String>>,
    }

    /// Records every call and appends its tag to the payload's `seen` array.
    struct RecordingNotifier {
        tag: &'static str,
        fail: bool,
        required: &'static [ParamSpec],
        record: Rc<Record>,
    }

    impl Notifier for RecordingNotifier {
        fn name(&self) -> &'static str {
            "RecordingNotifier"
        }

        fn required_parameters(&self) -> &'static [ParamSpec] {
            self.required
        }

        fn notify(
            &self,
            view: NetworkView<'_>,
            payload: Payload,
            params: &Params,
        ) -> Result<NotifyOutcome> {
            self.record.calls.set(self.record.calls.get() + 1);
            self.record.params.borrow_mut().push(params.clone());
            self.record.networks.borrow_mut().push(view.id().to_string());
            if self.fail {
                return Ok(NotifyOutcome::failure(payload));
            }
            let mut value = payload.as_json().cloned().unwrap_or(Value::Null);
            let seen = value
                .as_object_mut()
                .map(|obj| obj.entry("seen").or_insert_with(|| json!([])));
            if let Some(Value::Array(items)) = seen {
                items.push(json!(self.tag));
            }
            Ok(NotifyOutcome::success(Payload::Json(value)))
        }
    }

    fn recording(tag: &'static str, fail: bool) -> (Box<dyn Notifier>, Rc<Record>) {
        recording_with(tag, fail, &[])
    }

    fn recording_with(
        tag: &'static str,
        fail: bool,
        required: &'static [ParamSpec],
    ) -> (Box<dyn Notifier>, Rc<Record>) {
        let record = Rc::new(Record::default());
        let notifier = RecordingNotifier {
            tag,
            fail,
            required,
            record: Rc::clone(&record),
        };
        (Box::new(notifier), record)
    }

    fn exporter(dir: &tempfile::TempDir, networks: Vec<&'static str>) -> StubExporter {
        StubExporter {
            dir: dir.path().to_path_buf(),
            networks,
            ok: true,
            required: &[],
        }
    }

    #[test]
    fn test_successful_run_threads_payload() {
        let dir = tempfile::tempdir().unwrap();
        let (first, first_record) = recording("first", false);
        let (second, second_record) = recording("second", false);
        let notifiers = vec![first, second];
        let params = Params::new()
            .with("system", "sys")
            .with(NOTIFIER_PARAMS, r#"[{"pointer": "/a", "retries": 3}]"#);

        let mut pipeline = Pipeline::new();
        let ok = pipeline.process(
            &StubImporter::default(),
            &exporter(&dir, vec!["MV1", "F1"]),
            &notifiers,
            &params,
        );

        assert!(ok);
        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(first_record.calls.get(), 2);
        assert_eq!(*first_record.networks.borrow(), vec!["MV1", "F1"]);

        let first_params = &first_record.params.borrow()[0];
        assert_eq!(first_params.get("pointer"), Some("/a"));
        assert_eq!(first_params.get("retries"), Some("3"));
        assert_eq!(first_params.get("system"), Some("sys"));
        assert!(first_params.get(NOTIFIER_PARAMS).is_none());
        assert_eq!(first_params.get("orig_data"), Some(r#"{"network":"MV1"}"#));
        assert!(first_params.get("orig_path").unwrap().ends_with("out_MV1.json"));

        let second_params = &second_record.params.borrow()[0];
        assert!(second_params.get("pointer").is_none());
        assert_eq!(second_record.calls.get(), 2);
    }

    #[test]
    fn test_export_failure_skips_notifiers() {
        let dir = tempfile::tempdir().unwrap();
        let (only, record) = recording("only", false);
        let notifiers = vec![only];
        let failing = StubExporter {
            ok: false,
            ..exporter(&dir, vec!["MV1"])
        };

        let mut pipeline = Pipeline::new();
        let ok = pipeline.process(
            &StubImporter::default(),
            &failing,
            &notifiers,
            &Params::new(),
        );

        assert!(!ok);
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(matches!(
            pipeline.last_error(),
            Some(PipelineError::ExportFailure { .. })
        ));
        assert_eq!(record.calls.get(), 0);
    }

    #[test]
    fn test_import_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new();
        let ok = pipeline.process(
            &StubImporter {
                fail: true,
                ..StubImporter::default()
            },
            &exporter(&dir, vec!["MV1"]),
            &[],
            &Params::new(),
        );
        assert!(!ok);
        match pipeline.last_error() {
            Some(PipelineError::ImportFailure { importer, source }) => {
                assert_eq!(*importer, "StubImporter");
                assert!(source.to_string().contains("unreachable"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_first_notifier_failure_stops_everything() {
        let dir = tempfile::tempdir().unwrap();
        let (failing, failing_record) = recording("failing", true);
        let (after, after_record) = recording("after", false);
        let notifiers = vec![failing, after];

        let mut pipeline = Pipeline::new();
        let ok = pipeline.process(
            &StubImporter::default(),
            &exporter(&dir, vec!["MV1", "F1"]),
            &notifiers,
            &Params::new(),
        );

        assert!(!ok);
        assert_eq!(failing_record.calls.get(), 1);
        assert_eq!(after_record.calls.get(), 0);
        assert!(matches!(
            pipeline.last_error(),
            Some(PipelineError::NotifierFailure { network, .. }) if network == "MV1"
        ));
        assert!(dir.path().join("out_F1.json").exists());
    }

    #[test]
    fn test_unknown_network() {
        let dir = tempfile::tempdir().unwrap();
        let (only, _record) = recording("only", false);
        let notifiers = vec![only];
        let mut pipeline = Pipeline::new();
        let ok = pipeline.process(
            &StubImporter::default(),
            &exporter(&dir, vec!["F9"]),
            &notifiers,
            &Params::new(),
        );
        assert!(!ok);
        assert!(matches!(
            pipeline.last_error(),
            Some(PipelineError::UnknownNetwork(id)) if id == "F9"
        ));
    }

    #[test]
    fn test_missing_artifact() {
        struct Phantom;

        impl Exporter for Phantom {
            fn name(&self) -> &'static str {
                "Phantom"
            }

            fn required_parameters(&self) -> &'static [ParamSpec] {
                &[]
            }

            fn export_topology(&self, _: &Topology, _: &Params) -> Result<ExportOutcome> {
                Ok(ExportOutcome::success(vec![Artifact {
                    network_id: "MV1".into(),
                    path: PathBuf::from("/nonexistent/out_MV1.json"),
                }]))
            }
        }

        let mut pipeline = Pipeline::new();
        assert!(!pipeline.process(&StubImporter::default(), &Phantom, &[], &Params::new()));
        assert!(matches!(
            pipeline.last_error(),
            Some(PipelineError::ArtifactRead { .. })
        ));
    }

    fn missing_keys(pipeline: &Pipeline) -> Vec<String> {
        match pipeline.last_error() {
            Some(PipelineError::Parameters(ParamError::Missing(keys))) => keys.clone(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_importer_parameter_rejects_import() {
        let dir = tempfile::tempdir().unwrap();
        let (only, record) = recording("only", false);
        let notifiers = vec![only];
        let importer = StubImporter {
            required: NEEDS_SOURCE,
            ..StubImporter::default()
        };

        let mut pipeline = Pipeline::new();
        assert!(!pipeline.process(
            &importer,
            &exporter(&dir, vec!["MV1"]),
            &notifiers,
            &Params::new()
        ));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert_eq!(missing_keys(&pipeline), vec!["source"]);
        assert!(!dir.path().join("out_MV1.json").exists());
        assert_eq!(record.calls.get(), 0);
    }

    #[test]
    fn test_missing_exporter_parameter_rejects_export() {
        let dir = tempfile::tempdir().unwrap();
        let needy = StubExporter {
            required: NEEDS_TARGET,
            ..exporter(&dir, vec!["MV1"])
        };

        let mut pipeline = Pipeline::new();
        assert!(!pipeline.process(&StubImporter::default(), &needy, &[], &Params::new()));
        assert_eq!(missing_keys(&pipeline), vec!["target"]);
        assert!(!dir.path().join("out_MV1.json").exists());

        let params = Params::new().with("target", "anywhere");
        assert!(pipeline.process(&StubImporter::default(), &needy, &[], &params));
    }

    #[test]
    fn test_missing_notifier_parameter_rejects_whole_chain() {
        let dir = tempfile::tempdir().unwrap();
        let (first, first_record) = recording("first", false);
        let (second, second_record) = recording_with("second", false, NEEDS_ENDPOINT);
        let notifiers = vec![first, second];

        let mut pipeline = Pipeline::new();
        let ok = pipeline.process(
            &StubImporter::default(),
            &exporter(&dir, vec!["MV1", "F1"]),
            &notifiers,
            &Params::new(),
        );

        assert!(!ok);
        assert_eq!(missing_keys(&pipeline), vec!["endpoint"]);
        assert_eq!(first_record.calls.get(), 0);
        assert_eq!(second_record.calls.get(), 0);
    }

    #[test]
    fn test_notifier_defaults_filled_from_own_element() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _) = recording("first", false);
        let (second, second_record) = recording_with("second", false, NEEDS_ENDPOINT);
        let notifiers = vec![first, second];
        let params = Params::new().with(NOTIFIER_PARAMS, r#"[null, {"endpoint": "/hook"}]"#);

        let mut pipeline = Pipeline::new();
        assert!(pipeline.process(
            &StubImporter::default(),
            &exporter(&dir, vec!["MV1"]),
            &notifiers,
            &params,
        ));
        let seen = &second_record.params.borrow()[0];
        assert_eq!(seen.get("endpoint"), Some("/hook"));
        assert_eq!(seen.get("retries"), Some("1"));
    }

    #[test]
    fn test_notifier_params_parsing() {
        let params =
            Params::new().with(NOTIFIER_PARAMS, r#"[{"a": "x", "b": true}, null, {}]"#);
        let parsed = notifier_params(&params).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].get("a"), Some("x"));
        assert_eq!(parsed[0].get("b"), Some("true"));
        assert!(parsed[1].is_empty());

        assert!(notifier_params(&Params::new()).unwrap().is_empty());
        assert!(notifier_params(&Params::new().with(NOTIFIER_PARAMS, "{}")).is_err());
        assert!(notifier_params(&Params::new().with(NOTIFIER_PARAMS, "[1]")).is_err());
    }
}
