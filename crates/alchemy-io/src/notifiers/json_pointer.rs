//! Rewrites one value of a JSON payload, addressed by an RFC 6901 pointer.

use super::expand_placeholders;
use crate::params::{ParamSpec, Params};
use crate::plugin::{NetworkView, Notifier, NotifyOutcome, Payload};
use anyhow::Result;
use serde_json::Value;
use tracing::{error, warn};

const PARAMETERS: &[ParamSpec] = &[
    ParamSpec::required("pointer", "RFC 6901 pointer to the value to replace"),
    ParamSpec::required(
        "replacement_value",
        "New value; inserted as JSON when it parses, otherwise as a string",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPointerNotifierConfig {
    pub pointer: String,
    pub replacement_value: String,
}

impl JsonPointerNotifierConfig {
    /// Validate `params` and expand placeholders for the network in `view`.
    pub fn from_params(params: &Params, view: &NetworkView<'_>) -> Result<Self> {
        let params = params.resolve(PARAMETERS)?;
        Ok(Self {
            pointer: expand_placeholders(params.require("pointer")?, view, &params),
            replacement_value: expand_placeholders(
                params.require("replacement_value")?,
                view,
                &params,
            ),
        })
    }

    fn replacement(&self) -> Value {
        serde_json::from_str(&self.replacement_value)
            .unwrap_or_else(|_| Value::String(self.replacement_value.clone()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPointerNotifier;

impl Notifier for JsonPointerNotifier {
    fn name(&self) -> &'static str {
        "JsonPointerNotifier"
    }

    fn required_parameters(&self) -> &'static [ParamSpec] {
        PARAMETERS
    }

    fn notify(
        &self,
        view: NetworkView<'_>,
        payload: Payload,
        params: &Params,
    ) -> Result<NotifyOutcome> {
        let config = JsonPointerNotifierConfig::from_params(params, &view)?;
        let mut document = match payload {
            Payload::Json(value) => value,
            Payload::Text(text) => {
                error!(
                    network = view.id(),
                    "payload is not JSON, cannot apply {}", config.pointer
                );
                return Ok(NotifyOutcome::failure(Payload::Text(text)));
            }
        };
        if !replace_at(&mut document, &config.pointer, config.replacement()) {
            warn!(
                network = view.id(),
                pointer = config.pointer.as_str(),
                "pointer matched nothing"
            );
        }
        Ok(NotifyOutcome::success(Payload::Json(document)))
    }
}

/// Replace the value at `pointer`, or add it when only the last segment is missing
/// from an object. Returns whether the document changed.
fn replace_at(document: &mut Value, pointer: &str, replacement: Value) -> bool {
    if let Some(target) = document.pointer_mut(pointer) {
        *target = replacement;
        return true;
    }
    let Some((parent, last)) = pointer.rsplit_once('/') else {
        return false;
    };
    let key = last.replace("~1", "/").replace("~0", "~");
    match document.pointer_mut(parent) {
        Some(Value::Object(map)) => {
            map.insert(key, replacement);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alchemy_core::Topology;
    use serde_json::json;

    fn run(payload: Payload, pointer: &str, value: &str) -> NotifyOutcome {
        let mut topo = Topology::new("F1", "Feeder", "sys");
        let root = topo.root();
        let params = Params::new()
            .with("pointer", pointer)
            .with("replacement_value", value);
        JsonPointerNotifier
            .notify(NetworkView::new(&mut topo, root), payload, &params)
            .unwrap()
    }

    #[test]
    fn test_replaces_with_json_value() {
        let payload = Payload::Json(json!({"buses": [{"name": "B1"}], "count": 1}));
        let outcome = run(payload, "/count", "5");
        assert!(outcome.ok);
        assert_eq!(outcome.payload, Payload::Json(json!({"buses": [{"name": "B1"}], "count": 5})));
    }

    #[test]
    fn test_replaces_with_string_and_placeholder() {
        let payload = Payload::Json(json!({"buses": [{"name": "B1"}]}));
        let outcome = run(payload, "/buses/0/name", "bus of {network_id}");
        assert_eq!(outcome.payload.as_json().unwrap()["buses"][0]["name"], "bus of F1");
    }

    #[test]
    fn test_inserts_missing_key() {
        let outcome = run(Payload::Json(json!({"meta": {}})), "/meta/source", "\"scada\"");
        assert_eq!(outcome.payload, Payload::Json(json!({"meta": {"source": "scada"}})));
    }

    #[test]
    fn test_unmatched_pointer_leaves_payload() {
        let outcome = run(Payload::Json(json!({"a": 1})), "/x/y", "2");
        assert!(outcome.ok);
        assert_eq!(outcome.payload, Payload::Json(json!({"a": 1})));
    }

    #[test]
    fn test_text_payload_fails() {
        let outcome = run(Payload::Text("<xml/>".into()), "/a", "1");
        assert!(!outcome.ok);
        assert_eq!(outcome.payload, Payload::Text("<xml/>".into()));
    }

    #[test]
    fn test_missing_parameters() {
        let mut topo = Topology::new("F1", "Feeder", "sys");
        let root = topo.root();
        let err = JsonPointerNotifier
            .notify(NetworkView::new(&mut topo, root), Payload::Json(json!({})), &Params::new())
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("pointer"));
        assert!(message.contains("replacement_value"));
    }
}
