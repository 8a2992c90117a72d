//! Notifiers run on each exported artifact, in the order they were configured.
//!
//! String parameters may reference the network being notified: `{network}` expands
//! to its name, `{network_id}` to its id and `{params.<key>}` to another parameter.

#[cfg(feature = "http")]
pub mod api;
pub mod json_pointer;

#[cfg(feature = "http")]
pub use api::{ApiNotifier, ApiNotifierConfig};
pub use json_pointer::{JsonPointerNotifier, JsonPointerNotifierConfig};

use crate::params::Params;
use crate::plugin::NetworkView;

/// Expand network and parameter placeholders in `template`.
pub fn expand_placeholders(template: &str, view: &NetworkView<'_>, params: &Params) -> String {
    let mut out = template
        .replace("{network_id}", view.id())
        .replace("{network}", view.name());
    if out.contains("{params.") {
        for (key, value) in params.iter() {
            out = out.replace(&format!("{{params.{key}}}"), value);
        }
    }
    out
}
