//! Flat string parameter maps and their validation.
//!
//! Every plugin declares its parameters as a static list of [`ParamSpec`]s. A spec
//! with a default is filled in when absent; a spec without one must be supplied.
//! [`Params::resolve`] returns a new map and never touches the caller's copy, so one
//! set of parameters can be handed to several stages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    /// One or more parameters without a default were not supplied
    #[error("missing required parameters: {}", .0.join(", "))]
    Missing(Vec<String>),

    /// A parameter was supplied but could not be interpreted
    #[error("invalid value '{value}' for parameter '{key}': {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Declaration of a single plugin parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub key: &'static str,
    pub default: Option<&'static str>,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn required(key: &'static str, description: &'static str) -> Self {
        Self {
            key,
            default: None,
            description,
        }
    }

    pub const fn optional(
        key: &'static str,
        default: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            key,
            default: Some(default),
            description,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy of `self` with every entry of `overrides` applied on top.
    pub fn merged(&self, overrides: &Params) -> Params {
        let mut out = self.clone();
        for (key, value) in overrides.iter() {
            out.insert(key, value);
        }
        out
    }

    /// Fill in defaults for `specs`, failing with every missing required key at once.
    pub fn resolve(&self, specs: &[ParamSpec]) -> Result<Params, ParamError> {
        let mut out = self.clone();
        let mut missing = Vec::new();
        for spec in specs {
            if out.contains(spec.key) {
                continue;
            }
            match spec.default {
                Some(default) => out.insert(spec.key, default),
                None => missing.push(spec.key.to_string()),
            }
        }
        if missing.is_empty() {
            Ok(out)
        } else {
            Err(ParamError::Missing(missing))
        }
    }

    pub fn require(&self, key: &str) -> Result<&str, ParamError> {
        self.get(key)
            .ok_or_else(|| ParamError::Missing(vec![key.to_string()]))
    }

    /// Value of `key`, or `None` when absent or blank.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn flag(&self, key: &str) -> Result<bool, ParamError> {
        let value = self.require(key)?;
        parse_flag(value).ok_or_else(|| ParamError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        })
    }

    pub fn number<T>(&self, key: &str) -> Result<T, ParamError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let value = self.require(key)?;
        value.trim().parse::<T>().map_err(|err| ParamError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: err.to_string(),
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// Lenient boolean parsing shared by parameters and sheet cells.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" | "yes" | "y" | "open" => Some(true),
        "0" | "0.0" | "false" | "no" | "n" | "closed" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPECS: &[ParamSpec] = &[
        ParamSpec::required("output_file", "target"),
        ParamSpec::required("context", "context"),
        ParamSpec::optional("system", "default_system", "system"),
    ];

    #[test]
    fn test_defaults_filled() {
        let params = Params::new()
            .with("output_file", "out.json")
            .with("context", "ctx");
        let resolved = params.resolve(SPECS).unwrap();
        assert_eq!(resolved.get("system"), Some("default_system"));
        assert!(!params.contains("system"));
    }

    #[test]
    fn test_missing_lists_every_key() {
        let err = Params::new().resolve(SPECS).unwrap_err();
        assert_eq!(
            err,
            ParamError::Missing(vec!["output_file".into(), "context".into()])
        );
        assert_eq!(
            err.to_string(),
            "missing required parameters: output_file, context"
        );
    }

    #[test]
    fn test_supplied_value_wins() {
        let params = Params::new()
            .with("output_file", "a")
            .with("context", "b")
            .with("system", "scada");
        assert_eq!(params.resolve(SPECS).unwrap().get("system"), Some("scada"));
    }

    #[test]
    fn test_typed_accessors() {
        let params = Params::new()
            .with("timeout", "12")
            .with("binary", "TRUE")
            .with("bad", "maybe");
        assert_eq!(params.number::<u64>("timeout").unwrap(), 12);
        assert!(params.flag("binary").unwrap());
        assert!(matches!(params.flag("bad"), Err(ParamError::Invalid { .. })));
        assert!(matches!(params.flag("absent"), Err(ParamError::Missing(_))));
    }

    #[test]
    fn test_merged() {
        let base = Params::new().with("a", "1").with("b", "2");
        let merged = base.merged(&Params::new().with("b", "3"));
        assert_eq!(merged.get("b"), Some("3"));
        assert_eq!(base.get("b"), Some("2"));
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("OPEN"), Some(true));
        assert_eq!(parse_flag("CLOSED"), Some(false));
        assert_eq!(parse_flag("1.0"), Some(true));
        assert_eq!(parse_flag("x"), None);
    }
}
