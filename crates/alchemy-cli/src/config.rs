//! Plugin parameters from a TOML file and the command line.

use alchemy_io::Params;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    params: BTreeMap<String, toml::Value>,
}

/// Parameters from the `[params]` table of a TOML file.
///
/// Strings are taken verbatim; integers, floats and booleans are rendered as text.
pub fn load_config(path: &Path) -> Result<Params> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    parse_config(&text).with_context(|| format!("parsing config file {}", path.display()))
}

pub fn parse_config(text: &str) -> Result<Params> {
    let file: ConfigFile = toml::from_str(text)?;
    let mut params = Params::new();
    for (key, value) in file.params {
        let value = match value {
            toml::Value::String(text) => text,
            toml::Value::Integer(n) => n.to_string(),
            toml::Value::Float(x) => x.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            other => bail!("parameter '{key}' must be a string, number or boolean, found {other}"),
        };
        params.insert(key, value);
    }
    Ok(params)
}

/// Parameters from trailing `--key value` (or `--key=value`) arguments.
///
/// A key followed by another key, or by nothing, is set to `"true"`.
pub fn parse_pairs(args: &[String]) -> Result<Params> {
    let mut params = Params::new();
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        let Some(key) = arg.strip_prefix("--") else {
            bail!("unexpected argument '{arg}', expected --key value");
        };
        if let Some((key, value)) = key.split_once('=') {
            params.insert(key, value);
            continue;
        }
        match iter.next_if(|next| !next.starts_with("--")) {
            Some(value) => params.insert(key, value.as_str()),
            None => params.insert(key, "true"),
        }
    }
    Ok(params)
}

/// Config file values overridden by command-line pairs.
pub fn resolve_params(config: Option<&Path>, pairs: &[String]) -> Result<Params> {
    let base = match config {
        Some(path) => load_config(path)?,
        None => Params::new(),
    };
    Ok(base.merged(&parse_pairs(pairs)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pairs() {
        let params = parse_pairs(&args(&[
            "--input_dir",
            "data",
            "--process_lv",
            "--system=scada",
            "--offset",
            "-3",
        ]))
        .unwrap();
        assert_eq!(params.get("input_dir"), Some("data"));
        assert_eq!(params.get("process_lv"), Some("true"));
        assert_eq!(params.get("system"), Some("scada"));
        assert_eq!(params.get("offset"), Some("-3"));
    }

    #[test]
    fn test_stray_value() {
        assert!(parse_pairs(&args(&["value"])).is_err());
    }

    #[test]
    fn test_config_table() {
        let params = parse_config(
            r#"
            [params]
            input_dir = "data"
            process_lv = true
            timeout = 10
            ratio = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(params.get("input_dir"), Some("data"));
        assert_eq!(params.get("process_lv"), Some("true"));
        assert_eq!(params.get("timeout"), Some("10"));
        assert_eq!(params.get("ratio"), Some("0.5"));

        assert!(parse_config("[params]\nlist = [1, 2]").is_err());
        assert!(parse_config("").unwrap().is_empty());
    }

    #[test]
    fn test_command_line_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alchemy.toml");
        fs::write(&path, "[params]\nsystem = \"file\"\ncontext = \"urn:\"\n").unwrap();
        let params = resolve_params(Some(&path), &args(&["--system", "cli"])).unwrap();
        assert_eq!(params.get("system"), Some("cli"));
        assert_eq!(params.get("context"), Some("urn:"));
    }
}
