use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn repo_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join(relative)
}

fn feeders() -> String {
    repo_path("test_data/tabular/feeders")
        .to_string_lossy()
        .into_owned()
}

#[test]
fn alchemy_plugins_lists_builtins() {
    let mut cmd = Command::cargo_bin("alchemy").unwrap();
    cmd.arg("plugins")
        .assert()
        .success()
        .stdout(predicate::str::contains("TabularImporter"))
        .stdout(predicate::str::contains("JsonExporter"))
        .stdout(predicate::str::contains("CytoscapeJsExporter"))
        .stdout(predicate::str::contains("JsonPointerNotifier"))
        .stdout(predicate::str::contains("input_dir"));
}

#[test]
fn alchemy_convert_tabular_to_json() {
    let out_dir = tempdir().unwrap();
    let out = out_dir.path().join("topology.json");
    let mut cmd = Command::cargo_bin("alchemy").unwrap();
    cmd.args([
        "convert",
        "--input-format",
        "TabularImporter",
        "--output-format",
        "JsonExporter",
        "--input_dir",
        &feeders(),
        "--process_lv",
        "--system",
        "scada",
        "--output_file",
        out.to_str().unwrap(),
    ])
    .assert()
    .success();

    for network in ["MV1", "F1", "F2"] {
        assert!(out_dir.path().join(format!("topology_{network}.json")).exists());
    }
    let root: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.path().join("topology_MV1.json")).unwrap())
            .unwrap();
    assert!(root["buses"]
        .as_array()
        .unwrap()
        .iter()
        .any(|bus| bus["_id"] == "scada_B1"));
}

#[test]
fn alchemy_convert_with_config_and_notifier() {
    let out_dir = tempdir().unwrap();
    let config = out_dir.path().join("alchemy.toml");
    fs::write(
        &config,
        format!(
            "[params]\ninput_dir = {:?}\nprocess_lv = false\ninclude_metadata = true\n",
            feeders()
        ),
    )
    .unwrap();
    let out = out_dir.path().join("graph.json");

    let mut cmd = Command::cargo_bin("alchemy").unwrap();
    cmd.args([
        "convert",
        "--input-format",
        "TabularImporter",
        "--output-format",
        "CytoscapeJsExporter",
        "--notifier",
        "JsonPointerNotifier",
        "--config",
        config.to_str().unwrap(),
        "--output_file",
        out.to_str().unwrap(),
        "--notifier_params",
        r#"[{"pointer": "/metadata/description", "replacement_value": "{network_id}"}]"#,
    ])
    .assert()
    .success();

    assert!(out_dir.path().join("graph_MV1.json").exists());
    assert!(!out_dir.path().join("graph_F1.json").exists());
}

#[test]
fn alchemy_convert_unknown_exporter_fails() {
    let mut cmd = Command::cargo_bin("alchemy").unwrap();
    cmd.args([
        "convert",
        "--input-format",
        "TabularImporter",
        "--output-format",
        "ExcelExporter",
    ])
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("unknown exporter 'ExcelExporter'"));
}

#[test]
fn alchemy_convert_missing_parameter_fails() {
    let out_dir = tempdir().unwrap();
    let out = out_dir.path().join("topology.json");
    let mut cmd = Command::cargo_bin("alchemy").unwrap();
    cmd.args([
        "convert",
        "--input-format",
        "TabularImporter",
        "--output-format",
        "JsonExporter",
        "--output_file",
        out.to_str().unwrap(),
    ])
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("input_dir"));
    assert!(!out_dir.path().join("topology_MV1.json").exists());
}

#[test]
fn alchemy_inspect_prints_networks_and_writes_dot() {
    let out_dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("alchemy").unwrap();
    cmd.args([
        "inspect",
        "--input-format",
        "TabularImporter",
        "--dot",
        out_dir.path().to_str().unwrap(),
        "--input_dir",
        &feeders(),
        "--process_lv",
        "true",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("Network MV1 (MV)"))
    .stdout(predicate::str::contains("Network F1 (LV)"));
    assert!(out_dir.path().join("F1.dot").exists());
}
