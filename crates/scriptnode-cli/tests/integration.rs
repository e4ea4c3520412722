//! Integration tests for scriptnode-cli.
//!
//! Tests run the CLI binary on descriptions written to a temporary
//! directory and check its output and the rendered files.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use scriptnode_config::{NetworkTree, NodeTree, ParameterTree};
use tempfile::TempDir;

/// Helper to get the path to the `scriptnode` binary built by cargo.
fn scriptnode_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_scriptnode"))
}

fn run(args: &[&str]) -> Output {
    scriptnode_bin().args(args).output().expect("failed to run scriptnode")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn offset_network(id: &str, value: f64) -> NetworkTree {
    NetworkTree::new(id)
        .with_parameter(ParameterTree::new("Offset", value).with_connection("add", "Value"))
        .with_root(NodeTree::new("container.chain", id).with_child(NodeTree::new("math.add", "add")))
}

fn write(dir: &Path, name: &str, tree: &NetworkTree) -> PathBuf {
    let path = dir.join(name);
    tree.save(&path).unwrap();
    path
}

fn read_wav(path: &Path) -> (hound::WavSpec, Vec<f32>) {
    let reader = hound::WavReader::open(path).unwrap();
    let spec = reader.spec();
    let samples = reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>().unwrap();
    (spec, samples)
}

// ---------------------------------------------------------------------------
// `scriptnode nodes`
// ---------------------------------------------------------------------------

#[test]
fn nodes_lists_builtin_nodes_and_containers() {
    let output = run(&["nodes"]);
    assert!(output.status.success(), "scriptnode nodes failed");

    let stdout = stdout(&output);
    assert!(stdout.contains("Available Nodes"));
    for path in ["core.gain", "core.peak", "math.add", "math.mul", "container.chain", "container.split"] {
        assert!(stdout.contains(path), "listing should contain '{path}'");
    }
}

#[test]
fn nodes_filters_by_category() {
    let output = run(&["nodes", "--category", "math"]);
    assert!(output.status.success());

    let stdout = stdout(&output);
    assert!(stdout.contains("math.mul"));
    assert!(!stdout.contains("core.gain"));
}

#[test]
fn nodes_shows_parameters_of_one_node() {
    let output = run(&["nodes", "math.add"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Value"));

    let output = run(&["nodes", "math.nothing"]);
    assert!(!output.status.success());
}

// ---------------------------------------------------------------------------
// `scriptnode validate`
// ---------------------------------------------------------------------------

#[test]
fn validate_accepts_valid_networks() {
    let dir = TempDir::new().unwrap();
    let toml = write(dir.path(), "a.toml", &offset_network("a", 0.25));
    let json = write(dir.path(), "b.json", &offset_network("b", 0.5));

    let output = run(&["validate", toml.to_str().unwrap(), json.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stdout(&output));
    assert_eq!(stdout(&output).lines().filter(|l| l.starts_with("ok ")).count(), 2);
}

#[test]
fn validate_rejects_dangling_connections() {
    let dir = TempDir::new().unwrap();
    let tree = offset_network("a", 0.25)
        .with_parameter(ParameterTree::new("Other", 0.0).with_connection("missing", "Value"));
    let path = write(dir.path(), "a.toml", &tree);

    let output = run(&["validate", path.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stdout(&output).lines().any(|l| l.starts_with("error ")));
}

#[test]
fn validate_resolves_project_networks() {
    let project = TempDir::new().unwrap();
    write(project.path(), "inner.toml", &offset_network("inner", 0.5).with_compilation(true));

    let dir = TempDir::new().unwrap();
    let outer = NetworkTree::new("outer")
        .with_root(NodeTree::new("container.chain", "outer").with_child(NodeTree::new("project.inner", "embedded")));
    let path = write(dir.path(), "outer.toml", &outer);

    let output = run(&["validate", path.to_str().unwrap()]);
    assert!(!output.status.success(), "project nodes need the project directory");

    let output = run(&["validate", path.to_str().unwrap(), "--project", project.path().to_str().unwrap()]);
    assert!(output.status.success(), "{}", stdout(&output));
}

// ---------------------------------------------------------------------------
// `scriptnode inspect`
// ---------------------------------------------------------------------------

#[test]
fn inspect_prints_parameters_and_nodes() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "main.toml", &offset_network("main", 0.25));

    let output = run(&["inspect", path.to_str().unwrap()]);
    assert!(output.status.success());

    let stdout = stdout(&output);
    assert!(stdout.contains("Network: main"));
    assert!(stdout.contains("Offset"));
    assert!(stdout.contains("add.Value"));
    assert!(stdout.contains("add (math.add)"));
}

#[test]
fn inspect_json_summary() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "main.json", &offset_network("main", 0.25));

    let output = run(&["inspect", path.to_str().unwrap(), "--json"]);
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(summary["id"], "main");
    assert_eq!(summary["parameters"][0]["id"], "Offset");
    assert_eq!(summary["nodes"].as_array().map(Vec::len), Some(2));
    assert_eq!(summary["errors"].as_array().map(Vec::len), Some(0));
}

#[test]
fn inspect_normalized_round_trips() {
    let dir = TempDir::new().unwrap();
    let tree = offset_network("main", 0.25);
    let path = write(dir.path(), "main.toml", &tree);

    let output = run(&["inspect", path.to_str().unwrap(), "--normalized"]);
    assert!(output.status.success());

    let parsed = NetworkTree::from_toml(&stdout(&output)).unwrap();
    assert_eq!(parsed, tree.normalized());
}

// ---------------------------------------------------------------------------
// `scriptnode render`
// ---------------------------------------------------------------------------

#[test]
fn render_test_signal() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "main.toml", &offset_network("main", 0.25));
    let out = dir.path().join("out.wav");

    let output = run(&[
        "render",
        path.to_str().unwrap(),
        "--output",
        out.to_str().unwrap(),
        "--signal",
        "silence",
        "--duration",
        "0.01",
        "--sample-rate",
        "8000",
        "--block-size",
        "16",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let (spec, samples) = read_wav(&out);
    assert_eq!(spec.sample_rate, 8000);
    assert_eq!(spec.channels, 2);
    assert_eq!(samples.len(), 160);
    assert!(samples.iter().all(|&s| s == 0.25));
}

#[test]
fn render_input_file_with_parameters() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "main.toml", &offset_network("main", 0.25));
    let input = dir.path().join("in.wav");
    let out = dir.path().join("out.wav");

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 22050,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&input, spec).unwrap();
    for _ in 0..100 {
        writer.write_sample(0.25f32).unwrap();
    }
    writer.finalize().unwrap();

    let output = run(&[
        "render",
        path.to_str().unwrap(),
        "-o",
        out.to_str().unwrap(),
        "--input",
        input.to_str().unwrap(),
        "--channels",
        "1",
        "--param",
        "Offset=0.5",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let (spec, samples) = read_wav(&out);
    assert_eq!(spec.sample_rate, 22050);
    assert_eq!(samples.len(), 100);
    assert!(samples.iter().all(|&s| s == 0.75));
}

#[test]
fn render_rejects_unknown_parameters() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "main.toml", &offset_network("main", 0.25));
    let out = dir.path().join("out.wav");

    let output = run(&[
        "render",
        path.to_str().unwrap(),
        "-o",
        out.to_str().unwrap(),
        "--param",
        "Nothing=1",
    ]);
    assert!(!output.status.success());
    assert!(!out.exists());
}
