use std::process::Command;

fn temp_path(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "nexus-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

#[test]
fn cli_list_strategies_writes_output() {
    let exe = env!("CARGO_BIN_EXE_nexus-tester");
    let output_path = temp_path("list");
    let status = Command::new(exe)
        .args(["--list-strategies", "--output"])
        .arg(&output_path)
        .status()
        .expect("run cli");
    assert!(status.success());
    let content = std::fs::read_to_string(output_path).expect("read output");
    assert!(content.contains("Available strategies"));
    assert!(content.contains("explorer"));
}

#[test]
fn cli_writes_json_report() {
    let exe = env!("CARGO_BIN_EXE_nexus-tester");
    let output_path = temp_path("run");
    let output = Command::new(exe)
        .args([
            "--seeds",
            "3,4",
            "--turns",
            "40",
            "--strategy",
            "trader",
            "--report",
            "json",
            "--output",
        ])
        .arg(&output_path)
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Nexus Chronicles Autopilot"));

    let content = std::fs::read_to_string(output_path).expect("read output");
    let runs: serde_json::Value = serde_json::from_str(&content).expect("json report");
    let runs = runs.as_array().expect("array of runs");
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0]["strategy"], "Trader");
    assert!(runs[0]["violations"].as_array().is_some_and(Vec::is_empty));
}

#[test]
fn cli_rejects_unknown_strategy() {
    let exe = env!("CARGO_BIN_EXE_nexus-tester");
    let output = Command::new(exe)
        .args(["--strategy", "smuggler"])
        .output()
        .expect("run cli");
    assert!(!output.status.success());
}
