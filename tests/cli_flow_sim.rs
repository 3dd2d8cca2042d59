use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "flowsim-rs-{prefix}-{}-{nanos}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn write_file(dir: &PathBuf, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write temp file");
    path
}

const PROFILE: &str = r#"
{
    "schema_version": 1,
    "defaults": { "cps": 1000.0 },
    "ip_gen": {
        "client": { "ip_range": ["16.0.0.1", "16.0.0.255"] },
        "server": { "ip_range": ["48.0.0.1", "48.0.255.255"] }
    },
    "templates": [
        {
            "client": [
                { "op": "send", "data": "ping" },
                { "op": "recv", "bytes": 4 }
            ],
            "server": [
                { "op": "recv", "bytes": 4 },
                { "op": "send", "data": "pong" }
            ]
        }
    ]
}
"#;

fn flow_done_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| line.starts_with("flow_done "))
        .map(|line| line.to_string())
        .collect()
}

#[test]
fn flow_sim_completes_flows_and_writes_the_trace() {
    let dir = unique_temp_dir("flow-sim");
    let profile = write_file(&dir, "profile.json", PROFILE);
    let trace = dir.join("trace.json");

    let output = Command::new(env!("CARGO_BIN_EXE_flow_sim"))
        .args([
            "--profile",
            profile.to_str().unwrap(),
            "--flows",
            "3",
            "--viz-json",
            trace.to_str().unwrap(),
            "--stats",
        ])
        .output()
        .expect("run flow_sim");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let done = flow_done_lines(&stdout);
    assert_eq!(done.len(), 3, "stdout: {stdout}");
    assert!(done[0].contains("reason=finished"));
    assert!(done[0].contains("client=16.0.0.1"));
    assert!(done[0].contains("server=48.0.0.1:80"));
    assert!(done[0].contains("c_tx=4"));
    assert!(done[0].contains("s_tx=4"));
    assert!(stdout.contains("flows: started=3, finished=3, reset=0, stalled=0"));

    let events: Value =
        serde_json::from_str(&fs::read_to_string(&trace).expect("read trace")).expect("json");
    let events = events.as_array().expect("event array");
    assert_eq!(events[0]["kind"], "meta");
    assert!(
        events
            .iter()
            .any(|ev| ev["kind"] == "flow_start" && ev["client_ip"] == "16.0.0.2")
    );
    assert_eq!(
        events
            .iter()
            .filter(|ev| ev["kind"] == "flow_done")
            .count(),
        3
    );

    fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn flow_sim_until_leaves_unfinished_flows_running() {
    let dir = unique_temp_dir("flow-sim-until");
    // client waits 5ms mid-flow, so a 1ms horizon cannot finish it
    let slow = PROFILE.replace(
        r#"{ "op": "send", "data": "ping" },"#,
        r#"{ "op": "delay", "usec": 5000 },
           { "op": "send", "data": "ping" },"#,
    );
    let profile = write_file(&dir, "profile.json", &slow);

    let output = Command::new(env!("CARGO_BIN_EXE_flow_sim"))
        .args([
            "--profile",
            profile.to_str().unwrap(),
            "--until-ms",
            "1",
        ])
        .output()
        .expect("run flow_sim");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(flow_done_lines(&stdout).is_empty(), "stdout: {stdout}");
    assert!(stdout.contains("flow_running id=0"));

    fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn flow_sim_rejects_an_invalid_spec() {
    let dir = unique_temp_dir("flow-sim-bad");
    let profile = write_file(&dir, "profile.json", "{ \"schema_version\": 1 }");

    let output = Command::new(env!("CARGO_BIN_EXE_flow_sim"))
        .args(["--profile", profile.to_str().unwrap()])
        .output()
        .expect("run flow_sim");
    assert!(!output.status.success());
    assert!(!output.stderr.is_empty());

    fs::remove_dir_all(&dir).expect("cleanup");
}
