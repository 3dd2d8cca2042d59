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
    "ip_gen": {
        "client": { "ip_range": ["16.0.0.1", "16.0.0.255"] },
        "server": { "ip_range": ["48.0.0.1", "48.0.255.255"] }
    },
    "templates": [
        {
            "port": 8080,
            "client": [
                { "op": "send", "data": "aaa" },
                { "op": "recv", "bytes": 3 }
            ],
            "server": [
                { "op": "recv", "bytes": 3 },
                { "op": "send", "data": "bbb" }
            ]
        }
    ]
}
"#;

#[test]
fn profile_compile_emits_the_program_database() {
    let dir = unique_temp_dir("profile-compile");
    let profile = write_file(&dir, "profile.json", PROFILE);
    let out = dir.join("compiled.json");

    let output = Command::new(env!("CARGO_BIN_EXE_profile_compile"))
        .args([
            "--profile",
            profile.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
            "--pretty",
        ])
        .output()
        .expect("run profile_compile");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let compiled: Value =
        serde_json::from_str(&fs::read_to_string(&out).expect("read output")).expect("parse json");

    let bufs = compiled["buf_list"].as_array().expect("buf_list");
    assert_eq!(bufs.len(), 2);
    assert_eq!(bufs[0], "YWFh");
    assert_eq!(bufs[1], "YmJi");

    let programs = compiled["program_list"].as_array().expect("program_list");
    assert_eq!(programs.len(), 2);
    let client_cmds = programs[0]["commands"].as_array().expect("commands");
    assert_eq!(client_cmds[0]["name"], "tx");
    assert_eq!(client_cmds[0]["buf_index"], 0);
    assert_eq!(client_cmds[1]["name"], "rx");
    assert_eq!(client_cmds[1]["min_bytes"], 3);
    assert_eq!(programs[0]["stream"], true);

    let template = &compiled["templates"][0];
    assert_eq!(template["client_template"]["port"], 8080);
    assert_eq!(template["server_template"]["assoc"][0]["port"], 8080);

    fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn profile_compile_writes_to_stdout_without_out_flag() {
    let dir = unique_temp_dir("profile-compile-stdout");
    let profile = write_file(&dir, "profile.json", PROFILE);

    let output = Command::new(env!("CARGO_BIN_EXE_profile_compile"))
        .args(["--profile", profile.to_str().unwrap()])
        .output()
        .expect("run profile_compile");
    assert!(output.status.success());

    let compiled: Value =
        serde_json::from_slice(&output.stdout).expect("stdout is the compiled json");
    assert_eq!(compiled["buf_list"][0], "YWFh");

    fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn profile_compile_fails_loudly_on_bad_programs() {
    let dir = unique_temp_dir("profile-compile-bad");
    let bad = PROFILE.replace(
        r#"{ "op": "send", "data": "aaa" },"#,
        r#"{ "op": "set_var", "name": "i", "val": 2 },
           { "op": "jmp_nz", "var": "i", "label": "missing:" },"#,
    );
    let profile = write_file(&dir, "profile.json", &bad);

    let output = Command::new(env!("CARGO_BIN_EXE_profile_compile"))
        .args(["--profile", profile.to_str().unwrap()])
        .output()
        .expect("run profile_compile");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing:"), "stderr: {stderr}");

    fs::remove_dir_all(&dir).expect("cleanup");
}
