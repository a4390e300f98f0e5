use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn prerender() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_prerender"));
    cmd.env("RUST_LOG", "off");
    cmd
}

#[test]
fn invalid_target_exits_with_usage_code() {
    let output = prerender()
        .args(["render", "/", "--target", "localhost:3000"])
        .output()
        .expect("run prerender");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error (config)"), "{stderr}");
    assert!(stderr.contains("hint:"), "{stderr}");
}

#[test]
fn broken_config_file_exits_with_usage_code() {
    let dir = TempDir::new().expect("tempdir");
    let cfg_path = dir.path().join("prerender.toml");
    fs::write(&cfg_path, "wait = \"three seconds\"\n").expect("write config");

    let output = prerender()
        .args(["--config", cfg_path.to_str().unwrap(), "render", "/"])
        .output()
        .expect("run prerender");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Config parse error"), "{stderr}");
}

#[test]
fn missing_config_file_exits_with_usage_code() {
    let dir = TempDir::new().expect("tempdir");
    let cfg_path = dir.path().join("absent.toml");

    let status = prerender()
        .args(["render", "--config", cfg_path.to_str().unwrap()])
        .status()
        .expect("run prerender");

    assert_eq!(status.code(), Some(2));
}

#[cfg(not(feature = "chromium"))]
#[test]
fn render_without_an_engine_reports_it_unavailable() {
    let dir = TempDir::new().expect("tempdir");
    let cfg_path = dir.path().join("prerender.toml");
    fs::write(
        &cfg_path,
        "target = \"http://127.0.0.1:9\"\nwait = \"200ms\"\n",
    )
    .expect("write config");

    let output = prerender()
        .args(["render", "/", "--config", cfg_path.to_str().unwrap()])
        .output()
        .expect("run prerender");

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error (engine)"), "{stderr}");
    assert!(stderr.contains("--features chromium"), "{stderr}");
}

#[test]
fn unknown_flag_is_a_clap_usage_error() {
    let status = prerender()
        .args(["serve", "--no-such-flag"])
        .status()
        .expect("run prerender");

    assert_eq!(status.code(), Some(2));
}
