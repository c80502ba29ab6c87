use std::fs;
use std::process::Command;

use tempfile::tempdir;

fn typer_binary() -> &'static str {
    env!("CARGO_BIN_EXE_temper-typer")
}

const CLEAN: &str = r#"
statements:
  - let: { name: x, init: { int: 1 } }
    at: 1+0-9
  - op: { name: "+", args: [{ read: x }, { int: 2 }] }
    at: 2+0-5
"#;

const BROKEN: &str = r#"
statements:
  - let: { name: x, init: { int: 1 } }
  - read: nope
    at: 3+4
"#;

#[test]
fn clean_module_checks() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let input = tmp.path().join("clean.yaml");
    fs::write(&input, CLEAN)?;

    let output = Command::new(typer_binary())
        .arg("check")
        .arg(&input)
        .output()
        .expect("run temper-typer check");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stderr).trim().is_empty());
    Ok(())
}

#[test]
fn errors_are_reported_with_their_position() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let input = tmp.path().join("broken.yaml");
    fs::write(&input, BROKEN)?;

    let output = Command::new(typer_binary())
        .arg("check")
        .arg(&input)
        .output()
        .expect("run temper-typer check");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let path = input.display();
    assert!(
        stderr.contains(&format!("{path}:3+4: error: No declaration for nope")),
        "stderr: {stderr}"
    );
    assert!(stderr.contains(&format!("{path}:3+4: info: Type Invalid mentions Invalid")));
    assert!(stderr.contains("1 error(s) found while typing"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn invalid_notes_can_be_turned_off() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let input = tmp.path().join("broken.yaml");
    fs::write(&input, BROKEN)?;

    let output = Command::new(typer_binary())
        .args(["check", "--no-invalid-notes"])
        .arg(&input)
        .output()
        .expect("run temper-typer check");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No declaration for nope"));
    assert!(!stderr.contains("mentions Invalid"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn dump_types_as_json() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let input = tmp.path().join("clean.yaml");
    fs::write(&input, CLEAN)?;

    let output = Command::new(typer_binary())
        .args(["check", "--dump-types", "--format", "json"])
        .arg(&input)
        .output()
        .expect("run temper-typer check");

    assert!(output.status.success());
    let nodes: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let nodes = nodes.as_array().expect("array of typed nodes");
    let sum = nodes
        .iter()
        .find(|node| node["position"] == "2+0-5")
        .expect("the sum is typed");
    assert_eq!(sum["type"], "Int32");
    Ok(())
}

#[test]
fn dump_plan_as_yaml() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let input = tmp.path().join("clean.yaml");
    fs::write(&input, CLEAN)?;

    let output = Command::new(typer_binary())
        .args(["check", "--dump-plan"])
        .arg(&input)
        .output()
        .expect("run temper-typer check");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("type_order:"), "stdout: {stdout}");
    Ok(())
}

#[test]
fn json_input_is_accepted() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let input = tmp.path().join("clean.json");
    fs::write(
        &input,
        r#"{ "statements": [{ "op": { "name": "/", "args": [{ "int": 1 }, { "int": 0 }] }, "at": "1+0-5" }] }"#,
    )?;

    let output = Command::new(typer_binary())
        .arg("check")
        .arg(&input)
        .output()
        .expect("run temper-typer check");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("1+0-5: error: Division by zero"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn missing_input_fails_to_load() {
    let tmp = tempdir().expect("tempdir");
    let output = Command::new(typer_binary())
        .arg("check")
        .arg(tmp.path().join("absent.yaml"))
        .output()
        .expect("run temper-typer check");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load"), "stderr: {stderr}");
}
