use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// `ig` with logs, config lookup and the job store confined to `dir`
fn ig(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ig").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_DATA_HOME", dir.join("data"))
        .env("XDG_CONFIG_HOME", dir.join("config"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn functions_lists_registry() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;

    ig(dir.path())
        .arg("functions")
        .assert()
        .success()
        .stdout(predicate::str::contains("uppercase"))
        .stdout(predicate::str::contains("regex_extract"))
        .stdout(predicate::str::contains("Conditional transformation"));

    let output = ig(dir.path()).args(["functions", "--format", "json"]).output()?;
    assert!(output.status.success());
    let functions: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(functions.as_array().map(Vec::len), Some(16));
    assert_eq!(functions[3]["name"], "replace");
    assert_eq!(functions[3]["params"], serde_json::json!(["old", "new"]));
    Ok(())
}

#[test]
fn validate_reports_unknown_function() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let good = dir.path().join("good.json");
    let bad = dir.path().join("bad.yml");
    fs::write(&good, r#"{"name": [{"function": "trim"}, {"function": "uppercase"}]}"#)?;
    fs::write(&bad, "age:\n  - function: unknown_fn\n")?;

    ig(dir.path())
        .args(["validate", good.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rules are valid"));

    ig(dir.path())
        .args(["validate", bad.to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("unknown_fn"));
    Ok(())
}

#[test]
fn preview_applies_rules() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let rules = dir.path().join("rules.json");
    let sample = dir.path().join("sample.json");
    fs::write(&rules, r#"{"price": [{"function": "multiply", "params": {"factor": 2}}]}"#)?;
    fs::write(&sample, r#"[{"price": "5", "sku": "a-1"}]"#)?;

    let output = ig(dir.path())
        .args(["preview", rules.to_str().unwrap(), sample.to_str().unwrap(), "--format", "json"])
        .output()?;
    assert!(output.status.success());
    let preview: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(preview["transformed"][0]["price"], serde_json::json!(10.0));
    assert_eq!(preview["original"][0]["price"], "5");
    Ok(())
}

#[test]
fn run_pipeline_then_inspect_jobs() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let pipeline = dir.path().join("customers.yml");
    fs::write(
        &pipeline,
        r#"
source:
  type: memory
  data:
    - { id: 1, name: " ada " }
    - { id: 2, name: "grace" }
destination:
  type: file
  path: out/customers.jsonl
mapping_config:
  label: name
transformation_rules:
  label:
    - function: trim
    - function: uppercase
"#,
    )?;

    ig(dir.path())
        .args(["run", pipeline.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("completed"))
        .stdout(predicate::str::contains("Processed:  2"));

    let written = fs::read_to_string(dir.path().join("out/customers.jsonl"))?;
    assert_eq!(written, "{\"label\":\"ADA\"}\n{\"label\":\"GRACE\"}\n");

    let output = ig(dir.path()).args(["jobs", "--format", "json"]).output()?;
    assert!(output.status.success());
    let jobs: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(jobs.as_array().map(Vec::len), Some(1));
    assert_eq!(jobs[0]["status"], "completed");
    let id = jobs[0]["id"].as_str().unwrap().to_string();

    ig(dir.path())
        .args(["status", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()));

    ig(dir.path())
        .args(["jobs", "--status", "failed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No jobs found"));
    Ok(())
}

#[test]
fn run_with_invalid_rules_fails_before_starting() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let pipeline = dir.path().join("bad.yml");
    fs::write(
        &pipeline,
        "source: {type: memory}\ndestination: {type: memory}\ntransformation_rules:\n  x:\n    - function: nope\n",
    )?;

    ig(dir.path())
        .args(["run", pipeline.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope"));

    ig(dir.path())
        .arg("jobs")
        .assert()
        .success()
        .stdout(predicate::str::contains("No jobs found"));
    Ok(())
}

#[test]
fn status_of_unknown_job_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    ig(dir.path())
        .args(["status", "job-missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Job not found: job-missing"));
    Ok(())
}
