use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::{json, Value};
use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
};
use tempfile::tempdir;

// 2024-01-01 10:00:00 UTC
const START: f64 = 1_704_103_200.0;

/// Two-lead raw recording, one record per second, ECG on lead 1 with a
/// spike every `period` samples at 250 Hz.
fn write_raw(dir: &Path, name: &str, start: f64, minutes: usize, period: usize) -> PathBuf {
    let mut n = 0usize;
    let mut lines = Vec::new();
    for sec in 0..minutes * 60 {
        let ecg: Vec<_> = (0..250)
            .map(|_| {
                let v = if n % period == 0 { 1.0 } else { 0.0 };
                n += 1;
                json!({ "sample": v })
            })
            .collect();
        let flat: Vec<_> = (0..250).map(|_| json!({ "sample": "0" })).collect();
        lines.push(
            json!({
                "recordTime": start + sec as f64,
                "data": { "waveDataList": [
                    { "waveDataVoList": ecg },
                    { "waveDataVoList": flat }
                ]}
            })
            .to_string(),
        );
    }
    let path = dir.join(name);
    fs::write(&path, lines.join("\n")).expect("write raw fixture");
    path
}

#[test]
fn analyze_raw_directory_combines_files() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    write_raw(temp.path(), "b_second.txt", START + 3600.0, 1, 250);
    write_raw(temp.path(), "a_first.txt", START, 2, 200);
    fs::write(temp.path().join("c_broken.txt"), "{ not json\n")?;
    fs::write(temp.path().join("ignored.json"), "{}")?;
    let export = temp.path().join("out/hr.json");
    let csv = temp.path().join("hr.csv");

    let output = cargo_bin_cmd!("cardio")
        .args([
            "analyze",
            "--dir",
            temp.path().to_str().expect("utf8 path"),
            "--config",
            &sample_path("test_data/cardio.toml"),
            "--export",
            export.to_str().expect("utf8 path"),
            "--csv",
            csv.to_str().expect("utf8 path"),
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let js: Value = serde_json::from_slice(&output)?;
    assert_eq!(js["files_total"], 3);
    assert_eq!(js["files_contributing"], 2);
    assert_eq!(js["files_skipped"], 1);
    assert_eq!(js["points"], 3);
    assert_eq!(js["stats"]["max_hr"], 75.0);
    assert_eq!(js["stats"]["min_hr"], 60.0);
    assert!(js.get("range").is_none());

    let exported: Value = serde_json::from_str(&fs::read_to_string(&export)?)?;
    assert_eq!(exported["analysis_info"]["total_hr_data_points"], 3);
    assert_eq!(
        exported["heart_rate_time_domain"]["timestamps"],
        json!([
            "2024-01-01 10:01:00",
            "2024-01-01 10:02:00",
            "2024-01-01 11:01:00"
        ])
    );
    assert_eq!(
        exported["heart_rate_time_domain"]["heart_rates_bpm"],
        json!([75.0, 75.0, 60.0])
    );
    assert_eq!(exported["hr_time_domain_stats"]["mean_hr"], 70.0);

    let table = fs::read_to_string(&csv)?;
    assert_eq!(table.lines().count(), 4);
    assert!(table.contains("2024-01-01 11:01:00,60.00"));
    Ok(())
}

#[test]
fn analyze_hr_json_inputs_with_range() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let extra = temp.path().join("extra.json");
    fs::write(
        &extra,
        r#"{"timestamps": ["2024-01-01 10:05:00"], "heart_rates_bpm": [80]}"#,
    )?;
    let export = temp.path().join("combined.json");

    let output = cargo_bin_cmd!("cardio")
        .args([
            "analyze",
            "--kind",
            "hr-json",
            "--input",
            &sample_path("test_data/hr_sample.json"),
            extra.to_str().expect("utf8 path"),
            "--start",
            "2024-01-01 10:04:00",
            "--end",
            "2024-01-01 10:30:00",
            "--export",
            export.to_str().expect("utf8 path"),
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let js: Value = serde_json::from_slice(&output)?;
    assert_eq!(js["points"], 5);
    assert_eq!(js["stats"]["mean_hr"], 70.0);
    assert_eq!(js["range"]["points"], 2);
    assert_eq!(js["range"]["stats"]["mean_hr"], 77.5);

    let exported: Value = serde_json::from_str(&fs::read_to_string(&export)?)?;
    let stats = &exported["hr_time_domain_stats"];
    assert_eq!(stats["global_stats"]["mean_hr"], 70.0);
    assert_eq!(stats["time_range_stats"]["mean_hr"], 77.5);
    Ok(())
}

#[test]
fn analyze_keeps_results_when_range_is_empty() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let export = temp.path().join("hr.json");
    let csv = temp.path().join("hr.csv");

    let assert = cargo_bin_cmd!("cardio")
        .args([
            "analyze",
            "--kind",
            "hr-json",
            "--input",
            &sample_path("test_data/hr_sample.json"),
            "--start",
            "2024-02-01 00:00:00",
            "--end",
            "2024-02-01 01:00:00",
            "--export",
            export.to_str().expect("utf8 path"),
            "--csv",
            csv.to_str().expect("utf8 path"),
        ])
        .assert()
        .success();
    let output = assert.get_output();
    let js: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(js["points"], 4);
    assert!(js.get("range").is_none());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no heart rate data in the selected time range"));

    let exported: Value = serde_json::from_str(&fs::read_to_string(&export)?)?;
    assert_eq!(exported["hr_time_domain_stats"]["mean_hr"], 67.5);
    assert!(exported["hr_time_domain_stats"].get("time_range_stats").is_none());
    assert_eq!(fs::read_to_string(&csv)?.lines().count(), 5);
    Ok(())
}

#[test]
fn analyze_rejects_lead_outside_recording() {
    let temp = tempdir().expect("tempdir");
    let raw = write_raw(temp.path(), "a.txt", START, 1, 200);
    let output = cargo_bin_cmd!("cardio")
        .args([
            "analyze",
            "--input",
            raw.to_str().expect("utf8 path"),
            "--total-leads",
            "2",
            "--target-lead",
            "5",
        ])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("lead 5 out of range (1-2)"));
}

#[test]
fn analyze_without_inputs_fails() {
    let temp = tempdir().expect("tempdir");
    cargo_bin_cmd!("cardio")
        .args(["analyze", "--dir", temp.path().to_str().expect("utf8 path")])
        .assert()
        .failure();
}

#[test]
fn interactive_run_finishes_after_console_commands() -> Result<(), Box<dyn Error>> {
    let output = cargo_bin_cmd!("cardio")
        .args([
            "analyze",
            "--kind",
            "hr-json",
            "--interactive",
            "--input",
            &sample_path("test_data/hr_sample.json"),
        ])
        .write_stdin("pause\nresume\np\n")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let js: Value = serde_json::from_slice(&output)?;
    assert_eq!(js["points"], 4);
    Ok(())
}

#[test]
fn file_hr_prints_minute_samples() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let raw = write_raw(temp.path(), "one.txt", START, 2, 200);
    let output = cargo_bin_cmd!("cardio")
        .args([
            "file-hr",
            "--input",
            raw.to_str().expect("utf8 path"),
            "--total-leads",
            "2",
            "--target-lead",
            "1",
            "--utc",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let js: Value = serde_json::from_slice(&output)?;
    let samples = js.as_array().expect("array of samples");
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0]["timestamp"], "2024-01-01 10:01:00");
    assert_eq!(samples[1]["timestamp"], "2024-01-01 10:02:00");
    let bpm = samples[0]["bpm"].as_f64().expect("bpm");
    assert!((bpm - 75.0).abs() < 1e-9);
    Ok(())
}

fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .expect("crates dir")
        .parent()
        .expect("workspace root")
        .to_path_buf()
}

fn sample_path(relative: &str) -> String {
    workspace_root()
        .join(relative)
        .to_string_lossy()
        .to_string()
}
