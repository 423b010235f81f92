use std::f32::consts::PI;
use std::path::Path;

use assert_cmd::Command;
use hound::{SampleFormat, WavSpec, WavWriter};
use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

fn write_tone_wav(path: &Path, sample_rate: u32, seconds: f32) {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).expect("create wav");
    let len = (sample_rate as f32 * seconds) as usize;
    for i in 0..len {
        let t = i as f32 / sample_rate as f32;
        let tone = if (t * 2.0) as usize % 2 == 0 { 330.0 } else { 2_500.0 };
        let sample = (2.0 * PI * tone * t).sin() * 0.5;
        writer
            .write_sample((sample * i16::MAX as f32) as i16)
            .expect("write sample");
    }
    writer.finalize().expect("finalize wav");
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout is JSON")
}

#[test]
fn fit_then_predict_round_trip() {
    let dir = tempdir().unwrap();
    let wav = dir.path().join("tones.wav");
    let model = dir.path().join("model.json");
    write_tone_wav(&wav, 16_000, 3.0);

    let fit = Command::cargo_bin("audiocluster")
        .unwrap()
        .arg("fit")
        .arg(&wav)
        .arg("--model")
        .arg(&model)
        .args(["--set", "kmeans__n_clusters=3", "--set", "mel__n_mels=40"])
        .assert()
        .success();
    let summary = stdout_json(&fit.get_output().stdout);
    assert_eq!(summary["clusters"], 3);
    assert!(model.exists());

    let predict = Command::cargo_bin("audiocluster")
        .unwrap()
        .arg("predict")
        .arg(&wav)
        .arg("--model")
        .arg(&model)
        .args(["--start", "0.5", "--end", "2.5"])
        .assert()
        .success();
    let output = stdout_json(&predict.get_output().stdout);
    let labels = output["labels"].as_array().expect("labels array");
    assert_eq!(output["frames"].as_u64().unwrap() as usize, labels.len());
    assert!(!labels.is_empty());
    assert!(labels.iter().all(|label| label.as_u64().unwrap() < 3));
}

#[test]
fn params_lists_nested_keys() {
    Command::cargo_bin("audiocluster")
        .unwrap()
        .arg("params")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"mel__n_fft\": 2048"))
        .stdout(predicate::str::contains("\"kmeans__n_clusters\": 8"))
        .stdout(predicate::str::contains("\"stack__per_item\": false"));
}

#[test]
fn unknown_argument_in_pipeline_json_fails() {
    Command::cargo_bin("audiocluster")
        .unwrap()
        .args([
            "params",
            "--pipeline-json",
            r#"{"steps":[{"name":"t","function":"transpose","arguments":{"axes":1}}]}"#,
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not accept argument `axes`"));
}

#[test]
fn predict_with_missing_model_fails() {
    let dir = tempdir().unwrap();
    let wav = dir.path().join("clip.wav");
    write_tone_wav(&wav, 16_000, 1.0);
    Command::cargo_bin("audiocluster")
        .unwrap()
        .arg("predict")
        .arg(&wav)
        .arg("--model")
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read model file"));
}
