use std::path::{Path, PathBuf};
use std::process::Command;

use phaseseq::{AcquisitionMetadata, EncodeOpts, Frame, NoProgress, StackWriter, encode_sequence};

fn exe() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_phaseseq"))
}

fn write_container(dir: &Path, name: &str, frame: Frame) -> PathBuf {
    let stack = dir.join(format!("{name}.tif"));
    let mut w = StackWriter::create(&stack, false).unwrap();
    w.push(&frame).unwrap();
    w.finish();

    let timestamps = dir.join(format!("{name}_timestamps.txt"));
    std::fs::write(&timestamps, "0 0 0 0.0\n").unwrap();

    let dest = dir.join(format!("{name}.bnr"));
    encode_sequence(
        &stack,
        &timestamps,
        &AcquisitionMetadata::default(),
        &dest,
        EncodeOpts::default(),
        &mut NoProgress,
    )
    .unwrap();
    dest
}

#[test]
fn cli_check_fails_only_for_out_of_range_containers() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_container(dir.path(), "good", Frame::from_rows(&[&[1.0, -2.0]]).unwrap());
    let bad = write_container(dir.path(), "bad", Frame::from_rows(&[&[1.0, 150.0]]).unwrap());

    let status = Command::new(exe()).arg("check").arg(&good).status().unwrap();
    assert!(status.success());

    let output = Command::new(exe())
        .arg("check")
        .arg(&good)
        .arg(&bad)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bad.bnr"), "{stderr}");
}

#[test]
fn cli_info_prints_header_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_container(dir.path(), "seq", Frame::from_rows(&[&[0.5, 0.25]]).unwrap());

    let output = Command::new(exe())
        .args(["info", "--timestamps"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["frame_count"], 1);
    assert_eq!(value["width"], 2);
    assert_eq!(value["timestamps"], serde_json::json!([0.0]));
}

#[test]
fn cli_preview_writes_png() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_container(dir.path(), "seq", Frame::from_rows(&[&[0.0, 1.0], &[2.0, 3.0]]).unwrap());
    let png = dir.path().join("first.png");

    let status = Command::new(exe())
        .arg("preview")
        .arg("--in")
        .arg(&path)
        .arg("--out")
        .arg(&png)
        .status()
        .unwrap();
    assert!(status.success());
    assert_eq!(image::open(&png).unwrap().to_luma8().dimensions(), (2, 2));
}

#[test]
fn cli_translate_log_rewrites_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("log.txt");
    std::fs::write(
        &log,
        "Transformation Matrix: AffineTransform[[1.0, 0.0, 2.0], [0.0, 1.0, 3.0]]\n",
    )
    .unwrap();

    let status = Command::new(exe()).arg("translate-log").arg(&log).status().unwrap();
    assert!(status.success());
    assert!(std::fs::read_to_string(&log).unwrap().ends_with("2.0,3.0\n"));
}
