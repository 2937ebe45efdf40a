use std::fs;
use std::path::Path;

use assert_cmd::Command;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use predicates::prelude::*;
use sheetscan::{FillState, ScanJobConfig, ScanReport};

const DETECTION_DOC: &str = r#"<?xml version="1.0"?>
<filter-params>
  <filter name="Basic Threshold-Fraction Filter" type="THRESH_FRAC">
    <threshold>10</threshold>
    <invert/>
    <fraction>0.5</fraction>
  </filter>
  <filter name="Green Channel" type="THRESH_FRAC">
    <channel>1</channel>
    <preblur>5</preblur>
    <threshold>1.2.3</threshold>
  </filter>
</filter-params>"#;

const ALIGNMENT_DOC: &str = r#"<?xml version="1.0"?>
<filter-params>
  <filter name="Corner Marks" type="THRESH_CONTOUR">
    <threshold>10</threshold>
    <invert/>
    <alignment-approx-tollerance>0.02</alignment-approx-tollerance>
    <alignment-min-width>0.03</alignment-min-width>
    <alignment-max-width>0.08</alignment-max-width>
    <alignment-min-height>0.03</alignment-min-height>
    <alignment-max-height>0.08</alignment-max-height>
    <alignment-min-filled>0.8</alignment-min-filled>
    <crop-offset-fraction-bottom>0.25</crop-offset-fraction-bottom>
    <crop-offset-fraction-top>0.25</crop-offset-fraction-top>
    <crop-offset-fraction-left>0.25</crop-offset-fraction-left>
    <crop-offset-fraction-right>1.25</crop-offset-fraction-right>
  </filter>
</filter-params>"#;

fn sheetscan() -> Command {
    Command::cargo_bin("sheetscan").expect("sheetscan binary")
}

/// Two alignment marks and, between them, one filled bubble at (150, 150).
fn write_sheet(path: &Path) {
    let mut img = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
    draw_filled_rect_mut(&mut img, Rect::at(90, 140).of_size(20, 20), Rgb([0, 0, 0]));
    draw_filled_rect_mut(&mut img, Rect::at(290, 140).of_size(20, 20), Rgb([0, 0, 0]));
    draw_filled_rect_mut(&mut img, Rect::at(170, 120).of_size(12, 12), Rgb([0, 0, 0]));
    img.save(path).unwrap();
}

#[test]
fn list_prints_block_names() {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("detection.xml");
    fs::write(&doc, DETECTION_DOC).unwrap();
    sheetscan()
        .arg("list")
        .arg(&doc)
        .assert()
        .success()
        .stdout(predicate::str::contains("Basic Threshold-Fraction Filter"))
        .stdout(predicate::str::contains("Green Channel"));
}

#[test]
fn show_reports_lenient_numeric_checks() {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("detection.xml");
    fs::write(&doc, DETECTION_DOC).unwrap();
    sheetscan()
        .args(["show"])
        .arg(&doc)
        .arg("Green Channel")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Detection Algorithm Configuration \"Green Channel\" (THRESH_FRAC)",
        ))
        .stdout(predicate::str::contains("is threshold a float? true."))
        .stdout(predicate::str::contains("is threshold an int? false."));
}

#[test]
fn show_unknown_block_fails() {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("detection.xml");
    fs::write(&doc, DETECTION_DOC).unwrap();
    sheetscan()
        .arg("show")
        .arg(&doc)
        .arg("No Such Filter")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn run_aligns_and_classifies() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("scan.png");
    write_sheet(&image);
    let detection = dir.path().join("detection.xml");
    let alignment = dir.path().join("alignment.xml");
    fs::write(&detection, DETECTION_DOC).unwrap();
    fs::write(&alignment, ALIGNMENT_DOC).unwrap();

    let mut cfg = ScanJobConfig::new(image.to_string_lossy());
    cfg.detection_document = detection.to_string_lossy().into_owned();
    cfg.alignment_document = alignment.to_string_lossy().into_owned();
    cfg.alignment = Some("Corner Marks".to_string());
    cfg.detection = Some("Basic Threshold-Fraction Filter".to_string());
    // After the crop the sheet is 300 px wide and starts 50 px right of the
    // left mark centre, so the bubble centre sits at about (126, 26).
    cfg.circles.push(sheetscan::CircleDescriptor::new(126.0 / 300.0, 26.0 / 300.0, 5.0 / 300.0));
    cfg.circles.push(sheetscan::CircleDescriptor::new(0.8, 0.2, 0.02));
    cfg.annotated_path = Some(dir.path().join("annotated.png").to_string_lossy().into_owned());
    let job = dir.path().join("job.json");
    cfg.write_json(&job).unwrap();
    let report_path = dir.path().join("report.json");

    sheetscan()
        .args(["--log-level", "warn", "run"])
        .arg(&job)
        .arg("--out")
        .arg(&report_path)
        .arg("--diagnostics")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 of 2 bubbles filled"));

    let report = ScanReport::load_json(&report_path).unwrap();
    assert!(report.error.is_none(), "{:?}", report.error);
    let size = report.image_size.unwrap();
    assert!((299..=301).contains(&size[0]), "{size:?}");
    assert!(report.alignment.is_some());
    let states: Vec<_> = report.bubbles.iter().map(|b| b.state).collect();
    assert_eq!(states, vec![Some(FillState::Filled), Some(FillState::Empty)]);
    assert!(!report.diagnostics.is_empty());
    assert!(dir.path().join("annotated.png").exists());
}

#[test]
fn run_with_missing_image_writes_error_report() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ScanJobConfig::new(dir.path().join("missing.png").to_string_lossy());
    let job = dir.path().join("job.json");
    cfg.write_json(&job).unwrap();
    let report_path = dir.path().join("report.json");

    sheetscan()
        .arg("run")
        .arg(&job)
        .arg("--out")
        .arg(&report_path)
        .assert()
        .failure();

    let report = ScanReport::load_json(&report_path).unwrap();
    assert!(report.error.is_some());
    assert!(report.bubbles.is_empty());
}

#[test]
fn job_paths_are_relative_to_the_job_file() {
    let dir = tempfile::tempdir().unwrap();
    let jobs = dir.path().join("jobs");
    fs::create_dir_all(jobs.join("config")).unwrap();
    write_sheet(&jobs.join("scan.png"));
    fs::write(jobs.join("config/detection-algorithms.xml"), DETECTION_DOC).unwrap();

    let mut cfg = ScanJobConfig::new("scan.png");
    cfg.detection = Some("Basic Threshold-Fraction Filter".to_string());
    cfg.circles.push(sheetscan::CircleDescriptor::new(0.5, 0.5, 0.02));
    cfg.output_path = Some("report.json".to_string());
    cfg.write_json(jobs.join("job.json")).unwrap();

    let elsewhere = dir.path().join("elsewhere");
    fs::create_dir_all(&elsewhere).unwrap();
    sheetscan()
        .current_dir(&elsewhere)
        .arg("run")
        .arg(jobs.join("job.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("of 1 bubbles filled"));

    let report = ScanReport::load_json(jobs.join("report.json")).unwrap();
    assert!(report.error.is_none(), "{:?}", report.error);
    assert_eq!(report.bubbles.len(), 1);
    assert!(!elsewhere.join("report.json").exists());
}
