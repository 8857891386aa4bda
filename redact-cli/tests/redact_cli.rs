use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use image::{GenericImageView, ImageBuffer, Rgb, RgbImage};
use serde_json::Value;
use tempfile::tempdir;

/// 640x480 grey street with one high-contrast striped plate low in the frame.
fn write_street(path: &Path) -> Result<(), Box<dyn Error>> {
    let img: RgbImage = ImageBuffer::from_fn(640, 480, |x, y| {
        let in_plate = (260..380).contains(&x) && (380..416).contains(&y);
        let stroke = (266..378).contains(&x) && (386..410).contains(&y) && (x - 266) % 8 < 4;
        if stroke {
            Rgb([10, 10, 10])
        } else if in_plate {
            Rgb([250, 250, 250])
        } else {
            Rgb([120, 130, 125])
        }
    });
    img.save(path)?;
    Ok(())
}

fn run_cli(input: &Path, output_dir: &Path, json: &Path, extra: &[&str]) -> Result<Vec<Value>, Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("redact-cli");
    cmd.arg("--input")
        .arg(input)
        .arg("--output-dir")
        .arg(output_dir)
        .arg("--face-model")
        .arg(output_dir.join("missing-face-model.onnx"))
        .arg("--json")
        .arg(json)
        .args(extra);
    cmd.assert().success();
    let payload = fs::read_to_string(json)?;
    let parsed: Vec<Value> = serde_json::from_str(&payload)?;
    Ok(parsed)
}

#[test]
fn missing_face_model_still_writes_output() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input = work_dir.path().join("street.png");
    write_street(&input)?;
    let out_dir = work_dir.path().join("out");
    let json = work_dir.path().join("report.json");

    let records = run_cli(&input, &out_dir, &json, &[])?;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(record.get("error").is_none());
    assert_eq!(record["counts"]["facesDetected"], 0);
    let warnings = record["warnings"].as_array().expect("warnings");
    assert!(
        warnings
            .iter()
            .any(|w| w.as_str().is_some_and(|s| s.contains("face detector unavailable")))
    );

    let output = PathBuf::from(record["output"].as_str().expect("output path"));
    assert!(output.exists());
    assert_eq!(image::open(&output)?.dimensions(), (640, 480));
    Ok(())
}

#[test]
fn plates_are_blurred_unless_disabled() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input = work_dir.path().join("street.png");
    write_street(&input)?;

    let with_plates = run_cli(&input, &work_dir.path().join("a"), &work_dir.path().join("a.json"), &[])?;
    let plates = with_plates[0]["counts"]["platesDetected"].as_u64().expect("count");
    assert!(plates >= 1);
    let region = &with_plates[0]["regions"][0];
    assert_eq!(region["category"], "plate");

    let without = run_cli(
        &input,
        &work_dir.path().join("b"),
        &work_dir.path().join("b.json"),
        &["--no-plates"],
    )?;
    assert_eq!(without[0]["counts"]["platesDetected"], 0);
    assert!(without[0]["regions"].as_array().expect("regions").is_empty());

    // No regions: the written copy matches the source pixel for pixel.
    let source = image::open(&input)?.to_rgb8();
    let copy = image::open(work_dir.path().join("b/street.png"))?.to_rgb8();
    assert_eq!(source, copy);
    Ok(())
}

#[test]
fn unreadable_images_are_reported_and_skipped() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_dir = work_dir.path().join("inbox");
    fs::create_dir_all(input_dir.join("nested"))?;
    write_street(&input_dir.join("nested/good.png"))?;
    fs::write(input_dir.join("broken.jpg"), b"definitely not a jpeg")?;
    fs::write(input_dir.join("readme.txt"), b"ignored")?;

    let out_dir = work_dir.path().join("out");
    let records = run_cli(&input_dir, &out_dir, &work_dir.path().join("r.json"), &["--no-plates"])?;
    assert_eq!(records.len(), 2);

    let broken = records
        .iter()
        .find(|r| r["image"].as_str().is_some_and(|s| s.ends_with("broken.jpg")))
        .expect("broken record");
    assert_eq!(broken["error"], "could not read image");
    assert!(broken.get("output").is_none());

    assert!(out_dir.join("nested/good.png").exists());
    assert!(!out_dir.join("broken.jpg").exists());
    Ok(())
}

#[test]
fn preview_and_annotation_outputs() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input = work_dir.path().join("street.png");
    write_street(&input)?;
    let out_dir = work_dir.path().join("out");
    let annotate_dir = work_dir.path().join("annotated");

    let records = run_cli(
        &input,
        &out_dir,
        &work_dir.path().join("r.json"),
        &[
            "--preview",
            "300x600",
            "--annotate",
            annotate_dir.to_str().expect("utf-8 path"),
        ],
    )?;
    let preview = PathBuf::from(records[0]["preview"].as_str().expect("preview path"));
    assert!(preview.ends_with("street_preview.png"));
    assert_eq!(image::open(&preview)?.dimensions(), (300, 600));

    let annotated = PathBuf::from(records[0]["annotated"].as_str().expect("annotated path"));
    assert_eq!(image::open(annotated)?.dimensions(), (640, 480));
    Ok(())
}

#[test]
fn empty_input_directory_fails() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_dir = work_dir.path().join("empty");
    fs::create_dir_all(&input_dir)?;

    let mut cmd = cargo_bin_cmd!("redact-cli");
    cmd.arg("--input")
        .arg(&input_dir)
        .arg("--output-dir")
        .arg(work_dir.path().join("out"));
    cmd.assert().failure();
    Ok(())
}
