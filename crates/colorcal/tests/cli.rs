use assert_cmd::Command;
use colorcal::core::render_swatch;
use colorcal::ColorGrid;
use predicates::prelude::*;
use std::path::Path;

fn palette() -> ColorGrid {
    let colors: Vec<[u8; 3]> = (0..24u32)
        .map(|i| {
            [
                (i * 37 % 200 + 55) as u8,
                (i * 91 % 200 + 55) as u8,
                ((i * 53 + 20) % 200 + 55) as u8,
            ]
        })
        .collect();
    ColorGrid::from_colors(4, 6, &colors)
}

/// Camera sees every channel at 80 % plus an offset.
fn dimmed() -> ColorGrid {
    let colors: Vec<[u8; 3]> = palette()
        .colors()
        .map(|c| c.map(|v| (v as f32 * 0.8 + 10.0).round() as u8))
        .collect();
    ColorGrid::from_colors(4, 6, &colors)
}

fn write_inputs(dir: &Path) {
    render_swatch(&dimmed(), 50, 10, [30, 30, 30])
        .save(dir.join("camera.png"))
        .expect("camera");
    render_swatch(&palette(), 50, 10, [30, 30, 30])
        .save(dir.join("reference.png"))
        .expect("reference");
    std::fs::write(
        dir.join("config.json"),
        r#"{"preprocess": {"max_dimension": 0, "blur_sigma": 0.0}}"#,
    )
    .expect("config");
}

fn colorcal() -> Command {
    Command::cargo_bin("colorcal").expect("binary")
}

#[test]
fn calibrates_and_writes_outputs() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_inputs(dir.path());
    let debug = dir.path().join("debug");

    colorcal()
        .arg("--camera")
        .arg(dir.path().join("camera.png"))
        .arg("--reference")
        .arg(dir.path().join("reference.png"))
        .arg("--config")
        .arg(dir.path().join("config.json"))
        .arg("--output")
        .arg(dir.path().join("corrected.png"))
        .arg("--report")
        .arg(dir.path().join("report.json"))
        .arg("--debug-dir")
        .arg(&debug)
        .args(["--log-level", "warn"])
        .assert()
        .success()
        .stdout(predicate::str::contains("before:").and(predicate::str::contains("after:")));

    let corrected = image::open(dir.path().join("corrected.png"))
        .expect("corrected image")
        .to_rgb8();
    assert_eq!(corrected.dimensions(), (370, 250));
    let px = corrected.get_pixel(34, 34).0;
    let want = palette().get(0, 0);
    for c in 0..3 {
        assert!((px[c] as i32 - want[c] as i32).abs() <= 2, "{px:?} vs {want:?}");
    }

    let report: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("report.json")).expect("report"),
    )
    .expect("json");
    assert!(report["transform"].is_object());
    assert!(report["report"]["after"]["mean_absolute"].as_f64().expect("number") < 1.0);

    for name in [
        "camera_canvas.png",
        "reference_canvas.png",
        "camera_checker.png",
        "reference_checker.png",
        "adjusted_checker.png",
        "error_checker.png",
        "camera_rectified.png",
    ] {
        assert!(debug.join(name).is_file(), "missing {name}");
    }
}

#[test]
fn missing_checker_fails_but_keeps_canvases() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_inputs(dir.path());
    image::RgbImage::from_pixel(200, 150, image::Rgb([128, 128, 128]))
        .save(dir.path().join("blank.png"))
        .expect("blank");
    let debug = dir.path().join("debug");

    colorcal()
        .arg("--camera")
        .arg(dir.path().join("blank.png"))
        .arg("--reference")
        .arg(dir.path().join("reference.png"))
        .arg("--config")
        .arg(dir.path().join("config.json"))
        .arg("--debug-dir")
        .arg(&debug)
        .assert()
        .failure()
        .stderr(predicate::str::contains("camera image"));

    assert!(debug.join("camera_canvas.png").is_file());
    assert!(!debug.join("camera_checker.png").exists());
}

#[test]
fn unreadable_input_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    colorcal()
        .arg("--camera")
        .arg(dir.path().join("nope.png"))
        .arg("--reference")
        .arg(dir.path().join("nope.png"))
        .assert()
        .failure();
}

#[test]
fn bad_log_level_is_rejected() {
    colorcal()
        .args(["--camera", "a.png", "--reference", "b.png", "--log-level", "loud"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown log level"));
}
