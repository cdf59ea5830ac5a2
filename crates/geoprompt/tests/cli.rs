#![cfg(feature = "cli")]

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use geoprompt::core::{AffineTransform, BoundingBox, Crs, ProjReprojector, Reprojector};
use geoprompt::tiling::{Manifest, MANIFEST_FILE};
use geoprompt::vector::{Feature, GeoJsonSink, Polygon, VectorSink};
use geoprompt::worldfile::write_world_file;
use predicates::prelude::*;

fn geoprompt() -> Command {
    Command::cargo_bin("geoprompt").unwrap()
}

/// 16x16 RGB image of 2 m pixels with its lower-left corner at `(x0, y0)`.
fn write_scene_at(dir: &Path, crs: &Crs, x0: f64, y0: f64) {
    let img = image::RgbImage::from_fn(16, 16, |x, y| image::Rgb([x as u8 * 10, y as u8 * 10, 7]));
    img.save(dir.join("scene.png")).unwrap();
    write_world_file(
        dir.join("scene.pgw"),
        &AffineTransform::from_bounds(x0, y0, x0 + 32.0, y0 + 32.0, 16, 16),
    )
    .unwrap();

    // class 3 on the top-left quadrant
    let mut sink = GeoJsonSink::new(dir.join("labels.geojson"), crs.clone());
    let quad = Polygon::from_bbox(&BoundingBox::new(x0, y0 + 16.0, x0 + 16.0, y0 + 32.0, crs.clone()));
    sink.write_features(&[Feature::new(quad, 1, 3)]).unwrap();
}

/// The scene covering (0, 0)..(32, 32) in EPSG:3857.
fn write_scene(dir: &Path) {
    write_scene_at(dir, &Crs::epsg(3857), 0.0, 0.0);
}

#[test]
fn roi_add_then_list() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("rois.jsonl");

    geoprompt()
        .args(["roi", "add", "--db"])
        .arg(&db)
        .args(["--bbox", "-10,-20,30,40", "--crs", "epsg:3857"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\":1"));
    geoprompt()
        .args(["roi", "add", "--db"])
        .arg(&db)
        .args(["--bbox", "0,0,5,5", "--crs", "EPSG:4326"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\":2"));

    geoprompt()
        .args(["roi", "list", "--db"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("EPSG:3857").and(predicate::str::contains("EPSG:4326")));
}

#[test]
fn roi_backup_then_load_into_fresh_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("rois.jsonl");
    for bbox in ["0,0,10,10", "20,20,30,30"] {
        geoprompt()
            .args(["roi", "add", "--db"])
            .arg(&db)
            .args(["--bbox", bbox, "--crs", "EPSG:3857"])
            .assert()
            .success();
    }

    let backup = dir.path().join("rois.bak");
    geoprompt()
        .args(["roi", "backup", "--db"])
        .arg(&db)
        .arg("--to")
        .arg(&backup)
        .assert()
        .success()
        .stdout(predicate::str::contains("backed up 2 roi(s)"));

    let other = dir.path().join("other.jsonl");
    geoprompt()
        .args(["roi", "load", "--db"])
        .arg(&other)
        .arg("--from")
        .arg(&backup)
        .assert()
        .success()
        .stdout(predicate::str::contains("loaded 2 roi(s)"));
    assert_eq!(fs::read_to_string(&other).unwrap(), fs::read_to_string(&db).unwrap());

    geoprompt()
        .args(["roi", "load", "--db"])
        .arg(&other)
        .arg("--from")
        .arg(dir.path().join("missing.jsonl"))
        .assert()
        .failure();
}

#[test]
fn malformed_bbox_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    geoprompt()
        .args(["roi", "add", "--db"])
        .arg(dir.path().join("rois.jsonl"))
        .args(["--bbox", "1,2,3", "--crs", "EPSG:3857"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("xmin,ymin,xmax,ymax"));
}

#[test]
fn degenerate_roi_fails_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("rois.jsonl");
    geoprompt()
        .args(["roi", "add", "--db"])
        .arg(&db)
        .args(["--bbox", "5,0,5,10", "--crs", "EPSG:3857"])
        .assert()
        .failure();
    assert!(!db.exists());
}

#[test]
fn export_from_config() {
    let dir = tempfile::tempdir().unwrap();
    write_scene(dir.path());
    let db = dir.path().join("rois.jsonl");
    geoprompt()
        .args(["roi", "add", "--db"])
        .arg(&db)
        .args(["--bbox", "0,0,32,32", "--crs", "EPSG:3857"])
        .assert()
        .success();

    let out = dir.path().join("dataset");
    let config = serde_json::json!({
        "raster": dir.path().join("scene.png"),
        "crs": "EPSG:3857",
        "rois": db,
        "labels": { "kind": "features", "path": dir.path().join("labels.geojson") },
        "output_dir": out,
        "tiling": { "window_size": 8 }
    });
    let config_path = dir.path().join("export.json");
    fs::write(&config_path, config.to_string()).unwrap();

    geoprompt()
        .args(["-v", "export", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("4 tiles, 0 skipped roi(s)"));

    let manifest = Manifest::load_json(out.join(MANIFEST_FILE)).unwrap();
    assert_eq!(manifest.bands, 3);
    assert_eq!(manifest.tiles.len(), 4);
    for i in 0..4 {
        assert!(out.join("images").join(format!("{i:04}.npy")).is_file());
        assert!(out.join("labels").join(format!("{i:04}.npy")).is_file());
    }
}

#[test]
fn export_reprojects_lonlat_rois_onto_utm_raster() {
    let dir = tempfile::tempdir().unwrap();
    let utm = Crs::epsg(32633);
    write_scene_at(dir.path(), &utm, 499_984.0, 5_761_000.0);

    let raster = BoundingBox::new(499_990.0, 5_761_006.0, 500_010.0, 5_761_026.0, utm.clone());
    let roi = ProjReprojector.reproject_bbox(&raster, &Crs::epsg(4326)).unwrap();
    let db = dir.path().join("rois.jsonl");
    geoprompt()
        .args(["roi", "add", "--db"])
        .arg(&db)
        .arg("--bbox")
        .arg(format!("{},{},{},{}", roi.x_min, roi.y_min, roi.x_max, roi.y_max))
        .args(["--crs", "EPSG:4326"])
        .assert()
        .success();

    let out = dir.path().join("dataset");
    let config = serde_json::json!({
        "raster": dir.path().join("scene.png"),
        "crs": "EPSG:32633",
        "rois": db,
        "labels": { "kind": "features", "path": dir.path().join("labels.geojson") },
        "output_dir": out,
        "tiling": { "window_size": 8 }
    });
    let config_path = dir.path().join("export.json");
    fs::write(&config_path, config.to_string()).unwrap();

    geoprompt()
        .args(["export", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 skipped roi(s)"));
    let manifest = Manifest::load_json(out.join(MANIFEST_FILE)).unwrap();
    assert!(!manifest.tiles.is_empty());
}

#[test]
fn export_with_missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    geoprompt()
        .args(["export", "--config"])
        .arg(dir.path().join("nope.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("config"));
}
