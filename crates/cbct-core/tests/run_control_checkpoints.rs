use approx::assert_relative_eq;
use cbct_core::run_control::StartOutcome;
use cbct_core::{ParallelIdentity, SimulationConfig, run_scan};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn config(run_control: Value) -> SimulationConfig {
    let config = json!({
        "output file": "scan",
        "media": [
            {
                "name": "water",
                "density": 1.0,
                "energies": [0.01, 0.1, 1.0],
                "mu over rho": [5.33, 0.1707, 0.0707],
                "muen over rho": [4.94, 0.02546, 0.03103],
                "coherent fraction": [0.05, 0.02, 0.001],
                "photo fraction": [0.9, 0.02, 0.0]
            },
            {
                "name": "air",
                "density": 0.0012,
                "energies": [0.01, 0.1, 1.0],
                "mu over rho": [5.12, 0.1541, 0.0636],
                "muen over rho": [4.74, 0.02325, 0.02789]
            }
        ],
        "geometry": {
            "x planes": [-5.0, 0.0, 5.0],
            "y planes": [-5.0, 5.0],
            "z planes": [0.0, 5.0],
            "media": ["water", "water"]
        },
        "source": {
            "type": "point",
            "position": [0.0, 0.0, -50.0],
            "target center": [0.0, 0.0, 0.0],
            "target x axis": [1.0, 0.0, 0.0],
            "target y axis": [0.0, 1.0, 0.0],
            "target size": [4.0, 4.0],
            "energy": 0.06
        },
        "scoring plane": {
            "midpoint": [0.0, 0.0, 30.0],
            "normal": [0.0, 0.0, 1.0],
            "x axis": [1.0, 0.0, 0.0],
            "size": [6.0, 6.0],
            "pixels": [3, 3],
            "muen medium": "air"
        },
        "variance reduction": {
            "FS splitting": [4, 8],
            "delta transport medium": "water"
        },
        "run control": run_control
    });
    SimulationConfig::from_json_str(&config.to_string()).expect("config should parse")
}

fn scan_values(path: &Path) -> Vec<f64> {
    fs::read_to_string(path)
        .expect("scan should exist")
        .lines()
        .filter(|line| !line.starts_with('#'))
        .flat_map(|line| {
            line.split_whitespace()
                .map(|field| field.parse::<f64>().expect("numeric field"))
                .collect::<Vec<_>>()
        })
        .collect()
}

#[test]
fn restart_continues_the_same_histories() {
    let straight = TempDir::new().expect("tempdir should be created");
    let summary = run_scan(
        &config(json!({ "ncase": 400, "nbatch": 2 })),
        ParallelIdentity::serial(),
        straight.path(),
    )
    .expect("uninterrupted run");
    assert_eq!(summary.ndone, 400);

    let split = TempDir::new().expect("tempdir should be created");
    run_scan(
        &config(json!({ "ncase": 200, "nbatch": 1 })),
        ParallelIdentity::serial(),
        split.path(),
    )
    .expect("first half");
    let summary = run_scan(
        &config(json!({ "ncase": 200, "nbatch": 1, "calculation": "restart" })),
        ParallelIdentity::serial(),
        split.path(),
    )
    .expect("restarted half");
    assert_eq!(summary.ndone, 400);

    let expected = scan_values(&straight.path().join("scan.scan"));
    let restarted = scan_values(&split.path().join("scan.scan"));
    assert_eq!(expected.len(), restarted.len());
    for (a, b) in expected.iter().zip(&restarted) {
        assert_relative_eq!(*a, *b, max_relative = 1e-9);
    }
}

#[test]
fn analyze_rewrites_results_without_simulating() {
    let temp = TempDir::new().expect("tempdir should be created");
    run_scan(
        &config(json!({ "ncase": 150, "nbatch": 3 })),
        ParallelIdentity::serial(),
        temp.path(),
    )
    .expect("first run");
    let first = scan_values(&temp.path().join("scan.scan"));
    fs::remove_file(temp.path().join("scan.scan")).expect("scan should be removable");

    let summary = run_scan(
        &config(json!({ "ncase": 150, "calculation": "analyze" })),
        ParallelIdentity::serial(),
        temp.path(),
    )
    .expect("analysis");
    assert_eq!(summary.outcome, StartOutcome::Analyzed);
    assert_eq!(summary.ndone, 150);
    assert_eq!(scan_values(&temp.path().join("scan.scan")), first);
}

#[test]
fn uniform_jobs_combine_into_the_full_request() {
    let temp = TempDir::new().expect("tempdir should be created");
    let config = config(json!({
        "ncase": 301,
        "nbatch": 1,
        "rco type": "uniform",
        "watcher retries": 1,
        "watcher interval": 0.0
    }));
    let mut last = None;
    for job in 1..=3 {
        let identity = ParallelIdentity::new(3, job, 1).expect("identity should build");
        last = Some(run_scan(&config, identity, temp.path()).expect("job should run"));
    }
    let summary = last.expect("three jobs ran");
    assert!(summary.combined);
    assert_eq!(summary.ndone, 301);
    for job in 1..=3 {
        assert!(temp.path().join(format!("scan_w{job}.egsdat")).is_file());
    }
    let combined =
        fs::read_to_string(temp.path().join("scan.egsdat")).expect("combined checkpoint");
    assert!(combined.starts_with("301 "));
}

#[test]
fn combine_mode_merges_existing_job_checkpoints() {
    let temp = TempDir::new().expect("tempdir should be created");
    let jobs = config(json!({ "ncase": 200, "nbatch": 1, "rco type": "simple" }));
    for job in 1..=2 {
        let identity = ParallelIdentity::new(2, job, 1).expect("identity should build");
        run_scan(&jobs, identity, temp.path()).expect("job should run");
    }
    let combined_by_job = scan_values(&temp.path().join("scan.scan"));
    fs::remove_file(temp.path().join("scan.egsdat")).expect("combined checkpoint removable");

    let summary = run_scan(
        &config(json!({ "ncase": 200, "calculation": "combine" })),
        ParallelIdentity::serial(),
        temp.path(),
    )
    .expect("combine run");
    assert_eq!(summary.outcome, StartOutcome::Combined);
    assert_eq!(summary.ndone, 200);
    let recombined = scan_values(&temp.path().join("scan.scan"));
    for (a, b) in combined_by_job.iter().zip(&recombined) {
        assert_relative_eq!(*a, *b, max_relative = 1e-9);
    }
}
