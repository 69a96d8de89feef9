//! The chunk and batch loop.

use super::{RunControl, SimulationHost, StartOutcome, combine_results};
use crate::domain::CbctResult;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: StartOutcome,
    /// Histories accounted for in the written results.
    pub ndone: u64,
    /// Whether this job combined the results of its parallel set.
    pub combined: bool,
}

/// Number of batches and histories per batch for a chunk. Chunks smaller
/// than the batch count run one history per batch.
pub fn batch_split(ncase: u64, nbatch: usize) -> (usize, u64) {
    let per_batch = ncase / nbatch.max(1) as u64;
    if per_batch == 0 {
        (ncase as usize, 1)
    } else {
        (nbatch.max(1), per_batch)
    }
}

/// Runs the simulation under `control` and writes the results.
pub fn run_simulation(
    control: &mut dyn RunControl,
    host: &mut dyn SimulationHost,
) -> CbctResult<RunSummary> {
    let outcome = control.start_simulation(host)?;
    if outcome != StartOutcome::Simulate {
        let state = control.state();
        let stem = match outcome {
            StartOutcome::Combined => state.paths().stem().to_path_buf(),
            _ => state.paths().job_stem(state.identity()),
        };
        host.write_results(&stem)?;
        return Ok(RunSummary {
            outcome,
            ndone: control.state().ndone(),
            combined: outcome == StartOutcome::Combined,
        });
    }

    'chunks: loop {
        let ncase = control.next_chunk(host)?;
        if ncase == 0 {
            break;
        }
        info!(ncase, "running histories");
        if let Some((f, df)) = control.combined_result() {
            info!(result = f, uncertainty = df, "combined result of all parallel jobs");
        }
        let (nbatch, per_batch) = batch_split(ncase, control.state().nbatch());
        for batch in 0..nbatch {
            if !control.start_batch(batch, per_batch) {
                break 'chunks;
            }
            host.simulate_chunk(per_batch)?;
            if !control.finish_batch(batch, host) {
                break 'chunks;
            }
        }
    }

    let combine = control.finish_simulation(host)?;
    let state = control.state();
    host.write_results(&state.paths().job_stem(state.identity()))?;
    let mut ndone = state.ndone();
    if combine {
        let summary = combine_results(control.state_mut(), host)?;
        ndone = summary.ndone;
        host.write_results(control.state().paths().stem())?;
    }
    Ok(RunSummary {
        outcome,
        ndone,
        combined: combine,
    })
}

#[cfg(test)]
mod tests {
    use super::{batch_split, run_simulation};
    use crate::domain::ParallelIdentity;
    use crate::run_control::tests::{CountingHost, run_config};
    use crate::run_control::{
        RunPaths, RunState, SimpleControl, StartOutcome, build_run_control,
    };
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn batches_divide_the_chunk() {
        assert_eq!(batch_split(1000, 10), (10, 100));
        assert_eq!(batch_split(1005, 10), (10, 100));
        assert_eq!(batch_split(7, 10), (7, 1));
        assert_eq!(batch_split(0, 10), (0, 1));
    }

    #[test]
    fn serial_run_checkpoints_every_batch() {
        let temp = TempDir::new().expect("tempdir should be created");
        let state = RunState::new(
            &run_config(json!({ "ncase": 1000, "nbatch": 4 })),
            ParallelIdentity::serial(),
            RunPaths::new(temp.path(), "scan"),
        );
        let mut control = SimpleControl::new(state);
        let mut host = CountingHost::default();
        let summary = run_simulation(&mut control, &mut host).expect("run should finish");
        assert_eq!(summary.outcome, StartOutcome::Simulate);
        assert_eq!(summary.ndone, 1000);
        assert!(!summary.combined);
        assert_eq!(host.chunks, vec![250; 4]);
        let text = std::fs::read_to_string(temp.path().join("scan.egsdat"))
            .expect("checkpoint should exist");
        assert!(text.starts_with("1000 "));
    }

    #[test]
    fn restart_adds_the_new_histories_to_the_old_ones() {
        let temp = TempDir::new().expect("tempdir should be created");
        let paths = RunPaths::new(temp.path(), "scan");
        let first = run_config(json!({ "ncase": 400, "nbatch": 2 }));
        let mut control = build_run_control(&first, ParallelIdentity::serial(), paths.clone());
        run_simulation(control.as_mut(), &mut CountingHost::default()).expect("first run");

        let restart = run_config(json!({ "ncase": 600, "nbatch": 3, "calculation": "restart" }));
        let mut control = build_run_control(&restart, ParallelIdentity::serial(), paths);
        let mut host = CountingHost::default();
        let summary = run_simulation(control.as_mut(), &mut host).expect("restarted run");
        assert_eq!(summary.ndone, 1000);
        assert_eq!(host.histories, 1000);
        assert_eq!(host.chunks, vec![200; 3]);
    }

    #[test]
    fn last_simple_job_combines_its_siblings() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = run_config(json!({ "ncase": 300, "nbatch": 1, "rco type": "simple" }));
        let mut last = None;
        for i in 1..=3 {
            let identity = ParallelIdentity::new(3, i, 1).expect("identity should build");
            let mut control =
                build_run_control(&config, identity, RunPaths::new(temp.path(), "scan"));
            let mut host = CountingHost::default();
            last = Some(run_simulation(control.as_mut(), &mut host).expect("job should run"));
            assert!(temp.path().join(format!("scan_w{i}.egsdat")).exists());
        }
        let summary = last.expect("three jobs ran");
        assert!(summary.combined);
        assert_eq!(summary.ndone, 300);
        assert!(temp.path().join("scan.egsdat").exists());
    }

    #[test]
    fn combine_mode_simulates_nothing() {
        let temp = TempDir::new().expect("tempdir should be created");
        std::fs::write(temp.path().join("scan_w1.egsdat"), "10 1.0\n10\n").expect("write");
        let config = run_config(json!({ "calculation": "combine" }));
        let mut control =
            build_run_control(&config, ParallelIdentity::serial(), RunPaths::new(temp.path(), "scan"));
        let mut host = CountingHost::default();
        let summary = run_simulation(control.as_mut(), &mut host).expect("combine should run");
        assert_eq!(summary.outcome, StartOutcome::Combined);
        assert_eq!(summary.ndone, 10);
        assert!(host.chunks.is_empty());
    }
}
