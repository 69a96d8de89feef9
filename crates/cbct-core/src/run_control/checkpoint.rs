//! `.egsdat` checkpoints and the combination of parallel results.

use super::{RunState, SimulationHost};
use crate::common::constants::MAX_COMBINED_JOBS;
use crate::domain::{CbctError, CbctResult, codes};
use crate::serialization::{CheckpointReader, CheckpointWriter, write_text_artifact};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn checkpoint_text(state: &RunState, host: &dyn SimulationHost) -> String {
    let mut writer = CheckpointWriter::new();
    state.store_state(&mut writer);
    host.output_data(&mut writer);
    writer.into_string()
}

/// Writes the run-control counters followed by the host state.
pub fn write_checkpoint(path: &Path, state: &RunState, host: &dyn SimulationHost) -> CbctResult<()> {
    write_text_artifact(path, &checkpoint_text(state, host)).map_err(|error| {
        CbctError::io_system(
            codes::IO_CHECKPOINT_WRITE,
            format!("failed to write checkpoint '{}': {error}", path.display()),
        )
    })
}

pub fn read_checkpoint(
    path: &Path,
    state: &mut RunState,
    host: &mut dyn SimulationHost,
) -> CbctResult<()> {
    let text = fs::read_to_string(path).map_err(|error| {
        CbctError::io_system(
            codes::IO_CHECKPOINT_READ,
            format!("failed to read checkpoint '{}': {error}", path.display()),
        )
    })?;
    let mut reader = CheckpointReader::new(&text);
    state.set_state(&mut reader)?;
    host.read_data(&mut reader)?;
    ensure_consumed(&reader, path)
}

/// A checkpoint written by a different configuration leaves fields unread.
fn ensure_consumed(reader: &CheckpointReader<'_>, path: &Path) -> CbctResult<()> {
    if reader.is_exhausted() {
        Ok(())
    } else {
        Err(CbctError::io_system(
            codes::IO_CHECKPOINT_TRAILING,
            format!("checkpoint '{}' has unread trailing fields", path.display()),
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombineSummary {
    pub combined: Vec<PathBuf>,
    /// Checkpoints that existed but could not be read.
    pub excluded: Vec<PathBuf>,
    pub ndone: u64,
    pub cpu_time: f64,
}

fn add_file(path: &Path, state: &mut RunState, host: &mut dyn SimulationHost) -> CbctResult<()> {
    let text = fs::read_to_string(path).map_err(|error| {
        CbctError::io_system(
            codes::IO_CHECKPOINT_READ,
            format!("failed to read checkpoint '{}': {error}", path.display()),
        )
    })?;
    let mut reader = CheckpointReader::new(&text);
    state.add_state(&mut reader)?;
    host.add_state(&mut reader)?;
    ensure_consumed(&reader, path)
}

/// Sums `<output>_w1.egsdat` through `<output>_w499.egsdat` into the current
/// state and writes the result to `<output>.egsdat`.
///
/// Unreadable checkpoints are left out of the sum. Finding no checkpoint at
/// all is an error.
pub fn combine_results(
    state: &mut RunState,
    host: &mut dyn SimulationHost,
) -> CbctResult<CombineSummary> {
    state.reset_counter();
    host.reset_counter();
    let mut summary = CombineSummary {
        combined: Vec::new(),
        excluded: Vec::new(),
        ndone: 0,
        cpu_time: 0.0,
    };
    let mut last_cpu = 0.0;
    for job in 1..=MAX_COMBINED_JOBS {
        let path = state.paths().sibling_checkpoint(job);
        if !path.is_file() {
            continue;
        }
        let snapshot = checkpoint_text(state, host);
        match add_file(&path, state, host) {
            Ok(()) => {
                let cpu = state.total_cpu_time();
                info!(
                    file = %path.display(),
                    ncase = state.ndone() - summary.ndone,
                    cpu = cpu - last_cpu,
                    "combined checkpoint"
                );
                summary.ndone = state.ndone();
                last_cpu = cpu;
                summary.combined.push(path);
            }
            Err(error) => {
                warn!(file = %path.display(), %error, "excluding unreadable checkpoint");
                state.reset_counter();
                host.reset_counter();
                let mut reader = CheckpointReader::new(&snapshot);
                state.add_state(&mut reader)?;
                host.add_state(&mut reader)?;
                summary.excluded.push(path);
            }
        }
    }
    if summary.combined.is_empty() {
        return Err(CbctError::io_system(
            codes::IO_COMBINE,
            format!(
                "no readable checkpoints '{}_w*.egsdat' to combine",
                state.paths().stem().display()
            ),
        ));
    }
    summary.cpu_time = last_cpu;
    info!(
        files = summary.combined.len(),
        excluded = summary.excluded.len(),
        ncase = summary.ndone,
        cpu = summary.cpu_time,
        "combined parallel results"
    );
    write_checkpoint(&state.paths().combined_checkpoint(), state, host)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::{combine_results, read_checkpoint, write_checkpoint};
    use crate::domain::ParallelIdentity;
    use crate::run_control::tests::{CountingHost, run_config};
    use crate::run_control::{RunPaths, RunState};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn state(dir: &std::path::Path) -> RunState {
        RunState::new(
            &run_config(json!({})),
            ParallelIdentity::serial(),
            RunPaths::new(dir, "scan"),
        )
    }

    #[test]
    fn checkpoint_round_trips_counters_and_host_state() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut original = state(temp.path());
        assert!(original.start_batch(0, 120));
        let host = CountingHost {
            histories: 120,
            ..CountingHost::default()
        };
        let path = temp.path().join("scan.egsdat");
        write_checkpoint(&path, &original, &host).expect("checkpoint should be written");

        let mut restored = state(temp.path());
        restored.reset_counter();
        let mut restored_host = CountingHost::default();
        read_checkpoint(&path, &mut restored, &mut restored_host)
            .expect("checkpoint should be read");
        assert_eq!(restored.ndone(), 120);
        assert_eq!(restored_host.histories, 120);
    }

    #[test]
    fn combine_sums_readable_siblings_and_skips_broken_ones() {
        let temp = TempDir::new().expect("tempdir should be created");
        fs::write(temp.path().join("scan_w1.egsdat"), "100 2.0\n100\n").expect("write");
        fs::write(temp.path().join("scan_w2.egsdat"), "50 1.0\nbroken\n").expect("write");
        fs::write(temp.path().join("scan_w4.egsdat"), "30 0.5\n30\n").expect("write");

        let mut combined = state(temp.path());
        let mut host = CountingHost::default();
        let summary = combine_results(&mut combined, &mut host).expect("combine should succeed");
        assert_eq!(summary.combined.len(), 2);
        assert_eq!(summary.excluded, vec![temp.path().join("scan_w2.egsdat")]);
        assert_eq!(summary.ndone, 130);
        assert_eq!(combined.ndone(), 130);
        assert_eq!(host.histories, 130);

        let text = fs::read_to_string(temp.path().join("scan.egsdat")).expect("combined file");
        assert!(text.starts_with("130 "));
        assert!(text.ends_with("130\n"));
    }

    #[test]
    fn checkpoint_with_trailing_fields_is_rejected() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("scan.egsdat");
        fs::write(&path, "120 3.0\n120\n7 8\n").expect("write");

        let mut restored = state(temp.path());
        let error = read_checkpoint(&path, &mut restored, &mut CountingHost::default())
            .expect_err("extra fields should be rejected");
        assert_eq!(error.code(), "IO.CHECKPOINT_TRAILING");
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn combine_excludes_checkpoints_with_trailing_fields() {
        let temp = TempDir::new().expect("tempdir should be created");
        fs::write(temp.path().join("scan_w1.egsdat"), "100 2.0\n100\n").expect("write");
        fs::write(temp.path().join("scan_w2.egsdat"), "40 1.0\n40\n40\n").expect("write");

        let mut combined = state(temp.path());
        let mut host = CountingHost::default();
        let summary = combine_results(&mut combined, &mut host).expect("combine should succeed");
        assert_eq!(summary.excluded, vec![temp.path().join("scan_w2.egsdat")]);
        assert_eq!(summary.ndone, 100);
        assert_eq!(host.histories, 100);
    }

    #[test]
    fn combine_without_checkpoints_is_an_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let error = combine_results(&mut state(temp.path()), &mut CountingHost::default())
            .expect_err("nothing to combine");
        assert_eq!(error.code(), "IO.COMBINE");
    }
}
