//! Fixed shares without a shared control file.
//!
//! Each job simulates its share independently. The last job of the set acts
//! as the watcher: once done, it polls the siblings' checkpoints until every
//! sibling has recorded its full share, then combines.

use super::{RunControl, RunState, SimulationHost};
use crate::domain::{CbctResult, ParallelIdentity, RunControlKind};
use crate::serialization::CheckpointReader;
use std::fs;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

pub struct UniformControl {
    state: RunState,
    total: u64,
    retries: u32,
    interval: Duration,
}

/// Histories assigned to the job at `offset`; the first `ncase mod n` jobs
/// take one extra.
pub(crate) fn share(ncase: u64, n_parallel: u32, offset: u32) -> u64 {
    let n = u64::from(n_parallel.max(1));
    ncase / n + u64::from(u64::from(offset) < ncase % n)
}

impl UniformControl {
    pub fn new(mut state: RunState, retries: u32, interval_seconds: f64) -> Self {
        let total = state.ncase();
        let identity = *state.identity();
        if identity.is_parallel() {
            state.set_ncase(share(total, identity.n_parallel, identity.offset()));
        }
        Self {
            state,
            total,
            retries,
            interval: Duration::from_secs_f64(interval_seconds.max(0.0)),
        }
    }

    /// Histories recorded in a sibling's checkpoint, if it can be read.
    fn recorded(&self, job: u32) -> Option<u64> {
        let text = fs::read_to_string(self.state.paths().sibling_checkpoint(job)).ok()?;
        CheckpointReader::new(&text).u64("histories done").ok()
    }

    /// Siblings that have not yet checkpointed their full share.
    fn incomplete(&self, identity: &ParallelIdentity) -> Vec<u32> {
        (0..identity.n_parallel)
            .filter(|offset| {
                let job = identity.first_parallel + offset;
                let wanted = share(self.total, identity.n_parallel, *offset);
                self.recorded(job).is_none_or(|done| done < wanted)
            })
            .map(|offset| identity.first_parallel + offset)
            .collect()
    }
}

impl RunControl for UniformControl {
    fn kind(&self) -> RunControlKind {
        RunControlKind::Uniform
    }

    fn state(&self) -> &RunState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RunState {
        &mut self.state
    }

    fn next_chunk(&mut self, _host: &mut dyn SimulationHost) -> CbctResult<u64> {
        Ok(self.state.ncase().saturating_sub(self.state.ndone()))
    }

    fn finish_simulation(&mut self, _host: &mut dyn SimulationHost) -> CbctResult<bool> {
        self.state.report_finish();
        let identity = *self.state.identity();
        if !identity.is_last() {
            return Ok(false);
        }
        let mut pending = self.incomplete(&identity);
        for attempt in 0..self.retries {
            if pending.is_empty() {
                break;
            }
            info!(
                attempt = attempt + 1,
                waiting_for = ?pending,
                "watcher waiting for parallel jobs"
            );
            thread::sleep(self.interval);
            pending = self.incomplete(&identity);
        }
        if !pending.is_empty() {
            warn!(
                incomplete = ?pending,
                "combining although some jobs did not finish their share"
            );
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::{UniformControl, share};
    use crate::domain::ParallelIdentity;
    use crate::run_control::tests::{CountingHost, run_config};
    use crate::run_control::{RunControl, RunPaths, RunState};
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn job(dir: &Path, i: u32) -> UniformControl {
        let identity = ParallelIdentity::new(3, i, 1).expect("identity should build");
        let state = RunState::new(
            &run_config(json!({ "ncase": 1001 })),
            identity,
            RunPaths::new(dir, "scan"),
        );
        UniformControl::new(state, 2, 0.0)
    }

    #[test]
    fn shares_add_up_to_the_request() {
        let shares: Vec<u64> = (0..3).map(|offset| share(1001, 3, offset)).collect();
        assert_eq!(shares, vec![334, 334, 333]);
        assert_eq!(share(5, 0, 0), 5);
    }

    #[test]
    fn only_the_watcher_combines_and_waits_for_complete_shares() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut host = CountingHost::default();
        let mut first = job(temp.path(), 1);
        assert_eq!(first.next_chunk(&mut host).expect("chunk"), 334);
        assert!(!first.finish_simulation(&mut host).expect("finish"));

        fs::write(temp.path().join("scan_w1.egsdat"), "334 1.0\n").expect("write checkpoint");
        fs::write(temp.path().join("scan_w2.egsdat"), "100 1.0\n").expect("write checkpoint");
        fs::write(temp.path().join("scan_w3.egsdat"), "333 1.0\n").expect("write checkpoint");
        let watcher = job(temp.path(), 3);
        let identity = *watcher.state().identity();
        assert_eq!(watcher.incomplete(&identity), vec![2]);

        fs::write(temp.path().join("scan_w2.egsdat"), "334 1.0\n").expect("write checkpoint");
        assert!(watcher.incomplete(&identity).is_empty());
    }

    #[test]
    fn watcher_combines_after_its_retries_run_out() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut watcher = job(temp.path(), 3);
        let done = watcher
            .finish_simulation(&mut CountingHost::default())
            .expect("watcher finishes");
        assert!(done);
    }
}
