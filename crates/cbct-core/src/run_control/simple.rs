//! One chunk per job.

use super::{RunControl, RunState, SimulationHost};
use crate::domain::{CbctResult, RunControlKind};
use tracing::info;

/// Simulates everything that is left in a single chunk. In a parallel run
/// each job takes `ncase/n_parallel` histories and the last job of the set
/// combines the results.
pub struct SimpleControl {
    state: RunState,
}

impl SimpleControl {
    pub fn new(mut state: RunState) -> Self {
        let identity = *state.identity();
        if identity.is_parallel() {
            let share = state.ncase() / u64::from(identity.n_parallel);
            state.set_ncase(share);
        }
        Self { state }
    }
}

impl RunControl for SimpleControl {
    fn kind(&self) -> RunControlKind {
        RunControlKind::Simple
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
        let last = self.state.identity().is_last();
        if last {
            info!(job = self.state.identity().i_parallel, "last job of the parallel set");
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::SimpleControl;
    use crate::domain::ParallelIdentity;
    use crate::run_control::tests::{CountingHost, run_config};
    use crate::run_control::{RunControl, RunPaths, RunState};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn serial_run_takes_everything_at_once() {
        let temp = TempDir::new().expect("tempdir should be created");
        let state = RunState::new(
            &run_config(json!({ "ncase": 900 })),
            ParallelIdentity::serial(),
            RunPaths::new(temp.path(), "scan"),
        );
        let mut control = SimpleControl::new(state);
        let mut host = CountingHost::default();
        assert_eq!(control.next_chunk(&mut host).expect("chunk"), 900);
        assert!(control.start_batch(0, 900));
        assert_eq!(control.next_chunk(&mut host).expect("chunk"), 0);
        assert!(!control.finish_simulation(&mut host).expect("finish"));
    }

    #[test]
    fn parallel_jobs_take_equal_shares_and_the_last_combines() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = run_config(json!({ "ncase": 1000 }));
        let mut host = CountingHost::default();
        let mut combined = Vec::new();
        for i in 1..=3 {
            let identity = ParallelIdentity::new(3, i, 1).expect("identity should build");
            let state = RunState::new(&config, identity, RunPaths::new(temp.path(), "scan"));
            let mut control = SimpleControl::new(state);
            assert_eq!(control.next_chunk(&mut host).expect("chunk"), 333);
            combined.push(control.finish_simulation(&mut host).expect("finish"));
        }
        assert_eq!(combined, vec![false, false, true]);
    }
}
