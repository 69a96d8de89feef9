//! Run control.
//!
//! A run is a sequence of chunks and every chunk is split into batches.
//! Between batches the host is checkpointed and the control object decides
//! whether the time budget or the requested statistical accuracy ends the
//! run early. Parallel jobs share the work statically (simple, uniform) or
//! through a locked job control file (balanced).

mod checkpoint;
mod driver;
mod jcf;
mod lock;
mod simple;
mod uniform;

pub use checkpoint::{CombineSummary, combine_results, read_checkpoint, write_checkpoint};
pub use driver::{RunSummary, batch_split, run_simulation};
pub use jcf::{JcfControl, JcfRecord};
pub use lock::{ControlFile, LockPolicy};
pub use simple::SimpleControl;
pub use uniform::UniformControl;

use crate::common::config::RunControlConfig;
use crate::domain::{CalculationMode, CbctResult, ParallelIdentity, RunControlKind};
use crate::serialization::{CheckpointError, CheckpointReader, CheckpointWriter};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// What run control needs from the application it drives.
pub trait SimulationHost {
    /// Simulates `ncase` further histories.
    fn simulate_chunk(&mut self, ncase: u64) -> CbctResult<()>;

    /// Appends the host's checkpoint fields after the run-control counters.
    fn output_data(&self, writer: &mut CheckpointWriter);

    fn read_data(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError>;

    /// Adds the fields of another job's checkpoint to the current state.
    fn add_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError>;

    fn reset_counter(&mut self);

    /// Monitored quantity of the run so far. Also the place where the host
    /// refreshes anything that changes at batch boundaries.
    fn current_result(&mut self) -> CurrentResult;

    fn describe(&self);

    /// Writes the result files under the given output stem.
    fn write_results(&self, stem: &Path) -> CbctResult<()>;
}

/// Running sums of the quantity used to judge statistical accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CurrentResult {
    pub sum: f64,
    pub sum2: f64,
    pub norm: f64,
    pub count: f64,
}

impl CurrentResult {
    /// Mean and relative uncertainty in percent, or `None` when the sums do
    /// not allow an estimate.
    pub fn estimate(&self) -> Option<(f64, f64)> {
        relative_estimate(self.sum, self.sum2, self.norm, self.count)
    }
}

pub(crate) fn relative_estimate(sum: f64, sum2: f64, norm: f64, count: f64) -> Option<(f64, f64)> {
    if !(sum > 0.0 && sum2 > 0.0 && norm > 0.0 && count > 1.0) {
        return None;
    }
    let f = sum * norm / count;
    let spread = count * sum2 / (sum * sum) - 1.0;
    let df = if spread > 0.0 {
        100.0 * (spread / (count - 1.0)).sqrt()
    } else {
        100.0
    };
    Some((f, df))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Simulate,
    /// Previous state was loaded for result analysis only.
    Analyzed,
    /// Sibling checkpoints were combined; nothing is simulated.
    Combined,
}

/// File names derived from the output stem `<dir>/<output file>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    stem: PathBuf,
}

impl RunPaths {
    pub fn new(dir: &Path, output_file: &str) -> Self {
        Self {
            stem: dir.join(output_file),
        }
    }

    /// Stem of the combined (or serial) result files.
    pub fn stem(&self) -> &Path {
        &self.stem
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.stem.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Stem of this job's own result files.
    pub fn job_stem(&self, identity: &ParallelIdentity) -> PathBuf {
        if identity.is_parallel() {
            self.with_suffix(&format!("_w{}", identity.i_parallel))
        } else {
            self.stem.clone()
        }
    }

    pub fn checkpoint(&self, identity: &ParallelIdentity) -> PathBuf {
        let mut name = self.job_stem(identity).into_os_string();
        name.push(".egsdat");
        PathBuf::from(name)
    }

    pub fn sibling_checkpoint(&self, job: u32) -> PathBuf {
        self.with_suffix(&format!("_w{job}.egsdat"))
    }

    pub fn combined_checkpoint(&self) -> PathBuf {
        self.with_suffix(".egsdat")
    }

    pub fn control_file(&self) -> PathBuf {
        self.with_suffix(".lock")
    }
}

/// Counters and limits shared by every run-control flavour.
#[derive(Debug, Clone)]
pub struct RunState {
    ncase: u64,
    nbatch: usize,
    nchunk: usize,
    ndone: u64,
    previous_cpu_time: f64,
    started: Instant,
    max_cpu_hours: Option<f64>,
    accuracy: Option<f64>,
    calculation: CalculationMode,
    identity: ParallelIdentity,
    paths: RunPaths,
}

impl RunState {
    pub fn new(config: &RunControlConfig, identity: ParallelIdentity, paths: RunPaths) -> Self {
        Self {
            ncase: config.histories(),
            nbatch: config.nbatch.max(1),
            nchunk: config.nchunk.max(1),
            ndone: 0,
            previous_cpu_time: 0.0,
            started: Instant::now(),
            max_cpu_hours: config.max_cpu_hours.filter(|hours| *hours > 0.0),
            accuracy: config.accuracy.filter(|accu| *accu > 0.0),
            calculation: config.calculation,
            identity,
            paths,
        }
    }

    pub fn ncase(&self) -> u64 {
        self.ncase
    }

    pub(crate) fn set_ncase(&mut self, ncase: u64) {
        self.ncase = ncase;
    }

    pub fn ndone(&self) -> u64 {
        self.ndone
    }

    pub fn nbatch(&self) -> usize {
        self.nbatch
    }

    pub fn nchunk(&self) -> usize {
        self.nchunk
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    pub fn calculation(&self) -> CalculationMode {
        self.calculation
    }

    pub fn identity(&self) -> &ParallelIdentity {
        &self.identity
    }

    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    /// Seconds spent in this process.
    pub fn cpu_time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Seconds including the runs this one continues.
    pub fn total_cpu_time(&self) -> f64 {
        self.cpu_time() + self.previous_cpu_time
    }

    pub fn store_state(&self, writer: &mut CheckpointWriter) {
        writer
            .integer(self.ndone)
            .float(self.total_cpu_time())
            .end_line();
    }

    /// Continues from a stored state: the stored histories count as done
    /// and are added on top of the requested ones.
    pub fn set_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
        let ndone = reader.u64("histories done")?;
        self.ndone += ndone;
        self.ncase += ndone;
        self.previous_cpu_time = reader.f64("cpu time")?;
        Ok(())
    }

    pub fn add_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
        let previous = self.previous_cpu_time;
        self.set_state(reader)?;
        self.previous_cpu_time += previous;
        Ok(())
    }

    pub fn reset_counter(&mut self) {
        self.previous_cpu_time = 0.0;
        self.started = Instant::now();
        self.ncase = 0;
        self.ndone = 0;
    }

    /// Common start of every run: loads previous state or combines sibling
    /// results depending on the calculation mode.
    pub fn start(&mut self, host: &mut dyn SimulationHost) -> CbctResult<StartOutcome> {
        match self.calculation {
            CalculationMode::Restart | CalculationMode::Analyze => {
                let path = self.paths.checkpoint(&self.identity);
                read_checkpoint(&path, self, host)?;
                if self.calculation == CalculationMode::Analyze {
                    self.ncase = self.ndone;
                    info!(ndone = self.ndone, "result analysis only");
                    return Ok(StartOutcome::Analyzed);
                }
            }
            CalculationMode::Combine => {
                host.describe();
                info!("combining results only");
                combine_results(self, host)?;
                self.ncase = self.ndone;
                return Ok(StartOutcome::Combined);
            }
            CalculationMode::First => {}
        }
        host.describe();
        if self.calculation == CalculationMode::First {
            info!(ncase = self.ncase, "fresh simulation");
        } else {
            info!(
                old = self.ndone,
                new = self.ncase.saturating_sub(self.ndone),
                "restarted simulation"
            );
        }
        self.started = Instant::now();
        Ok(StartOutcome::Simulate)
    }

    /// `false` when the time budget does not leave room for another batch.
    pub fn start_batch(&mut self, batch: usize, per_batch: u64) -> bool {
        if let Some(hours) = self.max_cpu_hours
            && self.ndone > 0
        {
            let per_history = self.total_cpu_time() / self.ndone as f64;
            let extra = per_history * per_batch as f64;
            if self.cpu_time() + extra > hours * 3600.0 {
                warn!(batch = batch + 1, "not enough time to finish another batch");
                return false;
            }
        }
        self.ndone += per_batch;
        true
    }

    /// Checkpoints the host and reports the batch. `false` once the
    /// requested accuracy is reached.
    pub fn finish_batch(&mut self, batch: usize, host: &mut dyn SimulationHost) -> bool {
        let path = self.paths.checkpoint(&self.identity);
        if let Err(error) = write_checkpoint(&path, self, host) {
            warn!(%error, "checkpoint after batch failed");
        }
        let (f, df) = host.current_result().estimate().unwrap_or((0.0, 100.0));
        info!(
            batch = batch + 1,
            cpu = self.cpu_time(),
            result = f,
            uncertainty = df,
            "batch finished"
        );
        if let Some(accu) = self.accuracy
            && df < 100.0
            && df < accu
        {
            warn!(accuracy = accu, "reached the requested uncertainty");
            return false;
        }
        true
    }

    pub fn report_finish(&self) {
        let total = self.total_cpu_time();
        let rate = if total > 0.0 {
            3600.0 * self.ndone as f64 / total
        } else {
            0.0
        };
        info!(
            cpu_seconds = self.cpu_time(),
            total_cpu_seconds = total,
            histories = self.ndone,
            histories_per_hour = rate,
            "finished simulation"
        );
    }
}

/// A run-control strategy.
pub trait RunControl {
    fn kind(&self) -> RunControlKind;

    fn state(&self) -> &RunState;

    fn state_mut(&mut self) -> &mut RunState;

    fn start_simulation(&mut self, host: &mut dyn SimulationHost) -> CbctResult<StartOutcome> {
        self.state_mut().start(host)
    }

    /// Histories of the next chunk. Zero ends the run.
    fn next_chunk(&mut self, host: &mut dyn SimulationHost) -> CbctResult<u64>;

    fn start_batch(&mut self, batch: usize, per_batch: u64) -> bool {
        self.state_mut().start_batch(batch, per_batch)
    }

    fn finish_batch(&mut self, batch: usize, host: &mut dyn SimulationHost) -> bool {
        self.state_mut().finish_batch(batch, host)
    }

    /// `Ok(true)` when this job has to combine the results of its parallel
    /// set.
    fn finish_simulation(&mut self, host: &mut dyn SimulationHost) -> CbctResult<bool>;

    /// Result combined over every parallel job, when known.
    fn combined_result(&self) -> Option<(f64, f64)> {
        None
    }
}

/// Picks the run-control strategy. A serial run always uses the simple one.
pub fn build_run_control(
    config: &RunControlConfig,
    identity: ParallelIdentity,
    paths: RunPaths,
) -> Box<dyn RunControl> {
    let state = RunState::new(config, identity, paths);
    let requested = config.kind.unwrap_or(if identity.is_parallel() {
        RunControlKind::Balanced
    } else {
        RunControlKind::Simple
    });
    if !identity.is_parallel() {
        if requested != RunControlKind::Simple {
            warn!(kind = %requested, "serial run uses simple run control");
        }
        return Box::new(SimpleControl::new(state));
    }
    match requested {
        RunControlKind::Simple => Box::new(SimpleControl::new(state)),
        RunControlKind::Uniform => Box::new(UniformControl::new(
            state,
            config.watcher_retries,
            config.watcher_interval,
        )),
        RunControlKind::Balanced => Box::new(JcfControl::new(state)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{
        CurrentResult, RunPaths, RunState, SimulationHost, StartOutcome, build_run_control,
        relative_estimate,
    };
    use crate::common::config::RunControlConfig;
    use crate::domain::{CbctResult, ParallelIdentity, RunControlKind};
    use crate::serialization::{CheckpointError, CheckpointReader, CheckpointWriter};
    use approx::assert_relative_eq;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Host that scores one unit per history.
    #[derive(Debug, Default)]
    pub(crate) struct CountingHost {
        pub histories: u64,
        pub chunks: Vec<u64>,
    }

    impl SimulationHost for CountingHost {
        fn simulate_chunk(&mut self, ncase: u64) -> CbctResult<()> {
            self.histories += ncase;
            self.chunks.push(ncase);
            Ok(())
        }

        fn output_data(&self, writer: &mut CheckpointWriter) {
            writer.integer(self.histories).end_line();
        }

        fn read_data(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
            self.histories = reader.u64("histories")?;
            Ok(())
        }

        fn add_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
            self.histories += reader.u64("histories")?;
            Ok(())
        }

        fn reset_counter(&mut self) {
            self.histories = 0;
        }

        fn current_result(&mut self) -> CurrentResult {
            let n = self.histories as f64;
            CurrentResult {
                sum: n,
                sum2: n,
                norm: 1.0,
                count: n,
            }
        }

        fn describe(&self) {}

        fn write_results(&self, _stem: &Path) -> CbctResult<()> {
            Ok(())
        }
    }

    pub(crate) fn run_config(extra: serde_json::Value) -> RunControlConfig {
        let mut value = json!({ "ncase": 1000 });
        if let (Some(base), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(value).expect("run control config should parse")
    }

    #[test]
    fn relative_estimate_matches_the_batch_formula() {
        let (f, df) = relative_estimate(10.0, 30.0, 2.0, 5.0).expect("estimate should exist");
        assert_relative_eq!(f, 4.0);
        let expected = 100.0 * ((5.0 * 30.0 / 100.0 - 1.0) / 4.0_f64).sqrt();
        assert_relative_eq!(df, expected);
        assert!(relative_estimate(0.0, 1.0, 1.0, 5.0).is_none());
        assert!(relative_estimate(1.0, 1.0, 1.0, 1.0).is_none());
        let (_, flat) = relative_estimate(4.0, 4.0, 1.0, 4.0).expect("estimate should exist");
        assert_eq!(flat, 100.0);
    }

    #[test]
    fn paths_follow_the_output_stem() {
        let paths = RunPaths::new(Path::new("/tmp/run"), "scan");
        let job = ParallelIdentity::new(4, 3, 1).expect("identity should build");
        assert_eq!(paths.checkpoint(&job), PathBuf::from("/tmp/run/scan_w3.egsdat"));
        assert_eq!(
            paths.checkpoint(&ParallelIdentity::serial()),
            PathBuf::from("/tmp/run/scan.egsdat")
        );
        assert_eq!(paths.combined_checkpoint(), PathBuf::from("/tmp/run/scan.egsdat"));
        assert_eq!(paths.control_file(), PathBuf::from("/tmp/run/scan.lock"));
        assert_eq!(paths.sibling_checkpoint(12), PathBuf::from("/tmp/run/scan_w12.egsdat"));
    }

    #[test]
    fn state_round_trips_and_restart_extends_the_request() {
        let temp = TempDir::new().expect("tempdir should be created");
        let paths = RunPaths::new(temp.path(), "scan");
        let mut state = RunState::new(&run_config(json!({})), ParallelIdentity::serial(), paths);
        assert!(state.start_batch(0, 250));
        let mut writer = CheckpointWriter::new();
        state.store_state(&mut writer);
        let text = writer.into_string();

        let mut restarted = state.clone();
        restarted.reset_counter();
        restarted.set_ncase(400);
        restarted
            .set_state(&mut CheckpointReader::new(&text))
            .expect("state should restore");
        assert_eq!(restarted.ndone(), 250);
        assert_eq!(restarted.ncase(), 650);

        restarted
            .add_state(&mut CheckpointReader::new(&text))
            .expect("state should combine");
        assert_eq!(restarted.ndone(), 500);
    }

    #[test]
    fn exhausted_time_budget_refuses_the_next_batch() {
        let temp = TempDir::new().expect("tempdir should be created");
        let paths = RunPaths::new(temp.path(), "scan");
        let config = run_config(json!({ "max cpu hours allowed": 1.0e-12 }));
        let mut state = RunState::new(&config, ParallelIdentity::serial(), paths);
        assert!(state.start_batch(0, 10), "first batch has no timing yet");
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(!state.start_batch(1, 10));
        assert_eq!(state.ndone(), 10);
    }

    #[test]
    fn accuracy_target_stops_after_the_batch() {
        let temp = TempDir::new().expect("tempdir should be created");
        let paths = RunPaths::new(temp.path(), "scan");
        let config = run_config(json!({ "statistical accuracy sought": 50.0 }));
        let mut state = RunState::new(&config, ParallelIdentity::serial(), paths.clone());
        let mut host = NoisyHost;
        assert!(!state.finish_batch(0, &mut host));
        assert!(paths.checkpoint(&ParallelIdentity::serial()).exists());
    }

    #[test]
    fn analyze_mode_loads_previous_histories() {
        let temp = TempDir::new().expect("tempdir should be created");
        let paths = RunPaths::new(temp.path(), "scan");
        std::fs::write(paths.combined_checkpoint(), "300 12.5\n300\n")
            .expect("checkpoint should be written");
        let config = run_config(json!({ "calculation": "analyze" }));
        let mut state = RunState::new(&config, ParallelIdentity::serial(), paths);
        let mut host = CountingHost::default();
        let outcome = state.start(&mut host).expect("analysis should start");
        assert_eq!(outcome, StartOutcome::Analyzed);
        assert_eq!(state.ncase(), 300);
        assert_eq!(host.histories, 300);
    }

    #[test]
    fn restart_without_checkpoint_is_an_io_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let paths = RunPaths::new(temp.path(), "scan");
        let config = run_config(json!({ "calculation": "restart" }));
        let mut state = RunState::new(&config, ParallelIdentity::serial(), paths);
        let error = state
            .start(&mut CountingHost::default())
            .expect_err("missing checkpoint should fail");
        assert_eq!(error.code(), "IO.CHECKPOINT_READ");
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn serial_runs_always_use_simple_control() {
        let temp = TempDir::new().expect("tempdir should be created");
        let paths = RunPaths::new(temp.path(), "scan");
        let config = run_config(json!({ "rco type": "balanced" }));
        let control = build_run_control(&config, ParallelIdentity::serial(), paths.clone());
        assert_eq!(control.kind(), RunControlKind::Simple);

        let job = ParallelIdentity::new(2, 1, 1).expect("identity should build");
        let control = build_run_control(&run_config(json!({})), job, paths);
        assert_eq!(control.kind(), RunControlKind::Balanced);
    }

    /// Host whose result is already precise to a few percent.
    struct NoisyHost;

    impl SimulationHost for NoisyHost {
        fn simulate_chunk(&mut self, _ncase: u64) -> CbctResult<()> {
            Ok(())
        }
        fn output_data(&self, writer: &mut CheckpointWriter) {
            writer.integer(0).end_line();
        }
        fn read_data(&mut self, _reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
            Ok(())
        }
        fn add_state(&mut self, _reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
            Ok(())
        }
        fn reset_counter(&mut self) {}
        fn current_result(&mut self) -> CurrentResult {
            CurrentResult {
                sum: 100.0,
                sum2: 101.0,
                norm: 1.0,
                count: 100.0,
            }
        }
        fn describe(&self) {}
        fn write_results(&self, _stem: &Path) -> CbctResult<()> {
            Ok(())
        }
    }
}
