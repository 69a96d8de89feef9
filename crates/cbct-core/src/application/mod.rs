//! The CBCT scan application: source, transport engine and detector scores
//! driven by run control.

mod output;
mod setup;

pub use output::{render_scan, scan_path, write_scan};
pub use setup::build_transport;

use crate::common::config::{SimulationConfig, SplitterSignal};
use crate::domain::{CbctResult, ParallelIdentity};
use crate::numerics::RandomGenerator;
use crate::run_control::{
    CurrentResult, RunControl, RunPaths, RunSummary, SimulationHost, build_run_control,
    run_simulation,
};
use crate::serialization::{CheckpointError, CheckpointReader, CheckpointWriter};
use crate::source::Source;
use crate::transport::TransportEngine;
use std::path::Path;
use tracing::{debug, info};

pub struct CbctApplication {
    source: Source,
    engine: TransportEngine,
    current_case: u64,
    signal: Option<SplitterSignal>,
    batches: usize,
}

impl CbctApplication {
    /// Builds the application for one job. Parallel jobs draw from separate
    /// generator streams of the same seed.
    pub fn from_config(config: &SimulationConfig, identity: &ParallelIdentity) -> CbctResult<Self> {
        let source = Source::from_config(&config.source)?;
        let setup = build_transport(config)?;
        let rng = RandomGenerator::new(config.rng.seed, u64::from(identity.i_parallel));
        let engine = TransportEngine::new(setup, rng)?;
        let signal = config
            .variance_reduction
            .splitter
            .as_ref()
            .map(|setup| setup.signal)
            .filter(|_| engine.policy().splitter().is_some());
        Ok(Self {
            source,
            engine,
            current_case: 0,
            signal,
            batches: 0,
        })
    }

    pub fn current_case(&self) -> u64 {
        self.current_case
    }

    pub fn engine(&self) -> &TransportEngine {
        &self.engine
    }

    pub fn source(&self) -> &Source {
        &self.source
    }
}

impl SimulationHost for CbctApplication {
    fn simulate_chunk(&mut self, ncase: u64) -> CbctResult<()> {
        for _ in 0..ncase {
            self.current_case += 1;
            let particle = self.source.next_particle(self.engine.rng_mut());
            self.engine.start_history(self.current_case);
            self.engine.transport_source_particle(particle)?;
        }
        Ok(())
    }

    fn output_data(&self, writer: &mut CheckpointWriter) {
        writer.integer(self.current_case).end_line();
        self.engine.rng().store_state(writer);
        self.source.store_state(writer);
        self.engine.store_state(writer);
    }

    fn read_data(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
        self.current_case = reader.u64("current case")?;
        self.engine.rng_mut().set_state(reader)?;
        self.source.set_state(reader)?;
        self.engine.set_state(reader)
    }

    fn add_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
        self.current_case += reader.u64("current case")?;
        self.engine.rng_mut().add_state(reader)?;
        self.source.add_state(reader)?;
        self.engine.add_state(reader)
    }

    fn reset_counter(&mut self) {
        self.current_case = 0;
        self.engine.rng_mut().reset_counter();
        self.source.reset_counter();
        self.engine.reset_counter();
    }

    fn current_result(&mut self) -> CurrentResult {
        if let Some(signal) = self.signal {
            self.engine.update_importances(signal);
            if let Some(splitter) = self.engine.policy().splitter() {
                debug!(
                    average_splitting = splitter.average_splitting(),
                    scoring_voxels = splitter.scoring_voxels(),
                    "splitter importances updated"
                );
            }
        }
        self.engine.diagnostics().log_batch(self.batches);
        self.batches += 1;
        let pixel = self.engine.plane().central_pixel();
        let (sum, sum2) = self.engine.scores().total().accumulated_score(pixel);
        CurrentResult {
            sum,
            sum2,
            norm: 1.0,
            count: self.current_case as f64,
        }
    }

    fn describe(&self) {
        self.source.describe();
        let settings = self.engine.settings();
        info!(
            scoring = %settings.scoring,
            pixels = self.engine.plane().pixels(),
            rayleigh = self.engine.attenuation().rayleigh(),
            photon_cutoff = settings.photon_cutoff,
            "CBCT scan"
        );
        if let (Some(signal), Some(splitter)) = (self.signal, self.engine.policy().splitter()) {
            splitter.describe(signal);
        }
    }

    fn write_results(&self, stem: &Path) -> CbctResult<()> {
        self.engine.diagnostics().log_summary();
        let plane = self.engine.plane();
        let scores = self.engine.scores();
        let (kerma, sigma) = scores.total().current_result(plane.central_pixel());
        info!(
            histories = self.current_case,
            central_kerma = kerma,
            central_uncertainty = sigma,
            "scan result"
        );
        let path = write_scan(stem, plane, scores, self.current_case)?;
        info!(file = %path.display(), "wrote scan");
        Ok(())
    }
}

/// Runs one job of a scan: builds the application and the configured run
/// control and writes results under `output_dir`.
pub fn run_scan(
    config: &SimulationConfig,
    identity: ParallelIdentity,
    output_dir: &Path,
) -> CbctResult<RunSummary> {
    let mut application = CbctApplication::from_config(config, &identity)?;
    let paths = RunPaths::new(output_dir, &config.output_file);
    let mut control = build_run_control(&config.run_control, identity, paths);
    info!(
        rco = %control.kind(),
        calculation = %config.run_control.calculation,
        ncase = config.run_control.histories(),
        job = identity.i_parallel,
        "starting run"
    );
    run_simulation(control.as_mut(), &mut application)
}

#[cfg(test)]
mod tests {
    use super::{CbctApplication, run_scan};
    use crate::common::SimulationConfig;
    use crate::common::config::tests::water_slab_config;
    use crate::domain::ParallelIdentity;
    use crate::run_control::{SimulationHost, StartOutcome};
    use crate::serialization::{CheckpointReader, CheckpointWriter};
    use serde_json::json;
    use tempfile::TempDir;

    fn config(extra: serde_json::Value) -> SimulationConfig {
        let mut value = water_slab_config();
        if let (Some(target), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            for (key, entry) in extra {
                target.insert(key.clone(), entry.clone());
            }
        }
        SimulationConfig::from_json_str(&value.to_string()).expect("config should parse")
    }

    #[test]
    fn histories_are_numbered_and_scored_at_the_central_pixel() {
        let mut app = CbctApplication::from_config(&config(json!({})), &ParallelIdentity::serial())
            .expect("application should build");
        app.simulate_chunk(50).expect("chunk should run");
        assert_eq!(app.current_case(), 50);
        assert_eq!(app.source().emitted(), 50);

        let result = app.current_result();
        assert_eq!(result.count, 50.0);
        assert_eq!(result.norm, 1.0);
        assert!(result.sum > 0.0);
        assert!(result.sum2 > 0.0);
    }

    #[test]
    fn state_restores_into_a_fresh_application() {
        let config = config(json!({}));
        let mut app = CbctApplication::from_config(&config, &ParallelIdentity::serial())
            .expect("application should build");
        app.simulate_chunk(20).expect("chunk should run");
        let mut writer = CheckpointWriter::new();
        app.output_data(&mut writer);
        let text = writer.into_string();
        assert!(text.starts_with("20\n"));

        let mut restored = CbctApplication::from_config(&config, &ParallelIdentity::serial())
            .expect("application should build");
        restored
            .read_data(&mut CheckpointReader::new(&text))
            .expect("state should load");
        assert_eq!(restored.current_case(), 20);
        let mut again = CheckpointWriter::new();
        restored.output_data(&mut again);
        assert_eq!(again.into_string(), text);

        restored
            .add_state(&mut CheckpointReader::new(&text))
            .expect("state should add");
        assert_eq!(restored.current_case(), 40);
        assert_eq!(restored.source().emitted(), 40);
        restored.reset_counter();
        assert_eq!(restored.current_case(), 0);
    }

    #[test]
    fn serial_scan_writes_checkpoint_and_scan() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = config(json!({ "run control": { "ncase": 200, "nbatch": 2 } }));
        let summary = run_scan(&config, ParallelIdentity::serial(), temp.path())
            .expect("scan should run");
        assert_eq!(summary.outcome, StartOutcome::Simulate);
        assert_eq!(summary.ndone, 200);
        assert!(temp.path().join("slab.egsdat").is_file());
        let scan = std::fs::read_to_string(temp.path().join("slab.scan")).expect("scan file");
        assert_eq!(scan.lines().filter(|line| !line.starts_with('#')).count(), 1);
    }
}
