//! Balanced run control through a shared job control file.
//!
//! Every job takes its next chunk from a counter of histories left in
//! `<output>.lock`. Chunks are `ncase/(n_parallel·nchunk)` histories, so fast
//! jobs simply come back more often. The jobs also pool their results in the
//! file and stop together once the combined uncertainty is small enough.

use super::lock::{ControlFile, LockPolicy};
use super::{RunControl, RunState, SimulationHost, StartOutcome, relative_estimate};
use crate::domain::{CbctError, CbctResult, RunControlKind, codes};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// The shared counters, stored as one line of text.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JcfRecord {
    pub ntot: u64,
    pub nleft: u64,
    pub njob: i64,
    pub tsum: f64,
    pub tsum2: f64,
    pub tcount: f64,
    pub start_time: i64,
}

impl JcfRecord {
    pub fn combined(&self, norm: f64) -> Option<(f64, f64)> {
        relative_estimate(self.tsum, self.tsum2, norm, self.tcount)
    }

    /// `ntot nleft njob tsum tsum2 tcount f df start_time `
    pub fn encode(&self, norm: f64) -> String {
        let (f, df) = self
            .combined(norm)
            .unwrap_or((self.tsum * norm, 100.0));
        format!(
            "{} {} {} {} {} {} {} {} {} ",
            self.ntot, self.nleft, self.njob, self.tsum, self.tsum2, self.tcount, f, df, self.start_time
        )
    }

    /// Parses a record; all nine fields must be present.
    pub fn decode(text: &str) -> Option<Self> {
        let mut fields = text.split_whitespace();
        let record = Self {
            ntot: fields.next()?.parse().ok()?,
            nleft: fields.next()?.parse().ok()?,
            njob: fields.next()?.parse().ok()?,
            tsum: fields.next()?.parse().ok()?,
            tsum2: fields.next()?.parse().ok()?,
            tcount: fields.next()?.parse().ok()?,
            start_time: 0,
        };
        let _f: f64 = fields.next()?.parse().ok()?;
        let _df: f64 = fields.next()?.parse().ok()?;
        let start_time = fields.next()?.parse().ok()?;
        Some(Self {
            start_time,
            ..record
        })
    }
}

pub struct JcfControl {
    state: RunState,
    policy: LockPolicy,
    file: Option<ControlFile>,
    record: JcfRecord,
    norm: f64,
    last_sum: f64,
    last_sum2: f64,
    last_count: f64,
    first_call: bool,
    removed: bool,
}

impl JcfControl {
    pub fn new(state: RunState) -> Self {
        Self::with_policy(state, LockPolicy::default())
    }

    pub fn with_policy(state: RunState, policy: LockPolicy) -> Self {
        let record = JcfRecord {
            nleft: state.ncase(),
            ..JcfRecord::default()
        };
        Self {
            state,
            policy,
            file: None,
            record,
            norm: 1.0,
            last_sum: 0.0,
            last_sum2: 0.0,
            last_count: 0.0,
            first_call: true,
            removed: false,
        }
    }

    /// Counters as last read from or written to the control file.
    pub fn record(&self) -> &JcfRecord {
        &self.record
    }

    fn file(&mut self) -> CbctResult<&mut ControlFile> {
        self.file.as_mut().ok_or_else(|| {
            CbctError::internal(codes::RUN_JCF_STATE, "job control file used before the run started")
        })
    }

    fn read_control(&mut self) -> CbctResult<()> {
        let text = self.file()?.read_record()?;
        match JcfRecord::decode(&text) {
            Some(record) => {
                self.record = record;
                Ok(())
            }
            None => {
                self.file()?.unlock()?;
                Err(CbctError::io_system(
                    codes::IO_JCF_READ,
                    format!("malformed job control record <{text}>"),
                ))
            }
        }
    }

    fn write_control(&mut self) -> CbctResult<()> {
        if self.first_call && self.record.start_time == 0 {
            self.record.start_time = unix_time();
        }
        let text = self.record.encode(self.norm);
        self.file()?.write_record(&text)
    }
}

fn unix_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}

impl RunControl for JcfControl {
    fn kind(&self) -> RunControlKind {
        RunControlKind::Balanced
    }

    fn state(&self) -> &RunState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RunState {
        &mut self.state
    }

    fn start_simulation(&mut self, host: &mut dyn SimulationHost) -> CbctResult<StartOutcome> {
        let outcome = self.state.start(host)?;
        if outcome != StartOutcome::Simulate {
            return Ok(outcome);
        }
        let path = self.state.paths().control_file();
        let identity = *self.state.identity();
        if identity.is_first() {
            self.file = Some(ControlFile::create(&path, self.policy)?);
            self.record = JcfRecord {
                nleft: self.state.ncase(),
                ..JcfRecord::default()
            };
            self.write_control()?;
        } else {
            self.file = Some(ControlFile::open(&path, self.policy)?);
        }
        info!(
            jobs = identity.n_parallel,
            chunks = self.state.nchunk(),
            "parallel run through a job control file"
        );
        Ok(outcome)
    }

    fn next_chunk(&mut self, host: &mut dyn SimulationHost) -> CbctResult<u64> {
        self.read_control()?;
        if self.first_call {
            self.first_call = false;
            self.record.njob += 1;
        }
        let current = host.current_result();
        self.norm = current.norm;
        self.record.tsum += current.sum - self.last_sum;
        self.record.tsum2 += current.sum2 - self.last_sum2;
        self.record.tcount += current.count - self.last_count;
        self.last_sum = current.sum;
        self.last_sum2 = current.sum2;
        self.last_count = current.count;

        let jobs = u64::from(self.state.identity().n_parallel.max(1));
        let nrun = (self.state.ncase() / (jobs * self.state.nchunk() as u64))
            .max(1)
            .min(self.record.nleft);
        self.record.nleft -= nrun;
        self.record.ntot += nrun;
        self.write_control()?;

        if let Some(accu) = self.state.accuracy()
            && let Some((f, df)) = self.record.combined(self.norm)
            && df < 100.0
            && df < accu
        {
            warn!(
                result = f,
                uncertainty = df,
                accuracy = accu,
                "combined parallel result reached the requested uncertainty"
            );
            return Ok(0);
        }
        Ok(nrun)
    }

    fn finish_simulation(&mut self, _host: &mut dyn SimulationHost) -> CbctResult<bool> {
        self.state.report_finish();
        if self.removed {
            return Ok(false);
        }
        self.read_control()?;
        self.record.njob -= 1;
        self.write_control()?;
        let path = self.file()?.path().to_path_buf();
        self.file = None;
        if self.record.njob > 0 {
            return Ok(false);
        }
        if let Err(error) = fs::remove_file(&path) {
            warn!(path = %path.display(), %error, "failed to remove the job control file");
        }
        self.removed = true;
        Ok(true)
    }

    fn combined_result(&self) -> Option<(f64, f64)> {
        self.record.combined(self.norm)
    }
}
