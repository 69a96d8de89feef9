mod errors;

pub use errors::{CbctError, CbctErrorCategory, CbctResult, ExitMapping, codes};

use serde::Deserialize;
use std::fmt::{Display, Formatter};

/// How air kerma is scored at the detector plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    TrackLength,
    #[default]
    ForcedDetection,
}

impl ScoringMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TrackLength => "track_length",
            Self::ForcedDetection => "forced_detection",
        }
    }
}

impl Display for ScoringMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationMode {
    #[default]
    First,
    Restart,
    Analyze,
    Combine,
}

impl CalculationMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Restart => "restart",
            Self::Analyze => "analyze",
            Self::Combine => "combine",
        }
    }

    pub const fn reads_previous_state(self) -> bool {
        matches!(self, Self::Restart | Self::Analyze)
    }
}

impl Display for CalculationMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunControlKind {
    Simple,
    Uniform,
    Balanced,
}

impl RunControlKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Uniform => "uniform",
            Self::Balanced => "balanced",
        }
    }
}

impl Display for RunControlKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Position of this process inside a set of cooperating parallel jobs.
///
/// `n_parallel == 0` means a serial run. Job indices start at
/// `first_parallel` and run to `first_parallel + n_parallel - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParallelIdentity {
    pub n_parallel: u32,
    pub i_parallel: u32,
    pub first_parallel: u32,
}

impl Default for ParallelIdentity {
    fn default() -> Self {
        Self::serial()
    }
}

impl ParallelIdentity {
    pub const fn serial() -> Self {
        Self {
            n_parallel: 0,
            i_parallel: 0,
            first_parallel: 1,
        }
    }

    pub fn new(n_parallel: u32, i_parallel: u32, first_parallel: u32) -> CbctResult<Self> {
        if n_parallel > 0
            && (i_parallel < first_parallel || i_parallel >= first_parallel + n_parallel)
        {
            return Err(CbctError::input_validation(
                codes::INPUT_PARALLEL,
                format!(
                    "job index {i_parallel} outside the parallel set {first_parallel}..{}",
                    first_parallel + n_parallel - 1
                ),
            ));
        }
        Ok(Self {
            n_parallel,
            i_parallel,
            first_parallel,
        })
    }

    pub const fn is_parallel(&self) -> bool {
        self.n_parallel > 0
    }

    pub const fn is_first(&self) -> bool {
        self.i_parallel == self.first_parallel
    }

    pub const fn is_last(&self) -> bool {
        self.n_parallel > 0 && self.i_parallel == self.first_parallel + self.n_parallel - 1
    }

    /// Zero-based position of this job inside its set.
    pub const fn offset(&self) -> u32 {
        self.i_parallel.saturating_sub(self.first_parallel)
    }
}

#[cfg(test)]
mod tests {
    use super::{CalculationMode, ParallelIdentity, RunControlKind, ScoringMode};

    #[test]
    fn enums_render_their_configuration_names() {
        assert_eq!(ScoringMode::default().to_string(), "forced_detection");
        assert_eq!(CalculationMode::Analyze.to_string(), "analyze");
        assert_eq!(RunControlKind::Balanced.to_string(), "balanced");
        assert!(CalculationMode::Restart.reads_previous_state());
        assert!(!CalculationMode::Combine.reads_previous_state());
    }

    #[test]
    fn parallel_identity_detects_first_and_last_jobs() {
        let first = ParallelIdentity::new(3, 1, 1).expect("identity should build");
        let last = ParallelIdentity::new(3, 3, 1).expect("identity should build");
        assert!(first.is_first() && !first.is_last());
        assert!(last.is_last() && !last.is_first());
        assert_eq!(last.offset(), 2);
        assert!(!ParallelIdentity::serial().is_last());
    }

    #[test]
    fn parallel_identity_rejects_out_of_range_index() {
        let error = ParallelIdentity::new(2, 5, 1).expect_err("index 5 is outside 1..2");
        assert_eq!(error.code(), "INPUT.PARALLEL");
    }
}
