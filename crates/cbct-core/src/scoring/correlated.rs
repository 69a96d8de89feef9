use super::array::ScoringArray;
use crate::serialization::{CheckpointError, CheckpointReader, CheckpointWriter};

/// Scores below this are ignored when deciding whether a bin was touched.
const TOUCH_THRESHOLD: f64 = 1e-35;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulator {
    First,
    Second,
}

/// Two scoring arrays with the per-bin cross product `Σ x1·x2` needed for
/// the uncertainty of their ratio.
///
/// Each bin enters the cross product at most once per history: touched bins
/// are remembered and flushed when the next history starts.
#[derive(Debug, Clone)]
pub struct CorrelatedScoring {
    first: ScoringArray,
    second: ScoringArray,
    corr: Vec<f64>,
    touched: Vec<usize>,
    last_case: u64,
}

impl CorrelatedScoring {
    pub fn new(nreg: usize) -> Self {
        Self {
            first: ScoringArray::new(nreg),
            second: ScoringArray::new(nreg),
            corr: vec![0.0; nreg],
            touched: Vec::new(),
            last_case: 0,
        }
    }

    pub fn regions(&self) -> usize {
        self.corr.len()
    }

    pub fn first(&self) -> &ScoringArray {
        &self.first
    }

    pub fn second(&self) -> &ScoringArray {
        &self.second
    }

    pub fn first_mut(&mut self) -> &mut ScoringArray {
        &mut self.first
    }

    pub fn second_mut(&mut self) -> &mut ScoringArray {
        &mut self.second
    }

    pub fn score(&mut self, bin: usize, which: Accumulator, value: f64) {
        if bin >= self.corr.len() {
            return;
        }
        if value > TOUCH_THRESHOLD
            && self.first.this_history_score(bin) == 0.0
            && self.second.this_history_score(bin) == 0.0
        {
            self.touched.push(bin);
        }
        match which {
            Accumulator::First => self.first.score(bin, value),
            Accumulator::Second => self.second.score(bin, value),
        }
    }

    pub fn start_new_case(&mut self, case: u64) {
        if case == self.last_case {
            return;
        }
        for &bin in &self.touched {
            self.corr[bin] += self.first.this_history_score(bin) * self.second.this_history_score(bin);
        }
        self.touched.clear();
        self.first.set_history(case);
        self.second.set_history(case);
        self.last_case = case;
    }

    /// Accumulated `Σ x1·x2`, the pending history excluded.
    pub fn correlation(&self, bin: usize) -> f64 {
        self.corr.get(bin).copied().unwrap_or(0.0)
    }

    pub fn last_case(&self) -> u64 {
        self.last_case
    }

    pub fn reset(&mut self) {
        self.first.reset();
        self.second.reset();
        self.corr.fill(0.0);
        self.touched.clear();
        self.last_case = 0;
    }

    fn with_pending(&self) -> Vec<f64> {
        let mut corr = self.corr.clone();
        for &bin in &self.touched {
            corr[bin] += self.first.this_history_score(bin) * self.second.this_history_score(bin);
        }
        corr
    }

    /// Writes the cross products only; the two arrays are stored by their owner.
    pub fn store_state(&self, writer: &mut CheckpointWriter) {
        writer
            .integer(self.corr.len())
            .integer(self.last_case)
            .end_line()
            .floats(&self.with_pending())
            .end_line();
    }

    pub fn set_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
        reader.expect_usize("correlation regions", self.corr.len())?;
        let last_case = reader.u64("correlation case")?;
        let corr = (0..self.corr.len())
            .map(|_| reader.f64("correlation"))
            .collect::<Result<Vec<_>, _>>()?;
        self.corr = corr;
        self.touched.clear();
        self.last_case = last_case;
        Ok(())
    }

    pub fn add_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
        let mut other = Self::new(self.corr.len());
        other.set_state(reader)?;
        self.corr = self.with_pending();
        self.touched.clear();
        for (mine, extra) in self.corr.iter_mut().zip(&other.corr) {
            *mine += extra;
        }
        self.last_case += other.last_case;
        Ok(())
    }
}
