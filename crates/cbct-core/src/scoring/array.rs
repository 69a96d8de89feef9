use crate::serialization::{CheckpointError, CheckpointReader, CheckpointWriter};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Bin {
    sum: f64,
    sum2: f64,
    tmp: f64,
    case: u64,
}

impl Bin {
    fn fold(&mut self) {
        self.sum += self.tmp;
        self.sum2 += self.tmp * self.tmp;
        self.tmp = 0.0;
    }
}

/// History-by-history accumulator over a fixed number of bins.
///
/// Contributions of one history to one bin are summed in `tmp` and enter
/// `sum`/`sum2` once, when the bin is next touched by a later history or when
/// the state is read out.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringArray {
    bins: Vec<Bin>,
    current_case: u64,
}

impl ScoringArray {
    pub fn new(nreg: usize) -> Self {
        Self {
            bins: vec![Bin::default(); nreg],
            current_case: 0,
        }
    }

    pub fn regions(&self) -> usize {
        self.bins.len()
    }

    pub fn current_case(&self) -> u64 {
        self.current_case
    }

    pub fn set_history(&mut self, case: u64) {
        self.current_case = case;
    }

    #[inline]
    pub fn score(&mut self, bin: usize, value: f64) {
        let current = self.current_case;
        let Some(slot) = self.bins.get_mut(bin) else {
            return;
        };
        if slot.case == current {
            slot.tmp += value;
        } else {
            slot.fold();
            slot.tmp = value;
            slot.case = current;
        }
    }

    /// What the current history has scored in `bin` so far.
    pub fn this_history_score(&self, bin: usize) -> f64 {
        self.bins
            .get(bin)
            .filter(|slot| slot.case == self.current_case)
            .map_or(0.0, |slot| slot.tmp)
    }

    /// `(Σx, Σx²)` over completed histories only.
    pub fn current_score(&self, bin: usize) -> (f64, f64) {
        self.bins
            .get(bin)
            .map_or((0.0, 0.0), |slot| (slot.sum, slot.sum2))
    }

    /// `(Σx, Σx²)` with the pending history folded in, as a checkpoint stores them.
    pub fn accumulated_score(&self, bin: usize) -> (f64, f64) {
        self.bins.get(bin).map_or((0.0, 0.0), |slot| {
            (slot.sum + slot.tmp, slot.sum2 + slot.tmp * slot.tmp)
        })
    }

    /// Mean per history and its standard error, pending contributions included.
    pub fn current_result(&self, bin: usize) -> (f64, f64) {
        let Some(slot) = self.bins.get(bin) else {
            return (0.0, 0.0);
        };
        if self.current_case == 0 {
            return (0.0, 0.0);
        }
        let n = self.current_case as f64;
        let r = (slot.sum + slot.tmp) / n;
        if self.current_case < 2 {
            return (r, 0.0);
        }
        let var = ((slot.sum2 + slot.tmp * slot.tmp) / n - r * r) / (n - 1.0);
        (r, var.max(0.0).sqrt())
    }

    pub fn reset(&mut self) {
        self.bins.fill(Bin::default());
        self.current_case = 0;
    }

    pub fn store_state(&self, writer: &mut CheckpointWriter) {
        writer
            .integer(self.bins.len())
            .integer(self.current_case)
            .end_line();
        for slot in &self.bins {
            writer
                .integer(slot.case)
                .float(slot.sum + slot.tmp)
                .float(slot.sum2 + slot.tmp * slot.tmp)
                .end_line();
        }
    }

    pub fn set_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
        reader.expect_usize("scoring regions", self.bins.len())?;
        let current_case = reader.u64("scoring case")?;
        let mut bins = Vec::with_capacity(self.bins.len());
        for _ in 0..self.bins.len() {
            bins.push(Bin {
                case: reader.u64("bin case")?,
                sum: reader.f64("bin sum")?,
                sum2: reader.f64("bin sum2")?,
                tmp: 0.0,
            });
        }
        self.bins = bins;
        self.current_case = current_case;
        Ok(())
    }

    pub fn add_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
        let mut other = Self::new(self.bins.len());
        other.set_state(reader)?;
        self.add(&other);
        Ok(())
    }

    /// Adds the accumulated sums of `other`; pending contributions of both
    /// arrays are folded first.
    pub fn add(&mut self, other: &Self) {
        for (slot, extra) in self.bins.iter_mut().zip(&other.bins) {
            slot.fold();
            slot.sum += extra.sum + extra.tmp;
            slot.sum2 += extra.sum2 + extra.tmp * extra.tmp;
        }
        self.current_case += other.current_case;
    }
}
