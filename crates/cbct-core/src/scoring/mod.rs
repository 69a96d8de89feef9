//! Detector accumulators.

mod array;
mod correlated;

pub use array::ScoringArray;
pub use correlated::{Accumulator, CorrelatedScoring};

use crate::serialization::{CheckpointError, CheckpointReader, CheckpointWriter};

/// Air kerma per detector pixel: total, primary (never scattered) and
/// scattered, with the total/primary cross product.
#[derive(Debug, Clone)]
pub struct KermaScores {
    correlated: CorrelatedScoring,
    scattered: ScoringArray,
}

impl KermaScores {
    pub fn new(pixels: usize) -> Self {
        Self {
            correlated: CorrelatedScoring::new(pixels),
            scattered: ScoringArray::new(pixels),
        }
    }

    pub fn pixels(&self) -> usize {
        self.scattered.regions()
    }

    pub fn start_history(&mut self, case: u64) {
        self.correlated.start_new_case(case);
        self.scattered.set_history(case);
    }

    /// Scores into the total and into primary or scattered by `latch`.
    #[inline]
    pub fn score(&mut self, pixel: usize, latch: u32, value: f64) {
        self.correlated.score(pixel, Accumulator::First, value);
        if latch == 0 {
            self.correlated.score(pixel, Accumulator::Second, value);
        } else {
            self.scattered.score(pixel, value);
        }
    }

    pub fn total(&self) -> &ScoringArray {
        self.correlated.first()
    }

    pub fn primary(&self) -> &ScoringArray {
        self.correlated.second()
    }

    pub fn scattered(&self) -> &ScoringArray {
        &self.scattered
    }

    pub fn correlation(&self, pixel: usize) -> f64 {
        self.correlated.correlation(pixel)
    }

    pub fn reset(&mut self) {
        self.correlated.reset();
        self.scattered.reset();
    }

    pub fn store_state(&self, writer: &mut CheckpointWriter) {
        self.correlated.first().store_state(writer);
        self.correlated.second().store_state(writer);
        self.scattered.store_state(writer);
        self.correlated.store_state(writer);
    }

    pub fn set_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
        self.correlated.first_mut().set_state(reader)?;
        self.correlated.second_mut().set_state(reader)?;
        self.scattered.set_state(reader)?;
        self.correlated.set_state(reader)
    }

    pub fn add_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
        self.correlated.first_mut().add_state(reader)?;
        self.correlated.second_mut().add_state(reader)?;
        self.scattered.add_state(reader)?;
        self.correlated.add_state(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::KermaScores;
    use crate::serialization::{CheckpointReader, CheckpointWriter};

    #[test]
    fn latch_routes_scores_to_primary_or_scattered() {
        let mut scores = KermaScores::new(4);
        scores.start_history(1);
        scores.score(2, 0, 1.0);
        scores.score(2, 3, 0.25);
        scores.start_history(2);
        scores.score(2, 0, 1.0);

        assert_eq!(scores.total().current_score(2), (1.25, 1.5625));
        assert_eq!(scores.primary().current_score(2), (1.0, 1.0));
        // the scattered bin was not touched again, so its history is still pending
        assert_eq!(scores.scattered().current_score(2), (0.0, 0.0));
        assert_eq!(scores.scattered().current_result(2).0, 0.125);
        assert_eq!(scores.correlation(2), 1.25);
    }

    #[test]
    fn state_round_trips_through_text() {
        let mut scores = KermaScores::new(2);
        scores.start_history(7);
        scores.score(1, 0, 0.5);
        scores.score(0, 1, 0.125);
        let mut writer = CheckpointWriter::new();
        scores.store_state(&mut writer);
        let text = writer.into_string();

        let mut restored = KermaScores::new(2);
        restored
            .set_state(&mut CheckpointReader::new(&text))
            .expect("state should restore");
        assert_eq!(restored.total().current_score(1), (0.5, 0.25));
        assert_eq!(restored.scattered().current_score(0), (0.125, 0.015625));
        assert_eq!(restored.correlation(1), 0.25);
        assert_eq!(restored.total().current_case(), 7);

        let mut again = CheckpointWriter::new();
        restored.store_state(&mut again);
        assert_eq!(again.into_string(), text);
    }
}
