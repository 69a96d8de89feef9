use crate::serialization::{CheckpointError, CheckpointReader, CheckpointWriter};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded uniform generator whose position can be written to and restored
/// from a checkpoint.
///
/// Parallel jobs share the seed and draw from distinct ChaCha streams.
#[derive(Debug, Clone)]
pub struct RandomGenerator {
    seed: u64,
    stream: u64,
    count: u64,
    rng: ChaCha8Rng,
}

impl RandomGenerator {
    pub fn new(seed: u64, stream: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(stream);
        Self {
            seed,
            stream,
            count: 0,
            rng,
        }
    }

    /// Uniform deviate in `[0, 1)`.
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        self.count += 1;
        self.rng.random::<f64>()
    }

    /// Number of mean free paths to the next interaction, `-ln(1-U)`.
    #[inline]
    pub fn exponential_mfp(&mut self) -> f64 {
        -(1.0 - self.uniform()).ln()
    }

    /// Cosine and sine of a uniformly distributed azimuth.
    pub fn azimuth(&mut self) -> (f64, f64) {
        let phi = std::f64::consts::TAU * self.uniform();
        (phi.cos(), phi.sin())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn stream(&self) -> u64 {
        self.stream
    }

    pub fn store_state(&self, writer: &mut CheckpointWriter) {
        writer
            .integer(self.count)
            .integer(self.seed)
            .integer(self.stream)
            .integer(self.rng.get_word_pos())
            .end_line();
    }

    pub fn set_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
        let count = reader.u64("rng count")?;
        let seed = reader.u64("rng seed")?;
        let stream = reader.u64("rng stream")?;
        let word_pos: u128 = reader.parse("rng position")?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(stream);
        rng.set_word_pos(word_pos);
        *self = Self {
            seed,
            stream,
            count,
            rng,
        };
        Ok(())
    }

    /// Combining only accumulates the number of draws; the sequence position
    /// of this generator is kept.
    pub fn add_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
        let mut other = self.clone();
        other.set_state(reader)?;
        self.count += other.count;
        Ok(())
    }

    pub fn reset_counter(&mut self) {
        self.count = 0;
    }
}
