use crate::domain::{CbctError, CbctResult, codes};
use nalgebra::Vector3;

/// A particle on the transport stack together with its forced-detection state.
///
/// The detector fields travel with the particle, so copying or moving a stack
/// entry always moves them together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub charge: i8,
    pub energy: f64,
    pub weight: f64,
    pub x: Vector3<f64>,
    pub u: Vector3<f64>,
    pub region: Option<usize>,
    /// Number of interactions so far; 0 means primary.
    pub latch: u32,
    /// Detector pixel the current direction hits, if any.
    pub detector: Option<usize>,
    /// Distance to the detector plane along `u`.
    pub ddet: f64,
    /// Attenuated kerma estimate carried for PDIS.
    pub katt: f64,
    /// Split number cached for the next interaction.
    pub phat: u32,
}

impl Particle {
    pub fn photon(energy: f64, weight: f64, x: Vector3<f64>, u: Vector3<f64>) -> Self {
        Self {
            charge: 0,
            energy,
            weight,
            x,
            u,
            region: None,
            latch: 0,
            detector: None,
            ddet: 0.0,
            katt: 0.0,
            phat: 1,
        }
    }

    pub fn is_photon(&self) -> bool {
        self.charge == 0
    }

    #[inline]
    pub fn gle(&self) -> f64 {
        self.energy.ln()
    }
}

#[derive(Debug, Clone)]
pub struct ParticleStack {
    particles: Vec<Particle>,
    capacity: usize,
}

impl ParticleStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            particles: Vec::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Exceeding the capacity is fatal: it means splitting is too aggressive
    /// for the configured stack.
    pub fn push(&mut self, particle: Particle) -> CbctResult<()> {
        if self.particles.len() >= self.capacity {
            return Err(CbctError::resource_exhausted(
                codes::RUN_STACK_OVERFLOW,
                format!(
                    "particle stack depth {} exceeded while splitting",
                    self.capacity
                ),
            ));
        }
        self.particles.push(particle);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Particle> {
        self.particles.pop()
    }

    pub fn top(&self) -> Option<&Particle> {
        self.particles.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Particle> {
        self.particles.last_mut()
    }

    pub fn get(&self, index: usize) -> Option<&Particle> {
        self.particles.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Particle> {
        self.particles.get_mut(index)
    }

    /// Removes entry `index` by moving the top entry into its slot.
    pub fn kill(&mut self, index: usize) -> Option<Particle> {
        (index < self.particles.len()).then(|| self.particles.swap_remove(index))
    }

    pub fn truncate(&mut self, len: usize) {
        self.particles.truncate(len);
    }

    pub fn clear(&mut self) {
        self.particles.clear();
    }

    pub fn as_slice(&self) -> &[Particle] {
        &self.particles
    }
}
