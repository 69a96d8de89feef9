//! Photon sources.

use crate::common::config::{SourceConfig, SourceShapeConfig, SpectrumConfig};
use crate::domain::{CbctError, CbctResult, codes};
use crate::numerics::RandomGenerator;
use crate::serialization::{CheckpointError, CheckpointReader, CheckpointWriter};
use crate::transport::Particle;
use nalgebra::Vector3;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum SourceShape {
    Pencil {
        position: Vector3<f64>,
        direction: Vector3<f64>,
    },
    /// Point source aimed at a rectangle with uniform fluence over its area.
    Point {
        position: Vector3<f64>,
        center: Vector3<f64>,
        x_axis: Vector3<f64>,
        y_axis: Vector3<f64>,
        size: [f64; 2],
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Spectrum {
    Monoenergetic(f64),
    /// Line spectrum sampled from its cumulative distribution.
    Discrete {
        energies: Vec<f64>,
        cumulative: Vec<f64>,
    },
}

impl Spectrum {
    fn from_config(config: &SpectrumConfig) -> CbctResult<Self> {
        match config {
            SpectrumConfig::Monoenergetic(energy) => Ok(Self::Monoenergetic(*energy)),
            SpectrumConfig::Discrete {
                energies,
                probabilities,
            } => {
                let total: f64 = probabilities.iter().sum();
                if energies.is_empty() || energies.len() != probabilities.len() || total <= 0.0 {
                    return Err(CbctError::input_validation(
                        codes::INPUT_SOURCE,
                        "spectrum needs matching non-negative energies and probabilities",
                    ));
                }
                let cumulative = probabilities
                    .iter()
                    .scan(0.0, |sum, p| {
                        *sum += p / total;
                        Some(*sum)
                    })
                    .collect();
                Ok(Self::Discrete {
                    energies: energies.clone(),
                    cumulative,
                })
            }
        }
    }

    pub fn max_energy(&self) -> f64 {
        match self {
            Self::Monoenergetic(energy) => *energy,
            Self::Discrete { energies, .. } => energies.iter().copied().fold(0.0, f64::max),
        }
    }

    fn sample(&self, rng: &mut RandomGenerator) -> f64 {
        match self {
            Self::Monoenergetic(energy) => *energy,
            Self::Discrete {
                energies,
                cumulative,
            } => {
                let r = rng.uniform();
                let bin = cumulative.partition_point(|c| *c <= r);
                energies[bin.min(energies.len() - 1)]
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Source {
    shape: SourceShape,
    spectrum: Spectrum,
    emitted: u64,
}

impl Source {
    pub fn new(shape: SourceShape, spectrum: Spectrum) -> Self {
        Self {
            shape,
            spectrum,
            emitted: 0,
        }
    }

    pub fn from_config(config: &SourceConfig) -> CbctResult<Self> {
        let invalid = |message: &str| CbctError::input_validation(codes::INPUT_SOURCE, message);
        let shape = match &config.shape {
            SourceShapeConfig::Pencil {
                position,
                direction,
            } => {
                let direction = Vector3::from(*direction);
                if direction.norm() == 0.0 {
                    return Err(invalid("pencil beam direction must not be zero"));
                }
                SourceShape::Pencil {
                    position: Vector3::from(*position),
                    direction: direction.normalize(),
                }
            }
            SourceShapeConfig::Point {
                position,
                target_center,
                target_x_axis,
                target_y_axis,
                target_size,
            } => {
                let x_axis = Vector3::from(*target_x_axis);
                let y_axis = Vector3::from(*target_y_axis);
                if x_axis.norm() == 0.0 || y_axis.norm() == 0.0 {
                    return Err(invalid("point source target axes must not be zero"));
                }
                SourceShape::Point {
                    position: Vector3::from(*position),
                    center: Vector3::from(*target_center),
                    x_axis: x_axis.normalize(),
                    y_axis: y_axis.normalize(),
                    size: *target_size,
                }
            }
        };
        Ok(Self::new(shape, Spectrum::from_config(&config.energy)?))
    }

    pub fn shape(&self) -> &SourceShape {
        &self.shape
    }

    pub fn spectrum(&self) -> &Spectrum {
        &self.spectrum
    }

    /// Particles emitted so far, including previous runs.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Emits the next primary photon with unit weight.
    pub fn next_particle(&mut self, rng: &mut RandomGenerator) -> Particle {
        self.emitted += 1;
        let energy = self.spectrum.sample(rng);
        let (x, u) = match &self.shape {
            SourceShape::Pencil {
                position,
                direction,
            } => (*position, *direction),
            SourceShape::Point {
                position,
                center,
                x_axis,
                y_axis,
                size,
            } => {
                let dx = (rng.uniform() - 0.5) * size[0];
                let dy = (rng.uniform() - 0.5) * size[1];
                let target = center + x_axis * dx + y_axis * dy;
                (*position, (target - position).normalize())
            }
        };
        Particle::photon(energy, 1.0, x, u)
    }

    pub fn describe(&self) {
        match &self.shape {
            SourceShape::Pencil {
                position,
                direction,
            } => info!(
                position = ?position.as_slice(),
                direction = ?direction.as_slice(),
                emax = self.spectrum.max_energy(),
                "pencil beam source"
            ),
            SourceShape::Point {
                position,
                center,
                size,
                ..
            } => info!(
                position = ?position.as_slice(),
                target = ?center.as_slice(),
                size = ?size,
                emax = self.spectrum.max_energy(),
                "point source collimated to a rectangle"
            ),
        }
    }

    pub fn store_state(&self, writer: &mut CheckpointWriter) {
        writer.integer(self.emitted).end_line();
    }

    pub fn set_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
        self.emitted = reader.u64("source particles emitted")?;
        Ok(())
    }

    pub fn add_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
        self.emitted += reader.u64("source particles emitted")?;
        Ok(())
    }

    pub fn reset_counter(&mut self) {
        self.emitted = 0;
    }
}
