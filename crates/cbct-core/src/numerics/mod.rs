//! Interpolation tables and the checkpointable random generator.

pub mod interpolator;
pub mod rng;

pub use interpolator::LogEnergyInterpolator;
pub use rng::RandomGenerator;
