//! Photon transport with variance reduction for cone-beam CT scatter
//! estimation, with checkpointed serial and parallel run control.

pub mod application;
pub mod common;
pub mod domain;
pub mod geometry;
pub mod numerics;
pub mod physics;
pub mod run_control;
pub mod scoring;
pub mod serialization;
pub mod source;
pub mod transport;

pub use application::{CbctApplication, run_scan};
pub use common::SimulationConfig;
pub use domain::{CbctError, CbctResult, ParallelIdentity};
