//! Variance-reduced photon transport towards a planar detector.
//!
//! [`TransportEngine`] owns everything a history needs: geometry, interaction
//! kernel, cross sections, detector, splitting policy, particle stack, random
//! generator and the kerma accumulators. Nothing is global; several engines
//! can coexist in one process.
//!
//! Photons aimed at the detector are scored by forced detection before their
//! next interaction is simulated. Photons that miss it are tracked to their
//! next interaction with Woodcock (delta) tracking when a delta transport
//! medium is configured, and exactly otherwise.

mod analog;
mod delta;
mod detector;
mod diagnostics;
mod interactions;
pub mod particle;
mod selector;
mod splitter;
mod splitting;

pub use delta::TrackSite;
pub use detector::{ScoringPlane, ScreenHit, transmitted_kerma};
pub use diagnostics::TransportDiagnostics;
pub use particle::{Particle, ParticleStack};
pub use selector::{ScreenWalk, walk_to_screen};
pub use splitter::Splitter;
pub use splitting::{
    AttenuationPlane, PdisRounding, PrimaryAverage, SplitDecision, SplittingPolicy,
    SplittingScheme, pdis_split, stochastic_round,
};

use crate::common::SplitterSignal;
use crate::common::constants::INFINITE_DISTANCE;
use crate::domain::{CbctResult, ScoringMode};
use crate::geometry::{Geometry, IntersectionWalker};
use crate::numerics::RandomGenerator;
use crate::physics::{AttenuationModel, InteractionKernel};
use crate::scoring::KermaScores;
use crate::serialization::{CheckpointError, CheckpointReader, CheckpointWriter};

#[derive(Debug, Clone, PartialEq)]
pub struct TransportSettings {
    pub scoring: ScoringMode,
    /// Photons below this energy (MeV) are discarded.
    pub photon_cutoff: f64,
    /// Photons that already scattered this many times are not followed further.
    pub max_latch: Option<u32>,
    /// `lambda0` of the path-length transformation for aimed photons.
    pub mfp_transform: Option<f64>,
    /// Medium around the geometry; vacuum when `None`.
    pub surrounding: Option<usize>,
    /// Woodcock reference medium; exact tracking of unaimed photons when `None`.
    pub delta_medium: Option<usize>,
    pub max_stack: usize,
}

impl TransportSettings {
    pub fn latch_exhausted(&self, latch: u32) -> bool {
        self.max_latch.is_some_and(|max| latch >= max)
    }
}

/// Collaborators a [`TransportEngine`] is built from.
pub struct TransportSetup {
    pub geometry: Box<dyn Geometry>,
    pub kernel: Box<dyn InteractionKernel>,
    pub attenuation: AttenuationModel,
    pub plane: ScoringPlane,
    pub policy: SplittingPolicy,
    pub settings: TransportSettings,
}

pub struct TransportEngine {
    geometry: Box<dyn Geometry>,
    kernel: Box<dyn InteractionKernel>,
    attenuation: AttenuationModel,
    plane: ScoringPlane,
    policy: SplittingPolicy,
    settings: TransportSettings,
    rhormax: f64,
    stack: ParticleStack,
    walker: IntersectionWalker,
    rng: RandomGenerator,
    scores: KermaScores,
    primary: PrimaryAverage,
    diagnostics: TransportDiagnostics,
}

impl TransportEngine {
    pub fn new(setup: TransportSetup, rng: RandomGenerator) -> CbctResult<Self> {
        let TransportSetup {
            geometry,
            kernel,
            mut attenuation,
            plane,
            policy,
            settings,
        } = setup;
        let needs_average = match &policy.scheme {
            SplittingScheme::Position { plane, .. } => plane.is_none_or(|p| p.medium.is_none()),
            _ => false,
        };
        if needs_average && !attenuation.has_average() {
            attenuation.setup_average(geometry.as_ref())?;
        }
        let rhormax = AttenuationModel::max_relative_rho(geometry.as_ref());
        let rhormax = if rhormax > 0.0 { rhormax } else { 1.0 };
        let pixels = plane.pixels();
        Ok(Self {
            stack: ParticleStack::new(settings.max_stack),
            walker: IntersectionWalker::default(),
            scores: KermaScores::new(pixels),
            primary: PrimaryAverage::default(),
            diagnostics: TransportDiagnostics::default(),
            geometry,
            kernel,
            attenuation,
            plane,
            policy,
            settings,
            rhormax,
            rng,
        })
    }

    pub fn start_history(&mut self, case: u64) {
        self.scores.start_history(case);
    }

    /// Transports a photon emitted by the source.
    ///
    /// A photon starting outside the geometry is moved to its entry point; one
    /// that never enters scores its direct kerma if it hits the detector.
    pub fn transport_source_particle(&mut self, particle: Particle) -> CbctResult<()> {
        let mut particle = particle;
        let mut region = self.geometry.is_where(&particle.x);
        if region.is_none() {
            let step = self
                .geometry
                .howfar(None, &particle.x, &particle.u, INFINITE_DISTANCE);
            if let Some(entered) = step.region {
                particle.x += particle.u * step.distance;
                region = Some(entered);
            }
        }
        match region {
            Some(region) => {
                particle.region = Some(region);
                self.shower(particle)
            }
            None => {
                self.score_leaving(&particle);
                Ok(())
            }
        }
    }

    /// Follows `particle` and all of its descendants until the stack is empty.
    pub fn shower(&mut self, particle: Particle) -> CbctResult<()> {
        let mut particle = particle;
        if particle.energy < self.settings.photon_cutoff {
            self.diagnostics.below_cutoff += 1;
            return Ok(());
        }
        if !particle.is_photon() {
            return Ok(());
        }
        self.stack.clear();
        match self.settings.scoring {
            ScoringMode::TrackLength => {
                self.stack.push(particle)?;
                self.run_analog()
            }
            ScoringMode::ForcedDetection => {
                let hit = self.plane.hits(&particle.x, &particle.u);
                let nspl = match hit {
                    Some(_) => self.policy.np,
                    None => match self.policy.roulette_source(&mut particle.weight, &mut self.rng) {
                        Some(n) => n,
                        None => {
                            self.diagnostics.roulette_kills += 1;
                            return Ok(());
                        }
                    },
                };
                particle.katt = 0.0;
                particle.ddet = hit.map_or(0.0, |h| h.distance);
                particle.phat = nspl;
                particle.detector = hit.map(|h| h.pixel);
                self.stack.push(particle)?;
                while !self.stack.is_empty() {
                    self.select_photon_mfp()?;
                }
                Ok(())
            }
        }
    }

    /// Scores the kerma of a photon leaving the geometry towards the detector,
    /// attenuated only by the surrounding medium.
    pub(super) fn score_leaving(&mut self, particle: &Particle) {
        let Some(hit) = self.plane.hits(&particle.x, &particle.u) else {
            return;
        };
        let gle = particle.gle();
        let depth = self.settings.surrounding.map_or(0.0, |air| {
            hit.distance / self.attenuation.transport_mfp(air, gle)
        });
        let cosine = self.plane.cosine(&particle.u);
        if let Some(sc) =
            transmitted_kerma(particle.weight, self.attenuation.muen(gle), cosine, depth)
        {
            self.scores.score(hit.pixel, particle.latch, sc);
        }
    }

    /// Batch boundary: ends splitter warm-up and refreshes its importances.
    pub fn update_importances(&mut self, signal: SplitterSignal) {
        let mean = self.primary.mean();
        if let Some(splitter) = self.policy.splitter_mut() {
            if splitter.is_warming() {
                splitter.stop_warming();
            }
            splitter.update(signal, mean);
        }
    }

    pub fn rng(&self) -> &RandomGenerator {
        &self.rng
    }

    pub fn rng_mut(&mut self) -> &mut RandomGenerator {
        &mut self.rng
    }

    pub fn scores(&self) -> &KermaScores {
        &self.scores
    }

    pub fn scores_mut(&mut self) -> &mut KermaScores {
        &mut self.scores
    }

    pub fn diagnostics(&self) -> &TransportDiagnostics {
        &self.diagnostics
    }

    pub fn attenuation(&self) -> &AttenuationModel {
        &self.attenuation
    }

    pub fn geometry(&self) -> &dyn Geometry {
        self.geometry.as_ref()
    }

    pub fn plane(&self) -> &ScoringPlane {
        &self.plane
    }

    pub fn policy(&self) -> &SplittingPolicy {
        &self.policy
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub fn primary_average(&self) -> &PrimaryAverage {
        &self.primary
    }

    pub fn stack(&self) -> &ParticleStack {
        &self.stack
    }

    /// Kerma scores and primary average. The generator is stored by the
    /// caller so that the source state can sit between the two.
    pub fn store_state(&self, writer: &mut CheckpointWriter) {
        self.scores.store_state(writer);
        writer
            .float(self.primary.sum())
            .integer(self.primary.count())
            .end_line();
    }

    pub fn set_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
        self.scores.set_state(reader)?;
        let sum = reader.f64("primary score sum")?;
        let count = reader.u64("primary score count")?;
        self.primary = PrimaryAverage::from_parts(sum, count);
        Ok(())
    }

    pub fn add_state(&mut self, reader: &mut CheckpointReader<'_>) -> Result<(), CheckpointError> {
        self.scores.add_state(reader)?;
        let sum = reader.f64("primary score sum")?;
        let count = reader.u64("primary score count")?;
        self.primary.merge(&PrimaryAverage::from_parts(sum, count));
        Ok(())
    }

    pub fn reset_counter(&mut self) {
        self.scores.reset();
        self.primary = PrimaryAverage::default();
        self.diagnostics = TransportDiagnostics::default();
    }
}
