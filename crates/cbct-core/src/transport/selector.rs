//! Next-interaction selection for photons on the stack.
//!
//! A photon aimed at the detector is scored by forced detection along its
//! whole path to the plane; the same walk through the intersection list also
//! locates its next interaction site.

use super::TransportEngine;
use super::splitting::{PdisRounding, SplitDecision, SplittingScheme, pdis_split};
use crate::common::constants::{GRAZING_COSINE_FLOOR, INFINITE_DISTANCE, VACUUM_MFP};
use crate::domain::CbctResult;
use crate::geometry::IntersectionRecord;
use crate::physics::AttenuationModel;
use crate::transport::detector::transmitted_kerma;
use crate::transport::particle::Particle;
use nalgebra::Vector3;

/// Interaction site found while walking towards the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionSite {
    pub x: Vector3<f64>,
    pub region: Option<usize>,
    pub medium: usize,
    pub cohfac: f64,
    /// Remaining distance to the detector plane from the site.
    pub ddet: f64,
    /// The site lies on or beyond the detector plane.
    pub past_screen: bool,
}

/// Result of [`walk_to_screen`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenWalk {
    /// Mean free paths between the photon and the detector plane.
    pub optical_depth: f64,
    pub interaction: Option<InteractionSite>,
    /// Cumulative distance at which the ray leaves the geometry.
    pub path_end: f64,
    /// Path length walked beyond the interaction site.
    pub lambda_int: f64,
}

/// Walks the segments `records` of a ray of log-energy `gle` that reaches
/// the detector after distance `t`.
///
/// Accumulates the optical depth up to the plane and, on the way, spends
/// `lambda` mean free paths to place the next interaction. Vacuum segments
/// never host an interaction. Beyond the geometry the ray is attenuated by the
/// `surrounding` medium, if any.
#[allow(clippy::too_many_arguments)]
pub fn walk_to_screen(
    records: &[IntersectionRecord],
    attenuation: &AttenuationModel,
    surrounding: Option<usize>,
    gle: f64,
    t: f64,
    lambda: f64,
    x: &Vector3<f64>,
    u: &Vector3<f64>,
) -> ScreenWalk {
    let mut lambda = lambda;
    let mut optical_depth = 0.0;
    let mut lambda_int = 0.0;
    let mut interaction = None;
    let mut medium: Option<usize> = None;
    let mut gmfp = INFINITE_DISTANCE;
    let mut cohfac = 1.0;
    let mut reached = false;
    let mut tlast = 0.0;

    for record in records {
        if record.medium != medium {
            medium = record.medium;
            match medium {
                Some(m) => {
                    cohfac = attenuation.cohfac(m, gle);
                    gmfp = attenuation.gmfp(m, gle) * cohfac;
                }
                None => {
                    cohfac = 1.0;
                    gmfp = VACUUM_MFP;
                }
            }
        }
        let tnew = record.t;
        let tstep = tnew - tlast;
        let sigma = record.rhof / gmfp;
        let this_lambda = tstep * sigma;

        if interaction.is_none() {
            if this_lambda < lambda {
                lambda -= this_lambda;
            } else if let Some(m) = medium.filter(|_| sigma > 0.0) {
                let tt = lambda / sigma;
                lambda_int += tstep - tt;
                interaction = Some(InteractionSite {
                    x: x + u * (tlast + tt),
                    region: record.region,
                    medium: m,
                    cohfac,
                    ddet: t - tlast - tt,
                    past_screen: tlast + tt >= t,
                });
            }
        } else {
            lambda_int += tstep;
        }

        let crosses_screen = tnew >= t;
        if crosses_screen && !reached {
            reached = true;
            optical_depth += (t - tlast) * sigma;
            lambda_int += t - tlast;
        }
        if reached && interaction.is_some() {
            break;
        }
        if !reached {
            optical_depth += this_lambda;
        }
        tlast = tnew;
    }

    let path_end = records.last().map_or(0.0, |record| record.t);
    if !reached {
        if let Some(air) = surrounding {
            optical_depth += (t - path_end) / attenuation.transport_mfp(air, gle);
        }
    }
    ScreenWalk {
        optical_depth,
        interaction,
        path_end,
        lambda_int,
    }
}

/// What the PDIS split number is estimated from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum SiteEstimate {
    /// Aimed photon: the path already walked towards the detector.
    Aimed { lambda_rest: f64, aup: f64 },
    /// Photon missing the detector: a fresh walk along the plane normal.
    Unaimed,
}

impl TransportEngine {
    /// Pops the top photon and transports it to its next interaction,
    /// scoring forced detection on the way if it is aimed at the detector.
    pub(super) fn select_photon_mfp(&mut self) -> CbctResult<()> {
        let Some(particle) = self.stack.pop() else {
            return Ok(());
        };
        if !particle.is_photon() {
            return Ok(());
        }
        if particle.energy < self.settings.photon_cutoff {
            self.diagnostics.below_cutoff += 1;
            return Ok(());
        }
        let aimed = particle.detector.is_some();
        let (lambda, wtr) = match self.settings.mfp_transform {
            Some(lamo) if aimed => {
                let eta = 1.0 / (1.0 - self.rng.uniform());
                let aux = eta.sqrt();
                let lambda = lamo * (aux - 1.0);
                (lambda, lamo * 0.5 * eta * aux * (-lambda).exp())
            }
            _ => (self.rng.exponential_mfp(), 1.0),
        };
        if aimed {
            self.transport_aimed(particle, lambda, wtr)
        } else {
            self.transport_unaimed(particle, lambda, wtr)
        }
    }

    fn transport_aimed(&mut self, particle: Particle, lambda: f64, wtr: f64) -> CbctResult<()> {
        let mut particle = particle;
        let Some(pixel) = particle.detector else {
            return Ok(());
        };
        let gle = particle.gle();
        let records = self.walker.compute(
            self.geometry.as_ref(),
            particle.region,
            &particle.x,
            &particle.u,
        )?;
        let walk = walk_to_screen(
            records,
            &self.attenuation,
            self.settings.surrounding,
            gle,
            particle.ddet,
            lambda,
            &particle.x,
            &particle.u,
        );

        let cosine = self.plane.cosine(&particle.u);
        let mut aup_int = 1.0;
        let muen = self.attenuation.muen(gle);
        if let Some(sc) = transmitted_kerma(particle.weight, muen, cosine, walk.optical_depth) {
            let aup = cosine.abs().max(GRAZING_COSINE_FLOOR);
            aup_int = aup;
            if particle.latch == 0 {
                self.primary.add(sc * aup);
            } else if let Some(splitter) = self.policy.splitter_mut() {
                splitter.score(particle.region, sc, particle.weight);
            }
            self.scores.score(pixel, particle.latch, sc);
        }

        let Some(site) = walk.interaction else {
            self.diagnostics.escaped += 1;
            return Ok(());
        };
        if self.settings.latch_exhausted(particle.latch) {
            self.diagnostics.latch_truncations += 1;
            return Ok(());
        }
        particle.weight *= wtr;
        particle.x = site.x;
        particle.region = site.region;
        particle.ddet = site.ddet;
        if site.past_screen {
            particle.detector = None;
        }
        let estimate = SiteEstimate::Aimed {
            lambda_rest: walk.path_end - walk.lambda_int,
            aup: aup_int,
        };
        let decision = self.split_at_site(&mut particle, estimate)?;
        self.interact(particle, decision, site.medium, site.cohfac)
    }

    /// Split number for a photon about to interact at its current position.
    pub(super) fn split_at_site(
        &mut self,
        particle: &mut Particle,
        estimate: SiteEstimate,
    ) -> CbctResult<SplitDecision> {
        let gle = particle.gle();
        let (fsplit, plane) = match &self.policy.scheme {
            SplittingScheme::Position { fsplit, plane } => (*fsplit, *plane),
            _ => {
                return Ok(self.policy.importance_split(
                    particle.region,
                    &mut particle.weight,
                    &mut self.rng,
                ));
            }
        };
        let muen = self.attenuation.muen(gle);
        let primary_mean = self.primary.mean();

        if let Some(plane) = plane {
            let datt = plane.depth(&particle.x);
            let w_att = if datt > 0.0 {
                match plane.medium {
                    Some(m) => (-datt / self.attenuation.transport_mfp(m, gle)).exp(),
                    None => (-datt * self.attenuation.muatt_avg(gle)).exp(),
                }
            } else {
                1.0
            };
            let katt = particle.weight * w_att * muen;
            return Ok(pdis_split(
                fsplit,
                katt,
                primary_mean,
                &mut particle.weight,
                PdisRounding::Always,
                &mut self.rng,
            ));
        }

        match estimate {
            SiteEstimate::Aimed { lambda_rest, aup } => {
                let w_att = if lambda_rest > 0.0 {
                    (-lambda_rest * self.attenuation.muatt_avg(gle)).exp()
                } else {
                    1.0
                };
                let aup = if aup > 0.0 { aup } else { 1.0 };
                let katt = particle.weight / aup * w_att * muen;
                let decision = pdis_split(
                    fsplit,
                    katt,
                    primary_mean,
                    &mut particle.weight,
                    PdisRounding::AboveOne,
                    &mut self.rng,
                );
                if let SplitDecision::Recompute(n) = decision {
                    if n > 0 {
                        particle.katt = katt / f64::from(n);
                    }
                }
                Ok(decision)
            }
            SiteEstimate::Unaimed => {
                let normal = *self.plane.normal();
                let records = self.walker.compute(
                    self.geometry.as_ref(),
                    particle.region,
                    &particle.x,
                    &normal,
                )?;
                let datt = records.last().map_or(0.0, |record| record.t);
                let w_att = if datt > 0.0 {
                    (-datt * self.attenuation.muatt_avg(gle)).exp()
                } else {
                    1.0
                };
                let katt = particle.weight * w_att * muen;
                let decision = pdis_split(
                    fsplit,
                    katt,
                    primary_mean,
                    &mut particle.weight,
                    PdisRounding::AboveOne,
                    &mut self.rng,
                );
                particle.katt = -1.0;
                Ok(decision)
            }
        }
    }

    /// Resolves the split decision and performs the interaction at the
    /// particle's position in `medium`.
    fn interact(
        &mut self,
        particle: Particle,
        decision: SplitDecision,
        medium: usize,
        cohfac: f64,
    ) -> CbctResult<()> {
        let mut particle = particle;
        let Some(nsplit) = decision.resolve(&mut particle) else {
            self.diagnostics.zero_splits += 1;
            return Ok(());
        };
        let gle = particle.gle();
        match self.survives_absorption(gle, medium, cohfac) {
            Some(rayleigh) => self.scatter(particle, nsplit, rayleigh),
            None => Ok(()),
        }
    }

    /// Photo-absorption roulette: `None` when the photon is absorbed,
    /// otherwise whether it scatters coherently.
    pub(super) fn survives_absorption(&mut self, gle: f64, medium: usize, cohfac: f64) -> Option<bool> {
        let r_adjust = 1.0 - (1.0 - self.attenuation.gbr2(medium, gle)) * cohfac;
        if self.rng.uniform() > r_adjust {
            self.diagnostics.photo_absorptions += 1;
            return None;
        }
        Some(self.attenuation.rayleigh() && self.rng.uniform() * r_adjust < 1.0 - cohfac)
    }

    pub(super) fn scatter(&mut self, particle: Particle, nsplit: u32, rayleigh: bool) -> CbctResult<()> {
        if rayleigh {
            self.do_rayleigh(particle, nsplit)
        } else {
            self.do_compton(particle, nsplit)
        }
    }
}
