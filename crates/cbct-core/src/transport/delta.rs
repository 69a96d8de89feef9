//! Tracking of photons that miss the detector.

use super::TransportEngine;
use super::selector::SiteEstimate;
use crate::common::constants::INFINITE_DISTANCE;
use crate::domain::CbctResult;
use crate::transport::particle::Particle;

/// Where a tracked photon interacts: the medium of its (updated) region and
/// the coherent factor at its energy there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSite {
    pub medium: usize,
    pub cohfac: f64,
}

impl TransportEngine {
    pub(super) fn transport_unaimed(
        &mut self,
        particle: Particle,
        lambda: f64,
        wtr: f64,
    ) -> CbctResult<()> {
        let mut particle = particle;
        if self.settings.latch_exhausted(particle.latch) {
            self.diagnostics.latch_truncations += 1;
            return Ok(());
        }
        particle.weight *= wtr;
        let Some(site) = self.track(&mut particle, lambda) else {
            self.diagnostics.escaped += 1;
            return Ok(());
        };
        let gle = particle.gle();
        let Some(rayleigh) = self.survives_absorption(gle, site.medium, site.cohfac) else {
            return Ok(());
        };
        let decision = self.split_at_site(&mut particle, SiteEstimate::Unaimed)?;
        let Some(nsplit) = decision.resolve(&mut particle) else {
            self.diagnostics.zero_splits += 1;
            return Ok(());
        };
        self.scatter(particle, nsplit, rayleigh)
    }

    /// Samples a fresh number of mean free paths and tracks `particle` to its
    /// next interaction. `None` means it left the geometry.
    pub fn sample_interaction_site(&mut self, particle: &mut Particle) -> Option<TrackSite> {
        let lambda = self.rng.exponential_mfp();
        self.track(particle, lambda)
    }

    fn track(&mut self, particle: &mut Particle, lambda: f64) -> Option<TrackSite> {
        match self.settings.delta_medium {
            Some(delta) => self.woodcock(particle, lambda, delta),
            None => self.track_exact(particle, lambda),
        }
    }

    fn site(&self, medium: usize, gle: f64) -> TrackSite {
        TrackSite {
            medium,
            cohfac: self.attenuation.cohfac(medium, gle),
        }
    }

    /// Transport mean free path in `region` scaled by its relative density.
    fn local_mfp(&self, region: usize, medium: usize, gle: f64) -> f64 {
        let rhor = self.geometry.relative_rho(region);
        if rhor > 0.0 {
            self.attenuation.transport_mfp(medium, gle) / rhor
        } else {
            INFINITE_DISTANCE
        }
    }

    /// Boundary-by-boundary tracking through the real media.
    pub(super) fn track_exact(&mut self, particle: &mut Particle, lambda: f64) -> Option<TrackSite> {
        let gle = particle.gle();
        let mut lambda = lambda;
        loop {
            let region = particle.region?;
            let medium = self.geometry.medium(region);
            let gmfp = medium.map(|m| self.local_mfp(region, m, gle));
            let t = gmfp.map_or(INFINITE_DISTANCE, |mfp| lambda * mfp);
            let step = self.geometry.howfar(Some(region), &particle.x, &particle.u, t);
            particle.x += particle.u * step.distance;
            match step.region {
                None => {
                    particle.region = None;
                    return None;
                }
                Some(next) if next == region => {
                    return medium.map(|m| self.site(m, gle));
                }
                Some(next) => {
                    if let Some(mfp) = gmfp {
                        lambda -= step.distance / mfp;
                    }
                    particle.region = Some(next);
                }
            }
        }
    }

    /// Woodcock tracking with the delta medium's cross section scaled by the
    /// largest relative density. Vacuum and the surrounding medium are crossed
    /// exactly.
    fn woodcock(&mut self, particle: &mut Particle, lambda: f64, delta: usize) -> Option<TrackSite> {
        let gle = particle.gle();
        let gmfp_max = self.attenuation.transport_mfp(delta, gle) / self.rhormax;
        let air = self.settings.surrounding;
        let mut lambda = lambda;
        loop {
            let mut region = particle.region?;
            let mut medium = self.geometry.medium(region);
            while medium.is_none() || medium == air {
                let air_mfp = medium.map(|m| self.local_mfp(region, m, gle));
                let t = air_mfp.map_or(INFINITE_DISTANCE, |mfp| lambda * mfp);
                let step = self.geometry.howfar(Some(region), &particle.x, &particle.u, t);
                particle.x += particle.u * step.distance;
                let Some(next) = step.region else {
                    particle.region = None;
                    return None;
                };
                if next == region {
                    return medium.map(|m| self.site(m, gle));
                }
                if let Some(mfp) = air_mfp {
                    lambda -= step.distance / mfp;
                }
                region = next;
                medium = self.geometry.medium(next);
                particle.region = Some(next);
            }

            particle.x += particle.u * (lambda * gmfp_max);
            particle.region = self.geometry.is_where(&particle.x);
            let region = particle.region?;
            if let Some(m) = self.geometry.medium(region) {
                let gmfp = self.local_mfp(region, m, gle);
                if self.rng.uniform() * gmfp < gmfp_max {
                    return Some(self.site(m, gle));
                }
            }
            self.diagnostics.delta_rejections += 1;
            lambda = self.rng.exponential_mfp();
        }
    }
}
