//! Split interactions.
//!
//! A photon with split number `n` interacts `n` times with weight `wt/n`.
//! Every scattered photon is then checked against the detector: aimed ones are
//! kept, the others play Russian roulette with survival probability `1/Ns`.

use super::TransportEngine;
use crate::domain::CbctResult;
use crate::physics::kernel::{rotate, sample_klein_nishina};
use crate::transport::particle::Particle;

impl TransportEngine {
    /// Aims `particle` at the detector and plays roulette if it misses.
    ///
    /// Survivors get their weight multiplied by the survival factor, which is
    /// also cached as their next split number.
    pub(super) fn check_particle(&mut self, particle: &mut Particle) -> bool {
        let hit = self.plane.hits(&particle.x, &particle.u);
        particle.detector = hit.map(|h| h.pixel);
        particle.ddet = hit.map_or(0.0, |h| h.distance);
        let iwt = self.policy.check_particle(hit.is_some(), &mut self.rng);
        if iwt == 0 {
            self.diagnostics.roulette_kills += 1;
            return false;
        }
        particle.weight *= f64::from(iwt);
        particle.phat = iwt;
        true
    }

    pub(super) fn do_rayleigh(&mut self, particle: Particle, nsplit: u32) -> CbctResult<()> {
        self.diagnostics.rayleigh += 1;
        let mut parent = particle;
        parent.weight /= f64::from(nsplit);
        parent.latch += 1;
        parent.phat = 1;
        for _ in 0..nsplit {
            let mut candidate = parent;
            self.kernel.rayleigh(&mut candidate, &mut self.rng);
            if self.check_particle(&mut candidate) {
                self.stack.push(candidate)?;
            }
        }
        Ok(())
    }

    pub(super) fn do_compton(&mut self, particle: Particle, nsplit: u32) -> CbctResult<()> {
        self.diagnostics.compton += 1;
        if self.kernel.bound_compton() {
            self.bound_compton(particle, nsplit)
        } else {
            self.fast_compton(particle, nsplit)
        }
    }

    /// Lets the kernel perform each of the `nsplit` events. Electrons are
    /// discarded; a rejected event puts the photon copy back on the stack
    /// unchanged.
    fn bound_compton(&mut self, particle: Particle, nsplit: u32) -> CbctResult<()> {
        let mut copy = particle;
        copy.weight /= f64::from(nsplit);
        copy.phat = 1;
        let latch = particle.latch + 1;
        for _ in 0..nsplit {
            let base = self.stack.len();
            self.stack.push(copy)?;
            let products = self.kernel.compton(&mut self.stack, &mut self.rng)?;
            if products == 0 {
                self.diagnostics.rejected_compton += 1;
                self.stack.truncate(base);
                self.stack.push(copy)?;
                continue;
            }
            let mut j = base;
            while let Some(product) = self.stack.get(j).copied() {
                if !product.is_photon() {
                    self.stack.kill(j);
                    continue;
                }
                let mut photon = product;
                photon.latch = latch;
                if self.check_particle(&mut photon) {
                    if let Some(slot) = self.stack.get_mut(j) {
                        *slot = photon;
                    }
                    j += 1;
                } else {
                    self.stack.kill(j);
                }
            }
        }
        Ok(())
    }

    /// Samples the `nsplit` Klein-Nishina events directly, stratifying the
    /// first energy trial over `[0, 1)`.
    fn fast_compton(&mut self, particle: Particle, nsplit: u32) -> CbctResult<()> {
        let n = f64::from(nsplit);
        let wthin = particle.weight / n;
        let eta = self.rng.uniform();
        for j in 0..nsplit {
            let r1 = (eta + f64::from(j)) / n;
            let sample = sample_klein_nishina(particle.energy, r1, &mut self.rng);
            let energy = sample.br * particle.energy;
            if energy <= self.settings.photon_cutoff {
                continue;
            }
            let (cost, sint) = sample.angles();
            let (cphi, sphi) = self.rng.azimuth();
            let mut photon = particle;
            photon.energy = energy;
            photon.u = rotate(&particle.u, cost, sint, cphi, sphi).normalize();
            photon.weight = wthin;
            photon.latch = particle.latch + 1;
            if self.check_particle(&mut photon) {
                self.stack.push(photon)?;
            }
        }
        Ok(())
    }
}
