//! Analog transport for track-length scoring.
//!
//! Photons are tracked exactly from interaction to interaction without any
//! splitting. Those that leave the geometry score the kerma they carry to the
//! detector.

use super::TransportEngine;
use crate::domain::CbctResult;

impl TransportEngine {
    pub(super) fn run_analog(&mut self) -> CbctResult<()> {
        while let Some(particle) = self.stack.pop() {
            let mut particle = particle;
            if !particle.is_photon() {
                continue;
            }
            if particle.energy < self.settings.photon_cutoff {
                self.diagnostics.below_cutoff += 1;
                continue;
            }
            let lambda = self.rng.exponential_mfp();
            let Some(site) = self.track_exact(&mut particle, lambda) else {
                self.diagnostics.escaped += 1;
                self.score_leaving(&particle);
                continue;
            };
            if self.settings.latch_exhausted(particle.latch) {
                self.diagnostics.latch_truncations += 1;
                continue;
            }

            let gle = particle.gle();
            if self.attenuation.rayleigh() && self.rng.uniform() < 1.0 - site.cohfac {
                self.diagnostics.rayleigh += 1;
                self.kernel.rayleigh(&mut particle, &mut self.rng);
                particle.latch += 1;
                self.stack.push(particle)?;
                continue;
            }
            if self.rng.uniform() > self.attenuation.gbr2(site.medium, gle) {
                self.diagnostics.photo_absorptions += 1;
                continue;
            }

            self.diagnostics.compton += 1;
            let base = self.stack.len();
            self.stack.push(particle)?;
            if self.kernel.compton(&mut self.stack, &mut self.rng)? == 0 {
                self.diagnostics.rejected_compton += 1;
                self.stack.truncate(base);
                self.stack.push(particle)?;
                continue;
            }
            let mut j = base;
            while let Some(product) = self.stack.get_mut(j) {
                if product.is_photon() {
                    product.latch = particle.latch + 1;
                    j += 1;
                } else {
                    self.stack.kill(j);
                }
            }
        }
        Ok(())
    }
}
