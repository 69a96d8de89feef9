//! Interaction physics consumed by the variance-reduction engine.
//!
//! The engine only needs directions and energies of interaction products;
//! everything else about the physics lives behind [`InteractionKernel`].

use crate::common::constants::ELECTRON_REST_ENERGY;
use crate::domain::CbctResult;
use crate::numerics::RandomGenerator;
use crate::transport::particle::{Particle, ParticleStack};
use nalgebra::Vector3;

pub trait InteractionKernel {
    /// Whether Compton events may be rejected by binding effects. When false
    /// the engine samples split Compton events itself from Klein-Nishina.
    fn bound_compton(&self) -> bool;

    /// Coherent scattering: changes the direction of `particle` in place.
    fn rayleigh(&self, particle: &mut Particle, rng: &mut RandomGenerator);

    /// Pops the top photon and pushes its Compton products.
    ///
    /// Returns the number of products pushed; 0 means the event was rejected.
    fn compton(&self, stack: &mut ParticleStack, rng: &mut RandomGenerator) -> CbctResult<usize>;
}

/// Outcome of one Klein-Nishina draw: `Br = E'/E`, `Temp = 1 - cosθ`,
/// `Sinthe = sin²θ`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KleinNishinaSample {
    pub br: f64,
    pub temp: f64,
    pub sinthe: f64,
}

impl KleinNishinaSample {
    /// `(cosθ, sinθ)`; backscatter beyond the kinematic limit is folded to θ = π.
    pub fn angles(&self) -> (f64, f64) {
        if self.temp < 2.0 {
            (1.0 - self.temp, self.sinthe.max(0.0).sqrt())
        } else {
            (-1.0, 0.0)
        }
    }
}

/// Samples the Klein-Nishina energy fraction for a photon of `energy` MeV.
///
/// The first trial uses `r1`; rejected trials redraw it uniformly.
pub fn sample_klein_nishina(energy: f64, r1: f64, rng: &mut RandomGenerator) -> KleinNishinaSample {
    let ko = energy / ELECTRON_REST_ENERGY;
    let broi = 1.0 + 2.0 * ko;
    let bro = 1.0 / broi;
    let bro1 = 1.0 - bro;
    let rejmax = broi + bro;
    let mut r1 = r1;
    loop {
        let br = bro + bro1 * r1;
        let temp = (1.0 - br) / (ko * br);
        let sinthe = temp * (2.0 - temp);
        let rejf = br * br + 1.0 - br * sinthe;
        if rng.uniform() * br * rejmax < rejf {
            return KleinNishinaSample { br, temp, sinthe };
        }
        r1 = rng.uniform();
    }
}

/// Rotates `u` by polar angle `(cost, sint)` and azimuth `(cphi, sphi)`.
pub fn rotate(u: &Vector3<f64>, cost: f64, sint: f64, cphi: f64, sphi: f64) -> Vector3<f64> {
    let sinpsi2 = u.x * u.x + u.y * u.y;
    let us = sint * cphi;
    let vs = sint * sphi;
    if sinpsi2 > 1e-20 {
        let sinpsi = sinpsi2.sqrt();
        let sindel = u.y / sinpsi;
        let cosdel = u.x / sinpsi;
        Vector3::new(
            u.z * cosdel * us - sindel * vs + u.x * cost,
            u.z * sindel * us + cosdel * vs + u.y * cost,
            u.z * cost - sinpsi * us,
        )
    } else {
        Vector3::new(us, vs, cost * u.z.signum())
    }
}

/// Free-electron photon physics: Thomson-shaped coherent scattering and
/// Klein-Nishina Compton scattering. Compton events are never rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeElectronKernel {
    bound_compton: bool,
}

impl FreeElectronKernel {
    pub fn new(bound_compton: bool) -> Self {
        Self { bound_compton }
    }
}

impl InteractionKernel for FreeElectronKernel {
    fn bound_compton(&self) -> bool {
        self.bound_compton
    }

    fn rayleigh(&self, particle: &mut Particle, rng: &mut RandomGenerator) {
        let cost = loop {
            let c = 2.0 * rng.uniform() - 1.0;
            if 2.0 * rng.uniform() < 1.0 + c * c {
                break c;
            }
        };
        let sint = (1.0 - cost * cost).max(0.0).sqrt();
        let (cphi, sphi) = rng.azimuth();
        particle.u = rotate(&particle.u, cost, sint, cphi, sphi).normalize();
    }

    fn compton(&self, stack: &mut ParticleStack, rng: &mut RandomGenerator) -> CbctResult<usize> {
        let Some(parent) = stack.pop() else {
            return Ok(0);
        };
        let r1 = rng.uniform();
        let sample = sample_klein_nishina(parent.energy, r1, rng);
        let (cost, sint) = sample.angles();
        let (cphi, sphi) = rng.azimuth();
        let u_photon = rotate(&parent.u, cost, sint, cphi, sphi).normalize();
        let e_photon = sample.br * parent.energy;

        let momentum = parent.u * parent.energy - u_photon * e_photon;
        let mut electron = parent;
        electron.charge = -1;
        electron.energy = parent.energy - e_photon;
        electron.u = if momentum.norm() > 0.0 {
            momentum.normalize()
        } else {
            parent.u
        };

        let mut photon = parent;
        photon.energy = e_photon;
        photon.u = u_photon;

        stack.push(photon)?;
        stack.push(electron)?;
        Ok(2)
    }
}
