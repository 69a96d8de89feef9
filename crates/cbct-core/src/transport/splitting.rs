//! Split-number decisions for photon interactions.
//!
//! Every scheme reduces to the same stochastic rounding step: the real split
//! number `asplit` becomes `n = floor(asplit)` or `n + 1` with probability
//! equal to the fractional part, and the weight is rescaled by `n/asplit` so
//! that each of the `n` copies later carries `wt/asplit`.

use super::splitter::Splitter;
use crate::numerics::RandomGenerator;
use crate::transport::particle::Particle;
use nalgebra::Vector3;

/// Outcome of a split-number query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDecision {
    /// A fresh split number; 0 discards the particle.
    Recompute(u32),
    /// Keep the number cached in the particle's `phat`.
    UseCached,
}

impl SplitDecision {
    /// Applies the decision to `particle` and returns the split number to use,
    /// or `None` when the particle must be discarded.
    pub fn resolve(self, particle: &mut Particle) -> Option<u32> {
        match self {
            Self::Recompute(0) => None,
            Self::Recompute(n) => {
                particle.phat = n;
                Some(n)
            }
            Self::UseCached => Some(particle.phat.max(1)),
        }
    }
}

/// Rounds `asplit` stochastically and rescales `weight` by `n/asplit`.
///
/// Non-positive `asplit` yields 0 and leaves the weight untouched.
pub fn stochastic_round(asplit: f64, weight: &mut f64, rng: &mut RandomGenerator) -> u32 {
    if asplit <= 0.0 {
        return 0;
    }
    let mut n = asplit.floor();
    *weight /= asplit;
    if rng.uniform() < asplit - n {
        n += 1.0;
    }
    *weight *= n;
    n as u32
}

/// Whether PDIS rounds every split number or only those above one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdisRounding {
    Always,
    AboveOne,
}

/// PDIS split number for an attenuated kerma estimate `katt`:
/// `asplit = fsplit·katt/⟨Katt⟩`.
pub fn pdis_split(
    fsplit: f64,
    katt: f64,
    primary_mean: f64,
    weight: &mut f64,
    rounding: PdisRounding,
    rng: &mut RandomGenerator,
) -> SplitDecision {
    if primary_mean <= 0.0 {
        return SplitDecision::UseCached;
    }
    let asplit = fsplit * katt / primary_mean;
    match rounding {
        PdisRounding::Always => SplitDecision::Recompute(stochastic_round(asplit, weight, rng)),
        PdisRounding::AboveOne if asplit > 1.0 => {
            SplitDecision::Recompute(stochastic_round(asplit, weight, rng))
        }
        PdisRounding::AboveOne => SplitDecision::Recompute(1),
    }
}

/// Plane towards which PDIS estimates attenuation: `depth(x) = d - a·x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttenuationPlane {
    pub normal: Vector3<f64>,
    pub distance: f64,
    /// Medium used for the attenuation; the average medium when `None`.
    pub medium: Option<usize>,
}

impl AttenuationPlane {
    pub fn new(point: Vector3<f64>, normal: Vector3<f64>, medium: Option<usize>) -> Self {
        let normal = normal.normalize();
        Self {
            normal,
            distance: normal.dot(&point),
            medium,
        }
    }

    #[inline]
    pub fn depth(&self, x: &Vector3<f64>) -> f64 {
        self.distance - self.normal.dot(x)
    }
}

/// Running mean of the forced-detection score of primary photons.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PrimaryAverage {
    sum: f64,
    count: u64,
}

impl PrimaryAverage {
    pub fn from_parts(sum: f64, count: u64) -> Self {
        Self { sum, count }
    }

    pub fn merge(&mut self, other: &Self) {
        self.sum += other.sum;
        self.count += other.count;
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn add(&mut self, score: f64) {
        self.sum += score;
        self.count += 1;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

#[derive(Debug, Clone)]
pub enum SplittingScheme {
    /// Constant split numbers (FS).
    Fixed,
    /// Region-dependent importance sampling (RDIS).
    Importance(Splitter),
    /// Position-dependent importance sampling (PDIS).
    Position {
        fsplit: f64,
        plane: Option<AttenuationPlane>,
    },
}

/// Split numbers `Np` for photons aimed at the detector and `Ns` for the rest,
/// plus the scheme deciding per-interaction split numbers.
#[derive(Debug, Clone)]
pub struct SplittingPolicy {
    pub scheme: SplittingScheme,
    pub np: u32,
    pub ns: u32,
}

impl SplittingPolicy {
    pub fn fixed(np: u32, ns: u32) -> Self {
        Self {
            scheme: SplittingScheme::Fixed,
            np: np.max(1),
            ns: ns.max(1),
        }
    }

    pub fn is_position_dependent(&self) -> bool {
        matches!(self.scheme, SplittingScheme::Position { .. })
    }

    pub fn splitter(&self) -> Option<&Splitter> {
        match &self.scheme {
            SplittingScheme::Importance(splitter) => Some(splitter),
            _ => None,
        }
    }

    pub fn splitter_mut(&mut self) -> Option<&mut Splitter> {
        match &mut self.scheme {
            SplittingScheme::Importance(splitter) => Some(splitter),
            _ => None,
        }
    }

    /// Reference split number of aimed photons: `fsplit` under PDIS, `Np` otherwise.
    pub fn primary_split(&self) -> f64 {
        match &self.scheme {
            SplittingScheme::Position { fsplit, .. } => *fsplit,
            _ => f64::from(self.np),
        }
    }

    /// Russian roulette for a source photon that misses the detector.
    ///
    /// Survivors get weight `Ns/N` and split number `Ns`, where `N` is the
    /// reference split number. Returns `None` when the photon is killed.
    pub fn roulette_source(&self, weight: &mut f64, rng: &mut RandomGenerator) -> Option<u32> {
        let reference = self.primary_split();
        let ns = f64::from(self.ns);
        if ns <= reference {
            return Some(self.np);
        }
        if rng.uniform() * ns > reference {
            return None;
        }
        *weight *= ns / reference;
        Some(self.ns)
    }

    /// Survival test for a photon produced by a split interaction.
    ///
    /// Aimed photons are kept with factor 1; the others survive with
    /// probability `1/Ns` and get factor `Ns`. 0 means killed.
    pub fn check_particle(&self, aimed: bool, rng: &mut RandomGenerator) -> u32 {
        if aimed {
            1
        } else if rng.uniform() * f64::from(self.ns) < 1.0 {
            self.ns
        } else {
            0
        }
    }

    /// FS/RDIS split number for a photon interacting in `region`.
    ///
    /// Cached numbers are kept under FS and while the splitter warms up.
    pub fn importance_split(
        &self,
        region: Option<usize>,
        weight: &mut f64,
        rng: &mut RandomGenerator,
    ) -> SplitDecision {
        let SplittingScheme::Importance(splitter) = &self.scheme else {
            return SplitDecision::UseCached;
        };
        if splitter.is_warming() {
            return SplitDecision::UseCached;
        }
        let importance = region.map_or(splitter.min_importance(), |r| splitter.importance(r));
        let asplit = *weight * importance * f64::from(self.np);
        if asplit > 1.0 {
            SplitDecision::Recompute(stochastic_round(asplit, weight, rng))
        } else {
            SplitDecision::Recompute(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AttenuationPlane, PdisRounding, PrimaryAverage, SplitDecision, SplittingPolicy,
        SplittingScheme, pdis_split, stochastic_round,
    };
    use crate::numerics::RandomGenerator;
    use crate::transport::particle::Particle;
    use crate::transport::splitter::Splitter;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn stochastic_rounding_keeps_the_expected_split_weight() {
        let mut rng = RandomGenerator::new(21, 0);
        let asplit = 3.3;
        let trials = 200_000;
        let mut copies = 0.0;
        let mut carried = 0.0;
        for _ in 0..trials {
            let mut weight = 1.0;
            let n = stochastic_round(asplit, &mut weight, &mut rng);
            assert!(n == 3 || n == 4);
            copies += f64::from(n);
            // each of the n copies later carries weight/n
            carried += weight;
        }
        assert_relative_eq!(copies / trials as f64, asplit, epsilon = 0.01);
        assert_relative_eq!(carried / trials as f64, 1.0, epsilon = 0.005);
    }

    #[test]
    fn non_positive_split_numbers_kill_without_touching_the_weight() {
        let mut rng = RandomGenerator::new(1, 0);
        let mut weight = 0.7;
        assert_eq!(stochastic_round(0.0, &mut weight, &mut rng), 0);
        assert_eq!(weight, 0.7);
        assert_eq!(rng.count(), 0);
    }

    #[test]
    fn decisions_update_or_reuse_the_cached_split() {
        let mut particle = Particle::photon(0.05, 1.0, Vector3::zeros(), Vector3::z());
        particle.phat = 7;
        assert_eq!(SplitDecision::UseCached.resolve(&mut particle), Some(7));
        assert_eq!(SplitDecision::Recompute(3).resolve(&mut particle), Some(3));
        assert_eq!(particle.phat, 3);
        assert_eq!(SplitDecision::Recompute(0).resolve(&mut particle), None);
    }

    #[test]
    fn pdis_split_normalises_by_the_primary_mean() {
        let mut rng = RandomGenerator::new(2, 0);
        let mut weight = 1.0;
        assert_eq!(
            pdis_split(10.0, 0.5, 0.0, &mut weight, PdisRounding::Always, &mut rng),
            SplitDecision::UseCached
        );
        let decision = pdis_split(10.0, 0.5, 1.0, &mut weight, PdisRounding::Always, &mut rng);
        assert_eq!(decision, SplitDecision::Recompute(5));
        assert_relative_eq!(weight, 1.0);

        let mut weight = 1.0;
        let decision = pdis_split(1.0, 0.2, 1.0, &mut weight, PdisRounding::AboveOne, &mut rng);
        assert_eq!(decision, SplitDecision::Recompute(1));
        assert_eq!(weight, 1.0);
    }

    #[test]
    fn source_roulette_preserves_the_expected_weight() {
        let policy = SplittingPolicy::fixed(2, 10);
        let mut rng = RandomGenerator::new(3, 0);
        let trials = 100_000;
        let mut total = 0.0;
        for _ in 0..trials {
            let mut weight = 1.0;
            if let Some(n) = policy.roulette_source(&mut weight, &mut rng) {
                assert_eq!(n, 10);
                total += weight;
            }
        }
        assert_relative_eq!(total / trials as f64, 1.0, epsilon = 0.03);

        let gentle = SplittingPolicy::fixed(10, 2);
        let mut weight = 1.0;
        assert_eq!(gentle.roulette_source(&mut weight, &mut rng), Some(10));
        assert_eq!(weight, 1.0);
    }

    #[test]
    fn check_particle_keeps_aimed_photons() {
        let policy = SplittingPolicy::fixed(1, 4);
        let mut rng = RandomGenerator::new(4, 0);
        assert_eq!(policy.check_particle(true, &mut rng), 1);
        let survivors = (0..40_000)
            .filter(|_| policy.check_particle(false, &mut rng) == 4)
            .count();
        assert_relative_eq!(survivors as f64 / 40_000.0, 0.25, epsilon = 0.01);
    }

    #[test]
    fn importance_split_uses_cached_numbers_while_warming() {
        let splitter = Splitter::new([2, 1, 1], [2, 1, 1], 1, 10, 1000).expect("splitter builds");
        let mut policy = SplittingPolicy {
            scheme: SplittingScheme::Importance(splitter),
            np: 1,
            ns: 1,
        };
        let mut rng = RandomGenerator::new(5, 0);
        let mut weight = 1.0;
        assert_eq!(
            policy.importance_split(Some(0), &mut weight, &mut rng),
            SplitDecision::UseCached
        );
        policy
            .splitter_mut()
            .expect("importance scheme has a splitter")
            .stop_warming();
        // importances start at one: wt·C·Np = 1 is not above one
        assert_eq!(
            policy.importance_split(Some(0), &mut weight, &mut rng),
            SplitDecision::Recompute(1)
        );
        // outside the geometry Cmin = 10 applies
        let decision = policy.importance_split(None, &mut weight, &mut rng);
        assert_eq!(decision, SplitDecision::Recompute(10));
        assert_relative_eq!(weight, 1.0);
    }

    #[test]
    fn attenuation_plane_depth_is_signed_distance() {
        let plane = AttenuationPlane::new(Vector3::new(0.0, 0.0, 5.0), Vector3::new(0.0, 0.0, 2.0), None);
        assert_relative_eq!(plane.depth(&Vector3::new(1.0, 1.0, 2.0)), 3.0);
        assert!(plane.depth(&Vector3::new(0.0, 0.0, 6.0)) < 0.0);

        let mut average = PrimaryAverage::default();
        assert_eq!(average.mean(), 0.0);
        average.add(1.0);
        average.add(3.0);
        assert_relative_eq!(average.mean(), 2.0);
        assert_eq!(average.count(), 2);
    }
}
