use crate::common::config::MediumConfig;
use crate::domain::{CbctError, CbctResult, codes};

/// Tabulated photon data of one medium at its nominal density.
#[derive(Debug, Clone, PartialEq)]
pub struct Medium {
    pub name: String,
    pub density: f64,
    pub energies: Vec<f64>,
    pub mu_over_rho: Vec<f64>,
    pub muen_over_rho: Vec<f64>,
    pub coherent_fraction: Vec<f64>,
    pub photo_fraction: Vec<f64>,
}

impl Medium {
    pub fn from_config(config: &MediumConfig) -> Self {
        let n = config.energies.len();
        let or_zeros = |table: &[f64]| {
            if table.is_empty() {
                vec![0.0; n]
            } else {
                table.to_vec()
            }
        };
        Self {
            name: config.name.clone(),
            density: config.density,
            energies: config.energies.clone(),
            mu_over_rho: config.mu_over_rho.clone(),
            muen_over_rho: config.muen_over_rho.clone(),
            coherent_fraction: or_zeros(&config.coherent_fraction),
            photo_fraction: or_zeros(&config.photo_fraction),
        }
    }

    /// `(ln Emin, ln Emax)` of the table.
    pub fn log_energy_range(&self) -> (f64, f64) {
        let first = self.energies.first().copied().unwrap_or(1.0);
        let last = self.energies.last().copied().unwrap_or(1.0);
        (first.ln(), last.ln())
    }

    /// Mean free path in cm excluding coherent scattering.
    pub fn incoherent_mfp(&self) -> Vec<f64> {
        self.mu_over_rho
            .iter()
            .zip(&self.coherent_fraction)
            .map(|(mu, fc)| 1.0 / (self.density * mu * (1.0 - fc)))
            .collect()
    }

    /// Share of the total attenuation that is not coherent scattering.
    pub fn cohe(&self) -> Vec<f64> {
        self.coherent_fraction.iter().map(|fc| 1.0 - fc).collect()
    }

    /// Share of the non-coherent attenuation that is not photo-absorption.
    pub fn gbr2(&self) -> Vec<f64> {
        self.coherent_fraction
            .iter()
            .zip(&self.photo_fraction)
            .map(|(fc, fp)| (1.0 - fp / (1.0 - fc)).clamp(0.0, 1.0))
            .collect()
    }

    /// `E·μen/ρ` in MeV·cm²/g.
    pub fn energy_absorption(&self) -> Vec<f64> {
        self.energies
            .iter()
            .zip(&self.muen_over_rho)
            .map(|(energy, muen)| energy * muen)
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MediaTable {
    media: Vec<Medium>,
}

impl MediaTable {
    pub fn from_config(configs: &[MediumConfig]) -> CbctResult<Self> {
        let media: Vec<Medium> = configs.iter().map(Medium::from_config).collect();
        for (i, medium) in media.iter().enumerate() {
            if media[..i].iter().any(|other| other.name == medium.name) {
                return Err(CbctError::input_validation(
                    codes::INPUT_MEDIA,
                    format!("medium '{}' is defined twice", medium.name),
                ));
            }
        }
        Ok(Self { media })
    }

    pub fn len(&self) -> usize {
        self.media.len()
    }

    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.media.iter().position(|medium| medium.name == name)
    }

    pub fn get(&self, index: usize) -> Option<&Medium> {
        self.media.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Medium> {
        self.media.iter()
    }
}
