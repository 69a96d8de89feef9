//! Cross-section lookup for transport and scoring.
//!
//! All per-medium tables are log-energy interpolators. Mean free paths are at
//! nominal density and exclude coherent scattering; multiply by `cohe` to
//! include it.

use super::media::MediaTable;
use crate::domain::{CbctError, CbctResult, codes};
use crate::geometry::Geometry;
use crate::numerics::LogEnergyInterpolator;
use tracing::info;

const TABLE_BINS: usize = 1024;

#[derive(Debug, Clone)]
struct MediumTables {
    gmfp: LogEnergyInterpolator,
    cohe: LogEnergyInterpolator,
    gbr2: LogEnergyInterpolator,
}

#[derive(Debug, Clone)]
pub struct AttenuationModel {
    tables: Vec<MediumTables>,
    muen: LogEnergyInterpolator,
    muatt_avg: Option<LogEnergyInterpolator>,
    rayleigh: bool,
}

impl AttenuationModel {
    pub fn new(media: &MediaTable, muen_medium: usize, rayleigh: bool) -> CbctResult<Self> {
        let tables = media
            .iter()
            .map(|medium| {
                Ok(MediumTables {
                    gmfp: LogEnergyInterpolator::from_table(
                        &medium.energies,
                        &medium.incoherent_mfp(),
                        TABLE_BINS,
                    )?,
                    cohe: LogEnergyInterpolator::from_table(
                        &medium.energies,
                        &medium.cohe(),
                        TABLE_BINS,
                    )?,
                    gbr2: LogEnergyInterpolator::from_table(
                        &medium.energies,
                        &medium.gbr2(),
                        TABLE_BINS,
                    )?,
                })
            })
            .collect::<CbctResult<Vec<_>>>()?;
        let scoring = media.get(muen_medium).ok_or_else(|| {
            CbctError::input_validation(
                codes::INPUT_MEDIA,
                format!("muen medium index {muen_medium} is not defined"),
            )
        })?;
        let muen = LogEnergyInterpolator::from_table(
            &scoring.energies,
            &scoring.energy_absorption(),
            TABLE_BINS,
        )?;
        Ok(Self {
            tables,
            muen,
            muatt_avg: None,
            rayleigh,
        })
    }

    pub fn rayleigh(&self) -> bool {
        self.rayleigh
    }

    pub fn media(&self) -> usize {
        self.tables.len()
    }

    /// Incoherent mean free path at nominal density, cm.
    #[inline]
    pub fn gmfp(&self, medium: usize, gle: f64) -> f64 {
        self.tables[medium].gmfp.interpolate(gle)
    }

    #[inline]
    pub fn cohe(&self, medium: usize, gle: f64) -> f64 {
        self.tables[medium].cohe.interpolate(gle)
    }

    #[inline]
    pub fn gbr2(&self, medium: usize, gle: f64) -> f64 {
        self.tables[medium].gbr2.interpolate(gle)
    }

    /// Factor applied to the incoherent mean free path: `cohe` with
    /// Rayleigh scattering on, 1 otherwise.
    #[inline]
    pub fn cohfac(&self, medium: usize, gle: f64) -> f64 {
        if self.rayleigh {
            self.cohe(medium, gle)
        } else {
            1.0
        }
    }

    /// Mean free path for transport, cm at nominal density.
    #[inline]
    pub fn transport_mfp(&self, medium: usize, gle: f64) -> f64 {
        self.gmfp(medium, gle) * self.cohfac(medium, gle)
    }

    /// `E·μen/ρ` of the scoring medium.
    #[inline]
    pub fn muen(&self, gle: f64) -> f64 {
        self.muen.interpolate(gle)
    }

    pub fn has_average(&self) -> bool {
        self.muatt_avg.is_some()
    }

    /// Average linear attenuation coefficient, 1/cm. Zero before
    /// [`setup_average`](Self::setup_average).
    #[inline]
    pub fn muatt_avg(&self, gle: f64) -> f64 {
        self.muatt_avg
            .as_ref()
            .map_or(0.0, |interp| interp.interpolate_fast(gle))
    }

    /// Builds the region-count weighted average attenuation coefficient.
    ///
    /// Vacuum regions carry no weight.
    pub fn setup_average(&mut self, geometry: &dyn Geometry) -> CbctResult<()> {
        let mut weights = vec![0.0; self.tables.len()];
        let mut filled = 0.0;
        for region in 0..geometry.regions() {
            if let Some(medium) = geometry.medium(region) {
                weights[medium] += 1.0;
                filled += 1.0;
            }
        }
        if filled == 0.0 || self.tables.is_empty() {
            return Err(CbctError::input_validation(
                codes::INPUT_GEOMETRY,
                "average attenuation needs at least one non-vacuum region",
            ));
        }
        for weight in &mut weights {
            *weight /= filled;
        }

        let gmin = self
            .tables
            .iter()
            .map(|tables| tables.gmfp.gmin())
            .fold(f64::INFINITY, f64::min);
        let gmax = self
            .tables
            .iter()
            .map(|tables| tables.gmfp.gmax())
            .fold(f64::NEG_INFINITY, f64::max);
        let interp = LogEnergyInterpolator::from_fn(gmin, gmax, TABLE_BINS, |gle| {
            weights
                .iter()
                .enumerate()
                .filter(|(_, weight)| **weight > 0.0)
                .map(|(medium, weight)| weight / self.transport_mfp(medium, gle))
                .sum()
        })?;
        info!(
            emin = gmin.exp(),
            emax = gmax.exp(),
            "average attenuation coefficient ready"
        );
        self.muatt_avg = Some(interp);
        Ok(())
    }

    /// Largest relative density over the non-vacuum regions.
    pub fn max_relative_rho(geometry: &dyn Geometry) -> f64 {
        if !geometry.has_rho_scaling() {
            return 1.0;
        }
        (0..geometry.regions())
            .filter(|region| geometry.medium(*region).is_some())
            .map(|region| geometry.relative_rho(region))
            .fold(0.0, f64::max)
    }
}
