//! Importance grid for region-dependent splitting.
//!
//! A coarse `Vx·Vy·Vz` grid is laid over the `vx·vy·vz` voxel geometry. Each
//! importance voxel accumulates the signal `K_i` scored by photons that last
//! interacted inside it and the weight `N_i` of those photons; importances are
//! recomputed from these sums at every batch boundary.

use crate::common::config::{SplitterSetupConfig, SplitterSignal};
use crate::domain::{CbctError, CbctResult, codes};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Splitter {
    grid: [usize; 3],
    geometry: [usize; 3],
    multiplicity: [usize; 3],
    /// Importance voxel of every geometry region.
    index: Vec<usize>,
    importance: Vec<f64>,
    signal: Vec<f64>,
    weight: Vec<f64>,
    np: u32,
    min_splitting: u32,
    max_splitting: u32,
    warming: bool,
}

impl Splitter {
    /// `geometry` are the region counts of the voxel geometry, `grid` the
    /// importance voxels per axis.
    pub fn new(
        geometry: [usize; 3],
        grid: [usize; 3],
        np: u32,
        min_splitting: u32,
        max_splitting: u32,
    ) -> CbctResult<Self> {
        for axis in 0..3 {
            let (v, big_v) = (geometry[axis], grid[axis]);
            if big_v == 0 || v < big_v {
                return Err(CbctError::input_validation(
                    codes::INPUT_SPLITTER,
                    format!(
                        "splitter geometry has {big_v} regions on axis {axis}, the geometry only {v}"
                    ),
                ));
            }
            if v % big_v != 0 {
                return Err(CbctError::input_validation(
                    codes::INPUT_SPLITTER,
                    format!(
                        "splitter regions on axis {axis} ({big_v}) must divide the geometry regions ({v})"
                    ),
                ));
            }
        }
        if max_splitting <= min_splitting {
            return Err(CbctError::input_validation(
                codes::INPUT_SPLITTER,
                "maximum splitting must exceed minimum splitting",
            ));
        }
        let multiplicity = [
            geometry[0] / grid[0],
            geometry[1] / grid[1],
            geometry[2] / grid[2],
        ];
        let nv = grid[0] * grid[1] * grid[2];
        let mut splitter = Self {
            grid,
            geometry,
            multiplicity,
            index: Vec::new(),
            importance: vec![1.0; nv],
            signal: vec![0.0; nv],
            weight: vec![0.0; nv],
            np: np.max(1),
            min_splitting,
            max_splitting,
            warming: true,
        };
        let nreg = geometry[0] * geometry[1] * geometry[2];
        splitter.index = (0..nreg).map(|region| splitter.find_voxel(region)).collect();
        Ok(splitter)
    }

    pub fn from_config(
        setup: &SplitterSetupConfig,
        geometry: [usize; 3],
        np: u32,
    ) -> CbctResult<Self> {
        let grid = match setup.grid.as_slice() {
            [n] => [*n, *n, *n],
            [nx, ny, nz] => [*nx, *ny, *nz],
            _ => {
                return Err(CbctError::input_validation(
                    codes::INPUT_SPLITTER,
                    "'splitter geometry' needs one or three region counts",
                ));
            }
        };
        let min_splitting = if setup.min_splitting > 0 {
            setup.min_splitting
        } else {
            crate::common::constants::DEFAULT_MIN_SPLITTING
        };
        Self::new(geometry, grid, np, min_splitting, setup.max_splitting)
    }

    fn find_voxel(&self, region: usize) -> usize {
        let [vx, vy, _] = self.geometry;
        let vxy = vx * vy;
        let iz = region / vxy;
        let iy = (region % vxy) / vx;
        let ix = region % vx;
        let [mx, my, mz] = self.multiplicity;
        ix / mx + (iy / my) * self.grid[0] + (iz / mz) * self.grid[0] * self.grid[1]
    }

    pub fn voxels(&self) -> usize {
        self.importance.len()
    }

    pub fn voxel_of(&self, region: usize) -> Option<usize> {
        self.index.get(region).copied()
    }

    pub fn is_warming(&self) -> bool {
        self.warming
    }

    pub fn stop_warming(&mut self) {
        self.warming = false;
    }

    pub fn min_importance(&self) -> f64 {
        f64::from(self.min_splitting) / f64::from(self.np)
    }

    pub fn max_importance(&self) -> f64 {
        f64::from(self.max_splitting) / f64::from(self.np)
    }

    /// Importance of the voxel containing `region`; `Cmin` outside the grid.
    pub fn importance(&self, region: usize) -> f64 {
        self.voxel_of(region)
            .map_or(self.min_importance(), |voxel| self.importance[voxel])
    }

    pub fn importances(&self) -> &[f64] {
        &self.importance
    }

    /// Adds signal `sc` carried by weight `wt` to the voxel of `region`.
    pub fn score(&mut self, region: Option<usize>, sc: f64, wt: f64) {
        let Some(voxel) = region.and_then(|r| self.voxel_of(r)) else {
            return;
        };
        self.signal[voxel] += sc;
        self.weight[voxel] += wt;
    }

    /// Recomputes the importances from the accumulated signal.
    ///
    /// `Scattered` normalises by the mean signal over all scoring voxels,
    /// `Attenuated` by `primary_mean`. Sums are never reset.
    pub fn update(&mut self, signal: SplitterSignal, primary_mean: f64) {
        let (cmin, cmax) = (self.min_importance(), self.max_importance());
        let mut kt = 0.0;
        let mut nt = 0.0;
        for ((c, k), n) in self.importance.iter_mut().zip(&self.signal).zip(&self.weight) {
            *c = 0.0;
            if *n == 0.0 {
                continue;
            }
            *c = k / n;
            kt += k;
            nt += n;
        }
        let aux = match signal {
            SplitterSignal::Scattered if kt > 0.0 => nt / kt,
            SplitterSignal::Attenuated if primary_mean > 0.0 => 1.0 / primary_mean,
            _ => 0.0,
        };
        for c in &mut self.importance {
            *c = (*c * aux).clamp(cmin, cmax);
        }
        debug!(
            average_split = self.average_splitting(),
            scoring_voxels = self.scoring_voxels(),
            "splitter importances updated"
        );
    }

    /// `Np·Σ C_i N_i / Σ N_i` over the voxels that have scored.
    pub fn average_splitting(&self) -> f64 {
        let nt: f64 = self.weight.iter().sum();
        if nt <= 0.0 {
            return 0.0;
        }
        let weighted: f64 = self
            .importance
            .iter()
            .zip(&self.weight)
            .map(|(c, n)| c * n)
            .sum();
        f64::from(self.np) * weighted / nt
    }

    pub fn scoring_voxels(&self) -> usize {
        self.weight.iter().filter(|n| **n > 0.0).count()
    }

    pub fn describe(&self, signal: SplitterSignal) {
        info!(
            grid = ?self.grid,
            geometry = ?self.geometry,
            multiplicity = ?self.multiplicity,
            nmin = self.min_splitting,
            nmax = self.max_splitting,
            np = self.np,
            signal = ?signal,
            "RDIS splitter"
        );
    }
}
