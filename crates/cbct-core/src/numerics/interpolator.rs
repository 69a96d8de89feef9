use crate::domain::{CbctError, CbctResult, codes};

/// Piecewise-linear interpolation in `gle = ln(E)` on a uniform grid.
///
/// Bin `i` covers `[gmin + i/bx, gmin + (i+1)/bx)` and evaluates `a[i] + b[i]·gle`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEnergyInterpolator {
    gmin: f64,
    gmax: f64,
    ax: f64,
    bx: f64,
    a: Vec<f64>,
    b: Vec<f64>,
}

impl LogEnergyInterpolator {
    /// Builds from values sampled at `n` equidistant points spanning `[gmin, gmax]`.
    pub fn from_samples(gmin: f64, gmax: f64, values: &[f64]) -> CbctResult<Self> {
        if values.len() < 2 || gmax <= gmin || !gmin.is_finite() || !gmax.is_finite() {
            return Err(CbctError::input_validation(
                codes::INPUT_INTERPOLATION_GRID,
                format!(
                    "interpolation grid needs two samples over a non-empty range, got {} over [{gmin}, {gmax}]",
                    values.len()
                ),
            ));
        }
        let nbins = values.len() - 1;
        let bx = nbins as f64 / (gmax - gmin);
        let ax = -gmin * bx;
        let mut a = Vec::with_capacity(nbins);
        let mut b = Vec::with_capacity(nbins);
        for i in 0..nbins {
            let g0 = gmin + i as f64 / bx;
            let slope = (values[i + 1] - values[i]) * bx;
            b.push(slope);
            a.push(values[i] - slope * g0);
        }
        Ok(Self {
            gmin,
            gmax,
            ax,
            bx,
            a,
            b,
        })
    }

    pub fn from_fn(
        gmin: f64,
        gmax: f64,
        nbins: usize,
        f: impl Fn(f64) -> f64,
    ) -> CbctResult<Self> {
        let nbins = nbins.max(1);
        let step = (gmax - gmin) / nbins as f64;
        let values: Vec<f64> = (0..=nbins).map(|i| f(gmin + i as f64 * step)).collect();
        Self::from_samples(gmin, gmax, &values)
    }

    /// Resamples a tabulated `(E, f)` curve, linear in `ln E` between table rows.
    pub fn from_table(energies: &[f64], values: &[f64], nbins: usize) -> CbctResult<Self> {
        if energies.len() < 2 || energies.len() != values.len() || energies[0] <= 0.0 {
            return Err(CbctError::input_validation(
                codes::INPUT_INTERPOLATION_GRID,
                "tabulated curve needs at least two positive energies with matching values",
            ));
        }
        let logs: Vec<f64> = energies.iter().map(|energy| energy.ln()).collect();
        let gmin = logs[0];
        let gmax = logs[logs.len() - 1];
        Self::from_fn(gmin, gmax, nbins, |gle| table_value(&logs, values, gle))
    }

    pub fn gmin(&self) -> f64 {
        self.gmin
    }

    pub fn gmax(&self) -> f64 {
        self.gmax
    }

    pub fn bins(&self) -> usize {
        self.a.len()
    }

    pub fn index(&self, gle: f64) -> usize {
        // `as` saturates negative values to zero.
        ((self.ax + self.bx * gle) as usize).min(self.a.len() - 1)
    }

    /// Hot-path evaluation for `gle` already known to lie in the table range.
    #[inline]
    pub fn interpolate_fast(&self, gle: f64) -> f64 {
        let i = self.index(gle);
        self.a[i] + self.b[i] * gle
    }

    /// Evaluation clamped to the tabulated domain.
    pub fn interpolate(&self, gle: f64) -> f64 {
        self.interpolate_fast(gle.clamp(self.gmin, self.gmax))
    }
}

fn table_value(logs: &[f64], values: &[f64], gle: f64) -> f64 {
    let upper = logs.partition_point(|g| *g <= gle).clamp(1, logs.len() - 1);
    let lower = upper - 1;
    let span = logs[upper] - logs[lower];
    let t = ((gle - logs[lower]) / span).clamp(0.0, 1.0);
    values[lower] + t * (values[upper] - values[lower])
}
