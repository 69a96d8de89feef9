use super::{Geometry, Step};
use crate::common::config::{GeometryConfig, VACUUM_MEDIUM};
use crate::common::constants::INFINITE_DISTANCE;
use crate::domain::{CbctError, CbctResult, codes};
use nalgebra::Vector3;

/// Rectilinear box of `nx·ny·nz` regions bounded by plane positions on each
/// axis. Region `ix + iy·nx + iz·nx·ny`.
#[derive(Debug, Clone)]
pub struct VoxelGeometry {
    planes: [Vec<f64>; 3],
    counts: [usize; 3],
    media: Vec<Option<usize>>,
    rho: Vec<f64>,
    rho_scaled: bool,
}

impl VoxelGeometry {
    pub fn new(
        planes: [Vec<f64>; 3],
        media: Vec<Option<usize>>,
        rho: Option<Vec<f64>>,
    ) -> CbctResult<Self> {
        let counts = [
            planes[0].len().saturating_sub(1),
            planes[1].len().saturating_sub(1),
            planes[2].len().saturating_sub(1),
        ];
        if counts.contains(&0) {
            return Err(CbctError::input_validation(
                codes::INPUT_GEOMETRY,
                "each axis needs at least two planes",
            ));
        }
        if planes
            .iter()
            .any(|axis| axis.windows(2).any(|pair| pair[1] <= pair[0]))
        {
            return Err(CbctError::input_validation(
                codes::INPUT_GEOMETRY,
                "geometry planes must be strictly increasing",
            ));
        }
        let nreg = counts[0] * counts[1] * counts[2];
        let media = match media.len() {
            1 => vec![media[0]; nreg],
            n if n == nreg => media,
            n => {
                return Err(CbctError::input_validation(
                    codes::INPUT_GEOMETRY,
                    format!("{n} media given for {nreg} regions"),
                ));
            }
        };
        let (rho, rho_scaled) = match rho {
            None => (vec![1.0; nreg], false),
            Some(values) if values.len() == 1 => (vec![values[0]; nreg], true),
            Some(values) if values.len() == nreg => (values, true),
            Some(values) => {
                return Err(CbctError::input_validation(
                    codes::INPUT_GEOMETRY,
                    format!("{} relative densities given for {nreg} regions", values.len()),
                ));
            }
        };
        Ok(Self {
            planes,
            counts,
            media,
            rho,
            rho_scaled,
        })
    }

    /// Resolves medium names through `lookup`; `"vacuum"` maps to no medium.
    pub fn from_config(
        config: &GeometryConfig,
        lookup: impl Fn(&str) -> Option<usize>,
    ) -> CbctResult<Self> {
        let media = config
            .media
            .iter()
            .map(|name| {
                if name == VACUUM_MEDIUM {
                    return Ok(None);
                }
                lookup(name).map(Some).ok_or_else(|| {
                    CbctError::input_validation(
                        codes::INPUT_MEDIA,
                        format!("geometry refers to unknown medium '{name}'"),
                    )
                })
            })
            .collect::<CbctResult<Vec<_>>>()?;
        let rho = (!config.relative_density.is_empty()).then(|| config.relative_density.clone());
        Self::new(
            [
                config.x_planes.clone(),
                config.y_planes.clone(),
                config.z_planes.clone(),
            ],
            media,
            rho,
        )
    }

    pub fn region_index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        ix + iy * self.counts[0] + iz * self.counts[0] * self.counts[1]
    }

    pub fn axis_indices(&self, region: usize) -> [usize; 3] {
        let nxy = self.counts[0] * self.counts[1];
        [
            region % self.counts[0],
            (region % nxy) / self.counts[0],
            region / nxy,
        ]
    }

    pub fn media_in_use(&self) -> &[Option<usize>] {
        &self.media
    }

    fn locate(planes: &[f64], value: f64) -> Option<usize> {
        let last = planes.len() - 1;
        if value < planes[0] || value >= planes[last] {
            return None;
        }
        Some(planes.partition_point(|p| *p <= value) - 1)
    }

    fn entry_distance(&self, x: &Vector3<f64>, u: &Vector3<f64>) -> Option<(f64, usize)> {
        let mut t_enter = f64::NEG_INFINITY;
        let mut t_exit = f64::INFINITY;
        let mut enter_axis = 0;
        for axis in 0..3 {
            let lo = self.planes[axis][0];
            let hi = self.planes[axis][self.counts[axis]];
            if u[axis] == 0.0 {
                if x[axis] < lo || x[axis] >= hi {
                    return None;
                }
                continue;
            }
            let (t0, t1) = {
                let a = (lo - x[axis]) / u[axis];
                let b = (hi - x[axis]) / u[axis];
                if a < b { (a, b) } else { (b, a) }
            };
            if t0 > t_enter {
                t_enter = t0;
                enter_axis = axis;
            }
            t_exit = t_exit.min(t1);
        }
        (t_enter < t_exit && t_enter >= 0.0).then_some((t_enter, enter_axis))
    }
}

impl Geometry for VoxelGeometry {
    fn regions(&self) -> usize {
        self.media.len()
    }

    fn is_where(&self, x: &Vector3<f64>) -> Option<usize> {
        let ix = Self::locate(&self.planes[0], x.x)?;
        let iy = Self::locate(&self.planes[1], x.y)?;
        let iz = Self::locate(&self.planes[2], x.z)?;
        Some(self.region_index(ix, iy, iz))
    }

    fn howfar(
        &self,
        region: Option<usize>,
        x: &Vector3<f64>,
        u: &Vector3<f64>,
        max_distance: f64,
    ) -> Step {
        let Some(current) = region else {
            return match self.entry_distance(x, u) {
                Some((t, axis)) if t <= max_distance => {
                    let entry = x + u * t;
                    let mut index = [0usize; 3];
                    for a in 0..3 {
                        index[a] = if a == axis {
                            if u[a] > 0.0 { 0 } else { self.counts[a] - 1 }
                        } else {
                            Self::locate(&self.planes[a], entry[a])
                                .unwrap_or(if entry[a] < self.planes[a][0] {
                                    0
                                } else {
                                    self.counts[a] - 1
                                })
                        };
                    }
                    Step {
                        distance: t,
                        region: Some(self.region_index(index[0], index[1], index[2])),
                    }
                }
                _ => Step {
                    distance: max_distance,
                    region: None,
                },
            };
        };

        let mut index = self.axis_indices(current);
        let mut t_min = INFINITE_DISTANCE;
        let mut exit_axis = None;
        for axis in 0..3 {
            let planes = &self.planes[axis];
            let t = if u[axis] > 0.0 {
                (planes[index[axis] + 1] - x[axis]) / u[axis]
            } else if u[axis] < 0.0 {
                (planes[index[axis]] - x[axis]) / u[axis]
            } else {
                continue;
            };
            let t = t.max(0.0);
            if t < t_min {
                t_min = t;
                exit_axis = Some(axis);
            }
        }
        let Some(axis) = exit_axis.filter(|_| t_min <= max_distance) else {
            return Step {
                distance: max_distance,
                region: Some(current),
            };
        };
        let next = if u[axis] > 0.0 {
            (index[axis] + 1 < self.counts[axis]).then(|| index[axis] + 1)
        } else {
            index[axis].checked_sub(1)
        };
        let region = next.map(|i| {
            index[axis] = i;
            self.region_index(index[0], index[1], index[2])
        });
        Step {
            distance: t_min,
            region,
        }
    }

    fn hownear(&self, region: Option<usize>, x: &Vector3<f64>) -> f64 {
        match region {
            Some(current) => {
                let index = self.axis_indices(current);
                (0..3)
                    .map(|axis| {
                        let lo = self.planes[axis][index[axis]];
                        let hi = self.planes[axis][index[axis] + 1];
                        (x[axis] - lo).min(hi - x[axis])
                    })
                    .fold(INFINITE_DISTANCE, f64::min)
                    .max(0.0)
            }
            None => (0..3)
                .map(|axis| {
                    let lo = self.planes[axis][0];
                    let hi = self.planes[axis][self.counts[axis]];
                    (lo - x[axis]).max(x[axis] - hi).max(0.0)
                })
                .map(|d| d * d)
                .sum::<f64>()
                .sqrt(),
        }
    }

    fn medium(&self, region: usize) -> Option<usize> {
        self.media.get(region).copied().flatten()
    }

    fn relative_rho(&self, region: usize) -> f64 {
        self.rho.get(region).copied().unwrap_or(1.0)
    }

    fn has_rho_scaling(&self) -> bool {
        self.rho_scaled
    }

    fn region_counts(&self) -> Option<[usize; 3]> {
        Some(self.counts)
    }
}
