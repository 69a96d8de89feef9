//! Geometry services consumed by transport.
//!
//! Regions are `usize` indices; `None` stands for the outside of the geometry.
//! Media are `usize` indices into the media table; `None` is vacuum.

mod intersections;
mod voxel;

pub use intersections::IntersectionWalker;
pub use voxel::VoxelGeometry;

use crate::common::constants::INFINITE_DISTANCE;
use nalgebra::Vector3;

/// One segment of a ray: the ray is in `region` until cumulative distance `t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionRecord {
    pub t: f64,
    pub region: Option<usize>,
    pub medium: Option<usize>,
    pub rhof: f64,
}

impl Default for IntersectionRecord {
    fn default() -> Self {
        Self {
            t: 0.0,
            region: None,
            medium: None,
            rhof: 1.0,
        }
    }
}

/// Result of a boundary query: the particle may travel `distance` and is then
/// in `region`. When no boundary lies within the requested distance the region
/// is unchanged and `distance` equals the request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub distance: f64,
    pub region: Option<usize>,
}

pub trait Geometry {
    fn regions(&self) -> usize;

    fn is_where(&self, x: &Vector3<f64>) -> Option<usize>;

    fn howfar(
        &self,
        region: Option<usize>,
        x: &Vector3<f64>,
        u: &Vector3<f64>,
        max_distance: f64,
    ) -> Step;

    /// Lower bound on the distance to the nearest boundary.
    fn hownear(&self, region: Option<usize>, x: &Vector3<f64>) -> f64;

    fn medium(&self, region: usize) -> Option<usize>;

    fn relative_rho(&self, _region: usize) -> f64 {
        1.0
    }

    fn has_rho_scaling(&self) -> bool {
        false
    }

    /// Regions per axis, for geometries that are rectilinear voxel grids.
    fn region_counts(&self) -> Option<[usize; 3]> {
        None
    }

    /// Fills `records` with the segments of the ray starting at `x`.
    ///
    /// Returns `None` when `records` is too small to hold them all.
    fn compute_intersections(
        &self,
        region: Option<usize>,
        x: &Vector3<f64>,
        u: &Vector3<f64>,
        records: &mut [IntersectionRecord],
    ) -> Option<usize> {
        let n = records.len();
        if n == 0 {
            return None;
        }
        let mut x = *x;
        let mut region = region;
        let mut first = 0;
        let mut total = 0.0;
        let mut medium;
        match region {
            None => {
                let step = self.howfar(None, &x, u, INFINITE_DISTANCE);
                let Some(entered) = step.region else {
                    return Some(0);
                };
                records[0] = IntersectionRecord {
                    t: step.distance,
                    region: None,
                    medium: None,
                    rhof: 1.0,
                };
                total = step.distance;
                first = 1;
                x += u * step.distance;
                region = Some(entered);
                medium = self.medium(entered);
            }
            Some(current) => medium = self.medium(current),
        }

        for j in first..n {
            let Some(current) = region else {
                return Some(j);
            };
            let step = self.howfar(region, &x, u, INFINITE_DISTANCE);
            total += step.distance;
            records[j] = IntersectionRecord {
                t: total,
                region: Some(current),
                medium,
                rhof: self.relative_rho(current),
            };
            match step.region {
                Some(next) if next != current => {
                    region = Some(next);
                    medium = self.medium(next);
                    x += u * step.distance;
                }
                _ => return Some(j + 1),
            }
        }
        None
    }
}
