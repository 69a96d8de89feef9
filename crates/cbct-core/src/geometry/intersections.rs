use super::{Geometry, IntersectionRecord};
use crate::common::constants::{INITIAL_INTERSECTIONS, MAX_INTERSECTIONS};
use crate::domain::{CbctError, CbctResult, codes};
use nalgebra::Vector3;
use tracing::debug;

/// Caller-owned intersection buffer that doubles on overflow and never shrinks.
#[derive(Debug, Clone)]
pub struct IntersectionWalker {
    records: Vec<IntersectionRecord>,
    len: usize,
}

impl Default for IntersectionWalker {
    fn default() -> Self {
        Self::with_capacity(INITIAL_INTERSECTIONS)
    }
}

impl IntersectionWalker {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: vec![IntersectionRecord::default(); capacity.max(1)],
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    pub fn compute(
        &mut self,
        geometry: &dyn Geometry,
        region: Option<usize>,
        x: &Vector3<f64>,
        u: &Vector3<f64>,
    ) -> CbctResult<&[IntersectionRecord]> {
        loop {
            if let Some(n) = geometry.compute_intersections(region, x, u, &mut self.records) {
                self.len = n;
                return Ok(&self.records[..n]);
            }
            let grown = self.records.len() * 2;
            if grown > MAX_INTERSECTIONS {
                return Err(CbctError::input_validation(
                    codes::RUN_INTERSECTION_CEILING,
                    format!(
                        "a ray crosses more than {MAX_INTERSECTIONS} boundaries; the geometry is too fine for forced detection"
                    ),
                ));
            }
            debug!(capacity = grown, "growing intersection buffer");
            self.records.resize(grown, IntersectionRecord::default());
        }
    }

    /// Records of the last successful [`compute`](Self::compute).
    pub fn last(&self) -> &[IntersectionRecord] {
        &self.records[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::IntersectionWalker;
    use crate::common::constants::MAX_INTERSECTIONS;
    use crate::geometry::{Geometry, VoxelGeometry};
    use nalgebra::Vector3;

    fn layered(n: usize) -> VoxelGeometry {
        let z: Vec<f64> = (0..=n).map(|i| i as f64).collect();
        VoxelGeometry::new([vec![-1.0, 1.0], vec![-1.0, 1.0], z], vec![Some(0)], None)
            .expect("geometry should build")
    }

    #[test]
    fn buffer_doubles_until_the_ray_fits() {
        let geometry = layered(20);
        let mut walker = IntersectionWalker::with_capacity(4);
        let n = walker
            .compute(
                &geometry,
                None,
                &Vector3::new(0.0, 0.0, -1.0),
                &Vector3::new(0.0, 0.0, 1.0),
            )
            .expect("ray should fit after growth")
            .len();
        assert_eq!(n, 21);
        assert_eq!(walker.capacity(), 32);
        assert_eq!(walker.last().len(), 21);
        assert_eq!(geometry.regions(), 20);
    }

    #[test]
    fn ceiling_is_a_configuration_error() {
        let geometry = layered(MAX_INTERSECTIONS + 1);
        let mut walker = IntersectionWalker::with_capacity(MAX_INTERSECTIONS);
        let error = walker
            .compute(
                &geometry,
                Some(0),
                &Vector3::new(0.0, 0.0, 0.5),
                &Vector3::new(0.0, 0.0, 1.0),
            )
            .expect_err("ray is longer than the ceiling");
        assert_eq!(error.code(), "RUN.INTERSECTION_CEILING");
        assert_eq!(error.exit_code(), 2);
    }
}
