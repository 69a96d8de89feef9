use crate::common::config::ScoringPlaneConfig;
use crate::common::constants::{GRAZING_COSINE_FLOOR, MAX_OPTICAL_DEPTH};
use crate::domain::{CbctError, CbctResult, codes};
use nalgebra::Vector3;

/// A ray that reaches the detector: the pixel it lands in and the distance
/// travelled to get there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenHit {
    pub pixel: usize,
    pub distance: f64,
}

/// Rectangular pixelated detector plane `a·x = d`.
///
/// Pixels are numbered `i + j·nx` from the corner at `-size/2` along both
/// in-plane axes.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringPlane {
    normal: Vector3<f64>,
    distance: f64,
    midpoint: Vector3<f64>,
    ux: Vector3<f64>,
    uy: Vector3<f64>,
    size: [f64; 2],
    pixel_size: [f64; 2],
    pixels: [usize; 2],
}

impl ScoringPlane {
    pub fn new(
        midpoint: Vector3<f64>,
        normal: Vector3<f64>,
        x_axis: Vector3<f64>,
        size: [f64; 2],
        pixels: [usize; 2],
    ) -> CbctResult<Self> {
        let invalid = |message: &str| CbctError::input_validation(codes::INPUT_SCORING_PLANE, message);
        if normal.norm() == 0.0 {
            return Err(invalid("scoring plane normal must not be zero"));
        }
        if pixels.contains(&0) || size.iter().any(|s| *s <= 0.0) {
            return Err(invalid("scoring plane needs a positive size and pixel count"));
        }
        let normal = normal.normalize();
        // project the x axis into the plane
        let ux = x_axis - normal * normal.dot(&x_axis);
        if ux.norm() < 1e-10 {
            return Err(invalid("scoring plane x axis must not be parallel to its normal"));
        }
        let ux = ux.normalize();
        let uy = normal.cross(&ux);
        Ok(Self {
            normal,
            distance: normal.dot(&midpoint),
            midpoint,
            ux,
            uy,
            size,
            pixel_size: [size[0] / pixels[0] as f64, size[1] / pixels[1] as f64],
            pixels,
        })
    }

    pub fn from_config(config: &ScoringPlaneConfig) -> CbctResult<Self> {
        Self::new(
            Vector3::from(config.midpoint),
            Vector3::from(config.normal),
            Vector3::from(config.x_axis),
            config.size,
            config.pixels,
        )
    }

    pub fn normal(&self) -> &Vector3<f64> {
        &self.normal
    }

    /// Cosine between `u` and the plane normal.
    #[inline]
    pub fn cosine(&self, u: &Vector3<f64>) -> f64 {
        self.normal.dot(u)
    }

    pub fn pixels(&self) -> usize {
        self.pixels[0] * self.pixels[1]
    }

    pub fn nx(&self) -> usize {
        self.pixels[0]
    }

    pub fn ny(&self) -> usize {
        self.pixels[1]
    }

    pub fn pixel_size(&self) -> [f64; 2] {
        self.pixel_size
    }

    pub fn central_pixel(&self) -> usize {
        self.pixels[0] / 2 + (self.pixels[1] / 2) * self.pixels[0]
    }

    /// In-plane coordinates of the centre of `pixel`, relative to the midpoint.
    pub fn pixel_center(&self, pixel: usize) -> (f64, f64) {
        let i = pixel % self.pixels[0];
        let j = pixel / self.pixels[0];
        (
            (i as f64 + 0.5) * self.pixel_size[0] - 0.5 * self.size[0],
            (j as f64 + 0.5) * self.pixel_size[1] - 0.5 * self.size[1],
        )
    }

    /// Pixel hit by the ray `x + t·u`, `t > 0`, if it lands inside the plane.
    pub fn hits(&self, x: &Vector3<f64>, u: &Vector3<f64>) -> Option<ScreenHit> {
        let xp = self.normal.dot(x);
        let up = self.normal.dot(u);
        let heading = (up > 0.0 && self.distance > xp) || (up < 0.0 && self.distance < xp);
        if !heading {
            return None;
        }
        let t = (self.distance - xp) / up;
        let x1 = x + u * t - self.midpoint;
        let xcomp = x1.dot(&self.ux) + 0.5 * self.size[0];
        let ycomp = x1.dot(&self.uy) + 0.5 * self.size[1];
        if xcomp <= 0.0 || xcomp >= self.size[0] || ycomp <= 0.0 || ycomp >= self.size[1] {
            return None;
        }
        let i = ((xcomp / self.pixel_size[0]) as usize).min(self.pixels[0] - 1);
        let j = ((ycomp / self.pixel_size[1]) as usize).min(self.pixels[1] - 1);
        Some(ScreenHit {
            pixel: i + j * self.pixels[0],
            distance: t,
        })
    }
}

/// Kerma a photon of `weight` deposits at the plane after `optical_depth`
/// mean free paths: `wt/max(|cos|, 0.08)·e^{-Λ}·μen`.
///
/// Returns `None` when the optical depth is 80 or more.
pub fn transmitted_kerma(weight: f64, muen: f64, cosine: f64, optical_depth: f64) -> Option<f64> {
    if optical_depth >= MAX_OPTICAL_DEPTH {
        return None;
    }
    let aup = cosine.abs().max(GRAZING_COSINE_FLOOR);
    Some(weight / aup * (-optical_depth).exp() * muen)
}
