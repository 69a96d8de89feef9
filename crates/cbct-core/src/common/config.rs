//! JSON simulation configuration.
//!
//! Key names follow the input keys of the CBCT application (`"RDIS splitting"`,
//! `"delta transport medium"`, `"statistical accuracy sought"`, ...). Loading
//! validates everything that can be checked without building the geometry.

use crate::common::constants::{
    DEFAULT_MAX_SPLITTING, DEFAULT_MAX_STACK, DEFAULT_MIN_SPLITTING, DEFAULT_NBATCH,
    DEFAULT_NCHUNK, DEFAULT_WATCHER_INTERVAL_SECONDS, DEFAULT_WATCHER_RETRIES,
};
use crate::domain::{
    CalculationMode, CbctError, CbctResult, RunControlKind, ScoringMode, codes,
};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Region medium name that stands for vacuum.
pub const VACUUM_MEDIUM: &str = "vacuum";

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(rename = "output file", default = "default_output_file")]
    pub output_file: String,
    /// Photons below this energy (MeV) are discarded.
    #[serde(rename = "photon cutoff", default = "default_photon_cutoff")]
    pub photon_cutoff: f64,
    #[serde(rename = "rayleigh scattering", default = "default_true")]
    pub rayleigh: bool,
    #[serde(rename = "bound compton", default)]
    pub bound_compton: bool,
    /// Medium filling the space around the geometry; vacuum when absent.
    #[serde(rename = "surrounding medium", default)]
    pub surrounding_medium: Option<String>,
    #[serde(rename = "max stack", default = "default_max_stack")]
    pub max_stack: usize,
    pub media: Vec<MediumConfig>,
    pub geometry: GeometryConfig,
    pub source: SourceConfig,
    #[serde(rename = "scoring plane")]
    pub scoring_plane: ScoringPlaneConfig,
    #[serde(rename = "variance reduction", default)]
    pub variance_reduction: VarianceReductionConfig,
    #[serde(rename = "run control")]
    pub run_control: RunControlConfig,
    #[serde(default)]
    pub rng: RngConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediumConfig {
    pub name: String,
    /// g/cm^3
    pub density: f64,
    /// MeV, strictly increasing.
    pub energies: Vec<f64>,
    /// Total mass attenuation including coherent scattering, cm^2/g.
    #[serde(rename = "mu over rho")]
    pub mu_over_rho: Vec<f64>,
    #[serde(rename = "muen over rho")]
    pub muen_over_rho: Vec<f64>,
    /// Coherent share of the total attenuation at each energy.
    #[serde(rename = "coherent fraction", default)]
    pub coherent_fraction: Vec<f64>,
    /// Photo-absorption share of the total attenuation at each energy.
    #[serde(rename = "photo fraction", default)]
    pub photo_fraction: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeometryConfig {
    #[serde(rename = "x planes")]
    pub x_planes: Vec<f64>,
    #[serde(rename = "y planes")]
    pub y_planes: Vec<f64>,
    #[serde(rename = "z planes")]
    pub z_planes: Vec<f64>,
    /// One medium name per region, or a single name filling every region.
    pub media: Vec<String>,
    #[serde(rename = "relative density", default)]
    pub relative_density: Vec<f64>,
}

impl GeometryConfig {
    pub fn region_counts(&self) -> [usize; 3] {
        [
            self.x_planes.len().saturating_sub(1),
            self.y_planes.len().saturating_sub(1),
            self.z_planes.len().saturating_sub(1),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceShapeConfig {
    /// Mono-directional beam from a fixed point.
    Pencil {
        position: [f64; 3],
        direction: [f64; 3],
    },
    /// Point source aimed uniformly at a rectangle.
    Point {
        position: [f64; 3],
        #[serde(rename = "target center")]
        target_center: [f64; 3],
        #[serde(rename = "target x axis")]
        target_x_axis: [f64; 3],
        #[serde(rename = "target y axis")]
        target_y_axis: [f64; 3],
        #[serde(rename = "target size")]
        target_size: [f64; 2],
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SpectrumConfig {
    Monoenergetic(f64),
    Discrete {
        energies: Vec<f64>,
        probabilities: Vec<f64>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(flatten)]
    pub shape: SourceShapeConfig,
    pub energy: SpectrumConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringPlaneConfig {
    pub midpoint: [f64; 3],
    /// Plane normal; rays with positive projection travel towards the plane.
    pub normal: [f64; 3],
    #[serde(rename = "x axis")]
    pub x_axis: [f64; 3],
    /// Full widths along the x and y axes, cm.
    pub size: [f64; 2],
    pub pixels: [usize; 2],
    /// Medium whose mass energy-absorption coefficient converts fluence to kerma.
    #[serde(rename = "muen medium")]
    pub muen_medium: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SplitterSetupConfig {
    #[serde(rename = "splitter geometry")]
    pub grid: Vec<usize>,
    #[serde(rename = "minimum splitting", default = "default_min_splitting")]
    pub min_splitting: u32,
    #[serde(rename = "maximum splitting", default = "default_max_splitting")]
    pub max_splitting: u32,
    #[serde(rename = "signal type", default)]
    pub signal: SplitterSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitterSignal {
    Attenuated,
    #[default]
    Scattered,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttenuationPlaneConfig {
    pub point: [f64; 3],
    pub normal: [f64; 3],
    #[serde(rename = "attenuation medium", default)]
    pub medium: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VarianceReductionConfig {
    #[serde(rename = "scoring type", default)]
    pub scoring: ScoringMode,
    #[serde(default)]
    pub splitting: Option<Vec<f64>>,
    #[serde(rename = "FS splitting", default)]
    pub fs_splitting: Option<Vec<f64>>,
    #[serde(rename = "RDIS splitting", default)]
    pub rdis_splitting: Option<Vec<f64>>,
    #[serde(rename = "PDIS splitting", default)]
    pub pdis_splitting: Option<Vec<f64>>,
    #[serde(rename = "RDIS splitter setup", default)]
    pub splitter: Option<SplitterSetupConfig>,
    #[serde(rename = "attenuation plane", default)]
    pub attenuation_plane: Option<AttenuationPlaneConfig>,
    #[serde(rename = "mfp transform", default)]
    pub mfp_transform: Option<Vec<f64>>,
    #[serde(rename = "delta transport medium", default)]
    pub delta_transport_medium: Option<String>,
    #[serde(rename = "maximum latch", default)]
    pub maximum_latch: Option<i64>,
}

/// Splitting scheme resolved from the mutually exclusive input keys.
#[derive(Debug, Clone, PartialEq)]
pub enum SplittingInput {
    /// `"splitting"` without a splitter setup: fixed numbers, delta transport optional.
    Plain { np: u32, ns: u32 },
    Fixed { np: u32, ns: u32 },
    Rdis { np: u32, ns: u32 },
    Pdis { fsplit: f64, ns: u32 },
}

impl SplittingInput {
    pub fn requires_delta_transport(&self) -> bool {
        !matches!(self, Self::Plain { .. })
    }

    pub fn secondary_split(&self) -> u32 {
        match self {
            Self::Plain { ns, .. }
            | Self::Fixed { ns, .. }
            | Self::Rdis { ns, .. }
            | Self::Pdis { ns, .. } => *ns,
        }
    }
}

impl VarianceReductionConfig {
    /// The first matching key wins, in the order `splitting`, `FS splitting`,
    /// `RDIS splitting`, `PDIS splitting`. A splitter setup upgrades plain
    /// splitting to RDIS.
    pub fn splitting_input(&self) -> CbctResult<SplittingInput> {
        let resolved = if let Some(values) = &self.splitting {
            let (np, ns) = split_pair("splitting", values)?;
            SplittingInput::Plain { np, ns }
        } else if let Some(values) = &self.fs_splitting {
            let (np, ns) = split_pair("FS splitting", values)?;
            SplittingInput::Fixed { np, ns }
        } else if let Some(values) = &self.rdis_splitting {
            let (np, ns) = split_pair("RDIS splitting", values)?;
            SplittingInput::Rdis { np, ns }
        } else if let Some(values) = &self.pdis_splitting {
            if values.len() != 2 {
                return Err(CbctError::input_validation(
                    codes::INPUT_SPLITTING,
                    "'PDIS splitting' needs two values: fsplit and Ns",
                ));
            }
            let fsplit = if values[0] < 0.0 { 1.0 } else { values[0] };
            let ns = (values[1] as i64).max(1) as u32;
            SplittingInput::Pdis { fsplit, ns }
        } else {
            SplittingInput::Plain { np: 1, ns: 1 }
        };

        if self.splitter.is_some() {
            return Ok(match resolved {
                SplittingInput::Plain { np, ns } | SplittingInput::Fixed { np, ns } => {
                    SplittingInput::Rdis { np, ns }
                }
                other => other,
            });
        }
        Ok(resolved)
    }

    /// `(active, lambda0)`: one value is `lambda0`, two values use the second.
    pub fn mfp_transform(&self) -> Option<f64> {
        let values = self.mfp_transform.as_ref()?;
        let lambda0 = match values.as_slice() {
            [lambda0] => *lambda0,
            [_, lambda0] => *lambda0,
            _ => return None,
        };
        (lambda0 > 0.0).then_some(lambda0)
    }
}

fn split_pair(key: &str, values: &[f64]) -> CbctResult<(u32, u32)> {
    if values.len() != 2 {
        return Err(CbctError::input_validation(
            codes::INPUT_SPLITTING,
            format!("'{key}' needs two values: Np and Ns"),
        ));
    }
    let np = (values[0] as i64).max(1) as u32;
    let ns = (values[1] as i64).max(1) as u32;
    Ok((np, ns))
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunControlConfig {
    #[serde(alias = "number of histories")]
    pub ncase: f64,
    #[serde(default = "default_nbatch")]
    pub nbatch: usize,
    #[serde(default = "default_nchunk")]
    pub nchunk: usize,
    #[serde(rename = "max cpu hours allowed", default)]
    pub max_cpu_hours: Option<f64>,
    #[serde(rename = "statistical accuracy sought", default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub calculation: CalculationMode,
    #[serde(rename = "rco type", default)]
    pub kind: Option<RunControlKind>,
    #[serde(rename = "watcher retries", default = "default_watcher_retries")]
    pub watcher_retries: u32,
    #[serde(rename = "watcher interval", default = "default_watcher_interval")]
    pub watcher_interval: f64,
}

impl RunControlConfig {
    pub fn histories(&self) -> u64 {
        if self.ncase > 0.0 {
            self.ncase as u64
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RngConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for RngConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
        }
    }
}

impl SimulationConfig {
    pub fn from_json_str(source: &str) -> CbctResult<Self> {
        let config: Self = serde_json::from_str(source).map_err(|error| {
            CbctError::input_validation(codes::INPUT_CONFIG_PARSE, format!("invalid configuration: {error}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> CbctResult<Self> {
        let source = fs::read_to_string(path).map_err(|error| {
            CbctError::io_system(
                codes::IO_CONFIG_READ,
                format!("failed to read configuration '{}': {error}", path.display()),
            )
        })?;
        Self::from_json_str(&source)
    }

    pub fn medium_index(&self, name: &str) -> Option<usize> {
        self.media.iter().position(|medium| medium.name == name)
    }

    pub fn validate(&self) -> CbctResult<()> {
        if self.media.is_empty() {
            return Err(CbctError::input_validation(
                codes::INPUT_MEDIA,
                "at least one medium must be defined",
            ));
        }
        for medium in &self.media {
            medium.validate()?;
        }

        let nreg = {
            let [nx, ny, nz] = self.geometry.region_counts();
            if nx == 0 || ny == 0 || nz == 0 {
                return Err(CbctError::input_validation(
                    codes::INPUT_GEOMETRY,
                    "each axis needs at least two planes",
                ));
            }
            nx * ny * nz
        };
        for planes in [
            &self.geometry.x_planes,
            &self.geometry.y_planes,
            &self.geometry.z_planes,
        ] {
            if planes.windows(2).any(|pair| pair[1] <= pair[0]) {
                return Err(CbctError::input_validation(
                    codes::INPUT_GEOMETRY,
                    "geometry planes must be strictly increasing",
                ));
            }
        }
        if self.geometry.media.len() != 1 && self.geometry.media.len() != nreg {
            return Err(CbctError::input_validation(
                codes::INPUT_GEOMETRY,
                format!(
                    "geometry lists {} media for {nreg} regions",
                    self.geometry.media.len()
                ),
            ));
        }
        if !self.geometry.relative_density.is_empty()
            && self.geometry.relative_density.len() != 1
            && self.geometry.relative_density.len() != nreg
        {
            return Err(CbctError::input_validation(
                codes::INPUT_GEOMETRY,
                "relative density needs one value or one per region",
            ));
        }
        if self.geometry.relative_density.iter().any(|rho| *rho < 0.0) {
            return Err(CbctError::input_validation(
                codes::INPUT_GEOMETRY,
                "relative densities must not be negative",
            ));
        }
        for name in self.geometry.media.iter().filter(|name| *name != VACUUM_MEDIUM) {
            self.require_medium(name, "geometry")?;
        }
        if let Some(name) = &self.surrounding_medium {
            self.require_medium(name, "surrounding medium")?;
        }
        self.require_medium(&self.scoring_plane.muen_medium, "muen medium")?;
        if self.scoring_plane.pixels[0] == 0 || self.scoring_plane.pixels[1] == 0 {
            return Err(CbctError::input_validation(
                codes::INPUT_SCORING_PLANE,
                "scoring plane needs at least one pixel per axis",
            ));
        }
        if self.scoring_plane.size.iter().any(|size| *size <= 0.0) {
            return Err(CbctError::input_validation(
                codes::INPUT_SCORING_PLANE,
                "scoring plane size must be positive",
            ));
        }

        let vr = &self.variance_reduction;
        let splitting = vr.splitting_input()?;
        match &vr.delta_transport_medium {
            Some(name) => {
                self.require_medium(name, "delta transport medium")?;
            }
            None if splitting.requires_delta_transport() => {
                return Err(CbctError::input_validation(
                    codes::INPUT_DELTA_TRANSPORT,
                    "delta transport must be used with splitting",
                ));
            }
            None => {}
        }
        if let Some(splitter) = &vr.splitter {
            if splitter.max_splitting <= splitter.min_splitting {
                return Err(CbctError::input_validation(
                    codes::INPUT_SPLITTER,
                    "maximum splitting must exceed minimum splitting",
                ));
            }
            if splitter.grid.len() != 1 && splitter.grid.len() != 3 {
                return Err(CbctError::input_validation(
                    codes::INPUT_SPLITTER,
                    "'splitter geometry' needs one or three region counts",
                ));
            }
        }
        if let Some(plane) = &vr.attenuation_plane {
            if let Some(name) = &plane.medium {
                self.require_medium(name, "attenuation medium")?;
            }
        }

        if let SourceShapeConfig::Point { target_size, .. } = &self.source.shape {
            if target_size.iter().any(|size| *size <= 0.0) {
                return Err(CbctError::input_validation(
                    codes::INPUT_SOURCE,
                    "point source target size must be positive",
                ));
            }
        }
        match &self.source.energy {
            SpectrumConfig::Monoenergetic(energy) if *energy <= 0.0 => {
                return Err(CbctError::input_validation(
                    codes::INPUT_SOURCE,
                    "source energy must be positive",
                ));
            }
            SpectrumConfig::Discrete {
                energies,
                probabilities,
            } if energies.is_empty()
                || energies.len() != probabilities.len()
                || probabilities.iter().any(|p| *p < 0.0)
                || probabilities.iter().sum::<f64>() <= 0.0 =>
            {
                return Err(CbctError::input_validation(
                    codes::INPUT_SOURCE,
                    "spectrum needs matching non-negative energies and probabilities",
                ));
            }
            _ => {}
        }

        if self.run_control.nbatch == 0 || self.run_control.nchunk == 0 {
            return Err(CbctError::input_validation(
                codes::INPUT_RUN_CONTROL,
                "nbatch and nchunk must be positive",
            ));
        }
        if self.max_stack == 0 {
            return Err(CbctError::input_validation(
                codes::INPUT_MAX_STACK,
                "max stack must be positive",
            ));
        }
        Ok(())
    }

    fn require_medium(&self, name: &str, context: &str) -> CbctResult<usize> {
        self.medium_index(name).ok_or_else(|| {
            CbctError::input_validation(
                codes::INPUT_MEDIA,
                format!("{context} refers to unknown medium '{name}'"),
            )
        })
    }
}

impl MediumConfig {
    fn validate(&self) -> CbctResult<()> {
        let n = self.energies.len();
        let fail = |message: String| Err(CbctError::input_validation(codes::INPUT_MEDIA, message));
        if n < 2 {
            return fail(format!("medium '{}' needs at least two energies", self.name));
        }
        if self.density <= 0.0 {
            return fail(format!("medium '{}' needs a positive density", self.name));
        }
        if self.energies.windows(2).any(|pair| pair[1] <= pair[0]) || self.energies[0] <= 0.0 {
            return fail(format!(
                "medium '{}' energies must be positive and increasing",
                self.name
            ));
        }
        if self.mu_over_rho.len() != n || self.muen_over_rho.len() != n {
            return fail(format!(
                "medium '{}' coefficient tables must match its energy grid",
                self.name
            ));
        }
        for (label, table) in [
            ("coherent fraction", &self.coherent_fraction),
            ("photo fraction", &self.photo_fraction),
        ] {
            if !table.is_empty() && table.len() != n {
                return fail(format!("medium '{}' {label} must match its energy grid", self.name));
            }
            if table.iter().any(|value| !(0.0..1.0).contains(value)) {
                return fail(format!("medium '{}' {label} must lie in [0, 1)", self.name));
            }
        }
        Ok(())
    }
}

fn default_output_file() -> String {
    "egs_cbct".to_string()
}

fn default_photon_cutoff() -> f64 {
    0.001
}

fn default_true() -> bool {
    true
}

fn default_max_stack() -> usize {
    DEFAULT_MAX_STACK
}

fn default_nbatch() -> usize {
    DEFAULT_NBATCH
}

fn default_nchunk() -> usize {
    DEFAULT_NCHUNK
}

fn default_min_splitting() -> u32 {
    DEFAULT_MIN_SPLITTING
}

fn default_max_splitting() -> u32 {
    DEFAULT_MAX_SPLITTING
}

fn default_watcher_retries() -> u32 {
    DEFAULT_WATCHER_RETRIES
}

fn default_watcher_interval() -> f64 {
    DEFAULT_WATCHER_INTERVAL_SECONDS
}

fn default_seed() -> u64 {
    1802
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{SimulationConfig, SplittingInput, SplitterSignal};
    use crate::domain::{CalculationMode, RunControlKind, ScoringMode};
    use serde_json::{Value, json};

    pub(crate) fn water_slab_config() -> Value {
        json!({
            "output file": "slab",
            "media": [
                {
                    "name": "water",
                    "density": 1.0,
                    "energies": [0.01, 0.1, 1.0],
                    "mu over rho": [5.33, 0.1707, 0.0707],
                    "muen over rho": [4.94, 0.02546, 0.03103],
                    "coherent fraction": [0.05, 0.02, 0.001],
                    "photo fraction": [0.9, 0.02, 0.0]
                },
                {
                    "name": "air",
                    "density": 0.0012,
                    "energies": [0.01, 0.1, 1.0],
                    "mu over rho": [5.12, 0.1541, 0.0636],
                    "muen over rho": [4.74, 0.02325, 0.02789]
                }
            ],
            "geometry": {
                "x planes": [-5.0, 5.0],
                "y planes": [-5.0, 5.0],
                "z planes": [0.0, 2.0],
                "media": ["water"]
            },
            "source": {
                "type": "pencil",
                "position": [0.0, 0.0, -10.0],
                "direction": [0.0, 0.0, 1.0],
                "energy": 0.1
            },
            "scoring plane": {
                "midpoint": [0.0, 0.0, 10.0],
                "normal": [0.0, 0.0, 1.0],
                "x axis": [1.0, 0.0, 0.0],
                "size": [1.0, 1.0],
                "pixels": [1, 1],
                "muen medium": "air"
            },
            "run control": { "ncase": 1000 }
        })
    }

    #[test]
    fn minimal_config_uses_documented_defaults() {
        let config = SimulationConfig::from_json_str(&water_slab_config().to_string())
            .expect("config should parse");
        assert_eq!(config.run_control.histories(), 1000);
        assert_eq!(config.run_control.nbatch, 10);
        assert_eq!(config.run_control.nchunk, 10);
        assert_eq!(config.run_control.calculation, CalculationMode::First);
        assert_eq!(config.variance_reduction.scoring, ScoringMode::ForcedDetection);
        assert_eq!(
            config.variance_reduction.splitting_input().expect("splitting resolves"),
            SplittingInput::Plain { np: 1, ns: 1 }
        );
        assert!(config.rayleigh);
        assert_eq!(config.medium_index("air"), Some(1));
    }

    #[test]
    fn splitting_keys_resolve_in_priority_order() {
        let mut value = water_slab_config();
        value["variance reduction"] = json!({
            "RDIS splitting": [50, 10],
            "PDIS splitting": [100, 20],
            "delta transport medium": "water",
            "RDIS splitter setup": { "splitter geometry": [1] }
        });
        let config = SimulationConfig::from_json_str(&value.to_string()).expect("config parses");
        let vr = &config.variance_reduction;
        assert_eq!(
            vr.splitting_input().expect("splitting resolves"),
            SplittingInput::Rdis { np: 50, ns: 10 }
        );
        assert_eq!(
            vr.splitter.as_ref().map(|setup| setup.signal),
            Some(SplitterSignal::Scattered)
        );
    }

    #[test]
    fn split_numbers_below_one_are_clamped() {
        let mut value = water_slab_config();
        value["variance reduction"] = json!({
            "PDIS splitting": [-3.0, 0.0],
            "delta transport medium": "water"
        });
        let config = SimulationConfig::from_json_str(&value.to_string()).expect("config parses");
        assert_eq!(
            config.variance_reduction.splitting_input().expect("resolves"),
            SplittingInput::Pdis { fsplit: 1.0, ns: 1 }
        );
    }

    #[test]
    fn splitting_without_delta_transport_is_rejected() {
        let mut value = water_slab_config();
        value["variance reduction"] = json!({ "FS splitting": [10, 5] });
        let error = SimulationConfig::from_json_str(&value.to_string())
            .expect_err("splitting requires delta transport");
        assert_eq!(error.code(), "INPUT.DELTA_TRANSPORT");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn unknown_media_and_bad_tables_are_rejected() {
        let mut value = water_slab_config();
        value["geometry"]["media"] = json!(["bone"]);
        let error = SimulationConfig::from_json_str(&value.to_string())
            .expect_err("unknown medium must fail");
        assert_eq!(error.code(), "INPUT.MEDIA");

        let mut value = water_slab_config();
        value["media"][0]["muen over rho"] = json!([1.0]);
        assert!(SimulationConfig::from_json_str(&value.to_string()).is_err());
    }

    #[test]
    fn run_control_accepts_alias_and_modes() {
        let mut value = water_slab_config();
        value["run control"] = json!({
            "number of histories": 1e6,
            "calculation": "combine",
            "rco type": "uniform",
            "statistical accuracy sought": 1.5
        });
        let config = SimulationConfig::from_json_str(&value.to_string()).expect("config parses");
        assert_eq!(config.run_control.histories(), 1_000_000);
        assert_eq!(config.run_control.calculation, CalculationMode::Combine);
        assert_eq!(config.run_control.kind, Some(RunControlKind::Uniform));
        assert_eq!(config.run_control.accuracy, Some(1.5));
    }

    #[test]
    fn mfp_transform_accepts_one_or_two_values() {
        let mut value = water_slab_config();
        value["variance reduction"] = json!({ "mfp transform": [1.0, 0.5] });
        let config = SimulationConfig::from_json_str(&value.to_string()).expect("config parses");
        assert_eq!(config.variance_reduction.mfp_transform(), Some(0.5));

        value["variance reduction"] = json!({ "mfp transform": [0.0] });
        let config = SimulationConfig::from_json_str(&value.to_string()).expect("config parses");
        assert_eq!(config.variance_reduction.mfp_transform(), None);
    }
}
