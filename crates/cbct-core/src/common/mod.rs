pub mod config;
pub mod constants;

pub use config::{
    AttenuationPlaneConfig, GeometryConfig, MediumConfig, RngConfig, RunControlConfig,
    ScoringPlaneConfig, SimulationConfig, SourceConfig, SourceShapeConfig, SpectrumConfig,
    SplitterSetupConfig, SplitterSignal, SplittingInput, VACUUM_MEDIUM, VarianceReductionConfig,
};
