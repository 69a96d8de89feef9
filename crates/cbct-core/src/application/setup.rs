//! Builds the transport collaborators from a validated configuration.

use crate::common::config::{SimulationConfig, SplittingInput};
use crate::domain::{CbctError, CbctResult, codes};
use crate::geometry::{Geometry, VoxelGeometry};
use crate::physics::{AttenuationModel, FreeElectronKernel, MediaTable};
use crate::transport::{
    AttenuationPlane, ScoringPlane, Splitter, SplittingPolicy, SplittingScheme, TransportSettings,
    TransportSetup,
};
use nalgebra::Vector3;
use tracing::{info, warn};

fn medium(media: &MediaTable, name: &str, context: &str) -> CbctResult<usize> {
    media.index_of(name).ok_or_else(|| {
        CbctError::input_validation(
            codes::INPUT_MEDIA,
            format!("{context} refers to unknown medium '{name}'"),
        )
    })
}

pub fn build_transport(config: &SimulationConfig) -> CbctResult<TransportSetup> {
    let media = MediaTable::from_config(&config.media)?;
    let geometry = VoxelGeometry::from_config(&config.geometry, |name| media.index_of(name))?;
    let muen = medium(&media, &config.scoring_plane.muen_medium, "muen medium")?;
    let attenuation = AttenuationModel::new(&media, muen, config.rayleigh)?;
    let plane = ScoringPlane::from_config(&config.scoring_plane)?;
    let policy = splitting_policy(config, &media, &geometry)?;

    let vr = &config.variance_reduction;
    let surrounding = config
        .surrounding_medium
        .as_deref()
        .map(|name| medium(&media, name, "surrounding medium"))
        .transpose()?;
    let delta_medium = vr
        .delta_transport_medium
        .as_deref()
        .map(|name| medium(&media, name, "delta transport medium"))
        .transpose()?;
    let max_latch = vr
        .maximum_latch
        .filter(|latch| *latch >= 0)
        .map(|latch| u32::try_from(latch).unwrap_or(u32::MAX));
    let settings = TransportSettings {
        scoring: vr.scoring,
        photon_cutoff: config.photon_cutoff,
        max_latch,
        mfp_transform: vr.mfp_transform(),
        surrounding,
        delta_medium,
        max_stack: config.max_stack,
    };
    info!(
        scoring = %settings.scoring,
        np = policy.np,
        ns = policy.ns,
        delta_medium = ?vr.delta_transport_medium,
        max_latch = ?settings.max_latch,
        "variance reduction"
    );
    Ok(TransportSetup {
        geometry: Box::new(geometry),
        kernel: Box::new(FreeElectronKernel::new(config.bound_compton)),
        attenuation,
        plane,
        policy,
        settings,
    })
}

fn splitting_policy(
    config: &SimulationConfig,
    media: &MediaTable,
    geometry: &VoxelGeometry,
) -> CbctResult<SplittingPolicy> {
    let vr = &config.variance_reduction;
    match vr.splitting_input()? {
        SplittingInput::Plain { np, ns } | SplittingInput::Fixed { np, ns } => {
            Ok(SplittingPolicy::fixed(np, ns))
        }
        SplittingInput::Rdis { np, ns } => {
            let setup = vr.splitter.as_ref().ok_or_else(|| {
                CbctError::input_validation(
                    codes::INPUT_SPLITTER,
                    "'RDIS splitting' needs an 'RDIS splitter setup'",
                )
            })?;
            let counts = geometry.region_counts().ok_or_else(|| {
                CbctError::input_validation(
                    codes::INPUT_SPLITTER,
                    "RDIS needs a rectilinear voxel geometry",
                )
            })?;
            let splitter = Splitter::from_config(setup, counts, np)?;
            splitter.describe(setup.signal);
            Ok(SplittingPolicy {
                scheme: SplittingScheme::Importance(splitter),
                np: np.max(1),
                ns: ns.max(1),
            })
        }
        SplittingInput::Pdis { fsplit, ns } => {
            if vr.splitter.is_some() {
                warn!("'RDIS splitter setup' is ignored with PDIS splitting");
            }
            let plane = vr
                .attenuation_plane
                .as_ref()
                .map(|plane| {
                    let medium = plane
                        .medium
                        .as_deref()
                        .map(|name| medium(media, name, "attenuation medium"))
                        .transpose()?;
                    let normal = Vector3::from(plane.normal);
                    if normal.norm() == 0.0 {
                        return Err(CbctError::input_validation(
                            codes::INPUT_SPLITTING,
                            "attenuation plane normal must not be zero",
                        ));
                    }
                    Ok(AttenuationPlane::new(Vector3::from(plane.point), normal, medium))
                })
                .transpose()?;
            Ok(SplittingPolicy {
                scheme: SplittingScheme::Position { fsplit, plane },
                np: 1,
                ns: ns.max(1),
            })
        }
    }
}
