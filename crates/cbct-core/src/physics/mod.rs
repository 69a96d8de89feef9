pub mod attenuation;
pub mod kernel;
pub mod media;

pub use attenuation::AttenuationModel;
pub use kernel::{FreeElectronKernel, InteractionKernel, KleinNishinaSample};
pub use media::{MediaTable, Medium};
