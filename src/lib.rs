mod utils;
mod error;
pub mod common;
pub mod data;
pub mod detection_runners;
pub mod drawing;
pub mod extern_c_api;

pub use common::{Detection, DetectionBox, InferenceDevice, ModelConfig, ModelHandle};
pub use detection_runners::{FrameSettings, Network, NanodetRunner};
pub use error::NanodetError;

pub type Result<T, E = NanodetError> = std::result::Result<T, E>;

/// Loads a NanoDet model, see [`ModelHandle::load`].
pub fn load(config: &ModelConfig) -> Result<ModelHandle> {
    log::info!("Loading model\n{config}");
    ModelHandle::load(config)
}
