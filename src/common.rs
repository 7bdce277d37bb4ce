mod detection;
mod detection_box;
mod inference_device;
mod model_config;
mod model_handle;

pub use detection::*;
pub use detection_box::*;
pub use inference_device::*;
pub use model_config::*;
pub use model_handle::*;
