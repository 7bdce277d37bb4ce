use std::fmt::Debug;
use anyhow::Result;
use ndarray::{Array4, ArrayD};
use crate::common::InferenceDevice;

/// A loaded detection network, opaque to everything above the runner.
///
/// Implementations must be usable from several threads at once; backends
/// whose runs need exclusive access serialize internally.
pub trait Network: Send + Sync + Debug {
    /// Runs one forward pass on a `[1, 3, H, W]` input and returns the first output.
    fn forward(&self, input: Array4<f32>) -> Result<ArrayD<f32>>;

    /// Device the network was placed on.
    fn device(&self) -> InferenceDevice;

    /// Class names embedded in the model, if any.
    fn class_names(&self) -> Option<Vec<String>> {
        None
    }

    /// Spatial input size `(height, width)` declared by the model, when it is static.
    fn input_hw(&self) -> Option<(u32, u32)> {
        None
    }
}
