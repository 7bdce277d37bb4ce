pub mod class_labels;
mod image_transform;

pub use image_transform::ImageTransformInfo;

pub(crate) const CROSS_MARK: &str = "❌";
