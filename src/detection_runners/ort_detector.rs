mod ort_engine;
pub mod image_ops;
pub mod nanodet_head;
pub mod nms;

pub use ort_engine::*;
