pub mod inference_process;
pub mod ort_detector;
mod nanodet_runner;
mod network;

pub use nanodet_runner::*;
pub use network::*;
pub use ort_detector::*;
