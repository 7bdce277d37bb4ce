use std::time::Instant;
use anyhow::Result;
use ndarray::{Array4, ArrayD};
use crate::data::ImageTransformInfo;
use crate::utils;

pub trait InferenceProcess {
    type Input: ?Sized;
    type Settings;
    type Output;

    /// Pre-process the input data into a network tensor.
    fn preprocess(&self, x: &Self::Input, settings: &Self::Settings) -> Result<(Array4<f32>, ImageTransformInfo)>;

    /// Executes the model on the preprocessed data.
    fn inference(&self, x: Array4<f32>) -> Result<ArrayD<f32>>;

    /// Post-process the model's output.
    fn postprocess(&self, ys: ArrayD<f32>, info: &ImageTransformInfo, settings: &Self::Settings) -> Result<Self::Output>;

    /// Executes the full pipeline.
    fn run(&self, x: &Self::Input, settings: &Self::Settings) -> Result<Self::Output> {
        let detect_time = Instant::now();
        let mut _detect_elapsed = detect_time.elapsed();

        let (xs, info) = self.preprocess(x, settings)?;
        _detect_elapsed = utils::trace("TIME", "Preprocessing input", detect_time, _detect_elapsed);

        let ys = self.inference(xs)?;
        _detect_elapsed = utils::trace("TIME", "Detection run", detect_time, _detect_elapsed);

        let ys = self.postprocess(ys, &info, settings)?;
        utils::trace("TIME", "Postprocessing", detect_time, _detect_elapsed);

        Ok(ys)
    }
}
