use std::fmt;
use std::path::Path;
use ab_glyph::FontVec;
use anyhow::Result;
use image::RgbImage;
use ndarray::{Array4, ArrayD};
use crate::common::{Detection, InferenceDevice, ModelConfig};
use crate::data::{class_labels, ImageTransformInfo};
use crate::detection_runners::inference_process::InferenceProcess;
use crate::detection_runners::ort_detector::{image_ops, nanodet_head, nanodet_head::DecodeParams, OrtEngine};
use crate::detection_runners::Network;
use crate::drawing;
use crate::error::NanodetError;

/// Per-call settings, read from the handle on every inference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSettings {
    pub score_threshold: f32,
    pub input_height: u32,
    pub input_width: u32,
    pub keep_ratio: bool,
}

impl FrameSettings {
    fn validate(&self) -> std::result::Result<(), NanodetError> {
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(NanodetError::Usage(format!(
                "score threshold {} is outside [0, 1]",
                self.score_threshold
            )));
        }
        if self.input_height == 0 || self.input_width == 0 {
            return Err(NanodetError::Usage(format!(
                "input size must be positive, got {}x{}",
                self.input_height, self.input_width
            )));
        }
        Ok(())
    }
}

impl From<&ModelConfig> for FrameSettings {
    fn from(config: &ModelConfig) -> Self {
        Self {
            score_threshold: config.score_threshold,
            input_height: config.input_height,
            input_width: config.input_width,
            keep_ratio: config.keep_ratio,
        }
    }
}

/// A loaded NanoDet network together with everything needed to decode and draw its output.
pub struct NanodetRunner {
    network: Box<dyn Network>,
    class_names: Vec<String>,
    decode: DecodeParams,
    mean: [f32; 3],
    std: [f32; 3],
    label_font: Option<FontVec>,
}

impl fmt::Debug for NanodetRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NanodetRunner")
            .field("network", &self.network)
            .field("classes", &self.class_names.len())
            .field("decode", &self.decode)
            .field("label_font", &self.label_font.is_some())
            .finish()
    }
}

impl NanodetRunner {
    /// Loads the ONNX model described by `config` onto its device.
    pub fn load(config: &ModelConfig) -> std::result::Result<Self, NanodetError> {
        config.validate().map_err(NanodetError::model_load)?;

        let device = InferenceDevice::parse(&config.device).ok_or_else(|| {
            NanodetError::ModelLoad(format!(
                "unsupported device '{}', expected one of {:?}",
                config.device,
                InferenceDevice::all_inference_devices()
            ))
        })?;

        let model_path = Path::new(&config.model_path);
        if !model_path.is_file() {
            return Err(NanodetError::ModelLoad(format!(
                "model file {} does not exist",
                model_path.display()
            )));
        }

        let engine = OrtEngine::new(model_path, device, config.ort_lib_path.as_deref())
            .map_err(NanodetError::model_load)?;

        if let Some((h, w)) = engine.input_hw() {
            if (h, w) != (config.input_height, config.input_width) {
                return Err(NanodetError::ModelLoad(format!(
                    "model expects a {}x{} input, configured {}x{}",
                    h, w, config.input_height, config.input_width
                )));
            }
        }

        let sidecar = class_labels::read_sidecar_classes(model_path).map_err(NanodetError::model_load)?;

        Ok(Self::build(Box::new(engine), config, sidecar))
    }

    /// Wraps an already constructed network.
    pub fn from_network(network: Box<dyn Network>, config: &ModelConfig) -> std::result::Result<Self, NanodetError> {
        config.validate().map_err(NanodetError::model_load)?;
        Ok(Self::build(network, config, None))
    }

    fn build(network: Box<dyn Network>, config: &ModelConfig, sidecar: Option<Vec<String>>) -> Self {
        let class_names = class_labels::resolve_class_names(network.class_names(), sidecar, config.class_names.clone());

        let label_font = config.resolved_label_font_path().and_then(|path| match drawing::load_font(&path) {
            Ok(font) => Some(font),
            Err(e) => {
                log::warn!("Label font unavailable, drawing tags without text: {e:#}");
                None
            }
        });

        log::info!(
            "NanoDet loaded | Device: {} | Classes: {} | Input: {}x{} | Keep ratio: {}",
            network.device(),
            class_names.len(),
            config.input_height,
            config.input_width,
            config.keep_ratio
        );

        Self {
            network,
            class_names,
            decode: DecodeParams {
                iou_threshold: config.iou_threshold,
                max_detections: config.max_detections,
                reg_max: config.reg_max,
                strides: config.strides.clone(),
            },
            mean: config.mean,
            std: config.std,
            label_font,
        }
    }

    pub fn device(&self) -> InferenceDevice {
        self.network.device()
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Detects objects in `img`, boxes in `img` pixels, highest confidence first.
    pub fn detect(&self, img: &RgbImage, settings: &FrameSettings) -> std::result::Result<Vec<Detection>, NanodetError> {
        settings.validate()?;
        if img.width() == 0 || img.height() == 0 {
            return Err(NanodetError::Inference("input image is empty".to_string()));
        }
        self.run(img, settings).map_err(NanodetError::inference)
    }

    pub fn draw(&self, img: &mut RgbImage, detections: &[Detection]) -> std::result::Result<(), NanodetError> {
        if img.width() == 0 || img.height() == 0 {
            return Err(NanodetError::Visualization("image is empty".to_string()));
        }
        drawing::draw_detections(img, detections, self.label_font.as_ref());
        Ok(())
    }
}

impl InferenceProcess for NanodetRunner {
    type Input = RgbImage;
    type Settings = FrameSettings;
    type Output = Vec<Detection>;

    fn preprocess(&self, x: &RgbImage, settings: &FrameSettings) -> Result<(Array4<f32>, ImageTransformInfo)> {
        let info = ImageTransformInfo::new(
            x.width(),
            x.height(),
            settings.input_width,
            settings.input_height,
            settings.keep_ratio,
        );
        let xs = image_ops::preprocess(x, &info, self.mean, self.std)?;
        Ok((xs, info))
    }

    fn inference(&self, x: Array4<f32>) -> Result<ArrayD<f32>> {
        self.network.forward(x)
    }

    fn postprocess(&self, ys: ArrayD<f32>, info: &ImageTransformInfo, settings: &FrameSettings) -> Result<Vec<Detection>> {
        let ys = nanodet_head::decode(
            ys.view(),
            settings.input_height,
            settings.input_width,
            &self.decode,
            settings.score_threshold,
        )?;

        // decode sorts by confidence, inverting keeps that order
        let ys = ys
            .into_iter()
            .filter_map(|y| {
                let bbox = info.invert_box(&y.bbox);
                // NaN sizes fail this test too
                if !(bbox.w > 0. && bbox.h > 0.) {
                    return None;
                }
                let label = class_labels::label_for(&self.class_names, y.class_id);
                Some(Detection::new(y.class_id, bbox, Some(label), y.confidence))
            })
            .collect();

        Ok(ys)
    }
}
