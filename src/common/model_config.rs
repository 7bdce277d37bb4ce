//! Load-time options for a NanoDet model.

use std::fmt;
use anyhow::{bail, Result};

pub const DEFAULT_KEEP_RATIO: bool = true;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.6;
pub const DEFAULT_MAX_DETECTIONS: usize = 100;
pub const DEFAULT_REG_MAX: usize = 7;
pub const DEFAULT_STRIDES: [u32; 4] = [8, 16, 32, 64];
// BGR order, as used when the network was trained
pub const DEFAULT_MEAN: [f32; 3] = [103.53, 116.28, 123.675];
pub const DEFAULT_STD: [f32; 3] = [57.375, 57.12, 58.395];

/// Environment variable consulted for a label font when none is configured.
pub const LABEL_FONT_ENV: &str = "NANODET_LABEL_FONT";

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model_path: String,
    pub device: String,
    pub input_height: u32,
    pub input_width: u32,
    pub score_threshold: f32,
    pub keep_ratio: bool,

    // decoding
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub reg_max: usize,
    pub strides: Vec<u32>,

    // normalization
    pub mean: [f32; 3],
    pub std: [f32; 3],

    pub class_names: Option<Vec<String>>,
    pub label_font_path: Option<String>,
    pub ort_lib_path: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            device: "cpu".to_string(),
            input_height: 320,
            input_width: 320,
            score_threshold: 0.35,
            keep_ratio: DEFAULT_KEEP_RATIO,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
            reg_max: DEFAULT_REG_MAX,
            strides: DEFAULT_STRIDES.to_vec(),
            mean: DEFAULT_MEAN,
            std: DEFAULT_STD,
            class_names: None,
            label_font_path: None,
            ort_lib_path: None,
        }
    }
}

impl ModelConfig {
    pub fn new(model_path: &str, device: &str, height: u32, width: u32, score_threshold: f32) -> Self {
        Self {
            model_path: model_path.to_string(),
            device: device.to_string(),
            input_height: height,
            input_width: width,
            score_threshold,
            ..Default::default()
        }
    }

    pub fn with_keep_ratio(mut self, keep_ratio: bool) -> Self {
        self.keep_ratio = keep_ratio;
        self
    }

    pub fn with_iou_threshold(mut self, iou: f32) -> Self {
        self.iou_threshold = iou;
        self
    }

    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = max_detections;
        self
    }

    pub fn with_reg_max(mut self, reg_max: usize) -> Self {
        self.reg_max = reg_max;
        self
    }

    pub fn with_strides(mut self, strides: &[u32]) -> Self {
        self.strides = strides.to_vec();
        self
    }

    /// Per-channel mean and std in BGR order.
    pub fn with_normalization(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.mean = mean;
        self.std = std;
        self
    }

    pub fn with_class_names(mut self, names: &[&str]) -> Self {
        self.class_names = Some(names.iter().map(|x| x.to_string()).collect());
        self
    }

    pub fn with_label_font(mut self, path: &str) -> Self {
        self.label_font_path = Some(path.to_string());
        self
    }

    pub fn with_ort_lib_path(mut self, path: &str) -> Self {
        self.ort_lib_path = Some(path.to_string());
        self
    }

    /// Font path from the config, falling back to `NANODET_LABEL_FONT`.
    pub fn resolved_label_font_path(&self) -> Option<String> {
        self.label_font_path
            .clone()
            .or_else(|| std::env::var(LABEL_FONT_ENV).ok())
            .filter(|p| !p.is_empty())
    }

    /// Checks everything that can be checked without touching the runtime.
    pub fn validate(&self) -> Result<()> {
        if self.model_path.trim().is_empty() {
            bail!("model path is empty");
        }
        if self.input_height == 0 || self.input_width == 0 {
            bail!("input size must be positive, got {}x{}", self.input_height, self.input_width);
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            bail!("score threshold {} is outside [0, 1]", self.score_threshold);
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            bail!("IoU threshold {} is outside [0, 1]", self.iou_threshold);
        }
        if self.strides.is_empty() || self.strides.contains(&0) {
            bail!("strides must be non-empty and positive, got {:?}", self.strides);
        }
        if self.std.iter().any(|s| *s == 0.) {
            bail!("normalization std must be non-zero, got {:?}", self.std);
        }
        Ok(())
    }
}

impl fmt::Display for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Model Path: {}\n\
        Device: {}\n\
        Model Input Resolution: {}x{} (HxW)\n\
        Keep Ratio: {}\n\
        Score Threshold: {}\n\
        IoU Threshold: {}",
               self.model_path, self.device,
               self.input_height, self.input_width,
               self.keep_ratio, self.score_threshold, self.iou_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_ratio() {
        let config = ModelConfig::new("model.onnx", "cpu", 320, 320, 0.35);
        assert!(config.keep_ratio);
        assert_eq!(config.strides, vec![8, 16, 32, 64]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ModelConfig::new("", "cpu", 320, 320, 0.35).validate().is_err());
        assert!(ModelConfig::new("m.onnx", "cpu", 0, 320, 0.35).validate().is_err());
        assert!(ModelConfig::new("m.onnx", "cpu", 320, 320, 1.5).validate().is_err());
        assert!(ModelConfig::new("m.onnx", "cpu", 320, 320, f32::NAN).validate().is_err());
        assert!(ModelConfig::new("m.onnx", "cpu", 320, 320, 0.3)
            .with_strides(&[])
            .validate()
            .is_err());
    }

    #[test]
    fn builder_overrides() {
        let config = ModelConfig::new("m.onnx", "cuda:1", 416, 320, 0.5)
            .with_keep_ratio(false)
            .with_class_names(&["a", "b"])
            .with_label_font("/fonts/x.ttf");
        assert!(!config.keep_ratio);
        assert_eq!(config.class_names.as_deref(), Some(&["a".to_string(), "b".to_string()][..]));
        assert_eq!(config.resolved_label_font_path().as_deref(), Some("/fonts/x.ttf"));
    }

    #[test]
    fn display_lists_geometry() {
        let config = ModelConfig::new("m.onnx", "cuda:1", 416, 320, 0.5);
        let text = config.to_string();
        assert!(text.contains("Model Input Resolution: 416x320 (HxW)"));
        assert!(text.contains("Device: cuda:1"));
        assert_eq!(format!("{config}"), text);
    }
}
