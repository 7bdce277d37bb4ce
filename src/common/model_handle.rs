use image::RgbImage;
use crate::common::{Detection, ModelConfig};
use crate::detection_runners::{FrameSettings, Network, NanodetRunner};
use crate::error::NanodetError;

/// Caller-visible state of one detector.
///
/// `network` is present exactly while the handle is loaded. A handle that
/// failed to load, or was freed, reports `Usage` on inference and
/// `Visualization` on draw.
#[derive(Debug, Default)]
pub struct ModelHandle {
    network: Option<NanodetRunner>,
    device: Option<String>,
    score_threshold: f32,
    input_size: [u32; 2],
    keep_ratio: bool,
}

impl ModelHandle {
    pub fn load(config: &ModelConfig) -> crate::Result<Self> {
        let runner = NanodetRunner::load(config)?;
        Ok(Self::loaded(runner, config))
    }

    /// Builds a loaded handle around an existing network.
    pub fn from_network(network: Box<dyn Network>, config: &ModelConfig) -> crate::Result<Self> {
        let runner = NanodetRunner::from_network(network, config)?;
        Ok(Self::loaded(runner, config))
    }

    fn loaded(runner: NanodetRunner, config: &ModelConfig) -> Self {
        Self {
            network: Some(runner),
            device: Some(config.device.clone()),
            score_threshold: config.score_threshold,
            input_size: [config.input_height, config.input_width],
            keep_ratio: config.keep_ratio,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.network.is_some()
    }

    pub fn network(&self) -> crate::Result<&NanodetRunner> {
        self.network
            .as_ref()
            .ok_or_else(|| NanodetError::Usage("model is not loaded".to_string()))
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn score_threshold(&self) -> f32 {
        self.score_threshold
    }

    pub fn set_score_threshold(&mut self, score_threshold: f32) -> crate::Result<()> {
        if !(0.0..=1.0).contains(&score_threshold) {
            return Err(NanodetError::Usage(format!(
                "score threshold {} is outside [0, 1]",
                score_threshold
            )));
        }
        self.score_threshold = score_threshold;
        Ok(())
    }

    /// `[height, width]` of the network input.
    pub fn input_size(&self) -> [u32; 2] {
        self.input_size
    }

    pub fn keep_ratio(&self) -> bool {
        self.keep_ratio
    }

    pub fn frame_settings(&self) -> FrameSettings {
        FrameSettings {
            score_threshold: self.score_threshold,
            input_height: self.input_size[0],
            input_width: self.input_size[1],
            keep_ratio: self.keep_ratio,
        }
    }

    pub fn infer(&self, img: &RgbImage) -> crate::Result<Vec<Detection>> {
        self.network()?.detect(img, &self.frame_settings())
    }

    pub fn draw(&self, img: &mut RgbImage, detections: &[Detection]) -> crate::Result<()> {
        match &self.network {
            Some(network) => network.draw(img, detections),
            None => Err(NanodetError::Visualization("model is not loaded".to_string())),
        }
    }

    /// Releases the network and device. Safe to call on an unloaded handle.
    pub fn free(&mut self) {
        if self.network.take().is_some() {
            log::debug!("Released model on {}", self.device.as_deref().unwrap_or("?"));
        }
        self.device = None;
    }
}
