use std::fmt;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InferenceDevice {
    #[default] CPU,
    CUDA(usize),
    TensorRT(usize),
    CoreML,
}

// Hardcoded device names. Storing the "proper" spelling and the lowercase version.
const CPU: [&str; 2] = ["CPU", "cpu"];
const CUDA: [&str; 2] = ["CUDA", "cuda"];
const TENSOR_RT: [&str; 2] = ["TensorRT", "tensorrt"];
const CORE_ML: [&str; 2] = ["CoreML", "coreml"];

impl InferenceDevice {
    /// Parses selectors such as `cpu`, `cuda`, `cuda:1`, `tensorrt:0` or `coreml`.
    /// A missing ordinal means device 0.
    pub fn parse(device: &str) -> Option<Self> {
        let device = device.trim().to_lowercase();
        let (name, device_id) = match device.split_once(':') {
            Some((name, id)) => (name.to_string(), id.parse::<usize>().ok()?),
            None => (device, 0),
        };

        match name.as_str() {
            "cpu" if device_id == 0 => Some(InferenceDevice::CPU),
            "cuda" | "gpu" => Some(InferenceDevice::CUDA(device_id)),
            "tensorrt" | "trt" => Some(InferenceDevice::TensorRT(device_id)),
            "coreml" if device_id == 0 => Some(InferenceDevice::CoreML),
            _ => None,
        }
    }

    pub fn str(&self) -> &'static str {
        match self {
            InferenceDevice::CPU => CPU[0],
            InferenceDevice::CUDA(_) => CUDA[0],
            InferenceDevice::TensorRT(_) => TENSOR_RT[0],
            InferenceDevice::CoreML => CORE_ML[0],
        }
    }

    pub fn str_lowercase(&self) -> &'static str {
        match self {
            InferenceDevice::CPU => CPU[1],
            InferenceDevice::CUDA(_) => CUDA[1],
            InferenceDevice::TensorRT(_) => TENSOR_RT[1],
            InferenceDevice::CoreML => CORE_ML[1],
        }
    }

    pub fn device_id(&self) -> usize {
        match self {
            InferenceDevice::CUDA(id) | InferenceDevice::TensorRT(id) => *id,
            _ => 0,
        }
    }

    pub fn all_inference_devices() -> Vec<String> {
        vec![
            CPU[1].to_string(),
            CUDA[1].to_string(),
            TENSOR_RT[1].to_string(),
            CORE_ML[1].to_string(),
        ]
    }
}

impl fmt::Display for InferenceDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceDevice::CUDA(id) | InferenceDevice::TensorRT(id) => {
                write!(f, "{}:{}", self.str_lowercase(), id)
            }
            _ => f.write_str(self.str_lowercase()),
        }
    }
}
