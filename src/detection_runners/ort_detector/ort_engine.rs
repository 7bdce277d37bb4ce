//! ONNX Runtime backend.

use std::path::Path;
use anyhow::{anyhow, bail, Result};
use half::{bf16, f16};
use ndarray::{Array, Array4, ArrayD, IxDyn};
use parking_lot::Mutex;
use ort::{
    execution_providers::{ExecutionProvider,
                          CPUExecutionProvider,
                          CUDAExecutionProvider,
                          TensorRTExecutionProvider,
                          CoreMLExecutionProvider},
    session::builder::{GraphOptimizationLevel, SessionBuilder},
    session::Session,
    tensor::TensorElementType,
    value::{DynValue, Value, ValueType},
};
use crate::common::InferenceDevice;
use crate::data::{class_labels, CROSS_MARK};
use crate::detection_runners::Network;

/// ONNXRuntime Backend
#[derive(Debug)]
pub struct OrtEngine {
    // runs need `&mut Session`, one forward pass at a time per engine
    session: Mutex<Session>,
    device: InferenceDevice,
    input_name: String,
    input_dtype: TensorElementType,
    input_dims: Vec<i64>,
    output_name: String,
    output_dtype: TensorElementType,
    names: Option<Vec<String>>,
}

impl OrtEngine {
    pub fn new(model_path: &Path, device: InferenceDevice, ort_lib_path: Option<&str>) -> Result<Self> {
        if let Some(lib_path) = ort_lib_path {
            match ort::init_from(lib_path).commit() {
                Ok(_) => {}
                Err(e) => bail!("{CROSS_MARK} Failed to load ONNX Runtime from {lib_path}: {e}"),
            };
        }

        let mut builder = Session::builder()
            .map_err(|e| anyhow!("Failed to create session builder: {e}"))?;

        match device {
            InferenceDevice::TensorRT(device_id) => Self::build_trt(&mut builder, device_id)?,
            InferenceDevice::CUDA(device_id) => Self::build_cuda(&mut builder, device_id)?,
            InferenceDevice::CoreML => Self::build_coreml(&mut builder)?,
            InferenceDevice::CPU => Self::build_cpu(&mut builder)?,
        }

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Failed to set optimization level: {e}"))?
            .commit_from_file(model_path)
            .map_err(|e| anyhow!("Failed to load model {}: {e}", model_path.display()))?;

        let (input_name, input_dtype, input_dims) = match session.inputs.first() {
            Some(input) => {
                let (dtype, dims) = Self::tensor_info(&input.input_type)?;
                (input.name.clone(), dtype, dims)
            }
            None => bail!("Model declares no inputs"),
        };
        let (output_name, output_dtype) = match session.outputs.first() {
            Some(output) => (output.name.clone(), Self::tensor_info(&output.output_type)?.0),
            None => bail!("Model declares no outputs"),
        };
        if input_dims.len() != 4 {
            bail!("Expected a 4D NCHW input, model declares {:?}", input_dims);
        }

        let names = Self::try_fetch(&session, "names").map(|names| class_labels::parse_metadata_names(&names));

        log::info!(
            "Backend: ONNXRuntime | Device: {} | Input: {} {:?} {:?} | Output: {} {:?}",
            device,
            input_name,
            input_dims,
            input_dtype,
            output_name,
            output_dtype,
        );

        Ok(Self {
            session: Mutex::new(session),
            device,
            input_name,
            input_dtype,
            input_dims,
            output_name,
            output_dtype,
            names,
        })
    }

    fn tensor_info(value_type: &ValueType) -> Result<(TensorElementType, Vec<i64>)> {
        match value_type {
            ValueType::Tensor { ty, shape, .. } => Ok((*ty, shape.iter().copied().collect())),
            other => bail!("Expected a tensor, model declares {:?}", other),
        }
    }

    fn build_trt(builder: &mut SessionBuilder, device_id: usize) -> Result<()> {
        let trt = TensorRTExecutionProvider::default()
            .with_device_id(device_id as i32)
            .with_engine_cache(true)
            .with_engine_cache_path("trt-cache");
        if trt.is_available().map_err(|e| anyhow!("{e}"))? {
            match trt.register(builder) {
                Ok(_) => { }
                Err(err) => { bail!("{CROSS_MARK} TensorRT initialization failed: {:?}", err) }
            }
            log::info!("Initial model serialization with TensorRT may take some time");
            Ok(())
        } else {
            bail!("{CROSS_MARK} TensorRT execution provider not available")
        }
    }

    fn build_cuda(builder: &mut SessionBuilder, device_id: usize) -> Result<()> {
        let ep = CUDAExecutionProvider::default()
            .with_device_id(device_id as i32);
        if ep.is_available().map_err(|e| anyhow!("{e}"))? {
            match ep.register(builder) {
                Ok(_) => { }
                Err(err) => { bail!("{CROSS_MARK} CUDA initialization failed: {:?}", err) }
            }
            Ok(())
        } else {
            bail!("{CROSS_MARK} CUDA execution provider not available")
        }
    }

    fn build_coreml(builder: &mut SessionBuilder) -> Result<()> {
        let ep = CoreMLExecutionProvider::default()
            .with_subgraphs(false);
        if ep.is_available().map_err(|e| anyhow!("{e}"))? {
            match ep.register(builder) {
                Ok(_) => { }
                Err(err) => { bail!("{CROSS_MARK} CoreML initialization failed: {:?}", err) }
            }
            Ok(())
        } else {
            bail!("{CROSS_MARK} CoreML execution provider not available")
        }
    }

    fn build_cpu(builder: &mut SessionBuilder) -> Result<()> {
        let ep = CPUExecutionProvider::default();
        if ep.is_available().map_err(|e| anyhow!("{e}"))? {
            match ep.register(builder) {
                Ok(_) => { }
                Err(err) => { bail!("{CROSS_MARK} CPU initialization failed: {:?}", err) }
            }
            Ok(())
        } else {
            bail!("{CROSS_MARK} CPU execution provider not available")
        }
    }

    fn tensor_preprocess(x: Array4<f32>, dtype: &TensorElementType) -> Result<DynValue> {
        let x = match dtype {
            TensorElementType::Float32 => Value::from_array(x)?.into_dyn(),
            TensorElementType::Float16 => Value::from_array(x.mapv(f16::from_f32))?.into_dyn(),
            TensorElementType::Bfloat16 => Value::from_array(x.mapv(bf16::from_f32))?.into_dyn(),
            _ => bail!("Unsupported model input type: {:?}", dtype),
        };
        Ok(x)
    }

    fn tensor_postprocess(x: &DynValue, dtype: &TensorElementType) -> Result<Array<f32, IxDyn>> {
        fn _extract_and_convert<T>(x: &DynValue, map_fn: impl Fn(T) -> f32) -> Result<Array<f32, IxDyn>>
        where
            T: Clone + 'static + ort::tensor::PrimitiveTensorElementType,
        {
            match x.try_extract_array::<T>() {
                Err(err) => bail!("Failed to extract from ort outputs: {err}"),
                Ok(x) => Ok(x.view().mapv(map_fn).into_owned()),
            }
        }
        match dtype {
            TensorElementType::Float32 => _extract_and_convert::<f32>(x, |x| x),
            TensorElementType::Float16 => _extract_and_convert::<f16>(x, f16::to_f32),
            TensorElementType::Bfloat16 => _extract_and_convert::<bf16>(x, bf16::to_f32),
            TensorElementType::Float64 => _extract_and_convert::<f64>(x, |x| x as f32),
            _ => bail!("Unsupported ort output type: {:?}", dtype),
        }
    }

    fn try_fetch(session: &Session, key: &str) -> Option<String> {
        match session.metadata() {
            Err(_) => None,
            Ok(metadata) => metadata.custom(key).unwrap_or_default(),
        }
    }
}

impl Network for OrtEngine {
    fn forward(&self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        let value = Self::tensor_preprocess(input, &self.input_dtype)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => value])
            .map_err(|e| anyhow!("Session run failed: {e}"))?;

        let ys = Self::tensor_postprocess(&outputs[self.output_name.as_str()], &self.output_dtype)?;
        Ok(ys)
    }

    fn device(&self) -> InferenceDevice {
        self.device
    }

    fn class_names(&self) -> Option<Vec<String>> {
        self.names.clone()
    }

    fn input_hw(&self) -> Option<(u32, u32)> {
        // NCHW, dynamic axes are reported as -1 or 0
        match (self.input_dims[2], self.input_dims[3]) {
            (h, w) if h > 0 && w > 0 => Some((h as u32, w as u32)),
            _ => None,
        }
    }
}
