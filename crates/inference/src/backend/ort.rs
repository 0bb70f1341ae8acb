use super::{BackendConfig, InferenceEngine, infer_at_scale};
use crate::model::{ModelDescriptor, PrecisionInspector};
use crate::shape::{ShapePlan, Size, WorkingScale};
use frame::{TensorData, TensorFrame};
use half::f16;
use ndarray::ArrayD;
use ort::{
    ep::{self, ExecutionProviderDispatch, coreml::ModelFormat},
    session::{Session, builder::GraphOptimizationLevel},
    tensor::TensorElementType,
    value::{TensorRef, ValueType},
};
use std::path::Path;

/// ONNX `TensorProto.DataType` code for an ONNX Runtime element type.
fn onnx_code(ty: TensorElementType) -> i32 {
    match ty {
        TensorElementType::Float32 => 1,
        TensorElementType::Uint8 => 2,
        TensorElementType::Int8 => 3,
        TensorElementType::Uint16 => 4,
        TensorElementType::Int16 => 5,
        TensorElementType::Int32 => 6,
        TensorElementType::Int64 => 7,
        TensorElementType::String => 8,
        TensorElementType::Bool => 9,
        TensorElementType::Float16 => 10,
        TensorElementType::Float64 => 11,
        TensorElementType::Uint32 => 12,
        TensorElementType::Uint64 => 13,
        TensorElementType::Bfloat16 => 16,
        _ => 0,
    }
}

/// Name and element type of the first model input.
fn first_input(session: &Session) -> anyhow::Result<(String, TensorElementType)> {
    let input = session
        .inputs()
        .first()
        .ok_or_else(|| anyhow::anyhow!("model has no inputs"))?;
    match input.dtype() {
        ValueType::Tensor { ty, .. } => Ok((input.name().to_string(), *ty)),
        other => anyhow::bail!("first model input is not a tensor: {other:?}"),
    }
}

fn inspect(path: &Path) -> anyhow::Result<(String, TensorElementType)> {
    let session = Session::builder()?.commit_from_file(path)?;
    first_input(&session)
}

/// Reads declared precision by opening the artifact on the CPU.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrtPrecisionInspector;

impl PrecisionInspector for OrtPrecisionInspector {
    fn element_type(&self, path: &Path) -> anyhow::Result<i32> {
        let (_, ty) = inspect(path)?;
        Ok(onnx_code(ty))
    }
}

fn profile(name: &str, channels: usize, size: Size) -> String {
    format!("{name}:1x{channels}x{}x{}", size.height, size.width)
}

fn tactic_sources(use_cublas: bool, use_cudnn: bool) -> String {
    let sign = |on: bool| if on { '+' } else { '-' };
    format!("{}CUBLAS,{}CUDNN", sign(use_cublas), sign(use_cudnn))
}

fn workspace_bytes(mib: u64) -> anyhow::Result<usize> {
    mib.checked_mul(1024 * 1024)
        .and_then(|bytes| usize::try_from(bytes).ok())
        .ok_or_else(|| anyhow::anyhow!("workspace of {mib} MiB does not fit in memory"))
}

/// Providers to register, in priority order. Empty means the CPU provider.
///
/// Profile shapes are given at the working scale the model runs at.
fn execution_providers(
    config: &BackendConfig,
    input_name: &str,
    channels: usize,
) -> anyhow::Result<Vec<ExecutionProviderDispatch>> {
    let providers = match config {
        BackendConfig::TensorRt(trt) => {
            let (min, opt, max) = match trt.shapes {
                ShapePlan::Static { shape } => (shape, shape, shape),
                ShapePlan::Dynamic { min, opt, max } => (min, opt, max),
            };
            let at_scale = |size| profile(input_name, channels, trt.scale.model_size(size));
            let mut tensorrt = ep::TensorRT::default()
                .with_device_id(trt.device_id as i32)
                .with_fp16(trt.fp16)
                .with_int8(trt.int8)
                .with_cuda_graph(trt.graph_capture)
                .with_builder_optimization_level(trt.opt_level)
                .with_tactic_sources(tactic_sources(trt.use_cublas, trt.use_cudnn))
                .with_profile_min_shapes(at_scale(min))
                .with_profile_opt_shapes(at_scale(opt))
                .with_profile_max_shapes(at_scale(max));
            if let Some(mib) = trt.workspace_mib {
                tensorrt = tensorrt.with_max_workspace_size(workspace_bytes(mib)?);
            }
            // nodes TensorRT rejects fall back to CUDA, where tf32 applies
            let fallback = ep::CUDA::default()
                .with_device_id(trt.device_id as i32)
                .with_tf32(trt.tf32);
            vec![tensorrt.build().error_on_failure(), fallback.build()]
        }
        BackendConfig::Migraphx(migx) => vec![
            ep::MIGraphX::default()
                .with_device_id(migx.device_id as i32)
                .with_fp16(migx.fp16)
                .with_exhaustive_tune(migx.exhaustive_tune)
                .build()
                .error_on_failure(),
        ],
        BackendConfig::OrtDirectMl(dml) => vec![
            ep::DirectML::default()
                .with_device_id(dml.device_id as i32)
                .build()
                .error_on_failure(),
        ],
        BackendConfig::OrtCoreMl(coreml) => {
            let mut provider = ep::CoreML::default()
                .with_subgraphs(false)
                .with_low_precision_accumulation_on_gpu(coreml.fp16);
            if coreml.ml_program {
                provider = provider.with_model_format(ModelFormat::MLProgram);
            }
            vec![provider.build().error_on_failure()]
        }
        BackendConfig::OrtCuda(cuda) => vec![
            ep::CUDA::default()
                .with_device_id(cuda.device_id as i32)
                .with_cuda_graph(cuda.graph_capture)
                .build()
                .error_on_failure(),
        ],
        BackendConfig::OrtCpu(_) => Vec::new(),
    };
    Ok(providers)
}

/// [`InferenceEngine`] running one ONNX Runtime session.
///
/// `num_streams` has no ONNX Runtime counterpart; hosts keep that many
/// filters in flight instead.
pub struct OrtEngine {
    session: Session,
    input_type: TensorElementType,
    scale: WorkingScale,
}

impl InferenceEngine for OrtEngine {
    fn load(model: &ModelDescriptor, config: &BackendConfig) -> anyhow::Result<Self> {
        let _ = ort::init().commit();

        // Profile shapes are keyed by input name, so read it before building.
        let (input_name, _) = inspect(&model.path)?;

        let mut builder =
            Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

        let providers = execution_providers(config, &input_name, model.channels.channels())?;
        if !providers.is_empty() {
            tracing::info!(
                backend = %config.family(),
                providers = providers.len(),
                "Registering execution providers"
            );
            builder = builder.with_execution_providers(providers)?;
        }

        let session = builder.commit_from_file(&model.path)?;
        let (_, input_type) = first_input(&session)?;

        tracing::info!(
            path = %model.path.display(),
            input = %input_name,
            input_type = ?input_type,
            scale = ?config.scale(),
            "Model loaded"
        );

        Ok(Self {
            session,
            input_type,
            scale: config.scale(),
        })
    }

    fn infer(&mut self, input: &TensorFrame) -> anyhow::Result<TensorFrame> {
        let _s = common::span!("ort_infer");

        let scale = self.scale;
        infer_at_scale(scale, input, |input| self.run(input))
    }
}

impl OrtEngine {
    pub fn input_type(&self) -> TensorElementType {
        self.input_type
    }

    fn run(&mut self, input: &TensorFrame) -> anyhow::Result<TensorFrame> {
        let fp16_model = self.input_type == TensorElementType::Float16;
        let output = match (input.data(), fp16_model) {
            (TensorData::F32(a), false) => self.run_f32(a)?,
            (TensorData::F16(a), true) => self.run_f16(a)?,
            (TensorData::F32(a), true) => self.run_f16(&a.mapv(f16::from_f32))?,
            (TensorData::F16(a), false) => self.run_f32(&a.mapv(f16::to_f32))?,
        };

        // Hand back what we were given so the caller's layout bookkeeping holds.
        let output = match (output, input.data()) {
            (TensorData::F16(a), TensorData::F32(_)) => TensorData::F32(a.mapv(f16::to_f32)),
            (TensorData::F32(a), TensorData::F16(_)) => TensorData::F16(a.mapv(f16::from_f32)),
            (same, _) => same,
        };
        TensorFrame::from_data(output)
    }

    fn run_f32(&mut self, input: &ArrayD<f32>) -> anyhow::Result<TensorData> {
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let output = &outputs[0];
        match output.try_extract_array::<f32>() {
            Ok(view) => Ok(TensorData::F32(view.into_owned())),
            Err(_) => Ok(TensorData::F16(
                output.try_extract_array::<f16>()?.into_owned(),
            )),
        }
    }

    fn run_f16(&mut self, input: &ArrayD<f16>) -> anyhow::Result<TensorData> {
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let output = &outputs[0];
        match output.try_extract_array::<f16>() {
            Ok(view) => Ok(TensorData::F16(view.into_owned())),
            Err(_) => Ok(TensorData::F32(
                output.try_extract_array::<f32>()?.into_owned(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_onnx_codes() {
        assert_eq!(onnx_code(TensorElementType::Float32), 1);
        assert_eq!(onnx_code(TensorElementType::Float16), 10);
        assert_eq!(onnx_code(TensorElementType::Bfloat16), 16);
    }

    #[test]
    fn test_tactic_sources() {
        assert_eq!(tactic_sources(true, false), "+CUBLAS,-CUDNN");
        assert_eq!(tactic_sources(false, false), "-CUBLAS,-CUDNN");
    }

    #[test]
    fn test_workspace_bytes_checked() {
        assert_eq!(workspace_bytes(512).unwrap(), 512 * 1024 * 1024);
        assert!(workspace_bytes(u64::MAX).is_err());
    }

    #[test]
    fn test_profile_string_is_nchw() {
        assert_eq!(
            profile("input", 3, Size::new(1920, 1088)),
            "input:1x3x1088x1920"
        );
    }
}
