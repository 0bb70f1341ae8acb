use crate::backend::{BackendFamily, Preferences};
use crate::catalog::ModelFamily;
use crate::error::AdaptError;
use crate::model::ModelIdentity;
use crate::pipeline::AdaptationRequest;
use crate::shape::Size;
use common::{env_flag, env_opt, env_or};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

pub use common::Environment;

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub environment: Environment,
    pub request: AdaptationRequest,
    /// Source resolution the planning binary builds a plan for.
    pub input_size: Size,
    pub otel_endpoint: Option<String>,
    pub load_engine: bool,
}

fn invalid(param: &'static str) -> impl FnOnce(anyhow::Error) -> AdaptError {
    move |e| AdaptError::invalid(param, format!("{e:#}"))
}

fn read<T>(key: &str, param: &'static str, default: T) -> Result<T, AdaptError>
where
    T: FromStr,
    T::Err: Display,
{
    env_or(key, default).map_err(invalid(param))
}

fn read_opt<T>(key: &str, param: &'static str) -> Result<Option<T>, AdaptError>
where
    T: FromStr,
    T::Err: Display,
{
    env_opt(key).map_err(invalid(param))
}

fn flag(key: &str, param: &'static str, default: bool) -> Result<bool, AdaptError> {
    env_flag(key, default).map_err(invalid(param))
}

impl AdapterConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset variables take their defaults; set but unparsable ones are
    /// rejected rather than replaced.
    pub fn from_env() -> Result<Self, AdaptError> {
        let environment = Environment::from_env();
        let defaults = Preferences::default();

        let family: ModelFamily = read("MODEL_FAMILY", "model_family", ModelFamily::ArtCnn)?;
        let model = match family {
            ModelFamily::Custom => ModelIdentity::Custom {
                path: read_opt::<String>("MODEL_PATH", "model_path")?.ok_or_else(|| {
                    AdaptError::invalid("model_path", "MODEL_PATH is required for custom models")
                })?,
                res_opt: read_opt("RES_OPT", "res_opt")?,
                res_max: read_opt("RES_MAX", "res_max")?,
            },
            built_in => ModelIdentity::BuiltIn {
                family: built_in,
                variant: match read_opt("MODEL_VARIANT", "variant")? {
                    Some(variant) => variant,
                    None => built_in.default_variant().ok_or_else(|| {
                        AdaptError::invalid("variant", format!("{built_in} needs MODEL_VARIANT"))
                    })?,
                },
            },
        };

        let preferences = Preferences {
            backend: read("BACKEND", "backend", BackendFamily::TensorRt)?,
            device_id: read("DEVICE_ID", "device_id", defaults.device_id)?,
            num_streams: read("NUM_STREAMS", "num_streams", defaults.num_streams)?,
            fp16: flag("FP16", "fp16", defaults.fp16)?,
            int8: flag("INT8", "int8", defaults.int8)?,
            workspace_mib: read("WORKSPACE_MIB", "workspace_mib", defaults.workspace_mib)?,
            graph_capture: flag("GRAPH_CAPTURE", "graph_capture", defaults.graph_capture)?,
            ensemble: flag("ENSEMBLE", "ensemble", defaults.ensemble)?,
            static_engine: flag("STATIC_ENGINE", "static_engine", defaults.static_engine)?,
            hd_tier: flag("HD_TIER", "hd_tier", defaults.hd_tier)?,
            opt_level: read("OPT_LEVEL", "opt_level", defaults.opt_level)?,
            exhaustive_tune: flag("EXHAUSTIVE_TUNE", "exhaustive_tune", defaults.exhaustive_tune)?,
            ml_program: flag("ML_PROGRAM", "ml_program", defaults.ml_program)?,
            use_cublas: flag("USE_CUBLAS", "use_cublas", defaults.use_cublas)?,
            use_cudnn: flag("USE_CUDNN", "use_cudnn", defaults.use_cudnn)?,
            turbo: flag("TURBO", "turbo", defaults.turbo)?,
            color_correction: flag(
                "COLOR_CORRECTION",
                "color_correction",
                defaults.color_correction,
            )?,
        };

        let input_size = Size::new(
            read("INPUT_WIDTH", "input_width", 1920)?,
            read("INPUT_HEIGHT", "input_height", 1080)?,
        );

        Ok(Self {
            environment,
            request: AdaptationRequest {
                model,
                preferences,
                backend_dir: read("BACKEND_DIR", "backend_dir", PathBuf::from("plugins"))?,
            },
            input_size,
            otel_endpoint: read_opt("OTEL_ENDPOINT", "otel_endpoint")?,
            load_engine: flag("LOAD_ENGINE", "load_engine", false)?,
        })
    }
}
