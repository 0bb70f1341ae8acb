pub mod admission;
pub mod backend;
pub mod capability;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod shape;

// Re-export commonly used types for convenience
pub use admission::{EngineMode, Envelope, ResolutionTier, admit};
pub use backend::{BackendConfig, BackendFamily, Capability, InferenceEngine, Preferences};
pub use catalog::{ModelFamily, ResolutionLimits};
pub use config::AdapterConfig;
pub use error::AdaptError;
pub use model::{DeclaredPrecision, ModelDescriptor, ModelIdentity, PrecisionInspector};
pub use pipeline::{AdaptationPlan, AdaptationRequest, Adapter, Filter};
pub use shape::{ShapePlan, Size, WorkingScale};
