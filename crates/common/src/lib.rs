pub mod config;
pub mod logging;
pub mod telemetry;

pub use config::{Environment, env_flag, env_opt, env_or};
pub use logging::setup_logging;
pub use telemetry::TelemetryGuard;
