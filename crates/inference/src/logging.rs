use crate::config::AdapterConfig;

pub fn setup_logging(config: &AdapterConfig) {
    common::setup_logging(config.environment);
}
