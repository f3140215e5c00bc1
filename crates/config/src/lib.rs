// Configuration loading

mod error;
pub mod settings;

pub use error::ConfigError;
pub use settings::{CompareSettings, RunSettings, ServiceSettings, Settings, SAMPLE_CONFIG};
