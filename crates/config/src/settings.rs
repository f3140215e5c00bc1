// Reconciliation settings
// Loaded from ~/.config/verirun/settings.toml, or a .json file

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Execution service process and API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Where a started service listens
    pub base_url: String,

    /// Health checks before giving up on a started service
    pub startup_attempts: u32,

    /// Delay between health checks
    pub startup_delay_secs: u64,

    /// Upper bound on a single submit request
    pub submit_timeout_secs: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4040".to_string(),
            startup_attempts: 10,
            startup_delay_secs: 3,
            submit_timeout_secs: 300,
        }
    }
}

impl ServiceSettings {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }
}

/// Simulation run parameters, passed through to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub cases: u64,
    pub threads: u32,
    pub sub_samples: u32,

    /// Tables fetched per batch after a run
    pub tables_per_run: usize,

    /// Wait bound per run, from submission
    pub max_run_time_secs: u64,

    /// Tables to compare. Empty = every table in the baseline's catalog
    pub tables: Vec<String>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            cases: 1_000_000,
            threads: 8,
            sub_samples: 8,
            tables_per_run: 25,
            max_run_time_secs: 86_400,
            tables: Vec::new(),
        }
    }
}

impl RunSettings {
    pub fn max_run_time(&self) -> Duration {
        Duration::from_secs(self.max_run_time_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareSettings {
    pub treat_null_as_zero: bool,
}

impl Default for CompareSettings {
    fn default() -> Self {
        Self {
            treat_null_as_zero: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: String,

    /// Version roots, baseline first
    pub versions: Vec<PathBuf>,

    pub service: ServiceSettings,
    pub run: RunSettings,
    pub compare: CompareSettings,
}

pub const SAMPLE_CONFIG: &str = r#"# verirun settings
#
# Versions are engine installation roots. The first one is the baseline
# every other version is compared against.

model = "RiskPaths"
versions = [
    "/opt/openmpp/v1.15",
    "/opt/openmpp/v1.17",
]

[service]
base_url = "http://localhost:4040"
startup_attempts = 10
startup_delay_secs = 3
submit_timeout_secs = 300

[run]
cases = 1000000
threads = 8
sub_samples = 8
tables_per_run = 25
max_run_time_secs = 86400
# Empty = every output table of the baseline
tables = []

[compare]
# Null cells compare as 0. With false, null vs null is equal and
# null vs value is a difference.
treat_null_as_zero = true
"#;

impl Settings {
    /// Default settings file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("verirun")
            .join("settings.toml")
    }

    /// Load a settings file. `.json` files are JSON, anything else TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let settings = if is_json(path) {
            // Strip comment lines (//)
            let cleaned: String = contents
                .lines()
                .filter(|line| !line.trim().starts_with("//"))
                .collect::<Vec<_>>()
                .join("\n");
            serde_json::from_str(&cleaned).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            toml::from_str(&contents).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?
        };

        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Load `path` if given, else the default file if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = Self::config_path();
                if default.is_file() {
                    Self::load(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Check what a reconciliation session needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Validation("model name is empty".into()));
        }
        if self.versions.len() < 2 {
            return Err(ConfigError::Validation(format!(
                "at least 2 versions are needed, got {}",
                self.versions.len()
            )));
        }
        if self.run.tables_per_run == 0 {
            return Err(ConfigError::Validation("run.tables_per_run must be at least 1".into()));
        }
        if self.run.threads == 0 {
            return Err(ConfigError::Validation("run.threads must be at least 1".into()));
        }
        Ok(())
    }

    /// Write the sample settings file. Existing files are kept unless `force`.
    pub fn write_sample(path: &Path, force: bool) -> Result<(), ConfigError> {
        if path.exists() && !force {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let body = if is_json(path) {
            serde_json::to_string_pretty(&sample_settings())
                .map_err(|e| ConfigError::Validation(e.to_string()))?
        } else {
            SAMPLE_CONFIG.to_string()
        };
        fs::write(path, body).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn sample_settings() -> Settings {
    Settings {
        model: "RiskPaths".to_string(),
        versions: vec![PathBuf::from("/opt/openmpp/v1.15"), PathBuf::from("/opt/openmpp/v1.17")],
        ..Settings::default()
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
