// verirun - cross-version result reconciliation for simulation engine builds

mod exit_codes;
mod offline;
mod report;
mod service;

use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use exit_codes::{EXIT_CONFIG, EXIT_DIFFS, EXIT_SESSION, EXIT_STORE, EXIT_SUCCESS, EXIT_USAGE};
use report::{OutputFormat, Report, RunRecord, SkippedRecord};
use verirun_config::{ConfigError, Settings};
use verirun_io::{OutputStore, StoreError};
use verirun_recon::{aggregate, CompareOptions, ComparisonSummary, SummaryStatus};
use verirun_runner::{run_session, SessionError, SessionPlan, SystemClock, Version};
use verirun_service_client::EngineOptions;

#[derive(Parser)]
#[command(name = "verirun")]
#[command(about = "Run a model under several engine versions and compare the output tables")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Settings file (TOML, or JSON with a .json extension)
    #[arg(long, short = 'c', global = true, env = "VERIRUN_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging (overridden by VERIRUN_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the model under every version and compare the results
    #[command(after_help = "\
Examples:
  verirun run --om-root /opt/openmpp/v1.15 --om-root /opt/openmpp/v1.17 -m RiskPaths
  verirun run -c settings.toml --cases 5000 --out json -o summary.json")]
    Run {
        #[command(flatten)]
        versions: VersionArgs,

        /// Simulation cases
        #[arg(long)]
        cases: Option<u64>,

        /// Engine threads
        #[arg(long)]
        threads: Option<u32>,

        /// Sub-samples (sub-values) per run
        #[arg(long)]
        sub_samples: Option<u32>,

        /// Tables fetched per batch
        #[arg(long)]
        tables_per_run: Option<usize>,

        /// Maximum wait for each run, in seconds
        #[arg(long, value_name = "SECS")]
        max_run_time: Option<u64>,

        /// Service URL once started
        #[arg(long)]
        base_url: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Compare runs already stored under each version (no service needed)
    #[command(after_help = "\
Examples:
  verirun compare --om-root ./v1 --om-root ./v2 -m RiskPaths
  verirun compare --om-root ./v1 --om-root ./v2 -m RiskPaths --run TestRun_1700000000 --run 12")]
    Compare {
        #[command(flatten)]
        versions: VersionArgs,

        /// Run of each version (id, stamp, digest or name), in --om-root order. Default: latest
        #[arg(long = "run", value_name = "RUN")]
        runs: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List the output tables of a model
    Tables {
        /// Engine installation root
        #[arg(long)]
        om_root: PathBuf,

        /// Model name
        #[arg(long, short = 'm', alias = "model-name")]
        model: Option<String>,

        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// List the stored runs of a model, newest first
    Runs {
        /// Engine installation root
        #[arg(long)]
        om_root: PathBuf,

        /// Model name
        #[arg(long, short = 'm', alias = "model-name")]
        model: Option<String>,

        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// Write a sample settings file
    CreateConfig {
        /// Destination. Default: ~/.config/verirun/settings.toml
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct VersionArgs {
    /// Engine installation root, baseline first (repeatable)
    #[arg(long = "om-root", value_name = "DIR")]
    om_roots: Vec<PathBuf>,

    /// Model name
    #[arg(long, short = 'm', alias = "model-name")]
    model: Option<String>,

    /// Output table to compare (repeatable). Default: every table of the baseline
    #[arg(long = "table", value_name = "NAME")]
    tables: Vec<String>,

    /// Compare null cells as null instead of zero
    #[arg(long)]
    keep_nulls: bool,
}

#[derive(Args)]
struct OutputArgs {
    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    out: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("VERIRUN_GIT_HASH"), ")",
        "\ntarget:  ", env!("VERIRUN_TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Run {
            versions,
            cases,
            threads,
            sub_samples,
            tables_per_run,
            max_run_time,
            base_url,
            output,
        } => {
            let overrides = RunOverrides {
                cases,
                threads,
                sub_samples,
                tables_per_run,
                max_run_time,
                base_url,
            };
            cmd_run(config, versions, overrides, output)
        }
        Commands::Compare {
            versions,
            runs,
            output,
        } => cmd_compare(config, versions, runs, output),
        Commands::Tables { om_root, model, json } => cmd_tables(config, om_root, model, json),
        Commands::Runs { om_root, model, json } => cmd_runs(config, om_root, model, json),
        Commands::CreateConfig { path, force } => cmd_create_config(path, force),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// Events go to stderr; stdout carries only command output.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("VERIRUN_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .init();
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self {
            code: EXIT_USAGE,
            message: msg.into(),
            hint: None,
        }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self {
            code: EXIT_USAGE,
            message: msg.into(),
            hint: None,
        }
    }

    pub fn config(err: ConfigError) -> Self {
        let hint = match &err {
            ConfigError::AlreadyExists(_) => Some("use --force to overwrite".to_string()),
            ConfigError::Validation(msg) if msg.contains("versions") => Some(
                "pass --om-root once per version, or list them under `versions` in the settings file"
                    .to_string(),
            ),
            ConfigError::Validation(msg) if msg.contains("model") => {
                Some("pass --model or set `model` in the settings file".to_string())
            }
            _ => None,
        };
        Self {
            code: EXIT_CONFIG,
            message: err.to_string(),
            hint,
        }
    }

    pub fn store(err: StoreError) -> Self {
        let hint = match &err {
            StoreError::NotFound { .. } => {
                Some("is --om-root an engine installation with a built model?".to_string())
            }
            _ => None,
        };
        Self {
            code: EXIT_STORE,
            message: err.to_string(),
            hint,
        }
    }

    pub fn session(err: SessionError) -> Self {
        Self {
            code: EXIT_SESSION,
            message: err.to_string(),
            hint: Some(
                "check that <om-root>/bin holds the execution service and the model is built"
                    .to_string(),
            ),
        }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// Settings
// ============================================================================

struct RunOverrides {
    cases: Option<u64>,
    threads: Option<u32>,
    sub_samples: Option<u32>,
    tables_per_run: Option<usize>,
    max_run_time: Option<u64>,
    base_url: Option<String>,
}

/// Settings file (if any) with command line values on top.
fn load_settings(config: Option<&Path>, versions: &VersionArgs) -> Result<Settings, CliError> {
    let mut settings = Settings::load_or_default(config).map_err(CliError::config)?;
    if !versions.om_roots.is_empty() {
        settings.versions = versions.om_roots.clone();
    }
    if let Some(model) = &versions.model {
        settings.model = model.clone();
    }
    if !versions.tables.is_empty() {
        settings.run.tables = versions.tables.clone();
    }
    if versions.keep_nulls {
        settings.compare.treat_null_as_zero = false;
    }
    Ok(settings)
}

/// Labels are the roots' last component, or full paths when those collide.
fn version_list(roots: &[PathBuf]) -> Vec<Version> {
    let versions: Vec<Version> = roots.iter().map(|r| Version::from_root(r.clone())).collect();
    let mut seen = HashSet::new();
    if versions.iter().all(|v| seen.insert(v.label.clone())) {
        versions
    } else {
        roots.iter().map(|r| Version::new(r.display().to_string(), r.clone())).collect()
    }
}

fn compare_options(settings: &Settings) -> CompareOptions {
    CompareOptions {
        treat_null_as_zero: settings.compare.treat_null_as_zero,
    }
}

// ============================================================================
// run / compare
// ============================================================================

fn cmd_run(
    config: Option<&Path>,
    versions: VersionArgs,
    overrides: RunOverrides,
    output: OutputArgs,
) -> Result<(), CliError> {
    let mut settings = load_settings(config, &versions)?;
    if let Some(cases) = overrides.cases {
        settings.run.cases = cases;
    }
    if let Some(threads) = overrides.threads {
        settings.run.threads = threads;
    }
    if let Some(sub_samples) = overrides.sub_samples {
        settings.run.sub_samples = sub_samples;
    }
    if let Some(n) = overrides.tables_per_run {
        settings.run.tables_per_run = n;
    }
    if let Some(secs) = overrides.max_run_time {
        settings.run.max_run_time_secs = secs;
    }
    if let Some(url) = overrides.base_url {
        settings.service.base_url = url;
    }
    settings.validate().map_err(CliError::config)?;

    let plan = SessionPlan {
        model: settings.model.clone(),
        versions: version_list(&settings.versions),
        parameters: EngineOptions {
            cases: settings.run.cases,
            threads: settings.run.threads,
            sub_samples: settings.run.sub_samples,
        },
        tables: settings.run.tables.clone(),
        tables_per_run: settings.run.tables_per_run,
        max_run_time: settings.run.max_run_time(),
        submit_timeout: settings.service.submit_timeout(),
        compare: compare_options(&settings),
    };

    let mut manager = service::OmsManager::new(settings.service.clone());
    let session = run_session(&plan, &mut manager, &SystemClock).map_err(CliError::session)?;

    let report = Report {
        summary: &session.summary,
        runs: session.outcomes.iter().map(RunRecord::from_outcome).collect(),
        skipped: session.skipped.iter().map(SkippedRecord::from).collect(),
    };
    emit(&report, &output)?;
    verdict(&session.summary)
}

fn cmd_compare(
    config: Option<&Path>,
    versions: VersionArgs,
    runs: Vec<String>,
    output: OutputArgs,
) -> Result<(), CliError> {
    let settings = load_settings(config, &versions)?;
    settings.validate().map_err(CliError::config)?;

    let versions = version_list(&settings.versions);
    let results = offline::collect_results(
        &versions,
        &settings.model,
        &runs,
        &settings.run.tables,
        settings.run.tables_per_run,
    )?;
    let summary = aggregate(&results, &compare_options(&settings));

    let report = Report {
        summary: &summary,
        runs: Vec::new(),
        skipped: Vec::new(),
    };
    emit(&report, &output)?;
    verdict(&summary)
}

fn emit(report: &Report<'_>, output: &OutputArgs) -> Result<(), CliError> {
    let bytes = report::render(report, output.out).map_err(CliError::io)?;
    write_output(&bytes, output.output.as_deref())
}

fn write_output(bytes: &[u8], output: Option<&Path>) -> Result<(), CliError> {
    match output {
        Some(path) => {
            std::fs::write(path, bytes)
                .map_err(|e| CliError::io(format!("{}: {}", path.display(), e)))?;
            tracing::info!(path = %path.display(), "summary written");
        }
        None => {
            io::stdout().write_all(bytes).map_err(|e| CliError::io(e.to_string()))?;
        }
    }
    Ok(())
}

/// Exit 1 when any table differs, like `diff(1)`.
fn verdict(summary: &ComparisonSummary) -> Result<(), CliError> {
    if let SummaryStatus::InsufficientVersions { usable } = summary.status {
        return Err(CliError {
            code: EXIT_SESSION,
            message: format!(
                "only {usable} version(s) produced output tables, nothing was compared"
            ),
            hint: None,
        });
    }
    if summary.has_differences() {
        return Err(CliError {
            code: EXIT_DIFFS,
            message: String::new(),
            hint: None,
        });
    }
    Ok(())
}

// ============================================================================
// tables / runs
// ============================================================================

fn open_store(
    config: Option<&Path>,
    om_root: &Path,
    model: Option<String>,
) -> Result<OutputStore, CliError> {
    let model = match model {
        Some(model) => model,
        None => Settings::load_or_default(config).map_err(CliError::config)?.model,
    };
    if model.trim().is_empty() {
        return Err(CliError::usage("no model given")
            .with_hint("pass --model or set `model` in the settings file"));
    }
    OutputStore::open(om_root, &model).map_err(CliError::store)
}

fn cmd_tables(
    config: Option<&Path>,
    om_root: PathBuf,
    model: Option<String>,
    json: bool,
) -> Result<(), CliError> {
    let store = open_store(config, &om_root, model)?;
    let tables = store.list_output_tables().map_err(CliError::store)?;

    let mut out = if json {
        serde_json::to_string_pretty(&tables).map_err(|e| CliError::io(e.to_string()))?
    } else {
        let width = tables.iter().map(|t| t.name.len()).max().unwrap_or(0);
        tables
            .iter()
            .map(|t| format!("{:<width$}  {}", t.name, t.description, width = width))
            .collect::<Vec<_>>()
            .join("\n")
    };
    if !out.is_empty() {
        out.push('\n');
    }
    write_output(out.as_bytes(), None)
}

fn cmd_runs(
    config: Option<&Path>,
    om_root: PathBuf,
    model: Option<String>,
    json: bool,
) -> Result<(), CliError> {
    let store = open_store(config, &om_root, model)?;
    let runs = store.list_runs().map_err(CliError::store)?;

    let mut out = if json {
        serde_json::to_string_pretty(&runs).map_err(|e| CliError::io(e.to_string()))?
    } else {
        runs.iter()
            .map(|r| {
                format!(
                    "{:>6}  {:<2}  {:<23}  {}",
                    r.run_id,
                    r.run_status.as_deref().unwrap_or("-"),
                    r.create_dt.as_deref().unwrap_or("-"),
                    r.run_name
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    if !out.is_empty() {
        out.push('\n');
    }
    write_output(out.as_bytes(), None)
}

// ============================================================================
// create-config
// ============================================================================

fn cmd_create_config(path: Option<PathBuf>, force: bool) -> Result<(), CliError> {
    let path = path.unwrap_or_else(Settings::config_path);
    Settings::write_sample(&path, force).map_err(CliError::config)?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colliding_labels_fall_back_to_paths() {
        let distinct = version_list(&[PathBuf::from("/opt/v1"), PathBuf::from("/opt/v2")]);
        assert_eq!(distinct[0].label, "v1");
        assert_eq!(distinct[1].label, "v2");

        let same = version_list(&[PathBuf::from("/a/openmpp"), PathBuf::from("/b/openmpp")]);
        assert_eq!(same[0].label, "/a/openmpp");
        assert_eq!(same[1].label, "/b/openmpp");
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
