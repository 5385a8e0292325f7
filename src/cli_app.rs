//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use chrono::Local;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use slurm_healthcheck::baseline::snapshot::default_file_name;
use slurm_healthcheck::checks::catalog::RunMode;
use slurm_healthcheck::checks::outcome::Status;
use slurm_healthcheck::core::config::{Config, MAX_JOB_WINDOW_DAYS};
use slurm_healthcheck::core::errors::ShcError;
use slurm_healthcheck::engine::session::ValidationSession;
use slurm_healthcheck::exec::executor::SystemExecutor;
use slurm_healthcheck::logger::activity::ActivityLog;
use slurm_healthcheck::report::run_report::RunReport;

/// Slurm cluster validation: health checks and pre/post-upgrade baseline diffing.
#[derive(Debug, Parser)]
#[command(
    name = "slurm-healthcheck",
    author,
    version,
    about = "Slurm Health Check - Cluster Validation Engine",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Show outcome details and diagnostics.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Write the report (run) or the baseline (capture) to FILE.
    #[arg(short, long, global = true, value_name = "FILE")]
    output: Option<PathBuf>,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the health checks, optionally against a baseline.
    Run(RunArgs),
    /// Capture a pre-upgrade baseline snapshot.
    Capture(CaptureArgs),
    /// View and validate configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct RunArgs {
    /// Skip checks that mutate the cluster (job submission).
    #[arg(long, conflicts_with = "compare_only")]
    maintenance: bool,
    /// Compare live state against this baseline file.
    #[arg(long, value_name = "FILE")]
    baseline: Option<PathBuf>,
    /// Only compare against the baseline; run no live checks.
    #[arg(long, requires = "baseline")]
    compare_only: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct CaptureArgs {
    /// Job-count window in days (defaults to `baseline.job_window_days`).
    #[arg(
        long,
        value_name = "N",
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_JOB_WINDOW_DAYS))
    )]
    window_days: Option<u32>,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
///
/// Every variant exits 2, the same code as a CRITICAL verdict; the message
/// prefix is what tells them apart.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration-class failure before any check ran.
    #[error("configuration error: {0}")]
    Config(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Runtime(_) | Self::Json(_) | Self::Io(_) => 2,
        }
    }
}

impl From<ShcError> for CliError {
    fn from(err: ShcError) -> Self {
        if err.is_config_class() {
            Self::Config(err.to_string())
        } else {
            Self::Runtime(err.to_string())
        }
    }
}

/// Dispatch CLI commands. Returns the process exit code on success.
pub fn run(cli: &Cli) -> Result<i32, CliError> {
    if cli.no_color || !io::stdout().is_terminal() {
        control::set_override(false);
    }

    match &cli.command {
        Command::Run(args) => run_checks(cli, args),
        Command::Capture(args) => run_capture(cli, args),
        Command::Config(args) => run_config(cli, args).map(|()| 0),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(0)
        }
    }
}

fn run_checks(cli: &Cli, args: &RunArgs) -> Result<i32, CliError> {
    let config = load_config(cli)?;
    let log = open_log(cli, &config);
    let executor = SystemExecutor::new(config.ssh.clone(), config.timeouts.ssh_connect_secs);
    let session = ValidationSession::new(&executor, &config, &log)?;

    // Baseline problems are configuration errors: surface them before any check runs.
    let baseline = args
        .baseline
        .as_deref()
        .map(|path| session.load_baseline(path))
        .transpose()?;
    if let Some(b) = &baseline {
        info(
            cli,
            &format!(
                "baseline {} captured {} on {}",
                b.path.display(),
                b.snapshot.captured_at.to_rfc3339(),
                b.snapshot.source_host
            ),
        );
    }

    let report = match (&baseline, args.compare_only) {
        (Some(b), true) => session.compare_only(b)?,
        _ => {
            let mode = if args.maintenance {
                RunMode::Maintenance
            } else {
                RunMode::Normal
            };
            session.run(mode, baseline.as_ref())?
        }
    };

    emit_report(cli, &report)?;
    if let Some(path) = &cli.output {
        report.save(path, output_mode(cli) == OutputMode::Json, cli.verbose)?;
        info(cli, &format!("report saved to {}", path.display()));
    }
    Ok(report.exit_code())
}

fn run_capture(cli: &Cli, args: &CaptureArgs) -> Result<i32, CliError> {
    let config = load_config(cli)?;
    let log = open_log(cli, &config);
    let executor = SystemExecutor::new(config.ssh.clone(), config.timeouts.ssh_connect_secs);
    let session = ValidationSession::new(&executor, &config, &log)?;

    let window_days = args.window_days.unwrap_or(config.baseline.job_window_days);
    let capture = session.capture(window_days)?;

    let path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_file_name(&Local::now())));
    session.persist(&capture.snapshot, &path)?;

    for (source, error) in &capture.snapshot.capture_errors {
        warn(cli, &format!("{source} not captured: {error}"));
    }

    let report = capture.report.with_baseline(path.display().to_string());
    emit_report(cli, &report)?;
    if output_mode(cli) == OutputMode::Human && !cli.quiet {
        println!();
        println!("Baseline written to {}", path.display());
    }
    Ok(report.exit_code())
}

fn emit_report(cli: &Cli, report: &RunReport) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            if !cli.quiet {
                let mut stdout = io::stdout().lock();
                write!(stdout, "{}", report.render_text(cli.verbose, &paint))?;
            }
        }
        OutputMode::Json => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", report.to_json_pretty()?)?;
        }
    }
    Ok(())
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = load_config(cli)?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let value = serde_json::to_value(&config)?;
                    let payload = json!({
                        "command": "config show",
                        "config": value,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                if output_mode(cli) == OutputMode::Json {
                    let payload = json!({
                        "command": "config validate",
                        "valid": false,
                        "error": e.to_string(),
                        "error_code": e.code(),
                    });
                    write_json_line(&payload)?;
                }
                Err(e.into())
            }
        },
    }
}

// ──────────────────────── helpers ────────────────────────

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Ok(Config::load(cli.config.as_deref())?)
}

fn open_log(cli: &Cli, config: &Config) -> ActivityLog {
    let log = ActivityLog::open(config);
    info(
        cli,
        &format!(
            "activity log {} ({})",
            config.paths.jsonl_log.display(),
            log.state()
        ),
    );
    log
}

fn paint(status: Status, label: &str) -> String {
    match status {
        Status::Pass => label.green().to_string(),
        Status::Warn => label.yellow().to_string(),
        Status::Fail => label.red().bold().to_string(),
        Status::Skip => label.bright_black().to_string(),
    }
}

fn info(cli: &Cli, message: &str) {
    if cli.verbose {
        eprintln!("[SHC-INFO] {message}");
    }
}

fn warn(cli: &Cli, message: &str) {
    if !cli.quiet {
        eprintln!("[SHC-WARN] {message}");
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("SHC_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        _ => OutputMode::Human,
    }
}
