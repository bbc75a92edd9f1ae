//! Integrator - data-integration execution core
//!
//! CLI entry point for running pipelines and inspecting jobs.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use integrator::cli::{Cli, Command, OutputFormat, generate_after_help, get_log_path};
use integrator::config::Config;
use integrator::domain::{Job, JobStatus, JobStatusView};
use integrator::job::{JobManager, JobTaskResult};
use integrator::pipeline::Pipeline;
use integrator::state::StateManager;
use integrator::transform::{self, Preview, ValidationReport};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;
    config.validate().context("Invalid configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run { pipeline, format } => cmd_run(&config, &pipeline, format).await,
        Command::Jobs { status, format } => cmd_jobs(&config, status.as_deref(), format).await,
        Command::Status { id, format } => cmd_status(&config, &id, format).await,
        Command::Retry { id, pipeline, format } => cmd_retry(&config, &id, &pipeline, format).await,
        Command::Validate { rules, format } => cmd_validate(&rules, format),
        Command::Functions { format } => cmd_functions(format),
        Command::Preview { rules, sample, format } => cmd_preview(&rules, &sample, format),
    }
}

/// Read a YAML or JSON document (`.json` parsed as JSON)
fn load_document(path: &Path) -> Result<Value> {
    debug!(path = %path.display(), "load_document: called");
    let content = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&content).context(format!("Failed to parse {}", path.display()))
    } else {
        serde_yaml::from_str(&content).context(format!("Failed to parse {}", path.display()))
    }
}

fn store_dir(config: &Config) -> PathBuf {
    config.storage.store_path()
}

async fn job_manager(config: &Config, pipeline: &Pipeline) -> Result<Arc<JobManager>> {
    let catalog = pipeline.catalog(config.http.timeout_ms).await?;
    let state = StateManager::spawn(store_dir(config))?;
    let manager = JobManager::new(state, Arc::new(catalog)).with_processor(config.processor());
    Ok(Arc::new(manager))
}

/// Refuse to start when the rules have errors; print warnings
fn check_rules(pipeline: &Pipeline) -> Result<()> {
    let report = pipeline.validate_rules();
    for warning in &report.warnings {
        eprintln!("{} {}", "warning:".yellow(), warning);
    }
    if !report.valid {
        for error in &report.errors {
            eprintln!("{} {}", "error:".red(), error);
        }
        return Err(eyre::eyre!("Pipeline '{}' has invalid transformation rules", pipeline.name));
    }
    Ok(())
}

/// Wait for a started job; Ctrl-C cancels it
async fn wait_for_job(manager: Arc<JobManager>, job_id: &str) -> Result<JobTaskResult> {
    let watcher = {
        let manager = manager.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancelling {}...", job_id);
                if let Err(e) = manager.cancel_job(&job_id).await {
                    warn!(%job_id, error = %e, "wait_for_job: cancel failed");
                }
            }
        })
    };

    let result = manager.wait(job_id).await;
    watcher.abort();
    result?.ok_or_else(|| eyre::eyre!("Job {} has no running task", job_id))
}

/// Run a pipeline as a new job
async fn cmd_run(config: &Config, path: &Path, format: OutputFormat) -> Result<()> {
    debug!(path = %path.display(), "cmd_run: called");
    let pipeline = Pipeline::load(path)?;
    check_rules(&pipeline)?;

    let manager = job_manager(config, &pipeline).await?;
    let job = manager.create_job(pipeline.mapping_id(), &pipeline.name).await?;
    manager.start_job(&job.id).await?;
    if format == OutputFormat::Text {
        println!("Started job {}", job.id.bold());
    }

    let result = wait_for_job(manager.clone(), &job.id).await?;
    finish_job(&manager, &job.id, result, format).await
}

/// Retry a failed job against a pipeline's mapping and connectors
async fn cmd_retry(config: &Config, id: &str, path: &Path, format: OutputFormat) -> Result<()> {
    debug!(%id, path = %path.display(), "cmd_retry: called");
    let pipeline = Pipeline::load(path)?;
    check_rules(&pipeline)?;

    let manager = job_manager(config, &pipeline).await?;
    let job = manager.state().get_job_required(id).await?;
    if job.mapping_id != pipeline.mapping_id() {
        manager.shutdown().await?;
        return Err(eyre::eyre!(
            "Job {} belongs to mapping '{}', but the pipeline provides '{}'",
            id,
            job.mapping_id,
            pipeline.mapping_id()
        ));
    }

    manager.retry_job(id).await?;
    if format == OutputFormat::Text {
        println!("Retrying job {}", id.bold());
    }

    let result = wait_for_job(manager.clone(), id).await?;
    finish_job(&manager, id, result, format).await
}

async fn finish_job(manager: &JobManager, id: &str, result: JobTaskResult, format: OutputFormat) -> Result<()> {
    let view = manager.get_job_status(id).await?;
    manager.shutdown().await?;
    print_status(&view, format)?;

    match result {
        JobTaskResult::Failed(message) => Err(eyre::eyre!("Job {} failed: {}", id, message)),
        JobTaskResult::Completed(_) | JobTaskResult::Cancelled => Ok(()),
    }
}

/// List jobs in the store
async fn cmd_jobs(config: &Config, status: Option<&str>, format: OutputFormat) -> Result<()> {
    debug!(?status, "cmd_jobs: called");
    let status_filter = status
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(|e| eyre::eyre!(e))?;

    let state = StateManager::spawn(store_dir(config))?;
    let jobs = state.list_jobs(status_filter).await?;
    state.shutdown().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&jobs)?);
        }
        OutputFormat::Text => {
            if jobs.is_empty() {
                println!(
                    "No jobs found{}",
                    status.map(|s| format!(" with status '{}'", s)).unwrap_or_default()
                );
                return Ok(());
            }
            println!(
                "{:<40} {:<10} {:>10} {:>8}  {}",
                "ID", "STATUS", "PROCESSED", "FAILED", "CREATED"
            );
            println!("{}", "-".repeat(96));
            for job in &jobs {
                print_job_row(job);
            }
        }
    }
    Ok(())
}

/// Show one job
async fn cmd_status(config: &Config, id: &str, format: OutputFormat) -> Result<()> {
    debug!(%id, "cmd_status: called");
    let state = StateManager::spawn(store_dir(config))?;
    let job = state.get_job_required(id).await;
    state.shutdown().await?;
    print_status(&JobStatusView::from(&job?), format)
}

fn cmd_validate(path: &Path, format: OutputFormat) -> Result<()> {
    debug!(path = %path.display(), "cmd_validate: called");
    let rules = load_document(path)?;
    let report = transform::validate(&rules);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }

    if !report.valid {
        return Err(eyre::eyre!("{} has invalid transformation rules", path.display()));
    }
    Ok(())
}

fn cmd_functions(format: OutputFormat) -> Result<()> {
    debug!("cmd_functions: called");
    let functions = transform::list_functions();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(functions)?),
        OutputFormat::Text => {
            for function in functions {
                let params = if function.params.is_empty() {
                    String::new()
                } else {
                    format!("({})", function.params.join(", "))
                };
                println!("{:<18} {:<32} {}", function.name.bold(), params.dimmed(), function.description);
            }
        }
    }
    Ok(())
}

fn cmd_preview(rules_path: &Path, sample_path: &Path, format: OutputFormat) -> Result<()> {
    debug!(rules = %rules_path.display(), sample = %sample_path.display(), "cmd_preview: called");
    let rules = load_document(rules_path)?;
    let sample = load_document(sample_path)?;
    let preview = transform::preview(&rules, &sample).context("Preview failed")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&preview)?),
        OutputFormat::Text => print_preview(&preview)?,
    }
    Ok(())
}

fn colored_status(status: JobStatus) -> colored::ColoredString {
    paint_status(status, status.to_string())
}

fn paint_status(status: JobStatus, text: String) -> colored::ColoredString {
    match status {
        JobStatus::Pending => text.normal(),
        JobStatus::Running => text.cyan(),
        JobStatus::Completed => text.green(),
        JobStatus::Failed => text.red(),
        JobStatus::Cancelled => text.yellow(),
    }
}

fn print_job_row(job: &Job) {
    // pad before coloring so escape codes do not break alignment
    let status = paint_status(job.status, format!("{:<10}", job.status.to_string()));
    println!(
        "{:<40} {} {:>10} {:>8}  {}",
        job.id,
        status,
        job.records_processed,
        job.records_failed,
        job.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn print_status(view: &JobStatusView, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(view)?);
        return Ok(());
    }

    println!("{:<11} {}", "Job:", view.id);
    println!("{:<11} {}", "Status:", colored_status(view.status));
    println!("{:<11} {}", "Processed:", view.records_processed);
    let failed = if view.records_failed > 0 {
        view.records_failed.to_string().red()
    } else {
        view.records_failed.to_string().normal()
    };
    println!("{:<11} {}", "Failed:", failed);
    if let Some(started) = view.started_at {
        println!("{:<11} {}", "Started:", started.to_rfc3339());
    }
    if let Some(completed) = view.completed_at {
        println!("{:<11} {}", "Completed:", completed.to_rfc3339());
    }
    if let Some(log) = &view.error_log {
        println!("{:<11} {}", "Log:", log);
    }
    Ok(())
}

fn print_report(report: &ValidationReport) {
    if report.valid {
        println!("{}", "Rules are valid".green());
    } else {
        println!("{}", "Rules are invalid".red());
    }
    for error in &report.errors {
        println!("  {} {}", "error:".red(), error);
    }
    for warning in &report.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
}

fn print_preview(preview: &Preview) -> Result<()> {
    if let Some(message) = &preview.message {
        println!("{}", message);
        return Ok(());
    }
    for (i, (original, transformed)) in preview.original.iter().zip(&preview.transformed).enumerate() {
        println!("{}", format!("Record {}", i + 1).bold());
        println!("  {} {}", "before:".dimmed(), serde_json::to_string(original)?);
        println!("  {} {}", "after: ".dimmed(), serde_json::to_string(transformed)?);
    }
    Ok(())
}
