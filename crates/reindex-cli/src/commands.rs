//! Command implementations for the reindexer CLI.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{info, warn};

use reindex_backend::{BackendError, ElasticBackend, ElasticConfig, SearchBackend};
use reindex_pipeline::{LoggingProgressReporter, OrchestratorConfig, ReindexOrchestrator};
use reindex_types::{JobPayload, JobStatus, ReindexJob, Settings};

/// Load settings and apply CLI overrides.
pub fn load_settings(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    engine_url_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    if let Some(url) = engine_url_override {
        settings = settings.with_engine_url(url);
    }
    Ok(settings)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Read a job payload file into a validated job.
pub fn read_job(path: &Path, default_scroll_size: usize) -> Result<ReindexJob> {
    let input = fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    let payload = JobPayload::from_json(&input)
        .with_context(|| format!("Failed to parse job file {}", path.display()))?;
    payload
        .into_job(default_scroll_size)
        .with_context(|| format!("Invalid job in {}", path.display()))
}

fn read_jobs(paths: &[PathBuf], default_scroll_size: usize) -> Result<Vec<ReindexJob>> {
    paths
        .iter()
        .map(|path| read_job(path, default_scroll_size))
        .collect()
}

/// Run every job on its own task against a shared backend.
///
/// Returns the final job records in input order. A failed job is not an
/// error here; check each record's status.
pub async fn run_jobs(
    backend: Arc<dyn SearchBackend>,
    config: OrchestratorConfig,
    jobs: Vec<ReindexJob>,
) -> Result<Vec<ReindexJob>> {
    let handles = jobs.into_iter().map(|mut job| {
        let orchestrator = ReindexOrchestrator::new(Arc::clone(&backend))
            .with_reporter(Arc::new(LoggingProgressReporter::new(job.id.clone())))
            .with_config(config.clone());
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run(&mut job).await {
                warn!(job = %job.id, error = %e, "Job failed");
            }
            job
        })
    });

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.context("Job task panicked"))
        .collect()
}

/// `run` command: returns an error if any job failed.
pub async fn run_command(
    config_path: Option<&str>,
    log_level: Option<&str>,
    paths: &[PathBuf],
    engine_url: Option<&str>,
) -> Result<()> {
    let settings = load_settings(config_path, log_level, engine_url)?;
    init_logging(&settings.log_level)?;

    let jobs = read_jobs(paths, settings.default_scroll_size)?;
    info!(jobs = jobs.len(), engine = %settings.engine_url, "Running reindex jobs");

    let backend = ElasticBackend::new(ElasticConfig::from_settings(&settings))
        .context("Failed to build engine client")?;
    let finished = run_jobs(
        Arc::new(backend),
        OrchestratorConfig::from_settings(&settings),
        jobs,
    )
    .await?;

    println!("{}", serde_json::to_string_pretty(&finished)?);

    let failed = finished
        .iter()
        .filter(|job| job.status == JobStatus::Failed)
        .count();
    if failed > 0 {
        bail!("{failed} of {} job(s) failed", finished.len());
    }
    Ok(())
}

/// `{url, alive, status}` for a health probe result.
pub fn health_report(url: &str, probe: Result<Value, BackendError>) -> Value {
    match probe {
        Ok(info) => json!({ "url": url, "alive": true, "status": info }),
        Err(e) => json!({ "url": url, "alive": false, "status": e.to_string() }),
    }
}

/// `health` command: returns an error if the engine is unreachable.
pub async fn health_command(
    config_path: Option<&str>,
    log_level: Option<&str>,
    engine_url: Option<&str>,
) -> Result<()> {
    let settings = load_settings(config_path, log_level, engine_url)?;
    init_logging(&settings.log_level)?;

    let backend = ElasticBackend::new(ElasticConfig::from_settings(&settings))
        .context("Failed to build engine client")?;
    let report = health_report(&settings.engine_url, backend.health().await);
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report["alive"] != json!(true) {
        bail!("Engine at {} is not reachable", settings.engine_url);
    }
    Ok(())
}

/// `validate` command.
pub fn validate_command(config_path: Option<&str>, paths: &[PathBuf]) -> Result<()> {
    let settings = load_settings(config_path, None, None)?;
    for job in read_jobs(paths, settings.default_scroll_size)? {
        println!(
            "ok: {} -> {} ({} batch size)",
            job.indices.join(","),
            job.new_index,
            job.scroll_size
        );
    }
    Ok(())
}
