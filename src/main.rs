//! `qbank` operator tool: inspect the job ledger and replay failed reconciliations.

use std::sync::Arc;

use anyhow::{Context, bail};
use futures_util::future::join_all;
use uuid::Uuid;

use qbank::config::Config;
use qbank::embedding::NoModelEmbedder;
use qbank::ledger::JobLedger;
use qbank::reconcile::{JobOutcome, JobTicket, QueueSettings, ReconcileQueue, RetryOutcome};
use qbank::storage::FileStore;

const USAGE: &str = "usage: qbank <status | retry [JOB_ID]> | --health-check";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "--health-check") {
        std::process::exit(run_health_check().await);
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    config.validate()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let store = Arc::new(
        FileStore::open(&config.storage_path)
            .await
            .with_context(|| format!("opening store at {}", config.storage_path.display()))?,
    );

    match args.first().map(String::as_str) {
        Some("status") => status(&config, store).await,
        Some("retry") => retry(&config, store, args.get(1).map(String::as_str)).await,
        _ => bail!(USAGE),
    }
}

async fn status(config: &Config, store: Arc<FileStore>) -> anyhow::Result<()> {
    let jobs = store.list_jobs().await?;
    let reconciled = jobs.iter().filter(|j| j.is_cache_updated).count();
    let in_progress = jobs.iter().filter(|j| j.in_progress).count();
    let retryable = jobs.iter().filter(|j| j.is_retryable()).count();
    let missing_payload = jobs
        .iter()
        .filter(|j| j.is_retryable() && !j.has_payload())
        .count();

    println!("storage:     {}", config.storage_path.display());
    println!("jobs:        {}", jobs.len());
    println!("reconciled:  {reconciled}");
    println!("in progress: {in_progress}");
    println!("retryable:   {retryable}");
    println!("no payload:  {missing_payload}");

    let now = chrono::Utc::now();
    for job in jobs
        .iter()
        .filter(|j| j.is_stale(now, config.stale_job_after))
    {
        println!(
            "stale: {} started {} attempts {}",
            job.id,
            job.started_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            job.attempts
        );
    }
    for job in jobs.iter().filter(|j| j.is_retryable()) {
        if let Some(error) = &job.last_error {
            println!("failed: {} ({error})", job.id);
        }
    }
    Ok(())
}

async fn retry(config: &Config, store: Arc<FileStore>, job_id: Option<&str>) -> anyhow::Result<()> {
    tracing::warn!("No embedding model attached; jobs that need new embeddings stay retryable");
    let embedder = Arc::new(NoModelEmbedder::new(config.embedding_dim));
    let (queue, _worker) =
        ReconcileQueue::start(store, embedder, QueueSettings::from_config(config)).await?;

    let tickets: Vec<JobTicket> = match job_id {
        Some(raw) => {
            let id = Uuid::parse_str(raw).with_context(|| format!("invalid job id '{raw}'"))?;
            match queue.retry_job(id).await? {
                RetryOutcome::Submitted(ticket) => vec![ticket],
                other => {
                    println!("{id}: {other:?}");
                    return Ok(());
                }
            }
        }
        None => {
            let report = queue.retry_failed().await?;
            for (id, error) in &report.rejected {
                println!("{id}: not submitted ({error})");
            }
            for id in &report.missing_payload {
                println!("{id}: missing payload");
            }
            report.submitted
        }
    };

    let ids: Vec<Uuid> = tickets.iter().map(|t| t.job_id).collect();
    let outcomes = join_all(tickets.into_iter().map(JobTicket::wait)).await;

    let mut failures = 0;
    for (id, outcome) in ids.into_iter().zip(outcomes) {
        match outcome {
            Some(JobOutcome::Failed { error }) => {
                failures += 1;
                println!("{id}: failed ({error})");
            }
            Some(outcome) => println!("{id}: {outcome:?}"),
            None => {
                failures += 1;
                println!("{id}: worker stopped");
            }
        }
    }

    if failures > 0 {
        bail!("{failures} job(s) failed to reconcile");
    }
    Ok(())
}

async fn run_health_check() -> i32 {
    let config = match Config::from_env() {
        Ok(config) if config.validate().is_ok() => config,
        _ => return 1,
    };

    match FileStore::open(&config.storage_path).await {
        Ok(store) => match store.list_jobs().await {
            Ok(_) => 0,
            Err(_) => 1,
        },
        Err(_) => 1,
    }
}
