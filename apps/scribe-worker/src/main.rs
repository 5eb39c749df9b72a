mod config;

use anyhow::{Context, Result};
use clap::Parser;
use prometheus::Registry;
use scribe_queue::{MockSpeechToText, WorkerPool};
use scribe_store::AudioRepository;
use scribe_vault::LocalBlobStorage;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt::format::JsonFields, Layer};

use config::Config;

const DB_MAX_RETRIES: u32 = 5;
const DB_INITIAL_BACKOFF_MS: u64 = 500;

#[tokio::main]
async fn main() -> Result<()> {
	dotenvy::dotenv().ok();

	let config = Config::parse();
	config.queue.validate().map_err(|e| anyhow::anyhow!(e))?;

	init_tracing(&config);

	info!(
		database_url = %config.database_url,
		blob_root = %config.blob_root,
		workers = config.queue.workers,
		"starting transcription worker"
	);

	let pool = connect_with_retry(&config.database_url).await?;
	let repo = Arc::new(AudioRepository::new(pool));
	repo.init_schema().await.context("failed to initialize schema")?;

	let vault = Arc::new(LocalBlobStorage::new(&config.blob_root).await.context("failed to create blob store root")?);
	let stt = Arc::new(MockSpeechToText::new());

	log_outstanding_work(&repo, &config).await?;

	let registry = Registry::new();
	let worker_pool = WorkerPool::new(config.queue, repo, vault, stt, &registry)?;

	let shutdown = CancellationToken::new();
	let token = shutdown.clone();

	let outcome = tokio::select! {
		result = worker_pool.run(token) => {
			error!("worker pool exited unexpectedly: {result:?}");
			result.map_err(Into::into)
		}
		() = wait_for_shutdown_signal() => {
			info!("shutdown signal received");
			shutdown.cancel();
			Ok(())
		}
	};

	log_final_metrics(&registry);
	outcome
}

/// Nothing scrapes this binary, so the pool counters go to the log trail
/// once on the way out.
fn log_final_metrics(registry: &Registry) {
	for family in registry.gather() {
		for metric in family.get_metric() {
			let value = if metric.has_counter() {
				metric.get_counter().get_value()
			} else if metric.has_gauge() {
				metric.get_gauge().get_value()
			} else {
				continue;
			};
			info!(metric = family.get_name(), value, "final metric value");
		}
	}
}

/// Boot sweep: jobs that failed before the last shutdown are still in the
/// ledger and will be retried by the first scheduling passes. Surface them
/// so operators can tell a backlog from a fresh start.
async fn log_outstanding_work(repo: &AudioRepository, config: &Config) -> Result<()> {
	let attempts = repo.list_attempts().await?;
	let ceiling = config.queue.retry_policy().ceiling();
	let exhausted = attempts.iter().filter(|a| a.retries >= ceiling).count();

	if attempts.is_empty() {
		info!("no outstanding failed transcriptions");
	} else {
		info!(outstanding = attempts.len(), exhausted, "resuming with outstanding failed transcriptions");
	}
	Ok(())
}

fn init_tracing(config: &Config) {
	use tracing_subscriber::layer::SubscriberExt;
	use tracing_subscriber::util::SubscriberInitExt;

	let filter = config
		.rust_log
		.as_deref()
		.map_or_else(|| EnvFilter::new("info"), |directives| EnvFilter::from_str(directives).unwrap_or_else(|_| EnvFilter::new("info")));

	tracing_subscriber::registry()
		.with(if config.log_json {
			Box::new(
				tracing_subscriber::fmt::layer()
					.fmt_fields(JsonFields::default())
					.event_format(tracing_subscriber::fmt::format().json().flatten_event(true).with_span_list(false))
					.with_filter(filter),
			) as Box<dyn Layer<_> + Send + Sync>
		} else {
			Box::new(
				tracing_subscriber::fmt::layer()
					.event_format(tracing_subscriber::fmt::format().pretty())
					.with_filter(filter),
			)
		})
		.init();
}

async fn connect_with_retry(database_url: &str) -> Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(database_url).context("invalid database url")?.create_if_missing(true);

	for attempt in 1..=DB_MAX_RETRIES {
		match SqlitePoolOptions::new().max_connections(5).connect_with(options.clone()).await {
			Ok(pool) => {
				info!(url = %database_url, "connected to database");
				return Ok(pool);
			}
			Err(e) => {
				if attempt == DB_MAX_RETRIES {
					error!(error = %e, url = %database_url, "failed to connect to database after {DB_MAX_RETRIES} attempts");
					return Err(e.into());
				}

				let backoff = DB_INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
				warn!(attempt, max_retries = DB_MAX_RETRIES, backoff_ms = backoff, error = %e, "database connection failed, retrying");
				tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
			}
		}
	}

	unreachable!()
}

async fn wait_for_shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install SIGTERM handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}
}
