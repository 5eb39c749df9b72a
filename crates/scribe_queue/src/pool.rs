use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::policy::RetryPolicy;
use crate::scheduler::{RunStats, Scheduler};
use crate::stt::SpeechToText;
use crate::worker::Worker;
use prometheus::{Counter, Gauge, Registry};
use scribe_store::AudioRepository;
use scribe_vault::BlobStorage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Spawns the configured number of polling workers and aggregates their pass
/// tallies into prometheus metrics. Each worker owns its own [`Scheduler`]
/// and therefore its own claim identity.
pub struct WorkerPool {
	config: QueueConfig,
	repo: Arc<AudioRepository>,
	vault: Arc<dyn BlobStorage>,
	stt: Arc<dyn SpeechToText>,
	active_workers: Gauge,
	completed_counter: Counter,
	retried_counter: Counter,
	exhausted_counter: Counter,
}

impl WorkerPool {
	///
	/// # Errors
	/// Fails when a metric collides with one already in the registry.
	pub fn new(config: QueueConfig, repo: Arc<AudioRepository>, vault: Arc<dyn BlobStorage>, stt: Arc<dyn SpeechToText>, registry: &Registry) -> Result<Self, QueueError> {
		let active_workers = Gauge::new("scribe_pool_active_workers", "Number of running scheduler workers")?;
		let completed_counter = Counter::new("scribe_pool_jobs_completed", "Total transcriptions committed")?;
		let retried_counter = Counter::new("scribe_pool_jobs_retried", "Total transcription failures scheduled for retry")?;
		let exhausted_counter = Counter::new("scribe_pool_jobs_exhausted", "Total jobs that hit the retry ceiling")?;

		registry.register(Box::new(active_workers.clone()))?;
		registry.register(Box::new(completed_counter.clone()))?;
		registry.register(Box::new(retried_counter.clone()))?;
		registry.register(Box::new(exhausted_counter.clone()))?;

		Ok(Self {
			config,
			repo,
			vault,
			stt,
			active_workers,
			completed_counter,
			retried_counter,
			exhausted_counter,
		})
	}

	#[must_use]
	pub fn retry_policy(&self) -> RetryPolicy {
		self.config.retry_policy()
	}

	/// Run the pool until `shutdown` fires. Returns once every worker has
	/// stopped and the last tally has been folded into the metrics.
	pub async fn run(&self, shutdown: CancellationToken) -> Result<(), QueueError> {
		let (stats_tx, mut stats_rx) = mpsc::channel::<RunStats>(self.config.workers * 2);
		let mut handles = Vec::with_capacity(self.config.workers);

		for id in 0..self.config.workers {
			let scheduler = Scheduler::new(self.repo.clone(), self.vault.clone(), self.stt.clone(), self.config.retry_policy(), self.config.claim_lease);
			let worker = Worker::new(id, scheduler, self.config.poll_interval);
			let tx = stats_tx.clone();
			let token = shutdown.clone();

			handles.push(tokio::spawn(async move { worker.run(tx, token).await }));
			self.active_workers.inc();
		}
		drop(stats_tx);

		tracing::info!(workers = self.config.workers, "worker pool started");

		while let Some(stats) = stats_rx.recv().await {
			self.completed_counter.inc_by(to_f64(stats.completed));
			self.retried_counter.inc_by(to_f64(stats.retried));
			self.exhausted_counter.inc_by(to_f64(stats.exhausted));
		}

		for handle in handles {
			if let Err(err) = handle.await {
				tracing::error!(error = %err, "worker task panicked");
			}
			self.active_workers.dec();
		}

		tracing::info!("worker pool stopped");
		Ok(())
	}
}

#[allow(clippy::cast_precision_loss)]
fn to_f64(count: usize) -> f64 {
	count as f64
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ingest::Ingestor;
	use crate::stt::MockSpeechToText;
	use bytes::Bytes;
	use clap::Parser;
	use scribe_store::NewUser;
	use scribe_vault::MemoryBlobStorage;
	use sqlx::sqlite::SqlitePoolOptions;
	use std::time::Duration;

	#[tokio::test(flavor = "multi_thread")]
	async fn test_pool_drains_pending_jobs_and_shuts_down() {
		let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
		let repo = Arc::new(AudioRepository::new(pool));
		repo.init_schema().await.unwrap();
		let user_id = repo
			.create_user(NewUser {
				email: "ada@example.com".to_string(),
				username: None,
				password: None,
				language: "en".to_string(),
			})
			.await
			.unwrap();

		let vault = Arc::new(MemoryBlobStorage::new());
		let stt = Arc::new(MockSpeechToText::new());
		let ingestor = Ingestor::new(repo.clone(), vault.clone());
		let first = ingestor.ingest(user_id, Bytes::from_static(b"one"), None).await.unwrap();
		let second = ingestor.ingest(user_id, Bytes::from_static(b"two"), None).await.unwrap();

		let mut config = QueueConfig::try_parse_from(vec!["program"]).unwrap();
		config.workers = 2;
		config.poll_interval = Duration::from_millis(10);

		let registry = Registry::new();
		let worker_pool = WorkerPool::new(config, repo.clone(), vault, stt, &registry).unwrap();

		let shutdown = CancellationToken::new();
		let token = shutdown.clone();
		let pool_task = tokio::spawn(async move { worker_pool.run(token).await });

		// Give the workers a few polling cycles to drain the queue.
		for _ in 0..100 {
			if repo.get_audio(first.audio_id).await.unwrap().unwrap().transcription.is_some() && repo.get_audio(second.audio_id).await.unwrap().unwrap().transcription.is_some() {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}

		shutdown.cancel();
		pool_task.await.unwrap().unwrap();

		assert_eq!(repo.get_audio(first.audio_id).await.unwrap().unwrap().transcription.as_deref(), Some("hello"));
		assert_eq!(repo.get_audio(second.audio_id).await.unwrap().unwrap().transcription.as_deref(), Some("hello"));
	}
}
