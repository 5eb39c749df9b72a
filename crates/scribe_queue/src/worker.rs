use crate::error::QueueError;
use crate::scheduler::{RunStats, Scheduler};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// One polling loop around a [`Scheduler`]. Runs a pass, reports the tally,
/// sleeps, repeats until cancelled. Store errors are logged and the loop
/// keeps going; the database coming back is the recovery path.
pub struct Worker {
	id: usize,
	scheduler: Scheduler,
	poll_interval: Duration,
}

impl Worker {
	#[must_use]
	pub fn new(id: usize, scheduler: Scheduler, poll_interval: Duration) -> Self {
		Self { id, scheduler, poll_interval }
	}

	pub async fn run(&self, stats_tx: mpsc::Sender<RunStats>, shutdown: CancellationToken) {
		tracing::info!(worker = self.id, scheduler_id = %self.scheduler.worker_id(), "worker started");

		loop {
			tokio::select! {
				() = shutdown.cancelled() => {
					tracing::info!(worker = self.id, "worker shutting down");
					return;
				}
				result = self.scheduler.run_due_jobs() => {
					match result {
						Ok(stats) => {
							if stats.examined > 0 {
								tracing::debug!(
									worker = self.id,
									examined = stats.examined,
									completed = stats.completed,
									retried = stats.retried,
									exhausted = stats.exhausted,
									skipped = stats.skipped,
									"scheduling pass finished"
								);
							}
							if stats_tx.send(stats).await.is_err() {
								tracing::warn!(worker = self.id, "stats channel closed, stopping worker");
								return;
							}
						}
						Err(err) => self.log_pass_error(&err),
					}
				}
			}

			tokio::select! {
				() = shutdown.cancelled() => {
					tracing::info!(worker = self.id, "worker shutting down");
					return;
				}
				() = sleep(self.poll_interval) => {}
			}
		}
	}

	fn log_pass_error(&self, err: &QueueError) {
		tracing::error!(worker = self.id, error = %err, "scheduling pass failed");
	}
}
