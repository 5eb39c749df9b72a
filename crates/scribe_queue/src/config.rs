use crate::policy::RetryPolicy;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Parser, Clone, Debug, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct QueueConfig {
	#[arg(long, env = "WORKER_COUNT", default_value = "2", help = "Number of polling scheduler workers")]
	pub workers: usize,

	#[arg(long, env = "MAX_RETRIES", default_value = "5", help = "Retry ceiling per audio before it is exhausted")]
	pub max_retries: u32,

	#[arg(
        long = "retry-base-delay-secs",
        env = "RETRY_BASE_DELAY_SECS",
        default_value = "30",
        value_parser = parse_duration,
        help = "Backoff delay after the first failure in seconds"
    )]
	pub retry_base_delay: Duration,

	#[arg(
        long = "retry-max-delay-secs",
        env = "RETRY_MAX_DELAY_SECS",
        default_value = "3600",
        value_parser = parse_duration,
        help = "Upper bound on the backoff delay in seconds"
    )]
	pub retry_max_delay: Duration,

	#[arg(
        long = "claim-lease-secs",
        env = "CLAIM_LEASE_SECS",
        default_value = "300",
        value_parser = parse_duration,
        help = "How long a worker's exclusive claim on a job lives before it expires"
    )]
	pub claim_lease: Duration,

	#[arg(
        long = "poll-interval-secs",
        env = "POLL_INTERVAL_SECS",
        default_value = "5",
        value_parser = parse_duration,
        help = "Delay between scheduler polls in seconds"
    )]
	pub poll_interval: Duration,
}

impl QueueConfig {
	#[must_use]
	pub const fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy {
			max_retries: self.max_retries,
			base_delay: self.retry_base_delay,
			max_delay: self.retry_max_delay,
		}
	}

	///
	/// # Errors
	/// Returns a message when a knob combination can never schedule work.
	pub fn validate(&self) -> Result<(), String> {
		if self.workers == 0 {
			return Err("worker count must be at least 1".to_string());
		}
		if self.max_retries == 0 {
			return Err("retry ceiling must be at least 1".to_string());
		}
		if self.retry_max_delay < self.retry_base_delay {
			return Err("max retry delay must not be below the base delay".to_string());
		}
		Ok(())
	}
}

fn parse_duration(s: &str) -> Result<Duration, std::num::ParseIntError> {
	s.parse::<u64>().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_duration() {
		assert_eq!(parse_duration("60").unwrap(), Duration::from_secs(60));
		assert!(parse_duration("invalid").is_err());
	}

	#[test]
	fn test_config_parser() {
		let args = vec![
			"program",
			"--workers",
			"4",
			"--max-retries",
			"3",
			"--retry-base-delay-secs",
			"10",
			"--retry-max-delay-secs",
			"600",
			"--claim-lease-secs",
			"120",
			"--poll-interval-secs",
			"1",
		];

		let config = QueueConfig::try_parse_from(args).unwrap();
		assert_eq!(config.workers, 4);
		assert_eq!(config.max_retries, 3);
		assert_eq!(config.retry_base_delay, Duration::from_secs(10));
		assert_eq!(config.retry_max_delay, Duration::from_secs(600));
		assert_eq!(config.claim_lease, Duration::from_secs(120));
		assert_eq!(config.poll_interval, Duration::from_secs(1));
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_validate_rejects_inverted_delays() {
		let mut config = QueueConfig::try_parse_from(vec!["program"]).unwrap();
		config.retry_max_delay = Duration::from_secs(1);
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_validate_rejects_zero_workers() {
		let mut config = QueueConfig::try_parse_from(vec!["program"]).unwrap();
		config.workers = 0;
		assert!(config.validate().is_err());
	}
}
