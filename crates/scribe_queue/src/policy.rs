use chrono::{DateTime, Duration as ChronoDuration, Utc};
use scribe_store::DbTranscriptionAttempt;
use std::time::Duration;

/// Retry decision for a job that just failed. `Retry` carries the earliest
/// time the next attempt may run; `Exhaust` means the ceiling is reached and
/// the scheduler must not re-enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
	Retry { next_eligible_at: DateTime<Utc> },
	Exhaust,
}

/// Pure backoff arithmetic. The ceiling and delays are policy parameters,
/// never columns: the ledger only stores the raw failure count.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	pub max_retries: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
}

impl RetryPolicy {
	#[must_use]
	pub fn ceiling(&self) -> i64 {
		i64::from(self.max_retries)
	}

	/// Delay before the next attempt after `prior_failures` failures have
	/// already happened: `base * 2^prior_failures`, capped at `max_delay`.
	/// The first failure waits the base delay.
	#[must_use]
	pub fn delay(&self, prior_failures: i64) -> ChronoDuration {
		let base_ms = i64::try_from(self.base_delay.as_millis()).unwrap_or(i64::MAX);
		let max_ms = i64::try_from(self.max_delay.as_millis()).unwrap_or(i64::MAX);
		let exp = u32::try_from(prior_failures.max(0)).map_or(31, |e| e.min(31));
		let delay_ms = base_ms.saturating_mul(1_i64 << exp).min(max_ms);
		ChronoDuration::milliseconds(delay_ms)
	}

	/// Earliest time the ledger row's audio may be attempted again. Anchored
	/// at the last retry (or row creation, if never retried); never before it.
	#[must_use]
	pub fn next_eligible_at(&self, attempt: &DbTranscriptionAttempt) -> DateTime<Utc> {
		let anchor = attempt.last_retry_at.unwrap_or(attempt.created_at);
		anchor + self.delay(attempt.retries - 1)
	}

	/// Whether a ledger row is eligible to run now: below the ceiling and past
	/// its backoff window. A reset row (`retries == 0`) is due immediately.
	#[must_use]
	pub fn is_due(&self, attempt: &DbTranscriptionAttempt, now: DateTime<Utc>) -> bool {
		if attempt.retries >= self.ceiling() {
			return false;
		}
		if attempt.retries == 0 {
			return true;
		}
		self.next_eligible_at(attempt) <= now
	}

	/// Decide what a failure that just happened means, given how many
	/// failures came before it.
	#[must_use]
	pub fn decide(&self, prior_failures: i64, now: DateTime<Utc>) -> RetryDecision {
		if prior_failures + 1 >= self.ceiling() {
			RetryDecision::Exhaust
		} else {
			RetryDecision::Retry {
				next_eligible_at: now + self.delay(prior_failures),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn policy() -> RetryPolicy {
		RetryPolicy {
			max_retries: 5,
			base_delay: Duration::from_secs(30),
			max_delay: Duration::from_secs(3600),
		}
	}

	fn attempt(retries: i64, created_at: DateTime<Utc>, last_retry_at: Option<DateTime<Utc>>) -> DbTranscriptionAttempt {
		DbTranscriptionAttempt {
			id: 1,
			audio_id: 1,
			retries,
			language: "en".to_string(),
			created_at,
			last_retry_at,
		}
	}

	#[test]
	fn test_delay_doubles_then_plateaus() {
		let policy = policy();
		assert_eq!(policy.delay(0), ChronoDuration::seconds(30));
		assert_eq!(policy.delay(1), ChronoDuration::seconds(60));
		assert_eq!(policy.delay(2), ChronoDuration::seconds(120));
		assert_eq!(policy.delay(6), ChronoDuration::seconds(1920));
		// 30 * 2^7 = 3840s would exceed the cap.
		assert_eq!(policy.delay(7), ChronoDuration::seconds(3600));
		assert_eq!(policy.delay(40), ChronoDuration::seconds(3600));
	}

	#[test]
	fn test_delay_is_monotonic() {
		let policy = policy();
		for prior in 0..20 {
			assert!(policy.delay(prior + 1) >= policy.delay(prior));
		}
	}

	#[test]
	fn test_next_eligible_never_before_last_retry() {
		let policy = policy();
		let now = Utc::now();
		for retries in 1..10 {
			let attempt = attempt(retries, now - ChronoDuration::hours(2), Some(now));
			assert!(policy.next_eligible_at(&attempt) >= now);
		}
	}

	#[test]
	fn test_first_failure_anchors_on_creation() {
		let policy = policy();
		let created = Utc::now();
		let attempt = attempt(1, created, None);
		assert_eq!(policy.next_eligible_at(&attempt), created + ChronoDuration::seconds(30));
	}

	#[test]
	fn test_three_failures_wait_two_minutes() {
		// Ceiling 5, base 30s: after the 3rd failure the next attempt waits
		// 30 * 2^2 = 120s from the last retry.
		let policy = policy();
		let last_retry = Utc::now();
		let attempt = attempt(3, last_retry - ChronoDuration::hours(1), Some(last_retry));

		assert_eq!(policy.next_eligible_at(&attempt), last_retry + ChronoDuration::seconds(120));
		assert!(!policy.is_due(&attempt, last_retry + ChronoDuration::seconds(119)));
		assert!(policy.is_due(&attempt, last_retry + ChronoDuration::seconds(120)));
	}

	#[test]
	fn test_fifth_failure_exhausts() {
		let policy = policy();
		let now = Utc::now();
		assert!(matches!(policy.decide(3, now), RetryDecision::Retry { .. }));
		assert_eq!(policy.decide(4, now), RetryDecision::Exhaust);
	}

	#[test]
	fn test_exhausted_row_is_never_due() {
		let policy = policy();
		let attempt = attempt(5, Utc::now() - ChronoDuration::days(30), None);
		assert!(!policy.is_due(&attempt, Utc::now()));
	}

	#[test]
	fn test_reset_row_is_due_immediately() {
		let policy = policy();
		let attempt = attempt(0, Utc::now(), None);
		assert!(policy.is_due(&attempt, Utc::now()));
	}

	#[test]
	fn test_retry_decision_carries_backoff() {
		let policy = policy();
		let now = Utc::now();
		match policy.decide(0, now) {
			RetryDecision::Retry { next_eligible_at } => assert_eq!(next_eligible_at, now + ChronoDuration::seconds(30)),
			RetryDecision::Exhaust => panic!("first failure must retry"),
		}
	}
}
