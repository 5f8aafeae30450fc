//! Bounded retry schedule for notification delivery.
//!
//! The schedule does no I/O and owns no clock. Callers report the outcome of each attempt and
//! receive either the delay before the next attempt or a final report.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Attempt code recorded for timeouts and network failures.
pub const FAILED_ATTEMPT: i32 = -1;

const MAX_BACKOFF_SHIFT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_backoff: Duration,
}
impl RetryPolicy {
	/// Delay awaited after the attempt at `attempt_index` (0-based) fails: `base * 2^index`.
	pub fn backoff_for(&self, attempt_index: u32) -> Duration {
		let factor = 1_u32 << attempt_index.min(MAX_BACKOFF_SHIFT);

		self.base_backoff.saturating_mul(factor)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self { max_attempts: 3, base_backoff: Duration::from_millis(1_000) }
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStep {
	Retry { attempt_index: u32, delay: Duration },
	Finished(DeliveryReport),
}

/// Outcome of one delivery operation, kept for audit and alerting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
	pub delivered: bool,
	pub error: Option<String>,
	pub attempts: Vec<i32>,
}

#[derive(Debug, Clone)]
pub struct RetrySchedule {
	policy: RetryPolicy,
	attempts: Vec<i32>,
}
impl RetrySchedule {
	pub fn new(policy: RetryPolicy) -> Self {
		let policy = RetryPolicy { max_attempts: policy.max_attempts.max(1), ..policy };

		Self { policy, attempts: Vec::with_capacity(policy.max_attempts as usize) }
	}

	/// Index of the attempt about to be made.
	pub fn next_attempt_index(&self) -> u32 {
		self.attempts.len() as u32
	}

	pub fn attempts(&self) -> &[i32] {
		&self.attempts
	}

	pub fn record_success(mut self, status: u16) -> DeliveryReport {
		self.attempts.push(i32::from(status));

		DeliveryReport { delivered: true, error: None, attempts: self.attempts }
	}

	/// Records a failed attempt (`FAILED_ATTEMPT` or a non-2xx status) and decides what follows.
	pub fn record_failure(&mut self, code: i32, error: impl Into<String>) -> RetryStep {
		let attempt_index = self.next_attempt_index();

		self.attempts.push(code);

		if self.attempts.len() as u32 >= self.policy.max_attempts {
			return RetryStep::Finished(DeliveryReport {
				delivered: false,
				error: Some(error.into()),
				attempts: std::mem::take(&mut self.attempts),
			});
		}

		RetryStep::Retry {
			attempt_index: attempt_index + 1,
			delay: self.policy.backoff_for(attempt_index),
		}
	}
}

pub fn is_success(status: u16) -> bool {
	(200..300).contains(&status)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_doubles_from_base() {
		let policy = RetryPolicy::default();

		assert_eq!(policy.backoff_for(0), Duration::from_millis(1_000));
		assert_eq!(policy.backoff_for(1), Duration::from_millis(2_000));
		assert_eq!(policy.backoff_for(2), Duration::from_millis(4_000));
	}

	#[test]
	fn three_server_errors_exhaust_the_schedule() {
		let mut schedule = RetrySchedule::new(RetryPolicy::default());
		let mut waited = Duration::ZERO;
		let report = loop {
			match schedule.record_failure(500, "HTTP 500") {
				RetryStep::Retry { delay, .. } => waited += delay,
				RetryStep::Finished(report) => break report,
			}
		};

		assert!(!report.delivered);
		assert_eq!(report.attempts, vec![500, 500, 500]);
		assert_eq!(report.error.as_deref(), Some("HTTP 500"));
		assert_eq!(waited, Duration::from_millis(3_000));
	}

	#[test]
	fn first_success_is_a_single_attempt() {
		let schedule = RetrySchedule::new(RetryPolicy::default());
		let report = schedule.record_success(204);

		assert!(report.delivered);
		assert_eq!(report.attempts, vec![204]);
	}

	#[test]
	fn attempts_never_exceed_max() {
		for max_attempts in 1..=5 {
			let mut schedule =
				RetrySchedule::new(RetryPolicy { max_attempts, base_backoff: Duration::ZERO });
			let report = loop {
				if let RetryStep::Finished(report) =
					schedule.record_failure(FAILED_ATTEMPT, "timeout")
				{
					break report;
				}
			};

			assert_eq!(report.attempts.len(), max_attempts as usize);
		}
	}

	#[test]
	fn success_after_failures_keeps_history() {
		let mut schedule = RetrySchedule::new(RetryPolicy::default());

		assert_eq!(
			schedule.record_failure(FAILED_ATTEMPT, "timeout"),
			RetryStep::Retry { attempt_index: 1, delay: Duration::from_millis(1_000) }
		);

		let report = schedule.record_success(200);

		assert_eq!(report.attempts, vec![FAILED_ATTEMPT, 200]);
	}
}
