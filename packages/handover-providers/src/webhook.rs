//! Signed handover webhook delivery with bounded retries.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::Result;
use handover_domain::{
	retry::{self, DeliveryReport, FAILED_ATTEMPT, RetryPolicy, RetrySchedule, RetryStep},
	signature,
};

#[derive(Debug, Clone)]
pub struct WebhookTarget {
	pub url: String,
	pub secret: Option<String>,
	pub timeout: Duration,
	pub policy: RetryPolicy,
}
impl WebhookTarget {
	pub fn from_config(cfg: &handover_config::Notification) -> Self {
		Self {
			url: cfg.url.clone(),
			secret: cfg.secret.clone(),
			timeout: Duration::from_millis(cfg.timeout_ms),
			policy: RetryPolicy {
				max_attempts: cfg.max_attempts,
				base_backoff: Duration::from_millis(cfg.base_backoff_ms),
			},
		}
	}
}

pub struct WebhookClient {
	client: Client,
	target: WebhookTarget,
}
impl WebhookClient {
	pub fn new(target: WebhookTarget) -> Result<Self> {
		let client = Client::builder().build()?;

		Ok(Self { client, target })
	}

	/// Delivers `payload`, signing it when a secret is configured.
	///
	/// Never fails: timeouts, network errors, and non-2xx statuses are recorded in the report.
	pub async fn deliver(&self, payload: &Value) -> DeliveryReport {
		let body = match self.target.secret.as_deref() {
			Some(secret) => signature::attach_signature(secret, payload),
			None => payload.clone(),
		};
		let mut schedule = RetrySchedule::new(self.target.policy);

		loop {
			let attempt_index = schedule.next_attempt_index();
			let (code, error) = match self.attempt(&body).await {
				Ok(status) if retry::is_success(status) => {
					tracing::debug!(
						url = %self.target.url,
						status,
						attempt_index,
						"Webhook delivered."
					);

					return schedule.record_success(status);
				},
				Ok(status) => (i32::from(status), format!("HTTP {status}")),
				Err(err) => (FAILED_ATTEMPT, err),
			};

			tracing::warn!(
				url = %self.target.url,
				code,
				attempt_index,
				error = %error,
				"Webhook attempt failed."
			);

			match schedule.record_failure(code, error) {
				RetryStep::Retry { delay, .. } => tokio::time::sleep(delay).await,
				RetryStep::Finished(report) => return report,
			}
		}
	}

	async fn attempt(&self, body: &Value) -> std::result::Result<u16, String> {
		let send = self.client.post(&self.target.url).json(body).send();

		match tokio::time::timeout(self.target.timeout, send).await {
			Ok(Ok(res)) => Ok(res.status().as_u16()),
			Ok(Err(err)) => Err(err.to_string()),
			Err(_) => Err(format!("Timed out after {} ms.", self.target.timeout.as_millis())),
		}
	}
}
