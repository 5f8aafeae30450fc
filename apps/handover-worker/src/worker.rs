use std::{sync::Arc, time::Duration};

use color_eyre::Result;

use handover_service::HandoverService;

/// Drains the notification outbox forever, sleeping between empty polls.
pub async fn run_worker(service: Arc<HandoverService>) -> Result<()> {
	let poll_interval = Duration::from_millis(service.cfg.worker.poll_interval_ms);

	tracing::info!(
		poll_interval_ms = service.cfg.worker.poll_interval_ms,
		claim_lease_seconds = service.cfg.worker.claim_lease_seconds,
		"Notification worker started."
	);

	loop {
		match drain_outbox(&service).await {
			Ok(0) => {},
			Ok(processed) => {
				tracing::debug!(processed, "Notification outbox drained.");

				continue;
			},
			Err(err) => tracing::error!(error = %err, "Notification outbox processing failed."),
		}

		tokio::time::sleep(poll_interval).await;
	}
}

/// Dispatches due notifications until none remain. Returns how many were processed.
pub async fn drain_outbox(service: &HandoverService) -> handover_service::Result<usize> {
	let mut processed = 0;

	while service.dispatch_next_notification().await?.is_some() {
		processed += 1;
	}

	Ok(processed)
}
