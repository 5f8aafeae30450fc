mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Handover, Inbound, LlmProviderConfig, Notification, Postgres, Providers, Service,
	Storage, Worker,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.admin_bind", &cfg.service.admin_bind),
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
		("providers.llm_classifier.api_base", &cfg.providers.llm_classifier.api_base),
		("providers.llm_classifier.model", &cfg.providers.llm_classifier.model),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.llm_classifier.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "Provider llm_classifier api_key must be non-empty.".to_string(),
		});
	}
	if cfg.providers.llm_classifier.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.llm_classifier.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if !cfg.providers.llm_classifier.temperature.is_finite() {
		return Err(Error::Validation {
			message: "providers.llm_classifier.temperature must be a finite number.".to_string(),
		});
	}

	for (key, value) in &cfg.providers.llm_classifier.default_headers {
		if !value.is_string() {
			return Err(Error::Validation {
				message: format!(
					"providers.llm_classifier.default_headers.{key} must be a string."
				),
			});
		}
	}

	if cfg.inbound.max_timestamp_skew_seconds < 0 {
		return Err(Error::Validation {
			message: "inbound.max_timestamp_skew_seconds must be zero or greater.".to_string(),
		});
	}
	if cfg.handover.score_threshold > 100 {
		return Err(Error::Validation {
			message: "handover.score_threshold must be in the range 0-100.".to_string(),
		});
	}
	if cfg.handover.min_turns == 0 {
		return Err(Error::Validation {
			message: "handover.min_turns must be greater than zero.".to_string(),
		});
	}
	if cfg.handover.max_elapsed_minutes == 0 {
		return Err(Error::Validation {
			message: "handover.max_elapsed_minutes must be greater than zero.".to_string(),
		});
	}
	if cfg
		.handover
		.escalation_phrases
		.iter()
		.chain(cfg.handover.buying_signals.iter())
		.any(|phrase| phrase.trim().is_empty())
	{
		return Err(Error::Validation {
			message: "handover phrases must be non-empty.".to_string(),
		});
	}

	let url = cfg.notification.url.trim();

	if !(url.starts_with("http://") || url.starts_with("https://")) {
		return Err(Error::Validation {
			message: "notification.url must be an http or https URL.".to_string(),
		});
	}
	if cfg.notification.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "notification.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.notification.max_attempts == 0 {
		return Err(Error::Validation {
			message: "notification.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.notification.max_attempts > 10 {
		return Err(Error::Validation {
			message: "notification.max_attempts must be 10 or less.".to_string(),
		});
	}
	if cfg.worker.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "worker.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.claim_lease_seconds <= 0 {
		return Err(Error::Validation {
			message: "worker.claim_lease_seconds must be greater than zero.".to_string(),
		});
	}

	let lease_ms =
		u64::try_from(cfg.worker.claim_lease_seconds).unwrap_or_default().saturating_mul(1_000);

	if lease_ms <= worst_case_delivery_ms(&cfg.notification) {
		return Err(Error::Validation {
			message: "worker.claim_lease_seconds must exceed the worst-case delivery time."
				.to_string(),
		});
	}

	Ok(())
}

/// Every attempt timing out plus every backoff between attempts.
fn worst_case_delivery_ms(notification: &Notification) -> u64 {
	let attempts = u64::from(notification.max_attempts);
	let backoff_factor = (1_u64 << notification.max_attempts.saturating_sub(1)).saturating_sub(1);

	attempts
		.saturating_mul(notification.timeout_ms)
		.saturating_add(notification.base_backoff_ms.saturating_mul(backoff_factor))
}

fn normalize(cfg: &mut Config) {
	if cfg.inbound.signing_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.inbound.signing_key = None;
	}
	if cfg.notification.secret.as_deref().map(|secret| secret.trim().is_empty()).unwrap_or(false)
	{
		cfg.notification.secret = None;
	}

	for phrases in [&mut cfg.handover.escalation_phrases, &mut cfg.handover.buying_signals] {
		for phrase in phrases.iter_mut() {
			*phrase = phrase.trim().to_lowercase();
		}

		phrases.dedup();
	}
}
