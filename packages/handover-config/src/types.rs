use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub inbound: Inbound,
	#[serde(default)]
	pub handover: Handover,
	pub notification: Notification,
	#[serde(default)]
	pub worker: Worker,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub llm_classifier: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Mail provider inbound webhook settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Inbound {
	/// HMAC key shared with the mail provider. `None` disables signature checks.
	pub signing_key: Option<String>,
	/// Maximum distance between the webhook timestamp and the local clock. Zero disables the
	/// check.
	#[serde(default = "default_max_timestamp_skew_seconds")]
	pub max_timestamp_skew_seconds: i64,
}
impl Default for Inbound {
	fn default() -> Self {
		Self {
			signing_key: None,
			max_timestamp_skew_seconds: default_max_timestamp_skew_seconds(),
		}
	}
}

/// Global handover defaults. Campaigns may override any of the thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct Handover {
	#[serde(default = "default_score_threshold")]
	pub score_threshold: u8,
	#[serde(default = "default_min_turns")]
	pub min_turns: u32,
	#[serde(default = "default_max_elapsed_minutes")]
	pub max_elapsed_minutes: u32,
	#[serde(default = "default_escalation_phrases")]
	pub escalation_phrases: Vec<String>,
	#[serde(default = "default_buying_signals")]
	pub buying_signals: Vec<String>,
	#[serde(default = "default_persona")]
	pub persona: String,
}
impl Default for Handover {
	fn default() -> Self {
		Self {
			score_threshold: default_score_threshold(),
			min_turns: default_min_turns(),
			max_elapsed_minutes: default_max_elapsed_minutes(),
			escalation_phrases: default_escalation_phrases(),
			buying_signals: default_buying_signals(),
			persona: default_persona(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
	pub url: String,
	pub secret: Option<String>,
	#[serde(default = "default_notification_timeout_ms")]
	pub timeout_ms: u64,
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_base_backoff_ms")]
	pub base_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Worker {
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	#[serde(default = "default_claim_lease_seconds")]
	pub claim_lease_seconds: i64,
}
impl Default for Worker {
	fn default() -> Self {
		Self {
			poll_interval_ms: default_poll_interval_ms(),
			claim_lease_seconds: default_claim_lease_seconds(),
		}
	}
}

fn default_max_timestamp_skew_seconds() -> i64 {
	900
}

fn default_score_threshold() -> u8 {
	80
}

fn default_min_turns() -> u32 {
	10
}

fn default_max_elapsed_minutes() -> u32 {
	30
}

fn default_escalation_phrases() -> Vec<String> {
	[
		"speak to a human",
		"speak to a person",
		"talk to a human",
		"talk to a person",
		"talk to someone",
		"real person",
		"call me",
		"give me a call",
		"speak with a salesperson",
		"speak to a manager",
	]
	.into_iter()
	.map(str::to_string)
	.collect()
}

fn default_buying_signals() -> Vec<String> {
	[
		"test drive",
		"ready to buy",
		"financing",
		"trade-in",
		"trade in",
		"down payment",
		"monthly payment",
		"out the door",
		"best price",
		"schedule an appointment",
		"come in today",
		"lease",
	]
	.into_iter()
	.map(str::to_string)
	.collect()
}

fn default_persona() -> String {
	"You are a helpful sales assistant for an automotive dealership.".to_string()
}

fn default_notification_timeout_ms() -> u64 {
	4_000
}

fn default_max_attempts() -> u32 {
	3
}

fn default_base_backoff_ms() -> u64 {
	1_000
}

fn default_poll_interval_ms() -> u64 {
	500
}

fn default_claim_lease_seconds() -> i64 {
	60
}
