//! Persistence boundary for the handover pipeline.

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{BoxFuture, Result};
use handover_domain::{
	conversation::{SenderRole, TranscriptMessage},
	decision::{CriteriaOverride, HandoverEvaluation},
	retry::DeliveryReport,
};

pub const DELIVERY_RECEIVED: &str = "received";
pub const DELIVERY_SENT: &str = "sent";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignRecord {
	pub campaign_id: Uuid,
	pub name: String,
	pub inbox_address: String,
	pub assigned_agent: Option<String>,
	pub criteria: Option<CriteriaOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadRecord {
	pub lead_id: Uuid,
	pub email: String,
	pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationRecord {
	pub conversation_id: Uuid,
	pub lead_id: Uuid,
	pub campaign_id: Uuid,
	pub handover_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
	pub message_id: Uuid,
	pub conversation_id: Uuid,
	pub role: SenderRole,
	pub content: String,
	pub subject: Option<String>,
	#[serde(with = "time::serde::rfc3339")]
	pub sent_at: OffsetDateTime,
	pub provider_message_id: Option<String>,
	pub delivery_status: String,
}
impl MessageRecord {
	pub fn to_transcript(&self) -> TranscriptMessage {
		TranscriptMessage { role: self.role, content: self.content.clone(), sent_at: self.sent_at }
	}
}

#[derive(Debug, Clone)]
pub struct NewMessage {
	pub conversation_id: Uuid,
	pub role: SenderRole,
	pub content: String,
	pub subject: Option<String>,
	pub sent_at: OffsetDateTime,
	pub provider_message_id: Option<String>,
	pub delivery_status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRecord {
	pub evaluation_id: Uuid,
	pub conversation_id: Uuid,
	/// Lead message that triggered the evaluation; `None` for manual handovers.
	pub message_id: Option<Uuid>,
	pub evaluation: HandoverEvaluation,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
	/// `false` when another evaluation already handed the conversation over.
	pub handed_over: bool,
	pub outbox_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboxRecord {
	pub outbox_id: Uuid,
	pub evaluation_id: Uuid,
	pub conversation_id: Uuid,
	pub payload: Value,
	pub status: String,
	pub attempts: Vec<i32>,
	pub last_error: Option<String>,
	#[serde(with = "time::serde::rfc3339")]
	pub available_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}

pub trait ConversationStore
where
	Self: Send + Sync,
{
	fn find_campaign_by_inbox<'a>(
		&'a self,
		inbox_address: &'a str,
	) -> BoxFuture<'a, Result<Option<CampaignRecord>>>;

	fn get_campaign<'a>(
		&'a self,
		campaign_id: Uuid,
	) -> BoxFuture<'a, Result<Option<CampaignRecord>>>;

	/// Returns `false` when the campaign does not exist.
	fn update_campaign_criteria<'a>(
		&'a self,
		campaign_id: Uuid,
		criteria: Option<&'a CriteriaOverride>,
	) -> BoxFuture<'a, Result<bool>>;

	fn upsert_lead<'a>(
		&'a self,
		email: &'a str,
		display_name: Option<&'a str>,
	) -> BoxFuture<'a, Result<LeadRecord>>;

	fn get_lead<'a>(&'a self, lead_id: Uuid) -> BoxFuture<'a, Result<Option<LeadRecord>>>;

	/// Returns the single conversation for the pair, creating it on first contact.
	fn resolve_conversation<'a>(
		&'a self,
		lead_id: Uuid,
		campaign_id: Uuid,
	) -> BoxFuture<'a, Result<ConversationRecord>>;

	fn get_conversation<'a>(
		&'a self,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<Option<ConversationRecord>>>;

	fn find_message<'a>(
		&'a self,
		provider_message_id: &'a str,
	) -> BoxFuture<'a, Result<Option<MessageRecord>>>;

	/// Returns `None` when the provider message id is already stored.
	fn insert_message<'a>(
		&'a self,
		message: &'a NewMessage,
	) -> BoxFuture<'a, Result<Option<MessageRecord>>>;

	fn list_messages<'a>(
		&'a self,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<MessageRecord>>>;

	fn update_delivery_status<'a>(
		&'a self,
		provider_message_id: &'a str,
		delivery_status: &'a str,
	) -> BoxFuture<'a, Result<u64>>;

	/// Whether an evaluation was recorded for this lead message.
	fn message_evaluated<'a>(&'a self, message_id: Uuid) -> BoxFuture<'a, Result<bool>>;

	/// Persists the evaluation. A handover also flags the conversation and enqueues `payload`,
	/// all in one transaction.
	fn record_evaluation<'a>(
		&'a self,
		record: &'a EvaluationRecord,
		payload: Option<&'a Value>,
	) -> BoxFuture<'a, Result<RecordOutcome>>;

	fn claim_notification<'a>(
		&'a self,
		now: OffsetDateTime,
		lease_seconds: i64,
	) -> BoxFuture<'a, Result<Option<OutboxRecord>>>;

	fn complete_notification<'a>(
		&'a self,
		outbox_id: Uuid,
		report: &'a DeliveryReport,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;

	fn list_failed_notifications<'a>(
		&'a self,
		limit: i64,
	) -> BoxFuture<'a, Result<Vec<OutboxRecord>>>;

	/// Moves a `FAILED` notification back to `PENDING`. Returns `false` if none matched.
	fn requeue_notification<'a>(
		&'a self,
		outbox_id: Uuid,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>>;
}
