use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Lead {
	pub lead_id: Uuid,
	pub email: String,
	pub display_name: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Campaign {
	pub campaign_id: Uuid,
	pub name: String,
	pub inbox_address: String,
	pub assigned_agent: Option<String>,
	pub handover_criteria: Option<Value>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Conversation {
	pub conversation_id: Uuid,
	pub lead_id: Uuid,
	pub campaign_id: Uuid,
	pub handover_completed: bool,
	pub handed_over_at: Option<OffsetDateTime>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Message {
	pub message_id: Uuid,
	pub conversation_id: Uuid,
	pub role: String,
	pub content: String,
	pub subject: Option<String>,
	pub sent_at: OffsetDateTime,
	pub provider_message_id: Option<String>,
	pub delivery_status: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
	pub conversation_id: Uuid,
	pub role: &'a str,
	pub content: &'a str,
	pub subject: Option<&'a str>,
	pub sent_at: OffsetDateTime,
	pub provider_message_id: Option<&'a str>,
	pub delivery_status: &'a str,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HandoverEvaluation {
	pub evaluation_id: Uuid,
	pub conversation_id: Uuid,
	/// Lead message whose arrival triggered the evaluation. `None` for manual requests.
	pub message_id: Option<Uuid>,
	pub should_handover: bool,
	pub score: i16,
	pub triggered_criteria: Value,
	pub detected_intents: Value,
	pub urgency: String,
	pub reason: Option<String>,
	pub recommended_agent: Option<String>,
	pub sales_brief: Option<Value>,
	pub classifier_used: bool,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationOutboxEntry {
	pub outbox_id: Uuid,
	pub evaluation_id: Uuid,
	pub conversation_id: Uuid,
	pub payload: Value,
	pub status: String,
	pub attempts: Value,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
