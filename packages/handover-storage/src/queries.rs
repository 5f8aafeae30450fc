use serde_json::Value;
use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, Result,
	models::{Campaign, Conversation, HandoverEvaluation, Lead, Message, NewMessage},
};

const CAMPAIGN_COLUMNS: &str = "\
campaign_id, name, inbox_address, assigned_agent, handover_criteria, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "\
message_id,
\tconversation_id,
\trole,
\tcontent,
\tsubject,
\tsent_at,
\tprovider_message_id,
\tdelivery_status,
\tcreated_at,
\tupdated_at";

pub async fn insert_campaign<'e, E>(
	executor: E,
	name: &str,
	inbox_address: &str,
	assigned_agent: Option<&str>,
) -> Result<Campaign>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
INSERT INTO campaigns (campaign_id, name, inbox_address, assigned_agent)
VALUES ($1, $2, $3, $4)
RETURNING {CAMPAIGN_COLUMNS}"
	);
	let campaign = sqlx::query_as::<_, Campaign>(&sql)
		.bind(Uuid::new_v4())
		.bind(name)
		.bind(inbox_address)
		.bind(assigned_agent)
		.fetch_one(executor)
		.await
		.map_err(|err| match err {
			sqlx::Error::Database(db_err) if db_err.is_unique_violation() =>
				Error::Conflict(format!("Inbox {inbox_address} already belongs to a campaign.")),
			err => Error::Sqlx(err),
		})?;

	Ok(campaign)
}

pub async fn find_campaign_by_inbox<'e, E>(executor: E, inbox_address: &str) -> Result<Option<Campaign>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE inbox_address = $1");
	let campaign =
		sqlx::query_as::<_, Campaign>(&sql).bind(inbox_address).fetch_optional(executor).await?;

	Ok(campaign)
}

pub async fn get_campaign<'e, E>(executor: E, campaign_id: Uuid) -> Result<Option<Campaign>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE campaign_id = $1");
	let campaign =
		sqlx::query_as::<_, Campaign>(&sql).bind(campaign_id).fetch_optional(executor).await?;

	Ok(campaign)
}

/// Replaces the campaign's criteria override. Returns `false` when the campaign does not exist.
pub async fn update_campaign_criteria<'e, E>(
	executor: E,
	campaign_id: Uuid,
	criteria: Option<&Value>,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"UPDATE campaigns SET handover_criteria = $1, updated_at = $2 WHERE campaign_id = $3",
	)
	.bind(criteria)
	.bind(now)
	.bind(campaign_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Inserts the lead or returns the existing row. A known display name is never cleared.
pub async fn upsert_lead<'e, E>(executor: E, email: &str, display_name: Option<&str>) -> Result<Lead>
where
	E: PgExecutor<'e>,
{
	let lead = sqlx::query_as::<_, Lead>(
		"\
INSERT INTO leads (lead_id, email, display_name)
VALUES ($1, $2, $3)
ON CONFLICT (email) DO UPDATE
SET display_name = COALESCE(EXCLUDED.display_name, leads.display_name),
\tupdated_at = now()
RETURNING lead_id, email, display_name, created_at, updated_at",
	)
	.bind(Uuid::new_v4())
	.bind(email)
	.bind(display_name)
	.fetch_one(executor)
	.await?;

	Ok(lead)
}

pub async fn get_lead<'e, E>(executor: E, lead_id: Uuid) -> Result<Option<Lead>>
where
	E: PgExecutor<'e>,
{
	let lead = sqlx::query_as::<_, Lead>(
		"SELECT lead_id, email, display_name, created_at, updated_at FROM leads WHERE lead_id = $1",
	)
	.bind(lead_id)
	.fetch_optional(executor)
	.await?;

	Ok(lead)
}

/// Returns the single conversation for the (lead, campaign) pair, creating it when absent.
pub async fn upsert_conversation<'e, E>(
	executor: E,
	lead_id: Uuid,
	campaign_id: Uuid,
) -> Result<Conversation>
where
	E: PgExecutor<'e>,
{
	let conversation = sqlx::query_as::<_, Conversation>(
		"\
INSERT INTO conversations (conversation_id, lead_id, campaign_id)
VALUES ($1, $2, $3)
ON CONFLICT (lead_id, campaign_id) DO UPDATE
SET updated_at = conversations.updated_at
RETURNING
\tconversation_id,
\tlead_id,
\tcampaign_id,
\thandover_completed,
\thanded_over_at,
\tcreated_at,
\tupdated_at",
	)
	.bind(Uuid::new_v4())
	.bind(lead_id)
	.bind(campaign_id)
	.fetch_one(executor)
	.await?;

	Ok(conversation)
}

pub async fn get_conversation<'e, E>(executor: E, conversation_id: Uuid) -> Result<Option<Conversation>>
where
	E: PgExecutor<'e>,
{
	let conversation = sqlx::query_as::<_, Conversation>(
		"\
SELECT
\tconversation_id,
\tlead_id,
\tcampaign_id,
\thandover_completed,
\thanded_over_at,
\tcreated_at,
\tupdated_at
FROM conversations
WHERE conversation_id = $1",
	)
	.bind(conversation_id)
	.fetch_optional(executor)
	.await?;

	Ok(conversation)
}

/// Flags the conversation as handed over. Returns `false` if it already was.
pub async fn mark_handed_over<'e, E>(
	executor: E,
	conversation_id: Uuid,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE conversations
SET handover_completed = true,
\thanded_over_at = $1,
\tupdated_at = $1
WHERE conversation_id = $2 AND handover_completed = false",
	)
	.bind(now)
	.bind(conversation_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn find_message_by_provider_id<'e, E>(
	executor: E,
	provider_message_id: &str,
) -> Result<Option<Message>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE provider_message_id = $1");
	let message =
		sqlx::query_as::<_, Message>(&sql).bind(provider_message_id).fetch_optional(executor).await?;

	Ok(message)
}

/// Inserts a message. Returns `None` when another row already holds the provider message id.
pub async fn insert_message<'e, E>(executor: E, message: &NewMessage<'_>) -> Result<Option<Message>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
INSERT INTO messages (
\tmessage_id,
\tconversation_id,
\trole,
\tcontent,
\tsubject,
\tsent_at,
\tprovider_message_id,
\tdelivery_status
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (provider_message_id) WHERE provider_message_id IS NOT NULL DO NOTHING
RETURNING {MESSAGE_COLUMNS}"
	);
	let inserted = sqlx::query_as::<_, Message>(&sql)
		.bind(Uuid::new_v4())
		.bind(message.conversation_id)
		.bind(message.role)
		.bind(message.content)
		.bind(message.subject)
		.bind(message.sent_at)
		.bind(message.provider_message_id)
		.bind(message.delivery_status)
		.fetch_optional(executor)
		.await?;

	Ok(inserted)
}

pub async fn list_messages<'e, E>(executor: E, conversation_id: Uuid) -> Result<Vec<Message>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT {MESSAGE_COLUMNS}
FROM messages
WHERE conversation_id = $1
ORDER BY sent_at ASC, created_at ASC"
	);
	let messages =
		sqlx::query_as::<_, Message>(&sql).bind(conversation_id).fetch_all(executor).await?;

	Ok(messages)
}

/// Returns the number of messages updated (zero or one).
pub async fn update_delivery_status<'e, E>(
	executor: E,
	provider_message_id: &str,
	delivery_status: &str,
	now: OffsetDateTime,
) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE messages
SET delivery_status = $1, updated_at = $2
WHERE provider_message_id = $3",
	)
	.bind(delivery_status)
	.bind(now)
	.bind(provider_message_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

pub async fn insert_evaluation<'e, E>(executor: E, evaluation: &HandoverEvaluation) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO handover_evaluations (
\tevaluation_id,
\tconversation_id,
\tmessage_id,
\tshould_handover,
\tscore,
\ttriggered_criteria,
\tdetected_intents,
\turgency,
\treason,
\trecommended_agent,
\tsales_brief,
\tclassifier_used,
\tcreated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
	)
	.bind(evaluation.evaluation_id)
	.bind(evaluation.conversation_id)
	.bind(evaluation.message_id)
	.bind(evaluation.should_handover)
	.bind(evaluation.score)
	.bind(&evaluation.triggered_criteria)
	.bind(&evaluation.detected_intents)
	.bind(evaluation.urgency.as_str())
	.bind(evaluation.reason.as_deref())
	.bind(evaluation.recommended_agent.as_deref())
	.bind(evaluation.sales_brief.as_ref())
	.bind(evaluation.classifier_used)
	.bind(evaluation.created_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn list_evaluations<'e, E>(
	executor: E,
	conversation_id: Uuid,
) -> Result<Vec<HandoverEvaluation>>
where
	E: PgExecutor<'e>,
{
	let evaluations = sqlx::query_as::<_, HandoverEvaluation>(
		"\
SELECT
\tevaluation_id,
\tconversation_id,
\tmessage_id,
\tshould_handover,
\tscore,
\ttriggered_criteria,
\tdetected_intents,
\turgency,
\treason,
\trecommended_agent,
\tsales_brief,
\tclassifier_used,
\tcreated_at
FROM handover_evaluations
WHERE conversation_id = $1
ORDER BY created_at ASC",
	)
	.bind(conversation_id)
	.fetch_all(executor)
	.await?;

	Ok(evaluations)
}

pub async fn message_has_evaluation<'e, E>(executor: E, message_id: Uuid) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let exists: bool = sqlx::query_scalar(
		"SELECT EXISTS (SELECT 1 FROM handover_evaluations WHERE message_id = $1)",
	)
	.bind(message_id)
	.fetch_one(executor)
	.await?;

	Ok(exists)
}
