use time::OffsetDateTime;

use crate::{
	Error, Result,
	store::{
		CampaignRecord, ConversationRecord, ConversationStore, LeadRecord, MessageRecord,
		NewMessage,
	},
};
use handover_domain::conversation::SenderRole;

/// How a replayed provider message id is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InsertMode {
	/// A replay returns the stored message.
	#[default]
	Idempotent,
	/// A replay fails with [`Error::DuplicateMessage`].
	Strict,
}

pub struct Envelope<'a> {
	pub campaign: &'a CampaignRecord,
	pub lead_email: &'a str,
	pub lead_name: Option<&'a str>,
	pub role: SenderRole,
	pub content: &'a str,
	pub subject: Option<&'a str>,
	pub sent_at: OffsetDateTime,
	pub provider_message_id: Option<&'a str>,
	pub delivery_status: &'a str,
}

#[derive(Debug, Clone)]
pub struct Correlated {
	pub lead: LeadRecord,
	pub conversation: ConversationRecord,
	pub message: MessageRecord,
	pub duplicate: bool,
}

/// Resolves lead and conversation for an envelope and appends its message exactly once.
pub async fn append(
	store: &dyn ConversationStore,
	mode: InsertMode,
	envelope: Envelope<'_>,
) -> Result<Correlated> {
	if let Some(provider_message_id) = envelope.provider_message_id
		&& let Some(existing) = store.find_message(provider_message_id).await?
	{
		return replay(store, mode, provider_message_id, existing).await;
	}

	let lead = store.upsert_lead(envelope.lead_email, envelope.lead_name).await?;
	let conversation =
		store.resolve_conversation(lead.lead_id, envelope.campaign.campaign_id).await?;
	let new_message = NewMessage {
		conversation_id: conversation.conversation_id,
		role: envelope.role,
		content: envelope.content.to_string(),
		subject: envelope.subject.map(str::to_string),
		sent_at: envelope.sent_at,
		provider_message_id: envelope.provider_message_id.map(str::to_string),
		delivery_status: envelope.delivery_status.to_string(),
	};

	match store.insert_message(&new_message).await? {
		Some(message) => Ok(Correlated { lead, conversation, message, duplicate: false }),
		None => {
			// Lost an insert race against a concurrent replay.
			let provider_message_id = envelope.provider_message_id.unwrap_or_default();
			let existing = store.find_message(provider_message_id).await?.ok_or_else(|| {
				Error::Conflict {
					message: format!("Message {provider_message_id} vanished after a conflict."),
				}
			})?;

			replay(store, mode, provider_message_id, existing).await
		},
	}
}

async fn replay(
	store: &dyn ConversationStore,
	mode: InsertMode,
	provider_message_id: &str,
	existing: MessageRecord,
) -> Result<Correlated> {
	if mode == InsertMode::Strict {
		return Err(Error::DuplicateMessage {
			provider_message_id: provider_message_id.to_string(),
		});
	}

	let conversation = store.get_conversation(existing.conversation_id).await?.ok_or_else(|| {
		Error::NotFound { message: format!("Conversation {}.", existing.conversation_id) }
	})?;
	let lead = store
		.get_lead(conversation.lead_id)
		.await?
		.ok_or_else(|| Error::NotFound { message: format!("Lead {}.", conversation.lead_id) })?;

	tracing::debug!(
		provider_message_id,
		conversation_id = %conversation.conversation_id,
		"Replayed message ignored."
	);

	Ok(Correlated { lead, conversation, message: existing, duplicate: true })
}

/// Strips angle brackets so `<id@host>` and `id@host` correlate.
pub fn normalize_message_id(raw: &str) -> Option<String> {
	let trimmed = raw.trim().trim_start_matches('<').trim_end_matches('>').trim();

	if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}
