//! In-process [`ConversationStore`] with the same uniqueness and outbox rules as PostgreSQL.
//!
//! Used by tests and local runs that do not need durability.

use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	BoxFuture, Result,
	store::{
		CampaignRecord, ConversationRecord, ConversationStore, EvaluationRecord, LeadRecord,
		MessageRecord, NewMessage, OutboxRecord, RecordOutcome,
	},
};
use handover_domain::{decision::CriteriaOverride, retry::DeliveryReport};
use handover_storage::outbox::{STATUS_CLAIMED, STATUS_DONE, STATUS_FAILED, STATUS_PENDING};

#[derive(Default)]
struct State {
	campaigns: Vec<CampaignRecord>,
	leads: Vec<LeadRecord>,
	conversations: Vec<ConversationRecord>,
	messages: Vec<MessageRecord>,
	evaluations: Vec<EvaluationRecord>,
	outbox: Vec<OutboxRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
	state: Mutex<State>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_campaign(
		&self,
		name: &str,
		inbox_address: &str,
		assigned_agent: Option<&str>,
	) -> CampaignRecord {
		let campaign = CampaignRecord {
			campaign_id: Uuid::new_v4(),
			name: name.to_string(),
			inbox_address: inbox_address.to_lowercase(),
			assigned_agent: assigned_agent.map(str::to_string),
			criteria: None,
		};

		self.state().campaigns.push(campaign.clone());

		campaign
	}

	pub fn evaluations(&self) -> Vec<EvaluationRecord> {
		self.state().evaluations.clone()
	}

	pub fn notifications(&self) -> Vec<OutboxRecord> {
		self.state().outbox.clone()
	}

	pub fn messages(&self) -> Vec<MessageRecord> {
		self.state().messages.clone()
	}

	pub fn conversations(&self) -> Vec<ConversationRecord> {
		self.state().conversations.clone()
	}

	fn state(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}
}

impl ConversationStore for MemoryStore {
	fn find_campaign_by_inbox<'a>(
		&'a self,
		inbox_address: &'a str,
	) -> BoxFuture<'a, Result<Option<CampaignRecord>>> {
		let found = self
			.state()
			.campaigns
			.iter()
			.find(|campaign| campaign.inbox_address == inbox_address)
			.cloned();

		Box::pin(async move { Ok(found) })
	}

	fn get_campaign<'a>(
		&'a self,
		campaign_id: Uuid,
	) -> BoxFuture<'a, Result<Option<CampaignRecord>>> {
		let found = self
			.state()
			.campaigns
			.iter()
			.find(|campaign| campaign.campaign_id == campaign_id)
			.cloned();

		Box::pin(async move { Ok(found) })
	}

	fn update_campaign_criteria<'a>(
		&'a self,
		campaign_id: Uuid,
		criteria: Option<&'a CriteriaOverride>,
	) -> BoxFuture<'a, Result<bool>> {
		let mut state = self.state();
		let updated = match state
			.campaigns
			.iter_mut()
			.find(|campaign| campaign.campaign_id == campaign_id)
		{
			Some(campaign) => {
				campaign.criteria = criteria.cloned();

				true
			},
			None => false,
		};

		Box::pin(async move { Ok(updated) })
	}

	fn upsert_lead<'a>(
		&'a self,
		email: &'a str,
		display_name: Option<&'a str>,
	) -> BoxFuture<'a, Result<LeadRecord>> {
		let mut state = self.state();
		let lead = match state.leads.iter_mut().find(|lead| lead.email == email) {
			Some(lead) => {
				if let Some(name) = display_name {
					lead.display_name = Some(name.to_string());
				}

				lead.clone()
			},
			None => {
				let lead = LeadRecord {
					lead_id: Uuid::new_v4(),
					email: email.to_string(),
					display_name: display_name.map(str::to_string),
				};

				state.leads.push(lead.clone());

				lead
			},
		};

		Box::pin(async move { Ok(lead) })
	}

	fn get_lead<'a>(&'a self, lead_id: Uuid) -> BoxFuture<'a, Result<Option<LeadRecord>>> {
		let found = self.state().leads.iter().find(|lead| lead.lead_id == lead_id).cloned();

		Box::pin(async move { Ok(found) })
	}

	fn resolve_conversation<'a>(
		&'a self,
		lead_id: Uuid,
		campaign_id: Uuid,
	) -> BoxFuture<'a, Result<ConversationRecord>> {
		let mut state = self.state();
		let existing = state
			.conversations
			.iter()
			.find(|conversation| {
				conversation.lead_id == lead_id && conversation.campaign_id == campaign_id
			})
			.cloned();
		let conversation = match existing {
			Some(conversation) => conversation,
			None => {
				let conversation = ConversationRecord {
					conversation_id: Uuid::new_v4(),
					lead_id,
					campaign_id,
					handover_completed: false,
				};

				state.conversations.push(conversation.clone());

				conversation
			},
		};

		Box::pin(async move { Ok(conversation) })
	}

	fn get_conversation<'a>(
		&'a self,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<Option<ConversationRecord>>> {
		let found = self
			.state()
			.conversations
			.iter()
			.find(|conversation| conversation.conversation_id == conversation_id)
			.cloned();

		Box::pin(async move { Ok(found) })
	}

	fn find_message<'a>(
		&'a self,
		provider_message_id: &'a str,
	) -> BoxFuture<'a, Result<Option<MessageRecord>>> {
		let found = self
			.state()
			.messages
			.iter()
			.find(|message| message.provider_message_id.as_deref() == Some(provider_message_id))
			.cloned();

		Box::pin(async move { Ok(found) })
	}

	fn insert_message<'a>(
		&'a self,
		message: &'a NewMessage,
	) -> BoxFuture<'a, Result<Option<MessageRecord>>> {
		let mut state = self.state();
		let taken = message.provider_message_id.as_deref().is_some_and(|id| {
			state.messages.iter().any(|existing| existing.provider_message_id.as_deref() == Some(id))
		});
		let inserted = if taken {
			None
		} else {
			let record = MessageRecord {
				message_id: Uuid::new_v4(),
				conversation_id: message.conversation_id,
				role: message.role,
				content: message.content.clone(),
				subject: message.subject.clone(),
				sent_at: message.sent_at,
				provider_message_id: message.provider_message_id.clone(),
				delivery_status: message.delivery_status.clone(),
			};

			state.messages.push(record.clone());

			Some(record)
		};

		Box::pin(async move { Ok(inserted) })
	}

	fn list_messages<'a>(
		&'a self,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<MessageRecord>>> {
		let mut messages: Vec<MessageRecord> = self
			.state()
			.messages
			.iter()
			.filter(|message| message.conversation_id == conversation_id)
			.cloned()
			.collect();

		// Stable sort keeps insertion order for equal timestamps.
		messages.sort_by_key(|message| message.sent_at);

		Box::pin(async move { Ok(messages) })
	}

	fn update_delivery_status<'a>(
		&'a self,
		provider_message_id: &'a str,
		delivery_status: &'a str,
	) -> BoxFuture<'a, Result<u64>> {
		let mut updated = 0;

		for message in self.state().messages.iter_mut() {
			if message.provider_message_id.as_deref() == Some(provider_message_id) {
				message.delivery_status = delivery_status.to_string();
				updated += 1;
			}
		}

		Box::pin(async move { Ok(updated) })
	}

	fn message_evaluated<'a>(&'a self, message_id: Uuid) -> BoxFuture<'a, Result<bool>> {
		let evaluated =
			self.state().evaluations.iter().any(|record| record.message_id == Some(message_id));

		Box::pin(async move { Ok(evaluated) })
	}

	fn record_evaluation<'a>(
		&'a self,
		record: &'a EvaluationRecord,
		payload: Option<&'a Value>,
	) -> BoxFuture<'a, Result<RecordOutcome>> {
		let mut state = self.state();
		let mut outcome = RecordOutcome { handed_over: false, outbox_id: None };

		state.evaluations.push(record.clone());

		if record.evaluation.should_handover {
			if let Some(conversation) = state.conversations.iter_mut().find(|conversation| {
				conversation.conversation_id == record.conversation_id
					&& !conversation.handover_completed
			}) {
				conversation.handover_completed = true;
				outcome.handed_over = true;
			}

			if outcome.handed_over
				&& let Some(payload) = payload
			{
				let outbox_id = Uuid::new_v4();

				state.outbox.push(OutboxRecord {
					outbox_id,
					evaluation_id: record.evaluation_id,
					conversation_id: record.conversation_id,
					payload: payload.clone(),
					status: STATUS_PENDING.to_string(),
					attempts: Vec::new(),
					last_error: None,
					available_at: record.created_at,
					updated_at: record.created_at,
				});

				outcome.outbox_id = Some(outbox_id);
			}
		}

		Box::pin(async move { Ok(outcome) })
	}

	fn claim_notification<'a>(
		&'a self,
		now: OffsetDateTime,
		lease_seconds: i64,
	) -> BoxFuture<'a, Result<Option<OutboxRecord>>> {
		let mut state = self.state();
		let claimed = state
			.outbox
			.iter_mut()
			.filter(|entry| {
				(entry.status == STATUS_PENDING || entry.status == STATUS_CLAIMED)
					&& entry.available_at <= now
			})
			.min_by_key(|entry| entry.available_at)
			.map(|entry| {
				entry.status = STATUS_CLAIMED.to_string();
				entry.available_at = now + time::Duration::seconds(lease_seconds);
				entry.updated_at = now;

				entry.clone()
			});

		Box::pin(async move { Ok(claimed) })
	}

	fn complete_notification<'a>(
		&'a self,
		outbox_id: Uuid,
		report: &'a DeliveryReport,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		if let Some(entry) = self.state().outbox.iter_mut().find(|entry| entry.outbox_id == outbox_id)
		{
			entry.attempts = report.attempts.clone();
			entry.updated_at = now;

			if report.delivered {
				entry.status = STATUS_DONE.to_string();
				entry.last_error = None;
			} else {
				entry.status = STATUS_FAILED.to_string();
				entry.last_error =
					Some(report.error.clone().unwrap_or_else(|| "Delivery failed.".to_string()));
			}
		}

		Box::pin(async move { Ok(()) })
	}

	fn list_failed_notifications<'a>(
		&'a self,
		limit: i64,
	) -> BoxFuture<'a, Result<Vec<OutboxRecord>>> {
		let mut failed: Vec<OutboxRecord> = self
			.state()
			.outbox
			.iter()
			.filter(|entry| entry.status == STATUS_FAILED)
			.cloned()
			.collect();

		failed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
		failed.truncate(usize::try_from(limit).unwrap_or(0));

		Box::pin(async move { Ok(failed) })
	}

	fn requeue_notification<'a>(
		&'a self,
		outbox_id: Uuid,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>> {
		let requeued = match self
			.state()
			.outbox
			.iter_mut()
			.find(|entry| entry.outbox_id == outbox_id && entry.status == STATUS_FAILED)
		{
			Some(entry) => {
				entry.status = STATUS_PENDING.to_string();
				entry.available_at = now;
				entry.updated_at = now;

				true
			},
			None => false,
		};

		Box::pin(async move { Ok(requeued) })
	}
}
