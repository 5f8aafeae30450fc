use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, HandoverService, Result, classify,
	correlate::{self, Envelope},
	notify,
	store::{
		CampaignRecord, ConversationRecord, DELIVERY_RECEIVED, DELIVERY_SENT, EvaluationRecord,
		LeadRecord, RecordOutcome,
	},
};
use handover_domain::{
	conversation::{self, ConversationState, SenderRole, TranscriptMessage},
	decision::{self, EvaluationInput, HandoverEvaluation},
	signature,
};

/// Mail provider inbound webhook, form-encoded.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEmail {
	pub sender: String,
	pub recipient: String,
	#[serde(default)]
	pub subject: Option<String>,
	#[serde(rename = "stripped-text", alias = "body-plain", default)]
	pub body: String,
	pub timestamp: String,
	pub token: String,
	#[serde(default)]
	pub signature: Option<String>,
	#[serde(rename = "Message-Id", alias = "message-id", default)]
	pub message_id: Option<String>,
	#[serde(default)]
	pub from: Option<String>,
}

/// An ai or human turn sent by the mail collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct OutboundMessage {
	pub lead_email: String,
	pub inbox_address: String,
	pub role: SenderRole,
	pub content: String,
	#[serde(default)]
	pub subject: Option<String>,
	#[serde(default)]
	pub provider_message_id: Option<String>,
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub sent_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManualHandoverRequest {
	#[serde(default)]
	pub requested_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
	/// The provider message id was already stored.
	Duplicate,
	/// Stored without evaluation.
	Stored,
	Evaluated,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
	pub status: IngestStatus,
	pub conversation_id: Uuid,
	pub lead_id: Uuid,
	pub campaign_id: Uuid,
	pub message_id: Option<Uuid>,
	pub evaluation_id: Option<Uuid>,
	pub evaluation: Option<HandoverEvaluation>,
	pub outbox_id: Option<Uuid>,
}
impl IngestOutcome {
	fn stored(status: IngestStatus, conversation: &ConversationRecord, message_id: Uuid) -> Self {
		Self {
			status,
			conversation_id: conversation.conversation_id,
			lead_id: conversation.lead_id,
			campaign_id: conversation.campaign_id,
			message_id: Some(message_id),
			evaluation_id: None,
			evaluation: None,
			outbox_id: None,
		}
	}

	fn evaluated(
		conversation: &ConversationRecord,
		message_id: Option<Uuid>,
		record: EvaluationRecord,
		outcome: RecordOutcome,
	) -> Self {
		Self {
			status: IngestStatus::Evaluated,
			conversation_id: conversation.conversation_id,
			lead_id: conversation.lead_id,
			campaign_id: conversation.campaign_id,
			message_id,
			evaluation_id: Some(record.evaluation_id),
			evaluation: Some(record.evaluation),
			outbox_id: outcome.outbox_id,
		}
	}
}

struct EvaluationRun<'a> {
	campaign: &'a CampaignRecord,
	lead: &'a LeadRecord,
	conversation: &'a ConversationRecord,
	message_id: Option<Uuid>,
	manual: bool,
	now: OffsetDateTime,
}

impl HandoverService {
	/// Verifies, correlates, and evaluates one inbound lead email.
	pub async fn ingest_inbound(&self, email: InboundEmail) -> Result<IngestOutcome> {
		let now = OffsetDateTime::now_utc();

		self.authenticate(&email.timestamp, &email.token, email.signature.as_deref(), now)?;

		let lead_email = conversation::normalize_email(&email.sender).ok_or_else(|| {
			Error::InvalidRequest { message: "sender must be an email address.".to_string() }
		})?;
		let inbox = conversation::normalize_email(&email.recipient).ok_or_else(|| {
			Error::InvalidRequest { message: "recipient must be an email address.".to_string() }
		})?;
		let lead_name = email
			.from
			.as_deref()
			.and_then(conversation::display_name)
			.or_else(|| conversation::display_name(&email.sender));
		let content = inbound_content(&email).ok_or_else(|| Error::InvalidRequest {
			message: "Email body must be non-empty.".to_string(),
		})?;
		let campaign = self
			.store
			.find_campaign_by_inbox(&inbox)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("No campaign for {inbox}.") })?;
		let provider_message_id =
			email.message_id.as_deref().and_then(correlate::normalize_message_id);
		let sent_at = parse_unix_seconds(&email.timestamp).unwrap_or(now);
		let _guard = self.locks.lock(&conversation::correlation_key(&lead_email, &inbox)).await;
		let correlated = correlate::append(
			self.store.as_ref(),
			self.insert_mode,
			Envelope {
				campaign: &campaign,
				lead_email: &lead_email,
				lead_name: lead_name.as_deref(),
				role: SenderRole::Lead,
				content,
				subject: email.subject.as_deref().map(str::trim).filter(|s| !s.is_empty()),
				sent_at,
				provider_message_id: provider_message_id.as_deref(),
				delivery_status: DELIVERY_RECEIVED,
			},
		)
		.await?;
		let message_id = correlated.message.message_id;
		let state = ConversationState::from_handover_completed(
			correlated.conversation.handover_completed,
		);

		// A replay is a no-op unless the first delivery failed before its evaluation was stored.
		if correlated.duplicate {
			if state.is_terminal() || self.store.message_evaluated(message_id).await? {
				return Ok(IngestOutcome::stored(
					IngestStatus::Duplicate,
					&correlated.conversation,
					message_id,
				));
			}

			tracing::warn!(
				conversation_id = %correlated.conversation.conversation_id,
				%message_id,
				"Replayed message was never evaluated. Evaluating now."
			);
		}
		if state.is_terminal() {
			tracing::info!(
				conversation_id = %correlated.conversation.conversation_id,
				"Message stored on a handed-over conversation."
			);

			return Ok(IngestOutcome::stored(
				IngestStatus::Stored,
				&correlated.conversation,
				message_id,
			));
		}

		let (record, outcome) = self
			.run_evaluation(EvaluationRun {
				campaign: &campaign,
				lead: &correlated.lead,
				conversation: &correlated.conversation,
				message_id: Some(message_id),
				manual: false,
				now,
			})
			.await?;

		Ok(IngestOutcome::evaluated(&correlated.conversation, Some(message_id), record, outcome))
	}

	/// Records an ai or human turn. Outbound turns never trigger an evaluation.
	pub async fn record_outbound(&self, message: OutboundMessage) -> Result<IngestOutcome> {
		if message.role == SenderRole::Lead {
			return Err(Error::InvalidRequest {
				message: "Outbound role must be ai or human.".to_string(),
			});
		}

		let lead_email = conversation::normalize_email(&message.lead_email).ok_or_else(|| {
			Error::InvalidRequest { message: "lead_email must be an email address.".to_string() }
		})?;
		let inbox = conversation::normalize_email(&message.inbox_address).ok_or_else(|| {
			Error::InvalidRequest {
				message: "inbox_address must be an email address.".to_string(),
			}
		})?;
		let content = message.content.trim();

		if content.is_empty() {
			return Err(Error::InvalidRequest { message: "content must be non-empty.".to_string() });
		}

		let campaign = self
			.store
			.find_campaign_by_inbox(&inbox)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("No campaign for {inbox}.") })?;
		let provider_message_id =
			message.provider_message_id.as_deref().and_then(correlate::normalize_message_id);
		let _guard = self.locks.lock(&conversation::correlation_key(&lead_email, &inbox)).await;
		let correlated = correlate::append(
			self.store.as_ref(),
			self.insert_mode,
			Envelope {
				campaign: &campaign,
				lead_email: &lead_email,
				lead_name: None,
				role: message.role,
				content,
				subject: message.subject.as_deref(),
				sent_at: message.sent_at.unwrap_or_else(OffsetDateTime::now_utc),
				provider_message_id: provider_message_id.as_deref(),
				delivery_status: DELIVERY_SENT,
			},
		)
		.await?;
		let status =
			if correlated.duplicate { IngestStatus::Duplicate } else { IngestStatus::Stored };

		Ok(IngestOutcome::stored(status, &correlated.conversation, correlated.message.message_id))
	}

	/// Operator-requested handover. The classifier is skipped.
	pub async fn manual_handover(
		&self,
		conversation_id: Uuid,
		request: ManualHandoverRequest,
	) -> Result<IngestOutcome> {
		let conversation = self.require_conversation(conversation_id).await?;
		let lead = self
			.store
			.get_lead(conversation.lead_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Lead {}.", conversation.lead_id) })?;
		let campaign = self.store.get_campaign(conversation.campaign_id).await?.ok_or_else(|| {
			Error::NotFound { message: format!("Campaign {}.", conversation.campaign_id) }
		})?;
		let _guard = self
			.locks
			.lock(&conversation::correlation_key(&lead.email, &campaign.inbox_address))
			.await;
		// Re-read under the lock; an inbound evaluation may have finished meanwhile.
		let conversation = self.require_conversation(conversation_id).await?;

		if conversation.handover_completed {
			return Err(Error::Conflict {
				message: format!("Conversation {conversation_id} is already handed over."),
			});
		}

		tracing::info!(
			%conversation_id,
			requested_by = request.requested_by.as_deref().unwrap_or("unknown"),
			"Manual handover requested."
		);

		let (record, outcome) = self
			.run_evaluation(EvaluationRun {
				campaign: &campaign,
				lead: &lead,
				conversation: &conversation,
				message_id: None,
				manual: true,
				now: OffsetDateTime::now_utc(),
			})
			.await?;

		Ok(IngestOutcome::evaluated(&conversation, None, record, outcome))
	}

	pub(crate) fn authenticate(
		&self,
		timestamp: &str,
		token: &str,
		provided: Option<&str>,
		now: OffsetDateTime,
	) -> Result<()> {
		let signing_key = self.cfg.inbound.signing_key.as_deref();
		let checked = signature::verify_inbound(signing_key, timestamp, token, provided).and_then(
			|()| match signing_key {
				Some(_) => signature::check_freshness(
					timestamp,
					now,
					self.cfg.inbound.max_timestamp_skew_seconds,
				),
				None => Ok(()),
			},
		);

		if let Err(err) = checked {
			tracing::warn!(error = %err, "Rejected webhook with an invalid signature.");

			return Err(err.into());
		}

		Ok(())
	}

	async fn require_conversation(&self, conversation_id: Uuid) -> Result<ConversationRecord> {
		self.store.get_conversation(conversation_id).await?.ok_or_else(|| Error::NotFound {
			message: format!("Conversation {conversation_id}."),
		})
	}

	async fn run_evaluation(
		&self,
		run: EvaluationRun<'_>,
	) -> Result<(EvaluationRecord, RecordOutcome)> {
		let conversation_id = run.conversation.conversation_id;
		let state =
			ConversationState::from_handover_completed(run.conversation.handover_completed)
				.begin_evaluation()?;
		let transcript: Vec<TranscriptMessage> = self
			.store
			.list_messages(conversation_id)
			.await?
			.iter()
			.map(|message| message.to_transcript())
			.collect();
		let criteria = self.effective_criteria(run.campaign);
		let verdict = if run.manual || conversation::lead_turns(&transcript).next().is_none() {
			None
		} else {
			let system = classify::system_prompt(&self.cfg.handover.persona, &criteria);

			classify::classify_or_fallback(
				&self.providers,
				&self.cfg.providers.llm_classifier,
				classify::build_messages(system, &transcript),
			)
			.await
		};
		let evaluation = decision::evaluate(&criteria, &EvaluationInput {
			lead_id: run.lead.lead_id,
			campaign_id: run.campaign.campaign_id,
			lead_name: run.lead.display_name.as_deref(),
			campaign_name: Some(&run.campaign.name),
			transcript: &transcript,
			verdict: verdict.as_ref(),
			manual: run.manual,
			recommended_agent: run.campaign.assigned_agent.as_deref(),
			now: run.now,
		});
		let record = EvaluationRecord {
			evaluation_id: Uuid::new_v4(),
			conversation_id,
			message_id: run.message_id,
			evaluation,
			created_at: run.now,
		};
		let payload = if record.evaluation.should_handover {
			Some(notify::handover_payload(&record, run.lead, run.campaign)?)
		} else {
			None
		};
		let outcome = self.store.record_evaluation(&record, payload.as_ref()).await?;
		let state = state.finish_evaluation(outcome.handed_over)?;

		if record.evaluation.should_handover && !outcome.handed_over {
			tracing::warn!(%conversation_id, "Conversation was handed over concurrently.");
		}

		tracing::info!(
			%conversation_id,
			evaluation_id = %record.evaluation_id,
			score = record.evaluation.score,
			should_handover = record.evaluation.should_handover,
			reason = record.evaluation.reason.map(|reason| reason.as_str()).unwrap_or("none"),
			classifier_used = record.evaluation.classifier_used,
			state = ?state,
			"Conversation evaluated."
		);

		Ok((record, outcome))
	}
}

fn inbound_content(email: &InboundEmail) -> Option<&str> {
	let body = email.body.trim();

	if !body.is_empty() {
		return Some(body);
	}

	email.subject.as_deref().map(str::trim).filter(|subject| !subject.is_empty())
}

fn parse_unix_seconds(raw: &str) -> Option<OffsetDateTime> {
	let seconds: i64 = raw.trim().parse().ok()?;

	OffsetDateTime::from_unix_timestamp(seconds).ok()
}
