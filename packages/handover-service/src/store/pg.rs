use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	BoxFuture, Error, Result,
	store::{
		CampaignRecord, ConversationRecord, ConversationStore, EvaluationRecord, LeadRecord,
		MessageRecord, NewMessage, OutboxRecord, RecordOutcome,
	},
};
use handover_domain::{
	conversation::SenderRole,
	decision::{CriteriaOverride, HandoverEvaluation},
	retry::DeliveryReport,
};
use handover_storage::{db::Db, models, outbox, queries};

pub struct PgStore {
	db: Db,
}
impl PgStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}

	async fn record_evaluation_tx(
		&self,
		record: &EvaluationRecord,
		payload: Option<&Value>,
	) -> Result<RecordOutcome> {
		let row = evaluation_row(record)?;
		let mut tx = self.db.pool.begin().await?;

		queries::insert_evaluation(&mut *tx, &row).await?;

		let mut outcome = RecordOutcome { handed_over: false, outbox_id: None };

		if record.evaluation.should_handover {
			outcome.handed_over =
				queries::mark_handed_over(&mut *tx, record.conversation_id, record.created_at)
					.await?;

			if outcome.handed_over
				&& let Some(payload) = payload
			{
				outcome.outbox_id = Some(
					outbox::enqueue_notification(
						&mut *tx,
						record.evaluation_id,
						record.conversation_id,
						payload,
						record.created_at,
					)
					.await?,
				);
			}
		}

		tx.commit().await?;

		Ok(outcome)
	}

	async fn complete_notification_inner(
		&self,
		outbox_id: Uuid,
		report: &DeliveryReport,
		now: OffsetDateTime,
	) -> Result<()> {
		let attempts = serde_json::to_value(&report.attempts)?;

		if report.delivered {
			outbox::mark_notification_done(&self.db, outbox_id, &attempts, now).await?;
		} else {
			let error = report.error.as_deref().unwrap_or("Delivery failed.");

			outbox::mark_notification_failed(&self.db, outbox_id, &attempts, error, now).await?;
		}

		Ok(())
	}
}

impl ConversationStore for PgStore {
	fn find_campaign_by_inbox<'a>(
		&'a self,
		inbox_address: &'a str,
	) -> BoxFuture<'a, Result<Option<CampaignRecord>>> {
		Box::pin(async move {
			queries::find_campaign_by_inbox(&self.db.pool, inbox_address)
				.await?
				.map(campaign_record)
				.transpose()
		})
	}

	fn get_campaign<'a>(
		&'a self,
		campaign_id: Uuid,
	) -> BoxFuture<'a, Result<Option<CampaignRecord>>> {
		Box::pin(async move {
			queries::get_campaign(&self.db.pool, campaign_id)
				.await?
				.map(campaign_record)
				.transpose()
		})
	}

	fn update_campaign_criteria<'a>(
		&'a self,
		campaign_id: Uuid,
		criteria: Option<&'a CriteriaOverride>,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let value = criteria.map(serde_json::to_value).transpose()?;

			Ok(queries::update_campaign_criteria(
				&self.db.pool,
				campaign_id,
				value.as_ref(),
				OffsetDateTime::now_utc(),
			)
			.await?)
		})
	}

	fn upsert_lead<'a>(
		&'a self,
		email: &'a str,
		display_name: Option<&'a str>,
	) -> BoxFuture<'a, Result<LeadRecord>> {
		Box::pin(async move {
			Ok(lead_record(queries::upsert_lead(&self.db.pool, email, display_name).await?))
		})
	}

	fn get_lead<'a>(&'a self, lead_id: Uuid) -> BoxFuture<'a, Result<Option<LeadRecord>>> {
		Box::pin(async move {
			Ok(queries::get_lead(&self.db.pool, lead_id).await?.map(lead_record))
		})
	}

	fn resolve_conversation<'a>(
		&'a self,
		lead_id: Uuid,
		campaign_id: Uuid,
	) -> BoxFuture<'a, Result<ConversationRecord>> {
		Box::pin(async move {
			let row = queries::upsert_conversation(&self.db.pool, lead_id, campaign_id).await?;

			Ok(conversation_record(row))
		})
	}

	fn get_conversation<'a>(
		&'a self,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<Option<ConversationRecord>>> {
		Box::pin(async move {
			Ok(queries::get_conversation(&self.db.pool, conversation_id)
				.await?
				.map(conversation_record))
		})
	}

	fn find_message<'a>(
		&'a self,
		provider_message_id: &'a str,
	) -> BoxFuture<'a, Result<Option<MessageRecord>>> {
		Box::pin(async move {
			queries::find_message_by_provider_id(&self.db.pool, provider_message_id)
				.await?
				.map(message_record)
				.transpose()
		})
	}

	fn insert_message<'a>(
		&'a self,
		message: &'a NewMessage,
	) -> BoxFuture<'a, Result<Option<MessageRecord>>> {
		Box::pin(async move {
			let row = models::NewMessage {
				conversation_id: message.conversation_id,
				role: message.role.as_str(),
				content: &message.content,
				subject: message.subject.as_deref(),
				sent_at: message.sent_at,
				provider_message_id: message.provider_message_id.as_deref(),
				delivery_status: &message.delivery_status,
			};

			queries::insert_message(&self.db.pool, &row).await?.map(message_record).transpose()
		})
	}

	fn list_messages<'a>(
		&'a self,
		conversation_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<MessageRecord>>> {
		Box::pin(async move {
			queries::list_messages(&self.db.pool, conversation_id)
				.await?
				.into_iter()
				.map(message_record)
				.collect::<Result<Vec<_>>>()
		})
	}

	fn update_delivery_status<'a>(
		&'a self,
		provider_message_id: &'a str,
		delivery_status: &'a str,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			Ok(queries::update_delivery_status(
				&self.db.pool,
				provider_message_id,
				delivery_status,
				OffsetDateTime::now_utc(),
			)
			.await?)
		})
	}

	fn message_evaluated<'a>(&'a self, message_id: Uuid) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			Ok(queries::message_has_evaluation(&self.db.pool, message_id).await?)
		})
	}

	fn record_evaluation<'a>(
		&'a self,
		record: &'a EvaluationRecord,
		payload: Option<&'a Value>,
	) -> BoxFuture<'a, Result<RecordOutcome>> {
		Box::pin(self.record_evaluation_tx(record, payload))
	}

	fn claim_notification<'a>(
		&'a self,
		now: OffsetDateTime,
		lease_seconds: i64,
	) -> BoxFuture<'a, Result<Option<OutboxRecord>>> {
		Box::pin(async move {
			outbox::claim_next_notification(&self.db, now, lease_seconds)
				.await?
				.map(outbox_record)
				.transpose()
		})
	}

	fn complete_notification<'a>(
		&'a self,
		outbox_id: Uuid,
		report: &'a DeliveryReport,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.complete_notification_inner(outbox_id, report, now))
	}

	fn list_failed_notifications<'a>(
		&'a self,
		limit: i64,
	) -> BoxFuture<'a, Result<Vec<OutboxRecord>>> {
		Box::pin(async move {
			outbox::list_failed_notifications(&self.db, limit)
				.await?
				.into_iter()
				.map(outbox_record)
				.collect::<Result<Vec<_>>>()
		})
	}

	fn requeue_notification<'a>(
		&'a self,
		outbox_id: Uuid,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			Ok(outbox::requeue_failed_notification(&self.db, outbox_id, now).await?)
		})
	}
}

fn campaign_record(row: models::Campaign) -> Result<CampaignRecord> {
	let criteria = match row.handover_criteria {
		Some(Value::Null) | None => None,
		Some(value) => Some(serde_json::from_value(value).map_err(|err| Error::Storage {
			message: format!("Campaign {} has invalid handover criteria: {err}", row.campaign_id),
		})?),
	};

	Ok(CampaignRecord {
		campaign_id: row.campaign_id,
		name: row.name,
		inbox_address: row.inbox_address,
		assigned_agent: row.assigned_agent,
		criteria,
	})
}

fn lead_record(row: models::Lead) -> LeadRecord {
	LeadRecord { lead_id: row.lead_id, email: row.email, display_name: row.display_name }
}

fn conversation_record(row: models::Conversation) -> ConversationRecord {
	ConversationRecord {
		conversation_id: row.conversation_id,
		lead_id: row.lead_id,
		campaign_id: row.campaign_id,
		handover_completed: row.handover_completed,
	}
}

fn message_record(row: models::Message) -> Result<MessageRecord> {
	let role = SenderRole::parse(&row.role).ok_or_else(|| Error::Storage {
		message: format!("Message {} has unknown role {:?}.", row.message_id, row.role),
	})?;

	Ok(MessageRecord {
		message_id: row.message_id,
		conversation_id: row.conversation_id,
		role,
		content: row.content,
		subject: row.subject,
		sent_at: row.sent_at,
		provider_message_id: row.provider_message_id,
		delivery_status: row.delivery_status,
	})
}

fn evaluation_row(record: &EvaluationRecord) -> Result<models::HandoverEvaluation> {
	let HandoverEvaluation {
		should_handover,
		score,
		triggered_criteria,
		detected_intents,
		urgency,
		reason,
		recommended_agent,
		sales_brief,
		classifier_used,
	} = &record.evaluation;

	Ok(models::HandoverEvaluation {
		evaluation_id: record.evaluation_id,
		conversation_id: record.conversation_id,
		message_id: record.message_id,
		should_handover: *should_handover,
		score: i16::from(*score),
		triggered_criteria: serde_json::to_value(triggered_criteria)?,
		detected_intents: serde_json::to_value(detected_intents)?,
		urgency: urgency.as_str().to_string(),
		reason: reason.map(|reason| reason.as_str().to_string()),
		recommended_agent: recommended_agent.clone(),
		sales_brief: sales_brief.as_ref().map(serde_json::to_value).transpose()?,
		classifier_used: *classifier_used,
		created_at: record.created_at,
	})
}

fn outbox_record(row: models::NotificationOutboxEntry) -> Result<OutboxRecord> {
	let attempts: Vec<i32> = serde_json::from_value(row.attempts)?;

	Ok(OutboxRecord {
		outbox_id: row.outbox_id,
		evaluation_id: row.evaluation_id,
		conversation_id: row.conversation_id,
		payload: row.payload,
		status: row.status,
		attempts,
		last_error: row.last_error,
		available_at: row.available_at,
		updated_at: row.updated_at,
	})
}
