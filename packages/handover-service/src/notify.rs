use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, HandoverService, Result,
	store::{CampaignRecord, EvaluationRecord, LeadRecord, OutboxRecord},
};
use handover_domain::{decision::HandoverEvaluation, retry::DeliveryReport};

pub const HANDOVER_EVENT: &str = "lead.handover";

const MAX_FAILED_PAGE: i64 = 200;

#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
	pub outbox_id: Uuid,
	pub evaluation_id: Uuid,
	pub conversation_id: Uuid,
	pub report: DeliveryReport,
}

#[derive(Serialize)]
struct HandoverPayload<'a> {
	event: &'static str,
	evaluation_id: Uuid,
	conversation_id: Uuid,
	lead: PayloadLead<'a>,
	campaign: PayloadCampaign<'a>,
	recommended_agent: Option<&'a str>,
	evaluation: &'a HandoverEvaluation,
	#[serde(with = "time::serde::rfc3339")]
	created_at: OffsetDateTime,
}

#[derive(Serialize)]
struct PayloadLead<'a> {
	lead_id: Uuid,
	email: &'a str,
	name: Option<&'a str>,
}

#[derive(Serialize)]
struct PayloadCampaign<'a> {
	campaign_id: Uuid,
	name: &'a str,
	inbox_address: &'a str,
}

/// Unsigned webhook body. The dispatcher signs it at delivery time.
pub fn handover_payload(
	record: &EvaluationRecord,
	lead: &LeadRecord,
	campaign: &CampaignRecord,
) -> Result<Value> {
	let payload = HandoverPayload {
		event: HANDOVER_EVENT,
		evaluation_id: record.evaluation_id,
		conversation_id: record.conversation_id,
		lead: PayloadLead {
			lead_id: lead.lead_id,
			email: &lead.email,
			name: lead.display_name.as_deref(),
		},
		campaign: PayloadCampaign {
			campaign_id: campaign.campaign_id,
			name: &campaign.name,
			inbox_address: &campaign.inbox_address,
		},
		recommended_agent: record.evaluation.recommended_agent.as_deref(),
		evaluation: &record.evaluation,
		created_at: record.created_at,
	};

	Ok(serde_json::to_value(payload)?)
}

impl HandoverService {
	/// Claims one due notification, delivers it, and records the report on the outbox row.
	pub async fn dispatch_next_notification(&self) -> Result<Option<DispatchOutcome>> {
		let now = OffsetDateTime::now_utc();
		let Some(entry) =
			self.store.claim_notification(now, self.cfg.worker.claim_lease_seconds).await?
		else {
			return Ok(None);
		};
		let report = self.providers.dispatcher.deliver(&entry.payload).await;

		self.store
			.complete_notification(entry.outbox_id, &report, OffsetDateTime::now_utc())
			.await?;

		if report.delivered {
			tracing::info!(
				outbox_id = %entry.outbox_id,
				conversation_id = %entry.conversation_id,
				attempts = report.attempts.len(),
				"Handover notification delivered."
			);
		} else {
			tracing::error!(
				outbox_id = %entry.outbox_id,
				conversation_id = %entry.conversation_id,
				attempts = ?report.attempts,
				error = report.error.as_deref().unwrap_or_default(),
				"Handover notification failed. Operator re-trigger required."
			);
		}

		Ok(Some(DispatchOutcome {
			outbox_id: entry.outbox_id,
			evaluation_id: entry.evaluation_id,
			conversation_id: entry.conversation_id,
			report,
		}))
	}

	pub async fn list_failed_notifications(&self, limit: i64) -> Result<Vec<OutboxRecord>> {
		self.store.list_failed_notifications(limit.clamp(1, MAX_FAILED_PAGE)).await
	}

	/// Re-queues a failed notification for the worker.
	pub async fn retrigger_notification(&self, outbox_id: Uuid) -> Result<()> {
		if !self.store.requeue_notification(outbox_id, OffsetDateTime::now_utc()).await? {
			return Err(Error::NotFound { message: format!("Failed notification {outbox_id}.") });
		}

		tracing::info!(%outbox_id, "Handover notification re-queued.");

		Ok(())
	}
}
