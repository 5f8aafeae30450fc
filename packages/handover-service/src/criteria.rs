use serde::Serialize;
use uuid::Uuid;

use crate::{Error, HandoverService, Result, store::CampaignRecord};
use handover_domain::decision::{CriteriaOverride, HandoverCriteria};

#[derive(Debug, Clone, Serialize)]
pub struct CriteriaView {
	pub campaign_id: Uuid,
	pub overrides: CriteriaOverride,
	pub effective: HandoverCriteria,
}

impl HandoverService {
	pub async fn handover_criteria(&self, campaign_id: Uuid) -> Result<CriteriaView> {
		let campaign = self.require_campaign(campaign_id).await?;

		Ok(self.criteria_view(&campaign))
	}

	/// Replaces the campaign override. An empty override reverts to the global defaults.
	pub async fn update_handover_criteria(
		&self,
		campaign_id: Uuid,
		overrides: CriteriaOverride,
	) -> Result<CriteriaView> {
		overrides.validate().map_err(|err| Error::InvalidField {
			field: err.field.to_string(),
			message: err.message.to_string(),
		})?;

		let stored = (overrides != CriteriaOverride::default()).then_some(&overrides);

		if !self.store.update_campaign_criteria(campaign_id, stored).await? {
			return Err(Error::NotFound { message: format!("Campaign {campaign_id}.") });
		}

		tracing::info!(%campaign_id, overridden = stored.is_some(), "Handover criteria updated.");

		let campaign = self.require_campaign(campaign_id).await?;

		Ok(self.criteria_view(&campaign))
	}

	pub(crate) fn effective_criteria(&self, campaign: &CampaignRecord) -> HandoverCriteria {
		let defaults = HandoverCriteria::from_config(&self.cfg.handover);

		match &campaign.criteria {
			Some(overrides) => defaults.with_override(overrides),
			None => defaults,
		}
	}

	async fn require_campaign(&self, campaign_id: Uuid) -> Result<CampaignRecord> {
		self.store
			.get_campaign(campaign_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Campaign {campaign_id}.") })
	}

	fn criteria_view(&self, campaign: &CampaignRecord) -> CriteriaView {
		CriteriaView {
			campaign_id: campaign.campaign_id,
			overrides: campaign.criteria.clone().unwrap_or_default(),
			effective: self.effective_criteria(campaign),
		}
	}
}
