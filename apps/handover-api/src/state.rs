use std::sync::Arc;

use handover_service::{HandoverService, Providers, store::PgStore};
use handover_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<HandoverService>,
}
impl AppState {
	pub async fn new(config: handover_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let providers = Providers::from_config(&config)?;
		let service = HandoverService::new(config, Arc::new(PgStore::new(db)), providers);

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: HandoverService) -> Self {
		Self { service: Arc::new(service) }
	}
}
