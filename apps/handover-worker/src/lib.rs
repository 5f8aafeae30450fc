pub mod worker;

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use handover_service::{HandoverService, Providers, store::PgStore};
use handover_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = handover_cli::VERSION,
	rename_all = "kebab",
	styles = handover_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = handover_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let providers = Providers::from_config(&config)?;
	let service = HandoverService::new(config, Arc::new(PgStore::new(db)), providers);

	worker::run_worker(Arc::new(service)).await
}
