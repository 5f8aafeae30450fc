use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = handover_api::Args::parse();

	handover_api::run(args).await
}
