use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = handover_worker::Args::parse();

	handover_worker::run(args).await
}
