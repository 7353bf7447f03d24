use clap::Parser;
use pairlink_cli::cli::Cli;
use pairlink_cli::{logging, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	server::serve(&cli).await
}
