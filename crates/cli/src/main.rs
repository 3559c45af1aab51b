//! Gridmen command-line client.
//!
//! Smoke-tests a backend: lists the node tree, probes leases and summarizes
//! patch cells.

mod cli;
mod commands;
#[cfg(test)]
mod tests;

use std::path::PathBuf;

use clap::Parser;
use cli::Cli;
use gridmen_remote::BackendConfig;
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	setup_tracing(cli.verbose);

	let config = BackendConfig::load(cli.config.as_deref())?;
	info!(base_url = %config.base_url, root = %config.root_key, "starting gridmen");

	commands::run(&config, cli.command).await
}

fn setup_tracing(verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::fmt::format::FmtSpan;
	use tracing_subscriber::prelude::*;

	let default_filter = if verbose { "gridmen=debug,info" } else { "warn" };
	let filter = || {
		EnvFilter::try_from_env("GRIDMEN_LOG")
			.or_else(|_| EnvFilter::try_from_default_env())
			.unwrap_or_else(|_| EnvFilter::new(default_filter))
	};

	if let Some(log_dir) = std::env::var("GRIDMEN_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("gridmen.{}.log", std::process::id()));

		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let file_layer = tracing_subscriber::fmt::layer()
				.with_writer(file)
				.with_ansi(false)
				.with_span_events(FmtSpan::CLOSE)
				.with_target(true);

			tracing_subscriber::registry().with(filter()).with(file_layer).init();

			tracing::info!(path = ?log_path, "tracing initialized");
			return;
		}
	}

	tracing_subscriber::fmt()
		.with_env_filter(filter())
		.with_writer(std::io::stderr)
		.init();
}
