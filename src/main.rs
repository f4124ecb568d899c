//! jobscout - job listing aggregator
//!
//! Command-line entry point: parses arguments, sets up logging, opens the
//! store and dispatches to the command implementations.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use jobscout::cli::{Cli, Command, OutputFormat};
use jobscout::commands::{self, update::UpdateFlags, Context};
use jobscout::config::Settings;
use jobscout::ui;

fn main() -> Result<()> {
	let cli = Cli::parse();

	init_tracing(cli.verbose);
	ui::Log::set_verbose(cli.verbose);
	ui::Log::set_stderr(cli.command.output() == OutputFormat::Json);

	let settings = Settings::from_env()?;
	let ctx = Context::open(settings)?;

	match cli.command {
		Command::Setup => {
			ui::print_logo();
			commands::setup::run(&ctx)
		}
		Command::Collect {
			kind,
			specific,
			max_results,
		} => {
			print_header();
			commands::collect::run(&ctx, kind, specific, max_results)
		}
		Command::Process {
			batch_size,
			max_listings,
			listing_id,
		} => {
			print_header();
			commands::process::run(&ctx, batch_size, max_listings, listing_id)
		}
		Command::Cluster {
			create,
			list,
			update_summaries,
			get_summary,
			output,
		} => commands::cluster::run(&ctx, create, list, update_summaries, get_summary.as_deref(), output),
		Command::Search {
			target,
			limit,
			threshold,
			output,
		} => commands::search::run(&ctx, target, limit, threshold, output),
		Command::Update {
			daily,
			mark_expired,
			remove_duplicates,
			maintain_count,
			stats,
			output,
		} => {
			let flags = UpdateFlags {
				daily,
				mark_expired,
				remove_duplicates,
				maintain_count,
				stats,
			};
			commands::update::run(&ctx, flags, output)
		}
	}
}

/// Structured logs go to stderr; `RUST_LOG` overrides the level
fn init_tracing(verbose: bool) {
	let default = if verbose { "jobscout=debug" } else { "warn" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(false)
		.init();
}

fn print_header() {
	println!();
	println!(
		"{}",
		format!("─── jobscout v{} ───", env!("CARGO_PKG_VERSION"))
			.bright_blue()
			.bold()
	);
}
