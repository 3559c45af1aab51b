use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "gridmen")]
#[command(about = "Inspect a gridmen backend")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
	/// Backend config file (defaults to the user config directory)
	#[arg(long, short = 'c', value_name = "PATH", global = true)]
	pub config: Option<PathBuf>,

	/// Verbose logging
	#[arg(long, short = 'v', global = true)]
	pub verbose: bool,

	/// Subcommand to execute.
	#[command(subcommand)]
	pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
	/// Print the node tree below the configured root
	Tree {
		/// Levels to expand below the root
		#[arg(long, short = 'd', default_value_t = 1)]
		depth: usize,
	},
	/// Acquire and immediately release a lease on a node
	Lock {
		/// Node key, e.g. `schemas.world.patch1`
		node: String,
		/// Request write access instead of read
		#[arg(long, short = 'w')]
		write: bool,
	},
	/// Summarize the cells of a patch
	Cells {
		/// Patch node key
		patch: String,
		/// Show soft-deleted cells instead of active ones
		#[arg(long)]
		deleted: bool,
	},
}
