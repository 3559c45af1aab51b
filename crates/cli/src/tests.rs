use clap::Parser;
use gridmen_cellset::CellSelection;
use gridmen_remote::NodeKey;
use gridmen_tree::TemplateKind;
use pretty_assertions::assert_eq;

use crate::cli::{Cli, Command};
use crate::commands::{cells_per_level, tree_line};

#[test]
fn parses_subcommands_with_global_flags() {
	let cli = Cli::try_parse_from(["gridmen", "lock", "schemas.world", "--write", "-v"]).unwrap();
	assert!(cli.verbose);
	assert_eq!(
		cli.command,
		Command::Lock {
			node: "schemas.world".into(),
			write: true,
		}
	);

	let cli = Cli::try_parse_from(["gridmen", "--config", "/tmp/g.toml", "tree"]).unwrap();
	assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/g.toml")));
	assert_eq!(cli.command, Command::Tree { depth: 1 });

	let cli = Cli::try_parse_from(["gridmen", "cells", "s.p", "--deleted"]).unwrap();
	assert_eq!(
		cli.command,
		Command::Cells {
			patch: "s.p".into(),
			deleted: true,
		}
	);
}

#[test]
fn subcommand_is_required() {
	assert!(Cli::try_parse_from(["gridmen"]).is_err());
}

#[test]
fn tree_lines_indent_by_level() {
	let root = NodeKey::root();
	assert_eq!(tree_line(&root, TemplateKind::Default, 0), ". [default]");
	let patch = NodeKey::new("schemas.world.p1").unwrap();
	assert_eq!(tree_line(&patch, TemplateKind::Patch, 2), "    p1 [patch]");
}

#[test]
fn histogram_counts_cells_per_level() {
	let cells = CellSelection::new(vec![2, 1, 2, 2], vec![7, 0, 8, 9]).unwrap();
	let histogram: Vec<_> = cells_per_level(&cells).into_iter().collect();
	assert_eq!(histogram, vec![(1, 1), (2, 3)]);
}
