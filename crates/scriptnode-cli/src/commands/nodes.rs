//! Node type listing command.

#![allow(clippy::print_literal)] // Table headers use literal strings

use std::path::PathBuf;

use clap::Args;
use scriptnode_config::NodeTree;
use scriptnode_registry::NodeCategory;

use super::common::holder;

const CATEGORIES: [NodeCategory; 4] = [
    NodeCategory::Core,
    NodeCategory::Math,
    NodeCategory::Snex,
    NodeCategory::Project,
];

#[derive(Args)]
pub struct NodesArgs {
    /// Show the parameters of one node type
    #[arg(value_name = "PATH")]
    path: Option<String>,

    /// Only list one category (core, math, snex, project)
    #[arg(short, long)]
    category: Option<String>,

    /// Directory of project networks to list as `project.*` nodes
    #[arg(short, long)]
    project: Option<PathBuf>,
}

pub fn run(args: NodesArgs) -> anyhow::Result<()> {
    let holder = holder(args.project.as_deref())?;
    let context = holder.context();
    let registry = &context.registry;

    if let Some(path) = &args.path {
        if !registry.contains(path) {
            anyhow::bail!("Unknown node: {path}. Use 'scriptnode nodes' to see available nodes.");
        }
        let node = registry.build(&NodeTree::new(path.as_str(), "node"), false)?;

        println!("{path}");
        println!("{}", "=".repeat(path.len()));
        if let Some(descriptor) = registry.get(path) {
            println!();
            println!("{}", descriptor.description);
            if descriptor.poly_variant {
                println!("Has a polyphonic variant.");
            }
        }
        println!();
        println!("Parameters:");
        println!();
        println!("  {:16}  {:>10}  {}", "Name", "Default", "Range");
        println!("  {:16}  {:>10}  {}", "----", "-------", "-----");
        for p in node.parameters() {
            println!("  {:16}  {:>10.4}  {} .. {}", p.name, p.default, p.range.min, p.range.max);
        }
        return Ok(());
    }

    let filter = match &args.category {
        Some(name) => Some(
            CATEGORIES
                .into_iter()
                .find(|c| c.name().eq_ignore_ascii_case(name))
                .ok_or_else(|| anyhow::anyhow!("Unknown category: {name}"))?,
        ),
        None => None,
    };

    println!("Available Nodes");
    println!("===============");
    for category in CATEGORIES {
        if filter.is_some_and(|f| f != category) {
            continue;
        }
        let nodes = registry.nodes_in_category(category);
        if nodes.is_empty() {
            continue;
        }
        println!();
        println!("{} - {}", category.name(), category.description());
        for descriptor in nodes {
            let poly = if descriptor.poly_variant { " (poly)" } else { "" };
            println!("  {:24}  {}{}", descriptor.path, descriptor.description, poly);
        }
    }

    if filter.is_none() {
        let containers: Vec<String> = registry
            .all_paths()
            .into_iter()
            .filter(|p| registry.get(p).is_none())
            .collect();
        println!();
        println!("Containers");
        for path in containers {
            println!("  {path}");
        }
    }

    Ok(())
}
