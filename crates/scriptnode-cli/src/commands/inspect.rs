//! Network inspection command.

use std::path::PathBuf;

use clap::Args;
use scriptnode::{DspNetwork, NetworkContext};
use scriptnode_config::{NetworkTree, NodeTree};
use serde_json::json;
use snex_core::DataType;

use super::common::{holder, load_network};

#[derive(Args)]
pub struct InspectArgs {
    /// Network description file (TOML or JSON)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Directory of project networks that `project.*` nodes refer to
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Print a JSON summary instead of text
    #[arg(long)]
    json: bool,

    /// Print the normalized description as TOML
    #[arg(long, conflicts_with = "json")]
    normalized: bool,
}

pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let holder = holder(args.project.as_deref())?;
    let tree = load_network(&args.file)?;
    let network = DspNetwork::new(tree, NetworkContext::clone(&holder.context()))?;
    let description = network.description();

    if args.normalized {
        print!("{}", description.normalized().to_toml()?);
        return Ok(());
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary(&network, &description))?);
        return Ok(());
    }

    println!("Network: {}", network.id());
    println!("  Polyphonic:  {}", network.is_polyphonic());
    println!("  Compilable:  {}", description.allow_compilation);
    println!("  Hash:        {:016x}", network.content_hash());
    println!();

    println!("Parameters:");
    if description.parameters.is_empty() {
        println!("  (none)");
    }
    for p in &description.parameters {
        let targets: Vec<String> = p
            .connections
            .iter()
            .map(|c| format!("{}.{}", c.node, c.parameter))
            .collect();
        println!(
            "  {:<16} {:>10.4}  [{} .. {}]  -> {}",
            p.id,
            p.value,
            p.range.min,
            p.range.max,
            if targets.is_empty() { "-".to_string() } else { targets.join(", ") }
        );
    }
    println!();

    println!("Nodes:");
    print_node(&description.root, 1);

    let data: Vec<String> = DataType::ALL
        .iter()
        .filter_map(|&t| {
            let n = description.num_data_objects(t);
            (n > 0).then(|| format!("{t}: {n}"))
        })
        .collect();
    if !data.is_empty() {
        println!();
        println!("Data objects: {}", data.join(", "));
    }

    let unused = network.unused_node_ids();
    if !unused.is_empty() {
        println!();
        println!("Unused nodes: {}", unused.join(", "));
    }

    let exceptions = network.exceptions();
    if !exceptions.is_empty() {
        println!();
        println!("Errors:");
        for (node, error) in exceptions.iter() {
            println!("  {node}: {error}");
        }
    }

    Ok(())
}

fn print_node(node: &NodeTree, depth: usize) {
    let mut line = format!("{}{} ({})", "  ".repeat(depth), node.id, node.path);
    if node.bypassed {
        line.push_str(" [bypassed]");
    }
    if !node.data.is_empty() {
        let slots: Vec<String> = node.data.iter().map(|d| format!("{}#{}", d.data_type, d.index)).collect();
        line.push_str(&format!(" data: {}", slots.join(", ")));
    }
    println!("{line}");
    for child in &node.nodes {
        print_node(child, depth + 1);
    }
}

fn summary(network: &DspNetwork, description: &NetworkTree) -> serde_json::Value {
    let errors: Vec<serde_json::Value> = network
        .exceptions()
        .iter()
        .map(|(node, error)| json!({ "node": node, "code": format!("{:?}", error.code), "message": error.to_string() }))
        .collect();

    json!({
        "id": network.id(),
        "polyphonic": network.is_polyphonic(),
        "allow_compilation": description.allow_compilation,
        "hash": format!("{:016x}", network.content_hash()),
        "parameters": description.parameters.iter().map(|p| json!({
            "id": p.id,
            "value": p.value,
            "min": p.range.min,
            "max": p.range.max,
        })).collect::<Vec<_>>(),
        "nodes": description.nodes().map(|n| json!({ "id": n.id, "path": n.path })).collect::<Vec<_>>(),
        "unused": network.unused_node_ids(),
        "errors": errors,
    })
}
