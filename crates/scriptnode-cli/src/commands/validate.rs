//! Network description validation command.

use std::path::{Path, PathBuf};

use clap::Args;
use scriptnode::{DspNetwork, Holder, NetworkContext};

use super::common::{holder, load_network};

#[derive(Args)]
pub struct ValidateArgs {
    /// Network description files (TOML or JSON)
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Directory of project networks that `project.*` nodes refer to
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Treat deprecated nodes as errors in every network
    #[arg(long)]
    strict: bool,
}

pub fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let holder = holder(args.project.as_deref())?;
    let mut failed = 0;

    for path in &args.files {
        match check(&holder, path, args.strict) {
            Ok(warnings) => {
                println!("ok      {}", path.display());
                for warning in warnings {
                    println!("  warning: {warning}");
                }
            }
            Err(e) => {
                failed += 1;
                println!("error   {}", path.display());
                println!("  {e:#}");
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} networks failed validation", args.files.len());
    }
    Ok(())
}

/// Builds the network and returns the findings that do not stop it.
fn check(holder: &Holder, path: &Path, strict: bool) -> anyhow::Result<Vec<String>> {
    let tree = load_network(path)?;
    let compilable = tree.allow_compilation;
    let network = DspNetwork::new(tree, NetworkContext::clone(&holder.context()))?;

    if compilable || strict {
        network.check_before_compilation()?;
    }

    Ok(network
        .exceptions()
        .iter()
        .map(|(node, error)| format!("{node}: {error}"))
        .collect())
}
