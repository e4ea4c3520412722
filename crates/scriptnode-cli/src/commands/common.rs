//! Shared CLI helpers used across multiple commands.

use std::path::{Path, PathBuf};

use anyhow::Context;
use scriptnode::{Holder, NetworkContext};
use scriptnode_config::NetworkTree;

/// Parse a `key=value` string for clap's `value_parser`.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid parameter format: '{s}' (expected key=value)"));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

/// Load a network description, TOML or JSON by extension.
pub fn load_network(path: &Path) -> anyhow::Result<NetworkTree> {
    NetworkTree::load(path).with_context(|| format!("failed to load {}", path.display()))
}

/// Description files in `dir`, sorted by file name.
pub fn network_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_description = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "toml" || e == "json");
        if path.is_file() && is_description {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// A holder whose registry knows the compilable networks in `project`.
pub fn holder(project: Option<&Path>) -> anyhow::Result<Holder> {
    let holder = Holder::new(NetworkContext::default());
    let Some(dir) = project else {
        return Ok(holder);
    };

    let mut networks = Vec::new();
    for path in network_files(dir)? {
        let tree = load_network(&path)?;
        if tree.allow_compilation {
            networks.push(tree);
        }
    }
    let order = holder.load_project(&networks)?;
    tracing::info!(project = %dir.display(), networks = order.len(), "loaded project networks");
    Ok(holder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_val_splits_at_first_equals() {
        assert_eq!(parse_key_val("Level=0.5"), Ok(("Level".into(), "0.5".into())));
        assert_eq!(parse_key_val("a=b=c"), Ok(("a".into(), "b=c".into())));
        assert!(parse_key_val("Level").is_err());
    }
}
