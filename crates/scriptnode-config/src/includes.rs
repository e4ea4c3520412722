//! Ordering of networks compiled into a project library.
//!
//! A network can embed another network of the project through a
//! `project.<id>` node. When networks are compiled together, every network
//! must come after the networks it embeds, and it may only embed networks
//! that are compiled as well.

use std::collections::BTreeMap;

use crate::description::NetworkTree;
use crate::error::ConfigError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Orders the networks flagged for compilation so that each one follows the
/// networks it includes.
///
/// Networks without `allow_compilation` are skipped. Ties keep the input
/// order.
///
/// # Errors
///
/// - [`ConfigError::InvalidInclude`] if a compiled network includes one that
///   is not flagged for compilation (or doesn't exist)
/// - [`ConfigError::CyclicReference`] if two networks reach each other
pub fn sort_includes(networks: &[NetworkTree]) -> Result<Vec<&NetworkTree>, ConfigError> {
    let compiled: BTreeMap<&str, &NetworkTree> = networks
        .iter()
        .filter(|n| n.allow_compilation)
        .map(|n| (n.id.as_str(), n))
        .collect();

    for n in networks.iter().filter(|n| n.allow_compilation) {
        for include in n.project_includes() {
            if !compiled.contains_key(include) {
                return Err(ConfigError::InvalidInclude {
                    network: n.id.clone(),
                    include: include.to_string(),
                });
            }
        }
    }

    let flagged: Vec<&NetworkTree> = networks.iter().filter(|n| n.allow_compilation).collect();
    for (i, a) in flagged.iter().enumerate() {
        for b in &flagged[i + 1..] {
            if includes(a, b) && includes(b, a) {
                return Err(ConfigError::CyclicReference(a.id.clone(), b.id.clone()));
            }
        }
    }

    let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
    let mut sorted = Vec::with_capacity(compiled.len());
    for n in networks.iter().filter(|n| n.allow_compilation) {
        visit(n, &compiled, &mut marks, &mut sorted)?;
    }

    tracing::debug!(
        order = ?sorted.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
        "sorted project includes"
    );
    Ok(sorted)
}

fn visit<'a>(
    network: &'a NetworkTree,
    compiled: &BTreeMap<&str, &'a NetworkTree>,
    marks: &mut BTreeMap<&'a str, Mark>,
    sorted: &mut Vec<&'a NetworkTree>,
) -> Result<(), ConfigError> {
    if marks.contains_key(network.id.as_str()) {
        return Ok(());
    }
    marks.insert(network.id.as_str(), Mark::Visiting);

    for include in network.project_includes() {
        let Some(target) = compiled.get(include) else {
            continue;
        };
        if marks.get(include) == Some(&Mark::Visiting) {
            return Err(ConfigError::CyclicReference(
                network.id.clone(),
                include.to_string(),
            ));
        }
        visit(target, compiled, marks, sorted)?;
    }

    marks.insert(network.id.as_str(), Mark::Done);
    sorted.push(network);
    Ok(())
}

/// Whether `a` embeds `b`.
fn includes(a: &NetworkTree, b: &NetworkTree) -> bool {
    a.project_includes().contains(&b.id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::NodeTree;

    fn network(id: &str, includes: &[&str]) -> NetworkTree {
        let mut root = NodeTree::new("container.chain", id);
        for (i, inc) in includes.iter().enumerate() {
            root = root.with_child(NodeTree::new(format!("project.{inc}"), format!("{inc}{i}")));
        }
        NetworkTree::new(id).with_root(root).with_compilation(true)
    }

    fn ids(sorted: &[&NetworkTree]) -> Vec<String> {
        sorted.iter().map(|n| n.id.clone()).collect()
    }

    #[test]
    fn includes_come_first() {
        let networks = vec![network("main", &["fx", "eq"]), network("fx", &["eq"]), network("eq", &[])];
        let sorted = sort_includes(&networks).unwrap();
        assert_eq!(ids(&sorted), vec!["eq", "fx", "main"]);
    }

    #[test]
    fn unrelated_networks_keep_order() {
        let networks = vec![network("b", &[]), network("a", &[])];
        assert_eq!(ids(&sort_includes(&networks).unwrap()), vec!["b", "a"]);
    }

    #[test]
    fn uncompiled_networks_are_skipped() {
        let networks = vec![network("a", &[]), network("b", &[]).with_compilation(false)];
        assert_eq!(ids(&sort_includes(&networks).unwrap()), vec!["a"]);
    }

    #[test]
    fn include_must_be_compiled() {
        let networks = vec![network("main", &["fx"]), network("fx", &[]).with_compilation(false)];
        let err = sort_includes(&networks).unwrap_err();
        assert_eq!(
            err.to_string(),
            "main includes fx, which is not flagged for compilation"
        );
    }

    #[test]
    fn mutual_reference_is_a_cycle_in_either_order() {
        let forward = vec![network("a", &["b"]), network("b", &["a"])];
        let backward = vec![network("b", &["a"]), network("a", &["b"])];

        for networks in [forward, backward] {
            let err = sort_includes(&networks).unwrap_err();
            assert!(matches!(err, ConfigError::CyclicReference(..)));
            assert!(err.to_string().starts_with("Cyclic reference: "));
        }
    }

    #[test]
    fn longer_cycles_are_found() {
        let networks = vec![network("a", &["b"]), network("b", &["c"]), network("c", &["a"])];
        assert_eq!(
            sort_includes(&networks).unwrap_err().to_string(),
            "Cyclic reference: c && a"
        );
    }

    #[test]
    fn self_include_is_a_cycle() {
        let networks = vec![network("a", &["a"])];
        assert_eq!(
            sort_includes(&networks).unwrap_err().to_string(),
            "Cyclic reference: a && a"
        );
    }

    #[test]
    fn mutual_pair_names_both_networks_in_input_order() {
        let networks = vec![network("x", &[]), network("b", &["a"]), network("a", &["b"])];
        assert_eq!(
            sort_includes(&networks).unwrap_err().to_string(),
            "Cyclic reference: b && a"
        );
    }

    #[test]
    fn one_way_include_is_not_a_cycle() {
        let a = network("a", &["b"]);
        let b = network("b", &[]);
        assert!(includes(&a, &b));
        assert!(!includes(&b, &a));
        assert_eq!(ids(&sort_includes(&[a, b]).unwrap()), vec!["b", "a"]);
    }
}
