//! Dependency-import pruning across the module tree.
//!
//! A descendant never re-declares an import already guaranteed loaded by an
//! ancestor: for every module we union the ancestor chain's import sets and
//! subtract that union from the module's own imports. The union is memoized
//! per module id, so overall cost is proportional to the number of modules
//! rather than modules × depth.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::bundler::BundledModule;

/// Pruned import lists, keyed by module id. Input order within each module's
/// own import list is preserved; duplicates within one list are dropped too.
pub fn prune_imports(modules: &[BundledModule]) -> FxHashMap<String, Vec<String>> {
    let index: FxHashMap<&str, &BundledModule> =
        modules.iter().map(|m| (m.id.as_str(), m)).collect();

    let mut memo: FxHashMap<&str, FxHashSet<&str>> = FxHashMap::default();
    let mut pruned = FxHashMap::default();

    for module in modules {
        ancestor_union(module.id.as_str(), &index, &mut memo);
        let inherited = &memo[module.id.as_str()];

        let mut seen = FxHashSet::default();
        let imports: Vec<String> = module
            .imports
            .iter()
            .filter(|import| !inherited.contains(import.as_str()))
            .filter(|import| seen.insert(import.as_str()))
            .cloned()
            .collect();
        pruned.insert(module.id.clone(), imports);
    }

    pruned
}

/// Fill `memo[id]` with the union of import sets along `id`'s ancestor chain.
///
/// Iterative (explicit stack) so deep chains cannot overflow, and each id is
/// computed exactly once. Nothing forces a `Bundler` impl to report an
/// acyclic parent chain, so a back-edge onto the in-progress chain is
/// treated as the chain's end rather than followed.
fn ancestor_union<'a>(
    id: &'a str,
    index: &FxHashMap<&'a str, &'a BundledModule>,
    memo: &mut FxHashMap<&'a str, FxHashSet<&'a str>>,
) {
    let mut stack = vec![id];
    let mut in_progress = FxHashSet::default();
    in_progress.insert(id);
    while let Some(&current) = stack.last() {
        if memo.contains_key(current) {
            in_progress.remove(current);
            stack.pop();
            continue;
        }

        let parent = index
            .get(current)
            .and_then(|m| m.parent.as_deref())
            // A parent outside the bundle contributes nothing.
            .filter(|p| index.contains_key(p))
            // A back-edge onto the chain being resolved ends it.
            .filter(|p| !in_progress.contains(p));

        match parent {
            None => {
                memo.insert(current, FxHashSet::default());
                in_progress.remove(current);
                stack.pop();
            }
            Some(parent) => {
                if let Some(parent_union) = memo.get(parent) {
                    let mut union = parent_union.clone();
                    union.extend(index[parent].imports.iter().map(String::as_str));
                    memo.insert(current, union);
                    in_progress.remove(current);
                    stack.pop();
                } else {
                    stack.push(parent);
                    in_progress.insert(parent);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::BundledModule;
    use crate::hash::ContentHash;
    use crate::manifest::ModuleFlags;
    use std::path::PathBuf;

    fn module(id: &str, parent: Option<&str>, imports: &[&str]) -> BundledModule {
        BundledModule {
            id: id.into(),
            module_ref: format!("{id}.00000000.js"),
            source_path: PathBuf::from(format!("/src/{id}.js")),
            source_hash: ContentHash::empty(),
            imports: imports.iter().map(|s| s.to_string()).collect(),
            parent: parent.map(|s| s.to_string()),
            flags: ModuleFlags::default(),
        }
    }

    #[test]
    fn test_descendant_never_redeclares_ancestor_import() {
        let modules = vec![
            module("entry", None, &["react", "runtime"]),
            module("page", Some("entry"), &["react", "widgets"]),
            module("widget", Some("page"), &["react", "widgets", "icons"]),
        ];
        let pruned = prune_imports(&modules);

        assert_eq!(pruned["entry"], vec!["react", "runtime"]);
        assert_eq!(pruned["page"], vec!["widgets"]);
        assert_eq!(pruned["widget"], vec!["icons"]);

        // Property: no pruned import appears anywhere up the ancestor chain.
        for m in &modules {
            let mut ancestor = m.parent.as_deref();
            while let Some(a) = ancestor {
                let parent = modules.iter().find(|x| x.id == a).unwrap();
                for import in &pruned[&m.id] {
                    assert!(!parent.imports.contains(import), "{} redeclares {}", m.id, import);
                }
                ancestor = parent.parent.as_deref();
            }
        }
    }

    #[test]
    fn test_union_spans_whole_chain() {
        // "icons" is declared by the grandparent only; the leaf must drop it.
        let modules = vec![
            module("a", None, &["icons"]),
            module("b", Some("a"), &["grid"]),
            module("c", Some("b"), &["icons", "grid", "own"]),
        ];
        let pruned = prune_imports(&modules);
        assert_eq!(pruned["c"], vec!["own"]);
    }

    #[test]
    fn test_roots_keep_everything() {
        let modules = vec![module("only", None, &["x", "y"])];
        let pruned = prune_imports(&modules);
        assert_eq!(pruned["only"], vec!["x", "y"]);
    }

    #[test]
    fn test_duplicates_within_own_list_dropped() {
        let modules = vec![module("a", None, &["x", "x", "y"])];
        let pruned = prune_imports(&modules);
        assert_eq!(pruned["a"], vec!["x", "y"]);
    }

    #[test]
    fn test_unknown_parent_is_ignored() {
        let modules = vec![module("orphan", Some("missing"), &["x"])];
        let pruned = prune_imports(&modules);
        assert_eq!(pruned["orphan"], vec!["x"]);
    }

    #[test]
    fn test_cyclic_parent_chain_terminates() {
        // Parent chains come from outside the crate; a cycle must end the
        // chain instead of walking it forever.
        let modules = vec![
            module("a", Some("b"), &["x", "own-a"]),
            module("b", Some("a"), &["x", "own-b"]),
        ];
        let pruned = prune_imports(&modules);

        // "a" resolves first: its chain ends at the back-edge, so "b" above
        // it contributes; "b" then reuses its memoized (empty) union.
        assert_eq!(pruned["a"], vec!["own-a"]);
        assert_eq!(pruned["b"], vec!["x", "own-b"]);
    }

    #[test]
    fn test_self_parent_terminates() {
        let modules = vec![module("loop", Some("loop"), &["x"])];
        let pruned = prune_imports(&modules);
        assert_eq!(pruned["loop"], vec!["x"]);
    }

    #[test]
    fn test_siblings_prune_independently() {
        let modules = vec![
            module("root", None, &["shared"]),
            module("left", Some("root"), &["shared", "l"]),
            module("right", Some("root"), &["shared", "r"]),
        ];
        let pruned = prune_imports(&modules);
        assert_eq!(pruned["left"], vec!["l"]);
        assert_eq!(pruned["right"], vec!["r"]);
    }
}
