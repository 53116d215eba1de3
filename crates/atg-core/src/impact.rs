//! Impact Selector: given the set of unchanged files and the
//! env→files map, yields the set of impacted environments.

use std::collections::HashSet;

use crate::model::{DependencyGraph, Environment};

/// An environment is impacted iff its dependency set is not a subset of
/// `unchanged_files`. An environment with zero dependency files is
/// treated as not impacted. When `unchanged_files` is `None` (the SCM hook is
/// absent), every environment is impacted.
pub fn select_impacted(
    graph: &DependencyGraph,
    unchanged_files: Option<&HashSet<String>>,
) -> HashSet<Environment> {
    let Some(unchanged) = unchanged_files else {
        return graph.environments().cloned().collect();
    };

    graph
        .environments()
        .filter(|env| {
            let files = graph.files_of(env);
            !files.is_empty() && !files.is_subset(unchanged)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn env(n: &str) -> Environment {
        Environment::new(n, PathBuf::from(format!("/build/{n}")))
    }

    fn graph_with(pairs: &[(&str, &str)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for (e, f) in pairs {
            g.insert(env(e), f.to_string());
        }
        g
    }

    #[test]
    fn s1_all_files_unchanged_yields_no_impact() {
        let graph = graph_with(&[("E1", "a.c"), ("E1", "b.c")]);
        let unchanged: HashSet<String> = ["a.c".into(), "b.c".into()].into_iter().collect();
        assert!(select_impacted(&graph, Some(&unchanged)).is_empty());
    }

    #[test]
    fn s2_one_changed_file_yields_impact() {
        let graph = graph_with(&[("E1", "a.c"), ("E1", "b.c")]);
        let unchanged: HashSet<String> = ["a.c".into()].into_iter().collect();
        let impacted = select_impacted(&graph, Some(&unchanged));
        assert_eq!(impacted, HashSet::from([env("E1")]));
    }

    #[test]
    fn no_scm_hook_means_every_env_impacted() {
        let graph = graph_with(&[("E1", "a.c"), ("E2", "c.c")]);
        let impacted = select_impacted(&graph, None);
        assert_eq!(impacted.len(), 2);
    }

    #[test]
    fn zero_file_environment_is_never_impacted() {
        let mut graph = DependencyGraph::new();
        graph.insert_environment(env("E1"));
        assert!(graph.files_of(&env("E1")).is_empty());

        let unchanged: HashSet<String> = HashSet::new();
        assert!(select_impacted(&graph, Some(&unchanged)).is_empty());
    }

    #[test]
    fn impact_closure_invariant() {
        let graph = graph_with(&[("E1", "a.c"), ("E1", "b.c")]);
        let unchanged: HashSet<String> = ["a.c".into(), "b.c".into()].into_iter().collect();
        assert!(!select_impacted(&graph, Some(&unchanged)).contains(&env("E1")));

        let unchanged: HashSet<String> = ["a.c".into()].into_iter().collect();
        assert!(select_impacted(&graph, Some(&unchanged)).contains(&env("E1")));
    }

    proptest::proptest! {
        /// Impact closure: an environment is impacted iff it has at least
        /// one dependency file outside the unchanged set.
        #[test]
        fn impact_matches_dependency_coverage(
            files in proptest::collection::vec("[a-z]{1,4}\\.c", 1..6),
            unchanged_mask in proptest::collection::vec(proptest::bool::ANY, 1..6),
        ) {
            let mut graph = DependencyGraph::new();
            let e = env("E1");
            for f in &files {
                graph.insert(e.clone(), f.clone());
            }

            let unchanged: HashSet<String> = files
                .iter()
                .zip(unchanged_mask.iter().cycle())
                .filter(|(_, kept)| **kept)
                .map(|(f, _)| f.clone())
                .collect();

            let impacted = select_impacted(&graph, Some(&unchanged));
            let all_unchanged = files.iter().all(|f| unchanged.contains(f));
            proptest::prop_assert_eq!(impacted.contains(&e), !all_unchanged);
        }
    }
}
