//! Dependency graph analysis.
//!
//! Only `required_features` edges form the graph. Edges pointing at keys that
//! do not exist are missing dependencies, not graph edges.

use super::{ErrorCode, ValidationError};
use crate::models::{DependencyConfig, FeatureMap};
use std::collections::HashSet;

/// Finds dependency cycles, each rendered as `"a -> b -> a"`.
///
/// Depth-first search from every unvisited key in key order. A node that has
/// been fully explored is never expanded again, so a component with several
/// overlapping cycles may report only one of them.
#[must_use]
pub fn find_circular_dependencies(config: &FeatureMap) -> Vec<String> {
    let mut search = CycleSearch {
        config,
        visited: HashSet::new(),
        on_stack: HashSet::new(),
        path: Vec::new(),
        cycles: Vec::new(),
    };

    for key in config.keys() {
        if !search.visited.contains(key.as_str()) {
            search.visit(key);
        }
    }
    search.cycles
}

struct CycleSearch<'a> {
    config: &'a FeatureMap,
    visited: HashSet<&'a str>,
    on_stack: HashSet<&'a str>,
    path: Vec<&'a str>,
    cycles: Vec<String>,
}

impl<'a> CycleSearch<'a> {
    fn visit(&mut self, key: &'a str) {
        self.visited.insert(key);
        self.on_stack.insert(key);
        self.path.push(key);

        let config = self.config;
        if let Some(flag) = config.get(key) {
            for dep in flag.required_features() {
                if !config.contains_key(dep) {
                    continue;
                }
                if self.on_stack.contains(dep.as_str()) {
                    self.record_cycle(dep);
                } else if !self.visited.contains(dep.as_str()) {
                    self.visit(dep);
                }
            }
        }

        self.path.pop();
        self.on_stack.remove(key);
    }

    fn record_cycle(&mut self, repeat: &'a str) {
        let start = self
            .path
            .iter()
            .position(|node| *node == repeat)
            .unwrap_or_default();
        let mut cycle: Vec<&str> = self.path[start..].to_vec();
        cycle.push(repeat);
        self.cycles.push(cycle.join(" -> "));
    }
}

/// Checks `dependencies` of the flag `key` against the rest of `config`.
///
/// Reports required features that are missing or disabled, and conflicting
/// features that are enabled. Effective state (user override first) decides
/// enablement.
#[must_use]
pub fn check_dependencies(
    key: &str,
    dependencies: &DependencyConfig,
    config: &FeatureMap,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for required in &dependencies.required_features {
        match config.get(required) {
            None => errors.push(ValidationError::new(
                format!("{key}.dependencies.requiredFeatures"),
                format!("Required feature \"{required}\" does not exist"),
                ErrorCode::MissingDependency,
            )),
            Some(flag) if !flag.is_enabled() => errors.push(ValidationError::new(
                format!("{key}.dependencies.requiredFeatures"),
                format!("Required feature \"{required}\" is disabled"),
                ErrorCode::DependencyDisabled,
            )),
            Some(_) => {},
        }
    }

    for conflict in &dependencies.conflicts {
        if config.get(conflict).is_some_and(|flag| flag.is_enabled()) {
            errors.push(ValidationError::new(
                format!("{key}.dependencies.conflicts"),
                format!("Feature conflicts with \"{conflict}\""),
                ErrorCode::DependencyConflict,
            ));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, FeatureFlag};
    use chrono::{TimeZone, Utc};

    fn graph(edges: &[(&str, &[&str])]) -> FeatureMap {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        edges
            .iter()
            .map(|(key, requires)| {
                let mut flag = FeatureFlag::new(key.to_uppercase(), Category::Widget, true, "admin", now);
                if !requires.is_empty() {
                    flag.dependencies = Some(DependencyConfig::requires(requires.iter().copied()));
                }
                ((*key).to_string(), flag)
            })
            .collect()
    }

    #[test]
    fn test_no_cycles_in_chain() {
        let config = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        assert!(find_circular_dependencies(&config).is_empty());
    }

    #[test]
    fn test_two_node_cycle() {
        let config = graph(&[("a", &["b"]), ("b", &["a"])]);
        assert_eq!(find_circular_dependencies(&config), vec!["a -> b -> a"]);
    }

    #[test]
    fn test_self_dependency() {
        let config = graph(&[("a", &["a"])]);
        assert_eq!(find_circular_dependencies(&config), vec!["a -> a"]);
    }

    #[test]
    fn test_cycle_path_starts_at_repeated_node() {
        let config = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["b"])]);
        assert_eq!(find_circular_dependencies(&config), vec!["b -> c -> b"]);
    }

    #[test]
    fn test_dangling_edges_are_ignored() {
        let config = graph(&[("a", &["ghost"]), ("b", &["a"])]);
        assert!(find_circular_dependencies(&config).is_empty());
    }

    #[test]
    fn test_independent_cycles_are_both_found() {
        let config = graph(&[("a", &["b"]), ("b", &["a"]), ("x", &["y"]), ("y", &["x"])]);
        assert_eq!(
            find_circular_dependencies(&config),
            vec!["a -> b -> a", "x -> y -> x"]
        );
    }

    #[test]
    fn test_shared_node_is_not_reported_twice() {
        let config = graph(&[("a", &["c"]), ("b", &["c"]), ("c", &["a"])]);
        assert_eq!(find_circular_dependencies(&config), vec!["a -> c -> a"]);
    }

    #[test]
    fn test_check_dependencies() {
        let mut config = graph(&[("a", &[]), ("off", &[]), ("rival", &[])]);
        if let Some(off) = config.get_mut("off") {
            off.enabled = false;
        }
        let deps = DependencyConfig {
            required_features: vec!["a".into(), "off".into(), "ghost".into()],
            conflicts: vec!["rival".into(), "ghost".into()],
            ..DependencyConfig::default()
        };

        let codes: Vec<ErrorCode> = check_dependencies("new", &deps, &config)
            .into_iter()
            .map(|e| e.code)
            .collect();
        assert_eq!(
            codes,
            vec![
                ErrorCode::DependencyDisabled,
                ErrorCode::MissingDependency,
                ErrorCode::DependencyConflict,
            ]
        );
    }

    #[test]
    fn test_user_override_counts_as_enabled() {
        let mut config = graph(&[("a", &[])]);
        if let Some(a) = config.get_mut("a") {
            a.enabled = false;
            a.user_override = Some(true);
        }
        let deps = DependencyConfig::requires(["a"]);
        assert!(check_dependencies("b", &deps, &config).is_empty());
    }
}
