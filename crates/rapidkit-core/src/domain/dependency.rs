//! Module dependency graph with deterministic topological ordering.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::error::DomainError;

/// Module slug → slugs it depends on.
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module<I, S>(&mut self, slug: &str, depends_on: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.edges
            .entry(slug.to_string())
            .or_default()
            .extend(depends_on.into_iter().map(Into::into));
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.edges.contains_key(slug)
    }

    pub fn dependencies_of(&self, slug: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(slug)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    /// `requested` plus everything reachable through `depends_on`.
    pub fn closure(&self, requested: &[String]) -> Result<BTreeSet<String>, DomainError> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<String> = requested.to_vec();

        while let Some(slug) = stack.pop() {
            if !seen.insert(slug.clone()) {
                continue;
            }
            let deps = self.edges.get(&slug).ok_or_else(|| DomainError::UnknownDependency {
                module: requested.join(", "),
                dependency: slug.clone(),
            })?;
            for dep in deps {
                if !self.edges.contains_key(dep) {
                    return Err(DomainError::UnknownDependency {
                        module: slug.clone(),
                        dependency: dep.clone(),
                    });
                }
                stack.push(dep.clone());
            }
        }
        Ok(seen)
    }

    /// Topological order of `subset`, dependencies first.
    ///
    /// Kahn's algorithm over a sorted ready set, so ties always break by slug.
    /// Edges leaving the subset are ignored.
    pub fn install_order(&self, subset: &BTreeSet<String>) -> Result<Vec<String>, DomainError> {
        let mut indegree: BTreeMap<&str, usize> = subset.iter().map(|s| (s.as_str(), 0)).collect();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for slug in subset {
            for dep in self.dependencies_of(slug) {
                if subset.contains(dep) {
                    *indegree.entry(slug.as_str()).or_default() += 1;
                    dependents.entry(dep).or_default().push(slug.as_str());
                }
            }
        }

        let mut ready: BTreeSet<&str> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(s, _)| *s)
            .collect();
        let mut order = Vec::with_capacity(subset.len());

        while let Some(slug) = ready.pop_first() {
            order.push(slug.to_string());
            for &next in dependents.get(slug).into_iter().flatten() {
                if let Some(d) = indegree.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(next);
                    }
                }
            }
        }

        if order.len() != subset.len() {
            let remaining: BTreeSet<&str> = indegree
                .iter()
                .filter(|(_, d)| **d > 0)
                .map(|(s, _)| *s)
                .collect();
            return Err(DomainError::DependencyCycle {
                cycle: self.find_cycle(&remaining),
            });
        }
        Ok(order)
    }

    /// Full catalog order.
    pub fn full_order(&self) -> Result<Vec<String>, DomainError> {
        let all: BTreeSet<String> = self.edges.keys().cloned().collect();
        self.install_order(&all)
    }

    fn find_cycle(&self, nodes: &BTreeSet<&str>) -> Vec<String> {
        let Some(start) = nodes.first() else {
            return Vec::new();
        };
        // Every remaining node still has an unprocessed dependency inside
        // `nodes`, so following those edges must revisit a node.
        let mut path: Vec<&str> = vec![*start];
        loop {
            let Some(current) = path.last().copied() else {
                return Vec::new();
            };
            let Some(next) = self.dependencies_of(current).find(|d| nodes.contains(d)) else {
                return path.iter().map(|s| s.to_string()).collect();
            };
            if let Some(pos) = path.iter().position(|p| *p == next) {
                let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
                cycle.push(next.to_string());
                return cycle;
            }
            path.push(next);
        }
    }
}
