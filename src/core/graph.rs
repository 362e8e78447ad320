//! Inter-project dependency graph and build ordering.
//!
//! The ordering convention here is **dependents-first**: a project appears
//! before every project it depends on. That direction is load-bearing and
//! deliberately asymmetric across stages:
//!
//! - Compile, Package, and Remove walk the list forward (remove dependents'
//!   extensions before the extensions they import).
//! - Upload walks the list in reverse, so dependencies install before the
//!   projects that import them.
//!
//! Do not collapse the two directions into one canonical order.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::context::CommandContext;
use crate::error::{Error, Result};
use crate::project::{self, Project};

/// A directed dependency relation: `dependent` needs `dependency`'s
/// declarations before its own build is meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub dependent: String,
    pub dependency: String,
}

#[derive(Debug)]
pub struct ProjectGraph {
    projects: Vec<Project>,
    edges: Vec<DependencyEdge>,
}

impl ProjectGraph {
    /// Discover all projects and their declared dependencies.
    ///
    /// Every sibling reference in a source project's include list must
    /// resolve to a discovered project; an unresolved name fails the whole
    /// build rather than producing a partial graph.
    pub fn discover(ctx: &CommandContext) -> Result<Self> {
        let projects = project::discover_projects(ctx)?;
        Self::from_projects_with(projects, |p| {
            Ok(project::sibling_dependencies(
                &project::read_compiler_config(p)?.include,
            ))
        })
    }

    /// Build a graph from already-discovered projects and a dependency
    /// reader, so ordering logic is testable without a filesystem layout.
    pub fn from_projects_with(
        projects: Vec<Project>,
        mut dependencies_of: impl FnMut(&Project) -> Result<Vec<String>>,
    ) -> Result<Self> {
        let known: HashSet<&str> = projects.iter().map(|p| p.name.as_str()).collect();
        let mut edges = Vec::new();

        for project in projects.iter().filter(|p| p.is_source()) {
            let mut seen: HashSet<String> = HashSet::new();
            for dependency in dependencies_of(project)? {
                if !known.contains(dependency.as_str()) {
                    return Err(Error::config_unknown_dependency(
                        project.name.clone(),
                        dependency,
                    ));
                }
                // An include list may reference the same sibling twice;
                // the edge set must not.
                if !seen.insert(dependency.clone()) {
                    continue;
                }
                edges.push(DependencyEdge {
                    dependent: project.name.clone(),
                    dependency,
                });
            }
        }

        Ok(Self { projects, edges })
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Dependents-first ordering via Kahn's algorithm.
    ///
    /// Treating each edge as `dependent -> dependency`, a node is emitted
    /// once every project depending on it has been emitted. Ties between
    /// unrelated projects break by discovery order, so repeated invocations
    /// on the same workspace produce the same list. A cycle fails with a
    /// configuration error naming its members instead of yielding a
    /// nonsense order.
    pub fn dependents_first(&self) -> Result<Vec<Project>> {
        let index: HashMap<&str, usize> = self
            .projects
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.as_str(), i))
            .collect();

        // in_degree[n] = number of dependents not yet emitted.
        let mut in_degree = vec![0usize; self.projects.len()];
        let mut dependencies_of: Vec<Vec<usize>> = vec![Vec::new(); self.projects.len()];

        for edge in &self.edges {
            let dependent = index[edge.dependent.as_str()];
            let dependency = index[edge.dependency.as_str()];
            in_degree[dependency] += 1;
            dependencies_of[dependent].push(dependency);
        }

        // Seed with projects nothing depends on, in discovery order. A
        // VecDeque keeps emission order stable for independent projects.
        let mut ready: VecDeque<usize> = (0..self.projects.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.projects.len());
        let mut emitted = vec![false; self.projects.len()];

        while let Some(i) = ready.pop_front() {
            emitted[i] = true;
            order.push(self.projects[i].clone());

            // Emitting a dependent releases its dependencies.
            for &dependency in &dependencies_of[i] {
                in_degree[dependency] -= 1;
                if in_degree[dependency] == 0 {
                    ready.push_back(dependency);
                }
            }
        }

        if order.len() != self.projects.len() {
            let cycle: Vec<String> = self
                .projects
                .iter()
                .enumerate()
                .filter(|(i, _)| !emitted[*i])
                .map(|(_, p)| p.name.clone())
                .collect();
            return Err(Error::config_dependency_cycle(cycle));
        }

        Ok(order)
    }

    /// Reverse of [`Self::dependents_first`]: every dependency precedes its
    /// dependents. Used exclusively by the Upload stage.
    pub fn dependencies_first(&self) -> Result<Vec<Project>> {
        let mut order = self.dependents_first()?;
        order.reverse();
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectKind;
    use std::path::PathBuf;

    fn source(name: &str) -> Project {
        Project {
            name: name.to_string(),
            path: PathBuf::from(name),
            kind: ProjectKind::Source,
        }
    }

    fn graph(projects: Vec<Project>, deps: &[(&str, &str)]) -> ProjectGraph {
        let deps: Vec<(String, String)> = deps
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        ProjectGraph::from_projects_with(projects, |p| {
            Ok(deps
                .iter()
                .filter(|(dependent, _)| dependent == &p.name)
                .map(|(_, dependency)| dependency.clone())
                .collect())
        })
        .unwrap()
    }

    fn position(order: &[Project], name: &str) -> usize {
        order.iter().position(|p| p.name == name).unwrap()
    }

    #[test]
    fn dependents_precede_their_dependencies() {
        let g = graph(
            vec![source("App"), source("Core"), source("Gateway")],
            &[("App", "Core"), ("Gateway", "Core"), ("App", "Gateway")],
        );
        let order = g.dependents_first().unwrap();
        assert!(position(&order, "App") < position(&order, "Core"));
        assert!(position(&order, "App") < position(&order, "Gateway"));
        assert!(position(&order, "Gateway") < position(&order, "Core"));
    }

    #[test]
    fn reverse_order_places_dependencies_first() {
        let g = graph(
            vec![source("App"), source("Core")],
            &[("App", "Core")],
        );
        let order = g.dependencies_first().unwrap();
        assert_eq!(order[0].name, "Core");
        assert_eq!(order[1].name, "App");
    }

    #[test]
    fn transitive_chains_stay_ordered() {
        // A -> B -> C with no direct A -> C edge; a pairwise comparator
        // would see A and C as unrelated, a real topological sort must not.
        let g = graph(
            vec![source("C"), source("A"), source("B")],
            &[("A", "B"), ("B", "C")],
        );
        let order = g.dependents_first().unwrap();
        assert!(position(&order, "A") < position(&order, "B"));
        assert!(position(&order, "B") < position(&order, "C"));
    }

    #[test]
    fn independent_projects_keep_discovery_order() {
        let g = graph(vec![source("Beta"), source("Alpha")], &[]);
        let first = g.dependents_first().unwrap();
        let second = g.dependents_first().unwrap();
        let names: Vec<&str> = first.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Beta", "Alpha"]);
        assert_eq!(
            names,
            second.iter().map(|p| p.name.as_str()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn unknown_dependency_fails_without_partial_result() {
        let result = ProjectGraph::from_projects_with(vec![source("App")], |_| {
            Ok(vec!["Missing".to_string()])
        });
        let err = result.unwrap_err();
        assert_eq!(err.code.as_str(), "config.unknown_dependency");
        assert!(err.message.contains("App"));
        assert!(err.message.contains("Missing"));
    }

    #[test]
    fn cycle_is_a_configuration_error() {
        let g = graph(
            vec![source("A"), source("B")],
            &[("A", "B"), ("B", "A")],
        );
        let err = g.dependents_first().unwrap_err();
        assert_eq!(err.code.as_str(), "config.dependency_cycle");
        assert!(err.message.contains('A'));
        assert!(err.message.contains('B'));
    }

    #[test]
    fn entity_projects_contribute_no_edges() {
        let entity = Project {
            name: "CoreTypes".to_string(),
            path: PathBuf::from("CoreTypes"),
            kind: ProjectKind::Entity,
        };
        let g = ProjectGraph::from_projects_with(vec![entity, source("App")], |p| {
            if p.is_source() {
                Ok(vec!["CoreTypes".to_string()])
            } else {
                panic!("dependency reader must not be called for entity projects");
            }
        })
        .unwrap();
        assert_eq!(g.edges().len(), 1);
        assert_eq!(g.edges()[0].dependent, "App");
    }
}
