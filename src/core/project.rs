//! Project discovery and per-project compiler configuration.
//!
//! A workspace in multi-project mode keeps one directory per project under
//! the sources root. A directory containing `tsconfig.json` is a source
//! project (requires the external transformer); a directory containing
//! `entities.json` is an entity project whose files are importable as-is.
//! Anything else is ignored. Discovery never recurses past one level.

#[cfg(test)]
use std::path::Path;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::context::CommandContext;
use crate::error::{Error, Result};
use crate::utils::io;

pub const SOURCE_PROJECT_MARKER: &str = "tsconfig.json";
pub const ENTITY_PROJECT_MARKER: &str = "entities.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectKind {
    /// Requires compilation via the external transformer.
    Source,
    /// Files are already in the importable entity format.
    Entity,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    #[serde(skip_serializing)]
    pub path: PathBuf,
    pub kind: ProjectKind,
}

impl Project {
    pub fn is_source(&self) -> bool {
        self.kind == ProjectKind::Source
    }
}

/// Subset of a project's `tsconfig.json` the orchestrator cares about.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerConfig {
    #[serde(default)]
    pub include: Vec<String>,
}

/// Discover all projects under the sources root, sorted by name.
///
/// Sorting makes discovery order deterministic across platforms; the
/// dependency sort uses it as the tie-break for unrelated projects.
pub fn discover_projects(ctx: &CommandContext) -> Result<Vec<Project>> {
    let sources_root = ctx.sources_root();

    if !ctx.config.is_multi_project() {
        // Single-project mode: the sources root itself is the one project.
        return Ok(vec![Project {
            name: ctx.config.project_name.clone(),
            path: sources_root,
            kind: ProjectKind::Source,
        }]);
    }

    if !sources_root.is_dir() {
        return Err(Error::config_invalid_value(
            "sourcesRoot",
            format!("sources root does not exist: {}", sources_root.display()),
        ));
    }

    let mut projects = Vec::new();
    let entries = std::fs::read_dir(&sources_root)
        .map_err(|e| Error::internal_io(e.to_string(), Some("scan sources root".to_string())))?;

    for entry in entries {
        let entry =
            entry.map_err(|e| Error::internal_io(e.to_string(), Some("scan sources root".to_string())))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };

        if path.join(SOURCE_PROJECT_MARKER).is_file() {
            projects.push(Project {
                name,
                path,
                kind: ProjectKind::Source,
            });
        } else if path.join(ENTITY_PROJECT_MARKER).is_file() {
            projects.push(Project {
                name,
                path,
                kind: ProjectKind::Entity,
            });
        }
    }

    projects.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(projects)
}

/// Read a source project's compiler configuration.
pub fn read_compiler_config(project: &Project) -> Result<CompilerConfig> {
    let path = project.path.join(SOURCE_PROJECT_MARKER);
    let content = io::read_file(&path, "read project compiler config")?;
    serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))
}

/// Extract sibling-project dependency names from an include list.
///
/// A dependency declaration is exactly `"../<Name>"`: one parent step, a
/// bare directory name, no wildcards, no extension, no further segments.
/// Everything else in the include list is a plain source glob and ignored.
pub fn sibling_dependencies(include: &[String]) -> Vec<String> {
    include
        .iter()
        .filter_map(|entry| {
            let name = entry.strip_prefix("../")?;
            if name.is_empty()
                || name.contains('/')
                || name.contains('\\')
                || name.contains('*')
                || name.contains('?')
                || name.contains('.')
            {
                return None;
            }
            Some(name.to_string())
        })
        .collect()
}

/// Parse a `--projects` allow-list argument.
///
/// `None` (flag absent) and an all-whitespace value both mean "no filter",
/// which is distinct from an empty list ("build nothing" never occurs).
/// Entries are trimmed and empty entries dropped.
pub fn parse_project_filter(arg: Option<&str>) -> Option<Vec<String>> {
    let arg = arg?;
    let names: Vec<String> = arg
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}

/// Apply a parsed filter to an ordered project list, preserving order.
///
/// Filter names that match no discovered project are an error rather than a
/// silent no-op.
pub fn apply_filter(projects: Vec<Project>, filter: &Option<Vec<String>>) -> Result<Vec<Project>> {
    let Some(names) = filter else {
        return Ok(projects);
    };

    for name in names {
        if !projects.iter().any(|p| &p.name == name) {
            return Err(Error::project_not_found(name.clone()));
        }
    }

    Ok(projects
        .into_iter()
        .filter(|p| names.contains(&p.name))
        .collect())
}

/// Write a project scaffold for tests and fixtures.
#[cfg(test)]
pub(crate) fn write_source_project(root: &Path, name: &str, include: &[&str]) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    let config = serde_json::json!({ "include": include });
    std::fs::write(dir.join(SOURCE_PROJECT_MARKER), config.to_string()).unwrap();
}

#[cfg(test)]
pub(crate) fn write_entity_project(root: &Path, name: &str) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(ENTITY_PROJECT_MARKER), "{\"entities\": []}").unwrap();
}

/// Multi-project test context rooted at a temp directory.
#[cfg(test)]
pub(crate) fn multi_project_ctx(dir: &tempfile::TempDir) -> CommandContext {
    use crate::config::{TransformerConfig, WorkspaceConfig, MULTI_PROJECT_SENTINEL};

    CommandContext {
        workspace_root: dir.path().to_path_buf(),
        config: WorkspaceConfig {
            project_name: MULTI_PROJECT_SENTINEL.to_string(),
            version: "1.0.0".to_string(),
            server: Default::default(),
            transformer: TransformerConfig::default(),
            entity_collections: std::collections::HashMap::new(),
            sources_root: "src".to_string(),
        },
    }
}
