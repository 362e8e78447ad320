//! Per-invocation command context.
//!
//! All state a pipeline run needs is resolved once, up front, and carried in
//! a [`CommandContext`] that is passed to every component. There are no
//! process-wide caches; two invocations in one process see independent
//! state.

use std::path::{Path, PathBuf};

use crate::config::{self, WorkspaceConfig};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct CommandContext {
    pub workspace_root: PathBuf,
    pub config: WorkspaceConfig,
}

impl CommandContext {
    /// Resolve the context for the current working directory.
    pub fn for_cwd() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| crate::error::Error::internal_io(e.to_string(), None))?;
        Self::load(&cwd)
    }

    /// Resolve the context for an explicit workspace root.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let config = config::load(workspace_root)?;
        Ok(Self {
            workspace_root: workspace_root.to_path_buf(),
            config,
        })
    }

    pub fn sources_root(&self) -> PathBuf {
        config::sources_root(&self.workspace_root, &self.config)
    }

    /// Compiled entity output directory for one project.
    pub fn build_dir(&self, project_name: &str) -> PathBuf {
        self.workspace_root.join("build").join(project_name)
    }

    /// Directory receiving packaged artifacts.
    pub fn zip_dir(&self) -> PathBuf {
        self.workspace_root.join("zip")
    }

    /// Display name of the workspace, used for combined artifact names in
    /// multi-project mode where `projectName` is the `@auto` sentinel.
    pub fn workspace_name(&self) -> String {
        if self.config.is_multi_project() {
            self.workspace_root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "workspace".to_string())
        } else {
            self.config.project_name.clone()
        }
    }

    /// Artifact package name for one project (also the remote package name
    /// used for removal).
    pub fn package_name(&self, project_name: &str) -> String {
        project_name.to_string()
    }

    /// Artifact file name for one project at the current stored version.
    pub fn artifact_file_name(&self, project_name: &str) -> String {
        format!("{}-{}.zip", project_name, self.config.version)
    }

    /// Reload the stored config from disk (after a version bump).
    pub fn reload(&mut self) -> Result<()> {
        self.config = config::load(&self.workspace_root)?;
        Ok(())
    }
}
