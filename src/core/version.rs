//! Workspace version bumping.
//!
//! The version lives in the workspace config and is stamped into every
//! artifact file name. The bump is persisted before compilation starts and
//! is not rolled back if a later stage fails.

use semver::Version;

use crate::config;
use crate::context::CommandContext;
use crate::error::{Error, Result};

/// Increment the workspace patch version and persist it.
///
/// Returns the new version string. The config on disk and the in-memory
/// context are both updated.
pub fn bump_patch(ctx: &mut CommandContext) -> Result<String> {
    let mut version = parse(&ctx.config.version)?;
    version.patch += 1;
    let bumped = version.to_string();

    ctx.config.version = bumped.clone();
    config::save(&ctx.workspace_root, &ctx.config)?;
    Ok(bumped)
}

fn parse(raw: &str) -> Result<Version> {
    Version::parse(raw).map_err(|e| {
        Error::config_invalid_value("version", format!("'{}' is not a semantic version: {}", raw, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkspaceConfig;
    use tempfile::TempDir;

    fn ctx_with_version(dir: &TempDir, version: &str) -> CommandContext {
        let config = WorkspaceConfig {
            project_name: "Gateway".to_string(),
            version: version.to_string(),
            server: Default::default(),
            transformer: Default::default(),
            entity_collections: Default::default(),
            sources_root: "src".to_string(),
        };
        config::save(dir.path(), &config).unwrap();
        CommandContext::load(dir.path()).unwrap()
    }

    #[test]
    fn bump_increments_patch_and_persists() {
        let dir = TempDir::new().unwrap();
        let mut ctx = ctx_with_version(&dir, "1.2.3");

        let bumped = bump_patch(&mut ctx).unwrap();
        assert_eq!(bumped, "1.2.4");
        assert_eq!(ctx.config.version, "1.2.4");

        let reloaded = config::load(dir.path()).unwrap();
        assert_eq!(reloaded.version, "1.2.4");
    }

    #[test]
    fn non_semver_version_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut ctx = ctx_with_version(&dir, "1.2");

        let err = bump_patch(&mut ctx).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }
}
