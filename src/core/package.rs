//! Artifact packaging: zip a project's compiled output into the unit of
//! upload/removal.
//!
//! Disk failures here are fatal to the pipeline; there is no partial
//! packaging state worth continuing from.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::context::CommandContext;
use crate::error::{Error, Result};
use crate::project::Project;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageMode {
    /// One artifact per project, plus a combined wrapper archive holding
    /// every per-project artifact. The default.
    Separate,
    /// A single artifact containing every project's compiled output.
    Merged,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagedArtifact {
    pub package: String,
    pub path: PathBuf,
}

/// Package compiled output for the ordered project list.
///
/// Returns per-project artifacts in the same (dependents-first) order they
/// were given; the Upload stage reverses them itself.
pub fn package_projects(
    ctx: &CommandContext,
    projects: &[Project],
    mode: PackageMode,
) -> Result<Vec<PackagedArtifact>> {
    let zip_dir = ctx.zip_dir();
    std::fs::create_dir_all(&zip_dir)
        .map_err(|e| Error::package_write_failed(zip_dir.display().to_string(), e))?;

    if mode == PackageMode::Merged {
        let path = zip_dir.join(format!("{}-{}.zip", ctx.workspace_name(), ctx.config.version));
        zip_directory(&ctx.workspace_root.join("build"), &path)?;
        log_status!("package", "Merged artifact: {}", path.display());
        return Ok(vec![PackagedArtifact {
            package: ctx.workspace_name(),
            path,
        }]);
    }

    let mut artifacts = Vec::with_capacity(projects.len());
    for project in projects {
        let build_dir = ctx.build_dir(&project.name);
        let path = zip_dir.join(ctx.artifact_file_name(&project.name));
        zip_directory(&build_dir, &path)?;
        log_status!("package", "Packaged {} -> {}", project.name, path.display());
        artifacts.push(PackagedArtifact {
            package: ctx.package_name(&project.name),
            path,
        });
    }

    // Wrapper archive bundling the per-project zips, handy for importing
    // the whole repository through a single upload form.
    let wrapper = zip_dir.join(format!("{}-{}.zip", ctx.workspace_name(), ctx.config.version));
    zip_files(
        &artifacts.iter().map(|a| a.path.clone()).collect::<Vec<_>>(),
        &wrapper,
    )?;
    log_status!("package", "Combined archive: {}", wrapper.display());

    Ok(artifacts)
}

/// Bundle prepared third-party extension archives (`extensions/*.zip` under
/// the workspace root) into one `extensions.zip` for the `--extensions`
/// upload. Returns `None` when there is nothing to bundle.
pub fn bundle_extensions(ctx: &CommandContext) -> Result<Option<PackagedArtifact>> {
    let extensions_dir = ctx.workspace_root.join("extensions");
    if !extensions_dir.is_dir() {
        return Ok(None);
    }

    let pattern = extensions_dir.join("*.zip");
    let mut archives: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .map_err(|e| {
            Error::internal_unexpected(format!("invalid extensions glob: {}", e))
        })?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();
    archives.sort();

    if archives.is_empty() {
        return Ok(None);
    }

    let path = ctx.zip_dir().join("extensions.zip");
    std::fs::create_dir_all(ctx.zip_dir())
        .map_err(|e| Error::package_write_failed(path.display().to_string(), e))?;
    zip_files(&archives, &path)?;

    Ok(Some(PackagedArtifact {
        package: "extensions".to_string(),
        path,
    }))
}

/// Zip a directory tree, preserving relative paths. Default deflate
/// options apply to every entry.
pub fn zip_directory(src_dir: &Path, dest: &Path) -> Result<()> {
    if !src_dir.is_dir() {
        return Err(Error::package_write_failed(
            dest.display().to_string(),
            format!("source directory does not exist: {}", src_dir.display()),
        ));
    }

    let file = File::create(dest)
        .map_err(|e| Error::package_write_failed(dest.display().to_string(), e))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default();

    add_dir_recursive(&mut zip, src_dir, src_dir, options, dest)?;

    zip.finish()
        .map_err(|e| Error::package_write_failed(dest.display().to_string(), e))?;
    Ok(())
}

fn add_dir_recursive(
    zip: &mut ZipWriter<File>,
    root: &Path,
    dir: &Path,
    options: FileOptions,
    dest: &Path,
) -> Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| Error::package_write_failed(dest.display().to_string(), e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        let relative = path
            .strip_prefix(root)
            .map_err(|e| Error::package_write_failed(dest.display().to_string(), e))?
            .to_string_lossy()
            .replace('\\', "/");

        if path.is_dir() {
            zip.add_directory(format!("{}/", relative), options)
                .map_err(|e| Error::package_write_failed(dest.display().to_string(), e))?;
            add_dir_recursive(zip, root, &path, options, dest)?;
        } else {
            zip.start_file(relative, options)
                .map_err(|e| Error::package_write_failed(dest.display().to_string(), e))?;
            let content = std::fs::read(&path)
                .map_err(|e| Error::package_write_failed(dest.display().to_string(), e))?;
            zip.write_all(&content)
                .map_err(|e| Error::package_write_failed(dest.display().to_string(), e))?;
        }
    }

    Ok(())
}

/// Zip a flat list of files by basename into one archive.
fn zip_files(files: &[PathBuf], dest: &Path) -> Result<()> {
    let file = File::create(dest)
        .map_err(|e| Error::package_write_failed(dest.display().to_string(), e))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default();

    for path in files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::package_write_failed(
                    dest.display().to_string(),
                    format!("archive member has no file name: {}", path.display()),
                )
            })?;
        zip.start_file(name, options)
            .map_err(|e| Error::package_write_failed(dest.display().to_string(), e))?;
        let content = std::fs::read(path)
            .map_err(|e| Error::package_write_failed(dest.display().to_string(), e))?;
        zip.write_all(&content)
            .map_err(|e| Error::package_write_failed(dest.display().to_string(), e))?;
    }

    zip.finish()
        .map_err(|e| Error::package_write_failed(dest.display().to_string(), e))?;
    Ok(())
}

/// Extract an archive into a directory. Used to verify packaged artifacts
/// reproduce the compiled tree exactly.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)
        .map_err(|e| Error::internal_io(e.to_string(), Some("open archive".to_string())))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| Error::internal_io(e.to_string(), Some("read archive".to_string())))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| Error::internal_io(e.to_string(), Some("read archive entry".to_string())))?;
        let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            continue; // refuse entries escaping the destination
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| Error::internal_io(e.to_string(), Some("extract dir".to_string())))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::internal_io(e.to_string(), Some("extract dir".to_string())))?;
        }
        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| Error::internal_io(e.to_string(), Some("extract file".to_string())))?;
        std::fs::write(&out_path, content)
            .map_err(|e| Error::internal_io(e.to_string(), Some("extract file".to_string())))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn collect_files(root: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut files = BTreeMap::new();
        collect_into(root, root, &mut files);
        files
    }

    fn collect_into(root: &Path, dir: &Path, files: &mut BTreeMap<String, Vec<u8>>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                collect_into(root, &path, files);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_string_lossy().to_string();
                files.insert(relative, std::fs::read(&path).unwrap());
            }
        }
    }

    #[test]
    fn zip_round_trip_preserves_tree_byte_for_byte() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("build");
        std::fs::create_dir_all(src.join("Entities/Things")).unwrap();
        std::fs::write(src.join("metadata.xml"), b"<Entities/>").unwrap();
        std::fs::write(
            src.join("Entities/Things/Things_Sensor.xml"),
            vec![0u8, 159, 146, 150, 255],
        )
        .unwrap();

        let archive = dir.path().join("artifact.zip");
        zip_directory(&src, &archive).unwrap();

        let out = dir.path().join("unpacked");
        extract_archive(&archive, &out).unwrap();

        assert_eq!(collect_files(&src), collect_files(&out));
    }

    #[test]
    fn zip_directory_fails_for_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = zip_directory(
            &dir.path().join("no-such-build"),
            &dir.path().join("out.zip"),
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "package.write_failed");
    }

    #[test]
    fn bundle_extensions_skips_empty_workspace() {
        let dir = TempDir::new().unwrap();
        let ctx = crate::project::multi_project_ctx(&dir);
        assert!(bundle_extensions(&ctx).unwrap().is_none());
    }

    #[test]
    fn bundle_extensions_collects_prepared_archives() {
        let dir = TempDir::new().unwrap();
        let ctx = crate::project::multi_project_ctx(&dir);

        let ext_dir = dir.path().join("extensions");
        std::fs::create_dir_all(&ext_dir).unwrap();
        // Any zip content works; the bundle stores archives verbatim.
        std::fs::write(ext_dir.join("widgets.zip"), b"PK\x05\x06stub").unwrap();
        std::fs::write(ext_dir.join("README.md"), b"not an archive").unwrap();

        let bundle = bundle_extensions(&ctx).unwrap().unwrap();
        assert_eq!(bundle.package, "extensions");
        assert!(bundle.path.ends_with("zip/extensions.zip"));

        let out = dir.path().join("unpacked");
        extract_archive(&bundle.path, &out).unwrap();
        assert!(out.join("widgets.zip").exists());
        assert!(!out.join("README.md").exists());
    }
}
