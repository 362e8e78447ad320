//! Staged build and deployment pipeline.
//!
//! A run executes a fixed stage sequence over the workspace's project
//! graph. Ordering is directional per stage: Compile, Package and Remove
//! walk the graph dependents-first, Upload walks it dependencies-first so
//! the server always sees a package's dependencies before the package
//! itself.
//!
//! Failure handling is also per stage. Configuration and compile errors
//! abort the run before anything touches the server. Removal and deploy
//! failures are recorded per item and the run continues. An upload rejected
//! by the server's import report is recorded and the run continues; a
//! transport failure during upload aborts the remaining uploads and the
//! deploy stage, because the remote state is no longer known.

use serde::Serialize;

use crate::api::{InvokeOutcome, RemoteOps, RemovalOutcome, UploadOutcome};
use crate::context::CommandContext;
use crate::error::{Error, Result};
use crate::graph::ProjectGraph;
use crate::package::{self, PackageMode, PackagedArtifact};
use crate::project::{self, Project, ProjectKind};
use crate::transformer::{CompileOptions, DeploymentEndpoint, EntityTransformer};
use crate::utils::io;
use crate::version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BumpVersion,
    Declarations,
    Compile,
    Package,
    Remove,
    Upload,
    Deploy,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub merged: bool,
    pub debug: bool,
    pub trace: bool,
    pub retain_version: bool,
    pub include_extensions: bool,
    /// Comma-separated project filter, already split into names.
    pub projects: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileSummary {
    pub project: String,
    pub warnings: Vec<String>,
    pub emitted_files: usize,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub version: String,
    /// Dependents-first project order the run operated on.
    pub order: Vec<String>,
    /// Rendered diagnostics from projects whose declarations build failed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub declaration_failures: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compiled: Vec<CompileSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PackagedArtifact>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removals: Vec<RemovalOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub uploads: Vec<UploadOutcome>,
    /// Set when a transport failure stopped the upload sequence early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_aborted: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deployments: Vec<InvokeOutcome>,
}

impl PipelineOutcome {
    /// Whether every recorded operation succeeded. Compile and Package
    /// cannot produce a partially-failed outcome; they abort instead.
    pub fn success(&self) -> bool {
        self.declaration_failures.is_empty()
            && self.upload_aborted.is_none()
            && self.uploads.iter().all(|u| u.success)
            && self.removals.iter().all(|r| r.success)
            && self.deployments.iter().all(|d| d.success)
    }
}

pub struct Pipeline<'a> {
    transformer: &'a dyn EntityTransformer,
    remote: Option<&'a dyn RemoteOps>,
    options: PipelineOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        transformer: &'a dyn EntityTransformer,
        remote: Option<&'a dyn RemoteOps>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            transformer,
            remote,
            options,
        }
    }

    /// Run the given stages in order over the workspace.
    pub fn run(&self, ctx: &mut CommandContext, stages: &[Stage]) -> Result<PipelineOutcome> {
        let graph = ProjectGraph::discover(ctx)?;
        let filter = self.options.projects.clone();

        let forward = project::apply_filter(graph.dependents_first()?, &filter)?;
        let reverse = project::apply_filter(graph.dependencies_first()?, &filter)?;

        let mut outcome = PipelineOutcome {
            version: ctx.config.version.clone(),
            order: forward.iter().map(|p| p.name.clone()).collect(),
            ..PipelineOutcome::default()
        };
        let mut endpoints: Vec<DeploymentEndpoint> = Vec::new();

        for stage in stages {
            match stage {
                Stage::BumpVersion => self.run_bump(ctx, &mut outcome)?,
                Stage::Declarations => self.run_declarations(&forward, &mut outcome)?,
                Stage::Compile => {
                    self.run_compile(ctx, &forward, &mut outcome, &mut endpoints)?
                }
                Stage::Package => self.run_package(ctx, &forward, &mut outcome)?,
                Stage::Remove => self.run_remove(ctx, &forward, &mut outcome)?,
                Stage::Upload => self.run_upload(ctx, &reverse, &mut outcome)?,
                Stage::Deploy => self.run_deploy(&endpoints, &mut outcome)?,
            }
        }

        Ok(outcome)
    }

    fn remote(&self) -> Result<&'a dyn RemoteOps> {
        self.remote.ok_or_else(|| {
            Error::internal_unexpected("remote stage requested without a server client")
        })
    }

    fn run_bump(&self, ctx: &mut CommandContext, outcome: &mut PipelineOutcome) -> Result<()> {
        if self.options.retain_version {
            return Ok(());
        }
        let bumped = version::bump_patch(ctx)?;
        outcome.version = bumped.clone();
        log_status!("version", "Version bumped to {}", bumped);
        Ok(())
    }

    // Best effort: a project whose declarations fail is recorded and the
    // remaining projects still get theirs refreshed.
    fn run_declarations(&self, forward: &[Project], outcome: &mut PipelineOutcome) -> Result<()> {
        for project in forward.iter().filter(|p| p.is_source()) {
            crate::transformer::ensure_declarations_dir(project)?;
            let errors = match self.transformer.emit_declarations(project) {
                Ok(report) => report.errors().iter().map(|d| d.render()).collect::<Vec<_>>(),
                Err(e) => vec![e.message],
            };
            if errors.is_empty() {
                log_status!("declarations", "Declarations refreshed for {}", project.name);
            } else {
                for error in &errors {
                    log_status!("declarations", "{}: {}", project.name, error);
                }
                outcome
                    .declaration_failures
                    .extend(errors.into_iter().map(|e| format!("{}: {}", project.name, e)));
            }
        }
        Ok(())
    }

    fn run_compile(
        &self,
        ctx: &CommandContext,
        forward: &[Project],
        outcome: &mut PipelineOutcome,
        endpoints: &mut Vec<DeploymentEndpoint>,
    ) -> Result<()> {
        let options = CompileOptions {
            debug: self.options.debug,
            trace: self.options.trace,
        };

        for project in forward {
            match project.kind {
                ProjectKind::Entity => {
                    io::copy_dir_recursive(
                        &project.path,
                        &ctx.build_dir(&project.name),
                        "stage entity project",
                    )?;
                    log_status!("compile", "Staged entity project {}", project.name);
                    outcome.compiled.push(CompileSummary {
                        project: project.name.clone(),
                        warnings: Vec::new(),
                        emitted_files: 0,
                    });
                }
                ProjectKind::Source => {
                    let report = self.transformer.compile(project, &options)?;
                    let errors: Vec<String> =
                        report.errors().iter().map(|d| d.render()).collect();
                    // An error aborts right here. Later projects stay
                    // uncompiled and nothing reaches the packaging stage.
                    if !errors.is_empty() {
                        return Err(Error::compile_failed(project.name.clone(), errors));
                    }
                    let warnings: Vec<String> =
                        report.warnings().iter().map(|d| d.render()).collect();
                    for warning in &warnings {
                        log_status!("compile", "{}: {}", project.name, warning);
                    }
                    endpoints.extend(report.endpoints.iter().cloned());
                    outcome.compiled.push(CompileSummary {
                        project: project.name.clone(),
                        warnings,
                        emitted_files: report.emitted_files.len(),
                    });
                    log_status!("compile", "Compiled {}", project.name);
                }
            }
        }

        dedupe_endpoints(endpoints);
        Ok(())
    }

    fn run_package(
        &self,
        ctx: &CommandContext,
        forward: &[Project],
        outcome: &mut PipelineOutcome,
    ) -> Result<()> {
        let mode = if self.options.merged {
            PackageMode::Merged
        } else {
            PackageMode::Separate
        };
        outcome.artifacts = package::package_projects(ctx, forward, mode)?;
        Ok(())
    }

    fn run_remove(
        &self,
        ctx: &CommandContext,
        forward: &[Project],
        outcome: &mut PipelineOutcome,
    ) -> Result<()> {
        let remote = self.remote()?;
        let packages: Vec<String> = if self.options.merged {
            vec![ctx.workspace_name()]
        } else {
            forward.iter().map(|p| ctx.package_name(&p.name)).collect()
        };

        for package in packages {
            let removal = match remote.remove_artifact(&package) {
                Ok(removal) => removal,
                // Removal is best-effort: the package may not exist yet.
                Err(e) => RemovalOutcome {
                    package: package.clone(),
                    success: false,
                    detail: Some(e.message),
                },
            };
            if !removal.success {
                log_status!(
                    "remove",
                    "Could not remove {}: {}",
                    removal.package,
                    removal.detail.as_deref().unwrap_or("unknown error")
                );
            } else {
                log_status!("remove", "Removed {}", removal.package);
            }
            outcome.removals.push(removal);
        }
        Ok(())
    }

    fn run_upload(
        &self,
        ctx: &CommandContext,
        reverse: &[Project],
        outcome: &mut PipelineOutcome,
    ) -> Result<()> {
        let remote = self.remote()?;

        let mut artifacts: Vec<PackagedArtifact> = Vec::new();
        if self.options.include_extensions {
            if let Some(bundle) = package::bundle_extensions(ctx)? {
                artifacts.push(bundle);
            }
        }
        if self.options.merged {
            artifacts.extend(
                outcome
                    .artifacts
                    .iter()
                    .filter(|a| a.package == ctx.workspace_name())
                    .cloned(),
            );
        } else {
            // Dependencies-first: reorder the packaged artifacts to the
            // reverse project order.
            for project in reverse {
                let package = ctx.package_name(&project.name);
                if let Some(artifact) = outcome.artifacts.iter().find(|a| a.package == package) {
                    artifacts.push(artifact.clone());
                }
            }
        }

        for artifact in artifacts {
            match remote.upload_artifact(&artifact.package, &artifact.path) {
                Ok(upload) => {
                    if upload.success {
                        log_status!("upload", "Uploaded {}", upload.package);
                    } else {
                        log_status!(
                            "upload",
                            "Server rejected {}: {}",
                            upload.package,
                            upload.error.as_deref().unwrap_or("import report failure")
                        );
                    }
                    outcome.uploads.push(upload);
                }
                Err(e) => {
                    log_status!(
                        "upload",
                        "Transport failure uploading {}; aborting remaining uploads",
                        artifact.package
                    );
                    outcome.upload_aborted = Some(e.message);
                    break;
                }
            }
        }
        Ok(())
    }

    fn run_deploy(
        &self,
        endpoints: &[DeploymentEndpoint],
        outcome: &mut PipelineOutcome,
    ) -> Result<()> {
        if outcome.upload_aborted.is_some() {
            log_status!("deploy", "Skipping deploy after aborted upload");
            return Ok(());
        }
        let remote = self.remote()?;

        for endpoint in endpoints {
            if endpoint.kind.fans_out() {
                let instances = match remote.implementing_instances(endpoint) {
                    Ok(instances) => instances,
                    Err(e) => {
                        outcome.deployments.push(InvokeOutcome {
                            target: endpoint.entity.clone(),
                            service: endpoint.service.clone(),
                            success: false,
                            detail: Some(e.message),
                        });
                        continue;
                    }
                };
                for instance in instances {
                    self.invoke_one(remote, "Instances", &instance, &endpoint.service, outcome);
                }
            } else {
                match endpoint.kind.collection() {
                    Some(collection) => self.invoke_one(
                        remote,
                        collection,
                        &endpoint.entity,
                        &endpoint.service,
                        outcome,
                    ),
                    None => {
                        log_status!(
                            "deploy",
                            "Skipping {}: unsupported entity kind",
                            endpoint.entity
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn invoke_one(
        &self,
        remote: &dyn RemoteOps,
        collection: &str,
        entity: &str,
        service: &str,
        outcome: &mut PipelineOutcome,
    ) {
        let invocation = match remote.invoke_service(collection, entity, service) {
            Ok(invocation) => invocation,
            Err(e) => InvokeOutcome {
                target: format!("{}/{}", collection, entity),
                service: service.to_string(),
                success: false,
                detail: Some(e.message),
            },
        };
        if invocation.success {
            log_status!("deploy", "Invoked {}.{}", invocation.target, invocation.service);
        } else {
            log_status!(
                "deploy",
                "Invocation failed for {}.{}: {}",
                invocation.target,
                invocation.service,
                invocation.detail.as_deref().unwrap_or("unknown error")
            );
        }
        outcome.deployments.push(invocation);
    }
}

fn dedupe_endpoints(endpoints: &mut Vec<DeploymentEndpoint>) {
    let mut seen = std::collections::HashSet::new();
    endpoints.retain(|e| {
        seen.insert(format!("{:?}|{}|{}", e.kind, e.entity, e.service))
    });
}

/// Stage list for each pipeline-backed command.
pub fn stages_for_build() -> Vec<Stage> {
    vec![Stage::Declarations, Stage::Compile, Stage::Package]
}

pub fn stages_for_upload(remove_existing: bool) -> Vec<Stage> {
    let mut stages = vec![Stage::BumpVersion];
    stages.extend(stages_for_build());
    if remove_existing {
        stages.push(Stage::Remove);
    }
    stages.push(Stage::Upload);
    stages
}

pub fn stages_for_deploy(remove_existing: bool) -> Vec<Stage> {
    let mut stages = stages_for_upload(remove_existing);
    stages.push(Stage::Deploy);
    stages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::transformer::{CompileReport, Diagnostic, EntityKind, Severity};
    use std::cell::RefCell;
    use std::path::Path;
    use tempfile::TempDir;

    struct ScriptedTransformer {
        /// Error diagnostics keyed by project name.
        failing: Vec<String>,
        /// Warning diagnostics keyed by project name.
        warning_in: Vec<String>,
        endpoints: Vec<DeploymentEndpoint>,
        declaration_runs: RefCell<Vec<String>>,
        compile_runs: RefCell<Vec<String>>,
    }

    impl ScriptedTransformer {
        fn clean() -> Self {
            Self {
                failing: Vec::new(),
                warning_in: Vec::new(),
                endpoints: Vec::new(),
                declaration_runs: RefCell::new(Vec::new()),
                compile_runs: RefCell::new(Vec::new()),
            }
        }

        fn failing(names: &[&str]) -> Self {
            Self {
                failing: names.iter().map(|n| n.to_string()).collect(),
                ..Self::clean()
            }
        }

        fn with_endpoints(endpoints: Vec<DeploymentEndpoint>) -> Self {
            Self {
                endpoints,
                ..Self::clean()
            }
        }
    }

    impl EntityTransformer for ScriptedTransformer {
        fn emit_declarations(&self, project: &Project) -> crate::error::Result<CompileReport> {
            self.declaration_runs.borrow_mut().push(project.name.clone());
            let mut report = CompileReport::default();
            if self.failing.contains(&project.name) {
                report.diagnostics.push(Diagnostic {
                    severity: Severity::Error,
                    message: format!("type error in {}", project.name),
                    file: None,
                    line: None,
                    column: None,
                });
            }
            Ok(report)
        }

        fn compile(
            &self,
            project: &Project,
            _options: &CompileOptions,
        ) -> crate::error::Result<CompileReport> {
            self.compile_runs.borrow_mut().push(project.name.clone());
            let mut report = CompileReport::default();
            if self.failing.contains(&project.name) {
                report.diagnostics.push(Diagnostic {
                    severity: Severity::Error,
                    message: format!("type error in {}", project.name),
                    file: None,
                    line: None,
                    column: None,
                });
            }
            if self.warning_in.contains(&project.name) {
                report.diagnostics.push(Diagnostic {
                    severity: Severity::Warning,
                    message: format!("deprecated construct in {}", project.name),
                    file: None,
                    line: None,
                    column: None,
                });
            }
            report.endpoints = self.endpoints.clone();
            std::fs::create_dir_all(
                project
                    .path
                    .parent()
                    .unwrap()
                    .parent()
                    .unwrap()
                    .join("build")
                    .join(&project.name),
            )
            .unwrap();
            Ok(report)
        }
    }

    #[derive(Default)]
    struct RecordingRemote {
        /// Packages whose upload should fail at the transport level.
        transport_failures: Vec<String>,
        /// Packages whose upload should come back rejected by the report.
        rejected: Vec<String>,
        /// Packages whose removal the server reports as failed.
        removal_failures: Vec<String>,
        uploads: RefCell<Vec<String>>,
        removals: RefCell<Vec<String>>,
        invocations: RefCell<Vec<String>>,
    }

    impl RemoteOps for RecordingRemote {
        fn upload_artifact(
            &self,
            package: &str,
            _artifact: &Path,
        ) -> crate::error::Result<UploadOutcome> {
            if self.transport_failures.contains(&package.to_string()) {
                return Err(crate::error::Error::remote_transport(
                    "ExtensionPackageUploader",
                    Some(502),
                    "bad gateway",
                ));
            }
            self.uploads.borrow_mut().push(package.to_string());
            let rejected = self.rejected.contains(&package.to_string());
            Ok(UploadOutcome {
                package: package.to_string(),
                success: !rejected,
                report_lines: Vec::new(),
                error: rejected.then(|| "validation failed".to_string()),
            })
        }

        fn remove_artifact(&self, package: &str) -> crate::error::Result<RemovalOutcome> {
            self.removals.borrow_mut().push(package.to_string());
            let failed = self.removal_failures.contains(&package.to_string());
            Ok(RemovalOutcome {
                package: package.to_string(),
                success: !failed,
                detail: failed.then(|| "no such package".to_string()),
            })
        }

        fn invoke_service(
            &self,
            collection: &str,
            entity: &str,
            service: &str,
        ) -> crate::error::Result<InvokeOutcome> {
            self.invocations
                .borrow_mut()
                .push(format!("{}/{}/{}", collection, entity, service));
            Ok(InvokeOutcome {
                target: format!("{}/{}", collection, entity),
                service: service.to_string(),
                success: true,
                detail: None,
            })
        }

        fn implementing_instances(
            &self,
            endpoint: &DeploymentEndpoint,
        ) -> crate::error::Result<Vec<String>> {
            assert!(endpoint.kind.fans_out());
            Ok(vec!["ImplA".to_string(), "ImplB".to_string()])
        }
    }

    /// Three projects where Gateway and Reports both depend on CoreTypes.
    /// Dependents-first order: Gateway, Reports, CoreTypes.
    fn workspace() -> (TempDir, CommandContext) {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        crate::project::write_source_project(&src, "Gateway", &["./**/*.ts", "../CoreTypes"]);
        crate::project::write_source_project(&src, "Reports", &["./**/*.ts", "../CoreTypes"]);
        crate::project::write_entity_project(&src, "CoreTypes");
        let ctx = crate::project::multi_project_ctx(&dir);
        (dir, ctx)
    }

    #[test]
    fn compile_error_in_one_project_fails_before_packaging() {
        let (_dir, mut ctx) = workspace();
        let transformer = ScriptedTransformer::failing(&["Reports"]);
        let pipeline = Pipeline::new(&transformer, None, PipelineOptions::default());

        let err = pipeline.run(&mut ctx, &stages_for_build()).unwrap_err();
        assert_eq!(err.code, ErrorCode::CompileFailed);
        assert!(!ctx.zip_dir().exists());
    }

    #[test]
    fn declaration_failure_does_not_stop_other_projects() {
        let (_dir, mut ctx) = workspace();
        let transformer = ScriptedTransformer::failing(&["Gateway"]);
        let pipeline = Pipeline::new(&transformer, None, PipelineOptions::default());

        let outcome = pipeline.run(&mut ctx, &[Stage::Declarations]).unwrap();
        assert_eq!(*transformer.declaration_runs.borrow(), vec!["Gateway", "Reports"]);
        assert_eq!(outcome.declaration_failures.len(), 1);
        assert!(outcome.declaration_failures[0].starts_with("Gateway:"));
        assert!(!outcome.success());
    }

    #[test]
    fn build_packages_every_project_dependents_first() {
        let (_dir, mut ctx) = workspace();
        let transformer = ScriptedTransformer::clean();
        let pipeline = Pipeline::new(&transformer, None, PipelineOptions::default());

        let outcome = pipeline.run(&mut ctx, &stages_for_build()).unwrap();
        assert_eq!(outcome.order, vec!["Gateway", "Reports", "CoreTypes"]);
        assert_eq!(outcome.artifacts.len(), 3);
        assert!(outcome.success());
    }

    #[test]
    fn warnings_alone_do_not_prevent_packaging() {
        let (_dir, mut ctx) = workspace();
        let transformer = ScriptedTransformer {
            warning_in: vec!["Gateway".to_string()],
            ..ScriptedTransformer::clean()
        };
        let pipeline = Pipeline::new(&transformer, None, PipelineOptions::default());

        let outcome = pipeline.run(&mut ctx, &stages_for_build()).unwrap();
        assert_eq!(outcome.artifacts.len(), 3);
        assert_eq!(outcome.compiled[0].warnings.len(), 1);
        assert!(outcome.success());
    }

    #[test]
    fn version_bump_is_skipped_with_retain_flag() {
        let (_dir, mut ctx) = workspace();
        let before = ctx.config.version.clone();
        let transformer = ScriptedTransformer::clean();
        let remote = RecordingRemote::default();

        let options = PipelineOptions {
            retain_version: true,
            ..PipelineOptions::default()
        };
        Pipeline::new(&transformer, Some(&remote), options)
            .run(&mut ctx, &stages_for_upload(false))
            .unwrap();
        assert_eq!(ctx.config.version, before);

        let outcome = Pipeline::new(&transformer, Some(&remote), PipelineOptions::default())
            .run(&mut ctx, &stages_for_upload(false))
            .unwrap();
        assert_ne!(ctx.config.version, before);
        assert_eq!(outcome.version, ctx.config.version);
    }

    #[test]
    fn build_never_bumps_the_version() {
        let (_dir, mut ctx) = workspace();
        let before = ctx.config.version.clone();
        let transformer = ScriptedTransformer::clean();

        Pipeline::new(&transformer, None, PipelineOptions::default())
            .run(&mut ctx, &stages_for_build())
            .unwrap();
        assert_eq!(ctx.config.version, before);
    }

    #[test]
    fn compile_stops_at_the_first_failing_project() {
        let (_dir, mut ctx) = workspace();
        let transformer = ScriptedTransformer::failing(&["Gateway"]);
        let pipeline = Pipeline::new(&transformer, None, PipelineOptions::default());

        let err = pipeline
            .run(&mut ctx, &[Stage::Compile, Stage::Package])
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CompileFailed);
        // Gateway compiles first in dependents-first order; Reports and
        // CoreTypes must never be touched.
        assert_eq!(*transformer.compile_runs.borrow(), vec!["Gateway"]);
        assert!(!ctx.zip_dir().exists());
    }

    #[test]
    fn upload_walks_dependencies_first_and_transport_failure_aborts_rest() {
        let (_dir, mut ctx) = workspace();
        let transformer = ScriptedTransformer::clean();
        // Upload order is CoreTypes, Reports, Gateway; Reports fails at the
        // transport level, so Gateway must never be attempted.
        let remote = RecordingRemote {
            transport_failures: vec!["Reports".to_string()],
            ..RecordingRemote::default()
        };
        let pipeline = Pipeline::new(&transformer, Some(&remote), PipelineOptions::default());

        let outcome = pipeline.run(&mut ctx, &stages_for_upload(false)).unwrap();
        assert_eq!(*remote.uploads.borrow(), vec!["CoreTypes"]);
        assert_eq!(outcome.uploads.len(), 1);
        assert!(outcome.uploads[0].success);
        assert!(outcome.upload_aborted.is_some());
        assert!(!outcome.success());
    }

    #[test]
    fn rejected_upload_is_recorded_and_following_uploads_continue() {
        let (_dir, mut ctx) = workspace();
        let transformer = ScriptedTransformer::clean();
        let remote = RecordingRemote {
            rejected: vec!["CoreTypes".to_string()],
            ..RecordingRemote::default()
        };
        let pipeline = Pipeline::new(&transformer, Some(&remote), PipelineOptions::default());

        let outcome = pipeline.run(&mut ctx, &stages_for_upload(false)).unwrap();
        assert_eq!(
            *remote.uploads.borrow(),
            vec!["CoreTypes", "Reports", "Gateway"]
        );
        assert!(!outcome.uploads[0].success);
        assert!(outcome.uploads[1].success);
        assert!(!outcome.success());
    }

    #[test]
    fn remove_failures_do_not_stop_the_run() {
        let (_dir, mut ctx) = workspace();
        let transformer = ScriptedTransformer::clean();
        let remote = RecordingRemote {
            removal_failures: vec!["Reports".to_string()],
            ..RecordingRemote::default()
        };

        let pipeline = Pipeline::new(&transformer, Some(&remote), PipelineOptions::default());
        let outcome = pipeline.run(&mut ctx, &stages_for_upload(true)).unwrap();

        // Removal walks dependents-first; the Reports failure is recorded
        // but every upload still happens.
        assert_eq!(
            *remote.removals.borrow(),
            vec!["Gateway", "Reports", "CoreTypes"]
        );
        assert!(!outcome.removals[1].success);
        assert_eq!(outcome.uploads.len(), 3);
        assert!(!outcome.success());
    }

    #[test]
    fn deploy_fans_out_templates_to_implementing_instances() {
        let (_dir, mut ctx) = workspace();
        let transformer = ScriptedTransformer::with_endpoints(vec![
            DeploymentEndpoint {
                kind: EntityKind::Instance,
                entity: "Gateway".to_string(),
                service: "AfterDeploy".to_string(),
            },
            DeploymentEndpoint {
                kind: EntityKind::Template,
                entity: "BaseTemplate".to_string(),
                service: "Reindex".to_string(),
            },
        ]);
        let remote = RecordingRemote::default();
        let pipeline = Pipeline::new(&transformer, Some(&remote), PipelineOptions::default());

        let outcome = pipeline.run(&mut ctx, &stages_for_deploy(false)).unwrap();
        let invocations = remote.invocations.borrow();
        assert!(invocations.contains(&"Instances/Gateway/AfterDeploy".to_string()));
        assert!(invocations.contains(&"Instances/ImplA/Reindex".to_string()));
        assert!(invocations.contains(&"Instances/ImplB/Reindex".to_string()));
        assert_eq!(outcome.deployments.len(), 3);
        assert!(outcome.success());
    }

    #[test]
    fn deploy_is_skipped_after_upload_transport_failure() {
        let (_dir, mut ctx) = workspace();
        let transformer = ScriptedTransformer::with_endpoints(vec![DeploymentEndpoint {
            kind: EntityKind::Instance,
            entity: "Gateway".to_string(),
            service: "AfterDeploy".to_string(),
        }]);
        let remote = RecordingRemote {
            transport_failures: vec!["CoreTypes".to_string()],
            ..RecordingRemote::default()
        };
        let pipeline = Pipeline::new(&transformer, Some(&remote), PipelineOptions::default());

        let outcome = pipeline.run(&mut ctx, &stages_for_deploy(false)).unwrap();
        assert!(outcome.upload_aborted.is_some());
        assert!(outcome.deployments.is_empty());
        assert!(remote.invocations.borrow().is_empty());
    }

    #[test]
    fn project_filter_restricts_the_run() {
        let (_dir, mut ctx) = workspace();
        let transformer = ScriptedTransformer::clean();
        let options = PipelineOptions {
            projects: Some(vec!["Gateway".to_string()]),
            ..PipelineOptions::default()
        };
        let pipeline = Pipeline::new(&transformer, None, options);

        let outcome = pipeline.run(&mut ctx, &stages_for_build()).unwrap();
        assert_eq!(outcome.order, vec!["Gateway"]);
    }

    #[test]
    fn unknown_filter_name_is_rejected() {
        let (_dir, mut ctx) = workspace();
        let transformer = ScriptedTransformer::clean();
        let options = PipelineOptions {
            projects: Some(vec!["Nope".to_string()]),
            ..PipelineOptions::default()
        };
        let err = Pipeline::new(&transformer, None, options)
            .run(&mut ctx, &stages_for_build())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ProjectNotFound);
    }
}
