//! Seam to the external source-to-entity transformer.
//!
//! The transformer itself is an opaque collaborator: given a project
//! directory and flags it emits entity documents, diagnostics, and the
//! deployment endpoints it found in source annotations. The orchestrator
//! invokes it as a subprocess and reads a JSON report from stdout; the
//! [`EntityTransformer`] trait exists so pipeline behavior is testable
//! without the real toolchain installed.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::CommandContext;
use crate::error::{Error, Result};
use crate::project::Project;
use crate::utils::command::{run_captured, split_command_line};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// One-line rendering: `file:line:column: severity: message`.
    pub fn render(&self) -> String {
        let location = match (&self.file, self.line, self.column) {
            (Some(file), Some(line), Some(column)) => format!("{}:{}:{}: ", file, line, column),
            (Some(file), Some(line), None) => format!("{}:{}: ", file, line),
            (Some(file), _, _) => format!("{}: ", file),
            _ => String::new(),
        };
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        format!("{}{}: {}", location, severity, self.message)
    }
}

/// Kind of entity a deployment endpoint targets.
///
/// Server responses and transformer reports name kinds as strings; anything
/// unrecognized maps to `Unsupported` rather than silently falling through
/// a default branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Instance,
    Template,
    Shape,
    Unsupported(String),
}

impl EntityKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "Instance" => EntityKind::Instance,
            "Template" => EntityKind::Template,
            "Shape" => EntityKind::Shape,
            other => EntityKind::Unsupported(other.to_string()),
        }
    }

    /// Server-side collection name for REST paths.
    pub fn collection(&self) -> Option<&str> {
        match self {
            EntityKind::Instance => Some("Instances"),
            EntityKind::Template => Some("Templates"),
            EntityKind::Shape => Some("Shapes"),
            EntityKind::Unsupported(_) => None,
        }
    }

    /// Whether invocation fans out to every implementing instance instead
    /// of targeting the named entity itself.
    pub fn fans_out(&self) -> bool {
        matches!(self, EntityKind::Template | EntityKind::Shape)
    }
}

impl<'de> Deserialize<'de> for EntityKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(EntityKind::parse(&name))
    }
}

/// A post-upload service invocation target recorded during compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentEndpoint {
    pub kind: EntityKind,
    pub entity: String,
    pub service: String,
}

/// What one transformer invocation produced.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileReport {
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default)]
    pub endpoints: Vec<DeploymentEndpoint>,
    #[serde(default)]
    pub emitted_files: Vec<String>,
}

impl CompileReport {
    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error()).collect()
    }

    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error()).collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub debug: bool,
    pub trace: bool,
}

pub trait EntityTransformer {
    /// Declarations-only mode: regenerate the project's ambient declaration
    /// file for the local editing environment. No entity documents emitted.
    fn emit_declarations(&self, project: &Project) -> Result<CompileReport>;

    /// Full emit: compile the project's sources into entity documents under
    /// the project's build directory.
    fn compile(&self, project: &Project, options: &CompileOptions) -> Result<CompileReport>;
}

/// Production transformer: shells out to the configured command.
pub struct CommandTransformer {
    program: String,
    base_args: Vec<String>,
    workspace_root: std::path::PathBuf,
}

impl CommandTransformer {
    pub fn from_context(ctx: &CommandContext) -> Result<Self> {
        let (program, base_args) = split_command_line(&ctx.config.transformer.command)?;
        Ok(Self {
            program,
            base_args,
            workspace_root: ctx.workspace_root.clone(),
        })
    }

    fn invoke(&self, project: &Project, extra_args: &[String]) -> Result<CompileReport> {
        let mut args = self.base_args.clone();
        args.push("--project".to_string());
        args.push(project.path.display().to_string());
        args.extend(extra_args.iter().cloned());

        let output = run_captured(&self.program, &args, &self.workspace_root)?;

        // The transformer reports diagnostics in-band; a failing exit with a
        // parseable report still surfaces those diagnostics to the caller.
        match parse_report(&output.stdout) {
            Some(report) if output.success => Ok(report),
            Some(report) => {
                let mut errors: Vec<String> =
                    report.errors().iter().map(|d| d.render()).collect();
                if errors.is_empty() {
                    errors.push(output.error_text().trim().to_string());
                }
                Err(Error::compile_failed(project.name.clone(), errors))
            }
            None => Err(Error::compile_failed(
                project.name.clone(),
                vec![format!(
                    "transformer produced no parseable report (exit {}): {}",
                    output.exit_code,
                    output.error_text().trim()
                )],
            )),
        }
    }
}

fn parse_report(stdout: &str) -> Option<CompileReport> {
    // The report is the last JSON object on stdout; the transformer may
    // print plain progress lines before it.
    let start = stdout.rfind("\n{").map(|i| i + 1).or_else(|| {
        if stdout.trim_start().starts_with('{') {
            Some(stdout.find('{')?)
        } else {
            None
        }
    })?;
    serde_json::from_str(stdout[start..].trim()).ok()
}

impl EntityTransformer for CommandTransformer {
    fn emit_declarations(&self, project: &Project) -> Result<CompileReport> {
        let out = declarations_path(project);
        self.invoke(
            project,
            &[
                "--declarations".to_string(),
                "--out".to_string(),
                out.display().to_string(),
            ],
        )
    }

    fn compile(&self, project: &Project, options: &CompileOptions) -> Result<CompileReport> {
        let mut args = Vec::new();
        if options.debug {
            args.push("--debug".to_string());
        }
        if options.trace {
            args.push("--trace".to_string());
        }
        self.invoke(project, &args)
    }
}

/// Location of the generated ambient declaration artifact for a project.
pub fn declarations_path(project: &Project) -> std::path::PathBuf {
    project.path.join("generated").join("declarations.d.ts")
}

/// Ensure the directory holding the declarations artifact exists.
pub fn ensure_declarations_dir(project: &Project) -> Result<()> {
    let path = declarations_path(project);
    let parent = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)
        .map_err(|e| Error::internal_io(e.to_string(), Some("create declarations dir".to_string())))
}
