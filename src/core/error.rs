use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingFile,
    ConfigInvalidJson,
    ConfigInvalidValue,
    ConfigAuthMissing,
    ConfigUnknownDependency,
    ConfigDependencyCycle,

    ValidationMissingArgument,
    ValidationInvalidArgument,

    ProjectNotFound,

    CompileFailed,
    PackageWriteFailed,

    RemoteTransportFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingFile => "config.missing_file",
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",
            ErrorCode::ConfigAuthMissing => "config.auth_missing",
            ErrorCode::ConfigUnknownDependency => "config.unknown_dependency",
            ErrorCode::ConfigDependencyCycle => "config.dependency_cycle",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::ProjectNotFound => "project.not_found",

            ErrorCode::CompileFailed => "compile.failed",
            ErrorCode::PackageWriteFailed => "package.write_failed",

            ErrorCode::RemoteTransportFailed => "remote.transport_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    /// Whether the failure is a configuration problem (always fatal, never
    /// a remote or per-item condition).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ErrorCode::ConfigMissingFile
                | ErrorCode::ConfigInvalidJson
                | ErrorCode::ConfigInvalidValue
                | ErrorCode::ConfigAuthMissing
                | ErrorCode::ConfigUnknownDependency
                | ErrorCode::ConfigDependencyCycle
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnknownDependencyDetails {
    pub dependent: String,
    pub dependency: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyCycleDetails {
    pub projects: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileFailedDetails {
    pub project: String,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTransportDetails {
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: hint.into(),
        });
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    pub fn config_missing_file(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigMissingFile,
            format!("Configuration file not found: {}", path),
            serde_json::json!({ "path": path }),
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigInvalidJson,
            format!("Invalid JSON in {}", path),
            serde_json::json!({ "path": path, "error": err.to_string() }),
        )
    }

    pub fn config_invalid_value(key: impl Into<String>, problem: impl Into<String>) -> Self {
        let key = key.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid configuration value for '{}': {}", key, problem),
            serde_json::json!({ "key": key, "problem": problem }),
        )
    }

    pub fn config_auth_missing() -> Self {
        Self::new(
            ErrorCode::ConfigAuthMissing,
            "No server credentials configured",
            Value::Null,
        )
        .with_hint("Set SHIPWRIGHT_APP_KEY, or SHIPWRIGHT_USER and SHIPWRIGHT_PASSWORD")
        .with_hint("Credentials may also be set under 'server' in shipwright.json")
    }

    pub fn config_auth_ambiguous() -> Self {
        Self::new(
            ErrorCode::ConfigAuthMissing,
            "Both app key and basic credentials configured; exactly one is required",
            Value::Null,
        )
        .with_hint("Unset either SHIPWRIGHT_APP_KEY or SHIPWRIGHT_USER/SHIPWRIGHT_PASSWORD")
    }

    pub fn config_unknown_dependency(
        dependent: impl Into<String>,
        dependency: impl Into<String>,
    ) -> Self {
        let dependent = dependent.into();
        let dependency = dependency.into();
        let message = format!(
            "Project {} depends on project {} which does not exist",
            dependent, dependency
        );
        let details = serde_json::to_value(UnknownDependencyDetails {
            dependent,
            dependency,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(ErrorCode::ConfigUnknownDependency, message, details)
    }

    pub fn config_dependency_cycle(projects: Vec<String>) -> Self {
        let message = format!(
            "Project dependencies form a cycle: {}",
            projects.join(" -> ")
        );
        let details = serde_json::to_value(DependencyCycleDetails { projects })
            .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(ErrorCode::ConfigDependencyCycle, message, details)
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        let details = serde_json::to_value(MissingArgumentDetails { args })
            .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            details,
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        value: Option<String>,
    ) -> Self {
        let details = serde_json::to_value(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            value,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn project_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::ProjectNotFound,
            format!("Project not found: {}", name),
            serde_json::json!({ "name": name }),
        )
        .with_hint("Project names must match directories under the sources root")
    }

    pub fn compile_failed(project: impl Into<String>, errors: Vec<String>) -> Self {
        let project = project.into();
        let message = format!("Compilation failed for project '{}'", project);
        let details = serde_json::to_value(CompileFailedDetails { project, errors })
            .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(ErrorCode::CompileFailed, message, details)
    }

    pub fn package_write_failed(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::PackageWriteFailed,
            format!("Failed to write archive {}", path),
            serde_json::json!({ "path": path, "error": err.to_string() }),
        )
    }

    pub fn remote_transport(
        endpoint: impl Into<String>,
        status: Option<u16>,
        error: impl Into<String>,
    ) -> Self {
        let details = serde_json::to_value(RemoteTransportDetails {
            endpoint: endpoint.into(),
            status,
            error: error.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        let message = match status {
            Some(code) => format!("Server request failed: HTTP {}", code),
            None => "Server request failed".to_string(),
        };
        Self::new(ErrorCode::RemoteTransportFailed, message, details)
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "I/O error",
            serde_json::json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            serde_json::json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalUnexpected, message, Value::Null)
    }
}
