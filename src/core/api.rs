//! Remote management API client.
//!
//! Every call is fire-once: no retry, no backoff, transport defaults only.
//! The split between transport failures (`Err`) and server-reported
//! rejections (an unsuccessful outcome) is deliberate and stage policy in
//! the pipeline depends on it: upload treats transport failure as fatal,
//! while a rejected validation row is just a bad outcome.

use std::collections::HashMap;
use std::path::Path;

use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::{Credentials, ServerEndpoint};
use crate::error::{Error, Result};
use crate::transformer::{DeploymentEndpoint, EntityKind};

const UPLOAD_PATH: &str = "ExtensionPackageUploader?purpose=import";
const REMOVE_PATH: &str = "Subsystems/PlatformSubsystem/Services/DeleteExtensionPackage";
const IMPLEMENTING_SERVICE: &str = "GetImplementingInstances";

/// Status code carried by each report row: 0 success, 1 failure, 2 warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportStatus {
    Success,
    Failure,
    Warning,
    Unknown,
}

impl ReportStatus {
    fn from_code(code: i64) -> Self {
        match code {
            0 => ReportStatus::Success,
            1 => ReportStatus::Failure,
            2 => ReportStatus::Warning,
            _ => ReportStatus::Unknown,
        }
    }
}

/// One validation or installation row from the server's import report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLine {
    pub phase: String,
    pub status: ReportStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub package: String,
    pub success: bool,
    pub report_lines: Vec<ReportLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalOutcome {
    pub package: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeOutcome {
    pub target: String,
    pub service: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Remote operations the pipeline needs. Implemented by [`ServerClient`]
/// for the real server and by test doubles in pipeline tests.
pub trait RemoteOps {
    fn upload_artifact(&self, package: &str, artifact: &Path) -> Result<UploadOutcome>;
    fn remove_artifact(&self, package: &str) -> Result<RemovalOutcome>;
    fn invoke_service(&self, collection: &str, entity: &str, service: &str)
        -> Result<InvokeOutcome>;
    fn implementing_instances(&self, endpoint: &DeploymentEndpoint) -> Result<Vec<String>>;
}

pub struct ServerClient {
    client: Client,
    endpoint: ServerEndpoint,
    collections: HashMap<String, String>,
}

impl ServerClient {
    /// Credentials were validated when the [`ServerEndpoint`] was resolved,
    /// so construction here cannot observe a missing-auth state.
    pub fn new(endpoint: ServerEndpoint, collections: HashMap<String, String>) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            collections,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.base_url, path)
    }

    fn authorize(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.endpoint.credentials {
            Credentials::AppKey(key) => request.header("appKey", key),
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password.clone()))
            }
        }
    }

    /// Effective collection name for an entity kind, honoring workspace
    /// overrides.
    pub fn collection_for(&self, kind: &EntityKind) -> Result<String> {
        let default = kind.collection().ok_or_else(|| {
            Error::validation_invalid_argument(
                "entityKind",
                "unsupported entity kind has no server collection",
                Some(format!("{:?}", kind)),
            )
        })?;
        Ok(self
            .collections
            .get(default)
            .cloned()
            .unwrap_or_else(|| default.to_string()))
    }

    fn post_json(&self, path: &str, body: &Value) -> Result<(u16, String)> {
        let url = self.url(path);
        let response = self
            .authorize(self.client.post(&url))
            .header("Accept", "application/json")
            .json(body)
            .send()
            .map_err(|e| Error::remote_transport(path.to_string(), None, e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| Error::remote_transport(path.to_string(), Some(status), e.to_string()))?;
        Ok((status, text))
    }
}

impl RemoteOps for ServerClient {
    fn upload_artifact(&self, package: &str, artifact: &Path) -> Result<UploadOutcome> {
        let file = reqwest::blocking::multipart::Part::file(artifact).map_err(|e| {
            Error::internal_io(e.to_string(), Some("read artifact for upload".to_string()))
        })?;
        let form = reqwest::blocking::multipart::Form::new().part("file", file);

        let response = self
            .authorize(self.client.post(self.url(UPLOAD_PATH)))
            .header("Accept", "application/json")
            .multipart(form)
            .send()
            .map_err(|e| Error::remote_transport(UPLOAD_PATH, None, e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| Error::remote_transport(UPLOAD_PATH, Some(status), e.to_string()))?;

        // A non-2xx response means the import never ran; the artifact is in
        // an unknown remote state and the caller aborts the sequence.
        if !(200..300).contains(&status) {
            return Err(Error::remote_transport(UPLOAD_PATH, Some(status), body));
        }

        Ok(parse_upload_outcome(package, &body))
    }

    fn remove_artifact(&self, package: &str) -> Result<RemovalOutcome> {
        let (status, body) = self.post_json(REMOVE_PATH, &json!({ "packageName": package }))?;

        Ok(RemovalOutcome {
            package: package.to_string(),
            success: (200..300).contains(&status),
            detail: if (200..300).contains(&status) {
                None
            } else {
                Some(format!("HTTP {}: {}", status, body.trim()))
            },
        })
    }

    fn invoke_service(
        &self,
        collection: &str,
        entity: &str,
        service: &str,
    ) -> Result<InvokeOutcome> {
        let path = format!("{}/{}/Services/{}", collection, entity, service);
        let (status, body) = self.post_json(&path, &json!({}))?;

        // Non-2xx here is an outcome, not an error: deploy-stage
        // invocations are best-effort by contract.
        Ok(InvokeOutcome {
            target: format!("{}/{}", collection, entity),
            service: service.to_string(),
            success: (200..300).contains(&status),
            detail: if (200..300).contains(&status) {
                None
            } else {
                Some(format!("HTTP {}: {}", status, body.trim()))
            },
        })
    }

    fn implementing_instances(&self, endpoint: &DeploymentEndpoint) -> Result<Vec<String>> {
        let collection = self.collection_for(&endpoint.kind)?;
        let path = format!(
            "{}/{}/Services/{}",
            collection, endpoint.entity, IMPLEMENTING_SERVICE
        );
        let (status, body) = self.post_json(&path, &json!({}))?;

        if !(200..300).contains(&status) {
            return Err(Error::remote_transport(path, Some(status), body));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| Error::internal_json(e.to_string(), Some(path)))?;
        Ok(parse_instance_names(&value))
    }
}

/// Parse the import endpoint's response body into an outcome.
///
/// The body is JSON when the server processed the package: a `rows` array
/// where each row carries `validate` and `install` sub-infotables whose rows
/// have `extensionReportStatus` (0/1/2) and `reportMessage`. Anything
/// unparseable is kept verbatim as a single opaque line.
pub fn parse_upload_outcome(package: &str, body: &str) -> UploadOutcome {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        let trimmed = body.trim();
        return UploadOutcome {
            package: package.to_string(),
            success: true,
            report_lines: if trimmed.is_empty() {
                Vec::new()
            } else {
                vec![ReportLine {
                    phase: "import".to_string(),
                    status: ReportStatus::Unknown,
                    message: trimmed.to_string(),
                }]
            },
            error: None,
        };
    };

    let mut lines = Vec::new();
    if let Some(rows) = value.get("rows").and_then(Value::as_array) {
        for row in rows {
            for phase in ["validate", "install"] {
                collect_phase_lines(row.get(phase), phase, &mut lines);
            }
        }
    }

    let failed: Vec<&ReportLine> = lines
        .iter()
        .filter(|l| l.status == ReportStatus::Failure)
        .collect();

    UploadOutcome {
        package: package.to_string(),
        success: failed.is_empty(),
        error: if failed.is_empty() {
            None
        } else {
            Some(
                failed
                    .iter()
                    .map(|l| l.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        },
        report_lines: lines,
    }
}

fn collect_phase_lines(phase_table: Option<&Value>, phase: &str, lines: &mut Vec<ReportLine>) {
    let Some(rows) = phase_table
        .and_then(|t| t.get("rows"))
        .and_then(Value::as_array)
    else {
        return;
    };

    for row in rows {
        let status = row
            .get("extensionReportStatus")
            .and_then(Value::as_i64)
            .map(ReportStatus::from_code)
            .unwrap_or(ReportStatus::Unknown);
        let message = row
            .get("reportMessage")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        lines.push(ReportLine {
            phase: phase.to_string(),
            status,
            message,
        });
    }
}

/// Extract instance names from a `GetImplementingInstances` result table.
fn parse_instance_names(value: &Value) -> Vec<String> {
    value
        .get("rows")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get("name").and_then(Value::as_str))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
