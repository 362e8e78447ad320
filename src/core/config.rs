//! Workspace configuration (`shipwright.json`).
//!
//! Loaded once per command invocation into a [`crate::context::CommandContext`]
//! and passed down; nothing in the crate reads configuration lazily from
//! globals.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::io;

pub const CONFIG_FILE: &str = "shipwright.json";

/// Sentinel value of `projectName` that enables multi-project mode: the
/// sources root holds one subdirectory per project instead of a single
/// project's files.
pub const MULTI_PROJECT_SENTINEL: &str = "@auto";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Extension package name, or `"@auto"` for multi-project repositories.
    pub project_name: String,

    /// Semantic version stamped into packaged artifacts. Bumped (patch)
    /// before compilation unless the retain-version flag is set.
    pub version: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub transformer: TransformerConfig,

    /// Overrides for the server-side collection name of each entity kind.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub entity_collections: HashMap<String, String>,

    /// Relative path of the sources root. Defaults to `src`.
    #[serde(default = "default_sources_root")]
    pub sources_root: String,
}

fn default_sources_root() -> String {
    "src".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformerConfig {
    /// Command line used to invoke the external source-to-entity
    /// transformer, e.g. `npx entity-transformer`.
    pub command: String,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            command: "npx entity-transformer".to_string(),
        }
    }
}

impl WorkspaceConfig {
    pub fn is_multi_project(&self) -> bool {
        self.project_name == MULTI_PROJECT_SENTINEL
    }
}

/// Load the workspace configuration from `<root>/shipwright.json`.
pub fn load(workspace_root: &Path) -> Result<WorkspaceConfig> {
    let path = workspace_root.join(CONFIG_FILE);
    if !path.exists() {
        return Err(Error::config_missing_file(path.display().to_string())
            .with_hint("Run shipwright from the workspace root"));
    }

    let content = io::read_file(&path, "read workspace config")?;
    serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))
}

/// Persist the workspace configuration back to disk (atomic write; used by
/// the version bump, which mutates the stored version before compilation).
pub fn save(workspace_root: &Path, config: &WorkspaceConfig) -> Result<()> {
    let path = workspace_root.join(CONFIG_FILE);
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize config".to_string())))?;
    io::write_file_atomic(&path, &content, "write workspace config")
}

/// Resolved server authentication. Exactly one variant is ever constructed;
/// ambiguous or absent credentials fail before any request is attempted.
#[derive(Debug, Clone)]
pub enum Credentials {
    AppKey(String),
    Basic { username: String, password: String },
}

/// Server connection details resolved from environment and config file.
#[derive(Debug, Clone)]
pub struct ServerEndpoint {
    pub base_url: String,
    pub credentials: Credentials,
}

/// Resolve the server endpoint. Environment variables win over the
/// configuration file: `SHIPWRIGHT_SERVER`, `SHIPWRIGHT_APP_KEY`,
/// `SHIPWRIGHT_USER`, `SHIPWRIGHT_PASSWORD`.
pub fn resolve_server(config: &ServerConfig) -> Result<ServerEndpoint> {
    resolve_server_with_env(config, &std::env::var("SHIPWRIGHT_SERVER").ok(), &EnvCredentials {
        app_key: std::env::var("SHIPWRIGHT_APP_KEY").ok(),
        username: std::env::var("SHIPWRIGHT_USER").ok(),
        password: std::env::var("SHIPWRIGHT_PASSWORD").ok(),
    })
}

pub(crate) struct EnvCredentials {
    pub app_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

pub(crate) fn resolve_server_with_env(
    config: &ServerConfig,
    env_url: &Option<String>,
    env: &EnvCredentials,
) -> Result<ServerEndpoint> {
    let base_url = env_url
        .clone()
        .or_else(|| config.url.clone())
        .ok_or_else(|| {
            Error::config_invalid_value("server.url", "no server URL configured")
                .with_hint("Set SHIPWRIGHT_SERVER or 'server.url' in shipwright.json")
        })?;
    let base_url = base_url.trim_end_matches('/').to_string();

    // Credentials come from a single source: if any SHIPWRIGHT_* credential
    // variable is set, the file's credentials are ignored entirely.
    let env_credentials =
        env.app_key.is_some() || env.username.is_some() || env.password.is_some();
    let (app_key, username, password) = if env_credentials {
        (env.app_key.clone(), env.username.clone(), env.password.clone())
    } else {
        (
            config.app_key.clone(),
            config.username.clone(),
            config.password.clone(),
        )
    };

    let credentials = match (app_key, username, password) {
        (Some(_), Some(_), Some(_)) => return Err(Error::config_auth_ambiguous()),
        (Some(key), _, _) => Credentials::AppKey(key),
        (None, Some(username), Some(password)) => Credentials::Basic { username, password },
        (None, Some(_), None) => {
            return Err(Error::config_invalid_value(
                "server.password",
                "username configured without password",
            ))
        }
        (None, None, Some(_)) => {
            return Err(Error::config_invalid_value(
                "server.username",
                "password configured without username",
            ))
        }
        (None, None, None) => return Err(Error::config_auth_missing()),
    };

    Ok(ServerEndpoint {
        base_url,
        credentials,
    })
}

/// Absolute path of the sources root for a workspace.
pub fn sources_root(workspace_root: &Path, config: &WorkspaceConfig) -> PathBuf {
    workspace_root.join(&config.sources_root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn server(app_key: Option<&str>, user: Option<&str>, pass: Option<&str>) -> ServerConfig {
        ServerConfig {
            url: Some("http://localhost:8080/Server".to_string()),
            app_key: app_key.map(String::from),
            username: user.map(String::from),
            password: pass.map(String::from),
        }
    }

    fn no_env() -> EnvCredentials {
        EnvCredentials {
            app_key: None,
            username: None,
            password: None,
        }
    }

    #[test]
    fn load_fails_for_missing_config() {
        let dir = TempDir::new().unwrap();
        let err = load(dir.path()).unwrap_err();
        assert_eq!(err.code.as_str(), "config.missing_file");
    }

    #[test]
    fn load_round_trips_through_save() {
        let dir = TempDir::new().unwrap();
        let config = WorkspaceConfig {
            project_name: MULTI_PROJECT_SENTINEL.to_string(),
            version: "2.1.7".to_string(),
            server: server(Some("key"), None, None),
            transformer: TransformerConfig::default(),
            entity_collections: HashMap::new(),
            sources_root: "src".to_string(),
        };

        save(dir.path(), &config).unwrap();
        let loaded = load(dir.path()).unwrap();
        assert!(loaded.is_multi_project());
        assert_eq!(loaded.version, "2.1.7");
    }

    #[test]
    fn resolve_server_prefers_app_key() {
        let endpoint = resolve_server_with_env(&server(Some("abc"), None, None), &None, &no_env())
            .unwrap();
        assert!(matches!(endpoint.credentials, Credentials::AppKey(ref k) if k == "abc"));
        assert_eq!(endpoint.base_url, "http://localhost:8080/Server");
    }

    #[test]
    fn resolve_server_accepts_basic_pair() {
        let endpoint =
            resolve_server_with_env(&server(None, Some("admin"), Some("pw")), &None, &no_env())
                .unwrap();
        assert!(matches!(endpoint.credentials, Credentials::Basic { .. }));
    }

    #[test]
    fn resolve_server_rejects_missing_credentials() {
        let err = resolve_server_with_env(&server(None, None, None), &None, &no_env()).unwrap_err();
        assert_eq!(err.code.as_str(), "config.auth_missing");
    }

    #[test]
    fn resolve_server_rejects_both_credential_kinds() {
        let err =
            resolve_server_with_env(&server(Some("k"), Some("u"), Some("p")), &None, &no_env())
                .unwrap_err();
        assert_eq!(err.code.as_str(), "config.auth_missing");
        assert!(err.message.contains("exactly one"));
    }

    #[test]
    fn env_credentials_override_config_file() {
        let env = EnvCredentials {
            app_key: Some("env-key".to_string()),
            username: None,
            password: None,
        };
        let endpoint =
            resolve_server_with_env(&server(None, Some("u"), Some("p")), &None, &env).unwrap();
        assert!(matches!(endpoint.credentials, Credentials::AppKey(ref k) if k == "env-key"));
    }

    #[test]
    fn trailing_slash_is_stripped_from_base_url() {
        let config = ServerConfig {
            url: Some("http://host/Server/".to_string()),
            app_key: Some("k".to_string()),
            ..Default::default()
        };
        let endpoint = resolve_server_with_env(&config, &None, &no_env()).unwrap();
        assert_eq!(endpoint.base_url, "http://host/Server");
    }
}
