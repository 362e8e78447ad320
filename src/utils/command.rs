//! Subprocess execution primitives with captured output.

use std::path::Path;
use std::process::Command;

use serde::Serialize;

use crate::error::{Error, Result};

/// Captured output from a subprocess invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapturedOutput {
    pub exit_code: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    pub success: bool,
}

impl CapturedOutput {
    /// Error text for display: stderr when present, stdout otherwise.
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Run a program with arguments in a working directory, capturing output.
///
/// A non-zero exit is not an `Err`; callers inspect `success` and decide.
/// Only a spawn failure (program missing, permission denied) is an error.
pub fn run_captured(program: &str, args: &[String], dir: &Path) -> Result<CapturedOutput> {
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| {
            Error::internal_io(
                format!("Failed to run {}: {}", program, e),
                Some(format!("spawn {}", program)),
            )
        })?;

    Ok(CapturedOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        success: output.status.success(),
    })
}

/// Split a configured command line into program and leading arguments.
///
/// Whitespace splitting only; transformer commands are simple invocations
/// (`npx entity-transformer`), not shell scripts.
pub fn split_command_line(command: &str) -> Result<(String, Vec<String>)> {
    let mut parts = command.split_whitespace().map(String::from);
    let program = parts.next().ok_or_else(|| {
        Error::config_invalid_value("transformer.command", "command is empty")
    })?;
    Ok((program, parts.collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_command_line_separates_program_and_args() {
        let (program, args) = split_command_line("npx entity-transformer --strict").unwrap();
        assert_eq!(program, "npx");
        assert_eq!(args, vec!["entity-transformer", "--strict"]);
    }

    #[test]
    fn split_command_line_rejects_empty() {
        assert!(split_command_line("   ").is_err());
    }

    #[test]
    fn error_text_prefers_stderr() {
        let out = CapturedOutput {
            exit_code: 1,
            stdout: "ignored".to_string(),
            stderr: "real problem".to_string(),
            success: false,
        };
        assert_eq!(out.error_text(), "real problem");
    }
}
