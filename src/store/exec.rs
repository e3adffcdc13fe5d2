//! Subprocess plumbing shared by the collaborator clients.
//!
//! Every round-trip is sequential: spawn, optionally feed stdin, wait for
//! exit, and return trimmed stdout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::errors::StoreError;

/// Captured result of one collaborator invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// An external command-line collaborator resolved against `PATH`.
#[derive(Debug, Clone)]
pub struct Tool {
    name: String,
    program: Option<PathBuf>,
    cwd: PathBuf,
}

impl Tool {
    /// Resolve the first of `candidates` found on `PATH`. An absolute or
    /// relative path candidate is accepted when it points at an executable.
    pub fn resolve(name: &str, candidates: &[&str], cwd: &Path) -> Self {
        let program = candidates.iter().find_map(|c| which::which(c).ok());
        debug!(tool = name, program = ?program, "resolved collaborator");
        Self {
            name: name.to_string(),
            program,
            cwd: cwd.to_path_buf(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_installed(&self) -> bool {
        self.program.is_some()
    }

    fn unavailable(&self) -> StoreError {
        StoreError::Unavailable {
            tool: self.name.clone(),
        }
    }

    fn describe(&self, args: &[String]) -> String {
        if args.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, args.join(" "))
        }
    }

    /// Run the tool and capture its output regardless of exit status.
    pub async fn output(&self, args: &[String], stdin: Option<&str>) -> Result<ToolOutput, StoreError> {
        let program = self.program.as_ref().ok_or_else(|| self.unavailable())?;
        debug!(command = %self.describe(args), "exec");

        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.cwd)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| StoreError::Spawn {
                tool: self.name.clone(),
                source,
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|source| StoreError::Spawn {
                    tool: self.name.clone(),
                    source,
                })?;
            // dropping the pipe closes the child's stdin
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| StoreError::Spawn {
                tool: self.name.clone(),
                source,
            })?;

        let result = ToolOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };
        debug!(command = %self.describe(args), code = result.code, "exit");
        Ok(result)
    }

    /// Run the tool and return trimmed stdout, failing on a non-zero exit.
    pub async fn run(&self, args: &[String]) -> Result<String, StoreError> {
        self.run_with_stdin(args, None).await
    }

    pub async fn run_with_stdin(&self, args: &[String], stdin: Option<&str>) -> Result<String, StoreError> {
        let output = self.output(args, stdin).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(StoreError::CommandFailed {
                command: self.describe(args),
                code: output.code,
                stderr: output.stderr,
            })
        }
    }

    /// Run the tool and decode stdout as JSON.
    pub async fn run_json<T: serde::de::DeserializeOwned>(&self, args: &[String]) -> Result<T, StoreError> {
        let stdout = self.run(args).await?;
        serde_json::from_str(&stdout).map_err(|source| StoreError::Parse {
            command: self.describe(args),
            source,
        })
    }
}

/// Build an owned argument vector from string-like pieces.
pub fn args<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}
