//! Helpers for driving the `chunkstore` binary
//!
//! Every command runs against an explicit store directory and records its
//! wall-clock time.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// CLI command builder with timing
pub struct StoreCommand {
    binary_path: PathBuf,
    store_dir: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    stdin_data: Option<Vec<u8>>,
    dir_from_env: bool,
}

impl StoreCommand {
    /// Create a command operating on `store_dir`
    pub fn new(store_dir: impl AsRef<Path>) -> Self {
        Self {
            binary_path: PathBuf::from(env!("CARGO_BIN_EXE_chunkstore")),
            store_dir: store_dir.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            stdin_data: None,
            dir_from_env: false,
        }
    }

    /// Add command arguments
    pub fn args(&mut self, args: &[&str]) -> &mut Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    /// Set environment variable
    pub fn env(&mut self, key: &str, value: &str) -> &mut Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Provide stdin bytes
    pub fn stdin(&mut self, data: &[u8]) -> &mut Self {
        self.stdin_data = Some(data.to_vec());
        self
    }

    /// Name the store through `CHUNKSTORE_DIR` instead of `--dir`
    pub fn from_env(&mut self) -> &mut Self {
        self.dir_from_env = true;
        self
    }

    /// Execute command and return result with timing
    pub fn execute(&self) -> Result<CommandResult> {
        let start = Instant::now();

        let mut command = Command::new(&self.binary_path);
        if self.dir_from_env {
            command.env("CHUNKSTORE_DIR", &self.store_dir);
        } else {
            command.arg("--dir").arg(&self.store_dir);
        }
        command
            .args(&self.args)
            .envs(&self.env)
            .env_remove("RUST_LOG")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().context("Failed to spawn command")?;
        if let Some(mut stdin) = child.stdin.take() {
            if let Some(data) = &self.stdin_data {
                stdin.write_all(data)?;
            }
            // Dropping stdin closes the pipe
        }
        let output = child
            .wait_with_output()
            .context("Failed to wait for command")?;

        Ok(CommandResult {
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            duration: start.elapsed(),
        })
    }

    /// Execute and assert success
    pub fn assert_success(&self) -> Result<CommandResult> {
        let result = self.execute()?;

        if !result.success() {
            anyhow::bail!(
                "Command failed (exit code: {}):\nArgs: {:?}\nStdout: {}\nStderr: {}",
                result.exit_code,
                self.args,
                result.stdout_str(),
                result.stderr
            );
        }

        Ok(result)
    }

    /// Execute and expect failure
    pub fn assert_failure(&self) -> Result<CommandResult> {
        let result = self.execute()?;

        if result.success() {
            anyhow::bail!(
                "Command should have failed but succeeded:\nArgs: {:?}\nStdout: {}",
                self.args,
                result.stdout_str()
            );
        }

        Ok(result)
    }
}

/// Command execution result with timing
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Check if stdout contains text
    pub fn contains_stdout(&self, text: &str) -> bool {
        self.stdout_str().contains(text)
    }

    /// Check if stderr contains text
    pub fn contains_stderr(&self, text: &str) -> bool {
        self.stderr.contains(text)
    }

    /// Scores (64 hex digits) at the start of each output line
    pub fn parse_scores(&self) -> Vec<String> {
        self.stdout_str()
            .lines()
            .filter_map(extract_score)
            .collect()
    }
}

/// Extract a leading score from a line of output
pub fn extract_score(line: &str) -> Option<String> {
    let candidate = line.split_whitespace().next()?;
    (candidate.len() == 64 && candidate.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| candidate.to_string())
}

/// Command on `$dir` with the given arguments
///
/// Usage:
/// ```ignore
/// chunkstore!(dir, "init").assert_success()?;
/// chunkstore!(dir, "write", "--type", "3").stdin(b"data").assert_success()?;
/// ```
#[macro_export]
macro_rules! chunkstore {
    ($dir:expr, $($arg:expr),*) => {{
        let mut cmd = $crate::common::cli::StoreCommand::new($dir);
        cmd.args(&[$($arg),*]);
        cmd
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_extraction() {
        let line = "c672b8d1ef56ed28ab87c3622c5114069bdd3ad7b8f9737498d0c01ecef0967a  empty.bin";
        assert_eq!(
            extract_score(line).as_deref(),
            Some("c672b8d1ef56ed28ab87c3622c5114069bdd3ad7b8f9737498d0c01ecef0967a")
        );
        assert_eq!(extract_score("Initialized store"), None);
    }
}
