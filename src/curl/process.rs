use crate::error::CallError;
use bytes::Bytes;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

pub const DEFAULT_CURL_BINARY: &str = if cfg!(windows) { "curl.exe" } else { "curl" };

/// What a finished curl run left behind.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// `-1` when the process was killed by a signal.
    pub exit_code: i32,
    pub stdout: Bytes,
    pub stderr: String,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone)]
pub struct CurlProcess {
    binary: String,
}

impl Default for CurlProcess {
    fn default() -> Self {
        CurlProcess::new(DEFAULT_CURL_BINARY)
    }
}

impl CurlProcess {
    pub fn new(binary: &str) -> Self {
        CurlProcess {
            binary: binary.to_string(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Runs the binary to completion and buffers both streams.
    ///
    /// Failing to start the process is an error; a process that starts and
    /// exits non-zero is a normal `ProcessResult`.
    pub async fn run(&self, args: &[String]) -> Result<ProcessResult, CallError> {
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.launch_error(e))?;

        let result = ProcessResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: Bytes::from(output.stdout),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };

        debug!(
            binary = %self.binary,
            exit_code = result.exit_code,
            stdout_bytes = result.stdout.len(),
            "curl finished"
        );
        Ok(result)
    }

    fn launch_error(&self, e: std::io::Error) -> CallError {
        match e.kind() {
            ErrorKind::NotFound => CallError::BinaryNotFound(self.binary.clone()),
            ErrorKind::PermissionDenied => CallError::BinaryBlocked(self.binary.clone()),
            _ => CallError::Spawn {
                binary: self.binary.clone(),
                source: e,
            },
        }
    }
}
