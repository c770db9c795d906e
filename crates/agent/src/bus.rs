//! Bridge to the device's local message bus.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Runs calls on the local bus.
#[async_trait]
pub trait BusCaller: Send + Sync + 'static {
    /// Invokes `method` on the object at `path`. `payload` is a JSON string
    /// and is omitted when empty. Returns the raw response text.
    async fn call(&self, method: &str, path: &str, payload: &str) -> Result<String>;
}

/// [`BusCaller`] backed by the `ubus` command line tool.
#[derive(Clone, Debug)]
pub struct UbusCaller {
    program: String,
    timeout: Duration,
}

impl Default for UbusCaller {
    fn default() -> Self {
        Self::new()
    }
}

impl UbusCaller {
    /// Time a call may take before the process is killed.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

    /// Runs `ubus` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: "ubus".to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Runs a different executable with the same arguments.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Overrides the kill timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl BusCaller for UbusCaller {
    async fn call(&self, method: &str, path: &str, payload: &str) -> Result<String> {
        let mut command = Command::new(&self.program);
        command.arg("call").arg(path).arg(method);
        if !payload.is_empty() {
            command.arg(payload);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(path, method, payload, "bus call");

        let child = command
            .spawn()
            .map_err(|e| Error::Io("failed to spawn bus command", e))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                info!(path, method, "bus process killed after timeout");
                Error::BusTimeout(self.timeout)
            })?
            .map_err(|e| Error::Io("failed to run bus command", e))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            info!(path, method, error = %stderr.trim(), "bus error");
            return Err(Error::Bus(stderr.trim().to_string()));
        }
        if !output.status.success() {
            return Err(Error::Bus(format!("bus command exited with {}", output.status)));
        }

        let response = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(path, method, response = %response, "bus response");
        Ok(response)
    }
}
