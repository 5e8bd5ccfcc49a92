use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{MonitorError, Result};
use crate::remote::transport::{CommandOutput, Connector, Transport};

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a remote command as reported to callers.
///
/// A non-zero exit keeps whatever stdout the command produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    fn failed(stderr: String) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr,
        }
    }

    fn from_output(output: CommandOutput) -> Self {
        let stdout = output.stdout.trim().to_string();
        let stderr = output.stderr.trim().to_string();
        if output.exit_status == 0 {
            Self {
                success: true,
                stdout,
                stderr,
            }
        } else {
            Self {
                success: false,
                stdout,
                stderr: if stderr.is_empty() {
                    format!("Exit code: {}", output.exit_status)
                } else {
                    stderr
                },
            }
        }
    }
}

/// Connection state guarded by the session mutex.
struct SessionSlot {
    connector: Arc<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
}

impl SessionSlot {
    fn is_active(&mut self) -> bool {
        self.transport
            .as_mut()
            .map(|t| t.is_active())
            .unwrap_or(false)
    }

    /// Drop any stale transport and open a new one.
    fn reconnect(&mut self) -> Result<()> {
        if let Some(mut stale) = self.transport.take() {
            stale.close();
        }
        match self.connector.connect() {
            Ok(transport) => {
                tracing::info!(target_host = %self.connector.describe(), "Remote session connected");
                self.transport = Some(transport);
                Ok(())
            }
            Err(e) => {
                tracing::error!(target_host = %self.connector.describe(), error = %e, "Failed to establish remote session");
                Err(e)
            }
        }
    }

    fn connect(&mut self) -> Result<()> {
        if self.is_active() {
            tracing::debug!("Remote session already connected");
            return Ok(());
        }
        self.reconnect()
    }

    /// Return a live transport, trying exactly one reconnect if needed.
    fn ensure_active(&mut self) -> Result<&mut Box<dyn Transport>> {
        if !self.is_active() {
            tracing::warn!("Remote session inactive, attempting to re-connect");
            self.reconnect()?;
        }
        self.transport
            .as_mut()
            .ok_or_else(|| MonitorError::SessionInactive("no transport".to_string()))
    }

    fn run(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        let transport = self.ensure_active()?;
        tracing::info!(command, "Executing remote command");
        transport.exec(command, timeout)
    }

    fn execute(&mut self, command: &str, timeout: Duration) -> CommandResult {
        let output = match self.run(command, timeout) {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(command, error = %e, "Remote command could not run");
                return CommandResult::failed(e.to_string());
            }
        };

        let result = CommandResult::from_output(output);
        if result.success {
            tracing::info!(
                command,
                output_len = result.stdout.len(),
                "Remote command succeeded"
            );
        } else {
            tracing::error!(command, error = %result.stderr, "Remote command failed");
        }
        result
    }

    fn read_output(&mut self, command: &str, timeout: Duration) -> Result<String> {
        let output = self.run(command, timeout)?;
        if output.exit_status != 0 {
            let result = CommandResult::from_output(output);
            return Err(MonitorError::Remote(result.stderr));
        }
        Ok(output.stdout)
    }

    fn file_exists(&mut self, remote_path: &str) -> bool {
        let transport = match self.ensure_active() {
            Ok(transport) => transport,
            Err(e) => {
                tracing::warn!(path = remote_path, error = %e, "Cannot check remote file");
                return false;
            }
        };
        match transport.stat(remote_path) {
            Ok(()) => true,
            Err(MonitorError::NotFound(_)) => false,
            Err(e) => {
                tracing::error!(path = remote_path, error = %e, "Error checking remote file");
                false
            }
        }
    }

    fn download(&mut self, remote_path: &str, local_dir: &Path) -> Result<PathBuf> {
        let file_name = Path::new(remote_path)
            .file_name()
            .ok_or_else(|| MonitorError::BadRequest(format!("no file name in '{}'", remote_path)))?;
        let transport = self.ensure_active()?;

        std::fs::create_dir_all(local_dir)?;
        let local_path = local_dir.join(file_name);
        tracing::info!(remote = remote_path, local = %local_path.display(), "Downloading remote file");

        if let Err(e) = transport.download(remote_path, &local_path) {
            tracing::error!(remote = remote_path, error = %e, "Download failed");
            if local_path.exists() {
                let _ = std::fs::remove_file(&local_path);
            }
            return Err(e);
        }
        Ok(local_path)
    }

    fn close(&mut self) {
        match self.transport.take() {
            Some(mut transport) => {
                transport.close();
                tracing::info!(target_host = %self.connector.describe(), "Remote session closed");
            }
            None => tracing::info!("Remote session was not open"),
        }
    }
}

/// The single shared connection to the bulletin host.
///
/// Every operation takes the session lock and runs the blocking transport
/// calls on the blocking pool, so concurrent callers never interleave on the
/// underlying channel. Operations needing a live connection try one inline
/// reconnect before giving up.
#[derive(Clone)]
pub struct RemoteSession {
    slot: Arc<Mutex<SessionSlot>>,
    target: String,
    default_timeout: Duration,
}

impl RemoteSession {
    /// Create a disconnected session. Call [`connect`](Self::connect) or let the
    /// first operation connect on demand.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let target = connector.describe();
        Self {
            slot: Arc::new(Mutex::new(SessionSlot {
                connector,
                transport: None,
            })),
            target,
            default_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    async fn with_slot<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut SessionSlot) -> R + Send + 'static,
        R: Send + 'static,
    {
        let mut slot = self.slot.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || f(&mut *slot))
            .await
            .map_err(|e| MonitorError::Internal(format!("remote session task failed: {}", e)))
    }

    /// Connect unless already connected and live.
    pub async fn connect(&self) -> Result<()> {
        self.with_slot(|slot| slot.connect()).await?
    }

    /// True only if the connection and its file-transfer channel are live.
    pub async fn is_active(&self) -> bool {
        self.with_slot(|slot| slot.is_active())
            .await
            .unwrap_or(false)
    }

    pub async fn execute_command(&self, command: &str) -> CommandResult {
        self.execute_command_with_timeout(command, self.default_timeout)
            .await
    }

    pub async fn execute_command_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> CommandResult {
        let command = command.to_string();
        self.with_slot(move |slot| slot.execute(&command, timeout))
            .await
            .unwrap_or_else(|e| CommandResult::failed(e.to_string()))
    }

    /// Run a command and return its stdout, treating a non-zero exit as an error.
    pub async fn read_output(&self, command: &str) -> Result<String> {
        let command = command.to_string();
        let timeout = self.default_timeout;
        self.with_slot(move |slot| slot.read_output(&command, timeout))
            .await?
    }

    /// Last `lines` lines of a remote file.
    pub async fn tail(&self, remote_path: &str, lines: usize) -> Result<String> {
        self.read_output(&format!(
            "tail -n {} {}",
            lines,
            shell_words::quote(remote_path)
        ))
        .await
    }

    /// Whole content of a remote file.
    pub async fn cat(&self, remote_path: &str) -> Result<String> {
        self.read_output(&format!("cat {}", shell_words::quote(remote_path)))
            .await
    }

    /// False both when the file is missing and when the check itself fails.
    pub async fn file_exists(&self, remote_path: &str) -> bool {
        let remote_path = remote_path.to_string();
        self.with_slot(move |slot| slot.file_exists(&remote_path))
            .await
            .unwrap_or(false)
    }

    /// Copy a remote file into `local_dir`, keeping its base name.
    pub async fn download_file(&self, remote_path: &str, local_dir: &Path) -> Result<PathBuf> {
        let remote_path = remote_path.to_string();
        let local_dir = local_dir.to_path_buf();
        self.with_slot(move |slot| slot.download(&remote_path, &local_dir))
            .await?
    }

    pub async fn close(&self) {
        if let Err(e) = self.with_slot(|slot| slot.close()).await {
            tracing::warn!(error = %e, "Failed to close remote session");
        }
    }
}
