use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Raw outcome of a remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// An open connection to the remote host together with its file-transfer
/// sub-channel. Dropping or closing it releases both.
///
/// Implementations are blocking; [`RemoteSession`](super::RemoteSession)
/// serializes access and runs them off the async runtime.
pub trait Transport: Send {
    /// Both the connection and the file-transfer channel are usable.
    fn is_active(&mut self) -> bool;

    fn exec(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput>;

    /// Succeeds if `path` exists; `MonitorError::NotFound` if it does not.
    fn stat(&mut self, path: &str) -> Result<()>;

    /// Copy the remote file at `remote_path` into the local file `local_path`.
    fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<()>;

    fn close(&mut self);
}

/// Opens new transports. Errors are `Configuration`, `Authentication` or
/// `Connectivity`.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Transport>>;

    /// Human readable target, used in logs.
    fn describe(&self) -> String;
}
