//! Access to the remote bulletin host.
//!
//! - [`RemoteSession`]: the single shared, lazily reconnecting session
//! - [`transport`]: the blocking [`Connector`]/[`Transport`] seam
//! - [`ssh`]: the libssh2 implementation of that seam

pub mod session;
pub mod ssh;
pub mod transport;

pub use session::{CommandResult, RemoteSession, DEFAULT_COMMAND_TIMEOUT};
pub use ssh::SshConnector;
pub use transport::{CommandOutput, Connector, Transport};
