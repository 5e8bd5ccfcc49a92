//! SSH transport backed by libssh2.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use ssh2::{CheckResult, ErrorCode, KnownHostFileKind, Session, Sftp};

use crate::config::{Credential, SshConfig};
use crate::error::{MonitorError, Result};
use crate::remote::transport::{CommandOutput, Connector, Transport};

/// `LIBSSH2_FX_NO_SUCH_FILE`
const SFTP_NO_SUCH_FILE: i32 = 2;

fn millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

fn is_not_found(e: &ssh2::Error) -> bool {
    e.code() == ErrorCode::SFTP(SFTP_NO_SUCH_FILE)
}

/// Opens password or key authenticated SSH sessions with an SFTP channel.
pub struct SshConnector {
    config: SshConfig,
}

impl SshConnector {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn open_tcp(&self) -> Result<TcpStream> {
        let target = format!("{}:{}", self.config.host, self.config.port);
        let addr = target
            .to_socket_addrs()
            .map_err(|e| MonitorError::Connectivity(format!("cannot resolve {}: {}", target, e)))?
            .next()
            .ok_or_else(|| MonitorError::Connectivity(format!("no address for {}", target)))?;

        TcpStream::connect_timeout(&addr, self.config.connect_timeout())
            .map_err(|e| MonitorError::Connectivity(format!("cannot connect to {}: {}", target, e)))
    }

    /// Reject hosts whose key differs from `~/.ssh/known_hosts`. Unknown hosts
    /// are accepted.
    fn verify_host_key(&self, session: &Session) -> Result<()> {
        let (key, _) = session
            .host_key()
            .ok_or_else(|| MonitorError::Connectivity("server sent no host key".to_string()))?;

        let mut known_hosts = session
            .known_hosts()
            .map_err(|e| MonitorError::Connectivity(e.to_string()))?;
        if let Some(home) = std::env::var_os("HOME") {
            let file = Path::new(&home).join(".ssh").join("known_hosts");
            if file.exists() {
                if let Err(e) = known_hosts.read_file(&file, KnownHostFileKind::OpenSSH) {
                    tracing::warn!(file = %file.display(), error = %e, "Cannot read known_hosts");
                }
            }
        }

        match known_hosts.check_port(&self.config.host, self.config.port, key) {
            CheckResult::Match => Ok(()),
            CheckResult::NotFound => {
                tracing::warn!(host = %self.config.host, "Host key not in known_hosts, accepting");
                Ok(())
            }
            CheckResult::Mismatch => Err(MonitorError::Connectivity(format!(
                "host key for {} does not match known_hosts",
                self.config.host
            ))),
            CheckResult::Failure => {
                tracing::warn!(host = %self.config.host, "Host key check failed, accepting");
                Ok(())
            }
        }
    }
}

impl Connector for SshConnector {
    fn connect(&self) -> Result<Box<dyn Transport>> {
        self.config.validate()?;
        let credential = self.config.credential()?;

        let tcp = self.open_tcp()?;
        let mut session =
            Session::new().map_err(|e| MonitorError::Connectivity(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(millis(self.config.connect_timeout()));
        session
            .handshake()
            .map_err(|e| MonitorError::Connectivity(format!("SSH handshake failed: {}", e)))?;
        self.verify_host_key(&session)?;

        let auth = match credential {
            Credential::Key(path) => {
                session.userauth_pubkey_file(&self.config.user, None, path, None)
            }
            Credential::Password(password) => {
                session.userauth_password(&self.config.user, password)
            }
        };
        auth.map_err(|e| MonitorError::Authentication(e.to_string()))?;
        if !session.authenticated() {
            return Err(MonitorError::Authentication(format!(
                "server rejected credentials for {}",
                self.config.user
            )));
        }

        let sftp = session
            .sftp()
            .map_err(|e| MonitorError::Connectivity(format!("cannot open SFTP channel: {}", e)))?;

        tracing::info!(
            host = %self.config.host,
            user = %self.config.user,
            key_auth = matches!(credential, Credential::Key(_)),
            "SSH session established"
        );

        Ok(Box::new(SshTransport {
            session,
            sftp: Some(sftp),
            io_timeout: self.config.command_timeout(),
        }))
    }

    fn describe(&self) -> String {
        format!("{}@{}:{}", self.config.user, self.config.host, self.config.port)
    }
}

/// A live SSH session plus its SFTP channel.
pub struct SshTransport {
    session: Session,
    sftp: Option<Sftp>,
    io_timeout: Duration,
}

impl SshTransport {
    fn sftp(&self) -> Result<&Sftp> {
        self.sftp
            .as_ref()
            .ok_or_else(|| MonitorError::SessionInactive("SFTP channel closed".to_string()))
    }
}

impl Transport for SshTransport {
    fn is_active(&mut self) -> bool {
        if !self.session.authenticated() {
            return false;
        }
        // A round trip over the SFTP channel proves both layers are alive.
        match self.sftp.as_ref() {
            Some(sftp) => sftp.realpath(Path::new(".")).is_ok(),
            None => false,
        }
    }

    fn exec(&mut self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        self.session.set_timeout(millis(timeout));
        let remote = |e: ssh2::Error| MonitorError::Remote(e.to_string());

        let mut channel = self.session.channel_session().map_err(remote)?;
        channel.exec(command).map_err(remote)?;

        let mut stdout = Vec::new();
        channel
            .read_to_end(&mut stdout)
            .map_err(|e| MonitorError::Remote(format!("reading stdout: {}", e)))?;
        let mut stderr = Vec::new();
        channel
            .stderr()
            .read_to_end(&mut stderr)
            .map_err(|e| MonitorError::Remote(format!("reading stderr: {}", e)))?;

        channel.wait_close().map_err(remote)?;
        let exit_status = channel.exit_status().map_err(remote)?;

        Ok(CommandOutput {
            exit_status,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    fn stat(&mut self, path: &str) -> Result<()> {
        self.session.set_timeout(millis(self.io_timeout));
        match self.sftp()?.stat(Path::new(path)) {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Err(MonitorError::NotFound(path.to_string())),
            Err(e) => Err(MonitorError::Remote(e.to_string())),
        }
    }

    fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<()> {
        self.session.set_timeout(millis(self.io_timeout));
        let mut remote = match self.sftp()?.open(Path::new(remote_path)) {
            Ok(file) => file,
            Err(e) if is_not_found(&e) => {
                return Err(MonitorError::NotFound(remote_path.to_string()))
            }
            Err(e) => return Err(MonitorError::Remote(e.to_string())),
        };
        let mut local = std::fs::File::create(local_path)?;
        std::io::copy(&mut remote, &mut local)?;
        Ok(())
    }

    fn close(&mut self) {
        self.sftp = None;
        if let Err(e) = self.session.disconnect(None, "closing", None) {
            tracing::debug!(error = %e, "SSH disconnect failed");
        }
    }
}
