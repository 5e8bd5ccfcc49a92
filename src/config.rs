use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{MonitorError, Result};
use crate::monitor::template;

/// Connection settings for the remote host running the bulletins.
///
/// Either a private key or a password must be available when connecting.
/// If both are configured, the private key is used.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Path to an OpenSSH private key file.
    pub private_key_path: Option<PathBuf>,
    /// Only consulted when no usable private key is configured.
    pub password: Option<String>,
    /// TCP connect and handshake timeout.
    pub connect_timeout_secs: u64,
    /// Default timeout for a single remote command.
    pub command_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            user: String::new(),
            private_key_path: None,
            password: None,
            connect_timeout_secs: 10,
            command_timeout_secs: 30,
        }
    }
}

impl fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("private_key_path", &self.private_key_path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("command_timeout_secs", &self.command_timeout_secs)
            .finish()
    }
}

/// Credential chosen for authenticating the SSH session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    Key(&'a Path),
    Password(&'a str),
}

impl SshConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Pick the credential to authenticate with. An existing key file wins over
    /// a password; a configured but missing key file falls back to the password.
    pub fn credential(&self) -> Result<Credential<'_>> {
        let password = self.password.as_deref().filter(|p| !p.is_empty());

        if let Some(key) = self.private_key_path.as_deref() {
            if key.exists() {
                return Ok(Credential::Key(key));
            }
            if password.is_none() {
                return Err(MonitorError::Configuration(format!(
                    "private key {} does not exist and no password is set",
                    key.display()
                )));
            }
            tracing::warn!(key = %key.display(), "Private key not found, falling back to password");
        }

        password.map(Credential::Password).ok_or_else(|| {
            MonitorError::Configuration(
                "neither a private key nor a password is configured for SSH".to_string(),
            )
        })
    }

    /// Check the fields required to open a connection.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(MonitorError::Configuration("SSH host is not set".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(MonitorError::Configuration("SSH user is not set".to_string()));
        }
        self.credential().map(|_| ())
    }
}

/// Tunables for log fetching and product downloads.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Lines fetched for the quick log summary.
    pub summary_tail_lines: usize,
    /// Lines fetched for the run-window resolver; should span two days of logging.
    pub daily_tail_lines: usize,
    /// Shared temporary directory for product downloads.
    pub download_dir: PathBuf,
    /// When set, `serve` refreshes every bulletin status on this interval.
    pub poll_interval_secs: Option<u64>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            summary_tail_lines: 50,
            daily_tail_lines: 1000,
            download_dir: PathBuf::from("temp_downloads"),
            poll_interval_secs: None,
        }
    }
}

/// Keyword sets used to classify log text (matched case-insensitively).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub critical: Vec<String>,
    pub error: Vec<String>,
    pub success: Vec<String>,
    pub warning: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            critical: words(&["CRITICAL", "FATAL", "SEVERE"]),
            error: words(&["ERROR", "FAILURE", "FAILED", "EXCEPTION"]),
            success: words(&["SUCCESS", "COMPLETED", "FINISHED"]),
            warning: words(&["WARNING", "WARN"]),
        }
    }
}

/// An expected output artifact of a bulletin, at a date-templated remote path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductTemplate {
    #[serde(default = "default_product_name")]
    pub name: String,
    pub template: String,
}

fn default_product_name() -> String {
    "Product".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulletinConfig {
    pub id: String,
    pub name: String,
    pub log_path: String,
    /// Shell command run verbatim on the remote host to re-run the bulletin.
    pub rerun_command: String,
    #[serde(default)]
    pub products: Vec<ProductTemplate>,
    /// Display-only link to the bulletin's sources.
    #[serde(default)]
    pub code_link: Option<String>,
    /// Display-only command for opening a terminal next to the bulletin.
    #[serde(default)]
    pub access_command: Option<String>,
}

impl BulletinConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        log_path: impl Into<String>,
        rerun_command: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            log_path: log_path.into(),
            rerun_command: rerun_command.into(),
            products: Vec::new(),
            code_link: None,
            access_command: None,
        }
    }

    pub fn with_product(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.products.push(ProductTemplate {
            name: name.into(),
            template: template.into(),
        });
        self
    }
}

/// Everything the monitor needs: connection, tunables, keywords and bulletins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub ssh: SshConfig,
    #[serde(rename = "monitor")]
    pub settings: MonitorSettings,
    pub keywords: KeywordConfig,
    pub bulletins: Vec<BulletinConfig>,
}

impl MonitorConfig {
    /// Read and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: MonitorConfig = toml::from_str(raw)
            .map_err(|e| MonitorError::Configuration(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_bulletin(mut self, bulletin: BulletinConfig) -> Self {
        self.bulletins.push(bulletin);
        self
    }

    /// Enforce unique bulletin ids and well-formed product templates.
    pub fn validate(&self) -> Result<()> {
        if self.settings.summary_tail_lines == 0 || self.settings.daily_tail_lines == 0 {
            return Err(MonitorError::Configuration(
                "tail line counts must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for bulletin in &self.bulletins {
            if bulletin.id.is_empty() {
                return Err(MonitorError::Configuration(
                    "bulletin id must not be empty".to_string(),
                ));
            }
            if !seen.insert(bulletin.id.as_str()) {
                return Err(MonitorError::Configuration(format!(
                    "duplicate bulletin id '{}'",
                    bulletin.id
                )));
            }
            for product in &bulletin.products {
                template::validate(&product.template).map_err(|e| {
                    MonitorError::Configuration(format!(
                        "bulletin '{}' product '{}': {}",
                        bulletin.id, product.name, e
                    ))
                })?;
            }
        }
        Ok(())
    }

    pub fn find_bulletin(&self, id: &str) -> Option<&BulletinConfig> {
        self.bulletins.iter().find(|b| b.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[ssh]
host = "bqrm.example.org"
user = "bqrm"
password = "secret"

[monitor]
daily_tail_lines = 2000

[[bulletins]]
id = "sonelgaz"
name = "Sonelgaz"
log_path = "/home/bqrm/sonelgaz/logs/sonelgaz.log"
rerun_command = "/bin/bash /home/bqrm/sonelgaz/run.sh"

[[bulletins.products]]
name = "PDF"
template = "/home/bqrm/sonelgaz/out/bulletin_{year}{month}{day}.pdf"

[[bulletins]]
id = "synop2bufr"
name = "synop2bufr"
log_path = "/home/bqrm/synop2bufr/logs/synop2bufr.log"
rerun_command = "/bin/bash /home/bqrm/synop2bufr/synop2bufr.sh"
"#;

    #[test]
    fn ssh_config_default() {
        let cfg = SshConfig::default();
        assert_eq!(cfg.port, 22);
        assert_eq!(cfg.connect_timeout_secs, 10);
        assert_eq!(cfg.command_timeout_secs, 30);
        assert!(cfg.private_key_path.is_none());
        assert!(cfg.password.is_none());
    }

    #[test]
    fn monitor_settings_default() {
        let cfg = MonitorSettings::default();
        assert_eq!(cfg.summary_tail_lines, 50);
        assert_eq!(cfg.daily_tail_lines, 1000);
        assert_eq!(cfg.download_dir, PathBuf::from("temp_downloads"));
        assert!(cfg.poll_interval_secs.is_none());
    }

    #[test]
    fn keyword_config_default() {
        let cfg = KeywordConfig::default();
        assert_eq!(cfg.critical, vec!["CRITICAL", "FATAL", "SEVERE"]);
        assert_eq!(cfg.warning, vec!["WARNING", "WARN"]);
        assert_eq!(cfg.error.len(), 4);
        assert_eq!(cfg.success.len(), 3);
    }

    #[test]
    fn parses_sample_config() {
        let cfg = MonitorConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.ssh.host, "bqrm.example.org");
        assert_eq!(cfg.ssh.port, 22);
        assert_eq!(cfg.settings.daily_tail_lines, 2000);
        assert_eq!(cfg.settings.summary_tail_lines, 50);
        assert_eq!(cfg.bulletins.len(), 2);
        assert_eq!(cfg.bulletins[0].products.len(), 1);
        assert_eq!(cfg.bulletins[0].products[0].name, "PDF");
        assert!(cfg.bulletins[1].products.is_empty());
        assert!(cfg.find_bulletin("synop2bufr").is_some());
        assert!(cfg.find_bulletin("missing").is_none());
    }

    #[test]
    fn product_name_defaults() {
        let raw = r#"
[[bulletins]]
id = "a"
name = "A"
log_path = "/a.log"
rerun_command = "true"
products = [{ template = "/out/{YYYY}.txt" }]
"#;
        let cfg = MonitorConfig::from_toml_str(raw).unwrap();
        assert_eq!(cfg.bulletins[0].products[0].name, "Product");
    }

    #[test]
    fn rejects_duplicate_ids() {
        let cfg = MonitorConfig::default()
            .with_bulletin(BulletinConfig::new("a", "A", "/a.log", "true"))
            .with_bulletin(BulletinConfig::new("a", "A again", "/b.log", "true"));
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, MonitorError::Configuration(_)));
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let cfg = MonitorConfig::default().with_bulletin(
            BulletinConfig::new("a", "A", "/a.log", "true").with_product("out", "/out/{bogus}.txt"),
        );
        assert!(matches!(
            cfg.validate(),
            Err(MonitorError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_zero_tail_lines() {
        let mut cfg = MonitorConfig::default();
        cfg.settings.daily_tail_lines = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn credential_requires_key_or_password() {
        let cfg = SshConfig::new("host", "user");
        assert!(matches!(
            cfg.credential(),
            Err(MonitorError::Configuration(_))
        ));
    }

    #[test]
    fn credential_prefers_existing_key() {
        let key = tempfile::NamedTempFile::new().unwrap();
        let cfg = SshConfig::new("host", "user")
            .with_private_key(key.path())
            .with_password("secret");
        assert_eq!(cfg.credential().unwrap(), Credential::Key(key.path()));
    }

    #[test]
    fn credential_falls_back_to_password_when_key_missing() {
        let cfg = SshConfig::new("host", "user")
            .with_private_key("/definitely/not/here/id_rsa")
            .with_password("secret");
        assert_eq!(cfg.credential().unwrap(), Credential::Password("secret"));
    }

    #[test]
    fn credential_missing_key_without_password_fails() {
        let cfg = SshConfig::new("host", "user").with_private_key("/definitely/not/here/id_rsa");
        assert!(cfg.credential().is_err());
    }

    #[test]
    fn validate_requires_host_and_user() {
        assert!(SshConfig::new("", "user").with_password("x").validate().is_err());
        assert!(SshConfig::new("host", "").with_password("x").validate().is_err());
        assert!(SshConfig::new("host", "user").with_password("x").validate().is_ok());
    }

    #[test]
    fn debug_redacts_password() {
        let cfg = SshConfig::new("host", "user").with_password("hunter2");
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
