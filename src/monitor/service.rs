use std::path::Path;
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use tempfile::TempDir;

use crate::config::{BulletinConfig, MonitorConfig};
use crate::error::{MonitorError, Result};
use crate::monitor::aggregator::{BulletinStatusAggregator, RunRecord};
use crate::monitor::classifier::{LogStatusClassifier, StyledLine, StyledLog};
use crate::monitor::run_window::RunWindowResolver;
use crate::monitor::status::LogStatus;
use crate::monitor::template;
use crate::remote::{CommandResult, RemoteSession};

/// A bulletin's identity together with its current run record.
#[derive(Debug, Clone, Serialize)]
pub struct BulletinStatus {
    pub id: String,
    pub name: String,
    pub code_link: Option<String>,
    pub access_command: Option<String>,
    #[serde(flatten)]
    pub record: RunRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogSummary {
    pub bulletin_id: String,
    pub name: String,
    pub lines: usize,
    pub content: String,
    pub status: LogStatus,
    pub has_warnings: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FullLog {
    pub bulletin_id: String,
    pub name: String,
    pub log: StyledLog,
}

/// A downloaded product, open for reading.
///
/// The local copy lives in `temp_dir`, which is removed with its content when
/// dropped. Keep it alive for as long as `file` is being read.
#[derive(Debug)]
pub struct ProductFile {
    pub file_name: String,
    pub remote_path: String,
    pub size: u64,
    pub file: tokio::fs::File,
    pub temp_dir: TempDir,
}

/// Parse the `index` parameter of a product download.
pub fn parse_product_index(raw: Option<&str>) -> Result<usize> {
    let raw = raw.ok_or_else(|| {
        MonitorError::BadRequest("Missing product index for download.".to_string())
    })?;
    raw.trim()
        .parse()
        .map_err(|_| MonitorError::BadRequest(format!("Invalid product index '{}'.", raw)))
}

/// Parse an optional `YYYY-MM-DD` date parameter.
pub fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| MonitorError::BadRequest(format!("Invalid date '{}', expected YYYY-MM-DD.", s))),
    }
}

/// The operations exposed to the HTTP layer and the CLI.
#[derive(Clone)]
pub struct BulletinMonitor {
    config: Arc<MonitorConfig>,
    session: Arc<RemoteSession>,
    classifier: Arc<LogStatusClassifier>,
    aggregator: BulletinStatusAggregator,
}

impl BulletinMonitor {
    pub fn new(config: MonitorConfig, session: Arc<RemoteSession>) -> Self {
        let classifier = Arc::new(LogStatusClassifier::new(&config.keywords));
        let resolver = RunWindowResolver::new(
            session.clone(),
            classifier.clone(),
            config.settings.daily_tail_lines,
        );
        Self {
            aggregator: BulletinStatusAggregator::new(session.clone(), resolver),
            config: Arc::new(config),
            session,
            classifier,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<RemoteSession> {
        &self.session
    }

    fn bulletin(&self, id: &str) -> Result<&BulletinConfig> {
        self.config.find_bulletin(id).ok_or_else(|| {
            tracing::warn!(bulletin_id = id, "Request for unknown bulletin");
            MonitorError::NotFound(format!("Bulletin with ID '{}' not found.", id))
        })
    }

    async fn require_session(&self) -> Result<()> {
        self.session.connect().await.inspect_err(|e| {
            tracing::warn!(target_host = %self.session.target(), error = %e, "Remote session unavailable");
        })
    }

    pub async fn list_bulletin_statuses(&self) -> Vec<BulletinStatus> {
        self.list_bulletin_statuses_at(Local::now().naive_local())
            .await
    }

    /// One entry per configured bulletin; a broken session shows up as
    /// `SSH_ERROR` entries, never as a failed listing.
    pub async fn list_bulletin_statuses_at(&self, now: NaiveDateTime) -> Vec<BulletinStatus> {
        let records = self
            .aggregator
            .aggregate_all_at(&self.config.bulletins, now)
            .await;

        self.config
            .bulletins
            .iter()
            .zip(records)
            .map(|(bulletin, record)| BulletinStatus {
                id: bulletin.id.clone(),
                name: bulletin.name.clone(),
                code_link: bulletin.code_link.clone(),
                access_command: bulletin.access_command.clone(),
                record,
            })
            .collect()
    }

    /// Quick look at the end of a bulletin's log.
    pub async fn get_log_summary(&self, id: &str) -> Result<LogSummary> {
        let bulletin = self.bulletin(id)?;
        let lines = self.config.settings.summary_tail_lines;

        let content = match self.session.tail(&bulletin.log_path, lines).await {
            Ok(content) => content,
            Err(e) if e.is_session_failure() => return Err(e),
            Err(e) => {
                tracing::warn!(bulletin_id = id, error = %e, "Could not fetch log summary");
                format!("Error fetching log file '{}': {}", bulletin.log_path, e)
            }
        };
        let classification = self.classifier.classify(&content);

        Ok(LogSummary {
            bulletin_id: bulletin.id.clone(),
            name: bulletin.name.clone(),
            lines,
            content,
            status: classification.status,
            has_warnings: classification.has_warnings,
        })
    }

    /// Whole remote log with per-line severity.
    pub async fn get_full_log(&self, id: &str) -> Result<FullLog> {
        let bulletin = self.bulletin(id)?;
        self.require_session().await?;

        let log = match self.session.cat(&bulletin.log_path).await {
            Ok(content) => self.classifier.style(&content),
            Err(e) if e.is_session_failure() => return Err(e),
            Err(e) => {
                tracing::warn!(bulletin_id = id, error = %e, "Could not fetch full log");
                let text = format!("Error fetching full log file '{}': {}", bulletin.log_path, e);
                StyledLog {
                    lines: vec![StyledLine {
                        severity: self.classifier.line_severity(&text),
                        text,
                    }],
                }
            }
        };

        Ok(FullLog {
            bulletin_id: bulletin.id.clone(),
            name: bulletin.name.clone(),
            log,
        })
    }

    /// Run the bulletin's configured command verbatim.
    pub async fn trigger_rerun(&self, id: &str) -> Result<CommandResult> {
        let bulletin = self.bulletin(id)?;
        tracing::info!(
            bulletin_id = id,
            command = %bulletin.rerun_command,
            "Triggering bulletin re-run"
        );

        let result = self.session.execute_command(&bulletin.rerun_command).await;
        if result.success {
            tracing::info!(bulletin_id = id, "Re-run command sent");
        } else {
            tracing::error!(bulletin_id = id, error = %result.stderr, "Re-run command failed");
        }
        Ok(result)
    }

    /// Fetch a product file for `date` (midnight) or for now.
    ///
    /// On error the temporary copy is already gone; on success it goes away
    /// when the returned [`ProductFile`] is dropped.
    pub async fn download_product(
        &self,
        id: &str,
        index: usize,
        date: Option<NaiveDate>,
    ) -> Result<ProductFile> {
        let bulletin = self.bulletin(id)?;
        let product = bulletin.products.get(index).ok_or_else(|| {
            MonitorError::BadRequest(format!(
                "Bulletin '{}' has no product path configured at index {}.",
                id, index
            ))
        })?;
        self.require_session().await?;

        let when = match date {
            Some(day) => day.and_time(NaiveTime::MIN),
            None => Local::now().naive_local(),
        };
        let remote_path = template::try_resolve(&product.template, &when).inspect_err(|e| {
            tracing::error!(bulletin_id = id, template = %product.template, error = %e, "Cannot resolve product path");
        })?;

        let file_name = Path::new(&remote_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| remote_path.clone());

        if !self.session.file_exists(&remote_path).await {
            tracing::warn!(bulletin_id = id, path = %remote_path, "Product file not on remote host");
            return Err(MonitorError::NotFound(format!(
                "Product file '{}' not found on remote server for {}. It might not have run yet or failed.",
                file_name,
                when.date()
            )));
        }

        let root = &self.config.settings.download_dir;
        tokio::fs::create_dir_all(root).await?;
        let temp_dir = tempfile::Builder::new()
            .prefix("download-")
            .tempdir_in(root)?;
        let local_path = self
            .session
            .download_file(&remote_path, temp_dir.path())
            .await?;
        let file = tokio::fs::File::open(&local_path).await?;
        let size = file.metadata().await?.len();
        tracing::info!(bulletin_id = id, path = %remote_path, size, "Product downloaded");

        Ok(ProductFile {
            file_name,
            remote_path,
            size,
            file,
            temp_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_index_parsing() {
        assert_eq!(parse_product_index(Some("2")).unwrap(), 2);
        assert_eq!(parse_product_index(Some(" 0 ")).unwrap(), 0);
        assert!(matches!(
            parse_product_index(None),
            Err(MonitorError::BadRequest(_))
        ));
        assert!(matches!(
            parse_product_index(Some("abc")),
            Err(MonitorError::BadRequest(_))
        ));
        assert!(matches!(
            parse_product_index(Some("-1")),
            Err(MonitorError::BadRequest(_))
        ));
    }

    #[test]
    fn date_parsing() {
        assert_eq!(parse_date(None).unwrap(), None);
        assert_eq!(parse_date(Some("")).unwrap(), None);
        assert_eq!(
            parse_date(Some("2024-03-05")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert!(matches!(
            parse_date(Some("2024-13-01")),
            Err(MonitorError::BadRequest(_))
        ));
    }
}
