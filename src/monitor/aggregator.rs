use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::BulletinConfig;
use crate::monitor::run_window::{RunWindow, RunWindowResolver};
use crate::monitor::status::LogStatus;
use crate::monitor::template;
use crate::remote::RemoteSession;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductAvailability {
    pub name: String,
    /// `None` when the path template could not be resolved.
    pub remote_path: Option<String>,
    pub available: bool,
}

/// Status of one bulletin, computed fresh for every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub status: LogStatus,
    pub last_run: String,
    pub last_run_at: Option<NaiveDateTime>,
    pub has_warnings: bool,
    pub product_info: Vec<ProductAvailability>,
}

impl RunRecord {
    fn from_window(window: RunWindow, product_info: Vec<ProductAvailability>) -> Self {
        Self {
            status: window.status,
            last_run: window.last_run,
            last_run_at: window.last_run_at,
            has_warnings: window.has_warnings,
            product_info,
        }
    }
}

/// Combines the run window of a bulletin with the availability of its products.
#[derive(Clone)]
pub struct BulletinStatusAggregator {
    session: Arc<RemoteSession>,
    resolver: RunWindowResolver,
}

impl BulletinStatusAggregator {
    pub fn new(session: Arc<RemoteSession>, resolver: RunWindowResolver) -> Self {
        Self { session, resolver }
    }

    pub async fn aggregate_at(&self, bulletin: &BulletinConfig, now: NaiveDateTime) -> RunRecord {
        if !self.session.is_active().await {
            tracing::debug!(bulletin_id = %bulletin.id, "Session inactive, reporting SSH_ERROR");
            return Self::unreachable(bulletin, &now);
        }

        let window = self.resolver.resolve_at(&bulletin.log_path, now).await;

        let mut product_info = Vec::with_capacity(bulletin.products.len());
        for product in &bulletin.products {
            let remote_path = template::resolve(&product.template, &now);
            let available = match remote_path.as_deref() {
                Some(path) => {
                    let exists = self.session.file_exists(path).await;
                    tracing::debug!(
                        bulletin_id = %bulletin.id,
                        product = %product.name,
                        path,
                        exists,
                        "Checked product"
                    );
                    exists
                }
                None => {
                    tracing::error!(
                        bulletin_id = %bulletin.id,
                        product = %product.name,
                        template = %product.template,
                        "Configuration error: product path template does not resolve"
                    );
                    false
                }
            };
            product_info.push(ProductAvailability {
                name: product.name.clone(),
                remote_path,
                available,
            });
        }

        RunRecord::from_window(window, product_info)
    }

    /// Status of every bulletin. One reconnect attempt is made up front; a
    /// still-inactive session turns into `SSH_ERROR` records, not an error.
    pub async fn aggregate_all_at(
        &self,
        bulletins: &[BulletinConfig],
        now: NaiveDateTime,
    ) -> Vec<RunRecord> {
        if let Err(e) = self.session.connect().await {
            tracing::warn!(error = %e, "Remote session unavailable for status listing");
        }

        let mut records = Vec::with_capacity(bulletins.len());
        for bulletin in bulletins {
            records.push(self.aggregate_at(bulletin, now).await);
        }
        records
    }

    /// Paths are still resolved so they can be displayed.
    fn unreachable(bulletin: &BulletinConfig, now: &NaiveDateTime) -> RunRecord {
        RunRecord {
            status: LogStatus::SshError,
            last_run: "N/A".to_string(),
            last_run_at: None,
            has_warnings: false,
            product_info: bulletin
                .products
                .iter()
                .map(|product| ProductAvailability {
                    name: product.name.clone(),
                    remote_path: template::resolve(&product.template, now),
                    available: false,
                })
                .collect(),
        }
    }
}
