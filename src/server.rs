use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::dashboard::{run_dashboard, DashboardState};
use crate::monitor::{BulletinMonitor, LogStatus};
use crate::remote::{RemoteSession, SshConnector};

/// Wires the remote session, the optional status poller and the dashboard.
pub struct Server {
    pub monitor: Arc<BulletinMonitor>,
    pub dashboard_addr: SocketAddr,
    pub poll_interval: Option<Duration>,
}

/// Build the shared SSH session for a configuration.
pub fn ssh_session(config: &MonitorConfig) -> Arc<RemoteSession> {
    let connector = SshConnector::new(config.ssh.clone());
    Arc::new(
        RemoteSession::new(Arc::new(connector)).with_default_timeout(config.ssh.command_timeout()),
    )
}

impl Server {
    pub fn new(config: MonitorConfig, dashboard_addr: SocketAddr) -> Self {
        let session = ssh_session(&config);
        Self::with_session(config, session, dashboard_addr)
    }

    pub fn with_session(
        config: MonitorConfig,
        session: Arc<RemoteSession>,
        dashboard_addr: SocketAddr,
    ) -> Self {
        let poll_interval = config
            .settings
            .poll_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        Self {
            monitor: Arc::new(BulletinMonitor::new(config, session)),
            dashboard_addr,
            poll_interval,
        }
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// 1. Connects the remote session (a failure is logged; requests reconnect on demand)
    /// 2. Spawns the status poller if a poll interval is configured
    /// 3. Serves the dashboard until shutdown
    /// 4. Closes the remote session
    pub async fn run(self, shutdown: CancellationToken) {
        let session = self.monitor.session().clone();
        match session.connect().await {
            Ok(()) => tracing::info!(target_host = %session.target(), "Remote session ready"),
            Err(e) => tracing::error!(
                target_host = %session.target(),
                error = %e,
                "Initial connection failed, requests will retry"
            ),
        }

        let poller = self.poll_interval.map(|interval| {
            let monitor = self.monitor.clone();
            let token = shutdown.clone();
            tokio::spawn(async move {
                Self::poll_loop(monitor, interval, token).await;
            })
        });

        let state = DashboardState {
            monitor: self.monitor.clone(),
        };
        run_dashboard(self.dashboard_addr, state, shutdown.clone()).await;

        // The dashboard may also stop on its own (bind failure).
        shutdown.cancel();
        if let Some(poller) = poller {
            if let Err(e) = poller.await {
                tracing::warn!(error = %e, "Status poller ended abnormally");
            }
        }
        session.close().await;
    }

    /// Refresh every bulletin on an interval and log status transitions.
    async fn poll_loop(monitor: Arc<BulletinMonitor>, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        let mut last_seen: HashMap<String, LogStatus> = HashMap::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    for status in monitor.list_bulletin_statuses().await {
                        let current = status.record.status;
                        let previous = last_seen.insert(status.id.clone(), current);
                        if previous == Some(current) {
                            continue;
                        }
                        if current.is_failure() {
                            tracing::warn!(
                                bulletin_id = %status.id,
                                status = %current,
                                last_run = %status.record.last_run,
                                "Bulletin needs attention"
                            );
                        } else {
                            tracing::info!(
                                bulletin_id = %status.id,
                                status = %current,
                                last_run = %status.record.last_run,
                                "Bulletin status changed"
                            );
                        }
                    }
                }
            }
        }
        tracing::debug!("Status poller stopped");
    }
}
