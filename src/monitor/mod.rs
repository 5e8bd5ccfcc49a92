//! Bulletin status evaluation.
//!
//! # Components
//!
//! - [`template`]: date placeholder expansion for product paths
//! - [`LogStatusClassifier`]: keyword classification of log text and lines
//! - [`RunWindowResolver`]: did the bulletin run today, judged from its log tail
//! - [`BulletinStatusAggregator`]: run window plus product availability
//! - [`BulletinMonitor`]: the operations served to the dashboard and CLI
//!
//! # Flow
//!
//! 1. [`BulletinMonitor::list_bulletin_statuses`] asks the aggregator per bulletin
//! 2. The aggregator resolves the run window over the shared [`RemoteSession`](crate::remote::RemoteSession)
//! 3. Product paths are resolved for today and checked with `file_exists`

pub mod aggregator;
pub mod classifier;
pub mod run_window;
pub mod service;
pub mod status;
pub mod template;

pub use aggregator::{BulletinStatusAggregator, ProductAvailability, RunRecord};
pub use classifier::{Classification, LineSeverity, LogStatusClassifier, StyledLine, StyledLog};
pub use run_window::{RunWindow, RunWindowResolver};
pub use service::{BulletinMonitor, BulletinStatus, FullLog, LogSummary, ProductFile};
pub use status::LogStatus;
