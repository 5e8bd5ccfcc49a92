use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Status of a bulletin's most recent run.
///
/// `Critical`, `Failed`, `Success`, `Warning` and `Unknown` come from log
/// classification. `SshError`, `Pending` and `NoRecentRun` are produced only
/// by run-window resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogStatus {
    Critical,
    Failed,
    Success,
    Warning,
    Unknown,
    SshError,
    Pending,
    NoRecentRun,
}

impl LogStatus {
    /// Position in the total order; higher ranks take precedence.
    ///
    /// Classifier values follow `CRITICAL > FAILED > SUCCESS > WARNING > UNKNOWN`.
    pub fn rank(self) -> u8 {
        match self {
            LogStatus::SshError => 7,
            LogStatus::Critical => 6,
            LogStatus::Failed => 5,
            LogStatus::Success => 4,
            LogStatus::Warning => 3,
            LogStatus::NoRecentRun => 2,
            LogStatus::Pending => 1,
            LogStatus::Unknown => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogStatus::Critical => "CRITICAL",
            LogStatus::Failed => "FAILED",
            LogStatus::Success => "SUCCESS",
            LogStatus::Warning => "WARNING",
            LogStatus::Unknown => "UNKNOWN",
            LogStatus::SshError => "SSH_ERROR",
            LogStatus::Pending => "PENDING",
            LogStatus::NoRecentRun => "NO_RECENT_RUN",
        }
    }

    /// True when the bulletin needs attention.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            LogStatus::Critical | LogStatus::Failed | LogStatus::SshError
        )
    }
}

impl PartialOrd for LogStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogStatus {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_order_holds() {
        assert!(LogStatus::Critical > LogStatus::Failed);
        assert!(LogStatus::Failed > LogStatus::Success);
        assert!(LogStatus::Success > LogStatus::Warning);
        assert!(LogStatus::Warning > LogStatus::Unknown);
    }

    #[test]
    fn max_picks_highest_rank() {
        let worst = [LogStatus::Success, LogStatus::SshError, LogStatus::Critical]
            .into_iter()
            .max();
        assert_eq!(worst, Some(LogStatus::SshError));
    }

    #[test]
    fn serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&LogStatus::NoRecentRun).unwrap(),
            "\"NO_RECENT_RUN\""
        );
        assert_eq!(
            serde_json::to_string(&LogStatus::SshError).unwrap(),
            "\"SSH_ERROR\""
        );
        let parsed: LogStatus = serde_json::from_str("\"PENDING\"").unwrap();
        assert_eq!(parsed, LogStatus::Pending);
    }

    #[test]
    fn display_matches_wire_name() {
        for status in [
            LogStatus::Critical,
            LogStatus::Failed,
            LogStatus::Success,
            LogStatus::Warning,
            LogStatus::Unknown,
            LogStatus::SshError,
            LogStatus::Pending,
            LogStatus::NoRecentRun,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json.trim_matches('"'), status.to_string());
        }
    }

    #[test]
    fn failure_flags() {
        assert!(LogStatus::SshError.is_failure());
        assert!(!LogStatus::Pending.is_failure());
    }
}
