//! Infers whether a recurring bulletin ran today from the tail of its log.
//!
//! The tail is split into per-day buckets using the leading `YYYY-MM-DD` of
//! each line. Undated lines (and lines whose date prefix is not a real date)
//! continue the most recently opened bucket. Today's bucket decides the
//! status; if today has no valid timestamp, yesterday's bucket decides
//! between `PENDING` and `NO_RECENT_RUN`.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;

use crate::monitor::classifier::LogStatusClassifier;
use crate::monitor::status::LogStatus;
use crate::remote::RemoteSession;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn date_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})").expect("valid date regex"))
}

fn timestamp_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}").expect("valid timestamp regex")
    })
}

fn leading_date(line: &str) -> Option<NaiveDate> {
    let captures = date_prefix().captures(line)?;
    NaiveDate::parse_from_str(&captures[1], "%Y-%m-%d").ok()
}

/// Log lines grouped by the calendar day they were written on.
#[derive(Debug, Default)]
pub struct DayBuckets<'a> {
    buckets: HashMap<NaiveDate, Vec<&'a str>>,
}

impl<'a> DayBuckets<'a> {
    pub fn partition(text: &'a str) -> Self {
        let mut buckets: HashMap<NaiveDate, Vec<&'a str>> = HashMap::new();
        let mut open: Option<NaiveDate> = None;

        for line in text.lines() {
            if let Some(day) = leading_date(line) {
                open = Some(day);
            }
            // Lines before the first dated line have no bucket to continue.
            if let Some(day) = open {
                buckets.entry(day).or_default().push(line);
            }
        }

        Self { buckets }
    }

    pub fn lines(&self, day: NaiveDate) -> &[&'a str] {
        self.buckets.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn text(&self, day: NaiveDate) -> String {
        self.lines(day).join("\n")
    }
}

/// Latest valid `YYYY-MM-DD HH:MM:SS` prefix, scanning from the end.
///
/// Lexical matches that are not real date-times (month 99, hour 25) are
/// skipped and the scan continues backward.
pub fn latest_timestamp(lines: &[&str]) -> Option<NaiveDateTime> {
    lines.iter().rev().find_map(|line| {
        let m = timestamp_prefix().find(line)?;
        NaiveDateTime::parse_from_str(m.as_str(), TIMESTAMP_FORMAT).ok()
    })
}

/// Result of resolving a bulletin's most recent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunWindow {
    pub status: LogStatus,
    /// Timestamp of the run, or why there is none.
    pub last_run: String,
    pub last_run_at: Option<NaiveDateTime>,
    pub has_warnings: bool,
}

impl RunWindow {
    pub fn fetch_failed() -> Self {
        Self {
            status: LogStatus::SshError,
            last_run: "N/A (Log fetch error)".to_string(),
            last_run_at: None,
            has_warnings: false,
        }
    }

    fn absent(status: LogStatus, reason: String) -> Self {
        Self {
            status,
            last_run: reason,
            last_run_at: None,
            has_warnings: false,
        }
    }
}

/// Evaluate an already fetched log tail relative to `now`.
pub fn evaluate(text: &str, now: NaiveDateTime, classifier: &LogStatusClassifier) -> RunWindow {
    let buckets = DayBuckets::partition(text);
    let today = now.date();

    if let Some(last) = latest_timestamp(buckets.lines(today)) {
        let classification = classifier.classify(&buckets.text(today));
        return RunWindow {
            status: classification.status,
            last_run: last.format(TIMESTAMP_FORMAT).to_string(),
            last_run_at: Some(last),
            has_warnings: classification.has_warnings,
        };
    }

    let yesterday_run = today
        .pred_opt()
        .and_then(|yesterday| latest_timestamp(buckets.lines(yesterday)));

    match yesterday_run {
        Some(last) => RunWindow {
            last_run_at: Some(last),
            ..RunWindow::absent(
                LogStatus::Pending,
                format!(
                    "N/A (Last run: {} - Yesterday)",
                    last.format(TIMESTAMP_FORMAT)
                ),
            )
        },
        None => RunWindow::absent(
            LogStatus::NoRecentRun,
            "N/A (No recent runs today or yesterday)".to_string(),
        ),
    }
}

/// Fetches a bounded log tail over the shared session and evaluates it.
#[derive(Clone)]
pub struct RunWindowResolver {
    session: Arc<RemoteSession>,
    classifier: Arc<LogStatusClassifier>,
    tail_lines: usize,
}

impl RunWindowResolver {
    pub fn new(
        session: Arc<RemoteSession>,
        classifier: Arc<LogStatusClassifier>,
        tail_lines: usize,
    ) -> Self {
        Self {
            session,
            classifier,
            tail_lines,
        }
    }

    pub async fn resolve_at(&self, log_path: &str, now: NaiveDateTime) -> RunWindow {
        let text = match self.session.tail(log_path, self.tail_lines).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(log_path, error = %e, "Could not fetch log tail");
                return RunWindow::fetch_failed();
            }
        };

        let window = evaluate(&text, now, &self.classifier);
        tracing::debug!(
            log_path,
            status = %window.status,
            last_run = %window.last_run,
            "Resolved run window"
        );
        window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn now() -> NaiveDateTime {
        day(2024, 3, 5).and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn todays_run_is_classified() {
        let text = "2024-03-04 08:00:00 FATAL yesterday\n2024-03-05 08:00:00 SUCCESS run complete";
        let window = evaluate(text, now(), &LogStatusClassifier::default());
        assert_eq!(window.status, LogStatus::Success);
        assert_eq!(window.last_run, "2024-03-05 08:00:00");
        assert_eq!(window.last_run_at, day(2024, 3, 5).and_hms_opt(8, 0, 0));
        assert!(!window.has_warnings);
    }

    #[test]
    fn yesterday_only_is_pending() {
        let text = "2024-03-04 08:00:00 SUCCESS\n2024-03-04 08:30:00 done";
        let window = evaluate(text, now(), &LogStatusClassifier::default());
        assert_eq!(window.status, LogStatus::Pending);
        assert_eq!(window.last_run, "N/A (Last run: 2024-03-04 08:30:00 - Yesterday)");
        assert_eq!(window.last_run_at, day(2024, 3, 4).and_hms_opt(8, 30, 0));
    }

    #[test]
    fn nothing_dated_is_no_recent_run() {
        for text in ["", "no dates at all\nSUCCESS", "2024-03-01 08:00:00 SUCCESS"] {
            let window = evaluate(text, now(), &LogStatusClassifier::default());
            assert_eq!(window.status, LogStatus::NoRecentRun, "{:?}", text);
            assert_eq!(window.last_run, "N/A (No recent runs today or yesterday)");
        }
    }

    #[test]
    fn today_bucket_without_full_timestamp_falls_back() {
        // A date-only marker opens today's bucket but gives no run time.
        let text = "2024-03-04 22:00:00 COMPLETED\n2024-03-05 started";
        let window = evaluate(text, now(), &LogStatusClassifier::default());
        assert_eq!(window.status, LogStatus::Pending);
    }

    #[test]
    fn continuation_lines_join_open_bucket() {
        let text = "orphan line\n\
                    2024-03-04 23:59:00 start\n\
                    traceback line\n\
                    2024-03-05 00:01:00 next\n\
                    more detail";
        let buckets = DayBuckets::partition(text);
        assert_eq!(
            buckets.lines(day(2024, 3, 4)),
            &["2024-03-04 23:59:00 start", "traceback line"]
        );
        assert_eq!(
            buckets.lines(day(2024, 3, 5)),
            &["2024-03-05 00:01:00 next", "more detail"]
        );
        assert!(buckets.lines(day(2024, 3, 6)).is_empty());
    }

    #[test]
    fn invalid_date_prefix_is_a_continuation_line() {
        let text = "2024-03-05 08:00:00 begin\n2024-99-99 garbage";
        let buckets = DayBuckets::partition(text);
        assert_eq!(buckets.lines(day(2024, 3, 5)).len(), 2);
    }

    #[test]
    fn latest_timestamp_skips_invalid_ones() {
        let lines = [
            "2024-03-05 07:00:00 ok",
            "2024-03-05 08:00:00 ok",
            "2024-03-05 25:61:00 broken clock",
            "no timestamp",
        ];
        let ts = latest_timestamp(&lines).unwrap();
        assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string(), "2024-03-05 08:00:00");
    }

    #[test]
    fn latest_timestamp_requires_full_prefix() {
        assert_eq!(latest_timestamp(&["2024-03-05 started"]), None);
        assert_eq!(latest_timestamp(&[]), None);
    }
}
