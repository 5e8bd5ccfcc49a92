use serde::Serialize;

use crate::config::KeywordConfig;
use crate::monitor::status::LogStatus;

/// Text that marks log content as a failed fetch rather than real output.
pub const FETCH_ERROR_MARKER: &str = "Error fetching log file";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordClass {
    Critical,
    Error,
    Success,
    Warning,
}

/// Evaluation order for whole-text status.
const STATUS_ORDER: [KeywordClass; 4] = [
    KeywordClass::Critical,
    KeywordClass::Error,
    KeywordClass::Success,
    KeywordClass::Warning,
];

/// Evaluation order for per-line highlighting. Success lines stay unstyled.
const LINE_ORDER: [KeywordClass; 3] = [
    KeywordClass::Critical,
    KeywordClass::Error,
    KeywordClass::Warning,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineSeverity {
    Critical,
    Error,
    Warning,
}

impl LineSeverity {
    pub fn css_class(self) -> &'static str {
        match self {
            LineSeverity::Critical => "log-critical",
            LineSeverity::Error => "log-error",
            LineSeverity::Warning => "log-warning",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub status: LogStatus,
    pub has_warnings: bool,
}

impl Classification {
    fn plain(status: LogStatus) -> Self {
        Self {
            status,
            has_warnings: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyledLine {
    pub severity: Option<LineSeverity>,
    pub text: String,
}

/// Log text split into lines, each tagged with its highlight severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StyledLog {
    pub lines: Vec<StyledLine>,
}

impl StyledLog {
    /// Render as HTML, wrapping highlighted lines in `<span class="log-*">`.
    pub fn to_html(&self) -> String {
        self.lines
            .iter()
            .map(|line| {
                let text = escape_html(&line.text);
                match line.severity {
                    Some(severity) => {
                        format!("<span class=\"{}\">{}</span>", severity.css_class(), text)
                    }
                    None => text,
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn count(&self, severity: LineSeverity) -> usize {
        self.lines
            .iter()
            .filter(|l| l.severity == Some(severity))
            .count()
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Keyword-based classifier for freeform log text.
///
/// Holds an ordered list of keyword classes; the same lists drive both the
/// whole-text status and the per-line highlighting. Matching is a
/// case-insensitive substring search.
#[derive(Debug, Clone)]
pub struct LogStatusClassifier {
    classes: Vec<(KeywordClass, Vec<String>)>,
}

impl Default for LogStatusClassifier {
    fn default() -> Self {
        Self::new(&KeywordConfig::default())
    }
}

impl LogStatusClassifier {
    pub fn new(keywords: &KeywordConfig) -> Self {
        let normalize = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|k| k.trim().to_uppercase())
                .filter(|k| !k.is_empty())
                .collect()
        };

        Self {
            classes: vec![
                (KeywordClass::Critical, normalize(&keywords.critical)),
                (KeywordClass::Error, normalize(&keywords.error)),
                (KeywordClass::Success, normalize(&keywords.success)),
                (KeywordClass::Warning, normalize(&keywords.warning)),
            ],
        }
    }

    fn matches(&self, class: KeywordClass, upper: &str) -> bool {
        self.classes
            .iter()
            .filter(|(c, _)| *c == class)
            .flat_map(|(_, keywords)| keywords.iter())
            .any(|k| upper.contains(k.as_str()))
    }

    fn first_match(&self, upper: &str, order: &[KeywordClass]) -> Option<KeywordClass> {
        order.iter().copied().find(|class| self.matches(*class, upper))
    }

    /// Determine the status of a block of log text.
    pub fn classify(&self, text: &str) -> Classification {
        if text.trim().is_empty() || text.contains(FETCH_ERROR_MARKER) {
            tracing::debug!("Log content empty or a fetch error, status unknown");
            return Classification::plain(LogStatus::Unknown);
        }

        let upper = text.to_uppercase();
        let classification = match self.first_match(&upper, &STATUS_ORDER) {
            Some(KeywordClass::Critical) => Classification::plain(LogStatus::Critical),
            Some(KeywordClass::Error) => Classification::plain(LogStatus::Failed),
            Some(KeywordClass::Success) => Classification {
                status: LogStatus::Success,
                has_warnings: self.matches(KeywordClass::Warning, &upper),
            },
            Some(KeywordClass::Warning) => Classification::plain(LogStatus::Warning),
            None => Classification::plain(LogStatus::Unknown),
        };

        tracing::debug!(
            status = %classification.status,
            has_warnings = classification.has_warnings,
            "Classified log content"
        );
        classification
    }

    /// Highlight severity of one line, if any.
    pub fn line_severity(&self, line: &str) -> Option<LineSeverity> {
        match self.first_match(&line.to_uppercase(), &LINE_ORDER)? {
            KeywordClass::Critical => Some(LineSeverity::Critical),
            KeywordClass::Error => Some(LineSeverity::Error),
            KeywordClass::Warning => Some(LineSeverity::Warning),
            KeywordClass::Success => None,
        }
    }

    pub fn style(&self, text: &str) -> StyledLog {
        StyledLog {
            lines: text
                .lines()
                .map(|line| StyledLine {
                    severity: self.line_severity(line),
                    text: line.to_string(),
                })
                .collect(),
        }
    }
}
