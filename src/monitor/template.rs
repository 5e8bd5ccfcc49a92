//! Date placeholder expansion for product paths.
//!
//! Templates use `{name}` placeholders, e.g. `/out/bulletin_{year}{month}{day}.pdf`.
//! `{{` and `}}` produce literal braces. Resolution fails closed: an unknown
//! placeholder yields an error, never a partially substituted path.

use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown placeholder '{{{0}}}'")]
    UnknownPlaceholder(String),

    #[error("unbalanced brace at offset {0}")]
    UnbalancedBrace(usize),
}

type Render = fn(&NaiveDateTime) -> String;

fn four_digit_year(d: &NaiveDateTime) -> String {
    d.format("%Y").to_string()
}

fn two_digit_year(d: &NaiveDateTime) -> String {
    d.format("%y").to_string()
}

fn month(d: &NaiveDateTime) -> String {
    d.format("%m").to_string()
}

fn day(d: &NaiveDateTime) -> String {
    d.format("%d").to_string()
}

fn hour(d: &NaiveDateTime) -> String {
    d.format("%H").to_string()
}

fn minute(d: &NaiveDateTime) -> String {
    d.format("%M").to_string()
}

fn second(d: &NaiveDateTime) -> String {
    d.format("%S").to_string()
}

/// Recognized placeholder names, including the aliases existing templates use.
const PLACEHOLDERS: &[(&str, Render)] = &[
    ("year", four_digit_year),
    ("Year", four_digit_year),
    ("YYYY", four_digit_year),
    ("year_short", two_digit_year),
    ("month", month),
    ("Month", month),
    ("MM", month),
    ("day", day),
    ("Day", day),
    ("DD", day),
    ("hour", hour),
    ("Hour", hour),
    ("minute", minute),
    ("Minute", minute),
    ("second", second),
    ("Second", second),
];

fn lookup(name: &str) -> Option<Render> {
    PLACEHOLDERS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, render)| *render)
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let bytes = template.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                segments.push(Segment::Literal(&template[literal_start..i]));
                segments.push(Segment::Literal(&template[i..i + 1]));
                i += 2;
                literal_start = i;
            }
            b'{' => {
                let close = template[i + 1..]
                    .find('}')
                    .ok_or(TemplateError::UnbalancedBrace(i))?;
                segments.push(Segment::Literal(&template[literal_start..i]));
                segments.push(Segment::Placeholder(&template[i + 1..i + 1 + close]));
                i += close + 2;
                literal_start = i;
            }
            b'}' => return Err(TemplateError::UnbalancedBrace(i)),
            _ => i += 1,
        }
    }
    segments.push(Segment::Literal(&template[literal_start..]));

    segments.retain(|s| !matches!(s, Segment::Literal("")));
    Ok(segments)
}

/// Check that a template only references known placeholders.
pub fn validate(template: &str) -> Result<(), TemplateError> {
    for segment in parse(template)? {
        if let Segment::Placeholder(name) = segment {
            lookup(name).ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))?;
        }
    }
    Ok(())
}

/// Expand every placeholder of `template` against `date`.
pub fn try_resolve(template: &str, date: &NaiveDateTime) -> Result<String, TemplateError> {
    let mut resolved = String::with_capacity(template.len());
    for segment in parse(template)? {
        match segment {
            Segment::Literal(text) => resolved.push_str(text),
            Segment::Placeholder(name) => {
                let render = lookup(name)
                    .ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))?;
                resolved.push_str(&render(date));
            }
        }
    }
    Ok(resolved)
}

/// Like [`try_resolve`], but logs the failure and returns `None`.
pub fn resolve(template: &str, date: &NaiveDateTime) -> Option<String> {
    match try_resolve(template, date) {
        Ok(path) => {
            tracing::debug!(template, date = %date.date(), path = %path, "Resolved path template");
            Some(path)
        }
        Err(e) => {
            tracing::error!(template, error = %e, "Cannot resolve path template");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, ss)
            .unwrap()
    }

    #[test]
    fn resolves_basic_date() {
        let date = at(2024, 3, 5, 0, 0, 0);
        assert_eq!(
            try_resolve("{year}-{month}-{day}", &date).unwrap(),
            "2024-03-05"
        );
    }

    #[test]
    fn resolves_aliases_and_time_fields() {
        let date = at(2024, 9, 7, 4, 8, 9);
        assert_eq!(
            try_resolve("{YYYY}{MM}{DD}_{Year}{Month}{Day}", &date).unwrap(),
            "20240907_20240907"
        );
        assert_eq!(
            try_resolve("{year_short}/{hour}{Hour}{minute}{Minute}{second}{Second}", &date)
                .unwrap(),
            "24/040408080909"
        );
    }

    #[test]
    fn unknown_placeholder_fails_closed() {
        let date = at(2024, 3, 5, 0, 0, 0);
        assert_eq!(
            try_resolve("/out/{year}/{bogus}.txt", &date),
            Err(TemplateError::UnknownPlaceholder("bogus".to_string()))
        );
        assert_eq!(resolve("/out/{year}/{bogus}.txt", &date), None);
    }

    #[test]
    fn escaped_braces_are_literal() {
        let date = at(2024, 3, 5, 0, 0, 0);
        assert_eq!(
            try_resolve("/out/{{raw}}_{day}", &date).unwrap(),
            "/out/{raw}_05"
        );
    }

    #[test]
    fn unbalanced_braces_fail() {
        let date = at(2024, 3, 5, 0, 0, 0);
        assert_eq!(
            try_resolve("/out/{year", &date),
            Err(TemplateError::UnbalancedBrace(5))
        );
        assert_eq!(
            try_resolve("/out/year}", &date),
            Err(TemplateError::UnbalancedBrace(9))
        );
    }

    #[test]
    fn template_without_placeholders_is_unchanged() {
        let date = at(2024, 3, 5, 0, 0, 0);
        assert_eq!(
            try_resolve("/static/path.txt", &date).unwrap(),
            "/static/path.txt"
        );
        assert_eq!(try_resolve("", &date).unwrap(), "");
    }

    #[test]
    fn validate_checks_names_only() {
        assert!(validate("/out/{year}{month}{day}.pdf").is_ok());
        assert!(validate("/out/{Hour}{Minute}{Second}").is_ok());
        assert!(matches!(
            validate("/out/{weekday}"),
            Err(TemplateError::UnknownPlaceholder(name)) if name == "weekday"
        ));
    }

    #[test]
    fn resolution_is_deterministic() {
        let date = at(2023, 12, 31, 23, 59, 58);
        let first = resolve("{year}{month}{day}{hour}{minute}{second}", &date);
        let second = resolve("{year}{month}{day}{hour}{minute}{second}", &date);
        assert_eq!(first, second);
        assert_eq!(first.as_deref(), Some("20231231235958"));
    }
}
