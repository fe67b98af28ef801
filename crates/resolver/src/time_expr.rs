//! Relative and absolute time expressions, all evaluated in UTC.

use canary_core::CanaryError;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

const ACCEPTED_FORMS: &str = "Use now, now-15m, now+1h, -2h, '2h ago', '30 minutes ago', today, yesterday, \
     an RFC 3339 timestamp, 'YYYY-MM-DD HH:MM:SS' or 'YYYY-MM-DD'";

/// Unit suffix → seconds.
fn unit_seconds(unit: &str) -> Option<i64> {
    let secs = match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        "w" | "wk" | "week" | "weeks" => 604_800,
        _ => return None,
    };
    Some(secs)
}

/// `15m`, `15 m`, `30 minutes` → signed-less duration.
fn parse_span(text: &str) -> Option<Duration> {
    let text = text.trim();
    let digits_end = text.find(|c: char| !c.is_ascii_digit()).unwrap_or(text.len());
    if digits_end == 0 {
        return None;
    }
    let amount: i64 = text[..digits_end].parse().ok()?;
    let secs = unit_seconds(text[digits_end..].trim())?;
    Duration::try_seconds(amount.checked_mul(secs)?)
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_relative(expr: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match expr {
        "now" => return Some(now),
        "today" => return midnight(now.date_naive()),
        "yesterday" => return midnight(now.date_naive().pred_opt()?),
        _ => {}
    }
    if let Some(span) = expr.strip_suffix("ago") {
        return now.checked_sub_signed(parse_span(span)?);
    }
    let offset = expr.strip_prefix("now").unwrap_or(expr).trim();
    if let Some(span) = offset.strip_prefix('-') {
        return now.checked_sub_signed(parse_span(span)?);
    }
    if let Some(span) = offset.strip_prefix('+') {
        return now.checked_add_signed(parse_span(span)?);
    }
    None
}

fn parse_absolute(expr: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(expr) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(expr, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(expr, "%Y-%m-%d").ok().and_then(midnight)
}

/// Evaluate one expression against `now`.
pub fn parse_time(expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, CanaryError> {
    let normalized = expr.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Err(CanaryError::invalid_query("time expression is empty", ACCEPTED_FORMS));
    }
    parse_relative(&normalized, now)
        .or_else(|| parse_absolute(expr.trim()))
        .ok_or_else(|| {
            CanaryError::invalid_query(format!("unrecognised time expression '{}'", expr.trim()), ACCEPTED_FORMS)
        })
}

/// A resolved, non-empty `[start, end)` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CanaryError> {
        if start >= end {
            return Err(CanaryError::invalid_query(
                format!("start {} is not before end {}", start.to_rfc3339(), end.to_rfc3339()),
                "Make the start time earlier than the end time",
            ));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str, now: DateTime<Utc>) -> Result<Self, CanaryError> {
        Self::new(parse_time(start, now)?, parse_time(end, now)?)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    #[test]
    fn relative_forms() {
        assert_eq!(parse_time("now", now()).unwrap(), now());
        assert_eq!(parse_time("now-15m", now()).unwrap(), at(12, 15));
        assert_eq!(parse_time("now+1h", now()).unwrap(), at(13, 30));
        assert_eq!(parse_time("-2h", now()).unwrap(), at(10, 30));
        assert_eq!(parse_time("2h ago", now()).unwrap(), at(10, 30));
        assert_eq!(parse_time("30 minutes ago", now()).unwrap(), at(12, 0));
        assert_eq!(parse_time(" NOW - 1d ", now()).unwrap(), now() - Duration::days(1));
        assert_eq!(parse_time("now-1d", now()).unwrap(), now() - Duration::days(1));
    }

    #[test]
    fn calendar_words() {
        assert_eq!(parse_time("today", now()).unwrap(), at(0, 0));
        assert_eq!(
            parse_time("yesterday", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 4, 30, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn absolute_forms() {
        assert_eq!(parse_time("2024-05-01T10:00:00Z", now()).unwrap(), at(10, 0));
        assert_eq!(parse_time("2024-05-01T12:00:00+02:00", now()).unwrap(), at(10, 0));
        assert_eq!(parse_time("2024-05-01 10:00:00", now()).unwrap(), at(10, 0));
        assert_eq!(parse_time("2024-05-01", now()).unwrap(), at(0, 0));
    }

    #[test]
    fn garbage_is_invalid_query_with_accepted_forms() {
        let err = parse_time("last tuesday-ish", now()).unwrap_err();
        assert_eq!(err.error_type(), "invalid_query");
        assert!(err.remediation().contains("now-15m"));
        assert!(parse_time("", now()).is_err());
        assert!(parse_time("now-15x", now()).is_err());
    }

    #[test]
    fn windows_must_be_ordered() {
        let w = TimeWindow::parse("now-1h", "now", now()).unwrap();
        assert_eq!(w.duration(), Duration::hours(1));
        assert!(TimeWindow::parse("now", "now", now()).is_err());
        assert!(TimeWindow::parse("now", "now-1h", now()).is_err());
    }
}
