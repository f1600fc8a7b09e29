//! Timestamp parsing shared by stored comments and provider articles.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Naive layouts accepted after RFC 3339 fails. `%.f` also matches no fraction.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Date-only layouts some providers use, e.g. `Jan 5, 2024`.
const DATE_FORMATS: &[&str] = &["%b %d, %Y", "%d %b %Y", "%Y-%m-%d"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timestamp {
    At(DateTime<Utc>),
    /// Raw text that matched no supported encoding
    Unknown(String),
}

impl Timestamp {
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::At(dt) => Some(*dt),
            Timestamp::Unknown(_) => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Timestamp::Unknown(_))
    }

    /// Newest first, unknown values last.
    pub fn cmp_newest_first(&self, other: &Self) -> Ordering {
        match (self.instant(), other.instant()) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::At(dt) => write!(f, "{}", dt.format("%d.%m.%Y %H:%M UTC")),
            Timestamp::Unknown(raw) => write!(f, "unknown time ({})", raw),
        }
    }
}

/// The encoding written for new comments.
pub fn to_storage(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored comment timestamp: RFC 3339 first, then the naive
/// layouts (read as UTC).
pub fn parse_stored(raw: &str) -> Timestamp {
    match parse_instant(raw.trim()) {
        Some(dt) => Timestamp::At(dt),
        None => Timestamp::Unknown(raw.to_string()),
    }
}

/// Parse an article's published date. Besides the stored encodings this
/// accepts plain dates and relative values like `3 hours ago`.
pub fn parse_published(raw: &str, now: DateTime<Utc>) -> Timestamp {
    let trimmed = raw.trim();

    if let Some(dt) = parse_instant(trimmed) {
        return Timestamp::At(dt);
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Timestamp::At(dt.and_utc());
            }
        }
    }

    match parse_relative(trimmed).and_then(|ago| now.checked_sub_signed(ago)) {
        Some(dt) => Timestamp::At(dt),
        None => Timestamp::Unknown(raw.to_string()),
    }
}

fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let without_zone = raw.strip_suffix('Z').unwrap_or(raw);
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(without_zone, format).ok())
        .map(|naive| naive.and_utc())
}

fn parse_relative(raw: &str) -> Option<Duration> {
    let lower = raw.to_lowercase();
    let mut parts = lower.strip_suffix(" ago")?.split_whitespace();

    let amount: i64 = match parts.next()? {
        "a" | "an" => 1,
        n => n.parse().ok().filter(|n: &i64| *n >= 0)?,
    };
    let unit = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    match unit.trim_end_matches('s') {
        "second" | "sec" => Duration::try_seconds(amount),
        "minute" | "min" => Duration::try_minutes(amount),
        "hour" => Duration::try_hours(amount),
        "day" => Duration::try_days(amount),
        "week" => Duration::try_weeks(amount),
        "month" => Duration::try_days(amount.checked_mul(30)?),
        _ => None,
    }
}
