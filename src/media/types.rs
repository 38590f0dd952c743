// src/media/types.rs
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

/// How an identifier was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Discovery {
    Api,
    ScrapePattern,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaCandidate {
    pub id: String,
    pub discovered_via: Discovery,
    /// Not every discovery path yields a trustworthy date.
    pub timestamp_hint: Option<DateTime<Utc>>,
}

impl MediaCandidate {
    pub fn new(id: impl Into<String>, via: Discovery, ts: Option<DateTime<Utc>>) -> Self {
        Self {
            id: id.into(),
            discovered_via: via,
            timestamp_hint: ts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Low,
    Fallback,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "HIGH",
            Confidence::Low => "LOW",
            Confidence::Fallback => "FALLBACK",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMedia {
    pub watch_url: String,
    pub confidence: Confidence,
    /// `None` for the hub fallback.
    pub media_id: Option<String>,
}

/// Single accumulator for "newest timestamped candidate so far".
/// Earlier candidates win ties so discovery order stays meaningful.
#[derive(Debug, Clone, Default)]
pub struct BestCandidate {
    best: Option<MediaCandidate>,
}

impl BestCandidate {
    /// Returns true when `c` became the new best.
    pub fn offer(&mut self, c: MediaCandidate) -> bool {
        let Some(ts) = c.timestamp_hint else {
            return false;
        };
        let better = match self.best.as_ref().and_then(|b| b.timestamp_hint) {
            Some(cur) => ts > cur,
            None => true,
        };
        if better {
            self.best = Some(c);
        }
        better
    }

    pub fn merge(&mut self, other: BestCandidate) {
        if let Some(c) = other.best {
            self.offer(c);
        }
    }

    pub fn get(&self) -> Option<&MediaCandidate> {
        self.best.as_ref()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.best.as_ref().and_then(|b| b.timestamp_hint)
    }

    pub fn take(&mut self) -> Option<MediaCandidate> {
        self.best.take()
    }
}

/// Accepts RFC 3339, a bare `YYYY-MM-DDTHH:MM:SS`, a date alone, or epoch
/// seconds/milliseconds (values above 10^11 are taken as milliseconds).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim().trim_matches('"');
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(n) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&n));
        }
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<i64>().ok().and_then(from_epoch);
    }
    None
}

pub fn from_epoch(v: i64) -> Option<DateTime<Utc>> {
    if v <= 0 {
        return None;
    }
    if v > 100_000_000_000 {
        DateTime::from_timestamp_millis(v)
    } else {
        DateTime::from_timestamp(v, 0)
    }
}

/// `now` minus `days`, or `None` when the result is out of range.
pub fn days_before(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days).and_then(|d| now.checked_sub_signed(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_before_is_checked() {
        let now = Utc.with_ymd_and_hms(2025, 10, 14, 12, 0, 0).unwrap();
        assert_eq!(
            days_before(now, 2),
            Some(Utc.with_ymd_and_hms(2025, 10, 12, 12, 0, 0).unwrap())
        );
        assert_eq!(days_before(now, i64::MAX), None);
        assert_eq!(days_before(now, 100_000_000), None);
    }

    #[test]
    fn timestamp_shapes() {
        let want = Utc.with_ymd_and_hms(2025, 10, 14, 9, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2025-10-14T09:30:00Z"), Some(want));
        assert_eq!(parse_timestamp("2025-10-14T11:30:00+02:00"), Some(want));
        assert_eq!(parse_timestamp("2025-10-14T09:30:00"), Some(want));
        assert_eq!(parse_timestamp("2025-10-14T11:30:00+0200"), Some(want));
        assert_eq!(parse_timestamp("1760434200"), Some(want));
        assert_eq!(parse_timestamp("1760434200000"), Some(want));
        assert!(parse_timestamp("2025-10-14").is_some());
        assert!(parse_timestamp("soon").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn accumulator_keeps_newest_and_first_on_tie() {
        let t = |h| Some(Utc.with_ymd_and_hms(2025, 10, 14, h, 0, 0).unwrap());
        let mut acc = BestCandidate::default();
        assert!(!acc.offer(MediaCandidate::new("none", Discovery::Api, None)));
        assert!(acc.offer(MediaCandidate::new("a", Discovery::Api, t(1))));
        assert!(acc.offer(MediaCandidate::new("b", Discovery::Api, t(5))));
        assert!(!acc.offer(MediaCandidate::new("c", Discovery::Api, t(5))));
        assert!(!acc.offer(MediaCandidate::new("d", Discovery::Api, t(2))));
        assert_eq!(acc.get().map(|c| c.id.as_str()), Some("b"));

        let mut other = BestCandidate::default();
        other.offer(MediaCandidate::new("e", Discovery::ScrapePattern, t(9)));
        acc.merge(other);
        assert_eq!(acc.get().map(|c| c.id.as_str()), Some("e"));
    }
}
