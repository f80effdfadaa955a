use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

/// Clock trait for abstracting time operations
pub trait Clock: Send + Sync {
    /// Current instant in UTC
    fn now(&self) -> DateTime<Utc>;

    /// Current time as RFC3339 string
    fn now_rfc3339(&self) -> String {
        self.now().to_rfc3339()
    }

    /// Current time as epoch seconds (for TTL attributes)
    fn now_epoch_seconds(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Production implementation of Clock using system time
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test implementation of Clock with fixed/controllable time
#[derive(Debug, Clone)]
pub struct FixedClock {
    timestamp: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self { timestamp }
    }

    pub fn from_rfc3339(timestamp_str: &str) -> Result<Self, chrono::ParseError> {
        let timestamp = DateTime::parse_from_rfc3339(timestamp_str)?.with_timezone(&Utc);
        Ok(Self { timestamp })
    }

    pub fn set_time(&mut self, timestamp: DateTime<Utc>) {
        self.timestamp = timestamp;
    }

    pub fn advance(&mut self, by: Duration) {
        self.timestamp += by;
    }

    pub fn advance_minutes(&mut self, minutes: i64) {
        self.advance(Duration::minutes(minutes));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Parse an RFC3339 timestamp into UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Midnight UTC on the first day of `month`
pub fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, 1).map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

/// Start of the calendar month after the one `start` falls in
pub fn next_month_start(start: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if start.month() == 12 {
        month_start(start.year() + 1, 1)
    } else {
        month_start(start.year(), start.month() + 1)
    }
}

/// Start of the calendar month before the one `start` falls in
pub fn previous_month_start(start: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if start.month() == 1 {
        month_start(start.year() - 1, 12)
    } else {
        month_start(start.year(), start.month() - 1)
    }
}
