use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// A simple clock abstraction for deterministic time in repositories, engines and tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Use the supplied timestamp verbatim, falling back to `now()` when absent.
    #[must_use]
    pub fn or_now(&self, at: Option<DateTime<Utc>>) -> DateTime<Utc> {
        at.unwrap_or_else(|| self.now())
    }

    /// If this is a fixed clock, advance it by the given duration.
    ///
    /// Has no effect on `Clock::Default`.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }
}

/// Layout used by the legacy comment tables for dates (`2023-11-14 22:13:20`, always GMT).
pub const LEGACY_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a legacy GMT datetime string.
#[must_use]
pub fn parse_legacy_datetime(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), LEGACY_DATETIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Format a timestamp the way the legacy comment tables store it.
#[must_use]
pub fn format_legacy_datetime(at: DateTime<Utc>) -> String {
    at.format(LEGACY_DATETIME_FORMAT).to_string()
}

/// Deterministic timestamp for tests (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}
