//! Clock and uniqueness-token sources
//!
//! Fixture records embed a token so that data created by parallel scenarios
//! does not collide inside the application under test. Two sources exist:
//!
//! - [`TimestampTokens`] uses the clock's millisecond timestamp. Calls at least
//!   1 ms apart never collide. Calls inside the same millisecond MAY collide;
//!   this is accepted because scenarios never generate data at sub-millisecond
//!   cadence.
//! - [`CounterTokens`] hands out strictly increasing values from an atomic
//!   counter and never collides within a process.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Datelike, Local, NaiveDate, SecondsFormat, Utc};

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar date the application under test considers "today"
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock. `today` follows the local timezone, like a browser would.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock frozen at a single instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn from_millis(millis: i64) -> Self {
        Self(DateTime::from_timestamp_millis(millis).unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Produces the uniqueness token embedded into generated records
pub trait TokenSource: Send + Sync {
    fn next_token(&self) -> String;
}

/// Millisecond timestamp tokens read from a clock
#[derive(Debug, Clone, Default)]
pub struct TimestampTokens<C> {
    clock: C,
}

impl<C: Clock> TimestampTokens<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> TokenSource for TimestampTokens<C> {
    fn next_token(&self) -> String {
        self.clock.now().timestamp_millis().to_string()
    }
}

/// Atomic counter tokens, safe to share across worker tasks
#[derive(Debug)]
pub struct CounterTokens {
    next: AtomicU64,
}

impl CounterTokens {
    pub fn starting_at(base: u64) -> Self {
        Self {
            next: AtomicU64::new(base),
        }
    }

    /// Seeded from the current time so tokens also differ between runs
    pub fn seeded_from_clock(clock: &dyn Clock) -> Self {
        let millis = clock.now().timestamp_millis().max(0) as u64;
        // leave room for a thousand tokens per millisecond
        Self::starting_at(millis.saturating_mul(1000))
    }
}

impl TokenSource for CounterTokens {
    fn next_token(&self) -> String {
        self.next.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

/// Short en-US date, as `Date.toLocaleDateString('en-US')` renders it (`M/D/YYYY`)
pub fn us_short_date(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.month(), date.day(), date.year())
}

/// ISO-8601 instant with millisecond precision and `Z` suffix
pub fn iso_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Today's date in en-US short form
pub fn current_date(clock: &dyn Clock) -> String {
    us_short_date(clock.today())
}

/// `YYYY-MM-DD` date `years` years after today, the format a date input accepts
///
/// "Today" is the UTC calendar date, matching `Date.toISOString()`.
pub fn future_date_iso(clock: &dyn Clock, years: u32) -> String {
    let today = clock.now().date_naive();
    let target_year = today.year() + years as i32;
    // Feb 29 rolls forward to Mar 1 when the target year is not a leap year
    let date = today
        .with_year(target_year)
        .or_else(|| NaiveDate::from_ymd_opt(target_year, 3, 1))
        .unwrap_or(today);
    date.format("%Y-%m-%d").to_string()
}
