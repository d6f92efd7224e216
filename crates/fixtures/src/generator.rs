//! Fixture generator

use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use crate::clock::{
    iso_instant, us_short_date, Clock, CounterTokens, SystemClock, TimestampTokens, TokenSource,
};
use crate::records::{Split, SplitTransaction, TestUser, Transaction};

/// Meets the signup policy: upper, lower, digit, symbol, 12+ characters
pub const TEST_PASSWORD: &str = "TestPassword123!";

pub const DEFAULT_ENVELOPE: &str = "Groceries";
pub const SECONDARY_ENVELOPE: &str = "Entertainment";
pub const DEFAULT_ACCOUNT: &str = "Checking";
pub const DEFAULT_AMOUNT: &str = "25.50";
pub const DEFAULT_SPLIT_TOTAL: &str = "100.00";

/// Generates fresh records for each scenario.
///
/// Pure apart from the injected clock and token source; it never fails.
#[derive(Clone)]
pub struct FixtureGenerator {
    clock: Arc<dyn Clock>,
    tokens: Arc<dyn TokenSource>,
}

impl Default for FixtureGenerator {
    fn default() -> Self {
        Self::new(
            Arc::new(SystemClock),
            Arc::new(TimestampTokens::new(SystemClock)),
        )
    }
}

impl FixtureGenerator {
    pub fn new(clock: Arc<dyn Clock>, tokens: Arc<dyn TokenSource>) -> Self {
        Self { clock, tokens }
    }

    /// Generator whose clock and tokens both come from `clock`
    pub fn with_clock<C: Clock + Clone + 'static>(clock: C) -> Self {
        Self::new(Arc::new(clock.clone()), Arc::new(TimestampTokens::new(clock)))
    }

    /// Generator with counter tokens seeded from `clock`, for runs that draw
    /// many records within the same millisecond
    pub fn with_counter_tokens<C: Clock + 'static>(clock: C) -> Self {
        let tokens = CounterTokens::seeded_from_clock(&clock);
        Self::new(Arc::new(clock), Arc::new(tokens))
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn generate_user(&self) -> TestUser {
        let token = self.tokens.next_token();
        debug!(token = %token, "generated test user");
        TestUser {
            email: format!("test.user.{}@example.com", token),
            password: TEST_PASSWORD.to_string(),
            household_name: format!("TestHousehold_{}", token),
        }
    }

    pub fn generate_transaction(&self) -> Transaction {
        let token = self.tokens.next_token();
        let now = self.clock.now();
        debug!(token = %token, "generated transaction");
        Transaction {
            payee: format!("TestPayee_{}", token),
            amount: DEFAULT_AMOUNT.to_string(),
            envelope: DEFAULT_ENVELOPE.to_string(),
            account: DEFAULT_ACCOUNT.to_string(),
            date: Some(us_short_date(self.clock.today())),
            notes: Some(format!("Test transaction created at {}", iso_instant(now))),
        }
    }

    /// Two splits, 60/40 of a 100.00 total
    pub fn generate_split_transaction(&self) -> SplitTransaction {
        let token = self.tokens.next_token();
        debug!(token = %token, "generated split transaction");
        SplitTransaction {
            payee: format!("SplitPayee_{}", token),
            total_amount: DEFAULT_SPLIT_TOTAL.to_string(),
            splits: vec![
                Split::new(DEFAULT_ENVELOPE, "60.00"),
                Split::new(SECONDARY_ENVELOPE, "40.00"),
            ],
            account: DEFAULT_ACCOUNT.to_string(),
            date: Some(us_short_date(self.clock.today())),
        }
    }
}

/// Uniform integer in `min..=max`
pub fn random_between(min: i64, max: i64) -> i64 {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    rand::thread_rng().gen_range(lo..=hi)
}
