//! Goodbudget test fixtures
//!
//! Synthetic, collision-free records for driving the Goodbudget forms, plus
//! the selector table that maps semantic UI roles to locator expressions.
//!
//! ```
//! use goodbudget_fixtures::{FixtureGenerator, Role, SelectorTable};
//!
//! let fixtures = FixtureGenerator::default();
//! let tx = fixtures.generate_transaction();
//! assert_eq!(tx.amount, "25.50");
//!
//! let selectors = SelectorTable::standard();
//! assert!(selectors.expression(Role::PayeeInput).contains("payee"));
//! ```

pub mod clock;
pub mod error;
pub mod generator;
pub mod money;
pub mod records;
pub mod selectors;

pub use clock::{Clock, CounterTokens, FixedClock, SystemClock, TimestampTokens, TokenSource};
pub use error::{FixtureError, Result};
pub use generator::{random_between, FixtureGenerator, TEST_PASSWORD};
pub use money::{format_currency, parse_currency, Amount};
pub use records::{Split, SplitTransaction, TestUser, Transaction};
pub use selectors::{Role, Selector, SelectorTable, Strategy};
