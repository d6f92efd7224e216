//! Selector table: semantic UI roles mapped to locator expressions
//!
//! Scripts never embed markup details. They name a [`Role`] and the table
//! turns it into a Playwright selector. Every selector is a disjunction of
//! independent strategies, so a role keeps resolving when the markup changes
//! as long as one branch still matches.
//!
//! The table is built once at startup, optionally with overrides, and is
//! immutable afterwards. Share it by reference or `Arc`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FixtureError, Result};

/// Semantic role of a UI element referenced by scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    // Homepage
    MainHeading,
    LoginLink,

    // Authentication
    LoginForm,
    EmailInput,
    PasswordInput,
    LoginButton,
    SignupLink,
    StaySignedInCheckbox,

    // Navigation
    AddTransactionButton,
    TransactionsTab,
    EnvelopesTab,

    // Transaction form
    TransactionForm,
    PayeeInput,
    AmountInput,
    EnvelopeSelect,
    AccountSelect,
    DateInput,
    NotesInput,
    SaveButton,

    // Split transaction
    SplitOption,
    SplitRows,
    SplitEnvelopeSelect,
    SplitAmountInput,

    // Validation and messages
    ErrorMessage,
    SuccessMessage,
    ValidationError,

    // Common
    Modal,
    CloseButton,
    ConfirmButton,
    CancelButton,
}

impl Role {
    pub const ALL: [Role; 30] = [
        Role::MainHeading,
        Role::LoginLink,
        Role::LoginForm,
        Role::EmailInput,
        Role::PasswordInput,
        Role::LoginButton,
        Role::SignupLink,
        Role::StaySignedInCheckbox,
        Role::AddTransactionButton,
        Role::TransactionsTab,
        Role::EnvelopesTab,
        Role::TransactionForm,
        Role::PayeeInput,
        Role::AmountInput,
        Role::EnvelopeSelect,
        Role::AccountSelect,
        Role::DateInput,
        Role::NotesInput,
        Role::SaveButton,
        Role::SplitOption,
        Role::SplitRows,
        Role::SplitEnvelopeSelect,
        Role::SplitAmountInput,
        Role::ErrorMessage,
        Role::SuccessMessage,
        Role::ValidationError,
        Role::Modal,
        Role::CloseButton,
        Role::ConfirmButton,
        Role::CancelButton,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::MainHeading => "mainHeading",
            Role::LoginLink => "loginLink",
            Role::LoginForm => "loginForm",
            Role::EmailInput => "emailInput",
            Role::PasswordInput => "passwordInput",
            Role::LoginButton => "loginButton",
            Role::SignupLink => "signupLink",
            Role::StaySignedInCheckbox => "staySignedInCheckbox",
            Role::AddTransactionButton => "addTransactionButton",
            Role::TransactionsTab => "transactionsTab",
            Role::EnvelopesTab => "envelopesTab",
            Role::TransactionForm => "transactionForm",
            Role::PayeeInput => "payeeInput",
            Role::AmountInput => "amountInput",
            Role::EnvelopeSelect => "envelopeSelect",
            Role::AccountSelect => "accountSelect",
            Role::DateInput => "dateInput",
            Role::NotesInput => "notesInput",
            Role::SaveButton => "saveButton",
            Role::SplitOption => "splitOption",
            Role::SplitRows => "splitRows",
            Role::SplitEnvelopeSelect => "splitEnvelopeSelect",
            Role::SplitAmountInput => "splitAmountInput",
            Role::ErrorMessage => "errorMessage",
            Role::SuccessMessage => "successMessage",
            Role::ValidationError => "validationError",
            Role::Modal => "modal",
            Role::CloseButton => "closeButton",
            Role::ConfirmButton => "confirmButton",
            Role::CancelButton => "cancelButton",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One way of matching an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Plain CSS, usually an attribute match
    Css(String),
    /// Element of `tag` whose text contains `text` (case-insensitive)
    HasText { tag: String, text: String },
    /// `data-testid` attribute match
    TestId(String),
}

impl Strategy {
    pub fn css(selector: impl Into<String>) -> Self {
        Strategy::Css(selector.into())
    }

    pub fn has_text(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Strategy::HasText {
            tag: tag.into(),
            text: text.into(),
        }
    }

    pub fn test_id(id: impl Into<String>) -> Self {
        Strategy::TestId(id.into())
    }

    /// Render as a Playwright CSS selector
    pub fn to_expression(&self) -> String {
        match self {
            Strategy::Css(css) => css.clone(),
            Strategy::HasText { tag, text } => {
                format!("{}:has-text(\"{}\")", tag, escape_quoted(text))
            }
            Strategy::TestId(id) => format!("[data-testid=\"{}\"]", escape_quoted(id)),
        }
    }
}

fn escape_quoted(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// OR-combination of match strategies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selector {
    strategies: Vec<Strategy>,
}

impl Selector {
    pub fn any_of(strategies: impl IntoIterator<Item = Strategy>) -> Self {
        Self {
            strategies: strategies.into_iter().collect(),
        }
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Comma-joined selector list; matches if any branch matches
    pub fn expression(&self) -> String {
        self.strategies
            .iter()
            .map(Strategy::to_expression)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression())
    }
}

/// Complete, immutable mapping from every [`Role`] to its [`Selector`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorTable {
    // indexed by `Role as usize`, one entry per role
    entries: Vec<Selector>,
}

impl SelectorTable {
    /// The selectors matching the current Goodbudget markup
    pub fn standard() -> Self {
        Self {
            entries: Role::ALL.iter().map(|role| standard_selector(*role)).collect(),
        }
    }

    /// Standard table with some entries replaced
    pub fn with_overrides(overrides: BTreeMap<Role, Selector>) -> Result<Self> {
        let mut table = Self::standard();
        for (role, selector) in overrides {
            if selector.strategies.is_empty() {
                return Err(FixtureError::EmptySelector(role));
            }
            table.entries[role.index()] = selector;
        }
        Ok(table)
    }

    /// Table built entirely from `map`, which must cover every role
    pub fn from_map(mut map: BTreeMap<Role, Selector>) -> Result<Self> {
        let mut entries = Vec::with_capacity(Role::ALL.len());
        for role in Role::ALL {
            let selector = map.remove(&role).ok_or(FixtureError::MissingRole(role))?;
            if selector.strategies.is_empty() {
                return Err(FixtureError::EmptySelector(role));
            }
            entries.push(selector);
        }
        Ok(Self { entries })
    }

    pub fn get(&self, role: Role) -> &Selector {
        &self.entries[role.index()]
    }

    pub fn expression(&self, role: Role) -> String {
        self.get(role).expression()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, &Selector)> {
        Role::ALL.iter().copied().zip(self.entries.iter())
    }

    pub fn to_map(&self) -> BTreeMap<Role, Selector> {
        self.iter().map(|(role, selector)| (role, selector.clone())).collect()
    }
}

impl Default for SelectorTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn standard_selector(role: Role) -> Selector {
    use Strategy as S;

    let strategies = match role {
        Role::MainHeading => vec![
            S::has_text("h1", "Budget with the envelope system"),
            S::has_text("[role=\"heading\"]", "Budget with the envelope system"),
        ],
        Role::LoginLink => vec![S::css("a[href*=\"login\"]"), S::has_text("a", "Log In")],

        Role::LoginForm => vec![S::test_id("login-form"), S::css("form[action*=\"login\"]")],
        Role::EmailInput => vec![S::css("input[name=\"email\"]"), S::css("input[type=\"email\"]")],
        Role::PasswordInput => vec![
            S::css("input[name=\"password\"]"),
            S::css("input[type=\"password\"]"),
        ],
        Role::LoginButton => vec![S::css("button[type=\"submit\"]"), S::css("input[type=\"submit\"]")],
        Role::SignupLink => vec![S::css("a[href*=\"signup\"]"), S::has_text("a", "Sign up")],
        Role::StaySignedInCheckbox => vec![
            S::test_id("stay-signed-in"),
            S::css("input[type=\"checkbox\"][name*=\"remember\"]"),
            S::css("label:has-text(\"Stay signed in\") input[type=\"checkbox\"]"),
        ],

        Role::AddTransactionButton => vec![
            S::has_text("button", "Add Transaction"),
            S::has_text("a", "Add Transaction"),
        ],
        Role::TransactionsTab => vec![S::has_text("a", "Transactions"), S::test_id("transactions-tab")],
        Role::EnvelopesTab => vec![S::has_text("a", "Envelopes"), S::test_id("envelopes-tab")],

        Role::TransactionForm => vec![
            S::test_id("transaction-form"),
            S::css("form[action*=\"transaction\"]"),
        ],
        Role::PayeeInput => vec![S::css("input[name=\"payee\"]"), S::test_id("payee-input")],
        Role::AmountInput => vec![S::css("input[name=\"amount\"]"), S::test_id("amount-input")],
        Role::EnvelopeSelect => vec![S::css("select[name=\"envelope\"]"), S::test_id("envelope-select")],
        Role::AccountSelect => vec![S::css("select[name=\"account\"]"), S::test_id("account-select")],
        Role::DateInput => vec![S::css("input[name=\"date\"]"), S::css("input[type=\"date\"]")],
        Role::NotesInput => vec![S::css("textarea[name=\"notes\"]"), S::test_id("notes-input")],
        Role::SaveButton => vec![S::has_text("button", "Save"), S::css("input[value=\"Save\"]")],

        Role::SplitOption => vec![S::has_text("option", "Split"), S::test_id("split-option")],
        Role::SplitRows => vec![S::test_id("split-row"), S::css(".split-row")],
        Role::SplitEnvelopeSelect => vec![S::test_id("split-envelope"), S::css(".split-envelope select")],
        Role::SplitAmountInput => vec![S::test_id("split-amount"), S::css(".split-amount input")],

        Role::ErrorMessage => vec![S::css(".error"), S::test_id("error"), S::css(".alert-danger")],
        Role::SuccessMessage => vec![S::css(".success"), S::test_id("success"), S::css(".alert-success")],
        Role::ValidationError => vec![S::css(".validation-error"), S::test_id("validation-error")],

        Role::Modal => vec![S::css(".modal"), S::test_id("modal")],
        Role::CloseButton => vec![S::has_text("button", "Close"), S::test_id("close")],
        Role::ConfirmButton => vec![S::has_text("button", "Confirm"), S::test_id("confirm")],
        Role::CancelButton => vec![S::has_text("button", "Cancel"), S::test_id("cancel")],
    };

    Selector::any_of(strategies)
}
