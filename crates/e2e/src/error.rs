//! Error types for E2E testing
//!
//! These are harness failures. A scenario whose assertions fail, or whose
//! known-defect probe fires, is not an error here; it is recorded as an
//! [`Outcome`](crate::runner::Outcome) on the scenario result.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Web server failed to start: {0}")]
    ServerStartup(String),

    #[error("Web server health check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("Site {url} is not reachable: {reason}")]
    SiteUnreachable { url: String, reason: String },

    #[error("Playwright not found. Install with: npm install -D @playwright/test && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Focused scenarios are not allowed in CI: {}", .0.join(", "))]
    ForbiddenOnly(Vec<String>),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Fixture error: {0}")]
    Fixture(#[from] goodbudget_fixtures::FixtureError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
