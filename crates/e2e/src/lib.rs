//! Goodbudget E2E Test Framework
//!
//! This crate provides a Rust-controlled E2E test runner that:
//! - Starts the local web server (outside CI) and probes the site under test
//! - Compiles declarative scenarios into Playwright scripts and runs them in Node
//! - Runs every suite on every browser project with retries and bounded workers
//! - Classifies outcomes, including reproduced known product defects
//! - Writes JSON and JUnit reports
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── prepare() -> ServerHandle, site probe                │
//! │    ├── run(suites, selection) -> TestSuiteResult            │
//! │    │     └── (project, suite) jobs, buffer_unordered        │
//! │    └── run_scenario() -> retries -> Outcome                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioExecutor (PlaywrightHandle)                        │
//! │    ├── ScriptBuilder: Step -> JavaScript                    │
//! │    └── node scenario.js -> @@e2e events -> Verdict          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Suite (built-in or YAML)                                   │
//! │    ├── before_each: [Step]                                  │
//! │    └── scenarios: [Scenario]                                │
//! │          ├── navigate | click | fill | press | select ...   │
//! │          ├── expect { visible, value, count, url, ... }     │
//! │          ├── assert / when { condition }                    │
//! │          └── probe { issue, reproduced_when }               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Selectors come from the [`goodbudget_fixtures::SelectorTable`]; scenario
//! data comes from the [`goodbudget_fixtures::FixtureGenerator`].

pub mod config;
pub mod error;
pub mod playwright;
pub mod report;
pub mod runner;
pub mod server;
pub mod spec;
pub mod suites;

pub use config::RunConfig;
pub use error::{E2eError, E2eResult};
pub use runner::{Outcome, ScenarioExecutor, Selection, TestRunner, TestSuiteResult};
pub use spec::{Scenario, Step, Suite};
