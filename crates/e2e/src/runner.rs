//! Main test runner that orchestrates the web server, Playwright and retries

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use goodbudget_fixtures::{FixtureGenerator, SystemClock};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{Project, RunConfig};
use crate::error::{E2eError, E2eResult};
use crate::playwright::PlaywrightHandle;
use crate::server::{check_site_reachable, ServerHandle};
use crate::spec::{Scenario, Suite};

/// One attempt of one scenario on one project
pub struct ExecutionRequest<'a> {
    pub suite: &'a Suite,
    pub scenario: &'a Scenario,
    pub project: &'a Project,
    /// 0 for the first run, 1 for the first retry, ...
    pub attempt: u32,
}

/// Runs a single scenario attempt
#[async_trait]
pub trait ScenarioExecutor: Send + Sync {
    async fn execute(&self, request: &ExecutionRequest<'_>) -> E2eResult<ScenarioRun>;
}

#[async_trait]
impl<T: ScenarioExecutor + ?Sized> ScenarioExecutor for Arc<T> {
    async fn execute(&self, request: &ExecutionRequest<'_>) -> E2eResult<ScenarioRun> {
        (**self).execute(request).await
    }
}

/// Raw result of a single attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed { step: Option<usize>, error: String },
    DefectReproduced { issue: String, error: String },
    InfraError { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub name: String,
}

/// Trace, video or screenshot saved by an attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRun {
    pub verdict: Verdict,
    /// Steps that started, in order
    pub steps: Vec<StepRecord>,
    pub artifacts: Vec<Artifact>,
    pub duration_ms: u64,
}

/// Final classification of a scenario on one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    /// Passed, but only after a retry
    Flaky,
    Failed,
    /// A known-defect probe fired; the product bug is live
    DefectReproduced { issue: String },
    /// The harness could not run the scenario
    InfraError,
    Skipped,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Passed | Outcome::Flaky | Outcome::Skipped)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Outcome::Passed => "✓",
            Outcome::Flaky => "~",
            Outcome::Failed => "✗",
            Outcome::DefectReproduced { .. } => "!",
            Outcome::InfraError => "✗",
            Outcome::Skipped => "-",
        }
    }
}

/// Result of running a single scenario on one project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub suite: String,
    pub scenario: String,
    pub project: String,
    pub outcome: Outcome,
    /// Number of attempts made (0 when skipped)
    pub attempts: u32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Name of the step that failed on the final attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    pub steps: Vec<StepRecord>,
    pub artifacts: Vec<Artifact>,
}

impl ScenarioResult {
    /// `suite › scenario` as shown in reports
    pub fn title(&self) -> String {
        format!("{} › {}", self.suite, self.scenario)
    }

    fn skipped(suite: &Suite, scenario: &Scenario, project: &Project) -> Self {
        Self {
            suite: suite.name.clone(),
            scenario: scenario.name.clone(),
            project: project.name.clone(),
            outcome: Outcome::Skipped,
            attempts: 0,
            duration_ms: 0,
            error: None,
            failed_step: None,
            steps: Vec::new(),
            artifacts: Vec::new(),
        }
    }
}

/// Result of running all tests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSuiteResult {
    #[serde(default)]
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub flaky: usize,
    pub failed: usize,
    pub defects: usize,
    pub infra_errors: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl TestSuiteResult {
    pub fn from_results(results: Vec<ScenarioResult>, duration_ms: u64) -> Self {
        let mut summary = TestSuiteResult {
            total: results.len(),
            duration_ms,
            ..Default::default()
        };
        for result in &results {
            match result.outcome {
                Outcome::Passed => summary.passed += 1,
                Outcome::Flaky => summary.flaky += 1,
                Outcome::Failed => summary.failed += 1,
                Outcome::DefectReproduced { .. } => summary.defects += 1,
                Outcome::InfraError => summary.infra_errors += 1,
                Outcome::Skipped => summary.skipped += 1,
            }
        }
        summary.results = results;
        summary
    }

    pub fn success(&self) -> bool {
        self.failed == 0 && self.defects == 0 && self.infra_errors == 0
    }

    pub fn has_infra_errors(&self) -> bool {
        self.infra_errors > 0
    }

    /// 0 all good, 1 failures or reproduced defects, 2 infrastructure errors
    pub fn exit_code(&self) -> i32 {
        if self.has_infra_errors() {
            2
        } else if self.success() {
            0
        } else {
            1
        }
    }
}

/// Which scenarios to run
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Matched against `suite › scenario`
    pub grep: Option<Regex>,
    /// Scenario must carry at least one of these tags
    pub tags: Vec<String>,
}

impl Selection {
    pub fn grep(pattern: &str) -> E2eResult<Self> {
        Ok(Self {
            grep: Some(Regex::new(pattern)?),
            tags: Vec::new(),
        })
    }

    pub fn with_tags(mut self, tags: &[String]) -> Self {
        self.tags.extend(tags.iter().cloned());
        self
    }

    pub fn matches(&self, suite: &Suite, scenario: &Scenario) -> bool {
        if let Some(re) = &self.grep {
            let title = format!("{} › {}", suite.name, scenario.name);
            if !re.is_match(&title) {
                return false;
            }
        }
        self.tags.is_empty() || self.tags.iter().any(|t| scenario.has_tag(t))
    }
}

/// A suite narrowed to the scenarios selected for this run
#[derive(Debug, Clone)]
pub struct PlannedSuite {
    pub suite: Suite,
}

/// Decide what runs: enforce `forbid_only`, honour focused scenarios, filter
pub fn plan(suites: &[Suite], selection: &Selection, forbid_only: bool) -> E2eResult<Vec<PlannedSuite>> {
    let focused: Vec<String> = suites
        .iter()
        .flat_map(|suite| {
            suite
                .scenarios
                .iter()
                .filter(|s| s.only)
                .map(move |s| format!("{} › {}", suite.name, s.name))
        })
        .collect();

    if forbid_only && !focused.is_empty() {
        return Err(E2eError::ForbiddenOnly(focused));
    }
    let focus = !focused.is_empty();

    let planned: Vec<PlannedSuite> = suites
        .iter()
        .filter_map(|suite| {
            let scenarios: Vec<Scenario> = suite
                .scenarios
                .iter()
                .filter(|s| !focus || s.only)
                .filter(|s| selection.matches(suite, s))
                .cloned()
                .collect();
            if scenarios.is_empty() {
                return None;
            }
            Some(PlannedSuite {
                suite: Suite {
                    scenarios,
                    ..suite.clone()
                },
            })
        })
        .collect();

    if planned.is_empty() {
        return Err(E2eError::ScenarioNotFound(match &selection.grep {
            Some(re) => format!("nothing matches '{}'", re.as_str()),
            None => "no scenarios selected".to_string(),
        }));
    }

    Ok(planned)
}

/// Main E2E test runner
pub struct TestRunner<E: ScenarioExecutor = PlaywrightHandle> {
    config: Arc<RunConfig>,
    executor: Arc<E>,
    /// Source of fresh records for every attempt of a built-in suite
    fixtures: FixtureGenerator,
    /// Running server handle (if any)
    server: Option<ServerHandle>,
}

impl TestRunner<PlaywrightHandle> {
    /// Create a runner backed by Playwright
    pub fn new(config: RunConfig) -> E2eResult<Self> {
        let selectors = Arc::new(config.selector_table()?);
        let config = Arc::new(config);
        let playwright = PlaywrightHandle::new(config.clone(), selectors)?;
        Ok(Self {
            config,
            executor: Arc::new(playwright),
            fixtures: FixtureGenerator::with_counter_tokens(SystemClock),
            server: None,
        })
    }
}

impl<E: ScenarioExecutor> TestRunner<E> {
    /// Create a runner with a custom executor
    pub fn with_executor(config: RunConfig, executor: E) -> Self {
        Self {
            config: Arc::new(config),
            executor: Arc::new(executor),
            fixtures: FixtureGenerator::with_counter_tokens(SystemClock),
            server: None,
        }
    }

    /// Draw fixture records from `fixtures` instead of the system clock
    pub fn with_fixtures(mut self, fixtures: FixtureGenerator) -> Self {
        self.fixtures = fixtures;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Global setup: local web server (outside CI) and site reachability
    pub async fn prepare(&mut self) -> E2eResult<()> {
        if !self.config.ci && self.server.is_none() {
            if let Some(web_server) = &self.config.web_server {
                self.server = Some(ServerHandle::spawn(web_server).await?);
            }
        }

        if self.config.probe_site {
            info!("Checking {} is reachable", self.config.base_url);
            check_site_reachable(
                &self.config.base_url,
                Duration::from_millis(self.config.timeouts.navigation_ms),
            )
            .await?;
        }
        Ok(())
    }

    /// Stop the server
    pub fn stop_server(&mut self) -> E2eResult<()> {
        if let Some(mut server) = self.server.take() {
            server.stop()?;
        }
        Ok(())
    }

    /// Run the selected scenarios of `suites` on every configured project
    pub async fn run(&self, suites: &[Suite], selection: &Selection) -> E2eResult<TestSuiteResult> {
        let start = Instant::now();
        let started_at = Utc::now();
        let planned = plan(suites, selection, self.config.forbid_only)?;

        let jobs: Vec<(&Project, &Suite)> = self
            .config
            .projects
            .iter()
            .flat_map(|project| planned.iter().map(move |p| (project, &p.suite)))
            .collect();

        let scenario_count: usize = planned.iter().map(|p| p.suite.scenarios.len()).sum();
        info!(
            "Running {} scenario(s) on {} project(s) using {} worker(s)",
            scenario_count,
            self.config.projects.len(),
            self.config.workers
        );

        let mut finished = stream::iter(jobs.into_iter().enumerate())
            .map(|(index, (project, suite))| async move { (index, self.run_suite(project, suite).await) })
            .buffer_unordered(self.config.workers)
            .collect::<Vec<_>>()
            .await;

        // Report in plan order, not completion order
        finished.sort_by_key(|(index, _)| *index);
        let results: Vec<ScenarioResult> = finished.into_iter().flat_map(|(_, r)| r).collect();

        let mut summary = TestSuiteResult::from_results(results, start.elapsed().as_millis() as u64);
        summary.started_at = started_at;
        info!(
            "Test Results: {} passed, {} flaky, {} failed, {} defect(s) reproduced, {} infra error(s), {} skipped ({} ms)",
            summary.passed,
            summary.flaky,
            summary.failed,
            summary.defects,
            summary.infra_errors,
            summary.skipped,
            summary.duration_ms
        );
        Ok(summary)
    }

    /// Scenarios of one suite run in order on one project
    async fn run_suite(&self, project: &Project, suite: &Suite) -> Vec<ScenarioResult> {
        debug!("[{}] suite '{}'", project.name, suite.name);
        let mut results = Vec::with_capacity(suite.scenarios.len());
        for scenario in &suite.scenarios {
            let result = self.run_scenario(project, suite, scenario).await;
            log_result(&result);
            results.push(result);
        }
        results
    }

    /// Run one scenario with retries and classify the outcome
    pub async fn run_scenario(&self, project: &Project, suite: &Suite, scenario: &Scenario) -> ScenarioResult {
        if scenario.skip {
            return ScenarioResult::skipped(suite, scenario, project);
        }

        let start = Instant::now();
        let mut attempt = 0;
        let last_run = loop {
            let run = match self.attempt(project, suite, scenario, attempt).await {
                Ok(run) => run,
                Err(e) => ScenarioRun {
                    verdict: Verdict::InfraError { error: e.to_string() },
                    steps: Vec::new(),
                    artifacts: Vec::new(),
                    duration_ms: 0,
                },
            };

            let retryable = matches!(run.verdict, Verdict::Failed { .. } | Verdict::InfraError { .. });
            if !retryable || attempt >= self.config.retries {
                break run;
            }
            warn!(
                "[{}] {} › {} failed on attempt {}, retrying",
                project.name,
                suite.name,
                scenario.name,
                attempt + 1
            );
            attempt += 1;
        };

        let (outcome, error) = match &last_run.verdict {
            Verdict::Passed if attempt == 0 => (Outcome::Passed, None),
            Verdict::Passed => (Outcome::Flaky, None),
            Verdict::Failed { error, .. } => (Outcome::Failed, Some(error.clone())),
            Verdict::DefectReproduced { issue, error } => {
                (Outcome::DefectReproduced { issue: issue.clone() }, Some(error.clone()))
            }
            Verdict::InfraError { error } => (Outcome::InfraError, Some(error.clone())),
        };

        if outcome.is_success() {
            if let Some(issue) = &scenario.known_defect {
                info!(
                    "{} › {}: probe for {} passed, the defect looks fixed",
                    suite.name, scenario.name, issue
                );
            }
        }

        let failed_step = match &last_run.verdict {
            Verdict::Failed { step: Some(index), .. } => last_run
                .steps
                .iter()
                .find(|s| s.index == *index)
                .map(|s| s.name.clone()),
            Verdict::DefectReproduced { .. } | Verdict::Failed { .. } => {
                last_run.steps.last().map(|s| s.name.clone())
            }
            _ => None,
        };

        ScenarioResult {
            suite: suite.name.clone(),
            scenario: scenario.name.clone(),
            project: project.name.clone(),
            outcome,
            attempts: attempt + 1,
            duration_ms: start.elapsed().as_millis() as u64,
            error,
            failed_step,
            steps: last_run.steps,
            artifacts: last_run.artifacts,
        }
    }

    /// One attempt, on freshly generated records when the suite has a builder
    async fn attempt(
        &self,
        project: &Project,
        suite: &Suite,
        scenario: &Scenario,
        attempt: u32,
    ) -> E2eResult<ScenarioRun> {
        let fresh = suite.regenerate(&self.fixtures)?;
        let (suite, scenario) = match &fresh {
            Some(fresh) => {
                let regenerated = fresh
                    .scenarios
                    .iter()
                    .find(|s| s.name == scenario.name)
                    .ok_or_else(|| {
                        E2eError::ScenarioNotFound(format!(
                            "{} › {} is missing from the regenerated suite",
                            suite.name, scenario.name
                        ))
                    })?;
                (fresh, regenerated)
            }
            None => (suite, scenario),
        };

        let request = ExecutionRequest {
            suite,
            scenario,
            project,
            attempt,
        };
        self.executor.execute(&request).await
    }
}

impl<E: ScenarioExecutor> Drop for TestRunner<E> {
    fn drop(&mut self) {
        let _ = self.stop_server();
    }
}

fn log_result(result: &ScenarioResult) {
    let line = format!(
        "{} [{}] {} ({} ms)",
        result.outcome.symbol(),
        result.project,
        result.title(),
        result.duration_ms
    );
    match &result.outcome {
        Outcome::Passed | Outcome::Skipped => info!("{}", line),
        Outcome::Flaky => warn!("{} flaky after {} attempts", line, result.attempts),
        Outcome::DefectReproduced { issue } => error!(
            "{} - known defect {} reproduced: {}",
            line,
            issue,
            result.error.as_deref().unwrap_or("")
        ),
        Outcome::Failed | Outcome::InfraError => {
            error!("{} - {}", line, result.error.as_deref().unwrap_or("unknown error"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Step;

    fn suite(name: &str, scenarios: Vec<Scenario>) -> Suite {
        Suite::new(name, vec![Step::navigate("/")], scenarios)
    }

    #[test]
    fn test_plan_forbids_only_in_ci() {
        let mut focused = Scenario::new("focused", vec![]);
        focused.only = true;
        let suites = vec![suite("auth", vec![focused, Scenario::new("other", vec![])])];

        match plan(&suites, &Selection::default(), true) {
            Err(E2eError::ForbiddenOnly(names)) => assert_eq!(names, vec!["auth › focused".to_string()]),
            other => panic!("unexpected plan {:?}", other.map(|p| p.len())),
        }

        let planned = plan(&suites, &Selection::default(), false).unwrap();
        assert_eq!(planned[0].suite.scenarios.len(), 1);
        assert_eq!(planned[0].suite.scenarios[0].name, "focused");
    }

    #[test]
    fn test_selection_grep_and_tags() {
        let suites = vec![
            suite(
                "Split Transaction Entry",
                vec![
                    Scenario::new("should display split option", vec![]).tagged(&["split"]),
                    Scenario::new("should reject invalid total", vec![]).tagged(&["split", "validation"]),
                ],
            ),
            suite("Homepage", vec![Scenario::new("has title", vec![]).tagged(&["smoke"])]),
        ];

        let selection = Selection::grep("Split.*invalid").unwrap();
        let planned = plan(&suites, &selection, false).unwrap();
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].suite.scenarios[0].name, "should reject invalid total");
        // before_each survives narrowing
        assert_eq!(planned[0].suite.before_each.len(), 1);

        let selection = Selection::default().with_tags(&["smoke".to_string()]);
        let planned = plan(&suites, &selection, false).unwrap();
        assert_eq!(planned[0].suite.name, "Homepage");

        let selection = Selection::grep("no such scenario").unwrap();
        assert!(matches!(plan(&suites, &selection, false), Err(E2eError::ScenarioNotFound(_))));
    }

    #[test]
    fn test_exit_codes() {
        let mk = |outcome| ScenarioResult {
            suite: "s".into(),
            scenario: "c".into(),
            project: "chromium".into(),
            outcome,
            attempts: 1,
            duration_ms: 1,
            error: None,
            failed_step: None,
            steps: vec![],
            artifacts: vec![],
        };

        let ok = TestSuiteResult::from_results(vec![mk(Outcome::Passed), mk(Outcome::Flaky), mk(Outcome::Skipped)], 3);
        assert!(ok.success());
        assert_eq!(ok.exit_code(), 0);

        let defect = TestSuiteResult::from_results(
            vec![mk(Outcome::Passed), mk(Outcome::DefectReproduced { issue: "issue-1".into() })],
            2,
        );
        assert_eq!(defect.defects, 1);
        assert_eq!(defect.exit_code(), 1);

        let infra = TestSuiteResult::from_results(vec![mk(Outcome::Failed), mk(Outcome::InfraError)], 2);
        assert_eq!(infra.exit_code(), 2);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&Outcome::DefectReproduced { issue: "issue-1".into() }).unwrap();
        assert_eq!(json, r#"{"status":"defect_reproduced","issue":"issue-1"}"#);
        assert_eq!(serde_json::to_string(&Outcome::Flaky).unwrap(), r#"{"status":"flaky"}"#);
    }
}
