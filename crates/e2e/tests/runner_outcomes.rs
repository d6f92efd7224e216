//! Runner retry and outcome classification, driven by a scripted executor

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use goodbudget_e2e::runner::{ExecutionRequest, ScenarioRun, StepRecord, Verdict};
use goodbudget_e2e::{
    suites, E2eError, E2eResult, Outcome, RunConfig, Scenario, ScenarioExecutor, Selection, Step,
    Suite, TestRunner,
};
use goodbudget_fixtures::{FixedClock, FixtureGenerator, Role};

/// Returns a fixed verdict per attempt, repeating the last one
struct ScriptedExecutor {
    verdicts: HashMap<String, Vec<Verdict>>,
    calls: Mutex<Vec<(String, String, u32)>>,
}

impl ScriptedExecutor {
    fn new(verdicts: &[(&str, Vec<Verdict>)]) -> Self {
        Self {
            verdicts: verdicts
                .iter()
                .map(|(name, v)| (name.to_string(), v.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ScenarioExecutor for ScriptedExecutor {
    async fn execute(&self, request: &ExecutionRequest<'_>) -> E2eResult<ScenarioRun> {
        self.calls.lock().unwrap().push((
            request.project.name.clone(),
            request.scenario.name.clone(),
            request.attempt,
        ));

        if request.scenario.name == "cannot spawn" {
            return Err(E2eError::Playwright("failed to spawn node".into()));
        }

        let script = &self.verdicts[&request.scenario.name];
        let verdict = script
            .get(request.attempt as usize)
            .or_else(|| script.last())
            .cloned()
            .unwrap();

        Ok(ScenarioRun {
            verdict,
            steps: vec![
                StepRecord {
                    index: 1,
                    name: "navigate:/".into(),
                },
                StepRecord {
                    index: 2,
                    name: "click:saveButton[0]".into(),
                },
            ],
            artifacts: vec![],
            duration_ms: 5,
        })
    }
}

fn failed(msg: &str) -> Verdict {
    Verdict::Failed {
        step: Some(2),
        error: msg.into(),
    }
}

fn config(retries: u32, projects: &[&str]) -> RunConfig {
    let mut config = RunConfig::for_environment(false);
    config.retries = retries;
    config.workers = 3;
    config.probe_site = false;
    config.web_server = None;
    config
        .restrict_projects(&projects.iter().map(|p| p.to_string()).collect::<Vec<_>>())
        .unwrap();
    config
}

fn suite(name: &str, scenarios: &[&str]) -> Suite {
    Suite::new(
        name,
        vec![Step::navigate("/")],
        scenarios
            .iter()
            .map(|s| Scenario::new(*s, vec![Step::click(Role::SaveButton)]))
            .collect(),
    )
}

#[tokio::test]
async fn retries_turn_a_late_pass_into_flaky() {
    let executor = ScriptedExecutor::new(&[
        ("steady", vec![Verdict::Passed]),
        ("wobbly", vec![failed("timeout"), Verdict::Passed]),
        ("broken", vec![failed("expected visible")]),
    ]);
    let runner = TestRunner::with_executor(config(2, &["chromium"]), executor);

    let results = runner
        .run(&[suite("Checkout", &["steady", "wobbly", "broken"])], &Selection::default())
        .await
        .unwrap();

    assert_eq!((results.passed, results.flaky, results.failed), (1, 1, 1));
    assert_eq!(results.exit_code(), 1);

    let broken = &results.results[2];
    assert_eq!(broken.outcome, Outcome::Failed);
    assert_eq!(broken.attempts, 3);
    assert_eq!(broken.failed_step.as_deref(), Some("click:saveButton[0]"));

    let wobbly = &results.results[1];
    assert_eq!(wobbly.outcome, Outcome::Flaky);
    assert_eq!(wobbly.attempts, 2);
    assert!(wobbly.error.is_none());
}

#[tokio::test]
async fn reproduced_defect_is_not_retried() {
    let executor = ScriptedExecutor::new(&[(
        "uneven split",
        vec![Verdict::DefectReproduced {
            issue: "issue-1".into(),
            error: "Known defect issue-1 reproduced".into(),
        }],
    )]);
    let runner = TestRunner::with_executor(config(2, &["chromium"]), executor);

    let results = runner
        .run(&[suite("Split", &["uneven split"])], &Selection::default())
        .await
        .unwrap();

    assert_eq!(results.defects, 1);
    assert_eq!(
        results.results[0].outcome,
        Outcome::DefectReproduced {
            issue: "issue-1".into()
        }
    );
    assert_eq!(results.results[0].attempts, 1);
    assert_eq!(results.exit_code(), 1);
}

#[tokio::test]
async fn executor_errors_are_infra_errors() {
    let executor = ScriptedExecutor::new(&[("fine", vec![Verdict::Passed])]);
    let runner = TestRunner::with_executor(config(1, &["chromium"]), executor);

    let results = runner
        .run(&[suite("Infra", &["fine", "cannot spawn"])], &Selection::default())
        .await
        .unwrap();

    let failed = &results.results[1];
    assert_eq!(failed.outcome, Outcome::InfraError);
    assert_eq!(failed.attempts, 2, "infrastructure failures are retried too");
    assert!(failed.error.as_deref().unwrap().contains("failed to spawn node"));
    assert_eq!(results.exit_code(), 2);
}

#[tokio::test]
async fn skipped_scenarios_never_reach_the_executor() {
    let executor = ScriptedExecutor::new(&[("runs", vec![Verdict::Passed])]);
    let mut s = suite("Skips", &["runs", "parked"]);
    s.scenarios[1].skip = true;

    let executor = Arc::new(executor);
    let runner = TestRunner::with_executor(config(0, &["chromium"]), executor.clone());
    let results = runner.run(&[s], &Selection::default()).await.unwrap();

    let calls = executor.calls.lock().unwrap().clone();
    assert_eq!(calls, vec![("chromium".to_string(), "runs".to_string(), 0)]);
    assert_eq!((results.passed, results.skipped), (1, 1));
    assert_eq!(results.results[1].attempts, 0);
    assert!(results.success());
}

#[tokio::test]
async fn every_suite_runs_on_every_project_in_plan_order() {
    let executor = ScriptedExecutor::new(&[
        ("a1", vec![Verdict::Passed]),
        ("a2", vec![Verdict::Passed]),
        ("b1", vec![Verdict::Passed]),
    ]);
    let runner = TestRunner::with_executor(config(0, &["chromium", "firefox", "Mobile Safari"]), executor);

    let results = runner
        .run(&[suite("A", &["a1", "a2"]), suite("B", &["b1"])], &Selection::default())
        .await
        .unwrap();

    assert_eq!(results.total, 9);
    let order: Vec<(String, String)> = results
        .results
        .iter()
        .map(|r| (r.project.clone(), r.scenario.clone()))
        .collect();
    assert_eq!(order[0], ("chromium".to_string(), "a1".to_string()));
    assert_eq!(order[2], ("chromium".to_string(), "b1".to_string()));
    assert_eq!(order[8], ("Mobile Safari".to_string(), "b1".to_string()));
}

#[tokio::test]
async fn focused_scenarios_are_rejected_in_ci() {
    let executor = ScriptedExecutor::new(&[("focus", vec![Verdict::Passed])]);
    let mut s = suite("Focus", &["focus", "other"]);
    s.scenarios[0].only = true;

    let mut ci = config(0, &["chromium"]);
    ci.forbid_only = true;
    let runner = TestRunner::with_executor(ci, executor);

    let err = runner.run(&[s], &Selection::default()).await.unwrap_err();
    assert!(matches!(err, E2eError::ForbiddenOnly(ref names) if names == &vec!["Focus › focus".to_string()]));
}

#[tokio::test]
async fn grep_narrows_the_run() {
    let executor = ScriptedExecutor::new(&[("wanted", vec![Verdict::Passed])]);
    let runner = TestRunner::with_executor(config(0, &["chromium"]), executor);

    let results = runner
        .run(
            &[suite("Picky", &["wanted", "unwanted"])],
            &Selection::grep("› wanted$").unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(results.total, 1);
    assert_eq!(results.results[0].scenario, "wanted");
}

/// Fails every attempt and records the payee each one typed
#[derive(Default)]
struct PayeeRecorder {
    payees: Mutex<Vec<(String, u32, String)>>,
}

#[async_trait]
impl ScenarioExecutor for PayeeRecorder {
    async fn execute(&self, request: &ExecutionRequest<'_>) -> E2eResult<ScenarioRun> {
        let payee = request
            .suite
            .steps_for(request.scenario)
            .into_iter()
            .find_map(|step| match step {
                Step::Fill { target, value } if target.referenced_role() == Some(Role::PayeeInput) => {
                    Some(value)
                }
                _ => None,
            })
            .unwrap_or_default();
        self.payees
            .lock()
            .unwrap()
            .push((request.project.name.clone(), request.attempt, payee));

        Ok(ScenarioRun {
            verdict: failed("no success message"),
            steps: vec![],
            artifacts: vec![],
            duration_ms: 1,
        })
    }
}

#[tokio::test]
async fn every_project_and_retry_gets_its_own_records() {
    let fixtures = FixtureGenerator::with_counter_tokens(FixedClock::from_millis(1_700_000_000_123));
    let builtin = suites::all(&fixtures).unwrap();

    let recorder = Arc::new(PayeeRecorder::default());
    let mut config = config(1, &[]);
    config.workers = 5;
    let runner = TestRunner::with_executor(config, recorder.clone()).with_fixtures(fixtures);

    let results = runner
        .run(&builtin, &Selection::grep("save transaction successfully").unwrap())
        .await
        .unwrap();
    assert_eq!(results.total, 5);

    let payees = recorder.payees.lock().unwrap().clone();
    assert_eq!(payees.len(), 10, "five projects, two attempts each");
    assert!(payees.iter().all(|(_, _, payee)| payee.starts_with("TestPayee_")));

    let distinct: HashSet<&str> = payees.iter().map(|(_, _, payee)| payee.as_str()).collect();
    assert_eq!(distinct.len(), 10, "records were shared: {:?}", payees);
}
