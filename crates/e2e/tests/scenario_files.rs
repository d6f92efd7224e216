//! YAML suite discovery and script compilation for every built-in scenario

use std::path::PathBuf;
use std::sync::Arc;

use goodbudget_e2e::playwright::{ScriptBuilder, ScriptContext};
use goodbudget_e2e::{suites, E2eError, RunConfig, Suite};
use goodbudget_fixtures::{FixedClock, FixtureGenerator, Role, SelectorTable};

const SIGNUP_SUITE: &str = r#"
name: Signup
description: Account creation entry points
before_each:
  - action: navigate
    url: /
scenarios:
  - name: signup page has a heading
    tags: [auth, smoke]
    steps:
      - action: click
        target: { role: signupLink, nth: 0 }
        wait_until: network_idle
      - action: expect
        check:
          kind: contains_text
          target: { css: "h1, h2", nth: 0 }
          pattern: { source: "sign.*up", case_insensitive: true }
  - name: household name field
    skip: true
    steps:
      - action: fill
        target: { css: "input[name='household']" }
        value: TestHousehold_1
"#;

#[test]
fn yaml_suites_are_discovered_recursively_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("nested")).unwrap();
    std::fs::write(dir.path().join("nested/b-signup.yaml"), SIGNUP_SUITE).unwrap();
    std::fs::write(
        dir.path().join("a-smoke.yml"),
        "name: Smoke\nscenarios:\n  - name: root\n    steps:\n      - action: navigate\n        url: /\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a suite").unwrap();

    let suites = Suite::load_all(dir.path()).unwrap();
    let names: Vec<&str> = suites.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Smoke", "Signup"]);

    let signup = &suites[1];
    assert!(signup.scenarios[1].skip);
    assert_eq!(signup.referenced_roles(), vec![Role::SignupLink]);
}

#[test]
fn broken_yaml_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, "name: Broken\nscenarios:\n  - name: x\n    steps:\n      - action: teleport\n").unwrap();

    match Suite::load_all(dir.path()) {
        Err(E2eError::ScenarioParse(msg)) => assert!(msg.contains("broken.yaml"), "{}", msg),
        other => panic!("expected a parse error, got {:?}", other.map(|s| s.len())),
    }
}

#[test]
fn every_builtin_scenario_compiles_on_every_project() {
    let config = Arc::new(RunConfig::default());
    let builder = ScriptBuilder::new(config.clone(), Arc::new(SelectorTable::standard()));
    let fixtures = FixtureGenerator::with_clock(FixedClock::from_millis(1_700_000_000_123));

    for suite in suites::all(&fixtures).unwrap() {
        for scenario in &suite.scenarios {
            let steps = suite.steps_for(scenario);
            for project in &config.projects {
                let script = builder.build_script(&ScriptContext {
                    project,
                    steps: &steps,
                    attempt: 0,
                    artifact_dir: PathBuf::from("test-results/artifacts/x"),
                });

                assert!(script.contains("emit({ event: 'done', success: true });"));
                assert!(
                    !script.contains("undefined"),
                    "{} › {} leaked an undefined value",
                    suite.name,
                    scenario.name
                );
                if scenario.known_defect.is_some() {
                    assert!(script.contains("throw new KnownDefect("));
                }
            }
        }
    }
}

#[test]
fn selector_overrides_reach_the_script() {
    let mut config = RunConfig::default();
    config.selectors.insert(
        Role::PayeeInput,
        serde_yaml::from_str("- !test_id payee-field").unwrap(),
    );
    let builder = ScriptBuilder::new(Arc::new(config.clone()), Arc::new(config.selector_table().unwrap()));

    let js = builder.step_to_js(&goodbudget_e2e::Step::fill(Role::PayeeInput, "O'Brien \"Bob\""));
    assert_eq!(
        js,
        r#"await page.locator("[data-testid=\"payee-field\"]").fill("O'Brien \"Bob\"");"#
    );
}
