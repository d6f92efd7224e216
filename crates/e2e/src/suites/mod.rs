//! Built-in Goodbudget suites
//!
//! Each builder takes the fixture generator and draws fresh records per
//! scenario. Suites that embed records carry their builder, and the runner
//! rebuilds them for every attempt on every project, so no two executions
//! share a payee or an email address.

mod authentication;
mod homepage;
mod single_transaction;
mod split_transaction;

use goodbudget_fixtures::{FixtureGenerator, Role};

use crate::error::E2eResult;
use crate::spec::{Condition, Step, Suite, Target};

pub use authentication::authentication;
pub use homepage::homepage;
pub use single_transaction::single_transaction;
pub use split_transaction::split_transaction;

/// Label of the envelope option that turns a transaction into a split
pub const SPLIT_OPTION_LABEL: &str = "Split into Multiple";

/// Every built-in suite, in run order
pub fn all(fixtures: &FixtureGenerator) -> E2eResult<Vec<Suite>> {
    Ok(vec![
        homepage(),
        authentication(fixtures),
        single_transaction(fixtures),
        split_transaction(fixtures)?,
    ])
}

/// First match of a role, for page-level clicks and fills
pub(crate) fn first(role: Role) -> Target {
    Target::role(role).first()
}

/// Open the site root and wait for the network to settle
pub(crate) fn open_home() -> Vec<Step> {
    vec![Step::navigate("/")]
}

pub(crate) fn open_transaction_form() -> Step {
    Step::click_and_settle(first(Role::AddTransactionButton))
}

/// Switch the envelope dropdown to split mode and give the rows time to render
pub(crate) fn choose_split() -> Vec<Step> {
    vec![
        Step::select_label(Role::EnvelopeSelect, SPLIT_OPTION_LABEL),
        Step::sleep(1000),
    ]
}

/// Run `steps` only when `role` is on screen
pub(crate) fn if_visible(role: impl Into<Target>, steps: Vec<Step>) -> Step {
    Step::when(Condition::visible(role), steps)
}

/// Pick the first real option (index 1) when the dropdown has one
pub(crate) fn select_first_real_option(role: Role) -> Step {
    if_visible(
        role,
        vec![Step::when(
            Condition::count_at_least(Target::role(role).options(), 2),
            vec![Step::select_index(role, 1)],
        )],
    )
}

/// Saved: a success message, or the browser left the creation page
pub(crate) fn saved() -> Condition {
    Condition::any([
        Condition::visible(Role::SuccessMessage),
        Condition::url_contains("add").negate(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use goodbudget_fixtures::{FixedClock, SelectorTable};

    fn fixtures() -> FixtureGenerator {
        FixtureGenerator::with_clock(FixedClock::from_millis(1_700_000_000_123))
    }

    #[test]
    fn test_all_suites_built() {
        let suites = all(&fixtures()).unwrap();
        let names: Vec<&str> = suites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Goodbudget Homepage",
                "Authentication Flow",
                "Single Transaction Management",
                "Split Transaction Management"
            ]
        );
        let counts: Vec<usize> = suites.iter().map(|s| s.scenarios.len()).collect();
        assert_eq!(counts, vec![2, 9, 10, 9]);
    }

    #[test]
    fn test_every_referenced_role_resolves() {
        let table = SelectorTable::standard();
        for suite in all(&fixtures()).unwrap() {
            for role in suite.referenced_roles() {
                assert!(
                    !table.expression(role).is_empty(),
                    "{} references {} with no selector",
                    suite.name,
                    role
                );
            }
        }
    }

    #[test]
    fn test_suites_with_records_can_be_rebuilt() {
        let fixtures = FixtureGenerator::with_counter_tokens(FixedClock::from_millis(1_700_000_000_123));
        let suites = all(&fixtures).unwrap();
        let rebuildable: Vec<&str> = suites
            .iter()
            .filter(|s| s.rebuild.is_some())
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(
            rebuildable,
            vec![
                "Authentication Flow",
                "Single Transaction Management",
                "Split Transaction Management"
            ]
        );

        for suite in &suites {
            if let Some(fresh) = suite.regenerate(&fixtures).unwrap() {
                let first: Vec<&str> = suite.scenarios.iter().map(|s| s.name.as_str()).collect();
                let second: Vec<&str> = fresh.scenarios.iter().map(|s| s.name.as_str()).collect();
                assert_eq!(first, second);
                assert_ne!(
                    serde_json::to_string(&suite.scenarios).unwrap(),
                    serde_json::to_string(&fresh.scenarios).unwrap(),
                    "{} reused its records",
                    suite.name
                );
            }
        }
    }

    #[test]
    fn test_scenario_names_unique_within_suite() {
        for suite in all(&fixtures()).unwrap() {
            let mut names: Vec<&str> = suite.scenarios.iter().map(|s| s.name.as_str()).collect();
            let before = names.len();
            names.sort_unstable();
            names.dedup();
            assert_eq!(before, names.len(), "duplicate scenario in {}", suite.name);
        }
    }

    #[test]
    fn test_known_defects_are_probed() {
        let suites = all(&fixtures()).unwrap();
        let probing: Vec<(&str, &str)> = suites
            .iter()
            .flat_map(|s| s.scenarios.iter())
            .filter_map(|s| s.known_defect.as_deref().map(|issue| (s.name.as_str(), issue)))
            .collect();
        assert_eq!(probing.len(), 2);

        for suite in &suites {
            for scenario in &suite.scenarios {
                let probes = count_probes(&scenario.steps);
                assert_eq!(
                    probes > 0,
                    scenario.known_defect.is_some(),
                    "{} › {}",
                    suite.name,
                    scenario.name
                );
            }
        }
    }

    fn count_probes(steps: &[Step]) -> usize {
        steps
            .iter()
            .map(|step| match step {
                Step::Probe { .. } => 1,
                Step::When { steps, .. } => count_probes(steps),
                _ => 0,
            })
            .sum()
    }
}
