use goodbudget_fixtures::Role;

use crate::spec::{Expectation, Pattern, Scenario, Step, Suite, Target};

use super::first;

/// Smoke checks against the public landing page
pub fn homepage() -> Suite {
    let mut suite = Suite::new(
        "Goodbudget Homepage",
        vec![],
        vec![
            Scenario::new(
                "should load the homepage",
                vec![
                    Step::navigate("/"),
                    Step::expect(Expectation::TitleMatches {
                        pattern: Pattern::new("Goodbudget"),
                    }),
                    Step::expect(Expectation::Visible {
                        target: Target::role(Role::MainHeading).first(),
                    }),
                ],
            )
            .tagged(&["smoke"]),
            Scenario::new(
                "should have sign up and login buttons",
                vec![
                    Step::navigate("/"),
                    Step::expect(Expectation::Visible {
                        target: first(Role::SignupLink),
                    }),
                    Step::expect(Expectation::Visible {
                        target: first(Role::LoginLink),
                    }),
                ],
            )
            .tagged(&["smoke"]),
        ],
    );
    suite.description = "Public landing page renders with its calls to action".to_string();
    suite
}
