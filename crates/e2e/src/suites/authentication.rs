use goodbudget_fixtures::{FixtureGenerator, Role};

use crate::spec::{Condition, Expectation, Pattern, Scenario, Step, Suite, Target};

use super::{first, if_visible, open_home};

const LOGIN_PAGE: &str = "/home";

/// Registration and login: the flow that gates the rest of the product
pub fn authentication(fixtures: &FixtureGenerator) -> Suite {
    let stranger = fixtures.generate_user();

    let mut suite = Suite::new(
        "Authentication Flow",
        open_home(),
        vec![
            Scenario::new(
                "should successfully navigate to signup page",
                vec![
                    Step::click_and_settle(first(Role::SignupLink)),
                    Step::expect(Expectation::UrlMatches {
                        pattern: Pattern::new(".*signup.*"),
                    }),
                    Step::expect(Expectation::ContainsText {
                        target: Target::css("h1, h2").first(),
                        pattern: Pattern::ignore_case("sign.*up|create.*account"),
                    }),
                ],
            ),
            Scenario::new(
                "should display login form on home page",
                vec![
                    Step::navigate(LOGIN_PAGE),
                    Step::expect(Expectation::Visible {
                        target: Role::LoginForm.into(),
                    }),
                    Step::expect(Expectation::Visible {
                        target: Role::EmailInput.into(),
                    }),
                    Step::expect(Expectation::Visible {
                        target: Role::PasswordInput.into(),
                    }),
                    Step::expect(Expectation::Visible {
                        target: Role::LoginButton.into(),
                    }),
                ],
            ),
            Scenario::new(
                "should show validation error for empty login form",
                vec![
                    Step::navigate(LOGIN_PAGE),
                    Step::click(first(Role::LoginButton)),
                    Step::assert(
                        Condition::all([
                            Condition::invalid(Role::EmailInput),
                            Condition::invalid(Role::PasswordInput),
                        ]),
                        "empty email and password should both fail browser validation",
                    ),
                ],
            )
            .tagged(&["validation"]),
            Scenario::new(
                "should show error for invalid credentials",
                vec![
                    Step::navigate(LOGIN_PAGE),
                    Step::fill(first(Role::EmailInput), &stranger.email),
                    Step::fill(first(Role::PasswordInput), &stranger.password),
                    Step::click_and_settle(first(Role::LoginButton)),
                    Step::assert(
                        Condition::any([
                            Condition::visible(Role::ErrorMessage),
                            Condition::url_contains("home"),
                            Condition::url_contains("login"),
                        ]),
                        "unknown account was let in: no error shown and the login page was left",
                    ),
                ],
            ),
            Scenario::new(
                "should handle session persistence",
                vec![
                    Step::navigate(LOGIN_PAGE),
                    if_visible(
                        Role::StaySignedInCheckbox,
                        vec![
                            Step::check(first(Role::StaySignedInCheckbox)),
                            Step::expect(Expectation::Checked {
                                target: first(Role::StaySignedInCheckbox),
                            }),
                        ],
                    ),
                ],
            ),
            Scenario::new(
                "should validate email format",
                vec![
                    Step::navigate(LOGIN_PAGE),
                    Step::fill(first(Role::EmailInput), "invalid-email"),
                    Step::fill(first(Role::PasswordInput), "somepassword"),
                    Step::click(first(Role::LoginButton)),
                    Step::assert(
                        Condition::invalid(Role::EmailInput),
                        "'invalid-email' was accepted as an email address",
                    ),
                ],
            )
            .tagged(&["validation"]),
            Scenario::new(
                "should handle password field security",
                vec![
                    Step::navigate(LOGIN_PAGE),
                    Step::expect(Expectation::HasAttribute {
                        target: Role::PasswordInput.into(),
                        name: "type".into(),
                        value: "password".into(),
                    }),
                    Step::fill(Role::PasswordInput, "testpassword123"),
                    Step::expect(Expectation::HasValue {
                        target: Role::PasswordInput.into(),
                        value: "testpassword123".into(),
                    }),
                ],
            ),
            Scenario::new(
                "should support keyboard navigation",
                vec![
                    Step::navigate(LOGIN_PAGE),
                    Step::press_key("Tab"),
                    Step::expect(Expectation::Focused {
                        target: Role::EmailInput.into(),
                    }),
                    Step::press_key("Tab"),
                    Step::expect(Expectation::Focused {
                        target: Role::PasswordInput.into(),
                    }),
                    Step::press_key("Tab"),
                    Step::expect(Expectation::Focused {
                        target: Role::LoginButton.into(),
                    }),
                ],
            )
            .tagged(&["a11y"]),
            Scenario::new(
                "should handle form submission with Enter key",
                vec![
                    Step::navigate(LOGIN_PAGE),
                    Step::fill(first(Role::EmailInput), "test@example.com"),
                    Step::fill(first(Role::PasswordInput), "testpassword"),
                    Step::press_key("Enter"),
                    Step::settle(),
                    Step::assert(
                        Condition::any([
                            Condition::visible(Role::ErrorMessage),
                            Condition::url_contains("home").negate(),
                        ]),
                        "pressing Enter did not submit the login form",
                    ),
                ],
            )
            .tagged(&["a11y"]),
        ],
    );

    for scenario in &mut suite.scenarios {
        scenario.tags.insert(0, "auth".to_string());
    }
    suite.description = "User registration and login".to_string();
    suite.rebuilt_with(|fixtures| Ok(authentication(fixtures)))
}
